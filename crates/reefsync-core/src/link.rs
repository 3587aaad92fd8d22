// ── Cloud link pairing ──
//
// Narrow message contract between cloud accounts and the local devices
// that need a cloud session. Devices ask, accounts that know the device's
// hardware id answer by installing themselves as its link and announcing
// readiness. Removing an account tears its links down.

use std::sync::Weak;

use strum::Display;
use tokio::sync::broadcast;
use tracing::{debug, trace};

use crate::hub::CloudAccount;

const LINK_CHANNEL_SIZE: usize = 64;

/// Readiness reported by an account in [`LinkEvent::LinkReady`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum AccountState {
    Ready,
    Unavailable,
}

/// Messages on the pairing bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// A device without a link asks for one.
    LinkRequested { device_id: String },
    /// An account finished initializing or installed a link.
    LinkReady { account: String, state: AccountState },
    /// An account is going away; every link to it must be dropped.
    Teardown { account: String },
}

/// Pairing state of one device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum LinkState {
    Unlinked,
    LinkRequested,
    Linked,
}

/// Non-owning back-reference from a device to its cloud account.
#[derive(Debug)]
pub struct CloudLink {
    pub account: String,
    pub(crate) target: Weak<CloudAccount>,
}

impl CloudLink {
    pub(crate) fn new(account: impl Into<String>, target: Weak<CloudAccount>) -> Self {
        Self {
            account: account.into(),
            target,
        }
    }

    /// The account, if it is still alive.
    pub fn upgrade(&self) -> Option<std::sync::Arc<CloudAccount>> {
        self.target.upgrade()
    }
}

/// Broadcast bus carrying [`LinkEvent`]s.
#[derive(Debug, Clone)]
pub struct LinkBus {
    tx: broadcast::Sender<LinkEvent>,
}

impl Default for LinkBus {
    fn default() -> Self {
        Self::new()
    }
}

impl LinkBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(LINK_CHANNEL_SIZE);
        Self { tx }
    }

    /// Publish an event. Having no listener is not an error.
    pub fn publish(&self, event: LinkEvent) {
        trace!(?event, "link event");
        if self.tx.send(event).is_err() {
            debug!("link event dropped, no listener");
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LinkEvent> {
        self.tx.subscribe()
    }
}
