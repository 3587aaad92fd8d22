// ── Cloud account adapter ──
//
// The account is polled like any other device: `/user` is its identity,
// the aquarium and device lists are its configuration, and the libraries
// are its data.

use reefsync_api::cloud::{
    AQUARIUM_PATH, DEVICE_PATH, LIGHT_LIBRARY_PATH, SUPPLEMENT_LIBRARY_PATH, USER_PATH, WAVE_LIBRARY_PATH,
};
use reefsync_api::{CloudClient, CloudCredentials};
use serde_json::Value;
use tracing::info;
use url::Url;

use super::Device;
use crate::config::CloudConfig;
use crate::error::CoreError;
use crate::model::SourceKind;
use crate::store::SourceRegistry;

pub(crate) fn register(sources: &mut SourceRegistry) {
    sources.add_source(USER_PATH, SourceKind::DeviceInfo);
    sources.add_source(AQUARIUM_PATH, SourceKind::Config);
    sources.add_source(DEVICE_PATH, SourceKind::Config);
    sources.add_source(LIGHT_LIBRARY_PATH, SourceKind::Data);
    sources.add_source(WAVE_LIBRARY_PATH, SourceKind::Data);
    sources.add_source(SUPPLEMENT_LIBRARY_PATH, SourceKind::Data);
}

pub(crate) fn connect(config: &CloudConfig) -> Result<CloudClient, CoreError> {
    let credentials = CloudCredentials {
        username: config.username.clone(),
        password: config.password.clone(),
        client_id: config.client_id.clone(),
        client_secret: config.client_secret.clone(),
    };
    let http = config.sync.transport.build_client()?;
    let base_url = Url::parse(&config.base_url).map_err(reefsync_api::Error::from)?;
    Ok(CloudClient::with_base_url(http, base_url, credentials, config.sync.retry)?)
}

pub struct CloudState {
    client: CloudClient,
}

impl CloudState {
    pub(crate) fn new(client: CloudClient) -> Self {
        Self { client }
    }

    pub(crate) async fn login(&self) -> Result<(), CoreError> {
        self.client.login().await?;
        info!(account = %self.client.username(), "cloud login succeeded");
        Ok(())
    }
}

impl Device {
    /// Authenticated cloud client of a cloud-account device.
    pub fn cloud_client(&self) -> Option<&CloudClient> {
        match &self.family {
            super::Family::Cloud(state) => Some(&state.client),
            _ => None,
        }
    }

    /// Hardware ids of every device registered on the account.
    pub fn cloud_device_hwids(&self) -> Vec<String> {
        self.library(DEVICE_PATH)
            .iter()
            .filter_map(|d| d.get("hwid").and_then(Value::as_str))
            .map(str::to_owned)
            .collect()
    }

    /// Entries of a cached cloud collection, empty if not fetched yet.
    pub fn library(&self, source: &str) -> Vec<Value> {
        match self.core.doc.sources.payload(source) {
            Some(Value::Array(items)) => items.clone(),
            _ => Vec::new(),
        }
    }

    pub fn light_library(&self) -> Vec<Value> {
        self.library(LIGHT_LIBRARY_PATH)
    }

    pub fn wave_library(&self) -> Vec<Value> {
        self.library(WAVE_LIBRARY_PATH)
    }

    pub fn supplement_library(&self) -> Vec<Value> {
        self.library(SUPPLEMENT_LIBRARY_PATH)
    }
}
