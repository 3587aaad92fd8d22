// ── Refresh policy ──
//
// Decides which sources a poll touches. Device adapters only change which
// sources exist; the selection rules are the same for every family.

use crate::model::SourceKind;
use crate::store::SourceRegistry;

/// Lifecycle phase of the policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Boot,
    Steady,
}

/// A set of sources to fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// Exactly one source.
    Named(String),
    /// Every source of the listed kinds.
    Kinds(Vec<SourceKind>),
}

impl Selection {
    /// Source names this selection covers in `registry`, in registry order.
    /// A named source that is not registered yields nothing.
    pub fn names(&self, registry: &SourceRegistry) -> Vec<String> {
        match self {
            Self::Named(name) => registry
                .get(name)
                .map(|s| vec![s.name.clone()])
                .unwrap_or_default(),
            Self::Kinds(kinds) => registry.names_of_kinds(kinds),
        }
    }
}

/// One step of the initial load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootStage {
    pub selection: Selection,
    /// A failed source in a fatal stage aborts initialization.
    pub fatal: bool,
}

#[derive(Debug, Clone)]
pub struct RefreshPolicy {
    phase: Phase,
    live_config: bool,
    quick_refresh: Option<String>,
}

impl RefreshPolicy {
    pub fn new(live_config: bool) -> Self {
        Self {
            phase: Phase::Boot,
            live_config,
            quick_refresh: None,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn live_config(&self) -> bool {
        self.live_config
    }

    pub fn set_live_config(&mut self, enabled: bool) {
        self.live_config = enabled;
    }

    /// Stages of the initial load: device-info (fatal), config unless
    /// live-config mode defers it, then data.
    pub fn boot_plan(&self) -> Vec<BootStage> {
        let mut plan = vec![BootStage {
            selection: Selection::Kinds(vec![SourceKind::DeviceInfo]),
            fatal: true,
        }];
        if !self.live_config {
            plan.push(BootStage {
                selection: Selection::Kinds(vec![SourceKind::Config]),
                fatal: false,
            });
        }
        plan.push(BootStage {
            selection: Selection::Kinds(vec![SourceKind::Data]),
            fatal: false,
        });
        plan
    }

    pub fn finish_boot(&mut self) {
        self.phase = Phase::Steady;
    }

    /// Arm the one-shot override for the next tick.
    pub fn set_quick_refresh(&mut self, source: impl Into<String>) {
        self.quick_refresh = Some(source.into());
    }

    pub fn quick_refresh(&self) -> Option<&str> {
        self.quick_refresh.as_deref()
    }

    /// Selection for one steady-state tick. Consumes the quick-refresh target.
    pub fn next_tick(&mut self) -> Selection {
        if let Some(name) = self.quick_refresh.take() {
            return Selection::Named(name);
        }
        if self.live_config {
            Selection::Kinds(vec![SourceKind::Config, SourceKind::Data])
        } else {
            Selection::Kinds(vec![SourceKind::Data])
        }
    }

    /// Selection for an explicit "refresh configuration now" request.
    pub fn config_refresh(source: Option<&str>) -> Selection {
        match source {
            Some(name) => Selection::Named(name.to_owned()),
            None => Selection::Kinds(vec![SourceKind::Config]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boot_fetches_info_config_then_data() {
        let policy = RefreshPolicy::new(false);
        let plan = policy.boot_plan();
        assert_eq!(plan.len(), 3);
        assert!(plan[0].fatal);
        assert_eq!(plan[0].selection, Selection::Kinds(vec![SourceKind::DeviceInfo]));
        assert_eq!(plan[1].selection, Selection::Kinds(vec![SourceKind::Config]));
        assert_eq!(plan[2].selection, Selection::Kinds(vec![SourceKind::Data]));
        assert!(!plan[2].fatal);
    }

    #[test]
    fn live_config_defers_config_at_boot() {
        let policy = RefreshPolicy::new(true);
        let plan = policy.boot_plan();
        assert_eq!(plan.len(), 2);
        assert_eq!(plan[1].selection, Selection::Kinds(vec![SourceKind::Data]));
    }

    #[test]
    fn steady_tick_polls_data_only() {
        let mut policy = RefreshPolicy::new(false);
        policy.finish_boot();
        assert_eq!(policy.phase(), Phase::Steady);
        assert_eq!(policy.next_tick(), Selection::Kinds(vec![SourceKind::Data]));
    }

    #[test]
    fn live_config_tick_skips_info_and_preview() {
        let registry = SourceRegistry::from_pairs([
            ("/device-info", SourceKind::DeviceInfo),
            ("/mode", SourceKind::Config),
            ("/manual", SourceKind::Data),
            ("/preview", SourceKind::Preview),
        ]);
        let mut policy = RefreshPolicy::new(true);
        policy.finish_boot();
        assert_eq!(policy.next_tick().names(&registry), ["/mode", "/manual"]);
    }

    #[test]
    fn quick_refresh_is_one_shot() {
        let mut policy = RefreshPolicy::new(false);
        policy.finish_boot();
        policy.set_quick_refresh("/mode");
        assert_eq!(policy.next_tick(), Selection::Named("/mode".into()));
        assert!(policy.quick_refresh().is_none());
        assert_eq!(policy.next_tick(), Selection::Kinds(vec![SourceKind::Data]));
    }

    #[test]
    fn config_refresh_targets_config_or_one_source() {
        assert_eq!(
            RefreshPolicy::config_refresh(None),
            Selection::Kinds(vec![SourceKind::Config])
        );
        assert_eq!(
            RefreshPolicy::config_refresh(Some("/head/1/settings")),
            Selection::Named("/head/1/settings".into())
        );
    }

    #[test]
    fn unknown_named_source_selects_nothing() {
        let registry = SourceRegistry::from_pairs([("/mode", SourceKind::Config)]);
        assert!(Selection::Named("/gone".into()).names(&registry).is_empty());
    }
}
