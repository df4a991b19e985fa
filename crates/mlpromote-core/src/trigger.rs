//! Inbound triggers and profile selection.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::profile::EnvironmentProfile;
use crate::registry::ProfileRegistry;

/// Kind of source-control event carried by a trigger.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Push,
    Other,
}

impl EventKind {
    /// Map a CI event name (`push`, `pull_request`, `workflow_dispatch`, ...)
    /// onto an event kind. Anything other than `push` is `Other`.
    pub fn from_event_name(name: &str) -> Self {
        if name.trim().eq_ignore_ascii_case("push") {
            EventKind::Push
        } else {
            EventKind::Other
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventKind::Push => f.write_str("push"),
            EventKind::Other => f.write_str("other"),
        }
    }
}

/// An inbound event that may cause a pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Trigger {
    pub branch: String,
    pub event_kind: EventKind,
}

impl Trigger {
    pub fn new(branch: impl Into<String>, event_kind: EventKind) -> Self {
        Self {
            branch: branch.into(),
            event_kind,
        }
    }

    /// Push trigger for `branch`.
    pub fn push(branch: impl Into<String>) -> Self {
        Self::new(branch, EventKind::Push)
    }

    /// Build a trigger from a git ref such as `refs/heads/dev`.
    ///
    /// Bare branch names are accepted unchanged.
    pub fn from_git_ref(git_ref: &str, event_kind: EventKind) -> Self {
        let branch = git_ref.strip_prefix("refs/heads/").unwrap_or(git_ref);
        Self::new(branch, event_kind)
    }
}

/// Selects the profile a trigger deploys to.
pub struct TriggerResolver;

impl TriggerResolver {
    /// Return the profile for a push on a registered branch, `None` otherwise.
    ///
    /// Unregistered branches and non-push events are ignored, not errors.
    pub fn resolve(registry: &ProfileRegistry, trigger: &Trigger) -> Option<EnvironmentProfile> {
        if trigger.event_kind != EventKind::Push {
            return None;
        }
        registry.lookup(&trigger.branch).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::EnvironmentName;

    #[test]
    fn test_push_on_registered_branch_resolves() {
        let registry = ProfileRegistry::builtin();
        let profile = TriggerResolver::resolve(&registry, &Trigger::push("stage")).expect("resolve");
        assert_eq!(profile.name, EnvironmentName::Stage);
    }

    #[test]
    fn test_non_push_event_is_ignored() {
        let registry = ProfileRegistry::builtin();
        let trigger = Trigger::new("prod", EventKind::Other);
        assert!(TriggerResolver::resolve(&registry, &trigger).is_none());
    }

    #[test]
    fn test_unregistered_branches_are_ignored() {
        let registry = ProfileRegistry::builtin();
        for branch in ["main", "feature/x", "", "DEV", "dev "] {
            assert!(
                TriggerResolver::resolve(&registry, &Trigger::push(branch)).is_none(),
                "branch {:?} should not resolve",
                branch
            );
        }
    }

    #[test]
    fn test_dev_never_resolves_prod() {
        let registry = ProfileRegistry::builtin();
        let dev = TriggerResolver::resolve(&registry, &Trigger::push("dev")).unwrap();
        let prod = TriggerResolver::resolve(&registry, &Trigger::push("prod")).unwrap();
        assert_ne!(dev.catalog, prod.catalog);
        assert_ne!(dev.credential_ref, prod.credential_ref);
    }

    #[test]
    fn test_from_git_ref_strips_heads_prefix() {
        let trigger = Trigger::from_git_ref("refs/heads/dev", EventKind::Push);
        assert_eq!(trigger.branch, "dev");

        let trigger = Trigger::from_git_ref("stage", EventKind::Push);
        assert_eq!(trigger.branch, "stage");
    }

    #[test]
    fn test_event_kind_from_name() {
        assert_eq!(EventKind::from_event_name("push"), EventKind::Push);
        assert_eq!(EventKind::from_event_name("PUSH"), EventKind::Push);
        assert_eq!(EventKind::from_event_name("pull_request"), EventKind::Other);
    }
}
