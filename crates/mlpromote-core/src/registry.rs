//! Branch → profile registry.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::{PromoteError, Result};
use crate::profile::{EnvironmentName, EnvironmentProfile};

/// Static mapping from branch name to environment profile.
///
/// Built once from configuration and read-only afterwards. Lookups hand out
/// owned copies, so two branches never share a profile instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileRegistry {
    by_branch: BTreeMap<String, EnvironmentProfile>,
}

impl ProfileRegistry {
    /// Build a registry from `(branches, profile)` pairs.
    ///
    /// Rejects duplicate branches, duplicate environments and profiles
    /// without any branch.
    pub fn from_entries<I>(entries: I) -> Result<Self>
    where
        I: IntoIterator<Item = (Vec<String>, EnvironmentProfile)>,
    {
        let mut by_branch: BTreeMap<String, EnvironmentProfile> = BTreeMap::new();
        let mut seen_envs = BTreeSet::new();

        for (branches, profile) in entries {
            if !seen_envs.insert(profile.name) {
                return Err(PromoteError::Config(format!(
                    "environment '{}' declared more than once",
                    profile.name
                )));
            }
            if branches.is_empty() {
                return Err(PromoteError::Config(format!(
                    "profile '{}' has no branches",
                    profile.name
                )));
            }
            for branch in branches {
                let branch = branch.trim().to_string();
                if branch.is_empty() {
                    return Err(PromoteError::Config(format!(
                        "profile '{}' has an empty branch name",
                        profile.name
                    )));
                }
                if let Some(existing) = by_branch.get(&branch) {
                    return Err(PromoteError::Config(format!(
                        "branch '{}' mapped to both '{}' and '{}'",
                        branch, existing.name, profile.name
                    )));
                }
                by_branch.insert(branch, profile.clone());
            }
        }

        Ok(Self { by_branch })
    }

    /// Registry with the built-in `dev`, `stage` and `prod` profiles, each
    /// triggered by the branch of the same name.
    pub fn builtin() -> Self {
        let by_branch = EnvironmentName::ALL
            .iter()
            .map(|env| (env.as_str().to_string(), EnvironmentProfile::builtin(*env)))
            .collect();
        Self { by_branch }
    }

    /// Look up the profile registered for `branch`.
    pub fn lookup(&self, branch: &str) -> Result<EnvironmentProfile> {
        self.by_branch
            .get(branch)
            .cloned()
            .ok_or_else(|| PromoteError::UnknownBranch(branch.to_string()))
    }

    /// Whether `branch` is registered.
    pub fn contains(&self, branch: &str) -> bool {
        self.by_branch.contains_key(branch)
    }

    /// Registered branch names, sorted.
    pub fn branches(&self) -> impl Iterator<Item = &str> {
        self.by_branch.keys().map(String::as_str)
    }

    /// `(branch, profile)` pairs, sorted by branch.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &EnvironmentProfile)> {
        self.by_branch.iter().map(|(b, p)| (b.as_str(), p))
    }

    pub fn len(&self) -> usize {
        self.by_branch.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_branch.is_empty()
    }
}
