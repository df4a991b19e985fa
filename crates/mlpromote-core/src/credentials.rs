//! Credential resolution.
//!
//! Profiles carry a [`CredentialRef`]; the secret behind it is only looked up
//! when a deployment is about to be invoked, and the resolved
//! [`SecretToken`] can be neither printed nor serialized. Resolution errors
//! describe what went wrong without naming the reference.

use std::fmt;

use crate::error::{PromoteError, Result};
use crate::profile::CredentialRef;

/// A resolved secret.
///
/// `Debug` is redacted and there is no `Display` or `Serialize`, so a token
/// cannot end up in logs or reports by accident.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretToken(String);

impl SecretToken {
    pub fn new(value: impl Into<String>) -> Self {
        SecretToken(value.into())
    }

    /// Plaintext value, for handing to the deployment action only.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SecretToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretToken(***)")
    }
}

/// Resolves credential references into secrets.
pub trait CredentialStore: Send + Sync {
    /// Resolve `credential_ref`, failing with
    /// [`PromoteError::CredentialResolution`] when the secret is missing or
    /// unusable.
    fn resolve(&self, credential_ref: &CredentialRef) -> Result<SecretToken>;
}

/// Credential store backed by process environment variables.
///
/// The reference names the variable, optionally behind a prefix.
#[derive(Debug, Clone, Default)]
pub struct EnvCredentialStore {
    prefix: String,
}

impl EnvCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look variables up as `<prefix><reference>`.
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    fn variable_name(&self, credential_ref: &CredentialRef) -> String {
        format!("{}{}", self.prefix, credential_ref.as_str())
    }
}

impl CredentialStore for EnvCredentialStore {
    fn resolve(&self, credential_ref: &CredentialRef) -> Result<SecretToken> {
        let var = self.variable_name(credential_ref);
        let value = std::env::var(&var).map_err(|e| PromoteError::CredentialResolution {
            reason: match e {
                std::env::VarError::NotPresent => "secret is not set".to_string(),
                std::env::VarError::NotUnicode(_) => "secret is not valid unicode".to_string(),
            },
        })?;

        let value = value.trim();
        if value.is_empty() {
            return Err(PromoteError::CredentialResolution {
                reason: "secret is empty".to_string(),
            });
        }

        Ok(SecretToken::new(value))
    }
}
