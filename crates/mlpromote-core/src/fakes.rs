//! In-memory fakes for the pipeline capabilities (testing only)
//!
//! Provides `StaticCredentialStore`, `ScriptedDeployAction` and
//! `ScriptedTestRunner`, which satisfy the trait contracts without spawning
//! processes or touching a workspace, and record every call.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::credentials::{CredentialStore, SecretToken};
use crate::deploy::{DeployAction, DeployRequest};
use crate::error::{PromoteError, Result};
use crate::process::InvocationOutput;
use crate::profile::{CredentialRef, EnvironmentName, EnvironmentProfile};
use crate::verify::{TestRequest, TestRunReport, TestRunner};

// ---------------------------------------------------------------------------
// StaticCredentialStore
// ---------------------------------------------------------------------------

/// Credential store backed by a fixed `HashMap<reference, secret>`.
#[derive(Debug, Default, Clone)]
pub struct StaticCredentialStore {
    secrets: HashMap<String, String>,
}

impl StaticCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_secret(mut self, credential_ref: &str, value: &str) -> Self {
        self.secrets
            .insert(credential_ref.to_string(), value.to_string());
        self
    }

    /// Store holding `DATABRICKS_TOKEN_<ENV>` for every environment.
    pub fn for_all_environments() -> Self {
        EnvironmentName::ALL.iter().fold(Self::new(), |store, env| {
            let name = format!("DATABRICKS_TOKEN_{}", env.as_str().to_ascii_uppercase());
            let value = format!("token-{}", env);
            store.with_secret(&name, &value)
        })
    }
}

impl CredentialStore for StaticCredentialStore {
    fn resolve(&self, credential_ref: &CredentialRef) -> Result<SecretToken> {
        self.secrets
            .get(credential_ref.as_str())
            .map(SecretToken::new)
            .ok_or_else(|| PromoteError::CredentialResolution {
                reason: "no such secret".to_string(),
            })
    }
}

// ---------------------------------------------------------------------------
// ScriptedDeployAction
// ---------------------------------------------------------------------------

/// A recorded deploy invocation.
#[derive(Debug, Clone)]
pub struct DeployCall {
    pub profile: EnvironmentProfile,
    pub token: String,
}

/// Deploy action that returns a scripted exit code and records calls.
#[derive(Debug, Default)]
pub struct ScriptedDeployAction {
    default_exit_code: i32,
    exit_codes: HashMap<EnvironmentName, i32>,
    error: Option<String>,
    calls: Mutex<Vec<DeployCall>>,
}

impl ScriptedDeployAction {
    /// Action that always exits with `exit_code`.
    pub fn exiting(exit_code: i32) -> Self {
        Self {
            default_exit_code: exit_code,
            ..Self::default()
        }
    }

    pub fn succeeding() -> Self {
        Self::exiting(0)
    }

    /// Action whose invocation itself errors (spawn failure, timeout).
    pub fn erroring(message: &str) -> Self {
        Self {
            error: Some(message.to_string()),
            ..Self::default()
        }
    }

    /// Override the exit code for one environment.
    pub fn with_exit_code_for(mut self, env: EnvironmentName, exit_code: i32) -> Self {
        self.exit_codes.insert(env, exit_code);
        self
    }

    pub fn calls(&self) -> Vec<DeployCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl DeployAction for ScriptedDeployAction {
    async fn deploy(&self, request: &DeployRequest) -> Result<InvocationOutput> {
        self.calls.lock().unwrap().push(DeployCall {
            profile: request.profile.clone(),
            token: request.token.expose().to_string(),
        });

        if let Some(message) = &self.error {
            return Err(PromoteError::Invocation(message.clone()));
        }

        let exit_code = self
            .exit_codes
            .get(&request.profile.name)
            .copied()
            .unwrap_or(self.default_exit_code);

        Ok(InvocationOutput {
            exit_code,
            stdout: format!("deployed to {}", request.profile.registered_model_name()),
            stderr: String::new(),
            duration_ms: 1,
        })
    }
}

// ---------------------------------------------------------------------------
// ScriptedTestRunner
// ---------------------------------------------------------------------------

/// Test runner that reports a scripted failing count and records calls.
#[derive(Debug, Default)]
pub struct ScriptedTestRunner {
    failing_cases: u32,
    total_cases: u32,
    error: Option<String>,
    calls: Mutex<Vec<EnvironmentProfile>>,
}

impl ScriptedTestRunner {
    pub fn passing() -> Self {
        Self {
            total_cases: 10,
            ..Self::default()
        }
    }

    pub fn failing(failing_cases: u32) -> Self {
        Self {
            failing_cases,
            total_cases: failing_cases.max(10),
            ..Self::default()
        }
    }

    pub fn erroring(message: &str) -> Self {
        Self {
            error: Some(message.to_string()),
            ..Self::default()
        }
    }

    /// Profiles the runner was invoked for, in call order.
    pub fn calls(&self) -> Vec<EnvironmentProfile> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl TestRunner for ScriptedTestRunner {
    async fn run(&self, request: &TestRequest) -> Result<TestRunReport> {
        self.calls.lock().unwrap().push(request.profile.clone());

        if let Some(message) = &self.error {
            return Err(PromoteError::Invocation(message.clone()));
        }

        Ok(TestRunReport {
            failing_case_count: self.failing_cases,
            total_cases: Some(self.total_cases),
            exit_code: Some(if self.failing_cases == 0 { 0 } else { 1 }),
            output: String::new(),
            duration_ms: 1,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_store_all_environments() {
        let store = StaticCredentialStore::for_all_environments();
        let token = store
            .resolve(&CredentialRef::new("DATABRICKS_TOKEN_PROD"))
            .expect("resolve");
        assert_eq!(token.expose(), "token-prod");
        assert!(store.resolve(&CredentialRef::new("OTHER")).is_err());
    }

    #[tokio::test]
    async fn test_scripted_deploy_per_environment_exit_codes() {
        let action = ScriptedDeployAction::succeeding().with_exit_code_for(EnvironmentName::Prod, 1);
        let request = |env| DeployRequest {
            profile: EnvironmentProfile::builtin(env),
            token: SecretToken::new("t"),
        };

        let dev = action.deploy(&request(EnvironmentName::Dev)).await.unwrap();
        let prod = action.deploy(&request(EnvironmentName::Prod)).await.unwrap();
        assert_eq!(dev.exit_code, 0);
        assert_eq!(prod.exit_code, 1);
        assert_eq!(action.call_count(), 2);
    }
}
