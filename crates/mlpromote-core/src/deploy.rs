//! Deployment invocation.
//!
//! [`DeploymentInvoker`] resolves the profile's credential, fingerprints the
//! artifacts and hands everything to a [`DeployAction`]. The action is an
//! upsert on the workspace side; the invoker never retries and reports the
//! action's exit code verbatim.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::credentials::{CredentialStore, SecretToken};
use crate::error::{PromoteError, Result};
use crate::obs;
use crate::process::{run_command, CommandSpec, InvocationOutput};
use crate::profile::{EnvironmentName, EnvironmentProfile};

/// Outcome of a deployment invocation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentStatus {
    Success,
    Failure,
}

/// An artifact handed to the deploy action.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ArtifactRecord {
    pub path: String,

    /// SHA-256 of the local file, `None` when the path is not a local file.
    pub sha256: Option<String>,
}

/// Result of invoking the deploy action for one profile.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeploymentResult {
    pub environment: EnvironmentName,

    /// `Success` iff `exit_code == 0`.
    pub status: DeploymentStatus,

    pub exit_code: i32,

    /// Artifact paths in upload order; empty unless the action succeeded.
    pub artifacts_deployed: Vec<String>,

    /// Artifacts handed to the action, whether or not it succeeded.
    pub artifacts: Vec<ArtifactRecord>,

    /// Fully qualified registered model name.
    pub registered_model: String,

    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
}

impl DeploymentResult {
    /// Build a result from the action's output. Status follows the exit code.
    pub fn from_invocation(
        profile: &EnvironmentProfile,
        artifacts: Vec<ArtifactRecord>,
        output: InvocationOutput,
    ) -> Self {
        let status = if output.exit_code == 0 {
            DeploymentStatus::Success
        } else {
            DeploymentStatus::Failure
        };
        let artifacts_deployed = match status {
            DeploymentStatus::Success => artifacts.iter().map(|a| a.path.clone()).collect(),
            DeploymentStatus::Failure => Vec::new(),
        };
        Self {
            environment: profile.name,
            status,
            exit_code: output.exit_code,
            artifacts_deployed,
            artifacts,
            registered_model: profile.registered_model_name(),
            stdout: output.stdout,
            stderr: output.stderr,
            duration_ms: output.duration_ms,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.status == DeploymentStatus::Success
    }
}

/// Everything a deploy action needs for one invocation.
#[derive(Debug, Clone)]
pub struct DeployRequest {
    pub profile: EnvironmentProfile,
    pub token: SecretToken,
}

impl DeployRequest {
    /// Environment variables exposed to the deploy action.
    ///
    /// The only place the plaintext token leaves the credential layer.
    pub fn env_vars(&self) -> Vec<(&'static str, String)> {
        let p = &self.profile;
        vec![
            ("DATABRICKS_HOST", p.workspace_host.clone()),
            ("DATABRICKS_TOKEN", self.token.expose().to_string()),
            ("DEPLOY_ENV", p.name.as_str().to_string()),
            ("CATALOG", p.catalog.clone()),
            ("SCHEMA", p.schema.clone()),
            ("TRAIN_PATH", p.train_artifact_path.clone()),
            ("INFERENCE_PATH", p.inference_artifact_path.clone()),
            ("MODEL_NAME", p.registered_model_name()),
            ("MODEL_ALIAS", p.model_alias().to_string()),
        ]
    }
}

/// Performs the "upload and register" action against a workspace.
#[async_trait]
pub trait DeployAction: Send + Sync {
    /// Run the deployment and report the action's exit code.
    async fn deploy(&self, request: &DeployRequest) -> Result<InvocationOutput>;
}

/// Deploy action backed by an external CLI (e.g. `databricks bundle deploy`).
#[derive(Debug, Clone)]
pub struct CliDeployAction {
    spec: CommandSpec,
}

impl CliDeployAction {
    pub fn new(spec: CommandSpec) -> Self {
        Self { spec }
    }
}

#[async_trait]
impl DeployAction for CliDeployAction {
    async fn deploy(&self, request: &DeployRequest) -> Result<InvocationOutput> {
        let args = self.spec.render(&request.profile);
        debug!(command = ?args, environment = %request.profile.name, "Invoking deploy command");
        run_command(&self.spec, &args, &request.env_vars()).await
    }
}

/// Invokes the deploy action for a resolved profile.
#[derive(Clone)]
pub struct DeploymentInvoker {
    action: Arc<dyn DeployAction>,
    credentials: Arc<dyn CredentialStore>,
}

impl DeploymentInvoker {
    pub fn new(action: Arc<dyn DeployAction>, credentials: Arc<dyn CredentialStore>) -> Self {
        Self {
            action,
            credentials,
        }
    }

    /// Deploy both artifacts of `profile`.
    ///
    /// Returns `Err` only when the credential cannot be resolved, in which
    /// case the action is never called. Action errors (spawn failure,
    /// timeout) become a failed result with exit code -1.
    pub async fn invoke(&self, profile: &EnvironmentProfile) -> Result<DeploymentResult> {
        let token = self
            .credentials
            .resolve(&profile.credential_ref)
            .map_err(|e| match e {
                PromoteError::CredentialResolution { reason } => {
                    PromoteError::CredentialResolution {
                        reason: format!("{}: {}", profile.name, reason),
                    }
                }
                other => other,
            })?;
        let artifacts = fingerprint_artifacts(profile);

        obs::emit_deploy_started(profile.name.as_str(), &profile.catalog, &profile.schema);

        let request = DeployRequest {
            profile: profile.clone(),
            token,
        };

        let output = match self.action.deploy(&request).await {
            Ok(output) => output,
            Err(e) => {
                warn!(environment = %profile.name, error = %e, "Deploy action errored");
                InvocationOutput {
                    exit_code: -1,
                    stdout: String::new(),
                    stderr: e.to_string(),
                    duration_ms: 0,
                }
            }
        };

        let result = DeploymentResult::from_invocation(profile, artifacts, output);
        obs::emit_deploy_finished(
            profile.name.as_str(),
            result.exit_code,
            result.duration_ms,
            result.succeeded(),
        );
        Ok(result)
    }
}

/// Fingerprint the profile's artifacts in upload order.
pub fn fingerprint_artifacts(profile: &EnvironmentProfile) -> Vec<ArtifactRecord> {
    profile
        .artifacts()
        .into_iter()
        .map(|path| {
            let sha256 = file_sha256(Path::new(&path));
            ArtifactRecord { path, sha256 }
        })
        .collect()
}

fn file_sha256(path: &Path) -> Option<String> {
    if !path.is_file() {
        return None;
    }
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Cannot read artifact for fingerprint");
            return None;
        }
    };
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Some(hex::encode(hasher.finalize()))
}
