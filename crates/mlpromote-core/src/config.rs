//! Pipeline configuration file.
//!
//! ```toml
//! [deploy]
//! command = ["databricks", "bundle", "deploy", "--target", "{env}"]
//!
//! [verify]
//! command = ["pytest", "{test_path}"]
//! timeout_secs = 1800
//!
//! [[profiles]]
//! name = "prod"
//! branches = ["prod", "main"]
//! workspace_host = "https://prod.cloud.databricks.com"
//! credential_ref = "DATABRICKS_TOKEN_PROD"
//! catalog = "prod_catalog"
//! schema = "wine_quality"
//! train_artifact_path = "notebooks/train.py"
//! inference_artifact_path = "notebooks/inference.py"
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{PromoteError, Result};
use crate::process::CommandSpec;
use crate::profile::{CredentialRef, EnvironmentName, EnvironmentProfile, DEFAULT_MODEL_NAME};
use crate::registry::ProfileRegistry;

/// Top-level pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    #[serde(default = "default_deploy_command")]
    pub deploy: CommandSpec,

    #[serde(default = "default_verify_command")]
    pub verify: CommandSpec,

    #[serde(default)]
    pub credentials: CredentialsConfig,

    #[serde(default)]
    pub profiles: Vec<ProfileConfig>,
}

/// How credential references are resolved.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct CredentialsConfig {
    /// Prefix prepended to a reference to form the environment variable name.
    #[serde(default)]
    pub env_prefix: String,
}

/// One `[[profiles]]` entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ProfileConfig {
    pub name: EnvironmentName,

    /// Branches that deploy to this profile (default: the profile name).
    #[serde(default)]
    pub branches: Option<Vec<String>>,

    pub workspace_host: String,
    pub credential_ref: String,
    pub catalog: String,
    pub schema: String,
    pub train_artifact_path: String,
    pub inference_artifact_path: String,

    #[serde(default)]
    pub model_name: Option<String>,

    /// Test suite path (default: `tests/<name>`).
    #[serde(default)]
    pub test_path: Option<String>,
}

impl ProfileConfig {
    fn branches(&self) -> Vec<String> {
        self.branches
            .clone()
            .unwrap_or_else(|| vec![self.name.as_str().to_string()])
    }

    fn to_profile(&self) -> EnvironmentProfile {
        EnvironmentProfile {
            name: self.name,
            workspace_host: self.workspace_host.trim_end_matches('/').to_string(),
            credential_ref: CredentialRef::new(self.credential_ref.clone()),
            catalog: self.catalog.clone(),
            schema: self.schema.clone(),
            train_artifact_path: self.train_artifact_path.clone(),
            inference_artifact_path: self.inference_artifact_path.clone(),
            model_name: self
                .model_name
                .clone()
                .unwrap_or_else(|| DEFAULT_MODEL_NAME.to_string()),
            test_path: self
                .test_path
                .clone()
                .unwrap_or_else(|| format!("tests/{}", self.name)),
        }
    }

    fn validate(&self) -> Result<()> {
        let ctx = |msg: String| PromoteError::Config(format!("profile '{}': {}", self.name, msg));

        let host = self.workspace_host.trim();
        if !(host.starts_with("https://") || host.starts_with("http://"))
            || host.trim_end_matches('/').ends_with("://")
        {
            return Err(ctx(format!("workspace_host '{}' is not an http(s) URI", host)));
        }

        if !is_identifier(&self.credential_ref) {
            return Err(ctx(
                "credential_ref must name a secret (letters, digits, '_'), not hold one".to_string(),
            ));
        }
        if self.credential_ref.to_ascii_lowercase().starts_with("dapi") {
            return Err(ctx("credential_ref looks like a literal token".to_string()));
        }

        for (field, value) in [("catalog", &self.catalog), ("schema", &self.schema)] {
            if !is_identifier(value) {
                return Err(ctx(format!("{} '{}' is not a valid identifier", field, value)));
            }
        }
        if let Some(model) = &self.model_name {
            if !is_identifier(model) {
                return Err(ctx(format!("model_name '{}' is not a valid identifier", model)));
            }
        }

        for (field, value) in [
            ("train_artifact_path", &self.train_artifact_path),
            ("inference_artifact_path", &self.inference_artifact_path),
        ] {
            if value.trim().is_empty() {
                return Err(ctx(format!("{} must not be empty", field)));
            }
        }
        Ok(())
    }
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn default_deploy_command() -> CommandSpec {
    CommandSpec::new(
        ["databricks", "bundle", "deploy", "--target", "{env}"]
            .iter()
            .map(|s| s.to_string())
            .collect(),
    )
}

fn default_verify_command() -> CommandSpec {
    CommandSpec::new(
        ["pytest", "{test_path}"]
            .iter()
            .map(|s| s.to_string())
            .collect(),
    )
}

impl Default for PipelineConfig {
    /// Built-in `dev`/`stage`/`prod` profiles with the default commands.
    fn default() -> Self {
        let profiles = EnvironmentName::ALL
            .iter()
            .map(|env| {
                let p = EnvironmentProfile::builtin(*env);
                ProfileConfig {
                    name: p.name,
                    branches: None,
                    workspace_host: p.workspace_host,
                    credential_ref: p.credential_ref.as_str().to_string(),
                    catalog: p.catalog,
                    schema: p.schema,
                    train_artifact_path: p.train_artifact_path,
                    inference_artifact_path: p.inference_artifact_path,
                    model_name: Some(p.model_name),
                    test_path: Some(p.test_path),
                }
            })
            .collect();

        Self {
            deploy: default_deploy_command(),
            verify: default_verify_command(),
            credentials: CredentialsConfig::default(),
            profiles,
        }
    }
}

impl PipelineConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: PipelineConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            PromoteError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> Result<()> {
        if self.deploy.command.is_empty() {
            return Err(PromoteError::Config("deploy.command must not be empty".to_string()));
        }
        if self.verify.command.is_empty() {
            return Err(PromoteError::Config("verify.command must not be empty".to_string()));
        }
        if self.profiles.is_empty() {
            return Err(PromoteError::Config("at least one profile is required".to_string()));
        }
        for profile in &self.profiles {
            profile.validate()?;
        }
        // Duplicate branches and environments are rejected by the registry.
        self.registry().map(|_| ())
    }

    /// Build the branch → profile registry.
    pub fn registry(&self) -> Result<ProfileRegistry> {
        ProfileRegistry::from_entries(
            self.profiles
                .iter()
                .map(|p| (p.branches(), p.to_profile())),
        )
    }
}
