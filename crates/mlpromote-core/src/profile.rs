//! Environment profiles: the immutable bundle of parameters for one
//! deployment target.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::PromoteError;

/// Registered model name used when a profile does not set one.
pub const DEFAULT_MODEL_NAME: &str = "wine_quality";

/// Deployment environment a profile targets.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum EnvironmentName {
    Dev,
    Stage,
    Prod,
}

impl EnvironmentName {
    /// All environments in promotion order.
    pub const ALL: [EnvironmentName; 3] = [
        EnvironmentName::Dev,
        EnvironmentName::Stage,
        EnvironmentName::Prod,
    ];

    /// Get the environment name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            EnvironmentName::Dev => "dev",
            EnvironmentName::Stage => "stage",
            EnvironmentName::Prod => "prod",
        }
    }
}

impl fmt::Display for EnvironmentName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EnvironmentName {
    type Err = PromoteError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dev" => Ok(EnvironmentName::Dev),
            "stage" => Ok(EnvironmentName::Stage),
            "prod" => Ok(EnvironmentName::Prod),
            other => Err(PromoteError::Config(format!(
                "unknown environment '{}' (expected dev, stage or prod)",
                other
            ))),
        }
    }
}

/// Opaque handle naming a secret in the credential store.
///
/// Holds the name of the secret, never its value.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct CredentialRef(String);

impl CredentialRef {
    pub fn new(name: impl Into<String>) -> Self {
        CredentialRef(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CredentialRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One deployment target.
///
/// Profiles are value objects: they are built once by the registry and
/// never mutated afterwards.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct EnvironmentProfile {
    /// Target environment.
    pub name: EnvironmentName,

    /// Remote workspace URI.
    pub workspace_host: String,

    /// Credential store key for the workspace token. Never serialized.
    #[serde(skip_serializing)]
    pub credential_ref: CredentialRef,

    /// Catalog that scopes registration.
    pub catalog: String,

    /// Schema inside `catalog`.
    pub schema: String,

    /// Path of the training artifact.
    pub train_artifact_path: String,

    /// Path of the inference artifact.
    pub inference_artifact_path: String,

    /// Short name of the registered model.
    pub model_name: String,

    /// Test suite path scoped to this environment.
    pub test_path: String,
}

impl EnvironmentProfile {
    /// Fully qualified `<catalog>.<schema>.<model>` name of the registered model.
    pub fn registered_model_name(&self) -> String {
        format!("{}.{}.{}", self.catalog, self.schema, self.model_name)
    }

    /// Alias the model version is promoted under in this environment.
    pub fn model_alias(&self) -> &'static str {
        self.name.as_str()
    }

    /// Artifacts uploaded by a deployment, in upload order.
    pub fn artifacts(&self) -> Vec<String> {
        vec![
            self.train_artifact_path.clone(),
            self.inference_artifact_path.clone(),
        ]
    }

    /// Built-in profile for an environment, used when no configuration
    /// file is supplied.
    pub fn builtin(name: EnvironmentName) -> Self {
        let env = name.as_str();
        Self {
            name,
            workspace_host: format!("https://{}.cloud.databricks.com", env),
            credential_ref: CredentialRef::new(format!(
                "DATABRICKS_TOKEN_{}",
                env.to_ascii_uppercase()
            )),
            catalog: format!("{}_catalog", env),
            schema: "wine_quality".to_string(),
            train_artifact_path: "notebooks/train.py".to_string(),
            inference_artifact_path: "notebooks/inference.py".to_string(),
            model_name: DEFAULT_MODEL_NAME.to_string(),
            test_path: format!("tests/{}", env),
        }
    }
}
