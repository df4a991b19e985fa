//! Error taxonomy for the promotion pipeline.

/// Errors produced by registry lookup, credential resolution, invocation
/// and run sequencing.
#[derive(Debug, thiserror::Error)]
pub enum PromoteError {
    #[error("unknown branch: {0}")]
    UnknownBranch(String),

    /// The reason never names the credential reference or the secret.
    #[error("credential resolution failed: {reason}")]
    CredentialResolution { reason: String },

    #[error("deployment to {environment} failed with exit code {exit_code}")]
    DeploymentFailure { environment: String, exit_code: i32 },

    #[error("verification of {environment} failed: {failing_cases} failing case(s)")]
    VerificationFailure {
        environment: String,
        failing_cases: u32,
    },

    #[error("invalid pipeline state transition: {current} -> {requested}")]
    InvalidTransition { current: String, requested: String },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("invocation error: {0}")]
    Invocation(String),

    #[error("toml parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for promotion pipeline operations.
pub type Result<T> = std::result::Result<T, PromoteError>;
