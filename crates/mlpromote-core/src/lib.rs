//! mlpromote core - environment-aware ML promotion pipeline
//!
//! Provides a promotion orchestrator that:
//! - Maps a push on a registered branch to an environment profile
//! - Deploys the training and inference artifacts into that environment
//! - Gates the run's success on the environment's test suite

pub mod config;
pub mod credentials;
pub mod deploy;
pub mod error;
pub mod fakes;
pub mod journal;
pub mod obs;
pub mod pipeline;
pub mod process;
pub mod profile;
pub mod registry;
pub mod report;
pub mod telemetry;
pub mod trigger;
pub mod verify;

// Re-export key types
pub use config::{CredentialsConfig, PipelineConfig, ProfileConfig};
pub use credentials::{CredentialStore, EnvCredentialStore, SecretToken};
pub use deploy::{
    ArtifactRecord, CliDeployAction, DeployAction, DeployRequest, DeploymentInvoker,
    DeploymentResult, DeploymentStatus,
};
pub use error::{PromoteError, Result};
pub use journal::{PipelineEvent, RunJournal};
pub use pipeline::{OutcomeStatus, PipelineController, PipelineOutcome, PipelineState};
pub use process::{CommandSpec, InvocationOutput};
pub use profile::{CredentialRef, EnvironmentName, EnvironmentProfile};
pub use registry::ProfileRegistry;
pub use report::{render_summary_md, write_outcome_json};
pub use telemetry::init_tracing;
pub use trigger::{EventKind, Trigger, TriggerResolver};
pub use verify::{
    CommandTestRunner, TestRequest, TestRunReport, TestRunResult, TestRunner, TestStatus,
    VerificationGate,
};
