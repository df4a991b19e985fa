//! Pipeline controller: trigger resolution, deployment and verification
//! sequenced into a single run outcome.
//!
//! A run moves through `Idle → Resolving → Deploying → Verifying → Done`.
//! Every stage failure ends the run; nothing is retried and nothing is
//! rolled back. Failed verification leaves the deployed artifacts in place
//! and only prevents the run from reporting success.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::Instrument;
use uuid::Uuid;

use crate::credentials::CredentialStore;
use crate::deploy::{DeployAction, DeploymentInvoker, DeploymentResult};
use crate::error::{PromoteError, Result};
use crate::journal::{PipelineEvent, RunJournal};
use crate::obs;
use crate::profile::{EnvironmentName, EnvironmentProfile};
use crate::registry::ProfileRegistry;
use crate::trigger::{EventKind, Trigger, TriggerResolver};
use crate::verify::{TestRunResult, TestRunner, VerificationGate};

/// Process exit code for a successful run or a no-op.
pub const EXIT_SUCCESS: i32 = 0;
/// Process exit code for internal errors (bad config, invalid state).
pub const EXIT_INTERNAL_ERROR: i32 = 1;
/// Process exit code when the deploy action failed.
pub const EXIT_DEPLOYMENT_FAILED: i32 = 2;
/// Process exit code when verification reported failing cases.
pub const EXIT_VERIFICATION_FAILED: i32 = 3;
/// Process exit code when the profile's credential could not be resolved.
pub const EXIT_CREDENTIAL_FAILED: i32 = 4;

/// States of a single run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Idle,
    Resolving,
    Deploying,
    Verifying,
    Done,
}

impl PipelineState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineState::Idle => "idle",
            PipelineState::Resolving => "resolving",
            PipelineState::Deploying => "deploying",
            PipelineState::Verifying => "verifying",
            PipelineState::Done => "done",
        }
    }

    /// Whether `self → next` is a legal transition. No state is re-entered.
    pub fn can_transition_to(self, next: PipelineState) -> bool {
        use PipelineState::*;
        matches!(
            (self, next),
            (Idle, Resolving)
                | (Resolving, Deploying)
                | (Resolving, Done)
                | (Deploying, Verifying)
                | (Deploying, Done)
                | (Verifying, Done)
        )
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal status of a run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    /// Deployed and verified.
    Success,
    /// Trigger selected no profile; nothing ran.
    NoOp,
    /// Credential for the profile could not be resolved; nothing deployed.
    CredentialFailed,
    /// Deploy action exited non-zero; verification skipped.
    DeploymentFailed,
    /// Deployed, but the test suite reported failing cases.
    VerificationFailed,
}

impl OutcomeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutcomeStatus::Success => "success",
            OutcomeStatus::NoOp => "no_op",
            OutcomeStatus::CredentialFailed => "credential_failed",
            OutcomeStatus::DeploymentFailed => "deployment_failed",
            OutcomeStatus::VerificationFailed => "verification_failed",
        }
    }

    /// Process exit code for this status.
    pub fn exit_code(&self) -> i32 {
        match self {
            OutcomeStatus::Success | OutcomeStatus::NoOp => EXIT_SUCCESS,
            OutcomeStatus::DeploymentFailed => EXIT_DEPLOYMENT_FAILED,
            OutcomeStatus::VerificationFailed => EXIT_VERIFICATION_FAILED,
            OutcomeStatus::CredentialFailed => EXIT_CREDENTIAL_FAILED,
        }
    }

    pub fn is_failure(&self) -> bool {
        !matches!(self, OutcomeStatus::Success | OutcomeStatus::NoOp)
    }
}

impl fmt::Display for OutcomeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal value of one run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PipelineOutcome {
    pub run_id: Uuid,
    pub trigger: Trigger,
    pub status: OutcomeStatus,

    /// Environment the trigger resolved to, if any.
    pub environment: Option<EnvironmentName>,

    pub deployment: Option<DeploymentResult>,

    /// `None` for no-ops; `Skipped` when deployment did not succeed.
    pub verification: Option<TestRunResult>,

    /// Stage failure message, `None` on success and no-op.
    pub failure: Option<String>,

    pub journal: Vec<PipelineEvent>,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
}

impl PipelineOutcome {
    pub fn exit_code(&self) -> i32 {
        self.status.exit_code()
    }

    pub fn succeeded(&self) -> bool {
        self.status == OutcomeStatus::Success
    }

    /// One-line triage message: which stage, which code or count.
    pub fn diagnostic(&self) -> String {
        match self.status {
            OutcomeStatus::Success => format!(
                "deployed to {} and verified",
                self.environment.map(|e| e.as_str()).unwrap_or("?")
            ),
            OutcomeStatus::NoOp => format!(
                "no-op: {} on '{}' selects no environment",
                self.trigger.event_kind, self.trigger.branch
            ),
            _ => self
                .failure
                .clone()
                .unwrap_or_else(|| self.status.to_string()),
        }
    }
}

/// Mutable state of one in-flight run. Never reused.
struct PipelineRun {
    run_id: Uuid,
    trigger: Trigger,
    state: PipelineState,
    journal: RunJournal,
    started_at: DateTime<Utc>,
    start: Instant,
    environment: Option<EnvironmentName>,
    deployment: Option<DeploymentResult>,
    verification: Option<TestRunResult>,
}

impl PipelineRun {
    fn new(trigger: Trigger) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            trigger,
            state: PipelineState::Idle,
            journal: RunJournal::new(),
            started_at: Utc::now(),
            start: Instant::now(),
            environment: None,
            deployment: None,
            verification: None,
        }
    }

    fn advance(&mut self, next: PipelineState) -> Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(PromoteError::InvalidTransition {
                current: self.state.to_string(),
                requested: next.to_string(),
            });
        }
        self.journal.record(
            "state_changed",
            json!({ "from": self.state.as_str(), "to": next.as_str() }),
        );
        self.state = next;
        Ok(())
    }

    fn finish(mut self, status: OutcomeStatus, failure: Option<String>) -> Result<PipelineOutcome> {
        self.advance(PipelineState::Done)?;
        let duration_ms = self.start.elapsed().as_millis() as u64;
        self.journal.record(
            "pipeline_finished",
            json!({
                "status": status.as_str(),
                "exit_code": status.exit_code(),
                "duration_ms": duration_ms,
            }),
        );
        obs::emit_pipeline_finished(
            &self.run_id.to_string(),
            status.as_str(),
            duration_ms,
            status.exit_code(),
        );

        Ok(PipelineOutcome {
            run_id: self.run_id,
            trigger: self.trigger,
            status,
            environment: self.environment,
            deployment: self.deployment,
            verification: self.verification,
            failure,
            journal: self.journal.into_events(),
            started_at: self.started_at,
            duration_ms,
        })
    }
}

/// Sequences resolver, invoker and gate for each trigger.
///
/// The controller holds only immutable configuration and shared
/// capabilities; every call to [`PipelineController::run`] starts a fresh
/// run, so runs for different branches can proceed concurrently.
#[derive(Clone)]
pub struct PipelineController {
    registry: ProfileRegistry,
    invoker: DeploymentInvoker,
    gate: VerificationGate,
}

impl PipelineController {
    pub fn new(
        registry: ProfileRegistry,
        credentials: Arc<dyn CredentialStore>,
        deploy: Arc<dyn DeployAction>,
        tests: Arc<dyn TestRunner>,
    ) -> Self {
        Self {
            registry,
            invoker: DeploymentInvoker::new(deploy, credentials),
            gate: VerificationGate::new(tests),
        }
    }

    pub fn registry(&self) -> &ProfileRegistry {
        &self.registry
    }

    /// Profile `trigger` would deploy to, without running anything.
    pub fn resolve(&self, trigger: &Trigger) -> Option<EnvironmentProfile> {
        TriggerResolver::resolve(&self.registry, trigger)
    }

    /// Execute one run for `trigger`.
    ///
    /// Stage failures are reported in the returned outcome. `Err` is reserved
    /// for internal faults such as an illegal state transition.
    pub async fn run(&self, trigger: Trigger) -> Result<PipelineOutcome> {
        let run = PipelineRun::new(trigger);
        let span = obs::run_span(&run.run_id.to_string());
        self.execute(run).instrument(span).await
    }

    async fn execute(&self, mut run: PipelineRun) -> Result<PipelineOutcome> {
        let trigger = run.trigger.clone();
        let run_id = run.run_id.to_string();

        obs::emit_pipeline_started(&run_id, &trigger.branch, &trigger.event_kind.to_string());
        run.journal.record(
            "trigger_received",
            json!({ "branch": &trigger.branch, "event_kind": trigger.event_kind }),
        );

        run.advance(PipelineState::Resolving)?;
        let profile = match self.resolve(&trigger) {
            Some(profile) => profile,
            None => {
                let reason = if trigger.event_kind != EventKind::Push {
                    "event is not a push"
                } else {
                    "branch is not registered"
                };
                obs::emit_pipeline_no_op(&trigger.branch, reason);
                run.journal.record(
                    "trigger_ignored",
                    json!({ "branch": &trigger.branch, "reason": reason }),
                );
                return run.finish(OutcomeStatus::NoOp, None);
            }
        };

        obs::emit_pipeline_resolved(&trigger.branch, profile.name.as_str());
        run.environment = Some(profile.name);
        run.journal.record(
            "profile_resolved",
            json!({
                "environment": profile.name,
                "workspace_host": &profile.workspace_host,
                "catalog": &profile.catalog,
                "schema": &profile.schema,
            }),
        );

        run.advance(PipelineState::Deploying)?;
        let deployment = match self.invoker.invoke(&profile).await {
            Ok(deployment) => deployment,
            Err(e @ PromoteError::CredentialResolution { .. }) => {
                obs::emit_credential_failed(profile.name.as_str(), &e.to_string());
                run.journal.record(
                    "credential_failed",
                    json!({
                        "environment": profile.name,
                        "error": e.to_string(),
                    }),
                );
                run.verification = Some(TestRunResult::skipped("credential resolution failed"));
                return run.finish(OutcomeStatus::CredentialFailed, Some(e.to_string()));
            }
            Err(e) => return Err(e),
        };

        run.journal.record(
            "deploy_finished",
            json!({
                "status": deployment.status,
                "exit_code": deployment.exit_code,
                "artifacts": &deployment.artifacts,
                "registered_model": &deployment.registered_model,
                "duration_ms": deployment.duration_ms,
            }),
        );

        if !deployment.succeeded() {
            let verification = self.gate.verify(&profile, &deployment).await;
            run.journal.record(
                "verify_skipped",
                json!({ "reason": verification.detail }),
            );
            let failure = PromoteError::DeploymentFailure {
                environment: profile.name.to_string(),
                exit_code: deployment.exit_code,
            };
            run.deployment = Some(deployment);
            run.verification = Some(verification);
            return run.finish(OutcomeStatus::DeploymentFailed, Some(failure.to_string()));
        }

        run.advance(PipelineState::Verifying)?;
        let verification = self.gate.verify(&profile, &deployment).await;
        run.deployment = Some(deployment);
        run.journal.record(
            "verify_finished",
            json!({
                "status": verification.status,
                "failing_case_count": verification.failing_case_count,
                "total_cases": verification.total_cases,
                "exit_code": verification.exit_code,
            }),
        );

        let (status, failure) = if verification.passed() {
            (OutcomeStatus::Success, None)
        } else {
            let failure = PromoteError::VerificationFailure {
                environment: profile.name.to_string(),
                failing_cases: verification.failing_case_count,
            };
            (OutcomeStatus::VerificationFailed, Some(failure.to_string()))
        };
        run.verification = Some(verification);
        run.finish(status, failure)
    }
}
