//! Verification gate: decides whether to run the environment's test suite
//! and interprets its outcome.

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, OnceLock};
use tracing::{debug, warn};

use crate::deploy::DeploymentResult;
use crate::error::Result;
use crate::obs;
use crate::process::{run_command, CommandSpec};
use crate::profile::EnvironmentProfile;

/// Verification status.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TestStatus {
    Passed,
    Failed,
    Skipped,
}

/// Raw report from a test runner.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TestRunReport {
    pub failing_case_count: u32,
    pub total_cases: Option<u32>,
    pub exit_code: Option<i32>,
    pub output: String,
    pub duration_ms: u64,
}

/// Interpreted outcome of the verification stage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TestRunResult {
    pub status: TestStatus,
    pub failing_case_count: u32,
    pub total_cases: Option<u32>,
    pub exit_code: Option<i32>,
    pub duration_ms: u64,

    /// Why the stage was skipped or errored.
    pub detail: Option<String>,
}

impl TestRunResult {
    /// Result for a gate that never ran.
    pub fn skipped(reason: impl Into<String>) -> Self {
        Self {
            status: TestStatus::Skipped,
            failing_case_count: 0,
            total_cases: None,
            exit_code: None,
            duration_ms: 0,
            detail: Some(reason.into()),
        }
    }

    /// Passed iff the report has zero failing cases.
    pub fn from_report(report: TestRunReport) -> Self {
        let status = if report.failing_case_count == 0 {
            TestStatus::Passed
        } else {
            TestStatus::Failed
        };
        Self {
            status,
            failing_case_count: report.failing_case_count,
            total_cases: report.total_cases,
            exit_code: report.exit_code,
            duration_ms: report.duration_ms,
            detail: None,
        }
    }

    pub fn passed(&self) -> bool {
        self.status == TestStatus::Passed
    }
}

/// Request handed to a test runner.
#[derive(Debug, Clone)]
pub struct TestRequest {
    pub profile: EnvironmentProfile,
}

impl TestRequest {
    /// Environment variables exposed to the test runner. No credentials.
    pub fn env_vars(&self) -> Vec<(&'static str, String)> {
        let p = &self.profile;
        vec![
            ("DATABRICKS_HOST", p.workspace_host.clone()),
            ("DEPLOY_ENV", p.name.as_str().to_string()),
            ("CATALOG", p.catalog.clone()),
            ("SCHEMA", p.schema.clone()),
            ("MODEL_NAME", p.registered_model_name()),
            ("TEST_PATH", p.test_path.clone()),
        ]
    }
}

/// External test-running engine.
#[async_trait]
pub trait TestRunner: Send + Sync {
    async fn run(&self, request: &TestRequest) -> Result<TestRunReport>;
}

/// Test runner backed by an external command (pytest, cargo test, ...).
#[derive(Debug, Clone)]
pub struct CommandTestRunner {
    spec: CommandSpec,
}

impl CommandTestRunner {
    pub fn new(spec: CommandSpec) -> Self {
        Self { spec }
    }
}

#[async_trait]
impl TestRunner for CommandTestRunner {
    async fn run(&self, request: &TestRequest) -> Result<TestRunReport> {
        let args = self.spec.render(&request.profile);
        debug!(command = ?args, environment = %request.profile.name, "Invoking test command");
        let output = run_command(&self.spec, &args, &request.env_vars()).await?;

        let combined = format!("{}\n{}", output.stdout, output.stderr);
        let counts = parse_test_counts(&combined);
        let failing_case_count = failing_cases(output.exit_code, counts.failed);
        let total_cases = counts
            .passed
            .map(|passed| passed + counts.failed.unwrap_or(0));

        Ok(TestRunReport {
            failing_case_count,
            total_cases,
            exit_code: Some(output.exit_code),
            output: combined,
            duration_ms: output.duration_ms,
        })
    }
}

/// Counts scraped from a test runner's summary lines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TestCounts {
    pub passed: Option<u32>,
    pub failed: Option<u32>,
}

fn failed_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b(\d+) (?:failed|errors?)\b").expect("valid regex"))
}

fn passed_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b(\d+) passed\b").expect("valid regex"))
}

/// Sum the `N passed` / `N failed` / `N error(s)` counts in `output`.
///
/// Understands pytest (`2 failed, 10 passed in 1.2s`) and cargo test
/// (`test result: FAILED. 10 passed; 2 failed; ...`) summaries; multiple
/// summary lines are added together.
pub fn parse_test_counts(output: &str) -> TestCounts {
    fn sum(re: &Regex, text: &str) -> Option<u32> {
        let mut total = None;
        for cap in re.captures_iter(text) {
            if let Ok(n) = cap[1].parse::<u32>() {
                total = Some(total.unwrap_or(0) + n);
            }
        }
        total
    }

    TestCounts {
        passed: sum(passed_re(), output),
        failed: sum(failed_re(), output),
    }
}

/// Failing-case count implied by an exit code and the parsed count.
///
/// Reported failures count even when the runner exits 0. A non-zero exit
/// always counts at least one failing case, even when the output has no
/// parseable summary.
pub fn failing_cases(exit_code: i32, parsed_failed: Option<u32>) -> u32 {
    let parsed = parsed_failed.unwrap_or(0);
    if exit_code == 0 {
        parsed
    } else {
        parsed.max(1)
    }
}

/// Runs the test suite after a successful deployment.
#[derive(Clone)]
pub struct VerificationGate {
    runner: Arc<dyn TestRunner>,
}

impl VerificationGate {
    pub fn new(runner: Arc<dyn TestRunner>) -> Self {
        Self { runner }
    }

    /// Verify the environment `deployment` just updated.
    ///
    /// A failed deployment is never verified: the runner is not called and
    /// the result is `Skipped`. A runner error counts as one failing case.
    /// Nothing is rolled back on failure.
    pub async fn verify(
        &self,
        profile: &EnvironmentProfile,
        deployment: &DeploymentResult,
    ) -> TestRunResult {
        if !deployment.succeeded() {
            obs::emit_verify_skipped(profile.name.as_str(), deployment.exit_code);
            return TestRunResult::skipped(format!(
                "deployment failed with exit code {}",
                deployment.exit_code
            ));
        }

        obs::emit_verify_started(profile.name.as_str(), &profile.test_path);

        let request = TestRequest {
            profile: profile.clone(),
        };
        let result = match self.runner.run(&request).await {
            Ok(report) => TestRunResult::from_report(report),
            Err(e) => {
                warn!(environment = %profile.name, error = %e, "Test runner errored");
                TestRunResult {
                    status: TestStatus::Failed,
                    failing_case_count: 1,
                    total_cases: None,
                    exit_code: None,
                    duration_ms: 0,
                    detail: Some(e.to_string()),
                }
            }
        };

        obs::emit_verify_finished(
            profile.name.as_str(),
            result.failing_case_count,
            result.passed(),
        );
        result
    }
}
