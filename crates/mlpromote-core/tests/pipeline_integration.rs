//! Integration tests for the promotion pipeline with in-memory fakes.

use mlpromote_core::fakes::{ScriptedDeployAction, ScriptedTestRunner, StaticCredentialStore};
use mlpromote_core::{
    CliDeployAction, CommandSpec, CommandTestRunner, EnvironmentName, EnvironmentProfile,
    EventKind, OutcomeStatus, PipelineConfig, PipelineController, ProfileRegistry, TestStatus,
    Trigger,
};
use std::sync::Arc;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

struct Harness {
    controller: PipelineController,
    deploy: Arc<ScriptedDeployAction>,
    tests: Arc<ScriptedTestRunner>,
}

fn harness_with(
    registry: ProfileRegistry,
    deploy: ScriptedDeployAction,
    tests: ScriptedTestRunner,
) -> Harness {
    let deploy = Arc::new(deploy);
    let tests = Arc::new(tests);
    let controller = PipelineController::new(
        registry,
        Arc::new(StaticCredentialStore::for_all_environments()),
        deploy.clone(),
        tests.clone(),
    );
    Harness {
        controller,
        deploy,
        tests,
    }
}

fn harness(deploy: ScriptedDeployAction, tests: ScriptedTestRunner) -> Harness {
    harness_with(ProfileRegistry::builtin(), deploy, tests)
}

/// Registry where `main` is a production alias.
fn registry_with_main_alias() -> ProfileRegistry {
    ProfileRegistry::from_entries(vec![
        (
            vec!["dev".to_string()],
            EnvironmentProfile::builtin(EnvironmentName::Dev),
        ),
        (
            vec!["stage".to_string()],
            EnvironmentProfile::builtin(EnvironmentName::Stage),
        ),
        (
            vec!["prod".to_string(), "main".to_string()],
            EnvironmentProfile::builtin(EnvironmentName::Prod),
        ),
    ])
    .expect("registry")
}

fn journal_kinds(outcome: &mlpromote_core::PipelineOutcome) -> Vec<&str> {
    outcome.journal.iter().map(|e| e.kind.as_str()).collect()
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

/// Test: dev push deploys, verifies with zero failing cases, succeeds
#[tokio::test]
async fn test_dev_push_success() {
    let h = harness(ScriptedDeployAction::succeeding(), ScriptedTestRunner::passing());

    let outcome = h
        .controller
        .run(Trigger::push("dev"))
        .await
        .expect("run failed");

    assert_eq!(outcome.status, OutcomeStatus::Success);
    assert_eq!(outcome.exit_code(), 0);
    assert_eq!(outcome.environment, Some(EnvironmentName::Dev));
    assert!(outcome.failure.is_none());

    let deployment = outcome.deployment.as_ref().expect("deployment");
    assert_eq!(deployment.exit_code, 0);
    assert_eq!(
        deployment.artifacts_deployed,
        vec!["notebooks/train.py", "notebooks/inference.py"]
    );

    let verification = outcome.verification.as_ref().expect("verification");
    assert_eq!(verification.status, TestStatus::Passed);
    assert_eq!(verification.failing_case_count, 0);

    let calls = h.deploy.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].profile.catalog, "dev_catalog");
    assert_eq!(calls[0].token, "token-dev");
    assert_eq!(h.tests.call_count(), 1);
}

/// Test: main push (production alias) with failing deploy skips verification
#[tokio::test]
async fn test_main_push_deploy_failure_skips_verification() {
    let h = harness_with(
        registry_with_main_alias(),
        ScriptedDeployAction::exiting(1),
        ScriptedTestRunner::passing(),
    );

    let outcome = h
        .controller
        .run(Trigger::push("main"))
        .await
        .expect("run failed");

    assert_eq!(outcome.status, OutcomeStatus::DeploymentFailed);
    assert_ne!(outcome.exit_code(), 0);
    assert_eq!(outcome.environment, Some(EnvironmentName::Prod));
    assert_eq!(outcome.deployment.as_ref().unwrap().exit_code, 1);
    assert_eq!(
        outcome.verification.as_ref().unwrap().status,
        TestStatus::Skipped
    );
    assert!(outcome.diagnostic().contains("exit code 1"));

    assert_eq!(h.deploy.call_count(), 1);
    assert_eq!(h.tests.call_count(), 0, "gate must not run after failed deploy");
}

/// Test: a failed deployment reports nothing as deployed
#[tokio::test]
async fn test_failed_deployment_reports_no_deployed_artifacts() {
    let h = harness(ScriptedDeployAction::exiting(1), ScriptedTestRunner::passing());

    let outcome = h
        .controller
        .run(Trigger::push("dev"))
        .await
        .expect("run failed");

    let deployment = outcome.deployment.as_ref().unwrap();
    assert_eq!(outcome.status, OutcomeStatus::DeploymentFailed);
    assert!(deployment.artifacts_deployed.is_empty());
    assert_eq!(deployment.artifacts.len(), 2);
}

/// Test: feature branch push is a no-op with no side effects
#[tokio::test]
async fn test_feature_branch_is_no_op() {
    let h = harness(ScriptedDeployAction::succeeding(), ScriptedTestRunner::passing());

    let outcome = h
        .controller
        .run(Trigger::push("feature/x"))
        .await
        .expect("run failed");

    assert_eq!(outcome.status, OutcomeStatus::NoOp);
    assert_eq!(outcome.exit_code(), 0);
    assert!(outcome.environment.is_none());
    assert!(outcome.deployment.is_none());
    assert!(outcome.verification.is_none());
    assert_eq!(h.deploy.call_count(), 0);
    assert_eq!(h.tests.call_count(), 0);
    assert!(journal_kinds(&outcome).contains(&"trigger_ignored"));
}

/// Test: non-push event on a registered branch is a no-op
#[tokio::test]
async fn test_non_push_event_is_no_op() {
    let h = harness(ScriptedDeployAction::succeeding(), ScriptedTestRunner::passing());

    let outcome = h
        .controller
        .run(Trigger::new("prod", EventKind::Other))
        .await
        .expect("run failed");

    assert_eq!(outcome.status, OutcomeStatus::NoOp);
    assert_eq!(h.deploy.call_count(), 0);
}

/// Test: failing cases fail the run but nothing is rolled back
#[tokio::test]
async fn test_verification_failure_keeps_deployment() {
    let h = harness(ScriptedDeployAction::succeeding(), ScriptedTestRunner::failing(2));

    let outcome = h
        .controller
        .run(Trigger::push("stage"))
        .await
        .expect("run failed");

    assert_eq!(outcome.status, OutcomeStatus::VerificationFailed);
    assert_eq!(outcome.exit_code(), 3);
    assert!(outcome.deployment.as_ref().unwrap().succeeded());
    let verification = outcome.verification.as_ref().unwrap();
    assert_eq!(verification.status, TestStatus::Failed);
    assert_eq!(verification.failing_case_count, 2);
    assert!(outcome.diagnostic().contains("2 failing case(s)"));

    // Exactly one deploy call: no rollback or re-deploy follows.
    assert_eq!(h.deploy.call_count(), 1);
}

/// Test: missing credential stops the run before deploying
#[tokio::test]
async fn test_missing_credential_never_deploys() {
    let deploy = Arc::new(ScriptedDeployAction::succeeding());
    let tests = Arc::new(ScriptedTestRunner::passing());
    let controller = PipelineController::new(
        ProfileRegistry::builtin(),
        Arc::new(StaticCredentialStore::new().with_secret("DATABRICKS_TOKEN_DEV", "t")),
        deploy.clone(),
        tests.clone(),
    );

    let outcome = controller
        .run(Trigger::push("prod"))
        .await
        .expect("run failed");

    assert_eq!(outcome.status, OutcomeStatus::CredentialFailed);
    assert_eq!(outcome.exit_code(), 4);
    assert!(outcome.deployment.is_none());
    assert_eq!(
        outcome.verification.as_ref().unwrap().status,
        TestStatus::Skipped
    );
    let failure = outcome.failure.as_ref().unwrap();
    assert!(failure.contains("prod"));
    assert!(!failure.contains("DATABRICKS_TOKEN_PROD"));
    assert_eq!(deploy.call_count(), 0);
    assert_eq!(tests.call_count(), 0);
}

/// Test: deploy action errors are reported as a failed deployment
#[tokio::test]
async fn test_deploy_action_error_is_failure() {
    let h = harness(
        ScriptedDeployAction::erroring("databricks: command not found"),
        ScriptedTestRunner::passing(),
    );

    let outcome = h
        .controller
        .run(Trigger::push("dev"))
        .await
        .expect("run failed");

    assert_eq!(outcome.status, OutcomeStatus::DeploymentFailed);
    let deployment = outcome.deployment.as_ref().unwrap();
    assert_eq!(deployment.exit_code, -1);
    assert!(deployment.stderr.contains("command not found"));
    assert_eq!(h.tests.call_count(), 0);
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

/// Test: each environment resolves only its own scope
#[tokio::test]
async fn test_environments_never_cross_contaminate() {
    let h = harness(ScriptedDeployAction::succeeding(), ScriptedTestRunner::passing());

    for env in EnvironmentName::ALL {
        let outcome = h
            .controller
            .run(Trigger::push(env.as_str()))
            .await
            .expect("run failed");
        assert_eq!(outcome.environment, Some(env));
    }

    let calls = h.deploy.calls();
    assert_eq!(calls.len(), 3);
    for call in &calls {
        let env = call.profile.name.as_str();
        assert_eq!(call.profile.catalog, format!("{}_catalog", env));
        assert_eq!(call.token, format!("token-{}", env));
    }

    let tested: Vec<String> = h.tests.calls().iter().map(|p| p.test_path.clone()).collect();
    assert_eq!(tested, vec!["tests/dev", "tests/stage", "tests/prod"]);
}

/// Test: unregistered branches never invoke deploy or test
#[tokio::test]
async fn test_unregistered_branches_have_no_side_effects() {
    let h = harness(ScriptedDeployAction::succeeding(), ScriptedTestRunner::passing());

    for branch in ["main", "feature/x", "release/1.0", "Dev", "refs/heads/dev"] {
        let outcome = h
            .controller
            .run(Trigger::push(branch))
            .await
            .expect("run failed");
        assert_eq!(outcome.status, OutcomeStatus::NoOp, "branch {}", branch);
    }

    assert_eq!(h.deploy.call_count(), 0);
    assert_eq!(h.tests.call_count(), 0);
}

/// Test: journal records the state machine in order
#[tokio::test]
async fn test_journal_records_state_transitions() {
    let h = harness(ScriptedDeployAction::succeeding(), ScriptedTestRunner::passing());

    let outcome = h
        .controller
        .run(Trigger::push("dev"))
        .await
        .expect("run failed");

    let transitions: Vec<(String, String)> = outcome
        .journal
        .iter()
        .filter(|e| e.kind == "state_changed")
        .map(|e| {
            (
                e.payload["from"].as_str().unwrap().to_string(),
                e.payload["to"].as_str().unwrap().to_string(),
            )
        })
        .collect();

    let expected: Vec<(String, String)> = [
        ("idle", "resolving"),
        ("resolving", "deploying"),
        ("deploying", "verifying"),
        ("verifying", "done"),
    ]
    .iter()
    .map(|(from, to)| (from.to_string(), to.to_string()))
    .collect();
    assert_eq!(transitions, expected);

    let seqs: Vec<u64> = outcome.journal.iter().map(|e| e.seq).collect();
    let expected_seqs: Vec<u64> = (1..=outcome.journal.len() as u64).collect();
    assert_eq!(seqs, expected_seqs);
    assert_eq!(journal_kinds(&outcome).last(), Some(&"pipeline_finished"));
}

/// Test: neither the secret nor its reference is persisted in the outcome
#[tokio::test]
async fn test_outcome_never_contains_secret_or_reference() {
    let h = harness(ScriptedDeployAction::succeeding(), ScriptedTestRunner::passing());

    let outcome = h
        .controller
        .run(Trigger::push("prod"))
        .await
        .expect("run failed");

    let json = serde_json::to_string(&outcome).expect("serialize");
    assert!(!json.contains("token-prod"));
    assert!(!json.contains("DATABRICKS_TOKEN_PROD"));
}

/// Test: a credential failure does not persist the reference either
#[tokio::test]
async fn test_credential_failure_outcome_omits_reference() {
    let controller = PipelineController::new(
        ProfileRegistry::builtin(),
        Arc::new(StaticCredentialStore::new()),
        Arc::new(ScriptedDeployAction::succeeding()),
        Arc::new(ScriptedTestRunner::passing()),
    );

    let outcome = controller
        .run(Trigger::push("stage"))
        .await
        .expect("run failed");

    assert_eq!(outcome.status, OutcomeStatus::CredentialFailed);
    let json = serde_json::to_string(&outcome).expect("serialize");
    assert!(!json.contains("DATABRICKS_TOKEN_STAGE"));
}

/// Test: each run is a fresh instance with its own id
#[tokio::test]
async fn test_runs_are_independent() {
    let h = harness(ScriptedDeployAction::succeeding(), ScriptedTestRunner::passing());

    let a = h.controller.run(Trigger::push("dev")).await.expect("run a");
    let b = h.controller.run(Trigger::push("dev")).await.expect("run b");

    assert_ne!(a.run_id, b.run_id);
    assert_eq!(a.journal.len(), b.journal.len());
}

/// Test: runs for different branches can proceed concurrently
#[tokio::test]
async fn test_concurrent_runs_for_different_branches() {
    let h = harness(
        ScriptedDeployAction::succeeding().with_exit_code_for(EnvironmentName::Stage, 7),
        ScriptedTestRunner::passing(),
    );

    let (dev, stage) = tokio::join!(
        h.controller.run(Trigger::push("dev")),
        h.controller.run(Trigger::push("stage")),
    );
    let dev = dev.expect("dev run");
    let stage = stage.expect("stage run");

    assert_eq!(dev.status, OutcomeStatus::Success);
    assert_eq!(stage.status, OutcomeStatus::DeploymentFailed);
    assert_eq!(stage.deployment.as_ref().unwrap().exit_code, 7);
    assert_eq!(h.tests.call_count(), 1);
}

// ---------------------------------------------------------------------------
// Process-backed actions
// ---------------------------------------------------------------------------

fn sh(script: &str) -> CommandSpec {
    CommandSpec::new(vec!["sh".to_string(), "-c".to_string(), script.to_string()])
}

/// Test: end-to-end run with real commands
#[tokio::test]
async fn test_command_backed_pipeline() {
    let controller = PipelineController::new(
        ProfileRegistry::builtin(),
        Arc::new(StaticCredentialStore::for_all_environments()),
        Arc::new(CliDeployAction::new(sh(
            "test \"$DEPLOY_ENV\" = stage && test \"$MODEL_ALIAS\" = stage",
        ))),
        Arc::new(CommandTestRunner::new(sh(
            "echo '=== 1 failed, 4 passed in 0.02s ==='; exit 1",
        ))),
    );

    let outcome = controller
        .run(Trigger::push("stage"))
        .await
        .expect("run failed");

    assert_eq!(outcome.status, OutcomeStatus::VerificationFailed);
    let verification = outcome.verification.as_ref().unwrap();
    assert_eq!(verification.failing_case_count, 1);
    assert_eq!(verification.total_cases, Some(5));
}

/// Test: configuration file drives the registry and commands
#[tokio::test]
async fn test_pipeline_from_config() {
    let config = PipelineConfig::from_toml_str(
        r#"
[deploy]
command = ["sh", "-c", "test \"$CATALOG\" = analytics_dev"]

[verify]
command = ["sh", "-c", "echo '5 passed'"]

[[profiles]]
name = "dev"
branches = ["develop"]
workspace_host = "https://adb-1.azuredatabricks.net"
credential_ref = "DATABRICKS_TOKEN_DEV"
catalog = "analytics_dev"
schema = "ml"
train_artifact_path = "jobs/train.py"
inference_artifact_path = "jobs/infer.py"
"#,
    )
    .expect("config");

    let controller = PipelineController::new(
        config.registry().expect("registry"),
        Arc::new(StaticCredentialStore::for_all_environments()),
        Arc::new(CliDeployAction::new(config.deploy.clone())),
        Arc::new(CommandTestRunner::new(config.verify.clone())),
    );

    let outcome = controller
        .run(Trigger::push("develop"))
        .await
        .expect("run failed");
    assert_eq!(outcome.status, OutcomeStatus::Success, "{}", outcome.diagnostic());
    assert_eq!(
        outcome.deployment.as_ref().unwrap().registered_model,
        "analytics_dev.ml.wine_quality"
    );

    let ignored = controller
        .run(Trigger::push("dev"))
        .await
        .expect("run failed");
    assert_eq!(ignored.status, OutcomeStatus::NoOp);
}
