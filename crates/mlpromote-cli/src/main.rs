//! mlpromote - branch-triggered ML promotion pipeline CLI
//!
//! ## Commands
//!
//! - `run`: Resolve a push, deploy to the matching environment and verify it
//! - `resolve`: Show which environment a branch would deploy to
//! - `profiles`: List the branch → environment registry
//! - `validate`: Check a configuration file without running anything

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, Level};

use mlpromote_core::pipeline::EXIT_INTERNAL_ERROR;
use mlpromote_core::{
    render_summary_md, write_outcome_json, CliDeployAction, CommandTestRunner,
    EnvCredentialStore, EventKind, PipelineConfig, PipelineController, PipelineOutcome, Trigger,
};

#[derive(Parser)]
#[command(name = "mlpromote")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Branch-triggered deploy-and-verify pipeline for ML artifacts", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Pipeline configuration file (default: built-in dev/stage/prod profiles)
    #[arg(short, long, global = true, env = "MLPROMOTE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the pipeline for one trigger
    Run {
        /// Branch name or full ref (falls back to GITHUB_REF_NAME)
        #[arg(short, long, env = "MLPROMOTE_BRANCH")]
        branch: Option<String>,

        /// Event name (falls back to GITHUB_EVENT_NAME, then "push")
        #[arg(short, long, env = "MLPROMOTE_EVENT")]
        event: Option<String>,

        /// Write the outcome as JSON to this path
        #[arg(long)]
        report: Option<PathBuf>,

        /// Write a markdown summary to this path
        #[arg(long)]
        summary: Option<PathBuf>,
    },

    /// Show the environment a branch resolves to
    Resolve {
        /// Branch name or full ref (refs/heads/<branch>)
        branch: String,
    },

    /// List registered branches and their environments
    Profiles,

    /// Validate the configuration and exit
    Validate,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    mlpromote_core::init_tracing(cli.json, level);

    let code = match dispatch(cli).await {
        Ok(code) => code,
        Err(e) => {
            error!(error = %format!("{:#}", e), "mlpromote failed");
            eprintln!("Error: {:#}", e);
            EXIT_INTERNAL_ERROR
        }
    };
    std::process::exit(code);
}

/// Execute the selected command and return the process exit code.
async fn dispatch(cli: Cli) -> Result<i32> {
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Run {
            branch,
            event,
            report,
            summary,
        } => {
            let trigger = trigger_from_args(branch, event)?;
            cmd_run(
                &config,
                trigger,
                report.as_deref(),
                summary.as_deref(),
                cli.json,
            )
            .await
        }
        Commands::Resolve { branch } => cmd_resolve(&config, &branch, cli.json).map(|_| 0),
        Commands::Profiles => cmd_profiles(&config, cli.json).map(|_| 0),
        Commands::Validate => cmd_validate(&config, cli.config.as_deref()).map(|_| 0),
    }
}

fn load_config(path: Option<&Path>) -> Result<PipelineConfig> {
    match path {
        Some(path) => PipelineConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display())),
        None => Ok(PipelineConfig::default()),
    }
}

fn build_controller(config: &PipelineConfig) -> Result<PipelineController> {
    let registry = config.registry().context("Invalid profile registry")?;
    Ok(PipelineController::new(
        registry,
        Arc::new(EnvCredentialStore::with_prefix(
            config.credentials.env_prefix.clone(),
        )),
        Arc::new(CliDeployAction::new(config.deploy.clone())),
        Arc::new(CommandTestRunner::new(config.verify.clone())),
    ))
}

/// Build the trigger from flags, falling back to the GitHub Actions context.
fn trigger_from_args(branch: Option<String>, event: Option<String>) -> Result<Trigger> {
    let branch = match branch.or_else(|| std::env::var("GITHUB_REF_NAME").ok()) {
        Some(branch) if !branch.trim().is_empty() => branch,
        _ => anyhow::bail!("No branch given (use --branch, MLPROMOTE_BRANCH or GITHUB_REF_NAME)"),
    };
    let event = event
        .or_else(|| std::env::var("GITHUB_EVENT_NAME").ok())
        .unwrap_or_else(|| "push".to_string());
    Ok(Trigger::from_git_ref(
        branch.trim(),
        EventKind::from_event_name(&event),
    ))
}

/// Run one trigger and return the process exit code.
async fn cmd_run(
    config: &PipelineConfig,
    trigger: Trigger,
    report: Option<&Path>,
    summary: Option<&Path>,
    json: bool,
) -> Result<i32> {
    let controller = build_controller(config)?;

    info!(branch = %trigger.branch, event = %trigger.event_kind, "starting promotion run");
    let outcome = controller
        .run(trigger)
        .await
        .context("Pipeline run aborted")?;

    if let Some(path) = report {
        write_outcome_json(path, &outcome)
            .with_context(|| format!("Failed to write report {}", path.display()))?;
    }
    if let Some(path) = summary {
        std::fs::write(path, render_summary_md(&outcome))
            .with_context(|| format!("Failed to write summary {}", path.display()))?;
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        print_outcome(&outcome);
    }

    Ok(outcome.exit_code())
}

fn print_outcome(outcome: &PipelineOutcome) {
    println!("Run ID: {}", outcome.run_id);
    println!(
        "Trigger: {} on {}",
        outcome.trigger.event_kind, outcome.trigger.branch
    );
    match outcome.environment {
        Some(env) => println!("Environment: {}", env),
        None => println!("Environment: none"),
    }
    println!();

    if let Some(deployment) = &outcome.deployment {
        let status = if deployment.succeeded() { "✓" } else { "✗" };
        println!(
            "  {} deploy ({}ms, exit code: {})",
            status, deployment.duration_ms, deployment.exit_code
        );
        for artifact in &deployment.artifacts {
            println!(
                "      {} {}",
                artifact.path,
                artifact.sha256.as_deref().unwrap_or("(missing)")
            );
        }
        println!("      model: {}", deployment.registered_model);
    }
    if let Some(verification) = &outcome.verification {
        let status = if verification.passed() { "✓" } else { "✗" };
        match &verification.detail {
            Some(detail) => println!(
                "  {} verify ({}): {}",
                status, verification.failing_case_count, detail
            ),
            None => println!(
                "  {} verify ({} failing)",
                status, verification.failing_case_count
            ),
        }
    }

    println!();
    let mark = if outcome.succeeded() {
        "✓"
    } else if outcome.status.is_failure() {
        "✗"
    } else {
        "-"
    };
    println!("Result: {} {}", mark, outcome.diagnostic());
    println!("Exit code: {}", outcome.exit_code());
}

fn cmd_resolve(config: &PipelineConfig, branch: &str, json: bool) -> Result<()> {
    let controller = build_controller(config)?;
    let trigger = Trigger::from_git_ref(branch, EventKind::Push);

    match controller.resolve(&trigger) {
        Some(profile) if json => println!("{}", serde_json::to_string_pretty(&profile)?),
        Some(profile) => {
            println!("Branch: {}", trigger.branch);
            println!("Environment: {}", profile.name);
            println!("Workspace: {}", profile.workspace_host);
            println!("Catalog/schema: {}.{}", profile.catalog, profile.schema);
            println!("Model: {}@{}", profile.registered_model_name(), profile.model_alias());
            println!("Artifacts:");
            for artifact in profile.artifacts() {
                println!("  {}", artifact);
            }
            println!("Tests: {}", profile.test_path);
        }
        None if json => println!("null"),
        None => println!("Branch '{}' is not registered; a push would be a no-op", trigger.branch),
    }
    Ok(())
}

fn cmd_profiles(config: &PipelineConfig, json: bool) -> Result<()> {
    let registry = config.registry().context("Invalid profile registry")?;

    if json {
        let entries: Vec<_> = registry
            .iter()
            .map(|(branch, profile)| {
                serde_json::json!({
                    "branch": branch,
                    "environment": profile.name,
                    "workspace_host": &profile.workspace_host,
                    "catalog": &profile.catalog,
                    "schema": &profile.schema,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    println!("{:<20} {:<8} {}", "BRANCH", "ENV", "WORKSPACE");
    for (branch, profile) in registry.iter() {
        println!(
            "{:<20} {:<8} {}",
            branch,
            profile.name.as_str(),
            profile.workspace_host
        );
    }
    Ok(())
}

fn cmd_validate(config: &PipelineConfig, path: Option<&Path>) -> Result<()> {
    config.validate().context("Configuration is invalid")?;
    let source = path
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "built-in defaults".to_string());
    println!(
        "✓ {} is valid ({} profiles, {} branches)",
        source,
        config.profiles.len(),
        config.registry()?.len()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_run_args_parse() {
        let cli = Cli::try_parse_from([
            "mlpromote",
            "--json",
            "run",
            "--branch",
            "refs/heads/stage",
            "--report",
            "out.json",
        ])
        .unwrap();
        assert!(cli.json);
        match cli.command {
            Commands::Run {
                branch,
                event,
                report,
                summary,
            } => {
                assert_eq!(branch.as_deref(), Some("refs/heads/stage"));
                assert_eq!(event, None);
                assert_eq!(report, Some(PathBuf::from("out.json")));
                assert!(summary.is_none());
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn test_trigger_from_args_strips_ref() {
        let trigger = trigger_from_args(
            Some("refs/heads/main".to_string()),
            Some("pull_request".to_string()),
        )
        .unwrap();
        assert_eq!(trigger.branch, "main");
        assert_eq!(trigger.event_kind, EventKind::Other);
    }

    #[test]
    fn test_load_config_defaults_without_path() {
        let config = load_config(None).unwrap();
        let registry = config.registry().unwrap();
        assert!(registry.contains("dev"));
        assert!(registry.contains("stage"));
        assert!(registry.contains("prod"));
        assert!(!registry.contains("main"));
    }

    #[test]
    fn test_load_config_missing_file() {
        let err = load_config(Some(Path::new("/nonexistent/mlpromote.toml"))).unwrap_err();
        assert!(format!("{:#}", err).contains("cannot read"));
    }

    #[tokio::test]
    async fn test_cmd_run_unregistered_branch_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let report = dir.path().join("outcome.json");
        let summary = dir.path().join("summary.md");
        let config = PipelineConfig::default();

        let code = cmd_run(
            &config,
            Trigger::push("feature/new-model"),
            Some(&report),
            Some(&summary),
            false,
        )
        .await
        .unwrap();

        assert_eq!(code, 0);
        let outcome: PipelineOutcome =
            serde_json::from_str(&std::fs::read_to_string(&report).unwrap()).unwrap();
        assert!(outcome.deployment.is_none());
        assert!(std::fs::read_to_string(&summary)
            .unwrap()
            .contains("feature/new-model"));
    }

    #[tokio::test]
    async fn test_cmd_run_missing_credential_exits_4() {
        let mut config = PipelineConfig::default();
        config.credentials.env_prefix = "MLPROMOTE_CLI_TEST_UNSET_".to_string();
        // The deploy command would fail loudly if it were ever reached.
        config.deploy.command = vec!["false".to_string()];

        let code = cmd_run(&config, Trigger::push("dev"), None, None, true)
            .await
            .unwrap();
        assert_eq!(code, 4);
    }

    #[tokio::test]
    async fn test_dispatch_exit_codes() {
        let cli = Cli::try_parse_from(["mlpromote", "profiles"]).unwrap();
        assert_eq!(dispatch(cli).await.unwrap(), 0);

        let cli = Cli::try_parse_from([
            "mlpromote",
            "--config",
            "/nonexistent/mlpromote.toml",
            "validate",
        ])
        .unwrap();
        assert!(dispatch(cli).await.is_err());
    }

    #[test]
    fn test_cmd_validate_defaults() {
        cmd_validate(&PipelineConfig::default(), None).unwrap();
    }
}
