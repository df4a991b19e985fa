//! Run reports: JSON outcome artifact and markdown step summary.

use std::path::Path;

use crate::error::Result;
use crate::pipeline::{OutcomeStatus, PipelineOutcome};
use crate::verify::TestStatus;

/// Write the outcome as pretty JSON.
pub fn write_outcome_json(path: &Path, outcome: &PipelineOutcome) -> Result<()> {
    let content = serde_json::to_string_pretty(outcome)?;
    std::fs::write(path, content)?;
    Ok(())
}

/// Render a markdown summary for CI step output.
pub fn render_summary_md(outcome: &PipelineOutcome) -> String {
    let mut out = String::new();
    let badge = if outcome.succeeded() {
        "✅"
    } else if outcome.status.is_failure() {
        "❌"
    } else {
        "⏭️"
    };
    out.push_str(&format!("# {} Promotion {}\n\n", badge, outcome.status));
    out.push_str(&format!(
        "- run: `{}`\n- trigger: {} on `{}`\n- environment: {}\n- exit code: {}\n",
        outcome.run_id,
        outcome.trigger.event_kind,
        outcome.trigger.branch,
        outcome
            .environment
            .map(|e| e.as_str())
            .unwrap_or("none"),
        outcome.exit_code(),
    ));
    out.push_str(&format!("- result: {}\n\n", outcome.diagnostic()));

    if let Some(deployment) = &outcome.deployment {
        out.push_str("## Deployment\n");
        out.push_str(&format!(
            "- status: {:?}\n- exit code: {}\n- model: `{}`\n- duration: {}ms\n",
            deployment.status,
            deployment.exit_code,
            deployment.registered_model,
            deployment.duration_ms
        ));
        out.push_str("\n| artifact | sha256 |\n|---|---|\n");
        for artifact in &deployment.artifacts {
            let digest = artifact
                .sha256
                .as_deref()
                .map(|d| &d[..12.min(d.len())])
                .unwrap_or("-");
            out.push_str(&format!("| `{}` | `{}` |\n", artifact.path, digest));
        }
        out.push('\n');
    }

    if let Some(verification) = &outcome.verification {
        out.push_str("## Verification\n");
        match verification.status {
            TestStatus::Skipped => {
                out.push_str(&format!(
                    "- skipped: {}\n",
                    verification.detail.as_deref().unwrap_or("not run")
                ));
            }
            _ => {
                out.push_str(&format!(
                    "- status: {:?}\n- failing cases: {}\n",
                    verification.status, verification.failing_case_count
                ));
                if let Some(total) = verification.total_cases {
                    out.push_str(&format!("- total cases: {}\n", total));
                }
                if let Some(detail) = &verification.detail {
                    out.push_str(&format!("- detail: {}\n", detail));
                }
            }
        }
        if outcome.status == OutcomeStatus::VerificationFailed {
            out.push_str("\nArtifacts remain deployed; re-run after fixing the failing cases.\n");
        }
    }

    out
}
