//! Tracing setup for the `mlpromote` CLI.
//!
//! Logs always go to stderr: `mlpromote run --json` prints the outcome on
//! stdout and CI steps capture it, so log lines must never interleave with
//! it. Without `RUST_LOG`, only mlpromote's own crates log at the requested
//! level; dependencies stay at `warn`.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Filter directives used when `RUST_LOG` is not set.
pub fn default_filter(level: Level) -> String {
    let level = level.as_str().to_ascii_lowercase();
    format!("warn,mlpromote_core={level},mlpromote={level}")
}

/// Initialise the global tracing subscriber.
///
/// * `json`: emit newline-delimited JSON with event fields flattened, so
///   `event = "deploy.finished"` is a top-level key.
/// * `level`: verbosity for mlpromote's crates when `RUST_LOG` is not set.
///
/// Only the first call takes effect.
pub fn init_tracing(json: bool, level: Level) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(level)));

    if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .json()
                    .flatten_event(true)
                    .with_current_span(true)
                    .with_writer(std::io::stderr),
            )
            .try_init()
            .ok();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .try_init()
            .ok();
    }
}
