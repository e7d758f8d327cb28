//! Logging setup for the `rex` binary

use anyhow::anyhow;
use tracing_subscriber::EnvFilter;

/// Parse a level name, falling back to `info`
fn parse_log_level(level: &str) -> tracing::Level {
    match level.to_lowercase().as_str() {
        "off" | "error" => tracing::Level::ERROR,
        "warn" => tracing::Level::WARN,
        "debug" => tracing::Level::DEBUG,
        "trace" => tracing::Level::TRACE,
        _ => tracing::Level::INFO,
    }
}

/// Install the global subscriber
///
/// `RUST_LOG` overrides `level`. With `json` set, events are written as one
/// JSON object per line.
///
/// # Errors
/// Fails if a global subscriber is already installed.
pub fn init_logging(level: &str, json: bool) -> anyhow::Result<()> {
    let env_filter = EnvFilter::builder()
        .with_default_directive(parse_log_level(level).into())
        .from_env_lossy();

    let installed = if json {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .json()
            .with_current_span(true)
            .with_writer(std::io::stderr)
            .try_init()
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .try_init()
    };
    installed.map_err(|e| anyhow!("cannot install log subscriber: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_names() {
        assert_eq!(parse_log_level("DEBUG"), tracing::Level::DEBUG);
        assert_eq!(parse_log_level("off"), tracing::Level::ERROR);
        assert_eq!(parse_log_level("verbose"), tracing::Level::INFO);
    }
}
