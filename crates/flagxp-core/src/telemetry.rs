//! Tracing setup for the flagxp binary.
//!
//! Logs go to stderr so stdout stays free for the run summary.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// HTTP internals that are noisy at DEBUG and say nothing about a run.
const QUIET_TARGETS: &[&str] = &["hyper", "hyper_util", "reqwest", "rustls", "h2"];

/// Filter directives used when `RUST_LOG` is unset: `level` for flagxp and
/// anything else, `warn` for the HTTP stack.
pub fn default_directives(level: Level) -> String {
    let level = level.as_str().to_lowercase();
    QUIET_TARGETS
        .iter()
        .fold(level, |acc, target| format!("{acc},{target}=warn"))
}

/// Install the global subscriber. `RUST_LOG` wins over `level`.
///
/// Returns `false` when a subscriber was already installed; the earlier one
/// stays in place.
pub fn init_tracing(json: bool, level: Level) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(level)));

    let text_layer =
        (!json).then(|| fmt::layer().with_target(false).with_writer(std::io::stderr));
    let json_layer = json.then(|| {
        fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
            .json()
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(text_layer)
        .with(json_layer)
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_directives_quiet_http_stack() {
        let directives = default_directives(Level::DEBUG);
        assert!(directives.starts_with("debug,"));
        assert!(directives.contains("hyper=warn"));
        assert!(directives.contains("reqwest=warn"));
        assert!(directives.parse::<EnvFilter>().is_ok());
    }

    #[test]
    fn second_init_keeps_first_subscriber() {
        init_tracing(false, Level::INFO);
        assert!(!init_tracing(true, Level::DEBUG));
    }
}
