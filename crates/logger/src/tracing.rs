use std::env::var;

use tracing::level_filters::LevelFilter;
use tracing_subscriber::{Layer, filter::EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// How chatty the default filter should be when `RUST_LOG` is not set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Verbosity {
    Quiet,
    #[default]
    Normal,
    Debug,
    Trace,
}

impl Verbosity {
    /// Map a repeated `-v` flag count onto a verbosity.
    pub fn from_occurrences(count: u8) -> Self {
        match count {
            0 => Verbosity::Normal,
            1 => Verbosity::Debug,
            _ => Verbosity::Trace,
        }
    }

    fn level(self) -> LevelFilter {
        match self {
            Verbosity::Quiet => LevelFilter::WARN,
            Verbosity::Normal => LevelFilter::INFO,
            Verbosity::Debug => LevelFilter::DEBUG,
            Verbosity::Trace => LevelFilter::TRACE,
        }
    }
}

pub fn init() {
    init_with_verbosity(Verbosity::Normal);
}

/// Initialize the global subscriber.
///
/// `RUST_LOG` overrides the default directive, `RUST_LOG_FORMAT=json` switches
/// to one JSON object per line. Calling this twice is a no-op.
pub fn init_with_verbosity(verbosity: Verbosity) {
    let env_filter =
        EnvFilter::builder().with_default_directive(verbosity.level().into()).from_env_lossy();

    let log_format = var("RUST_LOG_FORMAT").unwrap_or_default();

    let log_layer = match log_format.as_str() {
        "json" => tracing_subscriber::fmt::layer().json().with_filter(env_filter).boxed(),
        _ => tracing_subscriber::fmt::layer()
            .compact()
            .with_target(false)
            .with_filter(env_filter)
            .boxed(),
    };

    // A subscriber may already be installed (tests, embedding).
    let _ = tracing_subscriber::registry().with(log_layer).try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbosity_from_occurrences() {
        assert_eq!(Verbosity::from_occurrences(0), Verbosity::Normal);
        assert_eq!(Verbosity::from_occurrences(1), Verbosity::Debug);
        assert_eq!(Verbosity::from_occurrences(5), Verbosity::Trace);
    }

    #[test]
    fn test_init_twice_does_not_panic() {
        init_with_verbosity(Verbosity::Quiet);
        init();
    }
}
