//! Log sinks for [`Server::with_logger`](crate::Server::with_logger).
//!
//! Nothing here installs a global subscriber. The returned
//! [`Dispatch`] is handed to the server, which scopes it to its own tasks.

use std::str::FromStr;
use tracing::Dispatch;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format {other:?}")),
        }
    }
}

/// Builds a stdout subscriber. `RUST_LOG` takes precedence over
/// `default_filter`.
pub fn subscriber(format: LogFormat, default_filter: &str) -> Dispatch {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => Dispatch::new(
            registry.with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_target(true),
            ),
        ),
        LogFormat::Pretty => Dispatch::new(
            registry.with(
                tracing_subscriber::fmt::layer()
                    .pretty()
                    .with_target(true)
                    .with_thread_ids(false),
            ),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_parse_case_insensitively() {
        assert_eq!("JSON".parse::<LogFormat>(), Ok(LogFormat::Json));
        assert_eq!("pretty".parse::<LogFormat>(), Ok(LogFormat::Pretty));
        assert!("xml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn subscriber_applies_default_filter() {
        if std::env::var_os("RUST_LOG").is_some() {
            return;
        }
        let dispatch = subscriber(LogFormat::Json, "switchyard=info");
        tracing::dispatcher::with_default(&dispatch, || {
            assert!(tracing::enabled!(target: "switchyard", tracing::Level::INFO));
            assert!(!tracing::enabled!(target: "switchyard", tracing::Level::TRACE));
        });
    }
}
