//! Structured logging for the replication daemon.
//!
//! A bare level such as `"debug"` applies to the ballotguard crates while
//! the HTTP client stack that carries node RPC stays at `warn`; a full
//! directive string is used as written. `RUST_LOG` overrides both.

use std::str::FromStr;

use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Readable lines for operators at a terminal.
    Human,
    /// Newline-delimited JSON for log shipping.
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "human" | "text" => Ok(Self::Human),
            "json" => Ok(Self::Json),
            other => Err(format!(
                "unknown log format {other:?}, expected \"human\" or \"json\""
            )),
        }
    }
}

/// Every node call goes through these; at debug they log each connection.
const HTTP_STACK: &[&str] = &["hyper", "hyper_util", "h2", "reqwest", "rustls"];

/// Filter directives for a configured `level`.
pub fn filter_directives(level: &str) -> String {
    let level = level.trim();
    if level.contains('=') || level.contains(',') {
        return level.to_string();
    }
    let level = if level.is_empty() { "info" } else { level };
    std::iter::once(level.to_string())
        .chain(HTTP_STACK.iter().map(|target| format!("{target}=warn")))
        .collect::<Vec<_>>()
        .join(",")
}

/// Install the global tracing subscriber. Fails if one is already set.
pub fn init_logging(format: LogFormat, level: &str) -> Result<(), TryInitError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directives(level)));
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Human => registry.with(fmt::layer().with_target(true)).try_init(),
        LogFormat::Json => registry
            .with(fmt::layer().json().with_target(true).with_current_span(false))
            .try_init(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_level_quiets_the_http_stack() {
        let directives = filter_directives("debug");
        assert!(directives.starts_with("debug,"));
        assert!(directives.contains("hyper=warn"));
        assert!(directives.contains("reqwest=warn"));
        assert_eq!(filter_directives(""), filter_directives("info"));
    }

    #[test]
    fn explicit_directives_are_kept() {
        let custom = "info,ballotguard_replicator=trace";
        assert_eq!(filter_directives(custom), custom);
        assert_eq!(filter_directives("hyper=debug"), "hyper=debug");
    }

    #[test]
    fn formats_parse_by_name() {
        assert_eq!("json".parse::<LogFormat>(), Ok(LogFormat::Json));
        assert_eq!(" Human ".parse::<LogFormat>(), Ok(LogFormat::Human));
        assert!("xml".parse::<LogFormat>().is_err());
    }
}
