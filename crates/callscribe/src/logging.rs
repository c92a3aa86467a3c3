//! Tracing subscriber setup for the binary.
//!
//! `RUST_LOG` filters (default `callscribe=info`). Output is JSON when
//! requested on the command line or with `CALLSCRIBE_LOG_FORMAT=json`.
//! Records from the `log` facade are forwarded into tracing.

use clap::ValueEnum;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl LogFormat {
    /// `CALLSCRIBE_LOG_FORMAT`, when set to a known value.
    pub fn from_env() -> Option<Self> {
        let value = std::env::var("CALLSCRIBE_LOG_FORMAT").ok()?;
        if value.eq_ignore_ascii_case("json") {
            Some(LogFormat::Json)
        } else if value.eq_ignore_ascii_case("text") {
            Some(LogFormat::Text)
        } else {
            None
        }
    }
}

/// Installs the global subscriber. Later calls are no-ops.
pub fn init(format: LogFormat) {
    if tracing_log::LogTracer::init().is_err() {
        return;
    }

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("callscribe=info"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true);

    let _ = match format {
        LogFormat::Json => tracing::subscriber::set_global_default(builder.json().finish()),
        LogFormat::Text => tracing::subscriber::set_global_default(builder.finish()),
    };
}
