//! Log subscriber setup for the binary and demos

use tracing_subscriber::{fmt, EnvFilter};

/// Env var that switches log output to one JSON object per line.
pub const LOG_JSON_ENV: &str = "WALLET_SESSION_LOG_JSON";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl LogFormat {
    pub fn from_env() -> Self {
        match std::env::var(LOG_JSON_ENV) {
            Ok(value) if value == "1" => LogFormat::Json,
            _ => LogFormat::Pretty,
        }
    }
}

/// `RUST_LOG` wins; otherwise `info`. Logs go to stderr so stdout stays
/// clean for command output.
pub fn init_logging() {
    init_logging_with(LogFormat::from_env(), "info");
}

pub fn init_logging_with(format: LogFormat, default_filter: &str) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    match format {
        LogFormat::Json => {
            let _ = fmt::Subscriber::builder()
                .with_env_filter(env_filter)
                .json()
                .with_writer(std::io::stderr)
                .try_init();
        }
        LogFormat::Pretty => {
            let _ = fmt::Subscriber::builder()
                .with_env_filter(env_filter)
                .pretty()
                .with_writer(std::io::stderr)
                .try_init();
        }
    }
}
