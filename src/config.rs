use crate::mutator::DEFAULT_FAILURE_MESSAGE;
use std::path::PathBuf;

pub const ENV_LOG: &str = "CASESYNCD_LOG";
pub const ENV_WORKSPACE: &str = "CASESYNCD_WORKSPACE";
pub const ENV_DEFAULT_FAILURE_MESSAGE: &str = "CASESYNCD_DEFAULT_FAILURE_MESSAGE";

/// Workspace setting that overrides the configured failure message.
pub const SETTING_DEFAULT_FAILURE_MESSAGE: &str = "messages.defaultFailure";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub log_filter: Option<String>,
    pub workspace: Option<PathBuf>,
    pub default_failure_message: String,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_blank = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        Self {
            log_filter: non_blank(ENV_LOG),
            workspace: non_blank(ENV_WORKSPACE).map(PathBuf::from),
            default_failure_message: non_blank(ENV_DEFAULT_FAILURE_MESSAGE)
                .unwrap_or_else(|| DEFAULT_FAILURE_MESSAGE.to_string()),
        }
    }
}

pub fn init_logging(config: &Config) {
    use tracing_subscriber::EnvFilter;

    let filter = config
        .log_filter
        .as_deref()
        .and_then(|f| EnvFilter::try_new(f).ok())
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new("info"));

    // stdout carries the protocol.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_writer(std::io::stderr)
        .try_init();
}
