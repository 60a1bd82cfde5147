use std::path::PathBuf;

use crate::srs::{FailurePolicy, QueueLimit};

#[derive(Debug, Clone)]
pub struct Config {
    pub database_path: PathBuf,
    pub log_level: String,
    /// Directory for the rolling log file; `None` when file logging is off.
    pub log_dir: Option<PathBuf>,
    pub failure_policy: FailurePolicy,
    pub default_queue_limit: QueueLimit,
}

impl Config {
    pub fn from_env() -> Self {
        let database_path = std::env::var("SRS_DATABASE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./data/srs.db"));

        let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        let log_dir = file_logging_enabled().then(|| {
            std::env::var("LOG_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./logs"))
        });

        let failure_policy = std::env::var("SRS_FAILURE_POLICY")
            .ok()
            .and_then(|value| value.parse::<FailurePolicy>().ok())
            .unwrap_or_default();

        let default_queue_limit = std::env::var("SRS_DEFAULT_QUEUE_LIMIT")
            .ok()
            .and_then(|value| value.parse::<QueueLimit>().ok())
            .unwrap_or(QueueLimit::AtMost(10));

        Self {
            database_path,
            log_level,
            log_dir,
            failure_policy,
            default_queue_limit,
        }
    }
}

fn file_logging_enabled() -> bool {
    std::env::var("ENABLE_FILE_LOGS")
        .map(|v| v == "true" || v == "1")
        .unwrap_or(false)
}
