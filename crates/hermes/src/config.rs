//! Configuration for the Hermes trigger worker

use std::env;

use registrar::config::ConfigError;

/// Hermes configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Environment (development, staging, production)
    pub environment: String,

    /// Emit JSON log lines instead of human-readable ones
    pub json_logs: bool,

    /// Shared engine and database settings
    pub app: registrar::Config,

    /// Polling schedule
    pub schedules: ScheduleConfig,
}

/// Cron schedule configuration
#[derive(Debug, Clone)]
pub struct ScheduleConfig {
    /// Cron expression for the due-trigger sweep (default: every 30 seconds)
    pub trigger_poll: String,

    /// Maximum triggers processed per sweep
    pub batch_size: i64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            trigger_poll: "*/30 * * * * *".to_string(),
            batch_size: 50,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let defaults = ScheduleConfig::default();

        let batch_size = match env::var("TRIGGER_BATCH_SIZE") {
            Ok(raw) => match raw.parse::<i64>() {
                Ok(n) if n > 0 => n,
                _ => return Err(ConfigError::InvalidValue("TRIGGER_BATCH_SIZE".to_string())),
            },
            Err(_) => defaults.batch_size,
        };

        Ok(Self {
            environment: env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
            json_logs: env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json")),
            app: registrar::Config::from_env()?,
            schedules: ScheduleConfig {
                trigger_poll: env::var("TRIGGER_POLL_CRON").unwrap_or(defaults.trigger_poll),
                batch_size,
            },
        })
    }
}
