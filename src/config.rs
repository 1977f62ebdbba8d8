//! Runtime configuration from environment variables

use std::env;

#[derive(Debug)]
pub enum ConfigError {
    InvalidValue(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::InvalidValue(msg) => write!(f, "Invalid configuration value: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Configuration for the aggregation sink runtime
///
/// Loaded from environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct SinkerConfig {
    /// Path to SQLite database file
    pub db_path: String,

    /// Ring capacity in slots (must be a nonzero power of two)
    pub ring_capacity: usize,

    /// Buffer size of the downstream staging channel
    pub staging_buffer: usize,

    /// How long a resync producer waits for marker acknowledgment (ms)
    pub resync_wait_timeout_ms: u64,
}

impl SinkerConfig {
    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - `AGGFLOW_DB_PATH` (default: data/aggflow.db)
    /// - `SINK_RING_CAPACITY` (default: 32)
    /// - `STAGING_CHANNEL_BUFFER` (default: 1024)
    /// - `RESYNC_WAIT_TIMEOUT_MS` (default: 30000)
    pub fn from_env() -> Self {
        Self {
            db_path: env::var("AGGFLOW_DB_PATH")
                .unwrap_or_else(|_| "data/aggflow.db".to_string()),

            ring_capacity: env::var("SINK_RING_CAPACITY")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(32),

            staging_buffer: env::var("STAGING_CHANNEL_BUFFER")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(1_024),

            resync_wait_timeout_ms: env::var("RESYNC_WAIT_TIMEOUT_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(30_000),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ring_capacity == 0 || !self.ring_capacity.is_power_of_two() {
            return Err(ConfigError::InvalidValue(format!(
                "SINK_RING_CAPACITY must be a nonzero power of two, got {}",
                self.ring_capacity
            )));
        }

        if self.staging_buffer == 0 {
            return Err(ConfigError::InvalidValue(
                "STAGING_CHANNEL_BUFFER cannot be zero".to_string(),
            ));
        }

        Ok(())
    }
}
