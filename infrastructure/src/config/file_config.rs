//! Raw TOML configuration data types.
//!
//! These structs represent the exact structure of the host's TOML config
//! file (§6 — "no CLI, env-var, or persisted-state layout is defined by
//! the core", so this is an ambient convenience the host wires in, not a
//! core engine concern). Deserialized directly, then read by the CLI to
//! configure the notification manager and HTTP client.

use serde::{Deserialize, Serialize};

/// Default HTTP timeouts for webhook dispatch and engine-level requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FileHttpConfig {
    pub timeout_seconds: u64,
}

impl Default for FileHttpConfig {
    fn default() -> Self {
        Self { timeout_seconds: 5 }
    }
}

/// Default notification retry schedule, overriding §4.9's baked-in
/// `[1s, 5s, 30s, 120s, 300s]` schedule.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FileNotificationConfig {
    pub default_retries: u32,
    pub retry_schedule_seconds: Vec<u64>,
}

impl Default for FileNotificationConfig {
    fn default() -> Self {
        Self {
            default_retries: 3,
            retry_schedule_seconds: vec![1, 5, 30, 120, 300],
        }
    }
}

/// Logging verbosity and output shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FileLoggingConfig {
    /// `error`, `warn`, `info`, `debug`, or `trace`.
    pub level: String,
    pub json: bool,
}

impl Default for FileLoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Complete file configuration (raw TOML structure).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub http: FileHttpConfig,
    pub notifications: FileNotificationConfig,
    pub logging: FileLoggingConfig,
}
