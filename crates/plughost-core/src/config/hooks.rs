//! Hook dispatch defaults.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Defaults applied when a dispatch does not override them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HooksConfig {
    /// Per-hook timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub default_timeout_ms: u64,
    /// Additional attempts after a failed handler invocation.
    #[serde(default)]
    pub default_max_retries: u32,
    /// Delay between retry attempts in milliseconds.
    #[serde(default = "default_retry_delay_ms")]
    pub default_retry_delay_ms: u64,
    /// Upper bound accepted for `max_retries` in dispatch options.
    #[serde(default = "default_max_retries_limit")]
    pub max_retries_limit: u32,
}

impl HooksConfig {
    /// Default per-hook timeout.
    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }

    /// Default delay between retries.
    pub fn default_retry_delay(&self) -> Duration {
        Duration::from_millis(self.default_retry_delay_ms)
    }
}

impl Default for HooksConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: default_timeout_ms(),
            default_max_retries: 0,
            default_retry_delay_ms: default_retry_delay_ms(),
            max_retries_limit: default_max_retries_limit(),
        }
    }
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_retry_delay_ms() -> u64 {
    1_000
}

fn default_max_retries_limit() -> u32 {
    10
}
