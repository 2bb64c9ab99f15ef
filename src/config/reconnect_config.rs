use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Automatic reconnection with exponential backoff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    /// Reconnect when a session ends.
    pub enabled: bool,

    /// Reconnects allowed without reaching the Active state in between (0 = unlimited).
    pub max_attempts: u32,

    /// Delay before the first reconnect, in milliseconds.
    pub base_delay_ms: u64,

    /// Upper bound for any single delay, in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_attempts: 10,
            base_delay_ms: 5_000,
            max_delay_ms: 600_000,
        }
    }
}

impl ReconnectConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    /// Compute `min(base * 2^(attempt-1), max)` for a 1-indexed attempt.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let cap = self.max_delay();
        let exponent = attempt.saturating_sub(1);
        2u32.checked_pow(exponent)
            .and_then(|factor| self.base_delay().checked_mul(factor))
            .map_or(cap, |delay| delay.min(cap))
    }

    /// Check whether the given 1-indexed attempt is still allowed.
    pub fn should_attempt_reconnect(&self, attempt: u32) -> bool {
        self.max_attempts == 0 || attempt <= self.max_attempts
    }
}
