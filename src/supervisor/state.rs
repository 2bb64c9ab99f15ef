use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::config::ReconnectConfig;

/// Lifecycle state of the supervised session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    /// Not started yet.
    Idle,
    /// A session was created (or a reconnect is scheduled) and has not spawned.
    Connecting,
    Spawned,
    /// Running `/register` and `/login`.
    Authenticating,
    /// Authenticated and in the world.
    Active,
    /// The session was told to end and its `Ended` event is outstanding.
    Ending,
    /// Terminal: reconnects exhausted, disabled, or shut down.
    Stopped,
}

impl fmt::Display for SupervisorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SupervisorState::Idle => "idle",
            SupervisorState::Connecting => "connecting",
            SupervisorState::Spawned => "spawned",
            SupervisorState::Authenticating => "authenticating",
            SupervisorState::Active => "active",
            SupervisorState::Ending => "ending",
            SupervisorState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SupervisorError {
    #[error("giving up after {attempts} reconnect attempts without reaching the server")]
    AttemptsExhausted { attempts: u32 },
}

/// What the supervisor does after a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconnectDecision {
    Retry { attempt: u32, delay: Duration },
    Exhausted(SupervisorError),
}

/// Tracks the attempt counter and applies the backoff policy to it.
#[derive(Debug, Clone)]
pub struct ReconnectState {
    config: ReconnectConfig,
    attempt_count: u32,
}

impl ReconnectState {
    /// Create a new counter for `config`, starting at zero attempts.
    pub fn new(config: ReconnectConfig) -> Self {
        Self {
            config,
            attempt_count: 0,
        }
    }

    pub fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    pub fn config(&self) -> &ReconnectConfig {
        &self.config
    }

    /// Count one ended session and decide whether another one is allowed.
    pub fn record_end(&mut self) -> ReconnectDecision {
        self.attempt_count = self.attempt_count.saturating_add(1);
        let attempt = self.attempt_count;

        if self.config.should_attempt_reconnect(attempt) {
            ReconnectDecision::Retry {
                attempt,
                delay: self.config.delay_for_attempt(attempt),
            }
        } else {
            ReconnectDecision::Exhausted(SupervisorError::AttemptsExhausted {
                attempts: self.config.max_attempts,
            })
        }
    }

    /// Reset the counter. Called on every Active transition.
    pub fn reset(&mut self) {
        self.attempt_count = 0;
    }
}
