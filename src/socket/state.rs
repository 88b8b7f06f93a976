//! Connection state machine and reconnect policy.

use std::fmt;
use std::time::Duration;

use serde::Serialize;

/// Lifecycle of one socket client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// No transport exists
    Idle,
    /// Transport creation in flight
    Connecting,
    /// Transport ready; frames flow both ways
    Open,
    /// Transport closed or failed; a reconnect may be pending
    Closed,
}

impl ConnectionState {
    /// Transition table. Any state may return to `Idle` through `disconnect()`.
    pub fn can_transition_to(self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        matches!(
            (self, next),
            (_, Idle)
                | (Idle, Connecting)
                | (Closed, Connecting)
                | (Connecting, Open)
                | (Connecting, Closed)
                | (Open, Closed)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Idle => "idle",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Open => "open",
            ConnectionState::Closed => "closed",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Exponential backoff with a hard attempt cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub base_delay: Duration,
    pub max_attempts: u32,
}

impl ReconnectPolicy {
    pub fn new(base_delay: Duration, max_attempts: u32) -> Self {
        Self {
            base_delay,
            max_attempts,
        }
    }

    /// Delay before reconnect attempt `attempt` (1-indexed): `base * 2^(attempt-1)`.
    /// `None` past the cap.
    pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 || attempt > self.max_attempts {
            return None;
        }
        let factor = 2u32.checked_pow(attempt - 1).unwrap_or(u32::MAX);
        Some(self.base_delay.saturating_mul(factor))
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::new(Duration::from_millis(1000), 5)
    }
}
