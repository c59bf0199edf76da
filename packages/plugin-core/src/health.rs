//! Plugin health reporting.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::clock::now_millis;

/// Coarse health of a plugin and the dependencies it relies on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HealthState {
    Up,
    Down,
    Degraded,
    Unknown,
}

impl HealthState {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Up => "UP",
            Self::Down => "DOWN",
            Self::Degraded => "DEGRADED",
            Self::Unknown => "UNKNOWN",
        }
    }
}

/// Result of a plugin `health_check`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub state: HealthState,
    pub message: Option<String>,
    pub details: BTreeMap<String, serde_json::Value>,
    /// Epoch milliseconds at which the status was taken.
    pub timestamp: u64,
}

impl HealthStatus {
    #[must_use]
    pub fn new(state: HealthState) -> Self {
        Self {
            state,
            message: None,
            details: BTreeMap::new(),
            timestamp: now_millis(),
        }
    }

    #[must_use]
    pub fn up() -> Self {
        Self::new(HealthState::Up)
    }

    #[must_use]
    pub fn down(message: impl Into<String>) -> Self {
        Self::new(HealthState::Down).with_message(message)
    }

    #[must_use]
    pub fn degraded(message: impl Into<String>) -> Self {
        Self::new(HealthState::Degraded).with_message(message)
    }

    #[must_use]
    pub fn unknown() -> Self {
        Self::new(HealthState::Unknown)
    }

    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    #[must_use]
    pub fn with_detail(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.details.insert(key.into(), value);
        self
    }

    #[must_use]
    pub fn with_timestamp(mut self, millis: u64) -> Self {
        self.timestamp = millis;
        self
    }

    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.state == HealthState::Up
    }

    /// Up or degraded: still able to serve requests.
    #[must_use]
    pub fn is_operational(&self) -> bool {
        matches!(self.state, HealthState::Up | HealthState::Degraded)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn predicates_follow_state() {
        assert!(HealthStatus::up().is_healthy());
        assert!(HealthStatus::up().is_operational());

        let degraded = HealthStatus::degraded("slow core banking");
        assert!(!degraded.is_healthy());
        assert!(degraded.is_operational());

        assert!(!HealthStatus::down("unreachable").is_operational());
        assert!(!HealthStatus::unknown().is_operational());
    }

    #[test]
    fn details_and_message_are_kept() {
        let status = HealthStatus::down("ledger offline")
            .with_detail("latency_ms", json!(5000))
            .with_timestamp(7);
        assert_eq!(status.message.as_deref(), Some("ledger offline"));
        assert_eq!(status.details["latency_ms"], json!(5000));
        assert_eq!(status.timestamp, 7);
        assert_eq!(status.state.as_str(), "DOWN");
    }
}
