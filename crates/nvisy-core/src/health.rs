//! Provider health reporting.
//!
//! Health checks run once at startup and before a provider is scheduled after
//! a period of failures. The selector only skips providers whose last report
//! is [`ServiceStatus::Unhealthy`]; degraded providers stay eligible.

use std::time::Duration;

use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display};

/// Represents the operational status of a provider.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[derive(AsRefStr, Display)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ServiceStatus {
    /// Provider is operating normally.
    #[default]
    Healthy,
    /// Provider answered but reported a problem, e.g. a missing language pack.
    Degraded,
    /// Provider cannot be used: binary missing, endpoint unreachable.
    Unhealthy,
}

/// Health information for a provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceHealth {
    /// Current status.
    pub status: ServiceStatus,
    /// How long the check took.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency: Option<Duration>,
    /// Optional message describing the current state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// When the check was performed.
    pub checked_at: Timestamp,
}

impl ServiceHealth {
    fn with_status(status: ServiceStatus, message: Option<String>) -> Self {
        Self {
            status,
            latency: None,
            message,
            checked_at: Timestamp::now(),
        }
    }

    /// Creates a new healthy report.
    pub fn healthy() -> Self {
        Self::with_status(ServiceStatus::Healthy, None)
    }

    /// Creates a new degraded report.
    pub fn degraded(message: impl Into<String>) -> Self {
        Self::with_status(ServiceStatus::Degraded, Some(message.into()))
    }

    /// Creates a new unhealthy report.
    pub fn unhealthy(message: impl Into<String>) -> Self {
        Self::with_status(ServiceStatus::Unhealthy, Some(message.into()))
    }

    /// Sets the latency of this health check.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Returns `true` when the provider may be scheduled.
    pub fn is_available(&self) -> bool {
        self.status != ServiceStatus::Unhealthy
    }
}

impl Default for ServiceHealth {
    fn default() -> Self {
        Self::healthy()
    }
}
