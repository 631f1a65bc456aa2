//! IPC message protocol definitions
//!
//! All messages are JSON-encoded, prefixed with a 4-byte little-endian
//! length. After a `subscribe` request is acknowledged the connection
//! carries only push notifications.

use serde::{Deserialize, Serialize};

use crate::events::MonitorEvent;

/// Icon state for the status indicator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndicatorState {
    /// Grayed out: ticks are not running
    NotMonitoring,
    /// Monitoring, input device quiet
    Monitoring,
    /// Monitoring and suppression engaged
    Active,
}

impl IndicatorState {
    /// Derive the icon from the daemon's observable state
    pub fn derive(monitoring: bool, engaged: bool) -> Self {
        match (monitoring, engaged) {
            (false, _) => IndicatorState::NotMonitoring,
            (true, false) => IndicatorState::Monitoring,
            (true, true) => IndicatorState::Active,
        }
    }
}

/// Requests from the status indicator to the daemon
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    /// Request current daemon status
    GetStatus,

    /// User toggled monitoring from the indicator menu
    ToggleMonitoring,

    /// User chose quit; the daemon disengages and exits
    Shutdown,

    /// Ping to check connectivity
    Ping,

    /// Subscribe to push notifications
    Subscribe,
}

/// Responses from daemon to the indicator
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    /// Current daemon status
    Status(DaemonStatus),

    /// Request accepted
    Ack,

    /// Pong response to ping
    Pong,

    /// Subscription confirmed
    Subscribed,

    /// Error response
    Error { code: String, message: String },
}

/// Push notification for subscribed clients
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    /// A monitor event occurred
    Event(MonitorEvent),

    /// The indicator icon should change
    IconChanged { icon: IndicatorState },
}

/// Full daemon status snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonStatus {
    /// Daemon version
    pub version: String,

    /// Whether the tick timer is running
    pub monitoring: bool,

    /// Whether suppression is currently engaged
    pub engaged: bool,

    /// Whether the primary automation is installed
    pub automation_available: bool,

    /// Icon the indicator should show
    pub icon: IndicatorState,

    /// Uptime in seconds
    pub uptime_secs: u64,
}

impl Default for DaemonStatus {
    fn default() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            monitoring: false,
            engaged: false,
            automation_available: false,
            icon: IndicatorState::NotMonitoring,
            uptime_secs: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_serialization() {
        let req = Request::ToggleMonitoring;
        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains("toggle_monitoring"));
    }

    #[test]
    fn test_status_serialization() {
        let resp = Response::Status(DaemonStatus::default());
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("status"));
        assert!(json.contains("not_monitoring"));
    }

    #[test]
    fn test_indicator_derivation() {
        assert_eq!(
            IndicatorState::derive(false, false),
            IndicatorState::NotMonitoring
        );
        // Suppression left engaged after a failed disengage still shows
        // as not monitoring once stopped.
        assert_eq!(
            IndicatorState::derive(false, true),
            IndicatorState::NotMonitoring
        );
        assert_eq!(
            IndicatorState::derive(true, false),
            IndicatorState::Monitoring
        );
        assert_eq!(IndicatorState::derive(true, true), IndicatorState::Active);
    }
}
