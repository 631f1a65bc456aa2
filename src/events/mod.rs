//! Events emitted by the monitor loop
//!
//! Structured event types for monitoring lifecycle, suppression
//! transitions, and automation availability changes. Consumed by the
//! IPC server to keep the status indicator in sync.

use serde::{Deserialize, Serialize};

/// Events emitted by the monitor loop during reconciliation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MonitorEvent {
    /// The periodic tick timer is running
    MonitoringStarted,

    /// The periodic tick timer was cancelled
    MonitoringStopped,

    /// Suppression was applied because the input device became active
    SuppressionEngaged,

    /// Suppression was released because the input device went quiet
    SuppressionReleased {
        /// Duration in milliseconds that suppression was engaged
        engaged_ms: u64,
    },

    /// Every suppression stage failed; the transition is retried next tick
    SuppressionFailed {
        /// Whether the failed attempt was engaging (true) or releasing
        engage: bool,
    },

    /// The primary automation became installed and invokable
    AutomationAvailable,

    /// The primary automation disappeared
    AutomationLost,

    /// A toggle was requested while the primary automation is not installed
    AutomationMissing,
}

impl std::fmt::Display for MonitorEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MonitorEvent::MonitoringStarted => write!(f, "MONITORING_STARTED"),
            MonitorEvent::MonitoringStopped => write!(f, "MONITORING_STOPPED"),
            MonitorEvent::SuppressionEngaged => write!(f, "SUPPRESSION_ENGAGED"),
            MonitorEvent::SuppressionReleased { engaged_ms } => {
                write!(f, "SUPPRESSION_RELEASED ({}ms)", engaged_ms)
            }
            MonitorEvent::SuppressionFailed { engage } => {
                write!(f, "SUPPRESSION_FAILED (engage={})", engage)
            }
            MonitorEvent::AutomationAvailable => write!(f, "AUTOMATION_AVAILABLE"),
            MonitorEvent::AutomationLost => write!(f, "AUTOMATION_LOST"),
            MonitorEvent::AutomationMissing => write!(f, "AUTOMATION_MISSING"),
        }
    }
}
