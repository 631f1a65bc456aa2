//! Monitor loop module
//!
//! The orchestrator: a periodic, non-overlapping tick reconciles the
//! probe result against the suppression state and drives the actuator on
//! transitions only.

mod machine;

pub use machine::{MonitorCommand, MonitorLoop, MonitorState};
