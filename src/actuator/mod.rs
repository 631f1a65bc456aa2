//! Suppression actuator
//!
//! Turns suppression mode on/off through an ordered fallback chain of
//! external mechanisms. Each stage is tried only after the previous one
//! failed; success is strictly an explicit positive confirmation (exit
//! code 0) for every stage, never the mere absence of an error.

mod chain;
mod provider;
mod stages;

pub use chain::ActuatorChain;
pub use provider::{platform_provider, MechanismProvider};
pub use stages::{AutomationListChecker, AutomationStage, BannerSwitchChecker, CommandStage};

use async_trait::async_trait;

/// Errors from a single fallback stage
#[derive(Debug, thiserror::Error)]
pub enum StageError {
    #[error("failed to run {program}: {source}")]
    Io {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to stage the input parameter: {0}")]
    InputParam(std::io::Error),

    #[error("exited with {0}")]
    NonZeroExit(std::process::ExitStatus),

    #[error("timed out after {0:?}")]
    TimedOut(std::time::Duration),
}

/// Error returned once every stage in the chain has failed
#[derive(Debug, thiserror::Error)]
pub enum ActuatorError {
    #[error("all {attempted} suppression stages failed (engage={engage})")]
    Exhausted { attempted: usize, engage: bool },
}

/// One mechanism in the ordered fallback chain
#[async_trait]
pub trait SuppressionStage: Send + Sync {
    /// Short identifier used in logs
    fn name(&self) -> &'static str;

    /// Apply "suppression on" (`true`) or "suppression off" (`false`)
    async fn apply(&self, enable: bool) -> Result<(), StageError>;
}

/// Interface the monitor loop drives on state transitions
#[async_trait]
pub trait Actuator: Send {
    /// Apply the requested suppression state, falling back through the
    /// chain until a stage succeeds
    async fn apply(&mut self, enable: bool) -> Result<(), ActuatorError>;
}
