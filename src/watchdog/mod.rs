//! Availability watchdog for the primary suppression mechanism
//!
//! Polls whether the primary automation is installed, on a two-tier
//! cadence: a fast interval while checking starts, escalating to a slower
//! interval after 30 consecutive unchanged checks. Availability events
//! are edge-triggered. Polling self-terminates once the automation is
//! present; forced re-checks (after an unexpected primary failure) keep
//! working and resume polling from the fast cadence if the automation
//! disappeared.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Availability check for the primary suppression mechanism
#[async_trait]
pub trait AvailabilityCheck: Send + Sync {
    /// Is the primary mechanism currently installed and invokable?
    async fn check(&self) -> bool;
}

#[async_trait]
impl<F> AvailabilityCheck for F
where
    F: Fn() -> bool + Send + Sync,
{
    async fn check(&self) -> bool {
        self()
    }
}

/// Edge-triggered availability transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AvailabilityEvent {
    /// The primary mechanism became installed and invokable
    Available,
    /// The primary mechanism disappeared
    Lost,
}

/// Two-tier check cadence
#[derive(Debug, Clone)]
pub struct CheckCadence {
    /// Interval while checking starts or right after a transition
    pub fast: Duration,
    /// Interval after escalation
    pub slow: Duration,
    /// Consecutive unchanged checks before escalating
    pub escalate_after: u32,
    /// Upper bound for a single check; a check that exceeds it reads as
    /// not installed
    pub check_timeout: Duration,
}

/// Watchdog owning the availability state
pub struct AvailabilityWatchdog {
    checker: Box<dyn AvailabilityCheck>,
    cadence: CheckCadence,
    /// Consecutive checks without a transition
    unchanged_checks: u32,
    /// Published availability; single writer is this watchdog
    available_tx: watch::Sender<bool>,
    event_tx: mpsc::Sender<AvailabilityEvent>,
}

impl AvailabilityWatchdog {
    pub fn new(
        checker: Box<dyn AvailabilityCheck>,
        cadence: CheckCadence,
        available_tx: watch::Sender<bool>,
        event_tx: mpsc::Sender<AvailabilityEvent>,
    ) -> Self {
        Self {
            checker,
            cadence,
            unchanged_checks: 0,
            available_tx,
            event_tx,
        }
    }

    pub fn is_available(&self) -> bool {
        *self.available_tx.borrow()
    }

    /// Run one availability check and reconcile the state.
    ///
    /// The availability event fires only on an actual transition;
    /// repeated checks with an unchanged result are silent. The check is
    /// bounded so a hung external command cannot stall the watchdog.
    pub async fn check_now(&mut self) -> bool {
        let now = match timeout(self.cadence.check_timeout, self.checker.check()).await {
            Ok(now) => now,
            Err(_) => {
                warn!("availability check timed out, treating as not installed");
                false
            }
        };
        let was = self.is_available();

        if now == was {
            self.unchanged_checks = self.unchanged_checks.saturating_add(1);
            return now;
        }

        self.unchanged_checks = 0;
        self.available_tx.send_replace(now);

        let event = if now {
            AvailabilityEvent::Available
        } else {
            AvailabilityEvent::Lost
        };
        info!(available = now, "automation availability changed");
        if self.event_tx.try_send(event).is_err() {
            warn!(?event, "failed to deliver availability event");
        }

        now
    }

    /// Current polling interval under the two-tier cadence
    fn current_interval(&self) -> Duration {
        if self.unchanged_checks >= self.cadence.escalate_after {
            self.cadence.slow
        } else {
            self.cadence.fast
        }
    }

    /// Drive the watchdog until the re-check channel closes.
    ///
    /// While the automation is available no periodic polling happens; the
    /// watchdog only reacts to forced re-checks from the actuator. A lost
    /// transition resumes polling from the fast cadence.
    pub async fn run(&mut self, mut recheck_rx: mpsc::Receiver<()>) {
        info!("availability watchdog started");

        loop {
            if self.is_available() {
                match recheck_rx.recv().await {
                    Some(()) => {
                        debug!("forced availability re-check");
                        self.check_now().await;
                    }
                    None => break,
                }
            } else {
                tokio::select! {
                    _ = tokio::time::sleep(self.current_interval()) => {
                        self.check_now().await;
                    }
                    request = recheck_rx.recv() => match request {
                        Some(()) => {
                            debug!("forced availability re-check");
                            self.check_now().await;
                        }
                        None => break,
                    }
                }
            }
        }

        info!("availability watchdog stopped");
    }
}
