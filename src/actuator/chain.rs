//! Ordered fallback chain over suppression stages
//!
//! The primary stage is skipped while the watchdog reports the automation
//! as unavailable; a primary-stage failure requests an immediate
//! availability re-check, since the automation may have been uninstalled.
//! Every stage invocation is bounded by a timeout so a hung external
//! command cannot stall the tick loop.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::{Actuator, ActuatorError, StageError, SuppressionStage};

/// The suppression actuator: an ordered chain of fallback stages
pub struct ActuatorChain {
    stages: Vec<Box<dyn SuppressionStage>>,
    /// Availability of the primary mechanism, published by the watchdog
    availability: watch::Receiver<bool>,
    /// Signal to the watchdog that the primary mechanism failed unexpectedly
    recheck_tx: mpsc::Sender<()>,
    stage_timeout: Duration,
}

impl ActuatorChain {
    pub fn new(
        stages: Vec<Box<dyn SuppressionStage>>,
        availability: watch::Receiver<bool>,
        recheck_tx: mpsc::Sender<()>,
        stage_timeout: Duration,
    ) -> Self {
        Self {
            stages,
            availability,
            recheck_tx,
            stage_timeout,
        }
    }
}

#[async_trait]
impl Actuator for ActuatorChain {
    async fn apply(&mut self, enable: bool) -> Result<(), ActuatorError> {
        let mut attempted = 0;

        for (index, stage) in self.stages.iter().enumerate() {
            let primary = index == 0;

            // A skipped primary is not a failure; no re-check is requested.
            if primary && !*self.availability.borrow() {
                debug!(stage = stage.name(), "primary automation unavailable, skipping");
                continue;
            }

            attempted += 1;
            let result = match timeout(self.stage_timeout, stage.apply(enable)).await {
                Ok(result) => result,
                Err(_) => Err(StageError::TimedOut(self.stage_timeout)),
            };

            match result {
                Ok(()) => {
                    info!(stage = stage.name(), enable, "suppression stage succeeded");
                    return Ok(());
                }
                Err(e) => {
                    warn!(stage = stage.name(), enable, %e, "suppression stage failed");
                    if primary {
                        if self.recheck_tx.try_send(()).is_err() {
                            debug!("availability re-check already pending");
                        }
                    }
                }
            }
        }

        Err(ActuatorError::Exhausted { attempted, engage: enable })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::process::ExitStatusExt;
    use std::process::ExitStatus;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use tokio_test::assert_ok;

    struct MockStage {
        succeed: bool,
        calls: Arc<AtomicUsize>,
    }

    impl MockStage {
        fn new(succeed: bool) -> (Box<dyn SuppressionStage>, Arc<AtomicUsize>) {
            let calls = Arc::new(AtomicUsize::new(0));
            (
                Box::new(Self {
                    succeed,
                    calls: Arc::clone(&calls),
                }),
                calls,
            )
        }
    }

    #[async_trait]
    impl SuppressionStage for MockStage {
        fn name(&self) -> &'static str {
            "mock"
        }

        async fn apply(&self, _enable: bool) -> Result<(), StageError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.succeed {
                Ok(())
            } else {
                Err(StageError::NonZeroExit(ExitStatus::from_raw(1 << 8)))
            }
        }
    }

    struct HangingStage;

    #[async_trait]
    impl SuppressionStage for HangingStage {
        fn name(&self) -> &'static str {
            "hanging"
        }

        async fn apply(&self, _enable: bool) -> Result<(), StageError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(())
        }
    }

    fn chain_with(
        stages: Vec<Box<dyn SuppressionStage>>,
        available: bool,
    ) -> (ActuatorChain, mpsc::Receiver<()>) {
        // The receiver keeps serving the last value after the sender drops.
        let (_, availability_rx) = watch::channel(available);
        let (recheck_tx, recheck_rx) = mpsc::channel(4);
        (
            ActuatorChain::new(stages, availability_rx, recheck_tx, Duration::from_secs(1)),
            recheck_rx,
        )
    }

    #[tokio::test]
    async fn test_fallback_ordering() {
        let (first, first_calls) = MockStage::new(false);
        let (second, second_calls) = MockStage::new(true);
        let (third, third_calls) = MockStage::new(true);
        let (mut chain, _recheck_rx) = chain_with(vec![first, second, third], true);

        assert_ok!(chain.apply(true).await);
        assert_eq!(first_calls.load(Ordering::SeqCst), 1);
        assert_eq!(second_calls.load(Ordering::SeqCst), 1);
        // The chain returns as soon as a stage succeeds.
        assert_eq!(third_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_all_stages_failing_exhausts_chain() {
        let (first, _) = MockStage::new(false);
        let (second, _) = MockStage::new(false);
        let (mut chain, _recheck_rx) = chain_with(vec![first, second], true);

        let err = chain.apply(true).await.unwrap_err();
        let ActuatorError::Exhausted { attempted, engage } = err;
        assert_eq!(attempted, 2);
        assert!(engage);
    }

    #[tokio::test]
    async fn test_primary_skipped_when_unavailable() {
        let (first, first_calls) = MockStage::new(true);
        let (second, second_calls) = MockStage::new(true);
        let (mut chain, mut recheck_rx) = chain_with(vec![first, second], false);

        chain.apply(false).await.unwrap();
        assert_eq!(first_calls.load(Ordering::SeqCst), 0);
        assert_eq!(second_calls.load(Ordering::SeqCst), 1);
        // Skipping is not a failure, so no re-check is requested.
        assert!(recheck_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_primary_failure_requests_recheck() {
        let (first, _) = MockStage::new(false);
        let (second, _) = MockStage::new(true);
        let (mut chain, mut recheck_rx) = chain_with(vec![first, second], true);

        chain.apply(true).await.unwrap();
        assert!(recheck_rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_secondary_failure_does_not_request_recheck() {
        let (primary, _) = MockStage::new(true);
        let (second, _) = MockStage::new(false);
        let (third, _) = MockStage::new(true);
        // Primary skipped (unavailable); only the secondary stage fails.
        let (mut chain, mut recheck_rx) = chain_with(vec![primary, second, third], false);

        chain.apply(true).await.unwrap();
        assert!(recheck_rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_stage_times_out_and_falls_back() {
        let (second, second_calls) = MockStage::new(true);
        let (mut chain, mut recheck_rx) = chain_with(vec![Box::new(HangingStage), second], true);

        chain.apply(true).await.unwrap();
        assert_eq!(second_calls.load(Ordering::SeqCst), 1);
        // A timed-out primary counts as an unexpected failure.
        assert!(recheck_rx.try_recv().is_ok());
    }
}
