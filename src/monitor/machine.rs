//! Core monitor loop implementation
//!
//! Edge-triggered reconciliation: while activity is unchanged a tick
//! performs zero external side effects, so process spawning is bounded by
//! genuine state transitions. A failed apply leaves the suppression state
//! unflipped and the next tick retries the same transition.

use std::time::{Duration, Instant};

use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::actuator::Actuator;
use crate::events::MonitorEvent;
use crate::probe::ActivityProbe;
use crate::watchdog::AvailabilityEvent;

/// The two states of the monitor loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    /// Tick timer idle, nothing is reconciled
    Stopped,
    /// Periodic ticks are reconciling activity against suppression
    Monitoring,
}

impl std::fmt::Display for MonitorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MonitorState::Stopped => write!(f, "Stopped"),
            MonitorState::Monitoring => write!(f, "Monitoring"),
        }
    }
}

/// User intents relayed from the status indicator
#[derive(Debug, Clone, Copy)]
pub enum MonitorCommand {
    /// Toggle between Stopped and Monitoring
    Toggle,
}

/// The orchestrator owning the suppression state
pub struct MonitorLoop {
    probe: Box<dyn ActivityProbe>,
    actuator: Box<dyn Actuator>,
    state: MonitorState,
    /// Suppression as last confirmed by the actuator; never set
    /// optimistically before an apply completes
    engaged: bool,
    /// Instant of the last successful apply
    last_applied: Option<Instant>,
    /// Availability of the primary automation, published by the watchdog
    automation_available: watch::Receiver<bool>,
    poll_interval: Duration,
    event_tx: broadcast::Sender<MonitorEvent>,
}

impl MonitorLoop {
    pub fn new(
        probe: Box<dyn ActivityProbe>,
        actuator: Box<dyn Actuator>,
        automation_available: watch::Receiver<bool>,
        poll_interval: Duration,
        event_tx: broadcast::Sender<MonitorEvent>,
    ) -> Self {
        Self {
            probe,
            actuator,
            state: MonitorState::Stopped,
            engaged: false,
            last_applied: None,
            automation_available,
            poll_interval,
            event_tx,
        }
    }

    pub fn state(&self) -> MonitorState {
        self.state
    }

    pub fn engaged(&self) -> bool {
        self.engaged
    }

    fn emit(&self, event: MonitorEvent) {
        debug!(%event, "emitting event");
        let _ = self.event_tx.send(event);
    }

    /// Begin monitoring
    pub fn start(&mut self) {
        if self.state == MonitorState::Monitoring {
            return;
        }
        info!(from = %self.state, to = %MonitorState::Monitoring, "state transition");
        self.state = MonitorState::Monitoring;
        self.emit(MonitorEvent::MonitoringStarted);
    }

    /// Stop monitoring.
    ///
    /// If suppression is engaged, disengage is force-applied first so the
    /// system is not left suppressing notifications once unmonitored.
    pub async fn stop(&mut self) {
        // A disengage that failed during an earlier stop leaves the flag
        // set; retry it even when already stopped so quitting never exits
        // with suppression engaged.
        if self.engaged {
            self.apply(false).await;
        }
        if self.state == MonitorState::Stopped {
            return;
        }
        info!(from = %self.state, to = %MonitorState::Stopped, "state transition");
        self.state = MonitorState::Stopped;
        self.emit(MonitorEvent::MonitoringStopped);
    }

    /// One reconciliation pass: query the probe, act on a transition.
    ///
    /// A tick with unchanged activity is a no-op; a failed apply leaves
    /// the state unflipped so the next tick retries.
    pub async fn tick(&mut self) {
        let active = self.probe.is_active().await;
        if active == self.engaged {
            return;
        }
        self.apply(active).await;
    }

    async fn apply(&mut self, engage: bool) {
        match self.actuator.apply(engage).await {
            Ok(()) => {
                if engage {
                    self.engaged = true;
                    self.last_applied = Some(Instant::now());
                    self.emit(MonitorEvent::SuppressionEngaged);
                } else {
                    let engaged_ms = self
                        .last_applied
                        .map(|t| t.elapsed().as_millis() as u64)
                        .unwrap_or(0);
                    self.engaged = false;
                    self.last_applied = Some(Instant::now());
                    self.emit(MonitorEvent::SuppressionReleased { engaged_ms });
                }
            }
            Err(e) => {
                warn!(%e, engage, "suppression apply failed, will retry next tick");
                self.emit(MonitorEvent::SuppressionFailed { engage });
            }
        }
    }

    pub async fn handle_command(&mut self, command: MonitorCommand) {
        match command {
            MonitorCommand::Toggle => {
                if self.state == MonitorState::Monitoring {
                    self.stop().await;
                } else if !*self.automation_available.borrow() {
                    // The indicator surfaces the missing-automation alert.
                    debug!("toggle requested but primary automation is not installed");
                    self.emit(MonitorEvent::AutomationMissing);
                } else {
                    self.start();
                }
            }
        }
    }

    pub async fn handle_availability(&mut self, event: AvailabilityEvent) {
        match event {
            AvailabilityEvent::Available => {
                self.emit(MonitorEvent::AutomationAvailable);
                // Monitoring is always desired; it pauses only on
                // unavailability.
                if self.state == MonitorState::Stopped {
                    self.start();
                }
            }
            AvailabilityEvent::Lost => {
                // The fallback stages still run; monitoring continues.
                self.emit(MonitorEvent::AutomationLost);
            }
        }
    }

    /// Drive the monitor until both inbound channels close.
    ///
    /// Ticks never overlap; a tick still running when the next is due
    /// simply delays the next.
    pub async fn run(
        &mut self,
        mut commands: mpsc::Receiver<MonitorCommand>,
        mut availability: mpsc::Receiver<AvailabilityEvent>,
    ) {
        info!(state = %self.state, "monitor loop started");

        let mut ticks = tokio::time::interval(self.poll_interval);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticks.tick(), if self.state == MonitorState::Monitoring => {
                    self.tick().await;
                }
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    None => break,
                },
                event = availability.recv() => match event {
                    Some(event) => self.handle_availability(event).await,
                    None => break,
                },
            }
        }

        info!("monitor loop stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use crate::actuator::ActuatorError;

    struct ScriptProbe {
        seq: VecDeque<bool>,
        last: bool,
    }

    impl ScriptProbe {
        fn new(seq: &[bool]) -> Self {
            Self {
                seq: seq.iter().copied().collect(),
                last: false,
            }
        }
    }

    #[async_trait]
    impl ActivityProbe for ScriptProbe {
        async fn is_active(&mut self) -> bool {
            if let Some(value) = self.seq.pop_front() {
                self.last = value;
            }
            self.last
        }
    }

    struct MockActuator {
        calls: Arc<Mutex<Vec<bool>>>,
        fail: Arc<AtomicBool>,
    }

    #[async_trait]
    impl Actuator for MockActuator {
        async fn apply(&mut self, enable: bool) -> Result<(), ActuatorError> {
            self.calls.lock().unwrap().push(enable);
            if self.fail.load(Ordering::SeqCst) {
                Err(ActuatorError::Exhausted {
                    attempted: 3,
                    engage: enable,
                })
            } else {
                Ok(())
            }
        }
    }

    struct Harness {
        monitor: MonitorLoop,
        calls: Arc<Mutex<Vec<bool>>>,
        fail: Arc<AtomicBool>,
        events: broadcast::Receiver<MonitorEvent>,
        _available_tx: watch::Sender<bool>,
    }

    fn harness(probe_seq: &[bool], available: bool) -> Harness {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let fail = Arc::new(AtomicBool::new(false));
        let (event_tx, events) = broadcast::channel(64);
        let (available_tx, available_rx) = watch::channel(available);
        let monitor = MonitorLoop::new(
            Box::new(ScriptProbe::new(probe_seq)),
            Box::new(MockActuator {
                calls: Arc::clone(&calls),
                fail: Arc::clone(&fail),
            }),
            available_rx,
            Duration::from_secs(1),
            event_tx,
        );
        Harness {
            monitor,
            calls,
            fail,
            events,
            _available_tx: available_tx,
        }
    }

    #[tokio::test]
    async fn test_unchanged_activity_is_a_no_op() {
        let mut h = harness(&[true, true, true], true);
        h.monitor.start();

        for _ in 0..3 {
            h.monitor.tick().await;
        }
        // Exactly one apply for the initial transition, none after.
        assert_eq!(*h.calls.lock().unwrap(), vec![true]);
    }

    #[tokio::test]
    async fn test_edge_triggered_transitions() {
        let mut h = harness(&[false, true, true, false], true);
        h.monitor.start();

        for _ in 0..4 {
            h.monitor.tick().await;
        }
        assert_eq!(*h.calls.lock().unwrap(), vec![true, false]);
    }

    #[tokio::test]
    async fn test_failed_apply_leaves_state_unflipped() {
        let mut h = harness(&[true, true, true], true);
        h.monitor.start();
        h.fail.store(true, Ordering::SeqCst);

        h.monitor.tick().await;
        assert!(!h.monitor.engaged());

        // The next identical tick retries the same transition.
        h.monitor.tick().await;
        assert_eq!(*h.calls.lock().unwrap(), vec![true, true]);
        assert!(!h.monitor.engaged());

        h.fail.store(false, Ordering::SeqCst);
        h.monitor.tick().await;
        assert!(h.monitor.engaged());
    }

    #[tokio::test]
    async fn test_stop_forces_disengage() {
        let mut h = harness(&[true, true], true);
        h.monitor.start();
        h.monitor.tick().await;
        assert!(h.monitor.engaged());

        // Probe still reports active; stop disengages regardless.
        h.monitor.stop().await;
        assert_eq!(*h.calls.lock().unwrap(), vec![true, false]);
        assert!(!h.monitor.engaged());
        assert_eq!(h.monitor.state(), MonitorState::Stopped);
    }

    #[tokio::test]
    async fn test_stop_with_failing_disengage_keeps_engaged_flag() {
        let mut h = harness(&[true], true);
        h.monitor.start();
        h.monitor.tick().await;
        assert!(h.monitor.engaged());

        h.fail.store(true, Ordering::SeqCst);
        h.monitor.stop().await;
        // Stopped, but the flag reflects what the actuator confirmed.
        assert_eq!(h.monitor.state(), MonitorState::Stopped);
        assert!(h.monitor.engaged());
    }

    #[tokio::test]
    async fn test_repeat_stop_retries_stuck_disengage() {
        let mut h = harness(&[true], true);
        h.monitor.start();
        h.monitor.tick().await;
        assert!(h.monitor.engaged());

        h.fail.store(true, Ordering::SeqCst);
        h.monitor.stop().await;
        assert_eq!(h.monitor.state(), MonitorState::Stopped);
        assert!(h.monitor.engaged());

        // Quitting calls stop once more; the stuck disengage is retried
        // even though the state is already Stopped.
        h.fail.store(false, Ordering::SeqCst);
        h.monitor.stop().await;
        assert_eq!(*h.calls.lock().unwrap(), vec![true, false, false]);
        assert!(!h.monitor.engaged());
    }

    #[tokio::test]
    async fn test_toggle_without_automation_emits_missing() {
        let mut h = harness(&[], false);

        h.monitor.handle_command(MonitorCommand::Toggle).await;
        assert_eq!(h.monitor.state(), MonitorState::Stopped);
        assert!(matches!(
            h.events.try_recv().unwrap(),
            MonitorEvent::AutomationMissing
        ));
    }

    #[tokio::test]
    async fn test_toggle_starts_and_stops() {
        let mut h = harness(&[], true);

        h.monitor.handle_command(MonitorCommand::Toggle).await;
        assert_eq!(h.monitor.state(), MonitorState::Monitoring);

        h.monitor.handle_command(MonitorCommand::Toggle).await;
        assert_eq!(h.monitor.state(), MonitorState::Stopped);
    }

    #[tokio::test]
    async fn test_availability_auto_starts_monitoring() {
        let mut h = harness(&[], true);

        h.monitor
            .handle_availability(AvailabilityEvent::Available)
            .await;
        assert_eq!(h.monitor.state(), MonitorState::Monitoring);

        assert!(matches!(
            h.events.try_recv().unwrap(),
            MonitorEvent::AutomationAvailable
        ));
        assert!(matches!(
            h.events.try_recv().unwrap(),
            MonitorEvent::MonitoringStarted
        ));
    }

    #[tokio::test]
    async fn test_availability_lost_keeps_monitoring() {
        let mut h = harness(&[], true);
        h.monitor.start();

        h.monitor.handle_availability(AvailabilityEvent::Lost).await;
        assert_eq!(h.monitor.state(), MonitorState::Monitoring);
    }

    #[tokio::test]
    async fn test_release_reports_engaged_duration() {
        let mut h = harness(&[true, false], true);
        h.monitor.start();

        h.monitor.tick().await;
        h.monitor.tick().await;

        let mut saw_release = false;
        while let Ok(event) = h.events.try_recv() {
            if let MonitorEvent::SuppressionReleased { .. } = event {
                saw_release = true;
            }
        }
        assert!(saw_release);
        assert!(!h.monitor.engaged());
    }
}
