//! onair-daemon: Background mic-presence monitor
//!
//! Polls the default audio input device and keeps system notification
//! suppression reconciled with it:
//! - Edge-triggered monitor loop, applying only on activity transitions
//! - Three-stage fallback actuator for engaging/releasing suppression
//! - Availability watchdog for the primary automation
//! - IPC server for the menu bar indicator

mod actuator;
mod config;
mod events;
mod ipc;
mod lifecycle;
mod monitor;
mod probe;
mod watchdog;

use anyhow::Result;
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::actuator::{platform_provider, ActuatorChain};
use crate::config::Config;
use crate::events::MonitorEvent;
use crate::ipc::Server;
use crate::lifecycle::ShutdownSignal;
use crate::monitor::{MonitorCommand, MonitorLoop};
use crate::watchdog::{AvailabilityEvent, AvailabilityWatchdog, CheckCadence};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "onair-daemon starting"
    );

    // Load configuration
    let config = Config::load()?;
    config.ensure_dirs()?;
    info!(?config.socket_path, "configuration loaded");

    // Create shutdown signal handler
    let shutdown = ShutdownSignal::new();

    // Create channels for inter-component communication
    // Monitor loop -> everyone (IPC notifications, logging)
    let (event_tx, _event_rx) = broadcast::channel::<MonitorEvent>(64);
    // IPC server -> monitor loop (user toggle intents)
    let (command_tx, command_rx) = mpsc::channel::<MonitorCommand>(8);
    // Watchdog -> monitor loop (availability transitions)
    let (availability_tx, availability_rx) = mpsc::channel::<AvailabilityEvent>(8);
    // Actuator -> watchdog (forced re-check after a primary failure)
    let (recheck_tx, recheck_rx) = mpsc::channel::<()>(4);
    // Watchdog-published availability, read by the chain and the monitor
    let (available_tx, available_rx) = watch::channel(false);
    // IPC server -> shutdown path (user quit intent)
    let (quit_tx, quit_rx) = mpsc::channel::<()>(1);

    // Select the suppression mechanisms for this platform
    let provider = platform_provider(&config);
    let chain = ActuatorChain::new(
        provider.stages,
        available_rx.clone(),
        recheck_tx,
        config.stage_timeout,
    );

    let mut watchdog = AvailabilityWatchdog::new(
        provider.checker,
        CheckCadence {
            fast: config.watchdog_fast,
            slow: config.watchdog_slow,
            escalate_after: config.watchdog_escalate_after,
            check_timeout: config.watchdog_check_timeout,
        },
        available_tx,
        availability_tx,
    );

    // Establish availability before the loops start; the Available event
    // this may fire auto-starts monitoring once the loop is running.
    if watchdog.check_now().await {
        info!(automation = %config.automation_name, "primary automation installed");
    } else {
        warn!(
            automation = %config.automation_name,
            "primary automation not installed, watchdog will keep checking"
        );
    }

    let mut monitor = MonitorLoop::new(
        probe::platform_probe(),
        Box::new(chain),
        available_rx,
        config.poll_interval,
        event_tx.clone(),
    );

    // Create IPC server
    let server = Server::new(&config.socket_path, command_tx, quit_tx)?;

    // Subscribe to monitor events for IPC updates
    let mut ipc_event_rx = event_tx.subscribe();
    let server_for_events = &server;

    info!("daemon initialized, entering main loop");

    // Main event loop
    tokio::select! {
        // Run the monitor loop (ticks, toggles, availability transitions)
        _ = monitor.run(command_rx, availability_rx) => {
            info!("monitor loop exited");
        }

        // Run the availability watchdog
        _ = watchdog.run(recheck_rx) => {
            info!("availability watchdog exited");
        }

        // Run the IPC server (accepts indicator connections)
        result = server.run() => {
            if let Err(e) = result {
                error!(?e, "IPC server error");
            }
        }

        // Fold monitor events into the IPC status snapshot
        _ = async {
            loop {
                match ipc_event_rx.recv().await {
                    Ok(event) => {
                        info!(%event, "monitor event");
                        server_for_events.apply_event(&event).await;
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(skipped = n, "monitor event receiver lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        break;
                    }
                }
            }
        } => {
            info!("monitor event handler exited");
        }

        // Wait for shutdown signal or a quit request from the indicator
        _ = shutdown.wait(quit_rx) => {
            info!("shutdown signal received");
        }
    }

    // Cleanup: release suppression before exiting so notifications are
    // never left suppressed by a dead daemon.
    info!("shutting down...");

    monitor.stop().await;
    server.shutdown().await;

    info!("onair-daemon stopped");

    Ok(())
}
