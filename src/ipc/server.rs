//! Unix domain socket server for the status indicator
//!
//! Request-response communication plus push notifications: subscribed
//! clients receive every monitor event and each indicator icon change.
//! Inbound user intents (toggle, quit) are relayed to the monitor loop
//! and the shutdown path.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{broadcast, mpsc, RwLock};
use tracing::{debug, error, info, warn};

use crate::events::MonitorEvent;
use crate::monitor::MonitorCommand;

use super::protocol::{DaemonStatus, IndicatorState, Notification, Request, Response};

/// IPC server handling indicator connections
pub struct Server {
    socket_path: PathBuf,
    listener: Option<UnixListener>,
    state: Arc<RwLock<ServerState>>,
    shutdown_tx: broadcast::Sender<()>,
    /// Fan-out of notifications to subscribed clients
    notify_tx: broadcast::Sender<Notification>,
    /// User toggle intents, relayed to the monitor loop
    command_tx: mpsc::Sender<MonitorCommand>,
    /// User quit intent, relayed to the shutdown path
    quit_tx: mpsc::Sender<()>,
}

/// Shared server state
struct ServerState {
    status: DaemonStatus,
    start_time: std::time::Instant,
}

impl Server {
    /// Create a new IPC server
    pub fn new(
        socket_path: &Path,
        command_tx: mpsc::Sender<MonitorCommand>,
        quit_tx: mpsc::Sender<()>,
    ) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = socket_path.parent() {
            std::fs::create_dir_all(parent).context("failed to create socket directory")?;
        }

        // Remove stale socket if it exists
        if socket_path.exists() {
            std::fs::remove_file(socket_path).context("failed to remove stale socket")?;
        }

        let listener = UnixListener::bind(socket_path).context("failed to bind Unix socket")?;

        // Set socket permissions to owner-only (0600)
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(socket_path, std::fs::Permissions::from_mode(0o600))?;
        }

        let (shutdown_tx, _) = broadcast::channel(1);
        let (notify_tx, _) = broadcast::channel(64);

        let state = Arc::new(RwLock::new(ServerState {
            status: DaemonStatus::default(),
            start_time: std::time::Instant::now(),
        }));

        info!(?socket_path, "IPC server listening");

        Ok(Self {
            socket_path: socket_path.to_owned(),
            listener: Some(listener),
            state,
            shutdown_tx,
            notify_tx,
            command_tx,
            quit_tx,
        })
    }

    /// Fold a monitor event into the status snapshot and notify
    /// subscribed clients
    pub async fn apply_event(&self, event: &MonitorEvent) {
        let icon_changed = {
            let mut state = self.state.write().await;
            let status = &mut state.status;
            match event {
                MonitorEvent::MonitoringStarted => status.monitoring = true,
                MonitorEvent::MonitoringStopped => status.monitoring = false,
                MonitorEvent::SuppressionEngaged => status.engaged = true,
                MonitorEvent::SuppressionReleased { .. } => status.engaged = false,
                MonitorEvent::AutomationAvailable => status.automation_available = true,
                MonitorEvent::AutomationLost => status.automation_available = false,
                MonitorEvent::SuppressionFailed { .. } | MonitorEvent::AutomationMissing => {}
            }

            let icon = IndicatorState::derive(status.monitoring, status.engaged);
            let changed = icon != status.icon;
            status.icon = icon;
            changed.then_some(status.icon)
        };

        let _ = self.notify_tx.send(Notification::Event(event.clone()));
        if let Some(icon) = icon_changed {
            debug!(?icon, "indicator icon changed");
            let _ = self.notify_tx.send(Notification::IconChanged { icon });
        }
    }

    /// Run the server, accepting connections
    pub async fn run(&self) -> Result<()> {
        let listener = self.listener.as_ref().context("server not initialized")?;

        loop {
            match listener.accept().await {
                Ok((stream, _addr)) => {
                    debug!("indicator client connected");
                    let state = Arc::clone(&self.state);
                    let notify_rx = self.notify_tx.subscribe();
                    let command_tx = self.command_tx.clone();
                    let quit_tx = self.quit_tx.clone();
                    let mut shutdown_rx = self.shutdown_tx.subscribe();

                    tokio::spawn(async move {
                        tokio::select! {
                            result = Self::handle_client(stream, state, notify_rx, command_tx, quit_tx) => {
                                if let Err(e) = result {
                                    warn!(?e, "client handler error");
                                }
                            }
                            _ = shutdown_rx.recv() => {
                                debug!("client handler shutting down");
                            }
                        }
                    });
                }
                Err(e) => {
                    error!(?e, "accept error");
                }
            }
        }
    }

    /// Handle a single client connection
    async fn handle_client(
        mut stream: UnixStream,
        state: Arc<RwLock<ServerState>>,
        notify_rx: broadcast::Receiver<Notification>,
        command_tx: mpsc::Sender<MonitorCommand>,
        quit_tx: mpsc::Sender<()>,
    ) -> Result<()> {
        let mut len_buf = [0u8; 4];

        loop {
            // Read message length (4-byte little-endian)
            match stream.read_exact(&mut len_buf).await {
                Ok(_) => {}
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    debug!("client disconnected");
                    return Ok(());
                }
                Err(e) => return Err(e.into()),
            }

            let len = u32::from_le_bytes(len_buf) as usize;
            if len > 1024 * 1024 {
                warn!(len, "message too large, disconnecting");
                return Ok(());
            }

            // Read message body
            let mut msg_buf = vec![0u8; len];
            stream.read_exact(&mut msg_buf).await?;

            let request: Request =
                serde_json::from_slice(&msg_buf).context("failed to parse request")?;

            debug!(?request, "received request");

            let response = match request {
                Request::Ping => Response::Pong,

                Request::GetStatus => {
                    let mut state = state.write().await;
                    state.status.uptime_secs = state.start_time.elapsed().as_secs();
                    Response::Status(state.status.clone())
                }

                Request::ToggleMonitoring => {
                    if command_tx.send(MonitorCommand::Toggle).await.is_ok() {
                        Response::Ack
                    } else {
                        Response::Error {
                            code: "monitor_gone".to_string(),
                            message: "monitor loop is not running".to_string(),
                        }
                    }
                }

                Request::Shutdown => {
                    let _ = quit_tx.send(()).await;
                    Response::Ack
                }

                Request::Subscribe => {
                    Self::send_message(&mut stream, &Response::Subscribed).await?;
                    debug!("client subscribed to notifications");
                    return Self::push_notifications(stream, notify_rx).await;
                }
            };

            Self::send_message(&mut stream, &response).await?;
        }
    }

    /// Forward notifications until the client disconnects
    async fn push_notifications(
        mut stream: UnixStream,
        mut notify_rx: broadcast::Receiver<Notification>,
    ) -> Result<()> {
        loop {
            match notify_rx.recv().await {
                Ok(notification) => {
                    Self::send_message(&mut stream, &notification).await?;
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(skipped = n, "notification receiver lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return Ok(()),
            }
        }
    }

    /// Send a length-prefixed JSON message
    async fn send_message<T: serde::Serialize>(stream: &mut UnixStream, msg: &T) -> Result<()> {
        let msg_bytes = serde_json::to_vec(msg)?;
        let msg_len = (msg_bytes.len() as u32).to_le_bytes();

        stream.write_all(&msg_len).await?;
        stream.write_all(&msg_bytes).await?;

        Ok(())
    }

    /// Gracefully shutdown the server
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());

        // Remove socket file
        if self.socket_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.socket_path) {
                warn!(?e, "failed to remove socket file");
            }
        }

        info!("IPC server shutdown complete");
    }
}
