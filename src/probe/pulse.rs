//! PulseAudio-backed activity probe
//!
//! Used on non-macOS builds. A process capturing from an input device
//! shows up as a source-output entry, so a non-empty listing means the
//! default input is in use. Works against both PulseAudio and PipeWire
//! (via pipewire-pulse).

use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::trace;

use super::ActivityProbe;

/// Upper bound for one pactl query; a hung query reads as inactive so the
/// tick loop is never stalled
const QUERY_TIMEOUT: Duration = Duration::from_secs(2);

/// Probe backed by `pactl list short source-outputs`
pub struct PulseProbe;

#[async_trait]
impl ActivityProbe for PulseProbe {
    async fn is_active(&mut self) -> bool {
        let mut command = Command::new("pactl");
        command
            .args(["list", "short", "source-outputs"])
            .kill_on_drop(true);

        let output = match timeout(QUERY_TIMEOUT, command.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                trace!(?e, "pactl query failed, treating as inactive");
                return false;
            }
            Err(_) => {
                trace!("pactl query timed out, treating as inactive");
                return false;
            }
        };

        if !output.status.success() {
            trace!(status = ?output.status, "pactl exited non-zero, treating as inactive");
            return false;
        }

        // Monitor-of-sink captures are loopbacks, not microphone use.
        String::from_utf8_lossy(&output.stdout)
            .lines()
            .any(|line| !line.trim().is_empty() && !line.contains(".monitor"))
    }
}
