//! Device activity probe
//!
//! Point-in-time query of whether the default audio input device is
//! currently capturing. Fail-safe: a missing device or a failed platform
//! query reads as "not active" so notifications are never suppressed on
//! bad data.

#[cfg(target_os = "macos")]
mod coreaudio;
#[cfg(not(target_os = "macos"))]
mod pulse;

#[cfg(target_os = "macos")]
pub use coreaudio::CoreAudioProbe;
#[cfg(not(target_os = "macos"))]
pub use pulse::PulseProbe;

use async_trait::async_trait;

/// Query for the capture state of the default audio input device.
///
/// Implementations must be side-effect free, bounded in time, and safe
/// to call at unbounded frequency; the monitor calls this at most once
/// per tick and the tick loop stalls for as long as the query runs.
#[async_trait]
pub trait ActivityProbe: Send {
    /// Is any process currently running an active capture session on the
    /// default input device?
    async fn is_active(&mut self) -> bool;
}

/// Probe for the platform this daemon was built for
pub fn platform_probe() -> Box<dyn ActivityProbe> {
    #[cfg(target_os = "macos")]
    {
        Box::new(CoreAudioProbe)
    }
    #[cfg(not(target_os = "macos"))]
    {
        Box::new(PulseProbe)
    }
}
