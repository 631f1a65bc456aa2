//! Configuration loading and management

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;

/// Daemon configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the Unix domain socket for IPC
    pub socket_path: PathBuf,

    /// Directory for runtime data
    pub data_dir: PathBuf,

    /// Interval between monitor ticks
    pub poll_interval: Duration,

    /// Upper bound for a single suppression stage invocation
    pub stage_timeout: Duration,

    /// Name of the primary automation, matched exactly against the
    /// installed-automation listing
    pub automation_name: String,

    /// Watchdog cadence while checking frequently
    pub watchdog_fast: Duration,

    /// Watchdog cadence after escalation
    pub watchdog_slow: Duration,

    /// Consecutive unchanged checks before escalating to the slow cadence
    pub watchdog_escalate_after: u32,

    /// Upper bound for a single availability check invocation
    pub watchdog_check_timeout: Duration,

    /// Key code posted by the last-resort keystroke stage (the
    /// user-assigned global focus toggle shortcut)
    pub focus_key_code: u16,
}

impl Config {
    /// Load configuration from environment and defaults
    pub fn load() -> Result<Self> {
        let home = std::env::var("HOME")?;
        let data_dir = PathBuf::from(&home)
            .join(".local")
            .join("share")
            .join("onair");

        let socket_path = match std::env::var("ONAIR_SOCKET") {
            Ok(path) => PathBuf::from(path),
            Err(_) => data_dir.join("daemon.sock"),
        };

        let automation_name = std::env::var("ONAIR_AUTOMATION")
            .unwrap_or_else(|_| "macos-focus-control".to_string());

        let poll_interval = env_millis("ONAIR_POLL_MS", 1000);

        Ok(Self {
            socket_path,
            data_dir,
            poll_interval,
            stage_timeout: Duration::from_secs(10),
            automation_name,
            watchdog_fast: Duration::from_secs(1),
            watchdog_slow: Duration::from_secs(5),
            watchdog_escalate_after: 30,
            watchdog_check_timeout: Duration::from_secs(5),
            focus_key_code: 97, // F6, the conventional focus toggle binding
        })
    }

    /// Ensure data directory exists
    pub fn ensure_dirs(&self) -> Result<()> {
        std::fs::create_dir_all(&self.data_dir)?;
        Ok(())
    }
}

fn env_millis(var: &str, default_ms: u64) -> Duration {
    let ms = std::env::var(var)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default_ms);
    Duration::from_millis(ms)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_load() {
        let config = Config::load().unwrap();
        assert!(config.data_dir.to_string_lossy().contains("onair"));
        assert_eq!(config.poll_interval, Duration::from_secs(1));
        assert_eq!(config.watchdog_escalate_after, 30);
    }

    #[test]
    fn test_slow_cadence_exceeds_fast() {
        let config = Config::load().unwrap();
        assert!(config.watchdog_slow > config.watchdog_fast);
    }
}
