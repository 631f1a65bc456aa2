//! Concrete suppression mechanisms
//!
//! `AutomationStage` runs a named external automation and hands the
//! "on"/"off" parameter over through a temporary file that is removed on
//! every exit path. `CommandStage` covers the scripted fallbacks, which
//! are plain one-shot commands with per-direction arguments.

use std::io::Write;
use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use tempfile::NamedTempFile;
use tokio::process::Command;
use tracing::debug;

use super::{StageError, SuppressionStage};
use crate::watchdog::AvailabilityCheck;

fn param(enable: bool) -> &'static str {
    if enable {
        "on"
    } else {
        "off"
    }
}

/// Write the stage input parameter to a fresh temporary file.
///
/// The returned handle deletes the file when dropped, so the artifact is
/// cleaned up no matter how the invocation ends.
fn stage_input_file(enable: bool) -> Result<NamedTempFile, StageError> {
    let mut file = tempfile::Builder::new()
        .prefix("onair-input-")
        .suffix(".txt")
        .tempfile()
        .map_err(StageError::InputParam)?;
    file.write_all(param(enable).as_bytes())
        .map_err(StageError::InputParam)?;
    Ok(file)
}

async fn run_to_completion(command: &mut Command, program: &str) -> Result<(), StageError> {
    let status = command
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .status()
        .await
        .map_err(|source| StageError::Io {
            program: program.to_string(),
            source,
        })?;

    if status.success() {
        Ok(())
    } else {
        Err(StageError::NonZeroExit(status))
    }
}

/// Primary mechanism: run a named automation with a file-passed parameter
pub struct AutomationStage {
    runner: PathBuf,
    automation: String,
}

impl AutomationStage {
    pub fn new(runner: impl Into<PathBuf>, automation: impl Into<String>) -> Self {
        Self {
            runner: runner.into(),
            automation: automation.into(),
        }
    }
}

#[async_trait]
impl SuppressionStage for AutomationStage {
    fn name(&self) -> &'static str {
        "automation-run"
    }

    async fn apply(&self, enable: bool) -> Result<(), StageError> {
        // The runner only accepts the parameter as a file path, not inline.
        let input = stage_input_file(enable)?;
        debug!(automation = %self.automation, input = ?input.path(), "running automation");

        let mut command = Command::new(&self.runner);
        command
            .arg("run")
            .arg(&self.automation)
            .arg("--input-path")
            .arg(input.path());

        run_to_completion(&mut command, &self.runner.to_string_lossy()).await
        // `input` drops here; the parameter file is gone on success,
        // failure, and timeout-triggered cancellation alike.
    }
}

/// A fallback mechanism that is a single command invocation per direction
pub struct CommandStage {
    label: &'static str,
    program: String,
    on_args: Vec<String>,
    off_args: Vec<String>,
}

impl CommandStage {
    pub fn new(
        label: &'static str,
        program: impl Into<String>,
        on_args: &[&str],
        off_args: &[&str],
    ) -> Self {
        Self {
            label,
            program: program.into(),
            on_args: on_args.iter().map(|s| s.to_string()).collect(),
            off_args: off_args.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Scripted UI automation driving the Control Center Focus toggle
    pub fn control_center() -> Self {
        Self::new(
            "control-center",
            "/usr/bin/osascript",
            &["-e", CONTROL_CENTER_ENGAGE],
            &["-e", CONTROL_CENTER_RELEASE],
        )
    }

    /// Last resort: post the user-assigned global focus toggle shortcut
    pub fn focus_keystroke(key_code: u16) -> Self {
        let script = format!(
            "tell application \"System Events\" to key code {}",
            key_code
        );
        Self::new(
            "focus-keystroke",
            "/usr/bin/osascript",
            &["-e", &script],
            &["-e", &script],
        )
    }

    /// GNOME notification banner switch
    pub fn banner_switch() -> Self {
        Self::new(
            "banner-switch",
            "gsettings",
            &["set", "org.gnome.desktop.notifications", "show-banners", "false"],
            &["set", "org.gnome.desktop.notifications", "show-banners", "true"],
        )
    }

    /// dunst pause toggle
    pub fn dunst() -> Self {
        Self::new(
            "dunst",
            "dunstctl",
            &["set-paused", "true"],
            &["set-paused", "false"],
        )
    }

    /// mako do-not-disturb mode
    pub fn mako() -> Self {
        Self::new(
            "mako",
            "makoctl",
            &["mode", "-a", "do-not-disturb"],
            &["mode", "-r", "do-not-disturb"],
        )
    }
}

#[async_trait]
impl SuppressionStage for CommandStage {
    fn name(&self) -> &'static str {
        self.label
    }

    async fn apply(&self, enable: bool) -> Result<(), StageError> {
        let args = if enable { &self.on_args } else { &self.off_args };
        let mut command = Command::new(&self.program);
        command.args(args);
        run_to_completion(&mut command, &self.program).await
    }
}

/// Availability check matching the automation name exactly against the
/// runner's installed-automation listing
pub struct AutomationListChecker {
    runner: PathBuf,
    automation: String,
}

impl AutomationListChecker {
    pub fn new(runner: impl Into<PathBuf>, automation: impl Into<String>) -> Self {
        Self {
            runner: runner.into(),
            automation: automation.into(),
        }
    }
}

// The watchdog bounds every check, so the listing only has to be
// non-blocking, not self-timing.
#[async_trait]
impl AvailabilityCheck for AutomationListChecker {
    async fn check(&self) -> bool {
        let mut command = Command::new(&self.runner);
        command.arg("list").kill_on_drop(true);
        let output = match command.output().await {
            Ok(output) => output,
            Err(_) => return false,
        };
        if !output.status.success() {
            return false;
        }
        String::from_utf8_lossy(&output.stdout)
            .lines()
            .any(|line| line.trim() == self.automation)
    }
}

/// Availability check for the banner-switch primary: the gsettings key
/// must exist and be writable
pub struct BannerSwitchChecker;

#[async_trait]
impl AvailabilityCheck for BannerSwitchChecker {
    async fn check(&self) -> bool {
        let mut command = Command::new("gsettings");
        command
            .args(["writable", "org.gnome.desktop.notifications", "show-banners"])
            .kill_on_drop(true);
        command
            .output()
            .await
            .map(|out| out.status.success() && String::from_utf8_lossy(&out.stdout).trim() == "true")
            .unwrap_or(false)
    }
}

const CONTROL_CENTER_ENGAGE: &str = r#"tell application "System Events"
	tell process "ControlCenter"
		click menu bar item "Focus" of menu bar 1
		delay 0.2
		set focusSwitch to checkbox 1 of group 1 of window "Control Center"
		if value of focusSwitch as integer is 0 then click focusSwitch
		key code 53
	end tell
end tell"#;

const CONTROL_CENTER_RELEASE: &str = r#"tell application "System Events"
	tell process "ControlCenter"
		click menu bar item "Focus" of menu bar 1
		delay 0.2
		set focusSwitch to checkbox 1 of group 1 of window "Control Center"
		if value of focusSwitch as integer is 1 then click focusSwitch
		key code 53
	end tell
end tell"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_input_file_contents_and_cleanup() {
        let file = stage_input_file(true).unwrap();
        let path = file.path().to_path_buf();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "on");

        drop(file);
        assert!(!path.exists());
    }

    #[test]
    fn test_stage_input_file_off_parameter() {
        let file = stage_input_file(false).unwrap();
        assert_eq!(std::fs::read_to_string(file.path()).unwrap(), "off");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_stage_success_is_exit_code_zero() {
        let stage = CommandStage::new("test", "true", &[], &[]);
        assert!(stage.apply(true).await.is_ok());

        let stage = CommandStage::new("test", "false", &[], &[]);
        let err = stage.apply(true).await.unwrap_err();
        assert!(matches!(err, StageError::NonZeroExit(_)));
    }

    #[tokio::test]
    async fn test_missing_program_reports_io_error() {
        let stage = CommandStage::new("test", "/nonexistent/onair-test-binary", &[], &[]);
        let err = stage.apply(false).await.unwrap_err();
        assert!(matches!(err, StageError::Io { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_automation_stage_passes_input_path() {
        // `true` ignores its arguments; this exercises the full invocation
        // path including parameter staging.
        let stage = AutomationStage::new("true", "some-automation");
        assert!(stage.apply(true).await.is_ok());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_automation_list_checker_matches_exact_line() {
        // `echo list` prints "list", so an automation named "list" is the
        // exact-match case and anything else is a miss.
        let checker = AutomationListChecker::new("echo", "list");
        assert!(checker.check().await);

        let checker = AutomationListChecker::new("echo", "other-automation");
        assert!(!checker.check().await);
    }

    #[test]
    fn test_direction_parameters() {
        assert_eq!(param(true), "on");
        assert_eq!(param(false), "off");
    }
}
