//! Platform mechanism selection
//!
//! The suppression mechanisms and the matching availability check are
//! chosen once at startup; nothing downstream branches on the platform.

use super::{
    AutomationListChecker, AutomationStage, BannerSwitchChecker, CommandStage, SuppressionStage,
};
use crate::config::Config;
use crate::watchdog::AvailabilityCheck;

/// The stages and availability check for the platform this daemon runs on
pub struct MechanismProvider {
    /// Ordered fallback chain, primary first
    pub stages: Vec<Box<dyn SuppressionStage>>,
    /// Check for whether the primary mechanism is installed and invokable
    pub checker: Box<dyn AvailabilityCheck>,
}

/// Select the suppression mechanisms for the current platform
pub fn platform_provider(config: &Config) -> MechanismProvider {
    if cfg!(target_os = "macos") {
        MechanismProvider {
            stages: vec![
                Box::new(AutomationStage::new(
                    "/usr/bin/shortcuts",
                    &config.automation_name,
                )),
                Box::new(CommandStage::control_center()),
                Box::new(CommandStage::focus_keystroke(config.focus_key_code)),
            ],
            checker: Box::new(AutomationListChecker::new(
                "/usr/bin/shortcuts",
                &config.automation_name,
            )),
        }
    } else {
        MechanismProvider {
            stages: vec![
                Box::new(CommandStage::banner_switch()),
                Box::new(CommandStage::dunst()),
                Box::new(CommandStage::mako()),
            ],
            checker: Box::new(BannerSwitchChecker),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_has_three_stage_chain() {
        let config = Config::load().unwrap();
        let provider = platform_provider(&config);
        assert_eq!(provider.stages.len(), 3);
    }
}
