// src/bot/escalation.rs - Warning count to penalty ladder (none, mute, ban)

use log::info;

use crate::bot::ledger::ViolationLedger;
use crate::config::ModerationConfig;
use crate::types::{PenaltyAction, UserId};

#[derive(Debug, Clone, Copy)]
pub struct PenaltyEscalator {
    warn_threshold: u32,
    ban_threshold: u32,
    mute_duration_seconds: u64,
}

impl PenaltyEscalator {
    pub fn new(config: &ModerationConfig) -> Self {
        Self {
            warn_threshold: config.warn_threshold,
            ban_threshold: config.ban_threshold,
            mute_duration_seconds: config.mute_duration_seconds,
        }
    }

    /// Decide the penalty for a user's current warning tally.
    ///
    /// Ban is checked first and clears the user's warnings. Warnings are never
    /// decayed or reset on the mute path.
    pub fn evaluate(&self, ledger: &mut ViolationLedger, user_id: UserId) -> PenaltyAction {
        let warnings = ledger.warning_count(user_id);

        if warnings >= self.ban_threshold {
            ledger.reset_warning(user_id);
            info!("User {} reached {} warnings: ban", user_id, warnings);
            PenaltyAction::Ban
        } else if warnings >= self.warn_threshold {
            info!(
                "User {} reached {} warnings: mute for {}s",
                user_id, warnings, self.mute_duration_seconds
            );
            PenaltyAction::Mute {
                duration_seconds: self.mute_duration_seconds,
            }
        } else {
            PenaltyAction::None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (PenaltyEscalator, ViolationLedger) {
        (PenaltyEscalator::new(&ModerationConfig::default()), ViolationLedger::new(10))
    }

    #[test]
    fn test_ladder() {
        let (escalator, mut ledger) = setup();
        let mut actions = Vec::new();
        for _ in 0..5 {
            ledger.increment_warning(1);
            actions.push(escalator.evaluate(&mut ledger, 1));
        }
        assert_eq!(
            actions,
            vec![
                PenaltyAction::None,
                PenaltyAction::None,
                PenaltyAction::Mute { duration_seconds: 600 },
                PenaltyAction::Mute { duration_seconds: 600 },
                PenaltyAction::Ban,
            ]
        );
        assert_eq!(ledger.warning_count(1), 0);
    }

    #[test]
    fn test_mute_keeps_count() {
        let (escalator, mut ledger) = setup();
        for _ in 0..4 {
            ledger.increment_warning(1);
        }
        assert_eq!(escalator.evaluate(&mut ledger, 1), PenaltyAction::Mute { duration_seconds: 600 });
        assert_eq!(ledger.warning_count(1), 4);
    }

    #[test]
    fn test_ban_checked_before_mute() {
        let (escalator, mut ledger) = setup();
        for _ in 0..7 {
            ledger.increment_warning(1);
        }
        assert_eq!(escalator.evaluate(&mut ledger, 1), PenaltyAction::Ban);
        assert_eq!(ledger.warning_count(1), 0);
        assert_eq!(escalator.evaluate(&mut ledger, 1), PenaltyAction::None);
    }

    #[test]
    fn test_equal_thresholds_ban() {
        let config = ModerationConfig {
            warn_threshold: 2,
            ban_threshold: 2,
            ..ModerationConfig::default()
        };
        let escalator = PenaltyEscalator::new(&config);
        let mut ledger = ViolationLedger::new(10);
        ledger.increment_warning(1);
        ledger.increment_warning(1);
        assert_eq!(escalator.evaluate(&mut ledger, 1), PenaltyAction::Ban);
    }

    #[test]
    fn test_unknown_user_gets_nothing() {
        let (escalator, mut ledger) = setup();
        assert_eq!(escalator.evaluate(&mut ledger, 99), PenaltyAction::None);
    }
}
