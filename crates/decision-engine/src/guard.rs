use analysis_core::{GuardConfig, OvertradingState};
use chrono::{DateTime, Duration, Utc};
use std::fmt;

/// Why the overtrading guard refused a new entry.
#[derive(Debug, Clone, PartialEq)]
pub enum GuardBlock {
    LossStreakCooldown { losses: u32, cycles_since_loss: u64 },
    CycleGap { cycles_since_entry: u64 },
    EntryWindow { entries: usize },
}

impl fmt::Display for GuardBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GuardBlock::LossStreakCooldown {
                losses,
                cycles_since_loss,
            } => write!(
                f,
                "loss-streak cooldown: {} consecutive losses, last {} cycles ago",
                losses, cycles_since_loss
            ),
            GuardBlock::CycleGap { cycles_since_entry } => {
                write!(f, "last entry only {} cycles ago", cycles_since_entry)
            }
            GuardBlock::EntryWindow { entries } => {
                write!(f, "{} entries already inside the rolling window", entries)
            }
        }
    }
}

pub struct OvertradingGuard {
    config: GuardConfig,
}

impl OvertradingGuard {
    pub fn new(config: GuardConfig) -> Self {
        Self { config }
    }

    /// Checked in order: loss-streak cooldown, cycle gap, rolling entry count.
    pub fn check(
        &self,
        state: &OvertradingState,
        cycle: u64,
        now: DateTime<Utc>,
    ) -> Result<(), GuardBlock> {
        let c = &self.config;

        if state.consecutive_losses >= c.loss_streak {
            if let Some(last_loss) = state.last_loss_cycle {
                let since = cycle.saturating_sub(last_loss);
                if since < c.cooldown_cycles {
                    return Err(GuardBlock::LossStreakCooldown {
                        losses: state.consecutive_losses,
                        cycles_since_loss: since,
                    });
                }
            }
        }

        if let Some(since) = state.cycles_since_entry(cycle) {
            if since < c.min_cycle_gap {
                return Err(GuardBlock::CycleGap {
                    cycles_since_entry: since,
                });
            }
        }

        let entries = state.entries_within(now, Duration::hours(c.window_hours));
        if entries >= c.max_entries_in_window {
            return Err(GuardBlock::EntryWindow { entries });
        }

        Ok(())
    }
}

impl Default for OvertradingGuard {
    fn default() -> Self {
        Self::new(GuardConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use analysis_core::PositionSide;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 6, 16, 0, 0).unwrap()
    }

    #[test]
    fn test_fresh_symbol_passes() {
        assert!(OvertradingGuard::default()
            .check(&OvertradingState::default(), 1, now())
            .is_ok());
    }

    #[test]
    fn test_cycle_gap() {
        let guard = OvertradingGuard::default();
        let mut state = OvertradingState::default();
        state.record_entry(10, now() - Duration::hours(7), Duration::hours(6));

        assert_eq!(
            guard.check(&state, 13, now()),
            Err(GuardBlock::CycleGap {
                cycles_since_entry: 3
            })
        );
        assert!(guard.check(&state, 14, now()).is_ok());
    }

    #[test]
    fn test_entry_window() {
        let guard = OvertradingGuard::default();
        let mut state = OvertradingState::default();
        let window = Duration::hours(6);
        state.record_entry(1, now() - Duration::hours(5), window);
        state.record_entry(20, now() - Duration::hours(1), window);

        assert_eq!(
            guard.check(&state, 40, now()),
            Err(GuardBlock::EntryWindow { entries: 2 })
        );
        // the older entry ages out of the window
        assert!(guard.check(&state, 40, now() + Duration::hours(2)).is_ok());
    }

    #[test]
    fn test_loss_streak_cooldown() {
        let guard = OvertradingGuard::default();
        let mut state = OvertradingState::default();
        state.record_exit(10, -50.0, PositionSide::Short);
        state.record_exit(12, -75.0, PositionSide::Short);

        let block = guard.check(&state, 15, now()).unwrap_err();
        assert!(matches!(block, GuardBlock::LossStreakCooldown { losses: 2, .. }));
        assert!(block.to_string().contains("cooldown"));
        assert!(guard.check(&state, 18, now()).is_ok());

        state.record_exit(19, 30.0, PositionSide::Long);
        assert!(guard.check(&state, 19, now()).is_ok());
    }
}
