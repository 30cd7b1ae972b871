use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::PositionSide;

/// Per-symbol entry counters that live across cycles.
///
/// Written only by the execution side once an entry or exit is confirmed;
/// the decision pipeline reads a possibly stale copy.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct OvertradingState {
    /// Bumped on every write, used for compare-and-update
    pub version: u64,
    pub last_entry_cycle: Option<u64>,
    /// Entry times, oldest first
    pub entry_times: Vec<DateTime<Utc>>,
    pub consecutive_losses: u32,
    pub consecutive_short_losses: u32,
    pub last_loss_cycle: Option<u64>,
}

impl OvertradingState {
    /// Cycles since the last entry, None if there never was one
    pub fn cycles_since_entry(&self, cycle: u64) -> Option<u64> {
        self.last_entry_cycle.map(|c| cycle.saturating_sub(c))
    }

    pub fn entries_within(&self, now: DateTime<Utc>, window: Duration) -> usize {
        let cutoff = now - window;
        self.entry_times.iter().filter(|t| **t > cutoff).count()
    }

    pub fn record_entry(&mut self, cycle: u64, at: DateTime<Utc>, window: Duration) {
        self.last_entry_cycle = Some(cycle);
        self.entry_times.push(at);
        let cutoff = at - window;
        self.entry_times.retain(|t| *t > cutoff);
        self.version += 1;
    }

    pub fn record_exit(&mut self, cycle: u64, pnl: f64, side: PositionSide) {
        if pnl < 0.0 {
            self.consecutive_losses += 1;
            self.last_loss_cycle = Some(cycle);
            if side == PositionSide::Short {
                self.consecutive_short_losses += 1;
            }
        } else {
            self.consecutive_losses = 0;
            if side == PositionSide::Short {
                self.consecutive_short_losses = 0;
            }
        }
        self.version += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 6, 4, 0, 0).unwrap()
    }

    #[test]
    fn test_entry_window_prunes_old_entries() {
        let mut state = OvertradingState::default();
        let window = Duration::hours(6);
        state.record_entry(1, t0(), window);
        state.record_entry(10, t0() + Duration::hours(2), window);
        state.record_entry(80, t0() + Duration::hours(7), window);

        assert_eq!(state.entry_times.len(), 2);
        assert_eq!(state.entries_within(t0() + Duration::hours(7), window), 2);
        assert_eq!(state.cycles_since_entry(84), Some(4));
        assert_eq!(state.version, 3);
    }

    #[test]
    fn test_loss_streaks() {
        let mut state = OvertradingState::default();
        state.record_exit(5, -120.0, PositionSide::Short);
        state.record_exit(9, -80.0, PositionSide::Short);
        assert_eq!(state.consecutive_losses, 2);
        assert_eq!(state.consecutive_short_losses, 2);
        assert_eq!(state.last_loss_cycle, Some(9));

        state.record_exit(12, 200.0, PositionSide::Long);
        assert_eq!(state.consecutive_losses, 0);
        assert_eq!(state.consecutive_short_losses, 2);
    }
}
