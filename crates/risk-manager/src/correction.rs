use analysis_core::{PositionSide, StopConfig, TradeParams};

const TOLERANCE_PCT: f64 = 1e-9;

/// True when the stop sits on the protective side of entry at a distance
/// inside the configured band.
pub fn stop_is_sane(params: &TradeParams, side: PositionSide, stop: &StopConfig) -> bool {
    let protective = match side {
        PositionSide::Long => params.stop_loss < params.entry_price,
        PositionSide::Short => params.stop_loss > params.entry_price,
    };
    let distance = params.stop_distance_pct();
    protective
        && distance >= stop.min_pct - TOLERANCE_PCT
        && distance <= stop.max_pct + TOLERANCE_PCT
}

/// Recompute a bad stop from ATR. Returns None when the stop is already sane,
/// so applying the result twice changes nothing.
pub fn correct_stop(
    params: &TradeParams,
    side: PositionSide,
    atr_pct: f64,
    stop: &StopConfig,
) -> Option<TradeParams> {
    if stop_is_sane(params, side, stop) {
        return None;
    }
    let mut corrected = params.clone();
    corrected.stop_loss = stop.stop_price(params.entry_price, atr_pct, side);
    Some(corrected)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(entry: f64, stop_loss: f64) -> TradeParams {
        TradeParams {
            entry_price: entry,
            stop_loss,
            take_profit: entry * 1.04,
            quantity: 10.0,
            notional: entry * 10.0,
            leverage: 1.0,
            atr: 1.0,
        }
    }

    #[test]
    fn test_sane_stop_is_left_alone() {
        let stop = StopConfig::default();
        assert!(correct_stop(&params(100.0, 98.5), PositionSide::Long, 1.0, &stop).is_none());
        assert!(correct_stop(&params(100.0, 101.0), PositionSide::Short, 1.0, &stop).is_none());
    }

    #[test]
    fn test_wrong_side_stop_is_recomputed() {
        let stop = StopConfig::default();
        let fixed = correct_stop(&params(100.0, 101.0), PositionSide::Long, 1.0, &stop).unwrap();
        assert!((fixed.stop_loss - 98.5).abs() < 1e-9);
        assert_eq!(fixed.take_profit, 104.0);
    }

    #[test]
    fn test_out_of_band_distance_is_recomputed() {
        let stop = StopConfig::default();
        // 10% away, clamped ATR distance is 3%
        let fixed = correct_stop(&params(100.0, 90.0), PositionSide::Long, 4.0, &stop).unwrap();
        assert!((fixed.stop_loss - 97.0).abs() < 1e-9);

        // 0.1% away, floor is 0.5%
        let fixed = correct_stop(&params(100.0, 100.1), PositionSide::Short, 0.1, &stop).unwrap();
        assert!((fixed.stop_loss - 100.5).abs() < 1e-9);
    }

    #[test]
    fn test_correction_is_idempotent() {
        let stop = StopConfig::default();
        let once = correct_stop(&params(250.0, 260.0), PositionSide::Long, 1.3, &stop).unwrap();
        assert!(correct_stop(&once, PositionSide::Long, 1.3, &stop).is_none());
    }
}
