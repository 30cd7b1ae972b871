use analysis_core::{stats, Bar, TrapConfig, TrapFlags, TrapKind};

/// Flags adversarial price/volume shapes on completed bars.
///
/// Each predicate is evaluated on its own; flags are advisory and carry no
/// precedence between them.
pub struct TrapDetector {
    config: TrapConfig,
}

fn avg_volume(bars: &[Bar]) -> f64 {
    stats::mean(&bars.iter().map(|b| b.volume).collect::<Vec<_>>())
}

fn volume_ratio(recent: &[Bar], baseline: &[Bar]) -> Option<f64> {
    let base = avg_volume(baseline);
    if base <= 0.0 || recent.is_empty() {
        return None;
    }
    Some(avg_volume(recent) / base)
}

impl TrapDetector {
    pub fn new(config: TrapConfig) -> Self {
        Self { config }
    }

    /// Evaluate every trap predicate. `rsi` is the latest oscillator reading, if known.
    pub fn detect(&self, bars: &[Bar], rsi: Option<f64>) -> TrapFlags {
        let mut flags = TrapFlags::default();

        let checks: [(TrapKind, Option<String>); 6] = [
            (TrapKind::BullTrapRisk, self.bull_trap(bars)),
            (TrapKind::WeakRebound, self.weak_rebound(bars)),
            (TrapKind::VolumeDivergence, self.volume_divergence(bars)),
            (TrapKind::Accumulation, self.accumulation(bars)),
            (TrapKind::PanicBottom, rsi.and_then(|r| self.panic_bottom(bars, r))),
            (TrapKind::FomoTop, rsi.and_then(|r| self.fomo_top(bars, r))),
        ];

        for (kind, note) in checks {
            if let Some(note) = note {
                flags.set(kind, note);
            }
        }
        flags
    }

    /// Fast rise, then an immediate slow decline, with no volume behind the rise.
    fn bull_trap(&self, bars: &[Bar]) -> Option<String> {
        let c = &self.config;
        let span = c.rise_bars + c.decline_bars;
        if c.rise_bars == 0 || c.decline_bars == 0 || bars.len() < span + c.baseline_window {
            return None;
        }

        let segment = stats::tail(bars, span);
        let baseline = &bars[bars.len() - span - c.baseline_window..bars.len() - span];
        let (rise, decline) = segment.split_at(c.rise_bars);

        let rise_start = rise.first()?.open;
        let rise_end = rise.last()?.close;
        let rise_pct = stats::pct_change(rise_start, rise_end);
        if rise_pct < c.rise_min_pct {
            return None;
        }

        let mut prev_close = rise_end;
        let mut down_bars = 0;
        for bar in decline {
            if bar.close < prev_close {
                down_bars += 1;
            }
            prev_close = bar.close;
        }
        if down_bars < c.decline_min_down_bars {
            return None;
        }

        let decline_end = decline.last()?.close;
        let retrace = (rise_end - decline_end) / (rise_end - rise_start);
        if retrace <= 0.0 || retrace > c.max_retrace {
            return None;
        }

        let rise_volume = volume_ratio(rise, baseline)?;
        if rise_volume >= c.rise_volume_ratio {
            return None;
        }

        Some(format!(
            "{:.1}% rise on {:.2}x volume, {:.0}% retraced over {} bars",
            rise_pct,
            rise_volume,
            retrace * 100.0,
            c.decline_bars
        ))
    }

    /// Bounce after a drop on thinner volume than the drop itself.
    fn weak_rebound(&self, bars: &[Bar]) -> Option<String> {
        let c = &self.config;
        let span = c.drop_bars + c.rebound_bars;
        if c.drop_bars == 0 || c.rebound_bars == 0 || bars.len() < span {
            return None;
        }

        let (drop, rebound) = stats::tail(bars, span).split_at(c.drop_bars);
        let drop_end = drop.last()?.close;
        let drop_pct = stats::pct_change(drop.first()?.open, drop_end);
        if drop_pct > -c.drop_min_pct {
            return None;
        }

        let rebound_pct = stats::pct_change(drop_end, rebound.last()?.close);
        if rebound_pct < c.rebound_min_pct {
            return None;
        }

        let ratio = volume_ratio(rebound, drop)?;
        if ratio >= c.rebound_volume_ratio {
            return None;
        }

        Some(format!(
            "{:.1}% rebound after {:.1}% drop on {:.2}x the selling volume",
            rebound_pct, drop_pct, ratio
        ))
    }

    /// New high printed on fading volume.
    fn volume_divergence(&self, bars: &[Bar]) -> Option<String> {
        let c = &self.config;
        if c.divergence_lookback <= c.divergence_recent_bars || bars.len() < c.divergence_lookback {
            return None;
        }

        let window = stats::tail(bars, c.divergence_lookback);
        let (history, last) = window.split_at(window.len() - 1);
        let last_close = last.first()?.close;
        let prior_high = history
            .iter()
            .map(|b| b.close)
            .fold(f64::NEG_INFINITY, f64::max);
        if last_close < prior_high {
            return None;
        }

        let (earlier, recent) = window.split_at(window.len() - c.divergence_recent_bars);
        let ratio = volume_ratio(recent, earlier)?;
        if ratio >= c.divergence_volume_ratio {
            return None;
        }

        Some(format!("new {}-bar high on {:.2}x volume", c.divergence_lookback, ratio))
    }

    /// Tight range, flat price, swelling volume.
    fn accumulation(&self, bars: &[Bar]) -> Option<String> {
        let c = &self.config;
        let recent_bars = 5;
        if c.accumulation_bars < recent_bars || bars.len() < c.accumulation_bars + recent_bars {
            return None;
        }

        let window = stats::tail(bars, c.accumulation_bars);
        let last_close = window.last()?.close;
        if last_close <= 0.0 {
            return None;
        }
        let high = window.iter().map(|b| b.high).fold(f64::NEG_INFINITY, f64::max);
        let low = window.iter().map(|b| b.low).fold(f64::INFINITY, f64::min);
        let range_pct = (high - low) / last_close * 100.0;
        if range_pct > c.accumulation_range_pct {
            return None;
        }

        let drift = stats::pct_change(window.first()?.close, last_close);
        if drift.abs() >= c.accumulation_drift_pct {
            return None;
        }

        let tail = stats::tail(bars, c.accumulation_bars + recent_bars);
        let (earlier, recent) = tail.split_at(c.accumulation_bars);
        let ratio = volume_ratio(recent, earlier)?;
        if ratio < c.accumulation_volume_ratio {
            return None;
        }

        Some(format!(
            "{:.1}% range with volume up {:.2}x",
            range_pct, ratio
        ))
    }

    /// Oversold capitulation bar on climactic volume.
    fn panic_bottom(&self, bars: &[Bar], rsi: f64) -> Option<String> {
        let c = &self.config;
        if rsi >= c.panic_rsi {
            return None;
        }
        let (last, ratio) = self.climax_bar(bars)?;
        if last.change_pct() > -c.panic_drop_pct {
            return None;
        }
        Some(format!(
            "RSI {:.1}, {:.1}% bar on {:.1}x volume",
            rsi,
            last.change_pct(),
            ratio
        ))
    }

    /// Overbought run-up finishing on climactic volume.
    fn fomo_top(&self, bars: &[Bar], rsi: f64) -> Option<String> {
        let c = &self.config;
        if rsi <= c.fomo_rsi || bars.len() < 4 {
            return None;
        }
        let (last, ratio) = self.climax_bar(bars)?;
        let gain = stats::pct_change(bars[bars.len() - 4].close, last.close);
        if gain < c.fomo_gain_pct {
            return None;
        }
        Some(format!(
            "RSI {:.1}, {:.1}% in 3 bars on {:.1}x volume",
            rsi, gain, ratio
        ))
    }

    /// Last bar, if its volume is a climax against the baseline window.
    fn climax_bar<'a>(&self, bars: &'a [Bar]) -> Option<(&'a Bar, f64)> {
        let c = &self.config;
        if bars.len() < c.baseline_window + 1 {
            return None;
        }
        let (last, history) = bars.split_last()?;
        let ratio = volume_ratio(
            std::slice::from_ref(last),
            stats::tail(history, c.baseline_window),
        )?;
        if ratio < c.climax_volume_ratio {
            return None;
        }
        Some((last, ratio))
    }
}

impl Default for TrapDetector {
    fn default() -> Self {
        Self::new(TrapConfig::default())
    }
}
