//! Where the latest price sits inside its recent high/low range.

use analysis_core::{Bar, PositionConfig, PositionQuality, PricePosition, RangeZone};

pub struct PricePositionAnalyzer {
    config: PositionConfig,
}

impl PricePositionAnalyzer {
    pub fn new(config: PositionConfig) -> Self {
        Self { config }
    }

    /// Position over the last `lookback` completed bars plus `price`.
    /// None without any bars or with a non-finite price.
    pub fn analyze(&self, bars: &[Bar], price: f64) -> Option<PricePosition> {
        if bars.is_empty() || !price.is_finite() {
            return None;
        }

        let start = bars.len().saturating_sub(self.config.lookback.max(1));
        let window = &bars[start..];
        let range_high = window.iter().map(|b| b.high).fold(price, f64::max);
        let range_low = window.iter().map(|b| b.low).fold(price, f64::min);

        let pct = if range_high - range_low <= f64::EPSILON {
            50.0
        } else {
            ((price - range_low) / (range_high - range_low) * 100.0).clamp(0.0, 100.0)
        };

        let c = &self.config;
        let zone = if pct <= c.support_max {
            RangeZone::Support
        } else if pct <= c.lower_max {
            RangeZone::Lower
        } else if pct <= c.middle_max {
            RangeZone::Middle
        } else if pct <= c.upper_max {
            RangeZone::Upper
        } else {
            RangeZone::Resistance
        };

        let edge = pct.min(100.0 - pct);
        let quality = if edge <= c.excellent_edge {
            PositionQuality::Excellent
        } else if edge <= c.good_edge {
            PositionQuality::Good
        } else if (pct - 50.0).abs() <= c.terrible_band {
            PositionQuality::Terrible
        } else {
            PositionQuality::Poor
        };

        Some(PricePosition {
            pct,
            zone,
            quality,
            // both closed off across [lower_max, middle_max]
            allow_long: pct < c.lower_max,
            allow_short: pct > c.middle_max,
            range_high,
            range_low,
        })
    }
}

impl Default for PricePositionAnalyzer {
    fn default() -> Self {
        Self::new(PositionConfig::default())
    }
}
