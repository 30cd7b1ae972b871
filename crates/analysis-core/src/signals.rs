use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Discrete market regime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegimeKind {
    TrendingUp,
    TrendingDown,
    Choppy,
    Volatile,
    VolatileDirectionless,
    Unknown,
}

impl RegimeKind {
    pub fn name(&self) -> &'static str {
        match self {
            RegimeKind::TrendingUp => "trending_up",
            RegimeKind::TrendingDown => "trending_down",
            RegimeKind::Choppy => "choppy",
            RegimeKind::Volatile => "volatile",
            RegimeKind::VolatileDirectionless => "volatile_directionless",
            RegimeKind::Unknown => "unknown",
        }
    }

    pub fn is_trending(&self) -> bool {
        matches!(self, RegimeKind::TrendingUp | RegimeKind::TrendingDown)
    }

    pub fn is_volatile(&self) -> bool {
        matches!(self, RegimeKind::Volatile | RegimeKind::VolatileDirectionless)
    }
}

/// Direction agreed on by price and its moving averages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Up,
    Down,
    None,
}

/// Regime classification for one cycle. No memory of earlier cycles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegimeState {
    pub kind: RegimeKind,
    /// Saturating additive score, 0..100
    pub trend_strength: f64,
    pub direction: TrendDirection,
    /// 0..100
    pub confidence: f64,
    pub adx: f64,
    pub atr_pct: f64,
    pub reasoning: String,
}

impl RegimeState {
    pub fn unknown(reasoning: impl Into<String>) -> Self {
        Self {
            kind: RegimeKind::Unknown,
            trend_strength: 0.0,
            direction: TrendDirection::None,
            confidence: 0.0,
            adx: 0.0,
            atr_pct: 0.0,
            reasoning: reasoning.into(),
        }
    }
}

/// Where price sits inside its recent range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RangeZone {
    Support,
    Lower,
    Middle,
    Upper,
    Resistance,
}

impl RangeZone {
    pub fn name(&self) -> &'static str {
        match self {
            RangeZone::Support => "support",
            RangeZone::Lower => "lower",
            RangeZone::Middle => "middle",
            RangeZone::Upper => "upper",
            RangeZone::Resistance => "resistance",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionQuality {
    Excellent,
    Good,
    Poor,
    Terrible,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricePosition {
    /// 0 = range low, 100 = range high
    pub pct: f64,
    pub zone: RangeZone,
    pub quality: PositionQuality,
    pub allow_long: bool,
    pub allow_short: bool,
    pub range_high: f64,
    pub range_low: f64,
}

/// Named adversarial price-action patterns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrapKind {
    BullTrapRisk,
    WeakRebound,
    VolumeDivergence,
    Accumulation,
    PanicBottom,
    FomoTop,
}

impl TrapKind {
    pub const ALL: [TrapKind; 6] = [
        TrapKind::BullTrapRisk,
        TrapKind::WeakRebound,
        TrapKind::VolumeDivergence,
        TrapKind::Accumulation,
        TrapKind::PanicBottom,
        TrapKind::FomoTop,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            TrapKind::BullTrapRisk => "bull_trap_risk",
            TrapKind::WeakRebound => "weak_rebound",
            TrapKind::VolumeDivergence => "volume_divergence",
            TrapKind::Accumulation => "accumulation",
            TrapKind::PanicBottom => "panic_bottom",
            TrapKind::FomoTop => "fomo_top",
        }
    }
}

/// Independently computed trap flags; any number may be set at once.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TrapFlags {
    pub bull_trap_risk: bool,
    pub weak_rebound: bool,
    pub volume_divergence: bool,
    pub accumulation: bool,
    pub panic_bottom: bool,
    pub fomo_top: bool,
    /// Short note per raised flag
    #[serde(default)]
    pub notes: BTreeMap<TrapKind, String>,
}

impl TrapFlags {
    pub fn is_set(&self, kind: TrapKind) -> bool {
        match kind {
            TrapKind::BullTrapRisk => self.bull_trap_risk,
            TrapKind::WeakRebound => self.weak_rebound,
            TrapKind::VolumeDivergence => self.volume_divergence,
            TrapKind::Accumulation => self.accumulation,
            TrapKind::PanicBottom => self.panic_bottom,
            TrapKind::FomoTop => self.fomo_top,
        }
    }

    pub fn set(&mut self, kind: TrapKind, note: impl Into<String>) {
        match kind {
            TrapKind::BullTrapRisk => self.bull_trap_risk = true,
            TrapKind::WeakRebound => self.weak_rebound = true,
            TrapKind::VolumeDivergence => self.volume_divergence = true,
            TrapKind::Accumulation => self.accumulation = true,
            TrapKind::PanicBottom => self.panic_bottom = true,
            TrapKind::FomoTop => self.fomo_top = true,
        }
        self.notes.insert(kind, note.into());
    }

    pub fn active(&self) -> Vec<TrapKind> {
        TrapKind::ALL
            .iter()
            .copied()
            .filter(|k| self.is_set(*k))
            .collect()
    }

    pub fn any(&self) -> bool {
        !self.active().is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalLabel {
    StrongBullish,
    Bullish,
    Neutral,
    Bearish,
    StrongBearish,
}

impl SignalLabel {
    pub fn from_probability(prob_up: f64) -> Self {
        if prob_up > 0.65 {
            SignalLabel::StrongBullish
        } else if prob_up > 0.55 {
            SignalLabel::Bullish
        } else if prob_up < 0.35 {
            SignalLabel::StrongBearish
        } else if prob_up < 0.45 {
            SignalLabel::Bearish
        } else {
            SignalLabel::Neutral
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PredictionSource {
    RuleBased,
    Model,
}

/// Up/down probability estimate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub prob_up: f64,
    /// Not required to equal 1 - prob_up for model output
    pub prob_down: f64,
    /// 0..1
    pub confidence: f64,
    pub label: SignalLabel,
    /// Signed named contributions
    pub factors: BTreeMap<String, f64>,
    pub source: PredictionSource,
    pub predicted_at: DateTime<Utc>,
}

impl Prediction {
    /// Map to the -100..100 scale used by the weighted vote
    pub fn score(&self) -> f64 {
        (self.prob_up - 0.5) * 200.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trap_flags_are_independent() {
        let mut flags = TrapFlags::default();
        assert!(!flags.any());
        flags.set(TrapKind::BullTrapRisk, "rise on thin volume");
        flags.set(TrapKind::VolumeDivergence, "new high, fading volume");
        assert!(flags.is_set(TrapKind::BullTrapRisk));
        assert!(!flags.is_set(TrapKind::PanicBottom));
        assert_eq!(
            flags.active(),
            vec![TrapKind::BullTrapRisk, TrapKind::VolumeDivergence]
        );
        assert_eq!(flags.notes.len(), 2);
    }

    #[test]
    fn test_signal_label_bands() {
        assert_eq!(SignalLabel::from_probability(0.70), SignalLabel::StrongBullish);
        assert_eq!(SignalLabel::from_probability(0.60), SignalLabel::Bullish);
        assert_eq!(SignalLabel::from_probability(0.50), SignalLabel::Neutral);
        assert_eq!(SignalLabel::from_probability(0.40), SignalLabel::Bearish);
        assert_eq!(SignalLabel::from_probability(0.20), SignalLabel::StrongBearish);
    }

    #[test]
    fn test_regime_kind_helpers() {
        assert!(RegimeKind::TrendingDown.is_trending());
        assert!(RegimeKind::VolatileDirectionless.is_volatile());
        assert!(!RegimeKind::Choppy.is_volatile());
        assert_eq!(RegimeKind::VolatileDirectionless.name(), "volatile_directionless");
    }
}
