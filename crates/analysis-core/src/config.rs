//! Pipeline parameters.
//!
//! Every threshold, weight and limit used by the decision pipeline lives here
//! under a stable name so it can be tuned from a JSON document or the
//! environment without touching code. Defaults are the reference tuning.

use serde::{Deserialize, Serialize};

use crate::{AnalysisError, AnalysisResult, Horizon, PerHorizon, PositionSide, Timeframe};

/// Which optional stages run this cycle. A disabled stage yields "input unavailable".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CapabilityManifest {
    pub predictor: bool,
    pub trap_detector: bool,
    pub regime_classifier: bool,
    pub sentiment: bool,
}

impl Default for CapabilityManifest {
    fn default() -> Self {
        Self {
            predictor: true,
            trap_detector: true,
            regime_classifier: true,
            sentiment: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScorerConfig {
    pub ema_fast: usize,
    pub ema_slow: usize,
    pub trend_full_score: f64,
    pub trend_partial_score: f64,
    pub rsi_period: usize,
    pub rsi_extreme_oversold: f64,
    pub rsi_oversold: f64,
    pub rsi_overbought: f64,
    pub rsi_extreme_overbought: f64,
    pub rsi_extreme_points: f64,
    pub rsi_points: f64,
    pub stoch_period: usize,
    pub stoch_smooth: usize,
    pub stoch_extreme_oversold: f64,
    pub stoch_oversold: f64,
    pub stoch_overbought: f64,
    pub stoch_extreme_overbought: f64,
    pub stoch_extreme_points: f64,
    pub stoch_points: f64,
    pub atr_period: usize,
    pub adx_period: usize,
    pub macd_fast: usize,
    pub macd_slow: usize,
    pub macd_signal: usize,
    pub bb_period: usize,
    pub bb_std_dev: f64,
    pub volume_window: usize,
    pub roc_period: usize,
    pub sentiment_lookback: usize,
}

impl Default for ScorerConfig {
    fn default() -> Self {
        Self {
            ema_fast: 20,
            ema_slow: 60,
            trend_full_score: 60.0,
            trend_partial_score: 30.0,
            rsi_period: 14,
            rsi_extreme_oversold: 20.0,
            rsi_oversold: 30.0,
            rsi_overbought: 70.0,
            rsi_extreme_overbought: 80.0,
            rsi_extreme_points: 40.0,
            rsi_points: 25.0,
            stoch_period: 14,
            stoch_smooth: 3,
            stoch_extreme_oversold: 10.0,
            stoch_oversold: 20.0,
            stoch_overbought: 80.0,
            stoch_extreme_overbought: 90.0,
            stoch_extreme_points: 30.0,
            stoch_points: 20.0,
            atr_period: 14,
            adx_period: 14,
            macd_fast: 12,
            macd_slow: 26,
            macd_signal: 9,
            bb_period: 20,
            bb_std_dev: 2.0,
            volume_window: 20,
            roc_period: 10,
            sentiment_lookback: 12,
        }
    }
}

impl ScorerConfig {
    /// Fewest completed bars for which every indicator is defined.
    pub fn longest_lookback(&self) -> usize {
        [
            self.ema_slow,
            self.ema_fast,
            self.rsi_period + 1,
            self.stoch_period + self.stoch_smooth - 1,
            self.adx_period * 2,
            self.macd_slow + self.macd_signal - 1,
            self.bb_period,
            self.atr_period + 1,
            self.volume_window + 1,
            self.roc_period * 2 + 1,
        ]
        .into_iter()
        .max()
        .unwrap_or(0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegimeConfig {
    pub adx_trend: f64,
    pub adx_choppy: f64,
    pub atr_high_pct: f64,
    pub sma_fast: usize,
    pub sma_slow: usize,
    pub strength_high: f64,
    pub strength_low: f64,
    pub adx_strong_points: f64,
    pub adx_weak_points: f64,
    pub ma_alignment_points: f64,
    pub momentum_points: f64,
}

impl Default for RegimeConfig {
    fn default() -> Self {
        Self {
            adx_trend: 25.0,
            adx_choppy: 20.0,
            atr_high_pct: 2.5,
            sma_fast: 20,
            sma_slow: 50,
            strength_high: 70.0,
            strength_low: 30.0,
            adx_strong_points: 40.0,
            adx_weak_points: 20.0,
            ma_alignment_points: 30.0,
            momentum_points: 30.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PositionConfig {
    pub lookback: usize,
    pub support_max: f64,
    pub lower_max: f64,
    pub middle_max: f64,
    pub upper_max: f64,
    pub excellent_edge: f64,
    pub good_edge: f64,
    pub terrible_band: f64,
}

impl Default for PositionConfig {
    fn default() -> Self {
        Self {
            lookback: 50,
            support_max: 20.0,
            lower_max: 40.0,
            middle_max: 60.0,
            upper_max: 80.0,
            excellent_edge: 15.0,
            good_edge: 30.0,
            terrible_band: 5.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrapConfig {
    pub baseline_window: usize,
    pub rise_bars: usize,
    pub rise_min_pct: f64,
    pub decline_bars: usize,
    pub decline_min_down_bars: usize,
    pub max_retrace: f64,
    pub rise_volume_ratio: f64,
    pub drop_bars: usize,
    pub drop_min_pct: f64,
    pub rebound_bars: usize,
    pub rebound_min_pct: f64,
    pub rebound_volume_ratio: f64,
    pub divergence_lookback: usize,
    pub divergence_recent_bars: usize,
    pub divergence_volume_ratio: f64,
    pub accumulation_bars: usize,
    pub accumulation_range_pct: f64,
    pub accumulation_drift_pct: f64,
    pub accumulation_volume_ratio: f64,
    pub panic_rsi: f64,
    pub panic_drop_pct: f64,
    pub fomo_rsi: f64,
    pub fomo_gain_pct: f64,
    pub climax_volume_ratio: f64,
}

impl Default for TrapConfig {
    fn default() -> Self {
        Self {
            baseline_window: 20,
            rise_bars: 3,
            rise_min_pct: 1.5,
            decline_bars: 5,
            decline_min_down_bars: 3,
            max_retrace: 0.8,
            rise_volume_ratio: 1.2,
            drop_bars: 5,
            drop_min_pct: 2.0,
            rebound_bars: 3,
            rebound_min_pct: 1.0,
            rebound_volume_ratio: 0.8,
            divergence_lookback: 20,
            divergence_recent_bars: 5,
            divergence_volume_ratio: 0.7,
            accumulation_bars: 10,
            accumulation_range_pct: 3.0,
            accumulation_drift_pct: 1.0,
            accumulation_volume_ratio: 1.3,
            panic_rsi: 25.0,
            panic_drop_pct: 2.0,
            fomo_rsi: 75.0,
            fomo_gain_pct: 3.0,
            climax_volume_ratio: 2.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PredictorStrategy {
    RuleBased,
    Model,
}

impl std::str::FromStr for PredictorStrategy {
    type Err = AnalysisError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "rule_based" | "rules" | "rule" => Ok(PredictorStrategy::RuleBased),
            "model" | "ml" => Ok(PredictorStrategy::Model),
            other => Err(AnalysisError::Configuration(format!(
                "unknown predictor strategy '{}'",
                other
            ))),
        }
    }
}

/// Rule-based predictor feature weights
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureWeights {
    pub trend_score: f64,
    pub ema_cross_strength: f64,
    pub macd_histogram: f64,
    pub rsi: f64,
    pub bb_position: f64,
    pub stoch_k: f64,
    pub volume_ratio: f64,
    pub trend_confirmation: f64,
    pub price_roc: f64,
    pub momentum_accel: f64,
    pub trend_sustain: f64,
}

impl Default for FeatureWeights {
    fn default() -> Self {
        Self {
            trend_score: 0.15,
            ema_cross_strength: 0.10,
            macd_histogram: 0.10,
            rsi: 0.12,
            bb_position: 0.08,
            stoch_k: 0.05,
            volume_ratio: 0.10,
            trend_confirmation: 0.10,
            price_roc: 0.07,
            momentum_accel: 0.08,
            trend_sustain: 0.05,
        }
    }
}

impl FeatureWeights {
    fn all(&self) -> [(&'static str, f64); 11] {
        [
            ("trend_score", self.trend_score),
            ("ema_cross_strength", self.ema_cross_strength),
            ("macd_histogram", self.macd_histogram),
            ("rsi", self.rsi),
            ("bb_position", self.bb_position),
            ("stoch_k", self.stoch_k),
            ("volume_ratio", self.volume_ratio),
            ("trend_confirmation", self.trend_confirmation),
            ("price_roc", self.price_roc),
            ("momentum_accel", self.momentum_accel),
            ("trend_sustain", self.trend_sustain),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PredictorConfig {
    pub strategy: PredictorStrategy,
    /// Hard cap on rule-based confidence
    pub rule_confidence_cap: f64,
    pub model_confidence_cap: f64,
    /// Steepness of the tanh squashing of the net rule score
    pub squash_gain: f64,
    pub weights: FeatureWeights,
}

impl Default for PredictorConfig {
    fn default() -> Self {
        Self {
            strategy: PredictorStrategy::RuleBased,
            rule_confidence_cap: 0.70,
            model_confidence_cap: 0.90,
            squash_gain: 2.0,
            weights: FeatureWeights::default(),
        }
    }
}

/// Weighted-vote weights. Sentiment weight is scaled to zero when absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalWeights {
    pub trend: PerHorizon<f64>,
    pub oscillator: PerHorizon<f64>,
    pub predictor: f64,
    pub sentiment: f64,
}

impl Default for SignalWeights {
    fn default() -> Self {
        Self {
            trend: PerHorizon::new(0.03, 0.12, 0.30),
            oscillator: PerHorizon::new(0.03, 0.07, 0.10),
            predictor: 0.05,
            sentiment: 0.25,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardConfig {
    pub min_cycle_gap: u64,
    pub max_entries_in_window: usize,
    pub window_hours: i64,
    pub loss_streak: u32,
    pub cooldown_cycles: u64,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            min_cycle_gap: 4,
            max_entries_in_window: 2,
            window_hours: 6,
            loss_streak: 2,
            cooldown_cycles: 6,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ActionThresholds {
    pub long: f64,
    pub short: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegimeThresholds {
    pub trending_up: ActionThresholds,
    pub trending_down: ActionThresholds,
    pub choppy: ActionThresholds,
    pub default: ActionThresholds,
    pub alignment_offset: f64,
    pub floor: f64,
}

impl Default for RegimeThresholds {
    fn default() -> Self {
        Self {
            trending_up: ActionThresholds {
                long: 22.0,
                short: 32.0,
            },
            trending_down: ActionThresholds {
                long: 32.0,
                short: 18.0,
            },
            choppy: ActionThresholds {
                long: 30.0,
                short: 30.0,
            },
            default: ActionThresholds {
                long: 20.0,
                short: 18.0,
            },
            alignment_offset: 2.0,
            floor: 12.0,
        }
    }
}

/// Choppy-regime mean reversion on RSI and range position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeanReversionConfig {
    pub strong_long_rsi: f64,
    pub strong_long_position: f64,
    pub long_rsi: f64,
    pub long_position: f64,
    pub strong_short_rsi: f64,
    pub strong_short_position: f64,
    pub short_rsi: f64,
    pub short_position: f64,
    pub strong_base: f64,
    pub strong_slope: f64,
    pub strong_cap: f64,
    pub standard_confidence: f64,
}

impl Default for MeanReversionConfig {
    fn default() -> Self {
        Self {
            strong_long_rsi: 35.0,
            strong_long_position: 45.0,
            long_rsi: 40.0,
            long_position: 50.0,
            strong_short_rsi: 65.0,
            strong_short_position: 55.0,
            short_rsi: 60.0,
            short_position: 50.0,
            strong_base: 70.0,
            strong_slope: 0.5,
            strong_cap: 80.0,
            standard_confidence: 60.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    pub min_rvol: f64,
    pub low_adx: f64,
    pub low_rvol: f64,
    pub low_activity_min_score: f64,
    pub low_activity_factor: f64,
    pub high_rvol: f64,
    pub high_rvol_factor: f64,
    pub weak_rebound_factor: f64,
    pub weak_rebound_min_confidence: f64,
    pub volume_divergence_factor: f64,
    pub accumulation_factor: f64,
    pub panic_bottom_factor: f64,
    pub sentiment_divergence_min: f64,
    pub sentiment_divergence_factor: f64,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            min_rvol: 0.5,
            low_adx: 20.0,
            low_rvol: 0.8,
            low_activity_min_score: 40.0,
            low_activity_factor: 0.8,
            high_rvol: 1.5,
            high_rvol_factor: 1.15,
            weak_rebound_factor: 0.5,
            weak_rebound_min_confidence: 60.0,
            volume_divergence_factor: 0.7,
            accumulation_factor: 1.2,
            panic_bottom_factor: 1.3,
            sentiment_divergence_min: 10.0,
            sentiment_divergence_factor: 0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BandConfig {
    pub high: f64,
    pub medium: f64,
    pub high_min_score: f64,
    pub medium_margin: f64,
    pub max_confidence: f64,
}

impl Default for BandConfig {
    fn default() -> Self {
        Self {
            high: 85.0,
            medium: 65.0,
            high_min_score: 20.0,
            medium_margin: 10.0,
            max_confidence: 95.0,
        }
    }
}

/// ATR-derived stop distance, shared by the Decision Engine and the stop correction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StopConfig {
    pub atr_multiple: f64,
    pub min_pct: f64,
    pub max_pct: f64,
}

impl Default for StopConfig {
    fn default() -> Self {
        Self {
            atr_multiple: 1.5,
            min_pct: 0.5,
            max_pct: 3.0,
        }
    }
}

impl StopConfig {
    /// Bounded stop distance in percent of entry
    pub fn distance_pct(&self, atr_pct: f64) -> f64 {
        let raw = if atr_pct.is_finite() {
            atr_pct * self.atr_multiple
        } else {
            self.min_pct
        };
        raw.clamp(self.min_pct, self.max_pct)
    }

    /// Protective stop price on the losing side of `entry`
    pub fn stop_price(&self, entry: f64, atr_pct: f64, side: PositionSide) -> f64 {
        let distance = entry * self.distance_pct(atr_pct) / 100.0;
        match side {
            PositionSide::Long => entry - distance,
            PositionSide::Short => entry + distance,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SizingConfig {
    pub reward_trending: f64,
    pub reward_volatile: f64,
    pub reward_choppy: f64,
    pub reward_default: f64,
    pub high_confidence: f64,
    pub high_confidence_reward_boost: f64,
    pub base_position_value: f64,
    pub size_trending: f64,
    pub size_volatile: f64,
    pub size_choppy: f64,
    pub size_excellent: f64,
    pub size_poor: f64,
    pub size_terrible: f64,
    pub confidence_scale_above: f64,
    pub max_confidence_scale: f64,
    pub low_confidence: f64,
    pub low_confidence_scale: f64,
    pub leverage: f64,
}

impl Default for SizingConfig {
    fn default() -> Self {
        Self {
            reward_trending: 3.0,
            reward_volatile: 2.0,
            reward_choppy: 1.6,
            reward_default: 2.0,
            high_confidence: 80.0,
            high_confidence_reward_boost: 1.1,
            base_position_value: 10_000.0,
            size_trending: 1.2,
            size_volatile: 0.5,
            size_choppy: 0.7,
            size_excellent: 1.3,
            size_poor: 0.5,
            size_terrible: 0.3,
            confidence_scale_above: 70.0,
            max_confidence_scale: 1.5,
            low_confidence: 50.0,
            low_confidence_scale: 0.7,
            leverage: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecisionConfig {
    pub weights: SignalWeights,
    pub guard: GuardConfig,
    pub early_filter_min_score: f64,
    pub early_filter_confidence: f64,
    /// |trend| needed before a timeframe counts toward alignment
    pub alignment_deadzone: PerHorizon<f64>,
    pub thresholds: RegimeThresholds,
    pub mean_reversion: MeanReversionConfig,
    pub filters: FilterConfig,
    pub bands: BandConfig,
    pub sizing: SizingConfig,
    pub hold_confidence: f64,
}

impl Default for DecisionConfig {
    fn default() -> Self {
        Self {
            weights: SignalWeights::default(),
            guard: GuardConfig::default(),
            early_filter_min_score: 30.0,
            early_filter_confidence: 10.0,
            alignment_deadzone: PerHorizon::new(5.0, 15.0, 25.0),
            thresholds: RegimeThresholds::default(),
            mean_reversion: MeanReversionConfig::default(),
            filters: FilterConfig::default(),
            bands: BandConfig::default(),
            sizing: SizingConfig::default(),
            hold_confidence: 30.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    pub min_balance: f64,
    pub volatile_min_confidence: f64,
    pub choppy_min_confidence: f64,
    pub short_min_confidence: f64,
    pub short_min_score: f64,
    pub short_max_atr_pct: f64,
    pub short_max_sentiment: f64,
    pub short_max_losses: u32,
    pub middle_zone_min_confidence: f64,
    pub overbought_rsi: f64,
    pub oversold_rsi: f64,
    pub min_reward_risk: f64,
    pub max_leverage: f64,
    pub max_position_pct: f64,
    pub max_portfolio_risk_pct: f64,
    /// Realized loss for one session that trips the kill switch
    pub max_daily_loss: f64,
    pub max_trades_per_day: u32,
    pub max_drawdown_pct: f64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            min_balance: 100.0,
            volatile_min_confidence: 70.0,
            choppy_min_confidence: 75.0,
            short_min_confidence: 75.0,
            short_min_score: 25.0,
            short_max_atr_pct: 2.0,
            short_max_sentiment: 20.0,
            short_max_losses: 2,
            middle_zone_min_confidence: 70.0,
            overbought_rsi: 80.0,
            oversold_rsi: 20.0,
            min_reward_risk: 1.5,
            max_leverage: 1.0,
            max_position_pct: 20.0,
            max_portfolio_risk_pct: 6.0,
            max_daily_loss: 10_000.0,
            max_trades_per_day: 20,
            max_drawdown_pct: 5.0,
        }
    }
}

/// Full parameter tree for one pipeline instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Timeframe feeding regime, range position, traps, predictor and stops
    pub primary_timeframe: Horizon,
    pub timeframes: PerHorizon<Timeframe>,
    pub manifest: CapabilityManifest,
    pub scorer: ScorerConfig,
    pub regime: RegimeConfig,
    pub position: PositionConfig,
    pub traps: TrapConfig,
    pub predictor: PredictorConfig,
    pub decision: DecisionConfig,
    pub stop: StopConfig,
    pub risk: RiskConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            primary_timeframe: Horizon::Short,
            timeframes: PerHorizon::new(
                Horizon::Short.default_timeframe(),
                Horizon::Medium.default_timeframe(),
                Horizon::Long.default_timeframe(),
            ),
            manifest: CapabilityManifest::default(),
            scorer: ScorerConfig::default(),
            regime: RegimeConfig::default(),
            position: PositionConfig::default(),
            traps: TrapConfig::default(),
            predictor: PredictorConfig::default(),
            decision: DecisionConfig::default(),
            stop: StopConfig::default(),
            risk: RiskConfig::default(),
        }
    }
}

fn invalid(msg: String) -> AnalysisError {
    AnalysisError::Configuration(msg)
}

fn check_finite(name: &str, value: f64) -> AnalysisResult<()> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(invalid(format!("{} must be a finite number, got {}", name, value)))
    }
}

fn check_non_negative(name: &str, value: f64) -> AnalysisResult<()> {
    check_finite(name, value)?;
    if value < 0.0 {
        return Err(invalid(format!("{} must not be negative, got {}", name, value)));
    }
    Ok(())
}

fn check_positive(name: &str, value: f64) -> AnalysisResult<()> {
    check_finite(name, value)?;
    if value <= 0.0 {
        return Err(invalid(format!("{} must be positive, got {}", name, value)));
    }
    Ok(())
}

fn check_nonzero(name: &str, value: usize) -> AnalysisResult<()> {
    if value == 0 {
        return Err(invalid(format!("{} must be at least 1", name)));
    }
    Ok(())
}

fn check_ordered(names: &str, low: f64, high: f64) -> AnalysisResult<()> {
    check_finite(names, low)?;
    check_finite(names, high)?;
    if low > high {
        return Err(invalid(format!("{} out of order: {} > {}", names, low, high)));
    }
    Ok(())
}

impl PipelineConfig {
    pub fn from_json_str(json: &str) -> AnalysisResult<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| invalid(format!("cannot parse pipeline config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Override selected knobs from string lookups (normally `std::env::var`).
    pub fn apply_overrides<F>(&mut self, lookup: F) -> AnalysisResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        fn parse_f64(name: &str, raw: &str) -> AnalysisResult<f64> {
            raw.trim()
                .parse::<f64>()
                .map_err(|e| invalid(format!("{}='{}' is not a number: {}", name, raw, e)))
        }

        if let Some(raw) = lookup("PREDICTOR_STRATEGY") {
            self.predictor.strategy = raw.parse()?;
        }
        if let Some(raw) = lookup("PREDICTOR_RULE_CONFIDENCE_CAP") {
            self.predictor.rule_confidence_cap =
                parse_f64("PREDICTOR_RULE_CONFIDENCE_CAP", &raw)?;
        }
        if let Some(raw) = lookup("RISK_MIN_REWARD_RISK") {
            self.risk.min_reward_risk = parse_f64("RISK_MIN_REWARD_RISK", &raw)?;
        }
        if let Some(raw) = lookup("RISK_MAX_DAILY_LOSS") {
            self.risk.max_daily_loss = parse_f64("RISK_MAX_DAILY_LOSS", &raw)?;
        }
        if let Some(raw) = lookup("RISK_MAX_DRAWDOWN_PCT") {
            self.risk.max_drawdown_pct = parse_f64("RISK_MAX_DRAWDOWN_PCT", &raw)?;
        }
        if let Some(raw) = lookup("DECISION_BASE_POSITION_VALUE") {
            self.decision.sizing.base_position_value =
                parse_f64("DECISION_BASE_POSITION_VALUE", &raw)?;
        }
        if let Some(raw) = lookup("ENABLE_PREDICTOR") {
            self.manifest.predictor = parse_flag("ENABLE_PREDICTOR", &raw)?;
        }
        if let Some(raw) = lookup("ENABLE_TRAP_DETECTOR") {
            self.manifest.trap_detector = parse_flag("ENABLE_TRAP_DETECTOR", &raw)?;
        }
        self.validate()
    }

    /// Reject undefined or unsafe parameter values.
    pub fn validate(&self) -> AnalysisResult<()> {
        let s = &self.scorer;
        for (name, v) in [
            ("scorer.ema_fast", s.ema_fast),
            ("scorer.ema_slow", s.ema_slow),
            ("scorer.rsi_period", s.rsi_period),
            ("scorer.stoch_period", s.stoch_period),
            ("scorer.stoch_smooth", s.stoch_smooth),
            ("scorer.atr_period", s.atr_period),
            ("scorer.adx_period", s.adx_period),
            ("scorer.macd_fast", s.macd_fast),
            ("scorer.macd_slow", s.macd_slow),
            ("scorer.macd_signal", s.macd_signal),
            ("scorer.bb_period", s.bb_period),
            ("scorer.volume_window", s.volume_window),
            ("scorer.roc_period", s.roc_period),
            ("scorer.sentiment_lookback", s.sentiment_lookback),
            ("regime.sma_fast", self.regime.sma_fast),
            ("regime.sma_slow", self.regime.sma_slow),
            ("position.lookback", self.position.lookback),
        ] {
            check_nonzero(name, v)?;
        }
        if s.ema_fast >= s.ema_slow {
            return Err(invalid(format!(
                "scorer.ema_fast ({}) must be shorter than scorer.ema_slow ({})",
                s.ema_fast, s.ema_slow
            )));
        }
        if s.macd_fast >= s.macd_slow {
            return Err(invalid("scorer.macd_fast must be shorter than scorer.macd_slow".into()));
        }
        check_ordered("scorer.rsi oversold bands", s.rsi_extreme_oversold, s.rsi_oversold)?;
        check_ordered("scorer.rsi bands", s.rsi_oversold, s.rsi_overbought)?;
        check_ordered(
            "scorer.rsi overbought bands",
            s.rsi_overbought,
            s.rsi_extreme_overbought,
        )?;
        check_ordered("scorer.stoch oversold bands", s.stoch_extreme_oversold, s.stoch_oversold)?;
        check_ordered("scorer.stoch bands", s.stoch_oversold, s.stoch_overbought)?;
        check_ordered(
            "scorer.stoch overbought bands",
            s.stoch_overbought,
            s.stoch_extreme_overbought,
        )?;
        check_positive("scorer.bb_std_dev", s.bb_std_dev)?;

        let r = &self.regime;
        check_ordered("regime.adx_choppy/adx_trend", r.adx_choppy, r.adx_trend)?;
        check_ordered("regime.strength_low/strength_high", r.strength_low, r.strength_high)?;
        check_positive("regime.atr_high_pct", r.atr_high_pct)?;
        if r.sma_fast >= r.sma_slow {
            return Err(invalid("regime.sma_fast must be shorter than regime.sma_slow".into()));
        }

        let p = &self.position;
        check_ordered("position.support_max/lower_max", p.support_max, p.lower_max)?;
        check_ordered("position.lower_max/middle_max", p.lower_max, p.middle_max)?;
        check_ordered("position.middle_max/upper_max", p.middle_max, p.upper_max)?;

        let pr = &self.predictor;
        if !(pr.rule_confidence_cap > 0.0 && pr.rule_confidence_cap <= 1.0) {
            return Err(invalid(format!(
                "predictor.rule_confidence_cap must be in (0, 1], got {}",
                pr.rule_confidence_cap
            )));
        }
        if !(pr.model_confidence_cap > 0.0 && pr.model_confidence_cap <= 1.0) {
            return Err(invalid(format!(
                "predictor.model_confidence_cap must be in (0, 1], got {}",
                pr.model_confidence_cap
            )));
        }
        check_positive("predictor.squash_gain", pr.squash_gain)?;
        for (name, w) in pr.weights.all() {
            check_non_negative(&format!("predictor.weights.{}", name), w)?;
        }

        let w = &self.decision.weights;
        for (h, v) in w.trend.iter() {
            check_non_negative(&format!("decision.weights.trend.{}", h), *v)?;
        }
        for (h, v) in w.oscillator.iter() {
            check_non_negative(&format!("decision.weights.oscillator.{}", h), *v)?;
        }
        check_non_negative("decision.weights.predictor", w.predictor)?;
        check_non_negative("decision.weights.sentiment", w.sentiment)?;
        if w.sentiment > 0.25 {
            return Err(invalid(format!(
                "decision.weights.sentiment may not exceed 0.25, got {}",
                w.sentiment
            )));
        }

        let d = &self.decision;
        if d.guard.window_hours <= 0 {
            return Err(invalid("decision.guard.window_hours must be positive".into()));
        }
        check_non_negative("decision.early_filter_min_score", d.early_filter_min_score)?;
        for (name, t) in [
            ("trending_up", d.thresholds.trending_up),
            ("trending_down", d.thresholds.trending_down),
            ("choppy", d.thresholds.choppy),
            ("default", d.thresholds.default),
        ] {
            check_positive(&format!("decision.thresholds.{}.long", name), t.long)?;
            check_positive(&format!("decision.thresholds.{}.short", name), t.short)?;
        }
        check_non_negative("decision.thresholds.alignment_offset", d.thresholds.alignment_offset)?;
        check_non_negative("decision.thresholds.floor", d.thresholds.floor)?;
        check_ordered("decision.bands medium/high", d.bands.medium, d.bands.high)?;
        check_ordered("decision.bands high/max_confidence", d.bands.high, d.bands.max_confidence)?;
        if d.bands.max_confidence > 100.0 {
            return Err(invalid("decision.bands.max_confidence may not exceed 100".into()));
        }
        check_ordered(
            "decision.filters min_rvol/low_rvol",
            d.filters.min_rvol,
            d.filters.low_rvol,
        )?;
        check_ordered(
            "decision.filters low_rvol/high_rvol",
            d.filters.low_rvol,
            d.filters.high_rvol,
        )?;
        check_positive("decision.sizing.base_position_value", d.sizing.base_position_value)?;
        check_positive("decision.sizing.leverage", d.sizing.leverage)?;
        for (name, v) in [
            ("reward_trending", d.sizing.reward_trending),
            ("reward_volatile", d.sizing.reward_volatile),
            ("reward_choppy", d.sizing.reward_choppy),
            ("reward_default", d.sizing.reward_default),
        ] {
            check_positive(&format!("decision.sizing.{}", name), v)?;
        }

        check_positive("stop.atr_multiple", self.stop.atr_multiple)?;
        check_positive("stop.min_pct", self.stop.min_pct)?;
        check_ordered("stop.min_pct/max_pct", self.stop.min_pct, self.stop.max_pct)?;

        let k = &self.risk;
        check_non_negative("risk.min_balance", k.min_balance)?;
        check_positive("risk.min_reward_risk", k.min_reward_risk)?;
        check_positive("risk.max_leverage", k.max_leverage)?;
        check_positive("risk.max_position_pct", k.max_position_pct)?;
        check_positive("risk.max_portfolio_risk_pct", k.max_portfolio_risk_pct)?;
        check_positive("risk.max_daily_loss", k.max_daily_loss)?;
        check_positive("risk.max_drawdown_pct", k.max_drawdown_pct)?;
        check_nonzero("risk.max_trades_per_day", k.max_trades_per_day as usize)?;
        check_ordered("risk oversold/overbought rsi", k.oversold_rsi, k.overbought_rsi)?;

        Ok(())
    }
}

fn parse_flag(name: &str, raw: &str) -> AnalysisResult<bool> {
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(invalid(format!("{}='{}' is not a boolean", name, other))),
    }
}
