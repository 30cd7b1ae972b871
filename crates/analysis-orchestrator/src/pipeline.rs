use analysis_core::{
    AccountState, AnalysisError, AnalysisResult, OvertradingState, PipelineConfig, RiskVerdict,
    Snapshot, TradeDecision,
};
use decision_engine::{DecisionEngine, DecisionInputs};
use market_regime_detector::{PricePositionAnalyzer, RegimeClassifier};
use ml_client::{Predictor, PredictorFeatures, ProbabilityEstimator};
use multi_timeframe::SnapshotBuilder;
use risk_manager::{AuditContext, RiskAuditor};
use serde::Serialize;
use std::sync::Arc;
use technical_analysis::{IndicatorScorer, TrapDetector};
use tracing::{debug, info, warn};

/// Terminal result of one symbol's pass through the pipeline.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SymbolOutcome {
    Approved {
        decision: TradeDecision,
        verdict: RiskVerdict,
    },
    Vetoed {
        decision: TradeDecision,
        verdict: RiskVerdict,
    },
    Hold {
        decision: TradeDecision,
        verdict: RiskVerdict,
    },
    /// Data-quality failure; the symbol holds this cycle
    Degraded { symbol: String, reason: String },
}

impl SymbolOutcome {
    fn from_pair(decision: TradeDecision, verdict: RiskVerdict) -> Self {
        if decision.is_hold() {
            SymbolOutcome::Hold { decision, verdict }
        } else if verdict.passed {
            SymbolOutcome::Approved { decision, verdict }
        } else {
            SymbolOutcome::Vetoed { decision, verdict }
        }
    }

    pub fn degraded(symbol: &str, error: &AnalysisError) -> Self {
        SymbolOutcome::Degraded {
            symbol: symbol.to_string(),
            reason: error.to_string(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            SymbolOutcome::Approved { .. } => "approved",
            SymbolOutcome::Vetoed { .. } => "vetoed",
            SymbolOutcome::Hold { .. } => "hold",
            SymbolOutcome::Degraded { .. } => "degraded",
        }
    }

    pub fn symbol(&self) -> &str {
        match self {
            SymbolOutcome::Approved { decision, .. }
            | SymbolOutcome::Vetoed { decision, .. }
            | SymbolOutcome::Hold { decision, .. } => &decision.symbol,
            SymbolOutcome::Degraded { symbol, .. } => symbol,
        }
    }

    /// Decision and verdict, absent for degraded symbols
    pub fn pair(&self) -> Option<(&TradeDecision, &RiskVerdict)> {
        match self {
            SymbolOutcome::Approved { decision, verdict }
            | SymbolOutcome::Vetoed { decision, verdict }
            | SymbolOutcome::Hold { decision, verdict } => Some((decision, verdict)),
            SymbolOutcome::Degraded { .. } => None,
        }
    }

    pub fn is_approved(&self) -> bool {
        matches!(self, SymbolOutcome::Approved { .. })
    }
}

/// All pipeline stages wired in order for a single configuration.
pub struct SignalPipeline {
    config: PipelineConfig,
    pub(crate) builder: SnapshotBuilder,
    scorer: IndicatorScorer,
    regime: RegimeClassifier,
    position: PricePositionAnalyzer,
    traps: TrapDetector,
    predictor: Predictor,
    engine: DecisionEngine,
    auditor: RiskAuditor,
}

impl SignalPipeline {
    /// Validates the configuration; an invalid tree is a Configuration error.
    pub fn new(config: PipelineConfig) -> AnalysisResult<Self> {
        config.validate()?;
        let builder = SnapshotBuilder::new(config.timeframes.clone())?;

        Ok(Self {
            builder,
            scorer: IndicatorScorer::new(config.scorer.clone()),
            regime: RegimeClassifier::new(config.regime.clone()),
            position: PricePositionAnalyzer::new(config.position.clone()),
            traps: TrapDetector::new(config.traps.clone()),
            predictor: Predictor::new(config.predictor.clone()),
            engine: DecisionEngine::new(config.decision.clone(), config.stop.clone()),
            auditor: RiskAuditor::new(config.risk.clone(), config.stop.clone()),
            config,
        })
    }

    pub fn with_estimator(mut self, estimator: Arc<dyn ProbabilityEstimator>) -> Self {
        self.predictor = Predictor::new(self.config.predictor.clone()).with_estimator(estimator);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run every stage for one snapshot. Stages disabled in the manifest
    /// hand `None` downstream.
    pub async fn evaluate(
        &self,
        snapshot: &Snapshot,
        account: &AccountState,
        overtrading: &OvertradingState,
        cycle: u64,
    ) -> SymbolOutcome {
        let manifest = &self.config.manifest;
        let primary = self.config.primary_timeframe;
        let now = snapshot.built_at;
        let symbol = snapshot.symbol.as_str();

        let scores = self.scorer.score_snapshot(snapshot, manifest);
        let primary_scores = scores.get(primary);
        let bars = snapshot.series(primary).completed();

        let regime = manifest
            .regime_classifier
            .then(|| self.regime.detect(bars, primary_scores));
        let position = primary_scores.and_then(|s| self.position.analyze(bars, s.readings.price));
        let traps = manifest
            .trap_detector
            .then(|| self.traps.detect(bars, primary_scores.map(|s| s.readings.rsi)));

        let prediction = match PredictorFeatures::from_scores(&scores, primary) {
            Some(features) if manifest.predictor => {
                Some(self.predictor.predict(&features, now).await)
            }
            _ => None,
        };

        debug!(
            symbol,
            regime = regime.as_ref().map(|r| r.kind.name()),
            traps = traps.as_ref().map(|t| t.active().len()),
            prob_up = prediction.as_ref().map(|p| p.prob_up),
            "Stages complete"
        );

        let decision = self.engine.decide(&DecisionInputs {
            symbol,
            cycle,
            now,
            primary,
            scores: &scores,
            regime: regime.as_ref(),
            position: position.as_ref(),
            traps: traps.as_ref(),
            prediction: prediction.as_ref(),
            overtrading,
        });
        let verdict = self.auditor.audit(&decision, &AuditContext { account, overtrading });

        let outcome = SymbolOutcome::from_pair(decision, verdict);
        log_outcome(&outcome);
        outcome
    }
}

fn log_outcome(outcome: &SymbolOutcome) {
    match outcome {
        SymbolOutcome::Approved { decision, verdict } => info!(
            symbol = %decision.symbol,
            outcome = "approved",
            action = decision.action.name(),
            confidence = decision.confidence,
            corrected = verdict.corrected.is_some(),
            warnings = verdict.warnings.len(),
            "Signal approved"
        ),
        SymbolOutcome::Vetoed { decision, verdict } => info!(
            symbol = %decision.symbol,
            outcome = "vetoed",
            action = decision.action.name(),
            reason = verdict
                .deciding_reason
                .as_ref()
                .map(|r| r.code())
                .unwrap_or("unknown"),
            "Signal vetoed"
        ),
        SymbolOutcome::Hold { decision, .. } => debug!(
            symbol = %decision.symbol,
            outcome = "hold",
            reason = decision.reasons.first().map(String::as_str).unwrap_or(""),
            "Holding"
        ),
        SymbolOutcome::Degraded { symbol, reason } => {
            warn!(
                symbol = %symbol,
                outcome = "degraded",
                reason = %reason,
                "Symbol degraded to hold"
            )
        }
    }
}
