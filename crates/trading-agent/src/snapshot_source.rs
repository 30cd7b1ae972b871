use analysis_core::{AnalysisError, BarSource, Horizon, PerHorizon, Timeframe, TimeframeSeries};
use async_trait::async_trait;
use std::path::PathBuf;

/// Reads pre-fetched series from `{dir}/{SYMBOL}.json`.
///
/// The file holds one series per horizon:
/// `{ "short": {..}, "medium": {..}, "long": {..} }`. Market data
/// acquisition happens outside the agent.
pub struct JsonSnapshotSource {
    dir: PathBuf,
}

impl JsonSnapshotSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, symbol: &str) -> PathBuf {
        self.dir.join(format!("{}.json", symbol))
    }

    async fn load(&self, symbol: &str) -> Result<PerHorizon<TimeframeSeries>, AnalysisError> {
        let path = self.path_for(symbol);
        let raw = tokio::fs::read_to_string(&path).await.map_err(|e| {
            AnalysisError::InvalidData(format!("cannot read {}: {}", path.display(), e))
        })?;
        serde_json::from_str(&raw).map_err(|e| {
            AnalysisError::InvalidData(format!("malformed snapshot {}: {}", path.display(), e))
        })
    }
}

#[async_trait]
impl BarSource for JsonSnapshotSource {
    async fn fetch_series(
        &self,
        symbol: &str,
        horizon: Horizon,
        timeframe: Timeframe,
    ) -> Result<TimeframeSeries, AnalysisError> {
        let series = self.load(symbol).await?.get(horizon).clone();
        if series.timeframe != timeframe {
            return Err(AnalysisError::InvalidData(format!(
                "{} {} series is {}, expected {}",
                symbol,
                horizon,
                series.timeframe.name(),
                timeframe.name()
            )));
        }
        Ok(series)
    }
}
