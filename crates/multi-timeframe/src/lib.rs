use analysis_core::{
    Alignment, AnalysisError, AnalysisResult, BarSource, Horizon, PerHorizon, Snapshot,
    SnapshotScores, Timeframe, TimeframeSeries,
};
use chrono::{DateTime, Utc};
use tracing::debug;

/// Assembles the per-horizon dual-view series of one symbol.
pub struct SnapshotBuilder {
    timeframes: PerHorizon<Timeframe>,
}

impl SnapshotBuilder {
    /// Each longer timeframe must be a whole multiple of the shorter one.
    pub fn new(timeframes: PerHorizon<Timeframe>) -> AnalysisResult<Self> {
        let pairs = [
            (timeframes.short, timeframes.medium),
            (timeframes.medium, timeframes.long),
        ];
        for (shorter, longer) in pairs {
            if shorter.to_minutes() >= longer.to_minutes()
                || longer.to_minutes() % shorter.to_minutes() != 0
            {
                return Err(AnalysisError::Configuration(format!(
                    "timeframe {} does not nest inside {}",
                    shorter.name(),
                    longer.name()
                )));
            }
        }
        Ok(Self { timeframes })
    }

    pub fn timeframes(&self) -> &PerHorizon<Timeframe> {
        &self.timeframes
    }

    /// Fetch all horizons concurrently and validate them into a snapshot.
    pub async fn build(&self, source: &dyn BarSource, symbol: &str) -> AnalysisResult<Snapshot> {
        let futures: Vec<_> = Horizon::ALL
            .iter()
            .map(|&horizon| {
                let timeframe = *self.timeframes.get(horizon);
                async move {
                    debug!(symbol, timeframe = timeframe.name(), "Fetching series");
                    source.fetch_series(symbol, horizon, timeframe).await
                }
            })
            .collect();

        let results = futures::future::join_all(futures).await;
        let [short, medium, long]: [AnalysisResult<TimeframeSeries>; 3] = results
            .try_into()
            .map_err(|_| AnalysisError::InvalidData("missing timeframe result".to_string()))?;

        self.assemble(symbol, PerHorizon::new(short?, medium?, long?), Utc::now())
    }

    /// Validate already-fetched series and wrap them into a snapshot.
    pub fn assemble(
        &self,
        symbol: &str,
        series: PerHorizon<TimeframeSeries>,
        built_at: DateTime<Utc>,
    ) -> AnalysisResult<Snapshot> {
        for (horizon, s) in series.iter() {
            let expected = *self.timeframes.get(horizon);
            if s.timeframe != expected {
                return Err(AnalysisError::InvalidData(format!(
                    "{} series is {}, expected {}",
                    horizon,
                    s.timeframe.name(),
                    expected.name()
                )));
            }
            validate_series(s)?;
        }

        check_alignment(&series.short, &series.medium)?;
        check_alignment(&series.medium, &series.long)?;

        Ok(Snapshot {
            symbol: symbol.to_string(),
            series,
            built_at,
        })
    }
}

/// Closed bars must be sane, chronological and non-overlapping, and the
/// forming bar must come after them.
pub fn validate_series(series: &TimeframeSeries) -> AnalysisResult<()> {
    let tf = series.timeframe;
    let bars = series.completed();

    if let Some(bad) = bars.iter().find(|b| !b.is_valid()) {
        return Err(AnalysisError::InvalidData(format!(
            "{} bar at {} has invalid prices or volume",
            tf.name(),
            bad.timestamp
        )));
    }

    for pair in bars.windows(2) {
        if pair[1].timestamp < pair[0].timestamp + tf.to_duration() {
            return Err(AnalysisError::InvalidData(format!(
                "{} bars out of order or overlapping at {}",
                tf.name(),
                pair[1].timestamp
            )));
        }
    }

    if let Some(forming) = series.in_progress() {
        if !forming.is_valid() {
            return Err(AnalysisError::InvalidData(format!(
                "{} in-progress bar has invalid prices",
                tf.name()
            )));
        }
        if let Some(last) = bars.last() {
            if forming.timestamp <= last.timestamp {
                return Err(AnalysisError::InvalidData(format!(
                    "{} in-progress bar at {} is not after last closed bar",
                    tf.name(),
                    forming.timestamp
                )));
            }
        }
    }

    if let Some(flow) = series.flow() {
        if flow.len() != bars.len() {
            return Err(AnalysisError::InvalidData(format!(
                "{} flow series has {} values for {} bars",
                tf.name(),
                flow.len(),
                bars.len()
            )));
        }
    }

    Ok(())
}

/// When the shorter series spans the longer series' last close, one of its
/// bars must close at exactly that instant.
pub fn check_alignment(shorter: &TimeframeSeries, longer: &TimeframeSeries) -> AnalysisResult<()> {
    let (Some(boundary), Some(first), Some(last_close)) = (
        longer.last_close_time(),
        shorter.completed().first(),
        shorter.last_close_time(),
    ) else {
        return Ok(());
    };

    let step = shorter.timeframe.to_duration();
    if first.timestamp + step > boundary || last_close < boundary {
        return Ok(());
    }

    let aligned = shorter
        .completed()
        .iter()
        .any(|b| b.timestamp + step == boundary);

    if aligned {
        Ok(())
    } else {
        Err(AnalysisError::MisalignedTimeframes(format!(
            "{} close at {} is not a {} bar boundary",
            longer.timeframe.name(),
            boundary,
            shorter.timeframe.name()
        )))
    }
}

/// Directional agreement of the per-horizon trend scores.
///
/// A horizon votes only when its trend magnitude reaches its dead-zone.
pub fn trend_alignment(scores: &SnapshotScores, deadzones: &PerHorizon<f64>) -> Alignment {
    let vote = |h: Horizon| -> i8 {
        match scores.trend(h) {
            Some(t) if t >= *deadzones.get(h) && t > 0.0 => 1,
            Some(t) if t <= -*deadzones.get(h) && t < 0.0 => -1,
            _ => 0,
        }
    };

    let (long, medium, short) = (vote(Horizon::Long), vote(Horizon::Medium), vote(Horizon::Short));

    if long != 0 && long == medium && medium == short {
        Alignment::Strong
    } else if long != 0 && long == medium {
        Alignment::Partial
    } else {
        Alignment::None
    }
}
