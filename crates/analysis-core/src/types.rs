use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{AnalysisError, AnalysisResult};

/// OHLCV bar data. `timestamp` is the bar's open time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Bar {
    /// Percentage move from open to close
    pub fn change_pct(&self) -> f64 {
        if self.open == 0.0 {
            return 0.0;
        }
        (self.close - self.open) / self.open * 100.0
    }

    pub fn is_valid(&self) -> bool {
        [self.open, self.high, self.low, self.close, self.volume]
            .iter()
            .all(|v| v.is_finite())
            && self.high >= self.low
            && self.volume >= 0.0
    }
}

/// Bar size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    Minute1,
    Minute5,
    Minute15,
    Minute30,
    Hour1,
    Hour4,
    Day1,
}

impl Timeframe {
    pub fn to_minutes(&self) -> i64 {
        match self {
            Timeframe::Minute1 => 1,
            Timeframe::Minute5 => 5,
            Timeframe::Minute15 => 15,
            Timeframe::Minute30 => 30,
            Timeframe::Hour1 => 60,
            Timeframe::Hour4 => 240,
            Timeframe::Day1 => 1440,
        }
    }

    /// Duration covered by one bar
    pub fn to_duration(&self) -> Duration {
        Duration::minutes(self.to_minutes())
    }

    pub fn name(&self) -> &'static str {
        match self {
            Timeframe::Minute1 => "1m",
            Timeframe::Minute5 => "5m",
            Timeframe::Minute15 => "15m",
            Timeframe::Minute30 => "30m",
            Timeframe::Hour1 => "1h",
            Timeframe::Hour4 => "4h",
            Timeframe::Day1 => "1d",
        }
    }
}

/// Role a timeframe plays in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Horizon {
    Short,
    Medium,
    Long,
}

impl Horizon {
    pub const ALL: [Horizon; 3] = [Horizon::Short, Horizon::Medium, Horizon::Long];

    pub fn name(&self) -> &'static str {
        match self {
            Horizon::Short => "short",
            Horizon::Medium => "medium",
            Horizon::Long => "long",
        }
    }

    /// Default bar size for each role (5m / 15m / 1h)
    pub fn default_timeframe(&self) -> Timeframe {
        match self {
            Horizon::Short => Timeframe::Minute5,
            Horizon::Medium => Timeframe::Minute15,
            Horizon::Long => Timeframe::Hour1,
        }
    }
}

impl fmt::Display for Horizon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One value per horizon.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PerHorizon<T> {
    pub short: T,
    pub medium: T,
    pub long: T,
}

impl<T> PerHorizon<T> {
    pub fn new(short: T, medium: T, long: T) -> Self {
        Self {
            short,
            medium,
            long,
        }
    }

    pub fn get(&self, horizon: Horizon) -> &T {
        match horizon {
            Horizon::Short => &self.short,
            Horizon::Medium => &self.medium,
            Horizon::Long => &self.long,
        }
    }

    pub fn map<U, F: FnMut(Horizon, &T) -> U>(&self, mut f: F) -> PerHorizon<U> {
        PerHorizon {
            short: f(Horizon::Short, &self.short),
            medium: f(Horizon::Medium, &self.medium),
            long: f(Horizon::Long, &self.long),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (Horizon, &T)> {
        [
            (Horizon::Short, &self.short),
            (Horizon::Medium, &self.medium),
            (Horizon::Long, &self.long),
        ]
        .into_iter()
    }
}

/// Dual-view bar series for one timeframe: closed bars plus the bar still forming.
///
/// Closed bars can only be appended in chronological order and are never
/// modified afterwards. The in-progress bar is replaced wholesale on every
/// update and only contributes the latest price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeframeSeries {
    pub timeframe: Timeframe,
    completed: Vec<Bar>,
    #[serde(default)]
    in_progress: Option<Bar>,
    /// Optional external flow/funding proxy, one value per completed bar
    #[serde(default)]
    flow: Option<Vec<f64>>,
}

impl TimeframeSeries {
    pub fn new(timeframe: Timeframe, completed: Vec<Bar>, in_progress: Option<Bar>) -> Self {
        Self {
            timeframe,
            completed,
            in_progress,
            flow: None,
        }
    }

    pub fn with_flow(mut self, flow: Vec<f64>) -> Self {
        self.flow = Some(flow);
        self
    }

    pub fn completed(&self) -> &[Bar] {
        &self.completed
    }

    pub fn in_progress(&self) -> Option<&Bar> {
        self.in_progress.as_ref()
    }

    pub fn flow(&self) -> Option<&[f64]> {
        self.flow.as_deref()
    }

    /// Latest traded price: the forming bar's close, else the last closed bar's.
    pub fn latest_price(&self) -> Option<f64> {
        self.in_progress
            .as_ref()
            .or_else(|| self.completed.last())
            .map(|b| b.close)
    }

    /// Close time of the most recent completed bar
    pub fn last_close_time(&self) -> Option<DateTime<Utc>> {
        self.completed
            .last()
            .map(|b| b.timestamp + self.timeframe.to_duration())
    }

    pub fn closes(&self) -> Vec<f64> {
        self.completed.iter().map(|b| b.close).collect()
    }

    /// Replace the forming bar.
    pub fn replace_in_progress(&mut self, bar: Bar) -> AnalysisResult<()> {
        if let Some(last) = self.completed.last() {
            if bar.timestamp <= last.timestamp {
                return Err(AnalysisError::InvalidData(format!(
                    "in-progress bar at {} is not after last closed bar at {}",
                    bar.timestamp, last.timestamp
                )));
            }
        }
        self.in_progress = Some(bar);
        Ok(())
    }

    /// Close a bar: append it to the completed history and clear the forming bar.
    pub fn close_bar(&mut self, bar: Bar) -> AnalysisResult<()> {
        if let Some(last) = self.completed.last() {
            if bar.timestamp < last.timestamp + self.timeframe.to_duration() {
                return Err(AnalysisError::InvalidData(format!(
                    "closed bar at {} overlaps previous bar at {}",
                    bar.timestamp, last.timestamp
                )));
            }
        }
        self.completed.push(bar);
        self.in_progress = None;
        Ok(())
    }
}

/// Per-symbol market data for one cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub symbol: String,
    pub series: PerHorizon<TimeframeSeries>,
    pub built_at: DateTime<Utc>,
}

impl Snapshot {
    pub fn series(&self, horizon: Horizon) -> &TimeframeSeries {
        self.series.get(horizon)
    }

    pub fn latest_price(&self, horizon: Horizon) -> Option<f64> {
        self.series.get(horizon).latest_price()
    }
}
