//! Indicator primitives over completed bars.
//!
//! Every function returns an empty result when the input is shorter than
//! its window; callers treat that as "not enough history".

use analysis_core::Bar;

/// Simple Moving Average
pub fn sma(data: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || data.len() < period {
        return vec![];
    }

    let mut result = Vec::with_capacity(data.len() - period + 1);
    let mut sum: f64 = data[..period].iter().sum();
    result.push(sum / period as f64);
    for i in period..data.len() {
        sum += data[i] - data[i - period];
        result.push(sum / period as f64);
    }
    result
}

/// Exponential Moving Average, seeded with the SMA of the first `period` values.
/// Output index `i` lines up with input index `i + period - 1`.
pub fn ema(data: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || data.len() < period {
        return vec![];
    }

    let multiplier = 2.0 / (period as f64 + 1.0);
    let mut result = Vec::with_capacity(data.len() - period + 1);
    let mut prev = data[..period].iter().sum::<f64>() / period as f64;
    result.push(prev);

    for value in &data[period..] {
        prev = (value - prev) * multiplier + prev;
        result.push(prev);
    }

    result
}

/// Relative Strength Index (Wilder smoothing)
pub fn rsi(data: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || data.len() < period + 1 {
        return vec![];
    }

    let mut gains = Vec::with_capacity(data.len() - 1);
    let mut losses = Vec::with_capacity(data.len() - 1);

    for w in data.windows(2) {
        let change = w[1] - w[0];
        gains.push(change.max(0.0));
        losses.push((-change).max(0.0));
    }

    let mut avg_gain = gains[..period].iter().sum::<f64>() / period as f64;
    let mut avg_loss = losses[..period].iter().sum::<f64>() / period as f64;

    let to_rsi = |gain: f64, loss: f64| {
        if loss == 0.0 {
            if gain == 0.0 {
                50.0
            } else {
                100.0
            }
        } else {
            100.0 - 100.0 / (1.0 + gain / loss)
        }
    };

    let mut rsi_values = Vec::with_capacity(data.len() - period);
    rsi_values.push(to_rsi(avg_gain, avg_loss));

    for i in period..gains.len() {
        avg_gain = (avg_gain * (period - 1) as f64 + gains[i]) / period as f64;
        avg_loss = (avg_loss * (period - 1) as f64 + losses[i]) / period as f64;
        rsi_values.push(to_rsi(avg_gain, avg_loss));
    }

    rsi_values
}

/// MACD (Moving Average Convergence Divergence)
pub struct MacdResult {
    pub macd_line: Vec<f64>,
    pub signal_line: Vec<f64>,
    pub histogram: Vec<f64>,
}

pub fn macd(
    data: &[f64],
    fast_period: usize,
    slow_period: usize,
    signal_period: usize,
) -> MacdResult {
    let empty = || MacdResult {
        macd_line: vec![],
        signal_line: vec![],
        histogram: vec![],
    };
    if fast_period == 0 || signal_period == 0 || slow_period <= fast_period {
        return empty();
    }

    let ema_fast = ema(data, fast_period);
    let ema_slow = ema(data, slow_period);
    if ema_slow.is_empty() {
        return empty();
    }

    let offset = slow_period - fast_period;
    let macd_line: Vec<f64> = (offset..ema_fast.len())
        .map(|i| ema_fast[i] - ema_slow[i - offset])
        .collect();

    let signal_line = ema(&macd_line, signal_period);

    let hist_offset = macd_line.len().saturating_sub(signal_line.len());
    let histogram = signal_line
        .iter()
        .enumerate()
        .map(|(i, s)| macd_line[i + hist_offset] - s)
        .collect();

    MacdResult {
        macd_line,
        signal_line,
        histogram,
    }
}

/// Bollinger Bands
pub struct BollingerBands {
    pub upper: Vec<f64>,
    pub middle: Vec<f64>,
    pub lower: Vec<f64>,
}

impl BollingerBands {
    /// Where `price` sits in the latest band: 0 at the lower band, 1 at the upper.
    pub fn position(&self, price: f64) -> Option<f64> {
        let upper = *self.upper.last()?;
        let lower = *self.lower.last()?;
        if upper - lower <= f64::EPSILON {
            return Some(0.5);
        }
        Some((price - lower) / (upper - lower))
    }
}

pub fn bollinger_bands(data: &[f64], period: usize, std_dev: f64) -> BollingerBands {
    if period == 0 || data.len() < period {
        return BollingerBands {
            upper: vec![],
            middle: vec![],
            lower: vec![],
        };
    }

    let middle = sma(data, period);
    let mut upper = Vec::with_capacity(middle.len());
    let mut lower = Vec::with_capacity(middle.len());

    for i in period - 1..data.len() {
        let slice = &data[i + 1 - period..=i];
        let mean = middle[i + 1 - period];
        let variance: f64 = slice.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / period as f64;
        let std = variance.sqrt();

        upper.push(mean + std_dev * std);
        lower.push(mean - std_dev * std);
    }

    BollingerBands {
        upper,
        middle,
        lower,
    }
}

fn true_range(bar: &Bar, prev_close: f64) -> f64 {
    let high_low = bar.high - bar.low;
    let high_close = (bar.high - prev_close).abs();
    let low_close = (bar.low - prev_close).abs();
    high_low.max(high_close).max(low_close)
}

/// Average True Range (Wilder smoothing)
pub fn atr(bars: &[Bar], period: usize) -> Vec<f64> {
    if period == 0 || bars.len() < period + 1 {
        return vec![];
    }

    let true_ranges: Vec<f64> = bars
        .windows(2)
        .map(|w| true_range(&w[1], w[0].close))
        .collect();

    let mut atr_values = Vec::with_capacity(true_ranges.len() - period + 1);
    let mut atr = true_ranges[..period].iter().sum::<f64>() / period as f64;
    atr_values.push(atr);

    for tr in &true_ranges[period..] {
        atr = (atr * (period - 1) as f64 + tr) / period as f64;
        atr_values.push(atr);
    }

    atr_values
}

/// Stochastic Oscillator
pub struct StochasticResult {
    pub k: Vec<f64>,
    pub d: Vec<f64>,
}

pub fn stochastic(bars: &[Bar], k_period: usize, d_period: usize) -> StochasticResult {
    if k_period == 0 || bars.len() < k_period {
        return StochasticResult {
            k: vec![],
            d: vec![],
        };
    }

    let k_values: Vec<f64> = (k_period - 1..bars.len())
        .map(|i| {
            let slice = &bars[i + 1 - k_period..=i];
            let highest = slice.iter().map(|b| b.high).fold(f64::NEG_INFINITY, f64::max);
            let lowest = slice.iter().map(|b| b.low).fold(f64::INFINITY, f64::min);
            if highest == lowest {
                50.0
            } else {
                100.0 * (bars[i].close - lowest) / (highest - lowest)
            }
        })
        .collect();

    let d_values = sma(&k_values, d_period);

    StochasticResult {
        k: k_values,
        d: d_values,
    }
}

/// Average Directional Index: trend strength 0-100 with directional indicators
pub struct AdxResult {
    pub adx: Vec<f64>,
    pub plus_di: Vec<f64>,
    pub minus_di: Vec<f64>,
}

pub fn adx(bars: &[Bar], period: usize) -> AdxResult {
    if period == 0 || bars.len() < period * 2 {
        return AdxResult {
            adx: vec![],
            plus_di: vec![],
            minus_di: vec![],
        };
    }

    let mut plus_dm = Vec::with_capacity(bars.len() - 1);
    let mut minus_dm = Vec::with_capacity(bars.len() - 1);
    let mut ranges = Vec::with_capacity(bars.len() - 1);

    for w in bars.windows(2) {
        let up_move = w[1].high - w[0].high;
        let down_move = w[0].low - w[1].low;

        plus_dm.push(if up_move > down_move && up_move > 0.0 { up_move } else { 0.0 });
        minus_dm.push(if down_move > up_move && down_move > 0.0 { down_move } else { 0.0 });
        ranges.push(true_range(&w[1], w[0].close));
    }

    let mut smoothed_plus_dm = plus_dm[..period].iter().sum::<f64>();
    let mut smoothed_minus_dm = minus_dm[..period].iter().sum::<f64>();
    let mut smoothed_tr = ranges[..period].iter().sum::<f64>();

    let mut plus_di_values = Vec::new();
    let mut minus_di_values = Vec::new();
    let mut dx_values = Vec::new();

    let mut push_di = |pdm: f64, mdm: f64, tr: f64| {
        let pdi = if tr > 0.0 { 100.0 * pdm / tr } else { 0.0 };
        let mdi = if tr > 0.0 { 100.0 * mdm / tr } else { 0.0 };
        plus_di_values.push(pdi);
        minus_di_values.push(mdi);
        let di_sum = pdi + mdi;
        dx_values.push(if di_sum > 0.0 {
            100.0 * (pdi - mdi).abs() / di_sum
        } else {
            0.0
        });
    };

    push_di(smoothed_plus_dm, smoothed_minus_dm, smoothed_tr);
    for i in period..plus_dm.len() {
        smoothed_plus_dm = smoothed_plus_dm - smoothed_plus_dm / period as f64 + plus_dm[i];
        smoothed_minus_dm = smoothed_minus_dm - smoothed_minus_dm / period as f64 + minus_dm[i];
        smoothed_tr = smoothed_tr - smoothed_tr / period as f64 + ranges[i];
        push_di(smoothed_plus_dm, smoothed_minus_dm, smoothed_tr);
    }

    if dx_values.len() < period {
        return AdxResult {
            adx: vec![],
            plus_di: plus_di_values,
            minus_di: minus_di_values,
        };
    }

    let mut adx_values = Vec::with_capacity(dx_values.len() - period + 1);
    let mut adx_val = dx_values[..period].iter().sum::<f64>() / period as f64;
    adx_values.push(adx_val);

    for dx in &dx_values[period..] {
        adx_val = (adx_val * (period - 1) as f64 + dx) / period as f64;
        adx_values.push(adx_val);
    }

    AdxResult {
        adx: adx_values,
        plus_di: plus_di_values,
        minus_di: minus_di_values,
    }
}

/// Rate of change in percent over `period` bars
pub fn rate_of_change(data: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || data.len() <= period {
        return vec![];
    }
    (period..data.len())
        .map(|i| {
            let base = data[i - period];
            if base == 0.0 {
                0.0
            } else {
                (data[i] - base) / base * 100.0
            }
        })
        .collect()
}

/// Latest volume over the average of the `window` bars before it
pub fn relative_volume(bars: &[Bar], window: usize) -> Option<f64> {
    if window == 0 || bars.len() < window + 1 {
        return None;
    }
    let (last, history) = bars.split_last()?;
    let baseline = &history[history.len() - window..];
    let avg = baseline.iter().map(|b| b.volume).sum::<f64>() / window as f64;
    if avg <= 0.0 {
        return Some(1.0);
    }
    Some(last.volume / avg)
}
