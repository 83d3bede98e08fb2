//! Trading-strategy signal generators and their static registry.
//!
//! Each [`SignalGenerator`] looks at a candle series for one symbol and
//! may emit a [`SignalRecord`]. Records are written as `Key: value` text
//! files under the strategies directory, where the change tracker picks
//! them up on the next index refresh.
//!
//! Generators are compiled in and looked up by name through
//! [`SignalRegistry`]; nothing is discovered at run time. Candle data comes
//! from a CSV file (see [`load_candles`]), not from a broker connection.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::persist::write_atomic;

/// Price unit for 4-decimal pairs.
const PIP: f64 = 1e-4;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candle {
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

impl Candle {
    fn is_bullish(&self) -> bool {
        self.close > self.open
    }

    fn is_bearish(&self) -> bool {
        self.close < self.open
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trend {
    Bullish,
    Bearish,
    NoTrend,
}

impl fmt::Display for Trend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Trend::Bullish => "bullish",
            Trend::Bearish => "bearish",
            Trend::NoTrend => "no trend",
        })
    }
}

/// One trade setup produced by a generator.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalRecord {
    pub symbol: String,
    pub strategy: String,
    pub trend: Trend,
    pub ema18: f64,
    pub ema50: f64,
    pub ema200: f64,
    pub candle_pattern: String,
    pub stoploss: f64,
    pub entry_price: f64,
    pub take_profit: f64,
    pub timestamp: DateTime<Utc>,
}

impl SignalRecord {
    /// Render the `Key: value` block stored in strategy files.
    pub fn to_text(&self) -> String {
        format!(
            "Symbol: {}\nStrategy: {}\nTrend: {}\nEMAs: EMA18={:.5}, EMA50={:.5}, EMA200={:.5}\n\
             Candle Pattern: {}\nStoploss: {:.5}\nEntryPrice: {:.5}\nTakeProfit: {:.5}\nTimestamp: {}",
            self.symbol,
            self.strategy,
            self.trend,
            self.ema18,
            self.ema50,
            self.ema200,
            self.candle_pattern,
            self.stoploss,
            self.entry_price,
            self.take_profit,
            self.timestamp.format("%Y%m%d_%H%M%S"),
        )
    }

    /// `<timestamp>_<symbol>_<strategy>_<trend>.txt`
    pub fn file_name(&self) -> String {
        format!(
            "{}_{}_{}_{}.txt",
            self.timestamp.format("%Y%m%d_%H%M%S"),
            self.symbol,
            self.strategy.to_lowercase(),
            self.trend.to_string().replace(' ', "_")
        )
    }
}

pub trait SignalGenerator: Send + Sync {
    /// Registry name, e.g. `"bounce"`.
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;
    /// Inspect `candles` (oldest first) and return a setup, if any.
    fn generate(&self, symbol: &str, candles: &[Candle], at: DateTime<Utc>) -> Option<SignalRecord>;
}

/// Exponential moving average of closes, `alpha = 2 / (span + 1)`, seeded
/// with the first close.
pub fn ema(candles: &[Candle], span: usize) -> Vec<f64> {
    let alpha = 2.0 / (span as f64 + 1.0);
    let mut out = Vec::with_capacity(candles.len());
    for (i, c) in candles.iter().enumerate() {
        let value = if i == 0 {
            c.close
        } else {
            alpha * c.close + (1.0 - alpha) * out[i - 1]
        };
        out.push(value);
    }
    out
}

struct Emas {
    e18: Vec<f64>,
    e50: Vec<f64>,
    e200: Vec<f64>,
}

impl Emas {
    fn of(candles: &[Candle]) -> Self {
        Self {
            e18: ema(candles, 18),
            e50: ema(candles, 50),
            e200: ema(candles, 200),
        }
    }

    fn last(&self) -> (f64, f64, f64) {
        (
            self.e18.last().copied().unwrap_or_default(),
            self.e50.last().copied().unwrap_or_default(),
            self.e200.last().copied().unwrap_or_default(),
        )
    }

    /// Stacked EMAs, each separated by more than `tolerance`.
    fn stacked_trend(&self, tolerance: f64) -> Trend {
        let (e18, e50, e200) = self.last();
        if e18 > e50 + tolerance && e50 > e200 + tolerance {
            Trend::Bullish
        } else if e18 < e50 - tolerance && e50 < e200 - tolerance {
            Trend::Bearish
        } else {
            Trend::NoTrend
        }
    }
}

fn record(
    symbol: &str,
    strategy: &str,
    trend: Trend,
    emas: &Emas,
    candle_pattern: String,
    (stoploss, entry_price, take_profit): (f64, f64, f64),
    at: DateTime<Utc>,
) -> SignalRecord {
    let (ema18, ema50, ema200) = emas.last();
    SignalRecord {
        symbol: symbol.to_string(),
        strategy: strategy.to_string(),
        trend,
        ema18,
        ema50,
        ema200,
        candle_pattern,
        stoploss,
        entry_price,
        take_profit,
        timestamp: at,
    }
}

/// Pullback to the 50 EMA inside a stacked-EMA trend, confirmed by the
/// last closed candle's direction.
pub struct Bounce;

impl SignalGenerator for Bounce {
    fn name(&self) -> &'static str {
        "bounce"
    }

    fn description(&self) -> &'static str {
        "price wicks through EMA50 within a stacked 18/50/200 EMA trend"
    }

    fn generate(&self, symbol: &str, candles: &[Candle], at: DateTime<Utc>) -> Option<SignalRecord> {
        let n = candles.len();
        if n < 5 {
            return None;
        }
        let emas = Emas::of(candles);
        let trend = emas.stacked_trend(0.0005);
        if trend == Trend::NoTrend {
            return None;
        }

        let touched = (n - 4..n).any(|i| candles[i].low < emas.e50[i] && candles[i].high > emas.e50[i]);
        let confirm = candles[n - 2];
        let confirmed = match trend {
            Trend::Bullish => confirm.is_bullish(),
            Trend::Bearish => confirm.is_bearish(),
            Trend::NoTrend => false,
        };
        if !touched || !confirmed {
            return None;
        }

        let range = confirm.high - confirm.low;
        let levels = match (trend, range > 8.0 * PIP) {
            (Trend::Bullish, false) => (confirm.open - 8.0 * PIP, confirm.high + 2.0 * PIP, confirm.high + 40.0 * PIP),
            (Trend::Bullish, true) => (confirm.low - PIP, confirm.low, confirm.low + 40.0 * PIP),
            (_, false) => (confirm.open + 8.0 * PIP, confirm.low - 2.0 * PIP, confirm.low - 40.0 * PIP),
            (_, true) => (confirm.high + PIP, confirm.high, confirm.high - 40.0 * PIP),
        };
        Some(record(symbol, "Bounce", trend, &emas, "Bounce detected".to_string(), levels, at))
    }
}

/// Higher highs and higher lows (or the reverse) over the last three bars
/// in a stacked-EMA trend.
pub struct TrendContinuation;

impl SignalGenerator for TrendContinuation {
    fn name(&self) -> &'static str {
        "trend-continuation"
    }

    fn description(&self) -> &'static str {
        "higher highs/lows (or lower) versus three bars back in a stacked EMA trend"
    }

    fn generate(&self, symbol: &str, candles: &[Candle], at: DateTime<Utc>) -> Option<SignalRecord> {
        let n = candles.len();
        if n < 4 {
            return None;
        }
        let emas = Emas::of(candles);
        let trend = emas.stacked_trend(0.0);
        let (current, earlier) = (candles[n - 1], candles[n - 4]);
        let continues = match trend {
            Trend::Bullish => current.high > earlier.high && current.low > earlier.low,
            Trend::Bearish => current.high < earlier.high && current.low < earlier.low,
            Trend::NoTrend => false,
        };
        if !continues {
            return None;
        }

        let prev = candles[n - 2];
        let levels = if trend == Trend::Bullish {
            (prev.low - 10.0 * PIP, prev.close + 2.0 * PIP, prev.close + 15.0 * PIP)
        } else {
            (prev.high + 10.0 * PIP, prev.close - 2.0 * PIP, prev.close - 15.0 * PIP)
        };
        Some(record(
            symbol,
            "TrendContinuation",
            trend,
            &emas,
            direction_label(&current),
            levels,
            at,
        ))
    }
}

/// Daily bias from EMA50 vs EMA200, entered on a matching candle pattern
/// (hammer/hanging man, engulfing) or candle direction.
pub struct DailyBias;

impl DailyBias {
    fn has_pattern(trend: Trend, last: &Candle, prev: Option<&Candle>) -> bool {
        let body = (last.close - last.open).abs();
        if body == 0.0 {
            return false;
        }
        let lower_shadow = last.open.min(last.close) - last.low;
        let long_shadow = lower_shadow >= 2.0 * body;
        let engulfing = prev.is_some_and(|p| match trend {
            Trend::Bullish => last.close > p.open && last.open < p.close,
            _ => last.close < p.open && last.open > p.close,
        });
        long_shadow || engulfing
    }
}

impl SignalGenerator for DailyBias {
    fn name(&self) -> &'static str {
        "daily-bias"
    }

    fn description(&self) -> &'static str {
        "EMA50/EMA200 daily bias entered on hammer, engulfing, or a matching candle"
    }

    fn generate(&self, symbol: &str, candles: &[Candle], at: DateTime<Utc>) -> Option<SignalRecord> {
        let last = candles.last()?;
        let prev = candles.len().checked_sub(2).map(|i| &candles[i]);
        let emas = Emas::of(candles);
        let (_, e50, e200) = emas.last();
        let trend = if e50 > e200 { Trend::Bullish } else { Trend::Bearish };

        let enter = match trend {
            Trend::Bullish => Self::has_pattern(trend, last, prev) || last.is_bullish(),
            _ => Self::has_pattern(trend, last, prev) || last.is_bearish(),
        };
        if !enter {
            return None;
        }

        let levels = if trend == Trend::Bullish {
            (last.close - 5.0 * PIP, last.close + PIP, last.close + 15.0 * PIP)
        } else {
            (last.close + 5.0 * PIP, last.close - PIP, last.close - 15.0 * PIP)
        };
        Some(record(
            symbol,
            "DailyBiasCandlePatterns",
            trend,
            &emas,
            direction_label(last),
            levels,
            at,
        ))
    }
}

fn direction_label(candle: &Candle) -> String {
    let label = if candle.is_bullish() { "Bullish" } else { "Bearish" };
    label.to_string()
}

/// Name → compiled generator.
pub struct SignalRegistry {
    generators: BTreeMap<&'static str, Box<dyn SignalGenerator>>,
}

impl SignalRegistry {
    pub fn empty() -> Self {
        Self {
            generators: BTreeMap::new(),
        }
    }

    /// Registry holding every built-in strategy.
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        registry.register(Box::new(Bounce));
        registry.register(Box::new(TrendContinuation));
        registry.register(Box::new(DailyBias));
        registry
    }

    /// Add a generator, replacing any previous one with the same name.
    pub fn register(&mut self, generator: Box<dyn SignalGenerator>) {
        self.generators.insert(generator.name(), generator);
    }

    pub fn get(&self, name: &str) -> Option<&dyn SignalGenerator> {
        self.generators.get(name).map(|g| g.as_ref())
    }

    /// Generators in name order.
    pub fn iter(&self) -> impl Iterator<Item = &dyn SignalGenerator> {
        self.generators.values().map(|g| g.as_ref())
    }

    /// Run generator `name` and write its record, if any, into `dir`.
    /// Returns the written path.
    pub fn run_into(
        &self,
        name: &str,
        symbol: &str,
        candles: &[Candle],
        dir: &Path,
    ) -> Result<Option<PathBuf>> {
        validate_symbol(symbol)?;
        let Some(generator) = self.get(name) else {
            let known: Vec<&str> = self.generators.keys().copied().collect();
            bail!("Unknown strategy: '{}'. Available: {}", name, known.join(", "));
        };

        let Some(record) = generator.generate(symbol, candles, Utc::now()) else {
            debug!(strategy = name, symbol, "no setup");
            return Ok(None);
        };
        let path = dir.join(record.file_name());
        write_atomic(&path, record.to_text().as_bytes())
            .with_context(|| format!("Failed to write signal: {}", path.display()))?;
        info!(strategy = name, symbol, trend = %record.trend, path = %path.display(), "signal written");
        Ok(Some(path))
    }
}

/// Symbols become part of a file name, so they must be a plain name
/// component: no separators, no `..`, nothing empty.
fn validate_symbol(symbol: &str) -> Result<()> {
    let plain = !symbol.trim().is_empty()
        && !symbol.contains(['/', '\\', '\0'])
        && !symbol.contains("..");
    if !plain {
        bail!("Invalid symbol '{}': must be a plain name without path separators", symbol);
    }
    Ok(())
}

/// Read candles from a CSV with a header naming `open`, `high`, `low` and
/// `close` columns (any order, case-insensitive; other columns ignored).
pub fn load_candles(path: &Path) -> Result<Vec<Candle>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read candles: {}", path.display()))?;
    parse_candles(&text)
}

pub fn parse_candles(text: &str) -> Result<Vec<Candle>> {
    let mut lines = text.lines().filter(|l| !l.trim().is_empty());
    let header: Vec<String> = lines
        .next()
        .context("Candle file is empty")?
        .split(',')
        .map(|h| h.trim().to_ascii_lowercase())
        .collect();
    let column = |name: &str| {
        header
            .iter()
            .position(|h| h == name)
            .with_context(|| format!("Candle file has no '{}' column", name))
    };
    let (open, high, low, close) = (column("open")?, column("high")?, column("low")?, column("close")?);

    lines
        .enumerate()
        .map(|(i, line)| {
            let cells: Vec<&str> = line.split(',').map(str::trim).collect();
            let field = |col: usize| -> Result<f64> {
                cells
                    .get(col)
                    .with_context(|| format!("row {}: missing column {}", i + 2, col + 1))?
                    .parse::<f64>()
                    .with_context(|| format!("row {}: invalid number", i + 2))
            };
            Ok(Candle {
                open: field(open)?,
                high: field(high)?,
                low: field(low)?,
                close: field(close)?,
            })
        })
        .collect()
}
