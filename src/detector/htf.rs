//! Higher-timeframe context for the entry timeframe: 1h trend plus where
//! price sits in the recent 1h/15m range (discount / premium). Longs are
//! blocked into premium in a downtrend, shorts mirrored. Contexts are cached
//! per symbol and refreshed on their own TTLs.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::model::candle::Candle;
use crate::model::signal::Side;
use crate::scanner::MarketDataSource;

const TTL_1H: Duration = Duration::from_secs(3600);
const TTL_15M: Duration = Duration::from_secs(900);
const HTF_CANDLE_LIMIT: usize = 150;
const RANGE_WINDOW: usize = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trend {
    Up,
    Down,
    Range,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangePosition {
    Discount,
    Premium,
    Mid,
}

#[derive(Debug, Clone, Copy)]
pub struct HtfContext {
    pub trend_1h: Trend,
    pub pos_1h: RangePosition,
    pub pos_15m: RangePosition,
    pub ok_long: bool,
    pub ok_short: bool,
}

impl HtfContext {
    pub fn neutral() -> Self {
        Self {
            trend_1h: Trend::Range,
            pos_1h: RangePosition::Mid,
            pos_15m: RangePosition::Mid,
            ok_long: true,
            ok_short: true,
        }
    }

    pub fn allows(&self, side: Side) -> bool {
        match side {
            Side::Long => self.ok_long,
            Side::Short => self.ok_short,
        }
    }

    /// Whether the context actively supports (not merely tolerates) the side.
    pub fn aligned(&self, side: Side) -> bool {
        self.allows(side)
            && match side {
                Side::Long => self.pos_1h != RangePosition::Premium,
                Side::Short => self.pos_1h != RangePosition::Discount,
            }
    }
}

pub fn build_context(trend_1h: Trend, pos_1h: RangePosition, pos_15m: RangePosition) -> HtfContext {
    let mut ok_long = !(trend_1h == Trend::Down && pos_1h == RangePosition::Premium);
    if pos_1h == RangePosition::Premium && pos_15m == RangePosition::Premium {
        ok_long = false;
    }

    let mut ok_short = !(trend_1h == Trend::Up && pos_1h == RangePosition::Discount);
    if pos_1h == RangePosition::Discount && pos_15m == RangePosition::Discount {
        ok_short = false;
    }

    HtfContext {
        trend_1h,
        pos_1h,
        pos_15m,
        ok_long,
        ok_short,
    }
}

/// Coarse swing read: sample highs/lows on a grid and compare the first and
/// last samples, with a small threshold to ignore noise.
pub fn detect_trend(candles: &[Candle]) -> Trend {
    let n = candles.len();
    if n < 20 {
        return Trend::Range;
    }
    let step = (n / 10).max(2);
    let highs: Vec<f64> = candles.iter().step_by(step).map(|c| c.high).collect();
    let lows: Vec<f64> = candles.iter().step_by(step).map(|c| c.low).collect();
    if highs.len() < 3 || lows.len() < 3 {
        return Trend::Range;
    }

    let (first_h, last_h) = (highs[0], highs[highs.len() - 1]);
    let (first_l, last_l) = (lows[0], lows[lows.len() - 1]);

    if last_h > first_h * 1.01 && last_l > first_l * 1.005 {
        Trend::Up
    } else if last_h < first_h * 0.99 && last_l < first_l * 0.995 {
        Trend::Down
    } else {
        Trend::Range
    }
}

/// Where the latest close sits inside the recent range.
pub fn range_position(candles: &[Candle], window: usize) -> RangePosition {
    let n = candles.len();
    if n < 5 {
        return RangePosition::Mid;
    }
    let start = n.saturating_sub(window);
    let segment = &candles[start..];
    let range_high = segment.iter().map(|c| c.high).fold(f64::MIN, f64::max);
    let range_low = segment.iter().map(|c| c.low).fold(f64::MAX, f64::min);
    if range_high <= range_low {
        return RangePosition::Mid;
    }

    let price = candles[n - 1].close;
    let pos = (price - range_low) / (range_high - range_low);
    if pos <= 0.35 {
        RangePosition::Discount
    } else if pos >= 0.65 {
        RangePosition::Premium
    } else {
        RangePosition::Mid
    }
}

struct CacheEntry {
    trend_1h: Trend,
    pos_1h: RangePosition,
    pos_15m: RangePosition,
    fetched_1h: Option<Instant>,
    fetched_15m: Option<Instant>,
}

impl CacheEntry {
    fn neutral() -> Self {
        Self {
            trend_1h: Trend::Range,
            pos_1h: RangePosition::Mid,
            pos_15m: RangePosition::Mid,
            fetched_1h: None,
            fetched_15m: None,
        }
    }
}

pub struct HtfContextProvider {
    enabled: bool,
    cache: Mutex<HashMap<String, CacheEntry>>,
}

impl HtfContextProvider {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Current context for a symbol, refreshing whichever timeframe is
    /// stale. Fetch failures keep the previous (or neutral) reading.
    pub async fn context_for(&self, source: &dyn MarketDataSource, symbol: &str) -> HtfContext {
        if !self.enabled {
            return HtfContext::neutral();
        }

        let symbol = symbol.to_ascii_uppercase();
        let (need_1h, need_15m) = {
            let cache = self.cache.lock().unwrap();
            match cache.get(&symbol) {
                Some(entry) => (
                    entry.fetched_1h.map(|t| t.elapsed() >= TTL_1H).unwrap_or(true),
                    entry.fetched_15m.map(|t| t.elapsed() >= TTL_15M).unwrap_or(true),
                ),
                None => (true, true),
            }
        };

        let fresh_1h = if need_1h {
            match source.fetch_candles(&symbol, "1h", HTF_CANDLE_LIMIT).await {
                Ok(candles) => Some((detect_trend(&candles), range_position(&candles, RANGE_WINDOW))),
                Err(err) => {
                    tracing::warn!(symbol = %symbol, error = %err, "HTF 1h fetch failed, keeping cached context");
                    None
                }
            }
        } else {
            None
        };

        let fresh_15m = if need_15m {
            match source.fetch_candles(&symbol, "15m", HTF_CANDLE_LIMIT).await {
                Ok(candles) => Some(range_position(&candles, RANGE_WINDOW)),
                Err(err) => {
                    tracing::warn!(symbol = %symbol, error = %err, "HTF 15m fetch failed, keeping cached context");
                    None
                }
            }
        } else {
            None
        };

        let mut cache = self.cache.lock().unwrap();
        let entry = cache.entry(symbol).or_insert_with(CacheEntry::neutral);
        if let Some((trend, pos)) = fresh_1h {
            entry.trend_1h = trend;
            entry.pos_1h = pos;
            entry.fetched_1h = Some(Instant::now());
        }
        if let Some(pos) = fresh_15m {
            entry.pos_15m = pos;
            entry.fetched_15m = Some(Instant::now());
        }

        build_context(entry.trend_1h, entry.pos_1h, entry.pos_15m)
    }
}
