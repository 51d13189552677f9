pub mod htf;
pub mod tiers;

use chrono::Utc;

use crate::config::DetectorConfig;
use crate::error::AppError;
use crate::model::candle::{validate_series, Candle};
use crate::model::signal::{Impulse, MitigationZone, Side, Signal};

use self::htf::HtfContext;
use self::tiers::{evaluate_quality, QualityMeta};

/// Stop buffer beyond the zone edge, as a fraction of the impulse close.
const SL_BUFFER_PCT: f64 = 0.0005;
/// How far back from the impulse to look for the block candle.
const BLOCK_LOOKBACK: usize = 8;
const TP1_MULT: f64 = 1.2;
const TP3_MULT: f64 = 3.0;

#[derive(Debug, Clone, Copy)]
struct Levels {
    entry: f64,
    stop_loss: f64,
    tp1: f64,
    tp2: f64,
    tp3: f64,
    risk: f64,
    sl_pct: f64,
}

#[derive(Debug, Clone, Copy)]
struct Retrace {
    touch_index: usize,
    confirm_index: usize,
}

/// Institutional Mitigation Block detector.
///
/// Pure over its input series: impulse leg -> opposing block candle ->
/// confirmed retrace into the block -> entry/SL/TP levels, gated by RR,
/// quality tier and the higher-timeframe context.
#[derive(Debug, Clone)]
pub struct ImbDetector {
    cfg: DetectorConfig,
}

impl ImbDetector {
    pub fn new(cfg: DetectorConfig) -> Self {
        Self { cfg }
    }

    pub fn evaluate(
        &self,
        symbol: &str,
        candles: &[Candle],
        htf: &HtfContext,
    ) -> Result<Option<Signal>, AppError> {
        validate_series(candles)?;
        if candles.len() < self.cfg.min_candles {
            return Ok(None);
        }

        let Some(impulse) = self.detect_impulse(candles) else {
            return Ok(None);
        };

        // Setup must still be fresh: the impulse may not be older than the
        // zone lifetime.
        let age = candles.len() - 1 - impulse.index;
        if age > self.cfg.zone_expiry_candles {
            return Ok(None);
        }

        let Some(zone) = self.find_block(symbol, candles, &impulse) else {
            return Ok(None);
        };

        let Some(retrace) = confirm_retrace(candles, impulse.index, &zone) else {
            return Ok(None);
        };

        let ref_price = candles[impulse.index].close;
        let Some(levels) = build_levels(zone.side, &zone, ref_price, self.cfg.risk_multiple) else {
            return Ok(None);
        };

        let rr_tp2 = (levels.tp2 - levels.entry).abs() / levels.risk;
        let rr_ok = rr_tp2 >= self.cfg.min_rr_tp2;
        if !rr_ok {
            return Ok(None);
        }

        if !htf.allows(zone.side) {
            return Ok(None);
        }

        let quality = evaluate_quality(&QualityMeta {
            has_block: true,
            impulse_ok: impulse.strength >= self.cfg.displacement_threshold,
            touch_ok: retrace.touch_index > impulse.index,
            reaction_ok: retrace.confirm_index >= retrace.touch_index,
            rr_ok,
            sl_pct: levels.sl_pct,
            htf_alignment: htf.aligned(zone.side),
        });
        if quality.tier < self.cfg.min_tier() {
            return Ok(None);
        }

        Ok(Some(Signal {
            symbol: symbol.to_ascii_uppercase(),
            side: zone.side,
            entry: levels.entry,
            stop_loss: levels.stop_loss,
            tp1: levels.tp1,
            tp2: levels.tp2,
            tp3: levels.tp3,
            sl_pct: levels.sl_pct,
            zone_id: zone.block_open_time,
            tier: quality.tier,
            score: quality.score,
            created_at: Utc::now(),
        }))
    }

    /// Strongest displacement candle in the recent window: body well above
    /// the average-body baseline, close pinned near its extreme.
    fn detect_impulse(&self, candles: &[Candle]) -> Option<Impulse> {
        let lookback = self.cfg.impulse_lookback.min(candles.len());
        if lookback < 2 {
            return None;
        }
        let start = candles.len() - lookback;
        let segment = &candles[start..];
        let baseline = avg_body(&segment[..segment.len() - 1], 10);
        if baseline <= 0.0 {
            return None;
        }

        let mut best: Option<Impulse> = None;
        for (offset, c) in segment.iter().enumerate() {
            let body = c.body();
            if body <= 0.0 {
                continue;
            }
            let strength = body / baseline;
            if strength < self.cfg.displacement_threshold {
                continue;
            }
            let Some(pos) = c.close_position() else {
                continue;
            };

            let side = if c.close > c.open && pos >= self.cfg.close_position_pct {
                Side::Long
            } else if c.close < c.open && pos <= 1.0 - self.cfg.close_position_pct {
                Side::Short
            } else {
                continue;
            };

            // Ties broken by most-recent occurrence.
            if best.map(|b| strength >= b.strength).unwrap_or(true) {
                best = Some(Impulse {
                    index: start + offset,
                    side,
                    strength,
                });
            }
        }
        best
    }

    /// Last opposing candle before the impulse bounds the mitigation zone.
    fn find_block(&self, symbol: &str, candles: &[Candle], impulse: &Impulse) -> Option<MitigationZone> {
        if impulse.index == 0 {
            return None;
        }
        let stop = impulse.index.saturating_sub(BLOCK_LOOKBACK);
        let block_index = (stop..impulse.index).rev().find(|&i| {
            let c = &candles[i];
            match impulse.side {
                Side::Long => c.close < c.open,
                Side::Short => c.close > c.open,
            }
        })?;

        let block = &candles[block_index];
        if block.high <= block.low {
            return None;
        }

        // Wide blocks make for sloppy entries; cap the zone width relative
        // to the impulse close.
        let ref_price = candles[impulse.index].close;
        if ref_price <= 0.0 {
            return None;
        }
        let range_pct = (block.high - block.low) / ref_price;
        if range_pct > self.cfg.max_zone_range_pct {
            return None;
        }

        Some(MitigationZone {
            symbol: symbol.to_ascii_uppercase(),
            side: impulse.side,
            low: block.low,
            high: block.high,
            block_open_time: block.open_time,
            block_index,
        })
    }
}

fn avg_body(candles: &[Candle], count: usize) -> f64 {
    let n = candles.len().min(count);
    if n == 0 {
        return 0.0;
    }
    let total: f64 = candles[candles.len() - n..].iter().map(Candle::body).sum();
    total / n as f64
}

/// A candidate only fires after price closes back into the zone and a
/// reversal candle confirms, with no prior close through the invalidation
/// boundary.
fn confirm_retrace(candles: &[Candle], impulse_index: usize, zone: &MitigationZone) -> Option<Retrace> {
    let mut touch_index: Option<usize> = None;
    let boundary = zone.invalidation_boundary();
    for (i, c) in candles.iter().enumerate().skip(impulse_index + 1) {
        let invalidated = match zone.side {
            Side::Long => c.close < boundary,
            Side::Short => c.close > boundary,
        };
        if invalidated {
            return None;
        }

        if touch_index.is_none() && zone.contains(c.close) {
            touch_index = Some(i);
        }

        if let Some(touch) = touch_index {
            let rejected = match zone.side {
                Side::Long => c.is_bullish() && c.close >= zone.midpoint(),
                Side::Short => !c.is_bullish() && c.close <= zone.midpoint(),
            };
            if rejected {
                return Some(Retrace {
                    touch_index: touch,
                    confirm_index: i,
                });
            }
        }
    }
    None
}

/// Entry at the zone midpoint, stop beyond the far edge with a small buffer,
/// targets at fixed risk multiples.
fn build_levels(side: Side, zone: &MitigationZone, ref_price: f64, risk_multiple: f64) -> Option<Levels> {
    let entry = zone.midpoint();
    let reference = if ref_price > 0.0 { ref_price } else { entry };
    let buffer = reference * SL_BUFFER_PCT;

    let (stop_loss, risk) = match side {
        Side::Long => {
            let sl = zone.low - buffer;
            (sl, entry - sl)
        }
        Side::Short => {
            let sl = zone.high + buffer;
            (sl, sl - entry)
        }
    };
    if risk <= 0.0 || entry <= 0.0 {
        return None;
    }

    let sign = match side {
        Side::Long => 1.0,
        Side::Short => -1.0,
    };
    Some(Levels {
        entry,
        stop_loss,
        tp1: entry + sign * TP1_MULT * risk,
        tp2: entry + sign * risk_multiple * risk,
        tp3: entry + sign * TP3_MULT * risk,
        risk,
        sl_pct: (risk / entry).abs() * 100.0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zone(side: Side, low: f64, high: f64) -> MitigationZone {
        MitigationZone {
            symbol: "BTCUSDT".to_string(),
            side,
            low,
            high,
            block_open_time: 42,
            block_index: 3,
        }
    }

    #[test]
    fn long_levels_sit_around_the_zone() {
        let z = zone(Side::Long, 99.0, 101.0);
        let levels = build_levels(Side::Long, &z, 102.0, 2.0).unwrap();
        assert!((levels.entry - 100.0).abs() < 1e-9);
        assert!(levels.stop_loss < z.low);
        assert!(levels.tp1 > levels.entry);
        assert!(levels.tp1 < levels.tp2 && levels.tp2 < levels.tp3);
    }

    #[test]
    fn short_levels_mirror_long() {
        let z = zone(Side::Short, 99.0, 101.0);
        let levels = build_levels(Side::Short, &z, 98.0, 2.0).unwrap();
        assert!(levels.stop_loss > z.high);
        assert!(levels.tp1 < levels.entry);
        assert!(levels.tp1 > levels.tp2 && levels.tp2 > levels.tp3);
    }

    #[test]
    fn avg_body_ignores_candles_outside_window() {
        let mk = |open: f64, close: f64, t: u64| Candle {
            open,
            high: open.max(close) + 0.1,
            low: open.min(close) - 0.1,
            close,
            volume: 1.0,
            open_time: t,
            close_time: t + 1,
        };
        let candles = vec![mk(0.0, 100.0, 0), mk(100.0, 101.0, 1), mk(101.0, 102.0, 2)];
        // Window of 2 skips the huge first body.
        assert!((avg_body(&candles, 2) - 1.0).abs() < 1e-9);
    }
}
