use imb_scanner::config::DetectorConfig;
use imb_scanner::detector::htf::HtfContext;
use imb_scanner::detector::ImbDetector;
use imb_scanner::model::candle::Candle;
use imb_scanner::model::signal::Side;

const TF_MS: u64 = 300_000;

fn candle(open: f64, high: f64, low: f64, close: f64, index: u64) -> Candle {
    Candle {
        open,
        high,
        low,
        close,
        volume: 10.0,
        open_time: index * TF_MS,
        close_time: (index + 1) * TF_MS,
    }
}

/// Small-bodied drift candles around a level.
fn quiet(from: u64, count: u64, level: f64) -> Vec<Candle> {
    (from..from + count)
        .map(|i| {
            let up = i % 2 == 0;
            let (open, close) = if up { (level, level + 0.2) } else { (level + 0.2, level) };
            candle(open, level + 0.3, level - 0.1, close, i)
        })
        .collect()
}

fn detector_config() -> DetectorConfig {
    DetectorConfig {
        min_candles: 30,
        impulse_lookback: 20,
        displacement_threshold: 1.5,
        close_position_pct: 0.7,
        max_zone_range_pct: 0.008,
        zone_expiry_candles: 12,
        risk_multiple: 2.0,
        min_rr_tp2: 1.5,
        use_htf_filter: false,
        min_tier: "B".to_string(),
    }
}

/// Quiet base, bearish block candle, bullish displacement away from it,
/// drift back, close into the zone, bullish rejection.
fn long_setup_series() -> Vec<Candle> {
    let mut candles = quiet(0, 25, 100.0);
    // Block: last bearish candle before the impulse. Zone [99.7, 100.3].
    candles.push(candle(100.2, 100.3, 99.7, 99.8, 25));
    // Impulse: large bullish body closing near its high.
    candles.push(candle(99.8, 105.1, 99.75, 105.0, 26));
    // Drift back toward the zone, no close inside yet.
    candles.push(candle(105.0, 105.2, 100.6, 100.8, 27));
    // Touch: close back inside the zone.
    candles.push(candle(100.8, 100.9, 100.0, 100.1, 28));
    // Rejection: bullish close at/above the zone midpoint.
    candles.push(candle(100.1, 100.4, 100.05, 100.25, 29));
    candles
}

fn short_setup_series() -> Vec<Candle> {
    let mut candles = quiet(0, 25, 100.0);
    // Block: last bullish candle before the impulse. Zone [99.9, 100.5].
    candles.push(candle(100.0, 100.5, 99.9, 100.4, 25));
    // Impulse: large bearish body closing near its low.
    candles.push(candle(100.4, 100.45, 95.1, 95.2, 26));
    // Drift back up toward the zone.
    candles.push(candle(95.2, 99.6, 95.0, 99.4, 27));
    // Touch: close back inside the zone.
    candles.push(candle(99.4, 100.3, 99.3, 100.1, 28));
    // Rejection: bearish close at/below the zone midpoint.
    candles.push(candle(100.1, 100.25, 99.8, 100.0, 29));
    candles
}

#[test]
fn quiet_series_yields_no_signal() {
    let detector = ImbDetector::new(detector_config());
    let candles = quiet(0, 60, 100.0);
    let result = detector
        .evaluate("BTCUSDT", &candles, &HtfContext::neutral())
        .unwrap();
    assert!(result.is_none());
}

#[test]
fn long_setup_emits_signal_with_ordered_levels() {
    let detector = ImbDetector::new(detector_config());
    let candles = long_setup_series();
    let signal = detector
        .evaluate("btcusdt", &candles, &HtfContext::neutral())
        .unwrap()
        .expect("expected a long signal");

    assert_eq!(signal.symbol, "BTCUSDT");
    assert_eq!(signal.side, Side::Long);
    // Entry at the zone midpoint.
    assert!((signal.entry - 100.0).abs() < 1e-9);
    // Stop strictly beyond the zone's far edge.
    assert!(signal.stop_loss < 99.7);
    // Targets strictly ordered away from entry.
    assert!(signal.entry < signal.tp1);
    assert!(signal.tp1 < signal.tp2);
    assert!(signal.tp2 < signal.tp3);
    // Zone identity is the block candle's open time.
    assert_eq!(signal.zone_id, 25 * TF_MS);
    assert!(signal.sl_pct > 0.0);
    assert!(signal.score >= 80);
}

#[test]
fn short_setup_emits_mirrored_levels() {
    let detector = ImbDetector::new(detector_config());
    let candles = short_setup_series();
    let signal = detector
        .evaluate("ETHUSDT", &candles, &HtfContext::neutral())
        .unwrap()
        .expect("expected a short signal");

    assert_eq!(signal.side, Side::Short);
    assert!((signal.entry - 100.2).abs() < 1e-9);
    assert!(signal.stop_loss > 100.5);
    assert!(signal.entry > signal.tp1);
    assert!(signal.tp1 > signal.tp2);
    assert!(signal.tp2 > signal.tp3);
}

#[test]
fn no_retrace_means_no_signal() {
    let detector = ImbDetector::new(detector_config());
    let mut candles = quiet(0, 25, 100.0);
    candles.push(candle(100.2, 100.3, 99.7, 99.8, 25));
    candles.push(candle(99.8, 105.1, 99.75, 105.0, 26));
    // Price keeps running away from the zone instead of retracing.
    candles.push(candle(105.0, 105.6, 104.9, 105.5, 27));
    candles.push(candle(105.5, 106.0, 105.4, 105.9, 28));
    candles.push(candle(105.9, 106.3, 105.8, 106.2, 29));

    let result = detector
        .evaluate("BTCUSDT", &candles, &HtfContext::neutral())
        .unwrap();
    assert!(result.is_none());
}

#[test]
fn close_through_invalidation_kills_the_zone() {
    let detector = ImbDetector::new(detector_config());
    let mut candles = quiet(0, 25, 100.0);
    candles.push(candle(100.2, 100.3, 99.7, 99.8, 25));
    candles.push(candle(99.8, 105.1, 99.75, 105.0, 26));
    // Sell-off through the zone: the second candle closes below the zone low
    // before any rejection can form.
    candles.push(candle(105.0, 105.2, 101.9, 102.0, 27));
    candles.push(candle(102.0, 102.1, 99.4, 99.5, 28));
    // A late close back inside must not resurrect the setup.
    candles.push(candle(99.5, 100.2, 99.4, 100.1, 29));

    let result = detector
        .evaluate("BTCUSDT", &candles, &HtfContext::neutral())
        .unwrap();
    assert!(result.is_none());
}

#[test]
fn stale_impulse_is_ignored() {
    let mut cfg = detector_config();
    cfg.zone_expiry_candles = 3;
    let detector = ImbDetector::new(cfg);

    let mut candles = long_setup_series();
    // Push the setup far into the past.
    let next = candles.len() as u64;
    candles.extend(quiet(next, 10, 100.2));

    let result = detector
        .evaluate("BTCUSDT", &candles, &HtfContext::neutral())
        .unwrap();
    assert!(result.is_none());
}

#[test]
fn short_series_is_not_an_error() {
    let detector = ImbDetector::new(detector_config());
    let candles = quiet(0, 10, 100.0);
    assert!(detector
        .evaluate("BTCUSDT", &candles, &HtfContext::neutral())
        .unwrap()
        .is_none());
}

#[test]
fn malformed_series_is_an_error() {
    let detector = ImbDetector::new(detector_config());

    assert!(detector
        .evaluate("BTCUSDT", &[], &HtfContext::neutral())
        .is_err());

    let mut unordered = long_setup_series();
    unordered.swap(3, 4);
    assert!(detector
        .evaluate("BTCUSDT", &unordered, &HtfContext::neutral())
        .is_err());
}

#[test]
fn htf_filter_blocks_misaligned_side() {
    let detector = ImbDetector::new(detector_config());
    let candles = long_setup_series();

    let blocked = HtfContext {
        ok_long: false,
        ..HtfContext::neutral()
    };
    assert!(detector.evaluate("BTCUSDT", &candles, &blocked).unwrap().is_none());

    // Shorts unaffected by the long block.
    let short_candles = short_setup_series();
    assert!(detector
        .evaluate("ETHUSDT", &short_candles, &blocked)
        .unwrap()
        .is_some());
}
