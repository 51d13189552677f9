//! Scan-cycle orchestration: fetch candles per symbol, evaluate the IMB
//! rule, dedupe per mitigation zone, push surviving signals out. One cycle
//! at a time; a trigger that fires while a cycle is still running is a
//! no-op, never queued.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::watch;

use crate::dedupe::SignalDeduper;
use crate::detector::htf::HtfContextProvider;
use crate::detector::ImbDetector;
use crate::model::candle::Candle;
use crate::model::signal::Signal;
use crate::notifier::Notifier;

/// Source of recent candle history for one symbol/timeframe. Production impl
/// is the Binance futures REST client; tests use synthetic sources.
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    async fn fetch_candles(&self, symbol: &str, timeframe: &str, limit: usize) -> Result<Vec<Candle>>;
}

pub struct Scanner {
    source: Arc<dyn MarketDataSource>,
    detector: ImbDetector,
    htf: HtfContextProvider,
    notifier: Notifier,
    deduper: Mutex<SignalDeduper>,
    timeframe: String,
    candle_limit: usize,
    cooldown: Duration,
    last_alert: Mutex<HashMap<String, Instant>>,
    busy: AtomicBool,
}

impl Scanner {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        source: Arc<dyn MarketDataSource>,
        detector: ImbDetector,
        htf: HtfContextProvider,
        notifier: Notifier,
        deduper: SignalDeduper,
        timeframe: String,
        candle_limit: usize,
        cooldown: Duration,
    ) -> Self {
        Self {
            source,
            detector,
            htf,
            notifier,
            deduper: Mutex::new(deduper),
            timeframe,
            candle_limit,
            cooldown,
            last_alert: Mutex::new(HashMap::new()),
            busy: AtomicBool::new(false),
        }
    }

    /// One pass over the tracked symbols. Returns None without doing any
    /// work when a cycle is already in flight. Per-symbol failures are
    /// logged and never block the remaining symbols.
    pub async fn run_cycle(&self, symbols: &[String]) -> Option<Vec<Signal>> {
        if self.busy.swap(true, Ordering::SeqCst) {
            return None;
        }
        let started = Instant::now();
        let mut emitted = Vec::new();

        for symbol in symbols {
            match self.scan_symbol(symbol).await {
                Ok(Some(signal)) => {
                    if self.in_cooldown(symbol) {
                        tracing::debug!(symbol = %symbol, "Signal suppressed by cooldown");
                        continue;
                    }
                    let (dedupe_symbol, zone_id) = signal.dedupe_key();
                    let admitted = self.deduper.lock().unwrap().admit(&dedupe_symbol, zone_id);
                    if !admitted {
                        tracing::debug!(
                            symbol = %symbol,
                            zone_id = signal.zone_id,
                            "Zone already alerted, skipping"
                        );
                        continue;
                    }
                    self.mark_alerted(symbol);
                    if let Err(err) = self.notifier.send(&signal).await {
                        tracing::error!(symbol = %symbol, error = %err, "Notification dropped");
                    }
                    emitted.push(signal);
                }
                Ok(None) => {}
                Err(err) => {
                    tracing::warn!(symbol = %symbol, error = %err, "Symbol scan failed");
                }
            }
        }

        tracing::info!(
            symbols = symbols.len(),
            signals = emitted.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Scan cycle complete"
        );
        self.busy.store(false, Ordering::SeqCst);
        Some(emitted)
    }

    async fn scan_symbol(&self, symbol: &str) -> Result<Option<Signal>> {
        let candles = self
            .source
            .fetch_candles(symbol, &self.timeframe, self.candle_limit)
            .await?;
        let htf = self.htf.context_for(self.source.as_ref(), symbol).await;
        Ok(self.detector.evaluate(symbol, &candles, &htf)?)
    }

    fn in_cooldown(&self, symbol: &str) -> bool {
        if self.cooldown.is_zero() {
            return false;
        }
        let last_alert = self.last_alert.lock().unwrap();
        last_alert
            .get(&symbol.to_ascii_uppercase())
            .map(|t| t.elapsed() < self.cooldown)
            .unwrap_or(false)
    }

    fn mark_alerted(&self, symbol: &str) {
        let mut last_alert = self.last_alert.lock().unwrap();
        last_alert.insert(symbol.to_ascii_uppercase(), Instant::now());
    }

    pub fn flush_snapshot(&self, path: &Path) -> Result<()> {
        self.deduper.lock().unwrap().flush_snapshot(path)
    }

    /// Fixed-interval scan loop. Missed ticks are skipped rather than
    /// queued, and the shutdown signal is honored between cycles.
    pub async fn run(
        self: Arc<Self>,
        symbols: Vec<String>,
        interval: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        tracing::info!(
            symbols = symbols.len(),
            interval_secs = interval.as_secs(),
            timeframe = %self.timeframe,
            "Scanner loop started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if self.run_cycle(&symbols).await.is_none() {
                        tracing::debug!("Previous cycle still running, trigger skipped");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::info!("Scanner loop stopped");
    }
}
