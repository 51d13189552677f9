pub mod telegram;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;

use crate::model::signal::Signal;

/// Outbound message channel. Production impl is the Telegram Bot API; tests
/// swap in a recording transport.
#[async_trait]
pub trait NotifierTransport: Send + Sync {
    async fn send_message(&self, chat_id: &str, text: &str) -> Result<()>;
}

/// One row of the leverage recommendation step function: stops up to
/// `max_sl_pct` map to the `min_lev`..`max_lev` range.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq)]
pub struct LeverageBand {
    pub max_sl_pct: f64,
    pub min_lev: f64,
    pub max_lev: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LeverageTable {
    bands: Vec<LeverageBand>,
}

impl Default for LeverageTable {
    fn default() -> Self {
        Self {
            bands: vec![
                LeverageBand { max_sl_pct: 0.25, min_lev: 25.0, max_lev: 40.0 },
                LeverageBand { max_sl_pct: 0.50, min_lev: 15.0, max_lev: 25.0 },
                LeverageBand { max_sl_pct: 0.80, min_lev: 8.0, max_lev: 15.0 },
                LeverageBand { max_sl_pct: 1.20, min_lev: 5.0, max_lev: 8.0 },
            ],
        }
    }
}

impl LeverageTable {
    pub fn new(mut bands: Vec<LeverageBand>) -> Self {
        bands.sort_by(|a, b| {
            a.max_sl_pct
                .partial_cmp(&b.max_sl_pct)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        Self { bands }
    }

    /// Recommended leverage range for a stop distance. Stops wider than the
    /// last band fall back to 3x-5x; a degenerate stop gets the conservative
    /// 5x-10x.
    pub fn recommend(&self, sl_pct: f64) -> (f64, f64) {
        if sl_pct <= 0.0 {
            return (5.0, 10.0);
        }
        for band in &self.bands {
            if sl_pct <= band.max_sl_pct {
                return (band.min_lev, band.max_lev);
            }
        }
        (3.0, 5.0)
    }
}

/// Canonical signal message. The layout is fixed; consumers parse levels out
/// of the backticked fields.
pub fn format_signal(signal: &Signal, leverage: &LeverageTable, validity_minutes: u64) -> String {
    let (lev_min, lev_max) = leverage.recommend(signal.sl_pct);
    format!(
        "{emoji} IMB SIGNAL \u{2014} {symbol} ({label})\n\
         Entry : `{entry:.6}`\n\
         SL    : `{sl:.6}`\n\
         TP1   : `{tp1:.6}`\n\
         TP2   : `{tp2:.6}`\n\
         TP3   : `{tp3:.6}`\n\
         Model : Institutional Mitigation Block (IMB)\n\
         Leverage : {lev_min:.0}x\u{2013}{lev_max:.0}x (SL {sl_pct:.2}%)\n\
         Valid for : \u{00B1}{validity} min\n\
         Tier : {tier} (Score {score})",
        emoji = signal.side.emoji(),
        symbol = signal.symbol,
        label = signal.side.label(),
        entry = signal.entry,
        sl = signal.stop_loss,
        tp1 = signal.tp1,
        tp2 = signal.tp2,
        tp3 = signal.tp3,
        lev_min = lev_min,
        lev_max = lev_max,
        sl_pct = signal.sl_pct,
        validity = validity_minutes,
        tier = signal.tier.label(),
        score = signal.score,
    )
}

pub struct Notifier {
    transport: Arc<dyn NotifierTransport>,
    chat_id: String,
    leverage: LeverageTable,
    validity_minutes: u64,
    send_attempts: u32,
    retry_delay: Duration,
}

impl Notifier {
    pub fn new(
        transport: Arc<dyn NotifierTransport>,
        chat_id: String,
        leverage: LeverageTable,
        validity_minutes: u64,
        send_attempts: u32,
        retry_delay: Duration,
    ) -> Self {
        Self {
            transport,
            chat_id,
            leverage,
            validity_minutes,
            send_attempts: send_attempts.max(1),
            retry_delay,
        }
    }

    /// Format and deliver one signal, retrying transient transport failures
    /// with linear backoff. The error after the last attempt is returned for
    /// the caller to log; it never aborts the scan cycle.
    pub async fn send(&self, signal: &Signal) -> Result<()> {
        let text = format_signal(signal, &self.leverage, self.validity_minutes);

        let mut last_err = None;
        for attempt in 1..=self.send_attempts {
            match self.transport.send_message(&self.chat_id, &text).await {
                Ok(()) => {
                    tracing::info!(
                        symbol = %signal.symbol,
                        tier = signal.tier.label(),
                        score = signal.score,
                        attempt,
                        "Signal delivered"
                    );
                    return Ok(());
                }
                Err(err) => {
                    tracing::warn!(
                        symbol = %signal.symbol,
                        attempt,
                        max_attempts = self.send_attempts,
                        error = %err,
                        "Signal delivery failed"
                    );
                    last_err = Some(err);
                    if attempt < self.send_attempts {
                        tokio::time::sleep(self.retry_delay * attempt).await;
                    }
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("send failed")))
            .with_context(|| format!("giving up on {} after {} attempts", signal.symbol, self.send_attempts))
    }
}
