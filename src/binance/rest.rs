use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;

use crate::error::AppError;
use crate::model::candle::{validate_series, Candle};
use crate::scanner::MarketDataSource;

use super::types::{parse_kline_row, BinanceApiErrorResponse, Ticker24h};

const REQUEST_TIMEOUT_SECS: u64 = 10;

pub struct BinanceRestClient {
    http: reqwest::Client,
    base_url: String,
    // Simple rate limiter: request count in current minute window
    request_count: AtomicU64,
    window_start: std::sync::Mutex<Instant>,
}

impl BinanceRestClient {
    pub fn new(base_url: &str) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .unwrap_or_default();
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            request_count: AtomicU64::new(0),
            window_start: std::sync::Mutex::new(Instant::now()),
        }
    }

    fn check_rate_limit(&self) {
        let mut start = self.window_start.lock().unwrap();
        if start.elapsed().as_secs() >= 60 {
            *start = Instant::now();
            self.request_count.store(0, Ordering::Relaxed);
        }
        let count = self.request_count.fetch_add(1, Ordering::Relaxed);
        if count > 960 {
            tracing::warn!(count, "Approaching rate limit (80% of 1200/min)");
        }
    }

    async fn decode_error(resp: reqwest::Response, what: &str) -> anyhow::Error {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        if let Ok(err) = serde_json::from_str::<BinanceApiErrorResponse>(&body) {
            return AppError::BinanceApi {
                code: err.code,
                msg: err.msg,
            }
            .into();
        }
        anyhow::anyhow!("{what} failed with status {status}: {body}")
    }

    pub async fn ping(&self) -> Result<()> {
        let url = format!("{}/fapi/v1/ping", self.base_url);
        self.http
            .get(&url)
            .send()
            .await
            .context("ping failed")?
            .error_for_status()
            .context("ping returned error status")?;
        Ok(())
    }

    pub async fn get_klines(&self, symbol: &str, interval: &str, limit: usize) -> Result<Vec<Candle>> {
        self.check_rate_limit();

        let url = format!("{}/fapi/v1/klines", self.base_url);
        let limit = limit.clamp(1, 1500);
        let limit_s = limit.to_string();
        let resp = self
            .http
            .get(&url)
            .query(&[
                ("symbol", symbol.to_ascii_uppercase().as_str()),
                ("interval", interval),
                ("limit", limit_s.as_str()),
            ])
            .send()
            .await
            .context("get_klines HTTP failed")?;

        if !resp.status().is_success() {
            return Err(Self::decode_error(resp, "get_klines").await);
        }

        let rows: Vec<serde_json::Value> = resp
            .json()
            .await
            .context("get_klines JSON parse failed")?;

        let mut candles = Vec::with_capacity(rows.len());
        for row in &rows {
            candles.push(parse_kline_row(row)?);
        }
        validate_series(&candles).context("get_klines returned an unordered series")?;
        Ok(candles)
    }

    /// USDT-quoted perpetual pairs ranked by 24h quote volume.
    pub async fn get_usdt_pairs(&self, max_pairs: usize, min_volume_usdt: f64) -> Result<Vec<String>> {
        self.check_rate_limit();

        let url = format!("{}/fapi/v1/ticker/24hr", self.base_url);
        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .context("get_usdt_pairs HTTP failed")?;

        if !resp.status().is_success() {
            return Err(Self::decode_error(resp, "get_usdt_pairs").await);
        }

        let tickers: Vec<Ticker24h> = resp
            .json()
            .await
            .context("get_usdt_pairs JSON parse failed")?;

        Ok(rank_usdt_pairs(tickers, max_pairs, min_volume_usdt))
    }
}

pub fn rank_usdt_pairs(tickers: Vec<Ticker24h>, max_pairs: usize, min_volume_usdt: f64) -> Vec<String> {
    let mut eligible: Vec<Ticker24h> = tickers
        .into_iter()
        .filter(|t| t.symbol.ends_with("USDT") && t.quote_volume >= min_volume_usdt)
        .collect();
    eligible.sort_by(|a, b| {
        b.quote_volume
            .partial_cmp(&a.quote_volume)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    eligible
        .into_iter()
        .take(max_pairs.max(1))
        .map(|t| t.symbol)
        .collect()
}

#[async_trait]
impl MarketDataSource for BinanceRestClient {
    async fn fetch_candles(&self, symbol: &str, timeframe: &str, limit: usize) -> Result<Vec<Candle>> {
        self.get_klines(symbol, timeframe, limit).await
    }
}
