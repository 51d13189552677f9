use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::Path;

use crate::model::signal::Tier;
use crate::notifier::LeverageBand;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub binance: BinanceConfig,
    pub scanner: ScannerConfig,
    pub detector: DetectorConfig,
    pub notifier: NotifierConfig,
    #[serde(default)]
    pub dedupe: DedupeConfig,
    pub logging: LoggingConfig,
    #[serde(skip)]
    pub telegram: TelegramConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BinanceConfig {
    pub rest_base_url: String,
    pub timeframe: String,
    pub candle_limit: usize,
    #[serde(default)]
    pub symbols: Vec<String>,
    #[serde(default = "default_max_pairs")]
    pub max_pairs: usize,
    #[serde(default = "default_min_volume")]
    pub min_volume_usdt: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScannerConfig {
    pub scan_interval_secs: u64,
    #[serde(default)]
    pub cooldown_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DetectorConfig {
    pub min_candles: usize,
    pub impulse_lookback: usize,
    pub displacement_threshold: f64,
    pub close_position_pct: f64,
    pub max_zone_range_pct: f64,
    pub zone_expiry_candles: usize,
    pub risk_multiple: f64,
    pub min_rr_tp2: f64,
    pub use_htf_filter: bool,
    pub min_tier: String,
}

impl DetectorConfig {
    pub fn min_tier(&self) -> Tier {
        Tier::parse(&self.min_tier).unwrap_or(Tier::A)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotifierConfig {
    pub send_attempts: u32,
    pub retry_delay_secs: u64,
    #[serde(default)]
    pub leverage_bands: Vec<LeverageBand>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct DedupeConfig {
    #[serde(default)]
    pub snapshot_path: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

#[derive(Debug, Clone, Default)]
pub struct TelegramConfig {
    pub bot_token: String,
    pub chat_id: String,
}

/// Parse a Binance kline interval string (e.g. "1m", "5m", "1h", "1d") into milliseconds.
pub fn parse_interval_ms(s: &str) -> Result<u64> {
    if s.len() < 2 {
        bail!("invalid interval '{}': expected format like '5m'", s);
    }

    let (num_str, suffix) = s.split_at(s.len() - 1);
    let n: u64 = num_str.parse().with_context(|| {
        format!(
            "invalid interval '{}': quantity must be a positive integer",
            s
        )
    })?;
    if n == 0 {
        bail!("invalid interval '{}': quantity must be > 0", s);
    }

    let unit_ms = match suffix {
        "s" => 1_000,
        "m" => 60_000,
        "h" => 3_600_000,
        "d" => 86_400_000,
        "w" => 7 * 86_400_000,
        "M" => 30 * 86_400_000,
        _ => bail!(
            "invalid interval '{}': unsupported suffix '{}', expected one of s/m/h/d/w/M",
            s,
            suffix
        ),
    };

    n.checked_mul(unit_ms)
        .with_context(|| format!("invalid interval '{}': value is too large", s))
}

fn default_max_pairs() -> usize {
    30
}

fn default_min_volume() -> f64 {
    10_000_000.0
}

impl BinanceConfig {
    pub fn timeframe_ms(&self) -> Result<u64> {
        parse_interval_ms(&self.timeframe)
    }

    pub fn tracked_symbols(&self) -> Vec<String> {
        let mut out = Vec::new();
        for sym in &self.symbols {
            let s = sym.trim().to_ascii_uppercase();
            if !s.is_empty() && !out.iter().any(|v| v == &s) {
                out.push(s);
            }
        }
        out
    }
}

impl Config {
    /// Zone lifetime in wall-clock seconds, used for both dedupe expiry and
    /// the validity window in the outbound message.
    pub fn zone_ttl_secs(&self) -> Result<u64> {
        let tf_ms = self.binance.timeframe_ms()?;
        Ok(self.detector.zone_expiry_candles as u64 * tf_ms / 1000)
    }

    pub fn validity_minutes(&self) -> Result<u64> {
        Ok(self.zone_ttl_secs()? / 60)
    }

    pub fn load() -> Result<Self> {
        Self::load_from(Path::new("config/default.toml"))
    }

    pub fn load_from(config_path: &Path) -> Result<Self> {
        dotenvy::dotenv().ok();

        let config_str = std::fs::read_to_string(config_path)
            .with_context(|| format!("failed to read {}", config_path.display()))?;

        let mut config: Config = toml::from_str(&config_str)
            .with_context(|| format!("failed to parse {}", config_path.display()))?;

        config.telegram.bot_token = std::env::var("TELEGRAM_BOT_TOKEN")
            .context("TELEGRAM_BOT_TOKEN not set in .env or environment")?;
        config.telegram.chat_id = std::env::var("TELEGRAM_CHAT_ID")
            .context("TELEGRAM_CHAT_ID not set in .env or environment")?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.binance
            .timeframe_ms()
            .context("binance.timeframe is invalid")?;

        if self.binance.tracked_symbols().is_empty() && self.binance.max_pairs == 0 {
            bail!("binance.symbols is empty and binance.max_pairs is 0: nothing to scan");
        }
        if self.binance.candle_limit < self.detector.min_candles {
            bail!(
                "binance.candle_limit ({}) is below detector.min_candles ({})",
                self.binance.candle_limit,
                self.detector.min_candles
            );
        }
        if self.scanner.scan_interval_secs == 0 {
            bail!("scanner.scan_interval_secs must be > 0");
        }
        if self.detector.displacement_threshold <= 1.0 {
            bail!("detector.displacement_threshold must be > 1.0");
        }
        if !(0.5..=1.0).contains(&self.detector.close_position_pct) {
            bail!("detector.close_position_pct must be within 0.5..=1.0");
        }
        if self.detector.max_zone_range_pct <= 0.0 {
            bail!("detector.max_zone_range_pct must be > 0");
        }
        if self.detector.zone_expiry_candles == 0 {
            bail!("detector.zone_expiry_candles must be > 0");
        }
        if self.detector.risk_multiple <= 0.0 {
            bail!("detector.risk_multiple must be > 0");
        }
        if Tier::parse(&self.detector.min_tier).is_none() {
            bail!(
                "detector.min_tier '{}' is not one of NONE/B/A/A+",
                self.detector.min_tier
            );
        }
        if self.notifier.send_attempts == 0 {
            bail!("notifier.send_attempts must be > 0");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_toml() -> &'static str {
        r#"
[binance]
rest_base_url = "https://fapi.binance.com"
timeframe = "5m"
candle_limit = 120
symbols = ["BTCUSDT", "ETHUSDT"]
max_pairs = 30
min_volume_usdt = 10000000.0

[scanner]
scan_interval_secs = 60
cooldown_secs = 900

[detector]
min_candles = 50
impulse_lookback = 20
displacement_threshold = 1.5
close_position_pct = 0.7
max_zone_range_pct = 0.008
zone_expiry_candles = 12
risk_multiple = 2.0
min_rr_tp2 = 1.5
use_htf_filter = true
min_tier = "A"

[notifier]
send_attempts = 3
retry_delay_secs = 2

[dedupe]
snapshot_path = "state/dedupe.json"

[logging]
level = "info"
"#
    }

    #[test]
    fn parse_sample_toml() {
        let config: Config = toml::from_str(sample_toml()).unwrap();
        assert_eq!(config.binance.timeframe, "5m");
        assert_eq!(config.binance.tracked_symbols().len(), 2);
        assert_eq!(config.scanner.scan_interval_secs, 60);
        assert_eq!(config.detector.min_tier(), Tier::A);
        assert_eq!(config.dedupe.snapshot_path.as_deref(), Some("state/dedupe.json"));
        config.validate().unwrap();
    }

    #[test]
    fn zone_ttl_follows_timeframe() {
        let config: Config = toml::from_str(sample_toml()).unwrap();
        // 12 candles of 5 minutes.
        assert_eq!(config.zone_ttl_secs().unwrap(), 3600);
        assert_eq!(config.validity_minutes().unwrap(), 60);
    }

    #[test]
    fn tracked_symbols_dedup_and_uppercase() {
        let mut config: Config = toml::from_str(sample_toml()).unwrap();
        config.binance.symbols = vec![
            "btcusdt".to_string(),
            "BTCUSDT".to_string(),
            "  ".to_string(),
        ];
        assert_eq!(config.binance.tracked_symbols(), vec!["BTCUSDT".to_string()]);
    }

    #[test]
    fn validate_rejects_bad_thresholds() {
        let mut config: Config = toml::from_str(sample_toml()).unwrap();
        config.detector.displacement_threshold = 0.9;
        assert!(config.validate().is_err());

        let mut config: Config = toml::from_str(sample_toml()).unwrap();
        config.detector.min_tier = "S".to_string();
        assert!(config.validate().is_err());

        let mut config: Config = toml::from_str(sample_toml()).unwrap();
        config.binance.candle_limit = 10;
        assert!(config.validate().is_err());
    }

    #[test]
    fn parse_interval_valid() {
        assert_eq!(parse_interval_ms("5m").unwrap(), 300_000);
        assert_eq!(parse_interval_ms("1h").unwrap(), 3_600_000);
        assert_eq!(parse_interval_ms("1M").unwrap(), 2_592_000_000);
    }

    #[test]
    fn parse_interval_rejects_invalid_inputs() {
        assert!(parse_interval_ms("").is_err());
        assert!(parse_interval_ms("m").is_err());
        assert!(parse_interval_ms("0m").is_err());
        assert!(parse_interval_ms("1x").is_err());
    }
}
