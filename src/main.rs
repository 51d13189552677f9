use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::watch;

use imb_scanner::binance::rest::BinanceRestClient;
use imb_scanner::config::Config;
use imb_scanner::dedupe::SignalDeduper;
use imb_scanner::detector::htf::HtfContextProvider;
use imb_scanner::detector::ImbDetector;
use imb_scanner::notifier::telegram::TelegramTransport;
use imb_scanner::notifier::{LeverageTable, Notifier};
use imb_scanner::scanner::Scanner;

#[tokio::main]
async fn main() -> Result<()> {
    // Load config
    let config = match Config::load() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config: {:#}", e);
            eprintln!("Make sure .env exists with TELEGRAM_BOT_TOKEN and TELEGRAM_CHAT_ID");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                config
                    .logging
                    .level
                    .parse()
                    .unwrap_or_else(|_| "info".parse().unwrap())
            }),
        )
        .init();

    tracing::info!(
        rest_url = %config.binance.rest_base_url,
        timeframe = %config.binance.timeframe,
        interval_secs = config.scanner.scan_interval_secs,
        "Starting IMB scanner"
    );

    let rest = Arc::new(BinanceRestClient::new(&config.binance.rest_base_url));

    // Verify connectivity before the first cycle; a failure here is worth a
    // warning but the scan loop retries on its own schedule anyway.
    match rest.ping().await {
        Ok(()) => tracing::info!("Binance futures ping OK"),
        Err(e) => tracing::warn!(error = %e, "Binance futures ping failed, continuing"),
    }

    // Tracked symbols: explicit list from config, otherwise top USDT perps
    // by 24h volume. Resolved once at startup.
    let symbols = {
        let configured = config.binance.tracked_symbols();
        if configured.is_empty() {
            rest.get_usdt_pairs(config.binance.max_pairs, config.binance.min_volume_usdt)
                .await
                .context("failed to discover USDT pairs")?
        } else {
            configured
        }
    };
    if symbols.is_empty() {
        anyhow::bail!("no symbols to scan: config list empty and discovery returned nothing");
    }
    tracing::info!(count = symbols.len(), pairs = %symbols.join(","), "Tracking symbols");

    let zone_ttl_secs = config.zone_ttl_secs()?;
    let snapshot_path: Option<PathBuf> = config
        .dedupe
        .snapshot_path
        .as_ref()
        .map(PathBuf::from);

    let mut deduper = SignalDeduper::new(zone_ttl_secs);
    if let Some(path) = &snapshot_path {
        match deduper.load_snapshot(path) {
            Ok(loaded) => {
                if loaded > 0 {
                    tracing::info!(loaded, path = %path.display(), "Restored dedupe snapshot");
                }
            }
            Err(e) => tracing::warn!(error = %e, "Dedupe snapshot load failed, starting clean"),
        }
    }

    let leverage = if config.notifier.leverage_bands.is_empty() {
        LeverageTable::default()
    } else {
        LeverageTable::new(config.notifier.leverage_bands.clone())
    };
    let notifier = Notifier::new(
        Arc::new(TelegramTransport::new(&config.telegram.bot_token)),
        config.telegram.chat_id.clone(),
        leverage,
        config.validity_minutes()?,
        config.notifier.send_attempts,
        Duration::from_secs(config.notifier.retry_delay_secs),
    );

    let scanner = Arc::new(Scanner::new(
        rest,
        ImbDetector::new(config.detector.clone()),
        HtfContextProvider::new(config.detector.use_htf_filter),
        notifier,
        deduper,
        config.binance.timeframe.clone(),
        config.binance.candle_limit,
        Duration::from_secs(config.scanner.cooldown_secs),
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let loop_handle = tokio::spawn(Arc::clone(&scanner).run(
        symbols,
        Duration::from_secs(config.scanner.scan_interval_secs),
        shutdown_rx,
    ));

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;
    tracing::info!("Shutdown requested");
    let _ = shutdown_tx.send(true);
    let _ = loop_handle.await;

    if let Some(path) = &snapshot_path {
        match scanner.flush_snapshot(path) {
            Ok(()) => tracing::info!(path = %path.display(), "Dedupe snapshot flushed"),
            Err(e) => tracing::warn!(error = %e, "Dedupe snapshot flush failed"),
        }
    }

    tracing::info!("IMB scanner stopped");
    Ok(())
}
