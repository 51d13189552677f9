pub mod binance;
pub mod config;
pub mod dedupe;
pub mod detector;
pub mod error;
pub mod model;
pub mod notifier;
pub mod scanner;
