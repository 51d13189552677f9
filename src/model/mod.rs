pub mod candle;
pub mod signal;
