use crate::error::AppError;

#[derive(Debug, Clone)]
pub struct Candle {
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub open_time: u64,
    pub close_time: u64,
}

impl Candle {
    pub fn is_bullish(&self) -> bool {
        self.close >= self.open
    }

    pub fn body(&self) -> f64 {
        (self.close - self.open).abs()
    }

    pub fn range(&self) -> f64 {
        self.high - self.low
    }

    /// Where the close sits inside the candle range: 0.0 at the low, 1.0 at
    /// the high. Returns None for a zero-range candle.
    pub fn close_position(&self) -> Option<f64> {
        let range = self.range();
        if range <= 0.0 {
            return None;
        }
        Some((self.close - self.low) / range)
    }
}

/// Reject series a detector cannot evaluate: empty input or open times that
/// are not strictly increasing.
pub fn validate_series(candles: &[Candle]) -> Result<(), AppError> {
    if candles.is_empty() {
        return Err(AppError::InvalidInput("empty candle series".to_string()));
    }
    for pair in candles.windows(2) {
        if pair[1].open_time <= pair[0].open_time {
            return Err(AppError::InvalidInput(format!(
                "open times not strictly increasing: {} then {}",
                pair[0].open_time, pair[1].open_time
            )));
        }
    }
    Ok(())
}
