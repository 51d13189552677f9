use serde::Deserialize;

use crate::error::AppError;
use crate::model::candle::Candle;

/// Deserialize Binance string-encoded numbers to f64.
pub fn string_to_f64<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    s.parse::<f64>().map_err(serde::de::Error::custom)
}

/// One row of `/fapi/v1/ticker/24hr`.
#[derive(Debug, Deserialize)]
pub struct Ticker24h {
    pub symbol: String,
    #[serde(rename = "quoteVolume", deserialize_with = "string_to_f64")]
    pub quote_volume: f64,
    #[serde(rename = "lastPrice", deserialize_with = "string_to_f64")]
    pub last_price: f64,
}

#[derive(Debug, Deserialize)]
pub struct BinanceApiErrorResponse {
    pub code: i64,
    pub msg: String,
}

/// Parse one kline row from the futures REST API. Rows arrive as
/// heterogeneous JSON arrays:
/// `[openTime, "open", "high", "low", "close", "volume", closeTime, ...]`.
pub fn parse_kline_row(row: &serde_json::Value) -> Result<Candle, AppError> {
    let arr = row
        .as_array()
        .ok_or_else(|| AppError::InvalidInput("kline row is not an array".to_string()))?;
    if arr.len() < 7 {
        return Err(AppError::InvalidInput(format!(
            "kline row has {} fields, expected at least 7",
            arr.len()
        )));
    }

    let num_at = |i: usize| -> Result<f64, AppError> {
        let v = &arr[i];
        if let Some(s) = v.as_str() {
            return s
                .parse::<f64>()
                .map_err(|_| AppError::InvalidInput(format!("kline field {i} is not numeric: {s}")));
        }
        v.as_f64()
            .ok_or_else(|| AppError::InvalidInput(format!("kline field {i} is not numeric")))
    };
    let time_at = |i: usize| -> Result<u64, AppError> {
        arr[i]
            .as_u64()
            .ok_or_else(|| AppError::InvalidInput(format!("kline field {i} is not a timestamp")))
    };

    Ok(Candle {
        open_time: time_at(0)?,
        open: num_at(1)?,
        high: num_at(2)?,
        low: num_at(3)?,
        close: num_at(4)?,
        volume: num_at(5)?,
        close_time: time_at(6)?,
    })
}
