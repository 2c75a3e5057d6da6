//! Candle types and the rolling candle store

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StrategyError;

/// A single OHLCV candle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub symbol: String,
}

/// Append-only candle window for a single symbol
///
/// Candles must arrive in strictly increasing timestamp order; duplicates and
/// out-of-order records are rejected without touching the stored sequence.
/// Once the window exceeds its capacity the oldest candles are dropped.
#[derive(Debug)]
pub struct CandleStore {
    symbol: String,
    capacity: usize,
    candles: Vec<Candle>,
}

impl CandleStore {
    pub fn new(symbol: impl Into<String>, capacity: usize) -> Self {
        Self {
            symbol: symbol.into(),
            capacity,
            candles: Vec::with_capacity(capacity.min(4096)),
        }
    }

    /// Append a candle, enforcing ordering and the rolling capacity
    pub fn push(&mut self, candle: Candle) -> Result<(), StrategyError> {
        if candle.symbol != self.symbol {
            return Err(StrategyError::DataOrdering(format!(
                "candle for {} fed to {} store",
                candle.symbol, self.symbol
            )));
        }
        if let Some(last) = self.candles.last() {
            if candle.timestamp <= last.timestamp {
                return Err(StrategyError::DataOrdering(format!(
                    "candle at {} does not advance past {}",
                    candle.timestamp, last.timestamp
                )));
            }
        }

        self.candles.push(candle);
        if self.candles.len() > self.capacity {
            let excess = self.candles.len() - self.capacity;
            self.candles.drain(..excess);
        }
        Ok(())
    }

    pub fn candles(&self) -> &[Candle] {
        &self.candles
    }

    pub fn last(&self) -> Option<&Candle> {
        self.candles.last()
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use chrono::TimeZone;

    /// Candle `i` minutes after a fixed origin, with flat OHLC at `price`
    pub fn candle_at(i: i64, price: f64) -> Candle {
        candle_ohlc(i, price, price, price, price)
    }

    pub fn candle_ohlc(i: i64, open: f64, high: f64, low: f64, close: f64) -> Candle {
        Candle {
            timestamp: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
                + chrono::Duration::minutes(i * 5),
            open,
            high,
            low,
            close,
            volume: 100.0,
            symbol: "BTC/USDT".to_string(),
        }
    }
}
