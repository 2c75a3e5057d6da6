//! Error types for the strategy core
//!
//! Feed and execution collaborators surface failures through these variants;
//! the engine rejects bad input and keeps the candle stream alive rather than
//! crashing the process.

use thiserror::Error;

/// Errors produced by the strategy core
#[derive(Debug, Error)]
pub enum StrategyError {
    /// Candle feed delivered a duplicate, out-of-order or wrong-symbol record.
    /// The record is dropped; subsequent candles keep processing.
    #[error("candle stream ordering violated: {0}")]
    DataOrdering(String),

    /// Not enough swing history to capture a low-high-low reference at entry
    /// time. The entry is refused and the engine stays flat.
    #[error("not enough swing history to form a low-high-low reference")]
    InsufficientHistory,

    /// Configuration invariant violated. Raised at startup, before any candle
    /// is processed.
    #[error("configuration invariant violated: {0}")]
    ConfigurationInvariant(String),

    /// Order placement or close failed at the exchange. No position state
    /// changes; the triggering condition re-fires on the next tick.
    #[error("order execution failed: {0}")]
    Execution(String),
}
