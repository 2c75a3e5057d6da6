//! Bitget USDT-M futures connectivity
//!
//! REST client for candle fetch, leverage setup and market order
//! placement/close, plus the `OrderExecutor` adapter the live bot plugs into
//! the strategy engine.

mod client;
mod models;

pub use client::{BitgetClient, BitgetExecutor, DEFAULT_BASE_URL};
pub use models::{ApiResponse, OrderData, PlaceOrderRequest};
