//! Order execution
//!
//! The engine talks to the exchange through the `OrderExecutor` trait so the
//! same strategy code drives live trading (Bitget adapter) and replay/labeling
//! runs (simulated fills).

mod executor;

pub use executor::{Fill, OrderExecutor, SimulatedExecutor};
