//! Strategy core - S/R level engine and LHL trade management
//!
//! This module contains the core strategy components:
//! - Rolling candle store
//! - Swing point detection
//! - Tiered support/resistance level registry
//! - Proximity labeling
//! - Low-High-Low reference capture
//! - Long position state machine
//! - Per-candle orchestration

pub mod candles;
pub mod engine;
pub mod lhl;
pub mod proximity;
pub mod registry;
pub mod swing;
pub mod trade;

// Re-export commonly used types
pub use candles::{Candle, CandleStore};
pub use engine::{EngineStats, StrategyEngine};
pub use lhl::LhlReference;
pub use proximity::{classify, ProximityLabel};
pub use registry::{LevelKind, LevelRegistry, SrLevel};
pub use swing::{SwingDetector, SwingFilter, SwingKind, SwingPoint};
pub use trade::{Position, PositionSnapshot, StateLabel, TickOutcome, TradeMode, TradeStateMachine};
