//! Strategy orchestration
//!
//! One engine per symbol. Each incoming candle is processed to completion
//! before the next is accepted: append to the store, recompute swings, update
//! the level registry, label the close against a registry snapshot, then
//! advance trade management on the close price. Sequencing alone makes the
//! update cycle race-free; readers only ever see snapshots.

use std::path::Path;

use tracing::{debug, info, warn};

use super::candles::{Candle, CandleStore};
use super::lhl::latest_reference;
use super::proximity::{classify, ProximityLabel};
use super::registry::{LevelRegistry, SrLevel};
use super::swing::{SwingDetector, SwingPoint};
use super::trade::{Position, PositionSnapshot, TickOutcome, TradeMode, TradeStateMachine};
use crate::config::{ShutdownPolicy, StrategyConfig};
use crate::error::StrategyError;
use crate::execution::OrderExecutor;

/// Running tallies for monitoring and replay summaries
#[derive(Debug, Clone, Copy, Default)]
pub struct EngineStats {
    pub candles_processed: u64,
    pub entries: u32,
    pub entries_refused: u32,
    pub mode_switches: u32,
    pub stop_loss_exits: u32,
    pub take_profit_exits: u32,
}

/// Single-symbol strategy engine
pub struct StrategyEngine<E: OrderExecutor> {
    config: StrategyConfig,
    store: CandleStore,
    detector: SwingDetector,
    registry: LevelRegistry,
    machine: TradeStateMachine,
    executor: E,
    /// Swings from the latest detection pass, in window order
    swings: Vec<SwingPoint>,
    stats: EngineStats,
}

impl<E: OrderExecutor> StrategyEngine<E> {
    pub fn new(config: StrategyConfig, executor: E) -> Result<Self, StrategyError> {
        config.validate()?;
        Ok(Self {
            store: CandleStore::new(config.symbol.clone(), config.window_capacity),
            detector: SwingDetector::new(config.swing_half_width),
            registry: LevelRegistry::new(config.proximity_band, config.max_levels_per_side),
            machine: TradeStateMachine::new(config.take_profit_pct),
            executor,
            swings: Vec::new(),
            stats: EngineStats::default(),
            config,
        })
    }

    /// Replace the default swing detector (e.g. to install significance
    /// filters)
    pub fn set_detector(&mut self, detector: SwingDetector) {
        self.detector = detector;
    }

    /// Seed the engine from bulk history before live processing
    ///
    /// Runs one detection + registry pass over the loaded window so the tiers
    /// exist before the first live candle. Disordered records are dropped and
    /// counted, not fatal.
    pub fn seed_history(&mut self, candles: impl IntoIterator<Item = Candle>) -> usize {
        let mut rejected = 0;
        for candle in candles {
            if let Err(e) = self.store.push(candle) {
                warn!("historical candle dropped: {e}");
                rejected += 1;
            }
        }
        self.swings = self.detector.detect(self.store.candles()).collect();
        self.registry.update(&self.swings);
        info!(
            "seeded {} candles: {} supports, {} resistances",
            self.store.len(),
            self.registry.support_count(),
            self.registry.resistance_count()
        );
        rejected
    }

    /// Process one candle: update levels, label the close, manage the trade
    pub async fn on_candle(&mut self, candle: Candle) -> Result<ProximityLabel, StrategyError> {
        let price = candle.close;
        let timestamp = candle.timestamp;
        self.store.push(candle)?;
        self.stats.candles_processed += 1;

        self.swings = self.detector.detect(self.store.candles()).collect();
        self.registry.update(&self.swings);

        let snapshot = self.registry.snapshot();
        let label = classify(price, &snapshot, self.config.touch_tolerance);

        if self.machine.is_flat() {
            if let Some(support) = self.entry_level(price, &snapshot, label) {
                self.try_enter(price, timestamp, support).await?;
            }
        } else {
            self.manage_position(price).await?;
        }

        Ok(label)
    }

    /// A labeled support tier qualifies for entry when price approaches it
    /// from above within the entry proximity band
    fn entry_level<'a>(
        &self,
        price: f64,
        snapshot: &'a [SrLevel],
        label: ProximityLabel,
    ) -> Option<&'a SrLevel> {
        let ProximityLabel::Support(tier) = label else {
            return None;
        };
        let level = snapshot
            .iter()
            .find(|l| l.tier == tier && matches!(l.kind, super::registry::LevelKind::Support))?;
        let above = price > level.price;
        let near = (price - level.price).abs() <= self.config.entry_proximity.width_at(level.price);
        (above && near).then_some(level)
    }

    async fn try_enter(
        &mut self,
        price: f64,
        timestamp: chrono::DateTime<chrono::Utc>,
        support: &SrLevel,
    ) -> Result<(), StrategyError> {
        let lhl = match latest_reference(&self.swings, timestamp, self.config.lhl_low_tolerance) {
            Ok(reference) => reference,
            Err(StrategyError::InsufficientHistory) => {
                self.stats.entries_refused += 1;
                warn!(
                    "entry at {} ({}) refused: no completed low-high-low reference yet",
                    price,
                    support.tier_label()
                );
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        let size = self.config.position_size(price);
        let fill = match self
            .executor
            .open_long(&self.config.symbol, size, price)
            .await
        {
            Ok(fill) => fill,
            Err(e) => {
                warn!("entry order failed, staying flat: {e}");
                return Err(e);
            }
        };

        let stop_loss_price = self.config.stop_loss_price(fill.price);
        info!(
            "ENTRY: long {} {} @ {:.4} | support {} @ {:.4} | stop {:.4} | midpoint {:.4}",
            fill.size,
            self.config.symbol,
            fill.price,
            support.tier_label(),
            support.price,
            stop_loss_price,
            lhl.midpoint()
        );

        self.machine.open(Position {
            symbol: self.config.symbol.clone(),
            entry_price: fill.price,
            size: fill.size,
            opened_at: timestamp,
            stop_loss_price,
            mode: TradeMode::StopLossManaged,
            lhl,
        });
        self.stats.entries += 1;
        Ok(())
    }

    async fn manage_position(&mut self, price: f64) -> Result<(), StrategyError> {
        match self.machine.on_tick(price) {
            TickOutcome::Hold => Ok(()),
            TickOutcome::SwitchedToTakeProfit { peak } => {
                self.stats.mode_switches += 1;
                info!("midpoint crossed @ {:.4}: trailing take-profit from peak {:.4}", price, peak);
                Ok(())
            }
            TickOutcome::ExitStopLoss { price } => {
                self.close_open_position(price, "STOP LOSS").await?;
                self.stats.stop_loss_exits += 1;
                Ok(())
            }
            TickOutcome::ExitTakeProfit { price, peak } => {
                debug!("trailing exit: peak {:.4}, trigger {:.4}", peak, price);
                self.close_open_position(price, "TAKE PROFIT").await?;
                self.stats.take_profit_exits += 1;
                Ok(())
            }
        }
    }

    async fn close_open_position(
        &mut self,
        price: f64,
        reason: &str,
    ) -> Result<(), StrategyError> {
        let size = self
            .machine
            .position()
            .map(|p| p.size)
            .expect("close without open position");

        match self.executor.close_long(&self.config.symbol, size).await {
            Ok(fill) => {
                let position = self.machine.close().expect("position vanished during close");
                let pnl = (price - position.entry_price) * position.size;
                info!(
                    "EXIT {}: {} @ {:.4} | entry {:.4} | P&L {:+.4} USDT | order {}",
                    reason, self.config.symbol, price, position.entry_price, pnl, fill.order_id
                );
                Ok(())
            }
            Err(e) => {
                // Transition not taken; the trigger re-fires next tick
                warn!("close order failed, position kept: {e}");
                Err(e)
            }
        }
    }

    /// Tier-ordered copy of the retained levels, supports first
    pub fn current_levels(&self) -> Vec<SrLevel> {
        self.registry.snapshot()
    }

    /// Monitoring view of the trade state machine
    pub fn current_state(&self) -> PositionSnapshot {
        self.machine.snapshot()
    }

    pub fn stats(&self) -> EngineStats {
        self.stats
    }

    pub fn last_price(&self) -> Option<f64> {
        self.store.last().map(|c| c.close)
    }

    pub fn executor_mut(&mut self) -> &mut E {
        &mut self.executor
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    /// Apply the shutdown policy to an open position
    ///
    /// `Flatten` closes at market through the executor; `Persist` writes the
    /// position as JSON at `state_path` for the next run to resume.
    pub async fn shutdown(&mut self, state_path: &Path) -> Result<(), StrategyError> {
        let Some(position) = self.machine.position().cloned() else {
            // Nothing open; remove any stale persisted state
            let _ = std::fs::remove_file(state_path);
            return Ok(());
        };

        match self.config.shutdown {
            ShutdownPolicy::Flatten => {
                let price = self.last_price().unwrap_or(position.entry_price);
                self.close_open_position(price, "SHUTDOWN").await
            }
            ShutdownPolicy::Persist => {
                let json = serde_json::to_vec_pretty(&position)
                    .map_err(|e| StrategyError::Execution(format!("state encode failed: {e}")))?;
                std::fs::write(state_path, json)
                    .map_err(|e| StrategyError::Execution(format!("state write failed: {e}")))?;
                info!(
                    "open position persisted to {} for resumption",
                    state_path.display()
                );
                Ok(())
            }
        }
    }

    /// Resume a persisted position written by a `Persist` shutdown
    ///
    /// Returns whether a position was restored. The state file is consumed.
    pub fn resume(&mut self, state_path: &Path) -> Result<bool, StrategyError> {
        if !state_path.exists() {
            return Ok(false);
        }
        let bytes = std::fs::read(state_path)
            .map_err(|e| StrategyError::Execution(format!("state read failed: {e}")))?;
        let position: Position = serde_json::from_slice(&bytes)
            .map_err(|e| StrategyError::Execution(format!("state decode failed: {e}")))?;
        if position.symbol != self.config.symbol {
            return Err(StrategyError::Execution(format!(
                "persisted position is for {}, engine trades {}",
                position.symbol, self.config.symbol
            )));
        }
        info!(
            "resuming {} position entered @ {:.4}",
            position.symbol, position.entry_price
        );
        self.machine.open(position);
        let _ = std::fs::remove_file(state_path);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::super::candles::test_support::candle_ohlc;
    use super::super::registry::LevelKind;
    use super::super::trade::StateLabel;
    use super::*;
    use crate::config::PriceBand;
    use crate::execution::SimulatedExecutor;

    fn test_config() -> StrategyConfig {
        StrategyConfig {
            window_capacity: 200,
            swing_half_width: 1,
            proximity_band: PriceBand::Absolute(1.0),
            touch_tolerance: PriceBand::Absolute(0.5),
            entry_proximity: PriceBand::Absolute(0.5),
            lhl_low_tolerance: PriceBand::Absolute(1.0),
            take_profit_pct: 0.05,
            ..Default::default()
        }
    }

    fn engine() -> StrategyEngine<SimulatedExecutor> {
        StrategyEngine::new(test_config(), SimulatedExecutor::new()).unwrap()
    }

    /// Zig-zag history with swing lows at 100, 95, 90 separated by highs,
    /// then a recovery leg. Flat candles so close == high == low.
    fn zigzag() -> Vec<Candle> {
        [
            103.0, 100.0, 104.0, 95.0, 105.0, 90.0, 103.5, // i = 0..=6
            98.0, 101.0, 97.0, // recovery, i = 7..=9
        ]
        .iter()
        .enumerate()
        .map(|(i, &p)| candle_ohlc(i as i64, p, p, p, p))
        .collect()
    }

    #[tokio::test]
    async fn seeding_builds_tiered_levels() {
        let mut eng = engine();
        assert_eq!(eng.seed_history(zigzag()), 0);

        let levels = eng.current_levels();
        let supports: Vec<f64> = levels
            .iter()
            .filter(|l| matches!(l.kind, LevelKind::Support))
            .map(|l| l.price)
            .collect();
        assert!(supports.contains(&100.0));
        assert!(supports.contains(&95.0));
        assert!(supports.contains(&90.0));
    }

    #[tokio::test]
    async fn later_swing_near_existing_level_merges() {
        let mut eng = engine();
        eng.seed_history(zigzag());

        // Continue the stream: a dip to 95.2 (within the 1.0 band of 95)
        // flanked by higher closes so it becomes a swing low
        for (i, p) in [(10, 99.0), (11, 95.2), (12, 100.0), (13, 101.0)] {
            eng.on_candle(candle_ohlc(i, p, p, p, p)).await.unwrap();
        }

        let levels = eng.current_levels();
        let merged = levels.iter().find(|l| l.price == 95.0).unwrap();
        assert_eq!(merged.touch_count, 2);
        assert!(!levels.iter().any(|l| l.price == 95.2));
    }

    #[tokio::test]
    async fn out_of_order_candle_is_rejected_and_stream_continues() {
        let mut eng = engine();
        eng.seed_history(zigzag());

        let stale = candle_ohlc(0, 100.0, 100.0, 100.0, 100.0);
        assert!(matches!(
            eng.on_candle(stale).await,
            Err(StrategyError::DataOrdering(_))
        ));

        let fresh = candle_ohlc(10, 99.0, 99.0, 99.0, 99.0);
        assert!(eng.on_candle(fresh).await.is_ok());
    }

    #[tokio::test]
    async fn failed_entry_order_leaves_engine_flat() {
        let mut eng = engine();
        eng.seed_history(zigzag());
        eng.executor_mut().fail_next = true;

        // Approach the 95 support from above, inside entry proximity
        let result = eng.on_candle(candle_ohlc(10, 95.3, 95.3, 95.3, 95.3)).await;
        assert!(matches!(result, Err(StrategyError::Execution(_))));
        assert_eq!(eng.current_state().state, StateLabel::Idle);
        assert_eq!(eng.stats().entries, 0);
    }

    #[tokio::test]
    async fn entry_then_stop_loss_round_trip() {
        let mut eng = engine();
        eng.seed_history(zigzag());

        // Entry just above the 95 support
        let label = eng
            .on_candle(candle_ohlc(10, 95.3, 95.3, 95.3, 95.3))
            .await
            .unwrap();
        assert!(matches!(label, ProximityLabel::Support(_)));
        assert_eq!(eng.stats().entries, 1);
        assert_eq!(
            eng.current_state().state,
            StateLabel::StopLossManaged
        );

        // Crash through the stop
        eng.on_candle(candle_ohlc(11, 60.0, 60.0, 60.0, 60.0))
            .await
            .unwrap();
        assert_eq!(eng.stats().stop_loss_exits, 1);
        assert_eq!(eng.current_state().state, StateLabel::Idle);
        assert_eq!(eng.executor().closes.len(), 1);
    }

    #[tokio::test]
    async fn persist_shutdown_and_resume_round_trip() {
        let dir = std::env::temp_dir().join("lhl-trader-test-state");
        std::fs::create_dir_all(&dir).unwrap();
        let state_path = dir.join("position.json");
        let _ = std::fs::remove_file(&state_path);

        let mut config = test_config();
        config.shutdown = ShutdownPolicy::Persist;

        let mut eng = StrategyEngine::new(config.clone(), SimulatedExecutor::new()).unwrap();
        eng.seed_history(zigzag());
        eng.on_candle(candle_ohlc(10, 95.3, 95.3, 95.3, 95.3))
            .await
            .unwrap();
        assert_eq!(eng.stats().entries, 1);

        eng.shutdown(&state_path).await.unwrap();
        assert!(state_path.exists());
        // Position persisted, not closed
        assert!(eng.executor().closes.is_empty());

        let mut resumed = StrategyEngine::new(config, SimulatedExecutor::new()).unwrap();
        assert!(resumed.resume(&state_path).unwrap());
        assert_eq!(
            resumed.current_state().state,
            StateLabel::StopLossManaged
        );
        assert!(!state_path.exists());
    }

    #[tokio::test]
    async fn flatten_shutdown_closes_open_position() {
        let dir = std::env::temp_dir().join("lhl-trader-test-flatten");
        std::fs::create_dir_all(&dir).unwrap();
        let state_path = dir.join("position.json");

        let mut eng = engine();
        eng.seed_history(zigzag());
        eng.on_candle(candle_ohlc(10, 95.3, 95.3, 95.3, 95.3))
            .await
            .unwrap();
        assert_eq!(eng.stats().entries, 1);

        eng.shutdown(&state_path).await.unwrap();
        assert_eq!(eng.executor().closes.len(), 1);
        assert_eq!(eng.current_state().state, StateLabel::Idle);
    }
}
