//! Historical replay and labeling
//!
//! Drives a fresh engine over a candle series in timestamp order, so every
//! row is labeled against the levels known at its own time and entries/exits
//! fill through the simulated executor. Produces the labeled candle CSV and
//! the final level export.

use std::path::Path;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::config::StrategyConfig;
use crate::data;
use crate::error::StrategyError;
use crate::execution::SimulatedExecutor;
use crate::strategy::{Candle, ProximityLabel, StrategyEngine};

/// Outcome of a replay run
#[derive(Debug)]
pub struct ReplayReport {
    pub candles_processed: u64,
    pub candles_rejected: u64,
    pub entries: u32,
    pub entries_refused: u32,
    pub stop_loss_exits: u32,
    pub take_profit_exits: u32,
    /// Rows labeled during the run, in input order
    pub labeled: Vec<(Candle, ProximityLabel)>,
}

impl ReplayReport {
    pub fn summary(&self) -> String {
        format!(
            "{} candles ({} rejected) | entries: {} ({} refused) | exits: {} stop / {} take-profit",
            self.candles_processed,
            self.candles_rejected,
            self.entries,
            self.entries_refused,
            self.stop_loss_exits,
            self.take_profit_exits,
        )
    }
}

/// Replay `candles` through a new engine built from `config`
///
/// Disordered records are rejected and counted without stopping the run,
/// matching the live feed policy.
pub async fn replay(
    config: StrategyConfig,
    candles: Vec<Candle>,
) -> Result<(ReplayReport, StrategyEngine<SimulatedExecutor>)> {
    let mut engine = StrategyEngine::new(config, SimulatedExecutor::new())
        .context("invalid replay configuration")?;

    let mut labeled = Vec::with_capacity(candles.len());
    let mut rejected = 0u64;

    for candle in candles {
        engine.executor_mut().set_mark_price(candle.close);
        match engine.on_candle(candle.clone()).await {
            Ok(label) => labeled.push((candle, label)),
            Err(StrategyError::DataOrdering(reason)) => {
                warn!("replay dropped candle: {reason}");
                rejected += 1;
            }
            Err(e) => return Err(e).context("replay aborted"),
        }
    }

    let stats = engine.stats();
    let report = ReplayReport {
        candles_processed: stats.candles_processed,
        candles_rejected: rejected,
        entries: stats.entries,
        entries_refused: stats.entries_refused,
        stop_loss_exits: stats.stop_loss_exits,
        take_profit_exits: stats.take_profit_exits,
        labeled,
    };
    Ok((report, engine))
}

/// Replay a candle CSV and write the labeled rows and level export
pub async fn label_csv(
    config: StrategyConfig,
    input: &Path,
    labeled_out: &Path,
    levels_out: &Path,
) -> Result<ReplayReport> {
    let candles = data::load_candles_csv(input)?;
    info!("loaded {} candles from {}", candles.len(), input.display());

    let (report, engine) = replay(config, candles).await?;

    data::write_labeled_csv(labeled_out, &report.labeled)?;
    data::write_levels_csv(levels_out, &engine.current_levels())?;
    info!(
        "wrote {} labeled rows to {} and {} levels to {}",
        report.labeled.len(),
        labeled_out.display(),
        engine.current_levels().len(),
        levels_out.display()
    );
    Ok(report)
}
