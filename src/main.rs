use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use tokio::time::{interval, sleep, Duration, MissedTickBehavior};
use tracing::{debug, info, warn};

use lhl_trader::backtest;
use lhl_trader::bitget::{BitgetClient, BitgetExecutor};
use lhl_trader::config::{PriceBand, ShutdownPolicy, StrategyConfig};
use lhl_trader::data;
use lhl_trader::error::StrategyError;
use lhl_trader::strategy::{LevelKind, ProximityLabel, StrategyEngine};

#[derive(Parser, Debug)]
#[command(name = "lhl-trader")]
#[command(about = "Support/resistance signal bot with LHL trade management for Bitget perpetuals")]
struct Args {
    #[command(subcommand)]
    command: Commands,

    /// Print verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the live signal bot against Bitget
    Live {
        /// Symbol to trade (e.g. "BTC/USDT")
        #[arg(short, long, env = "SYMBOL", default_value = "BTC/USDT")]
        symbol: String,

        /// Candle duration in seconds (300 = 5m)
        #[arg(long, default_value = "300")]
        granularity: u32,

        /// Seconds between candle polls
        #[arg(long, default_value = "30")]
        poll_secs: u64,

        /// Candle CSV to seed the window from instead of a bulk fetch
        #[arg(long)]
        history: Option<PathBuf>,

        /// Margin per trade in USDT
        #[arg(long, env = "TRADE_MARGIN_USDT", default_value = "10.0")]
        margin: f64,

        /// Leverage applied to the margin
        #[arg(long, env = "LEVERAGE", default_value = "10")]
        leverage: u32,

        /// Loss in USDT at which the stop-loss price sits
        #[arg(long, default_value = "1.5")]
        stop_loss_usdt: f64,

        /// Trailing take-profit distance as a fraction of the peak
        #[arg(long, default_value = "0.05")]
        take_profit_pct: f64,

        /// Level merge band as a fraction of price
        #[arg(long, env = "SR_PRICE_TOLERANCE_PERCENT", default_value = "0.005")]
        tolerance_pct: f64,

        /// Entry proximity above support as a fraction of price
        #[arg(long, env = "ENTRY_PROXIMITY_PERCENT", default_value = "0.005")]
        entry_proximity_pct: f64,

        /// Swing neighborhood half-width in candles
        #[arg(long, default_value = "10")]
        half_width: usize,

        /// What to do with an open position on shutdown
        #[arg(long, value_enum, default_value = "flatten")]
        shutdown: ShutdownPolicy,

        /// Position state file for persist/resume
        #[arg(long, default_value = "position_state.json")]
        state_file: PathBuf,

        /// Level export path, refreshed after each poll
        #[arg(long, default_value = "sr_levels.csv")]
        levels_out: PathBuf,
    },

    /// Label a candle CSV and export the level tiers
    Label {
        /// Input candle CSV (Time,Open,High,Low,Close,Volume,Symbol)
        #[arg(short, long)]
        input: PathBuf,

        /// Labeled output CSV
        #[arg(short, long, default_value = "labeled.csv")]
        output: PathBuf,

        /// Level export path
        #[arg(long, default_value = "sr_levels.csv")]
        levels: PathBuf,

        /// Symbol the input belongs to
        #[arg(short, long, default_value = "BTC/USDT")]
        symbol: String,

        /// Level merge band as a fraction of price
        #[arg(long, default_value = "0.005")]
        tolerance_pct: f64,

        /// Swing neighborhood half-width in candles
        #[arg(long, default_value = "10")]
        half_width: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("lhl_trader={default_level}").parse().unwrap()),
        )
        .init();

    match args.command {
        Commands::Live {
            symbol,
            granularity,
            poll_secs,
            history,
            margin,
            leverage,
            stop_loss_usdt,
            take_profit_pct,
            tolerance_pct,
            entry_proximity_pct,
            half_width,
            shutdown,
            state_file,
            levels_out,
        } => {
            let config = StrategyConfig {
                symbol,
                swing_half_width: half_width,
                proximity_band: PriceBand::Percent(tolerance_pct),
                touch_tolerance: PriceBand::Percent(tolerance_pct / 2.0),
                entry_proximity: PriceBand::Percent(entry_proximity_pct),
                lhl_low_tolerance: PriceBand::Percent(tolerance_pct),
                trade_margin_usdt: margin,
                leverage,
                stop_loss_usdt,
                take_profit_pct,
                shutdown,
                ..Default::default()
            };
            run_live(config, granularity, poll_secs, history, state_file, levels_out).await
        }
        Commands::Label {
            input,
            output,
            levels,
            symbol,
            tolerance_pct,
            half_width,
        } => {
            let config = StrategyConfig {
                symbol,
                swing_half_width: half_width,
                proximity_band: PriceBand::Percent(tolerance_pct),
                touch_tolerance: PriceBand::Percent(tolerance_pct / 2.0),
                lhl_low_tolerance: PriceBand::Percent(tolerance_pct),
                ..Default::default()
            };
            let report = backtest::label_csv(config, &input, &output, &levels).await?;
            println!("{}", report.summary());
            Ok(())
        }
    }
}

async fn run_live(
    config: StrategyConfig,
    granularity: u32,
    poll_secs: u64,
    history: Option<PathBuf>,
    state_file: PathBuf,
    levels_out: PathBuf,
) -> Result<()> {
    info!("Starting LHL trading bot for {}", config.symbol);

    let client = BitgetClient::from_env()?;
    client.set_leverage(&config.symbol, config.leverage).await?;

    let symbol = config.symbol.clone();
    let window = config.window_capacity;
    let mut engine = StrategyEngine::new(config, BitgetExecutor::new(BitgetClient::from_env()?))?;

    // Seed the window: CSV history if provided, bulk fetch otherwise
    let seed = match history {
        Some(path) => {
            info!("seeding from {}", path.display());
            data::load_candles_csv(&path)?
        }
        None => fetch_with_retry(&client, &symbol, granularity, window).await?,
    };
    engine.seed_history(seed);
    engine.resume(&state_file)?;

    let mut ticker = interval(Duration::from_secs(poll_secs));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut prev_s1: Option<f64> = None;
    let mut prev_r1: Option<f64> = None;

    info!("entering main loop, polling every {poll_secs}s");
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown requested");
                break;
            }
            _ = ticker.tick() => {
                let latest = match fetch_with_retry(&client, &symbol, granularity, 2).await {
                    Ok(candles) => candles,
                    Err(e) => {
                        warn!("candle fetch failed, waiting for next cycle: {e:#}");
                        continue;
                    }
                };

                let mut label = ProximityLabel::No;
                for candle in latest {
                    match engine.on_candle(candle).await {
                        Ok(l) => label = l,
                        // Overlapping polls re-deliver known candles; drop them
                        Err(StrategyError::DataOrdering(reason)) => {
                            debug!("candle dropped: {reason}");
                        }
                        Err(e) => warn!("candle processing failed: {e}"),
                    }
                }

                report_cycle(&engine, label, &mut prev_s1, &mut prev_r1);
                if let Err(e) = data::write_levels_csv(&levels_out, &engine.current_levels()) {
                    warn!("level export failed: {e:#}");
                }
            }
        }
    }

    engine.shutdown(&state_file).await?;
    info!("bot stopped");
    Ok(())
}

/// Log price/position/level state, flagging S1/R1 transitions
fn report_cycle(
    engine: &StrategyEngine<BitgetExecutor>,
    label: ProximityLabel,
    prev_s1: &mut Option<f64>,
    prev_r1: &mut Option<f64>,
) {
    let levels = engine.current_levels();
    let s1 = levels
        .iter()
        .find(|l| l.tier == 1 && l.kind == LevelKind::Support)
        .map(|l| l.price);
    let r1 = levels
        .iter()
        .find(|l| l.tier == 1 && l.kind == LevelKind::Resistance)
        .map(|l| l.price);

    let state = engine.current_state();
    let price = engine.last_price().unwrap_or(0.0);

    if s1 != *prev_s1 || r1 != *prev_r1 {
        info!(
            "S/R UPDATE - price: {:.4} | label: {} | state: {} | S1: {:?} -> {:?} | R1: {:?} -> {:?}",
            price, label, state.state, prev_s1, s1, prev_r1, r1
        );
        *prev_s1 = s1;
        *prev_r1 = r1;
    } else {
        info!(
            "price: {:.4} | label: {} | state: {} | S1: {:?} | R1: {:?}",
            price, label, state.state, s1, r1
        );
    }
}

/// Fetch candles with bounded retries
async fn fetch_with_retry(
    client: &BitgetClient,
    symbol: &str,
    granularity: u32,
    limit: usize,
) -> Result<Vec<lhl_trader::Candle>> {
    const RETRIES: u32 = 3;
    let mut attempt = 0;
    loop {
        attempt += 1;
        match client.fetch_ohlcv(symbol, granularity, limit).await {
            Ok(candles) if !candles.is_empty() => return Ok(candles),
            Ok(_) => warn!("fetch attempt {attempt} returned no candles"),
            Err(e) => warn!("fetch attempt {attempt} failed: {e:#}"),
        }
        if attempt >= RETRIES {
            bail!("candle fetch failed after {RETRIES} attempts");
        }
        sleep(Duration::from_secs(2)).await;
    }
}
