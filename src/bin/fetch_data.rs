//! Candle fetcher - downloads OHLCV history to CSV
//!
//! Standalone tool for producing the candle CSV the bot and the labeling
//! replay consume.

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing::info;

use lhl_trader::bitget::BitgetClient;
use lhl_trader::data;

#[derive(Parser, Debug)]
#[command(name = "fetch-data")]
#[command(about = "Fetch OHLCV candles from Bitget into a CSV file")]
struct Args {
    /// Output CSV file path
    #[arg(short, long)]
    output: PathBuf,

    /// Trading symbol
    #[arg(short, long, default_value = "BTC/USDT")]
    symbol: String,

    /// Candle duration in seconds (300 = 5m)
    #[arg(long, default_value = "300")]
    granularity: u32,

    /// Number of candles to fetch
    #[arg(short, long, default_value = "1000")]
    limit: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lhl_trader=info".parse().unwrap()),
        )
        .init();

    let args = Args::parse();
    info!(
        "fetching {} candles for {} ({}s granularity)",
        args.limit, args.symbol, args.granularity
    );

    // Candle fetch is a public endpoint; credentials are not required here
    let client = BitgetClient::new(
        std::env::var("BITGET_API_KEY").unwrap_or_default(),
        std::env::var("BITGET_SECRET_KEY").unwrap_or_default(),
        std::env::var("BITGET_PASSPHRASE").unwrap_or_default(),
        std::env::var("BITGET_BASE_URL")
            .unwrap_or_else(|_| lhl_trader::bitget::DEFAULT_BASE_URL.to_string()),
    );

    let candles = client
        .fetch_ohlcv(&args.symbol, args.granularity, args.limit)
        .await?;
    if candles.is_empty() {
        anyhow::bail!("no candles returned for {}", args.symbol);
    }

    data::write_candles_csv(&args.output, &candles)?;
    info!("wrote {} candles to {}", candles.len(), args.output.display());
    if let Some(last) = candles.last() {
        info!("most recent candle: {} close {}", last.timestamp, last.close);
    }
    Ok(())
}
