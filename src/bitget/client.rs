//! Bitget API client
//!
//! HTTP client for the Bitget mix (USDT-M perpetual) API with HMAC-SHA256
//! request signing. Candle fetch is public; order placement, close and
//! leverage setup are signed.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use base64::Engine as _;
use chrono::{TimeZone, Utc};
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::de::DeserializeOwned;
use sha2::Sha256;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::models::{ApiResponse, OrderData, PlaceOrderRequest, SetLeverageRequest};
use crate::error::StrategyError;
use crate::execution::{Fill, OrderExecutor};
use crate::strategy::Candle;

type HmacSha256 = Hmac<Sha256>;

/// Production API base URL
pub const DEFAULT_BASE_URL: &str = "https://api.bitget.com";

const CANDLES_PATH: &str = "/api/mix/v1/market/candles";
const PLACE_ORDER_PATH: &str = "/api/mix/v1/order/placeOrder";
const SET_LEVERAGE_PATH: &str = "/api/mix/v1/account/setLeverage";

/// Bitget REST client for a USDT-M account
pub struct BitgetClient {
    client: Client,
    base_url: String,
    api_key: String,
    api_secret: String,
    passphrase: String,
}

impl BitgetClient {
    /// Create a client from environment variables
    ///
    /// Expects:
    /// - `BITGET_API_KEY`
    /// - `BITGET_SECRET_KEY`
    /// - `BITGET_PASSPHRASE`
    /// - `BITGET_BASE_URL` (optional) - defaults to production
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("BITGET_API_KEY")
            .context("BITGET_API_KEY environment variable not set")?;
        let api_secret = std::env::var("BITGET_SECRET_KEY")
            .context("BITGET_SECRET_KEY environment variable not set")?;
        let passphrase = std::env::var("BITGET_PASSPHRASE")
            .context("BITGET_PASSPHRASE environment variable not set")?;
        let base_url =
            std::env::var("BITGET_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());

        Ok(Self::new(api_key, api_secret, passphrase, base_url))
    }

    /// Create a client with explicit credentials
    pub fn new(api_key: String, api_secret: String, passphrase: String, base_url: String) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .expect("Failed to create HTTP client"),
            base_url,
            api_key,
            api_secret,
            passphrase,
        }
    }

    /// Convert a "BTC/USDT" style symbol to the mix API form "BTCUSDT_UMCBL"
    pub fn mix_symbol(symbol: &str) -> String {
        let compact: String = symbol
            .split(':')
            .next()
            .unwrap_or(symbol)
            .chars()
            .filter(|c| *c != '/')
            .collect();
        if compact.ends_with("_UMCBL") {
            compact
        } else {
            format!("{compact}_UMCBL")
        }
    }

    /// Fetch the most recent `limit` candles for the symbol
    ///
    /// `granularity_secs` is the candle duration (300 = 5m). Returned candles
    /// carry the engine-facing symbol, oldest first.
    pub async fn fetch_ohlcv(
        &self,
        symbol: &str,
        granularity_secs: u32,
        limit: usize,
    ) -> Result<Vec<Candle>> {
        let end = Utc::now().timestamp_millis();
        let start = end - (granularity_secs as i64) * 1000 * limit as i64;

        let url = format!("{}{}", self.base_url, CANDLES_PATH);
        let response = self
            .client
            .get(&url)
            .query(&[
                ("symbol", Self::mix_symbol(symbol)),
                ("granularity", granularity_secs.to_string()),
                ("startTime", start.to_string()),
                ("endTime", end.to_string()),
            ])
            .send()
            .await
            .context("Failed to send candle request")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("Candle request failed ({}): {}", status, body));
        }

        // Rows arrive as string arrays: [ts, open, high, low, close, baseVol, quoteVol]
        let raw: Vec<Vec<serde_json::Value>> = response
            .json()
            .await
            .context("Failed to parse candle response")?;

        let mut candles: Vec<Candle> = raw
            .into_iter()
            .filter_map(|row| {
                if row.len() < 6 {
                    return None;
                }
                let field = |i: usize| -> Option<f64> {
                    row.get(i).and_then(|v| match v {
                        serde_json::Value::String(s) => s.parse().ok(),
                        serde_json::Value::Number(n) => n.as_f64(),
                        _ => None,
                    })
                };
                let ts_ms = field(0)? as i64;
                Some(Candle {
                    timestamp: Utc.timestamp_millis_opt(ts_ms).single()?,
                    open: field(1)?,
                    high: field(2)?,
                    low: field(3)?,
                    close: field(4)?,
                    volume: field(5)?,
                    symbol: symbol.to_string(),
                })
            })
            .collect();

        candles.sort_by_key(|c| c.timestamp);
        debug!("fetched {} candles for {}", candles.len(), symbol);
        Ok(candles)
    }

    /// Sign `timestamp + METHOD + path + body` with the account secret
    fn sign(&self, timestamp: &str, method: &str, path: &str, body: &str) -> Result<String> {
        let message = format!("{timestamp}{method}{path}{body}");
        let mut mac = HmacSha256::new_from_slice(self.api_secret.as_bytes())
            .map_err(|e| anyhow!("failed to init signer: {e}"))?;
        mac.update(message.as_bytes());
        Ok(base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes()))
    }

    /// Make a signed POST request and unwrap the response envelope
    async fn signed_post<T: serde::Serialize, R: DeserializeOwned>(
        &self,
        path: &str,
        body: &T,
    ) -> Result<R> {
        let body_str = serde_json::to_string(body)?;
        let timestamp = Utc::now().timestamp_millis().to_string();
        let signature = self.sign(&timestamp, "POST", path, &body_str)?;

        let response = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .header("ACCESS-KEY", &self.api_key)
            .header("ACCESS-SIGN", signature)
            .header("ACCESS-TIMESTAMP", &timestamp)
            .header("ACCESS-PASSPHRASE", &self.passphrase)
            .header("Content-Type", "application/json")
            .header("X-LOCALE", "en-US")
            .body(body_str)
            .send()
            .await
            .with_context(|| format!("Failed to send request to {path}"))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("Request to {} failed ({}): {}", path, status, body));
        }

        let envelope: ApiResponse<R> = response
            .json()
            .await
            .with_context(|| format!("Failed to parse response from {path}"))?;

        if !envelope.is_success() {
            return Err(anyhow!(
                "Bitget rejected request to {}: {} (code {})",
                path,
                envelope.msg,
                envelope.code
            ));
        }
        envelope
            .data
            .ok_or_else(|| anyhow!("Bitget response from {} carried no data", path))
    }

    async fn place_market_order(&self, symbol: &str, size: f64, side: &str) -> Result<OrderData> {
        let request = PlaceOrderRequest {
            symbol: Self::mix_symbol(symbol),
            margin_coin: "USDT".to_string(),
            size: format!("{size}"),
            side: side.to_string(),
            order_type: "market".to_string(),
            client_oid: Some(Uuid::new_v4().to_string()),
        };

        info!("placing {} market order: {} {}", side, size, symbol);
        let order: OrderData = self.signed_post(PLACE_ORDER_PATH, &request).await?;
        info!("order accepted: {}", order.order_id);
        Ok(order)
    }

    /// Open a long of `size` base currency at market
    pub async fn open_long(&self, symbol: &str, size: f64) -> Result<OrderData> {
        self.place_market_order(symbol, size, "open_long").await
    }

    /// Close `size` of an open long at market
    pub async fn close_long(&self, symbol: &str, size: f64) -> Result<OrderData> {
        self.place_market_order(symbol, size, "close_long").await
    }

    /// Set account leverage for the symbol, retrying transient failures
    pub async fn set_leverage(&self, symbol: &str, leverage: u32) -> Result<()> {
        const MAX_RETRIES: u32 = 3;
        let request = SetLeverageRequest {
            symbol: Self::mix_symbol(symbol),
            margin_coin: "USDT".to_string(),
            leverage: leverage.to_string(),
        };

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self
                .signed_post::<_, serde_json::Value>(SET_LEVERAGE_PATH, &request)
                .await
            {
                Ok(_) => {
                    info!("leverage for {} set to {}x", symbol, leverage);
                    return Ok(());
                }
                Err(e) if attempt < MAX_RETRIES => {
                    warn!(
                        "set leverage attempt {}/{} failed: {e}",
                        attempt, MAX_RETRIES
                    );
                    tokio::time::sleep(Duration::from_secs(2)).await;
                }
                Err(e) => return Err(e.context("Failed to set leverage")),
            }
        }
    }
}

/// `OrderExecutor` adapter over the Bitget client
///
/// Market orders are assumed filled at the tick price that triggered them;
/// the mix placement endpoint does not return fill details synchronously.
pub struct BitgetExecutor {
    client: BitgetClient,
}

impl BitgetExecutor {
    pub fn new(client: BitgetClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl OrderExecutor for BitgetExecutor {
    async fn open_long(
        &mut self,
        symbol: &str,
        size: f64,
        price: f64,
    ) -> Result<Fill, StrategyError> {
        self.client
            .open_long(symbol, size)
            .await
            .map(|order| Fill {
                order_id: order.order_id,
                price,
                size,
            })
            .map_err(|e| StrategyError::Execution(format!("{e:#}")))
    }

    async fn close_long(&mut self, symbol: &str, size: f64) -> Result<Fill, StrategyError> {
        self.client
            .close_long(symbol, size)
            .await
            .map(|order| Fill {
                order_id: order.order_id,
                price: 0.0,
                size,
            })
            .map_err(|e| StrategyError::Execution(format!("{e:#}")))
    }
}
