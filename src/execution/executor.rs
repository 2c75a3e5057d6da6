//! The order execution seam between strategy and exchange

use async_trait::async_trait;

use crate::error::StrategyError;

/// A confirmed fill returned by the exchange
#[derive(Debug, Clone)]
pub struct Fill {
    pub order_id: String,
    pub price: f64,
    pub size: f64,
}

/// Synchronous-at-transition order placement
///
/// A failed call means the transition was not taken: the caller must leave
/// its position state untouched and surface the error.
#[async_trait]
pub trait OrderExecutor: Send {
    async fn open_long(
        &mut self,
        symbol: &str,
        size: f64,
        price: f64,
    ) -> Result<Fill, StrategyError>;

    async fn close_long(&mut self, symbol: &str, size: f64) -> Result<Fill, StrategyError>;
}

/// Fills every order at the requested price; used by replay and tests
#[derive(Debug, Default)]
pub struct SimulatedExecutor {
    pub opens: Vec<Fill>,
    pub closes: Vec<Fill>,
    /// When set, the next call fails and the flag clears
    pub fail_next: bool,
    next_id: u64,
    last_price: f64,
}

impl SimulatedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Price the next close fills at; replay sets this to the current candle
    pub fn set_mark_price(&mut self, price: f64) {
        self.last_price = price;
    }

    fn next_fill(&mut self, price: f64, size: f64) -> Fill {
        self.next_id += 1;
        Fill {
            order_id: format!("sim-{}", self.next_id),
            price,
            size,
        }
    }

    fn take_failure(&mut self) -> Result<(), StrategyError> {
        if self.fail_next {
            self.fail_next = false;
            return Err(StrategyError::Execution(
                "simulated order rejection".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl OrderExecutor for SimulatedExecutor {
    async fn open_long(
        &mut self,
        _symbol: &str,
        size: f64,
        price: f64,
    ) -> Result<Fill, StrategyError> {
        self.take_failure()?;
        self.last_price = price;
        let fill = self.next_fill(price, size);
        self.opens.push(fill.clone());
        Ok(fill)
    }

    async fn close_long(&mut self, _symbol: &str, size: f64) -> Result<Fill, StrategyError> {
        self.take_failure()?;
        let price = self.last_price;
        let fill = self.next_fill(price, size);
        self.closes.push(fill.clone());
        Ok(fill)
    }
}
