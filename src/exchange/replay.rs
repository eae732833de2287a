//! Replay exchange: deterministic fills against a pre-recorded price series
//!
//! Each `fetch_ticker` call consumes the next price, so a backtest that
//! ticks through the series is exactly reproducible. When the series runs
//! out the adapter fails with `ReplayExhausted`, which the fail-fast tick
//! policy turns into a clean bot stop.

use std::path::Path;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::paper::PaperBook;
use super::ExchangePort;
use crate::errors::{GridError, GridResult};
use crate::types::{ExchangeOrder, OrderSide, OrderUpdate, Ticker};

pub struct ReplayExchange {
    prices: Vec<f64>,
    cursor: Mutex<usize>,
    book: PaperBook,
}

impl ReplayExchange {
    pub fn new(prices: Vec<f64>) -> Self {
        Self {
            prices,
            cursor: Mutex::new(0),
            book: PaperBook::new(),
        }
    }

    /// Load a series from a text file, one price per line. Blank lines and
    /// `#` comments are skipped.
    pub fn from_file(path: impl AsRef<Path>) -> GridResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut prices = Vec::new();
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let price: f64 = line.parse().map_err(|_| {
                GridError::InvalidConfig(format!("bad price in replay series: {line:?}"))
            })?;
            prices.push(price);
        }
        Ok(Self::new(prices))
    }

    /// Price at the current cursor, if the series is not exhausted
    async fn current_price(&self) -> GridResult<f64> {
        let cursor = self.cursor.lock().await;
        match cursor.checked_sub(1).and_then(|i| self.prices.get(i)) {
            Some(&price) => Ok(price),
            None => self
                .prices
                .first()
                .copied()
                .ok_or(GridError::ReplayExhausted),
        }
    }
}

#[async_trait]
impl ExchangePort for ReplayExchange {
    /// Advances the series by one price
    async fn fetch_ticker(&self, _symbol: &str) -> GridResult<Ticker> {
        let mut cursor = self.cursor.lock().await;
        let Some(&price) = self.prices.get(*cursor) else {
            return Err(GridError::ReplayExhausted);
        };
        *cursor += 1;
        Ok(Ticker::new(price))
    }

    /// Fills against the most recently replayed price without advancing
    async fn fetch_orders(&self, _symbol: &str, ids: &[String]) -> GridResult<Vec<OrderUpdate>> {
        let price = self.current_price().await?;
        Ok(self.book.settle(ids, Ticker::new(price)).await)
    }

    async fn place_order(
        &self,
        _symbol: &str,
        side: OrderSide,
        amount: f64,
        price: f64,
    ) -> GridResult<ExchangeOrder> {
        self.book.place(side, amount, price).await
    }

    async fn cancel_order(&self, _symbol: &str, id: &str) -> GridResult<()> {
        self.book.cancel(id).await
    }
}
