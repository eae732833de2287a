//! Simulated exchange: real market data, local fills
//!
//! Tickers come from a live [`MarketFeed`]; orders never reach the venue.
//! Reconciliation fills a resting order all-or-nothing the first time the
//! top of book touches its limit price, which mirrors what the venue would
//! have done for a small resting order.

use std::sync::Arc;

use async_trait::async_trait;
use log::debug;

use super::paper::PaperBook;
use super::ExchangePort;
use crate::errors::GridResult;
use crate::types::{ExchangeOrder, OrderSide, OrderUpdate, Ticker};

/// Market-data-only view of an exchange
#[async_trait]
pub trait MarketFeed: Send + Sync {
    async fn ticker(&self, symbol: &str) -> GridResult<Ticker>;
}

/// Every full exchange adapter can serve as a market feed
#[async_trait]
impl<E: ExchangePort> MarketFeed for E {
    async fn ticker(&self, symbol: &str) -> GridResult<Ticker> {
        self.fetch_ticker(symbol).await
    }
}

pub struct SimulatedExchange {
    feed: Arc<dyn MarketFeed>,
    book: PaperBook,
}

impl SimulatedExchange {
    pub fn new(feed: Arc<dyn MarketFeed>) -> Self {
        Self {
            feed,
            book: PaperBook::new(),
        }
    }
}

#[async_trait]
impl ExchangePort for SimulatedExchange {
    async fn fetch_ticker(&self, symbol: &str) -> GridResult<Ticker> {
        self.feed.ticker(symbol).await
    }

    async fn fetch_orders(&self, symbol: &str, ids: &[String]) -> GridResult<Vec<OrderUpdate>> {
        let quote = self.feed.ticker(symbol).await?;
        Ok(self.book.settle(ids, quote).await)
    }

    async fn place_order(
        &self,
        symbol: &str,
        side: OrderSide,
        amount: f64,
        price: f64,
    ) -> GridResult<ExchangeOrder> {
        let order = self.book.place(side, amount, price).await?;
        debug!(
            "simulated {symbol}: accepted {side:?} {amount} @ {price} as {}",
            order.id
        );
        Ok(order)
    }

    async fn cancel_order(&self, _symbol: &str, id: &str) -> GridResult<()> {
        self.book.cancel(id).await
    }
}
