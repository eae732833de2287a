//! Exchange boundary: the abstract port the core trades through
//!
//! Three interchangeable implementations satisfy [`ExchangePort`]:
//!
//! - [`live::RestExchange`] - real venue over HTTP
//! - [`simulated::SimulatedExchange`] - live market data, local fills
//!   against the top of book
//! - [`replay::ReplayExchange`] - deterministic fills against a
//!   pre-recorded price series, for reproducible backtests
//!
//! The core never depends on which one it is given; [`mock::MockExchange`]
//! adds a fourth, fully scriptable implementation for tests.

use async_trait::async_trait;

use crate::errors::GridResult;
use crate::types::{ExchangeOrder, OrderSide, OrderUpdate, Ticker};

mod paper;

pub mod live;
pub mod replay;
pub mod simulated;

pub use live::RestExchange;
pub use replay::ReplayExchange;
pub use simulated::{MarketFeed, SimulatedExchange};

/// Abstract exchange contract
#[async_trait]
pub trait ExchangePort: Send + Sync {
    /// Current ticker for a symbol
    async fn fetch_ticker(&self, symbol: &str) -> GridResult<Ticker>;

    /// Reconciliation reports for the given order ids. Orders the exchange
    /// still holds open are reported as open; filled orders carry their
    /// average fill price and total cost.
    async fn fetch_orders(&self, symbol: &str, ids: &[String]) -> GridResult<Vec<OrderUpdate>>;

    /// Place a resting limit order. Fails with
    /// [`crate::errors::GridError::ExchangeRejected`] on venue-side
    /// rejection.
    async fn place_order(
        &self,
        symbol: &str,
        side: OrderSide,
        amount: f64,
        price: f64,
    ) -> GridResult<ExchangeOrder>;

    /// Cancel a resting order. Fails with
    /// [`crate::errors::GridError::OrderNotCancelable`] if it already
    /// filled.
    async fn cancel_order(&self, symbol: &str, id: &str) -> GridResult<()>;
}

/// Mock exchange for driving the core in tests without any market.
pub mod mock {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::Duration;

    use tokio::sync::Mutex;

    use super::*;
    use crate::errors::GridError;
    use crate::types::OrderStatus;

    #[derive(Debug, Clone)]
    pub struct PlacedOrder {
        pub id: String,
        pub side: OrderSide,
        pub price: f64,
        pub amount: f64,
    }

    /// Scriptable exchange: fixed ticker, explicit fills, optional
    /// failures and a per-placement delay for concurrency tests.
    pub struct MockExchange {
        pub last_price: Mutex<f64>,
        pub placed: Mutex<Vec<PlacedOrder>>,
        pub canceled: Mutex<Vec<String>>,
        filled: Mutex<HashMap<String, f64>>,
        next_id: AtomicU64,
        pub fail_ticker: Mutex<bool>,
        pub fail_place: Mutex<bool>,
        pub place_delay: Mutex<Option<Duration>>,
        pub fetch_orders_calls: AtomicU64,
    }

    impl MockExchange {
        pub fn new(last_price: f64) -> Self {
            Self {
                last_price: Mutex::new(last_price),
                placed: Mutex::new(Vec::new()),
                canceled: Mutex::new(Vec::new()),
                filled: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                fail_ticker: Mutex::new(false),
                fail_place: Mutex::new(false),
                place_delay: Mutex::new(None),
                fetch_orders_calls: AtomicU64::new(0),
            }
        }

        pub async fn set_last_price(&self, price: f64) {
            *self.last_price.lock().await = price;
        }

        /// Script an order to be reported filled at the given average
        pub async fn fill_order(&self, id: &str, average: f64) {
            self.filled.lock().await.insert(id.to_string(), average);
        }

        pub async fn set_fail_ticker(&self, fail: bool) {
            *self.fail_ticker.lock().await = fail;
        }

        pub async fn set_fail_place(&self, fail: bool) {
            *self.fail_place.lock().await = fail;
        }

        pub async fn set_place_delay(&self, delay: Option<Duration>) {
            *self.place_delay.lock().await = delay;
        }

        /// Ids of every order placed so far, in placement order
        pub async fn placed_ids(&self) -> Vec<String> {
            self.placed.lock().await.iter().map(|o| o.id.clone()).collect()
        }
    }

    #[async_trait]
    impl ExchangePort for MockExchange {
        async fn fetch_ticker(&self, _symbol: &str) -> GridResult<Ticker> {
            if *self.fail_ticker.lock().await {
                return Err(GridError::Transport("mock ticker failure".into()));
            }
            Ok(Ticker::new(*self.last_price.lock().await))
        }

        async fn fetch_orders(
            &self,
            _symbol: &str,
            ids: &[String],
        ) -> GridResult<Vec<OrderUpdate>> {
            self.fetch_orders_calls.fetch_add(1, Ordering::SeqCst);
            let filled = self.filled.lock().await;
            let placed = self.placed.lock().await;
            Ok(ids
                .iter()
                .map(|id| match filled.get(id) {
                    Some(&average) => {
                        let amount = placed
                            .iter()
                            .find(|o| &o.id == id)
                            .map(|o| o.amount)
                            .unwrap_or(0.0);
                        OrderUpdate {
                            id: id.clone(),
                            status: OrderStatus::Closed,
                            average: Some(average),
                            cost: Some(average * amount),
                        }
                    }
                    None => OrderUpdate {
                        id: id.clone(),
                        status: OrderStatus::Open,
                        average: None,
                        cost: None,
                    },
                })
                .collect())
        }

        async fn place_order(
            &self,
            _symbol: &str,
            side: OrderSide,
            amount: f64,
            price: f64,
        ) -> GridResult<ExchangeOrder> {
            if *self.fail_place.lock().await {
                return Err(GridError::ExchangeRejected("mock rejection".into()));
            }
            if let Some(delay) = *self.place_delay.lock().await {
                tokio::time::sleep(delay).await;
            }
            let id = format!("mock-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
            self.placed.lock().await.push(PlacedOrder {
                id: id.clone(),
                side,
                price,
                amount,
            });
            Ok(ExchangeOrder {
                id,
                timestamp: chrono::Utc::now().timestamp_millis(),
                price,
                amount,
                cost: None,
                average: None,
            })
        }

        async fn cancel_order(&self, _symbol: &str, id: &str) -> GridResult<()> {
            if self.filled.lock().await.contains_key(id) {
                return Err(GridError::OrderNotCancelable(id.to_string()));
            }
            self.canceled.lock().await.push(id.to_string());
            Ok(())
        }
    }
}
