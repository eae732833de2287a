//! Shared local order book for the simulated and replay exchanges
//!
//! Orders are accepted and held locally; reconciliation fills them
//! all-or-nothing when the quoted book touches their limit price. The fill
//! average is the touched book price, which is at least as good as the
//! limit.

use std::collections::HashMap;

use tokio::sync::Mutex;
use uuid::Uuid;

use crate::errors::{GridError, GridResult};
use crate::types::{ExchangeOrder, OrderSide, OrderStatus, OrderUpdate, Ticker};

#[derive(Debug, Clone)]
struct PaperOrder {
    side: OrderSide,
    price: f64,
    amount: f64,
    status: OrderStatus,
    average: Option<f64>,
    cost: Option<f64>,
}

#[derive(Default)]
pub(super) struct PaperBook {
    orders: Mutex<HashMap<String, PaperOrder>>,
}

impl PaperBook {
    pub(super) fn new() -> Self {
        Self::default()
    }

    pub(super) async fn place(
        &self,
        side: OrderSide,
        amount: f64,
        price: f64,
    ) -> GridResult<ExchangeOrder> {
        if !(amount > 0.0) || !(price > 0.0) {
            return Err(GridError::ExchangeRejected(format!(
                "non-positive order: amount={amount} price={price}"
            )));
        }
        let id = Uuid::new_v4().to_string();
        self.orders.lock().await.insert(
            id.clone(),
            PaperOrder {
                side,
                price,
                amount,
                status: OrderStatus::Open,
                average: None,
                cost: None,
            },
        );
        Ok(ExchangeOrder {
            id,
            timestamp: chrono::Utc::now().timestamp_millis(),
            price,
            amount,
            cost: None,
            average: None,
        })
    }

    pub(super) async fn cancel(&self, id: &str) -> GridResult<()> {
        let mut orders = self.orders.lock().await;
        let order = orders
            .get_mut(id)
            .ok_or_else(|| GridError::OrderNotFound(id.to_string()))?;
        if order.status != OrderStatus::Open {
            return Err(GridError::OrderNotCancelable(id.to_string()));
        }
        order.status = OrderStatus::Canceled;
        Ok(())
    }

    /// Settle open orders against the current quote and report the
    /// requested ids. A buy fills when the best ask is at or below its
    /// limit; a sell fills when the best bid is at or above it.
    pub(super) async fn settle(&self, ids: &[String], quote: Ticker) -> Vec<OrderUpdate> {
        let mut orders = self.orders.lock().await;
        let mut updates = Vec::with_capacity(ids.len());
        for id in ids {
            let Some(order) = orders.get_mut(id) else {
                continue;
            };
            if order.status == OrderStatus::Open {
                let touched = match order.side {
                    OrderSide::Buy if quote.best_ask() <= order.price => Some(quote.best_ask()),
                    OrderSide::Sell if quote.best_bid() >= order.price => Some(quote.best_bid()),
                    _ => None,
                };
                if let Some(average) = touched {
                    order.status = OrderStatus::Closed;
                    order.average = Some(average);
                    order.cost = Some(average * order.amount);
                }
            }
            updates.push(OrderUpdate {
                id: id.clone(),
                status: order.status,
                average: order.average,
                cost: order.cost,
            });
        }
        updates
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_buy_fills_when_ask_touches_limit() {
        let book = PaperBook::new();
        let placed = book.place(OrderSide::Buy, 2.0, 100.0).await.unwrap();

        // ask above the limit: still open
        let updates = book
            .settle(&[placed.id.clone()], Ticker::new(101.0))
            .await;
        assert_eq!(updates[0].status, OrderStatus::Open);

        // ask at 99.5: filled at the touched price
        let updates = book.settle(&[placed.id.clone()], Ticker::new(99.5)).await;
        assert_eq!(updates[0].status, OrderStatus::Closed);
        assert_eq!(updates[0].average, Some(99.5));
        assert_eq!(updates[0].cost, Some(199.0));

        // fill fields are written once; a later settle re-reports them
        let updates = book.settle(&[placed.id], Ticker::new(50.0)).await;
        assert_eq!(updates[0].average, Some(99.5));
    }

    #[tokio::test]
    async fn test_sell_fills_when_bid_touches_limit() {
        let book = PaperBook::new();
        let placed = book.place(OrderSide::Sell, 1.0, 100.0).await.unwrap();

        let updates = book.settle(&[placed.id.clone()], Ticker::new(99.0)).await;
        assert_eq!(updates[0].status, OrderStatus::Open);

        let updates = book.settle(&[placed.id], Ticker::new(102.0)).await;
        assert_eq!(updates[0].status, OrderStatus::Closed);
        assert_eq!(updates[0].average, Some(102.0));
    }

    #[tokio::test]
    async fn test_cancel_rules() {
        let book = PaperBook::new();
        let placed = book.place(OrderSide::Buy, 1.0, 100.0).await.unwrap();
        book.cancel(&placed.id).await.unwrap();
        assert!(matches!(
            book.cancel(&placed.id).await,
            Err(GridError::OrderNotCancelable(_))
        ));

        let filled = book.place(OrderSide::Buy, 1.0, 100.0).await.unwrap();
        book.settle(&[filled.id.clone()], Ticker::new(90.0)).await;
        assert!(matches!(
            book.cancel(&filled.id).await,
            Err(GridError::OrderNotCancelable(_))
        ));
    }

    #[tokio::test]
    async fn test_rejects_non_positive_orders() {
        let book = PaperBook::new();
        assert!(matches!(
            book.place(OrderSide::Buy, 0.0, 100.0).await,
            Err(GridError::ExchangeRejected(_))
        ));
        assert!(matches!(
            book.place(OrderSide::Buy, 1.0, -1.0).await,
            Err(GridError::ExchangeRejected(_))
        ));
    }
}
