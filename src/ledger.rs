//! Order ledger: placement, cancellation, and reconciliation
//!
//! The ledger is the only component that talks to the exchange about
//! orders. Every local write that pairs an order with its level goes
//! through a single [`StateStore::update`], so a crash can never leave an
//! order record without its level transition or vice versa. The gap that
//! remains - an exchange order placed right before a crash, with no local
//! record at all - is benign: the next tick's guards see the level as free
//! and the orphan is operator-visible on the venue.

use std::sync::Arc;

use log::{debug, info};

use crate::errors::{GridError, GridResult};
use crate::exchange::ExchangePort;
use crate::store::{BotState, StateStore};
use crate::types::{Order, OrderSide, OrderStatus};

#[derive(Clone)]
pub struct OrderLedger {
    store: Arc<StateStore>,
    exchange: Arc<dyn ExchangePort>,
}

impl OrderLedger {
    pub fn new(store: Arc<StateStore>, exchange: Arc<dyn ExchangePort>) -> Self {
        Self { store, exchange }
    }

    fn guard(state: &mut BotState, side: OrderSide, floor: i64) -> GridResult<bool> {
        match side {
            OrderSide::Buy => state.can_place_buy(floor),
            OrderSide::Sell => state.can_place_sell(floor),
        }
    }

    /// Place a resting limit order at a floor and record it together with
    /// the level transition in one atomic write.
    pub async fn place(&self, side: OrderSide, floor: i64, amount: f64) -> GridResult<Order> {
        let (symbol, price) = self
            .store
            .update(|state| {
                if !Self::guard(state, side, floor)? {
                    return Err(GridError::LevelUnavailable { floor, side });
                }
                let price = state.get_or_create_level(floor)?.price;
                Ok((state.bot.symbol.clone(), price))
            })
            .await?;

        let placed = self
            .exchange
            .place_order(&symbol, side, amount, price)
            .await?;

        let order = self
            .store
            .update(|state| {
                // Re-checked under the same lock as the write. Under the
                // per-bot single-flight tick this cannot fire; if it does,
                // the placed order is left as an exchange orphan and the
                // caller stops the bot.
                if !Self::guard(state, side, floor)? {
                    return Err(GridError::LevelUnavailable { floor, side });
                }
                let order = Order {
                    id: placed.id.clone(),
                    side,
                    status: OrderStatus::Open,
                    price: placed.price,
                    amount: placed.amount,
                    average: None,
                    cost: None,
                    timestamp: placed.timestamp,
                };
                state
                    .get_or_create_level(floor)?
                    .open_side(side, order.id.clone(), order.amount)?;
                state.orders.insert(order.id.clone(), order.clone());
                Ok(order)
            })
            .await?;

        info!(
            "bot {}: {side:?} {amount} resting at floor {floor} (order {})",
            self.store.read(|s| s.bot.id).await,
            order.id
        );
        Ok(order)
    }

    /// Reconcile local open orders against the exchange. Filled orders are
    /// closed (copying average/cost) and their level sides marked CLOSED;
    /// orders still open are untouched. Returns the number of fills.
    /// A no-op without any exchange call when nothing is open.
    pub async fn sync_open_orders(&self) -> GridResult<usize> {
        let (symbol, open_ids) = self
            .store
            .read(|state| {
                let ids: Vec<String> = state
                    .orders
                    .values()
                    .filter(|o| o.status == OrderStatus::Open)
                    .map(|o| o.id.clone())
                    .collect();
                (state.bot.symbol.clone(), ids)
            })
            .await;
        if open_ids.is_empty() {
            return Ok(0);
        }

        let updates = self.exchange.fetch_orders(&symbol, &open_ids).await?;

        let closed = self
            .store
            .update(|state| {
                let mut closed = 0usize;
                for update in &updates {
                    if update.status != OrderStatus::Closed {
                        continue;
                    }
                    match state.orders.get_mut(&update.id) {
                        Some(order) if order.status == OrderStatus::Open => {
                            order.status = OrderStatus::Closed;
                            order.average = update.average;
                            order.cost = update.cost;
                        }
                        _ => continue,
                    }
                    for level in state.levels.values_mut() {
                        if level.buy.is_open() && level.buy.holds_order(&update.id) {
                            level.close_side(OrderSide::Buy)?;
                            break;
                        }
                        if level.sell.is_open() && level.sell.holds_order(&update.id) {
                            level.close_side(OrderSide::Sell)?;
                            break;
                        }
                    }
                    closed += 1;
                }
                Ok(closed)
            })
            .await?;

        if closed > 0 {
            debug!("reconciled {closed} fill(s) out of {} open", open_ids.len());
        }
        Ok(closed)
    }

    /// Cancel a locally open order and release its level side
    pub async fn cancel(&self, order_id: &str) -> GridResult<Order> {
        let symbol = self
            .store
            .read(|state| match state.orders.get(order_id) {
                None => Err(GridError::OrderNotFound(order_id.to_string())),
                Some(o) if o.status != OrderStatus::Open => {
                    Err(GridError::OrderNotCancelable(order_id.to_string()))
                }
                Some(_) => Ok(state.bot.symbol.clone()),
            })
            .await?;

        self.exchange.cancel_order(&symbol, order_id).await?;

        self.store
            .update(|state| {
                let order = state
                    .orders
                    .get_mut(order_id)
                    .ok_or_else(|| GridError::OrderNotFound(order_id.to_string()))?;
                order.status = OrderStatus::Canceled;
                let order = order.clone();
                for level in state.levels.values_mut() {
                    let side = order.side;
                    if level.side(side).is_open() && level.side(side).holds_order(order_id) {
                        level.clear_side(side)?;
                        break;
                    }
                }
                Ok(order)
            })
            .await
    }

    /// Orders for this bot, optionally filtered, newest first
    pub async fn list(
        &self,
        side: Option<OrderSide>,
        status: Option<OrderStatus>,
    ) -> Vec<Order> {
        self.store
            .read(|state| {
                let mut orders: Vec<Order> = state
                    .orders
                    .values()
                    .filter(|o| side.map_or(true, |s| o.side == s))
                    .filter(|o| status.map_or(true, |s| o.status == s))
                    .cloned()
                    .collect();
                orders.sort_by_key(|o| std::cmp::Reverse(o.timestamp));
                orders
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::mock::MockExchange;
    use crate::store::testutil::test_store;
    use std::sync::atomic::Ordering;

    fn setup() -> (OrderLedger, Arc<StateStore>, Arc<MockExchange>) {
        let store = test_store();
        let exchange = Arc::new(MockExchange::new(1.0));
        let ledger = OrderLedger::new(store.clone(), exchange.clone());
        (ledger, store, exchange)
    }

    #[tokio::test]
    async fn test_place_writes_order_and_level_together() {
        let (ledger, store, exchange) = setup();

        let order = ledger.place(OrderSide::Buy, 3, 2.0).await.unwrap();
        assert_eq!(order.status, OrderStatus::Open);
        assert_eq!(order.amount, 2.0);

        store
            .read(|state| {
                let level = state.levels.get(&3).unwrap();
                assert!(level.buy.is_open());
                assert!(level.buy.holds_order(&order.id));
                assert!(state.orders.contains_key(&order.id));
            })
            .await;

        // the order went out at the level's ladder price
        let placed = exchange.placed.lock().await;
        assert!((placed[0].price - 1.03f64.powi(3)).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_place_rejected_by_guard() {
        let (ledger, _, exchange) = setup();
        ledger.place(OrderSide::Buy, 3, 1.0).await.unwrap();

        let err = ledger.place(OrderSide::Buy, 3, 1.0).await.unwrap_err();
        assert!(matches!(err, GridError::LevelUnavailable { floor: 3, .. }));
        // the guard fired before the wire call
        assert_eq!(exchange.placed.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn test_sync_marks_fills_and_levels() {
        let (ledger, store, exchange) = setup();
        let order = ledger.place(OrderSide::Buy, 2, 1.5).await.unwrap();

        assert_eq!(ledger.sync_open_orders().await.unwrap(), 0);

        exchange.fill_order(&order.id, 1.06).await;
        assert_eq!(ledger.sync_open_orders().await.unwrap(), 1);

        store
            .read(|state| {
                let stored = state.orders.get(&order.id).unwrap();
                assert_eq!(stored.status, OrderStatus::Closed);
                assert_eq!(stored.average, Some(1.06));
                assert_eq!(stored.cost, Some(1.06 * 1.5));
                assert!(state.levels.get(&2).unwrap().buy.is_closed());
            })
            .await;

        // already-closed orders are not re-reported as open work
        assert_eq!(ledger.sync_open_orders().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_sync_with_no_open_orders_skips_the_exchange() {
        let (ledger, _, exchange) = setup();
        assert_eq!(ledger.sync_open_orders().await.unwrap(), 0);
        assert_eq!(exchange.fetch_orders_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_cancel_clears_level_side() {
        let (ledger, store, exchange) = setup();
        let order = ledger.place(OrderSide::Buy, 4, 1.0).await.unwrap();

        let canceled = ledger.cancel(&order.id).await.unwrap();
        assert_eq!(canceled.status, OrderStatus::Canceled);
        assert_eq!(exchange.canceled.lock().await.as_slice(), &[order.id.clone()]);

        store
            .read(|state| {
                assert!(state.levels.get(&4).unwrap().buy.is_none());
            })
            .await;
        // the floor is free again
        assert!(ledger.place(OrderSide::Buy, 4, 1.0).await.is_ok());
    }

    #[tokio::test]
    async fn test_cancel_requires_open() {
        let (ledger, _, exchange) = setup();
        assert!(matches!(
            ledger.cancel("nope").await,
            Err(GridError::OrderNotFound(_))
        ));

        let order = ledger.place(OrderSide::Sell, 1, 1.0).await.unwrap();
        exchange.fill_order(&order.id, 1.03).await;
        ledger.sync_open_orders().await.unwrap();
        assert!(matches!(
            ledger.cancel(&order.id).await,
            Err(GridError::OrderNotCancelable(_))
        ));
    }

    #[tokio::test]
    async fn test_list_filters() {
        let (ledger, _, exchange) = setup();
        let buy = ledger.place(OrderSide::Buy, 0, 1.0).await.unwrap();
        ledger.place(OrderSide::Sell, 1, 1.0).await.unwrap();
        exchange.fill_order(&buy.id, 1.0).await;
        ledger.sync_open_orders().await.unwrap();

        assert_eq!(ledger.list(None, None).await.len(), 2);
        assert_eq!(ledger.list(Some(OrderSide::Buy), None).await.len(), 1);
        assert_eq!(
            ledger.list(None, Some(OrderStatus::Closed)).await.len(),
            1
        );
        assert_eq!(
            ledger
                .list(Some(OrderSide::Sell), Some(OrderStatus::Closed))
                .await
                .len(),
            0
        );
    }
}
