//! Level store: per-bot rung state and guard predicates
//!
//! Thin async facade over the shared [`StateStore`]. All transitions funnel
//! through [`crate::types::Level`], which enforces the per-side state
//! machine; this module adds the cross-level buy guard and the queries the
//! tick loop needs.

use std::sync::Arc;

use crate::errors::GridResult;
use crate::store::StateStore;
use crate::types::{Level, OrderSide};

#[derive(Clone)]
pub struct LevelStore {
    store: Arc<StateStore>,
}

impl LevelStore {
    pub fn new(store: Arc<StateStore>) -> Self {
        Self { store }
    }

    /// Fetch (and lazily create) the level at a floor
    pub async fn get_or_create(&self, floor: i64) -> GridResult<Level> {
        self.store
            .update(|state| Ok(state.get_or_create_level(floor)?.clone()))
            .await
    }

    /// True iff a buy may rest at this floor: its buy side is NONE and the
    /// sell side one rung above is not OPEN. A resting buy must never
    /// coexist with capital already committed to an open sell above it.
    pub async fn can_place_buy(&self, floor: i64) -> GridResult<bool> {
        self.store.update(|state| state.can_place_buy(floor)).await
    }

    /// True iff a sell may rest at this floor (its sell side is NONE)
    pub async fn can_place_sell(&self, floor: i64) -> GridResult<bool> {
        self.store.update(|state| state.can_place_sell(floor)).await
    }

    /// Attach a freshly placed order: NONE -> OPEN
    pub async fn set_order(
        &self,
        side: OrderSide,
        floor: i64,
        order_id: String,
        amount: f64,
    ) -> GridResult<()> {
        self.store
            .update(|state| {
                state
                    .get_or_create_level(floor)?
                    .open_side(side, order_id, amount)
            })
            .await
    }

    /// Record a fill: OPEN -> CLOSED
    pub async fn mark_closed(&self, side: OrderSide, floor: i64) -> GridResult<()> {
        self.store
            .update(|state| state.get_or_create_level(floor)?.close_side(side))
            .await
    }

    /// Release a side: CLOSED (or OPEN, for cancellation) -> NONE
    pub async fn clear_order(&self, side: OrderSide, floor: i64) -> GridResult<()> {
        self.store
            .update(|state| state.get_or_create_level(floor)?.clear_side(side))
            .await
    }

    /// Levels ascending by floor, leading/trailing empty levels trimmed
    pub async fn list_levels(&self) -> Vec<Level> {
        self.store.read(|state| state.trimmed_levels()).await
    }

    /// Floors whose buy side has CLOSED, with the filled amount
    pub async fn buys_to_rotate(&self) -> Vec<(i64, f64)> {
        self.store
            .read(|state| {
                state
                    .levels
                    .values()
                    .filter(|l| l.buy.is_closed())
                    .map(|l| (l.floor, l.buy.amount.unwrap_or(0.0)))
                    .collect()
            })
            .await
    }

    /// Floors whose sell side has CLOSED (completed round trips)
    pub async fn sells_to_settle(&self) -> Vec<i64> {
        self.store
            .read(|state| {
                state
                    .levels
                    .values()
                    .filter(|l| l.sell.is_closed())
                    .map(|l| l.floor)
                    .collect()
            })
            .await
    }

    /// Open buy orders at floors strictly below the cutoff, with their
    /// order ids, ascending
    pub async fn open_buys_below(&self, cutoff: i64) -> Vec<(i64, String)> {
        self.store
            .read(|state| {
                state
                    .levels
                    .values()
                    .filter(|l| l.floor < cutoff && l.buy.is_open())
                    .filter_map(|l| l.buy.order_id.clone().map(|id| (l.floor, id)))
                    .collect()
            })
            .await
    }
}
