//! Per-bot state with atomic JSON snapshot persistence

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::debug;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::errors::GridResult;
use crate::ladder;
use crate::types::{BotStatus, Level, LevelStatus, Order};

/// Persisted bot attributes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotRecord {
    pub id: u64,
    pub name: String,
    pub status: BotStatus,
    pub exchange_account: String,
    pub symbol: String,
    /// Configured nominal rung spacing, before the fee buffer
    pub level_height: f64,
    pub taker_fee: f64,
    pub maker_fee: f64,
    /// Rung-to-rung price ratio: level_height plus the round-trip fee buffer.
    /// Always strictly greater than 1.
    pub total_level_height: f64,
    /// Price anchor for floor 0
    pub level_0_price: f64,
    /// Base-currency amount of each buy order
    pub trade_amount: f64,
    pub buy_up_levels: u32,
    pub buy_down_levels: u32,
    /// Cancel resting buys that drift below the window (tick step policy)
    #[serde(default)]
    pub cancel_excess_buys: bool,
    pub last_price: f64,
    pub last_floor: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Creation timestamp, milliseconds
    pub created_at: i64,
}

/// Complete persisted state of one bot: the record itself plus every level
/// and order it has ever touched. Levels are never physically deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotState {
    pub bot: BotRecord,
    pub levels: BTreeMap<i64, Level>,
    pub orders: HashMap<String, Order>,
}

impl BotState {
    pub fn new(bot: BotRecord) -> Self {
        Self {
            bot,
            levels: BTreeMap::new(),
            orders: HashMap::new(),
        }
    }

    /// Fetch a level, creating it lazily with its ladder price on first
    /// reference. Idempotent: the price is fixed for the level's lifetime.
    pub fn get_or_create_level(&mut self, floor: i64) -> GridResult<&mut Level> {
        let price = ladder::floor_to_price(
            floor,
            self.bot.total_level_height,
            self.bot.level_0_price,
        )?;
        Ok(self
            .levels
            .entry(floor)
            .or_insert_with(|| Level::new(floor, price)))
    }

    /// Buy guard: the floor's buy side must be NONE and the sell side one
    /// rung above must not be OPEN. Creates both levels lazily.
    pub fn can_place_buy(&mut self, floor: i64) -> GridResult<bool> {
        if self.get_or_create_level(floor)?.buy.status != LevelStatus::None {
            return Ok(false);
        }
        Ok(self.get_or_create_level(floor + 1)?.sell.status != LevelStatus::Open)
    }

    /// Sell guard: the floor's sell side must be NONE
    pub fn can_place_sell(&mut self, floor: i64) -> GridResult<bool> {
        Ok(self.get_or_create_level(floor)?.sell.status == LevelStatus::None)
    }

    /// Levels ascending by floor with leading and trailing empty levels
    /// trimmed from the listing (storage keeps them).
    pub fn trimmed_levels(&self) -> Vec<Level> {
        let levels: Vec<&Level> = self.levels.values().collect();
        let Some(first) = levels.iter().position(|l| !l.is_empty()) else {
            return Vec::new();
        };
        // position() found one, so rposition() will too
        let last = levels.iter().rposition(|l| !l.is_empty()).unwrap_or(first);
        levels[first..=last].iter().map(|l| (*l).clone()).collect()
    }

    /// Load a snapshot from disk
    pub fn load_from_file(path: impl AsRef<Path>) -> GridResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let state: Self = serde_json::from_str(&content)?;
        Ok(state)
    }

    /// Save a snapshot atomically (write to temp, then rename)
    pub fn save_to_file_atomic(&self, path: impl AsRef<Path>) -> GridResult<()> {
        let path = path.as_ref();
        let temp_path = path.with_extension("tmp");

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(&temp_path, content)?;
        std::fs::rename(&temp_path, path)?;

        Ok(())
    }
}

/// Shared handle to one bot's state.
///
/// Every mutation goes through [`StateStore::update`], which applies the
/// closure under a single write lock and persists the snapshot before
/// releasing it. That makes the order-plus-level write in order placement
/// observable only as a whole.
pub struct StateStore {
    state: Arc<RwLock<BotState>>,
    save_path: Option<PathBuf>,
}

impl StateStore {
    pub fn new(state: BotState, save_path: Option<PathBuf>) -> Self {
        Self {
            state: Arc::new(RwLock::new(state)),
            save_path,
        }
    }

    /// Load a snapshot from disk and attach it to the same path
    pub fn open(path: impl Into<PathBuf>) -> GridResult<Self> {
        let path = path.into();
        let state = BotState::load_from_file(&path)?;
        Ok(Self::new(state, Some(path)))
    }

    /// Read access; the closure must not block
    pub async fn read<R>(&self, f: impl FnOnce(&BotState) -> R) -> R {
        let state = self.state.read().await;
        f(&state)
    }

    /// Cloned bot record
    pub async fn bot(&self) -> BotRecord {
        self.read(|s| s.bot.clone()).await
    }

    /// Mutate the state and persist the snapshot. The snapshot is only
    /// written when the closure succeeds, so a failed transition leaves the
    /// on-disk state untouched.
    pub async fn update<R>(
        &self,
        f: impl FnOnce(&mut BotState) -> GridResult<R>,
    ) -> GridResult<R> {
        let mut state = self.state.write().await;
        let result = f(&mut state)?;
        if let Some(path) = &self.save_path {
            state.save_to_file_atomic(path)?;
            debug!("bot {}: state saved to {:?}", state.bot.id, path);
        }
        Ok(result)
    }

    /// Persist the current snapshot without mutating
    pub async fn save(&self) -> GridResult<()> {
        if let Some(path) = &self.save_path {
            let state = self.state.read().await;
            state.save_to_file_atomic(path)?;
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod testutil {
    use super::*;
    use chrono::Utc;

    /// Bot record with the ladder anchored at 1.0 and ratio 1.03
    pub(crate) fn test_bot(id: u64) -> BotRecord {
        BotRecord {
            id,
            name: format!("test-{id}"),
            status: BotStatus::Stopped,
            exchange_account: "paper".into(),
            symbol: "BTC/USDT".into(),
            level_height: 0.028,
            taker_fee: 0.001,
            maker_fee: 0.001,
            total_level_height: 1.03,
            level_0_price: 1.0,
            trade_amount: 2.0,
            buy_up_levels: 2,
            buy_down_levels: 3,
            cancel_excess_buys: false,
            last_price: 0.0,
            last_floor: 0,
            message: None,
            created_at: Utc::now().timestamp_millis(),
        }
    }

    pub(crate) fn test_store() -> Arc<StateStore> {
        Arc::new(StateStore::new(BotState::new(test_bot(1)), None))
    }
}

#[cfg(test)]
mod tests {
    use super::testutil::test_bot;
    use super::*;
    use crate::types::OrderSide;

    #[test]
    fn test_lazy_level_creation_is_idempotent() {
        let mut state = BotState::new(test_bot(1));
        let price = state.get_or_create_level(10).unwrap().price;
        assert!((price - 1.03f64.powi(10)).abs() < 1e-12);

        state
            .get_or_create_level(10)
            .unwrap()
            .open_side(OrderSide::Buy, "oid".into(), 1.0)
            .unwrap();
        // second reference returns the same record, not a fresh one
        assert!(state.get_or_create_level(10).unwrap().buy.is_open());
        assert_eq!(state.levels.len(), 1);
    }

    #[test]
    fn test_trimmed_levels() {
        let mut state = BotState::new(test_bot(1));
        for floor in 0..6 {
            state.get_or_create_level(floor).unwrap();
        }
        state
            .get_or_create_level(2)
            .unwrap()
            .open_side(OrderSide::Buy, "a".into(), 1.0)
            .unwrap();
        state
            .get_or_create_level(4)
            .unwrap()
            .open_side(OrderSide::Sell, "b".into(), 1.0)
            .unwrap();

        let listed = state.trimmed_levels();
        let floors: Vec<i64> = listed.iter().map(|l| l.floor).collect();
        // interior empty level at floor 3 is kept, edges are trimmed
        assert_eq!(floors, vec![2, 3, 4]);
        // trimming is logical only
        assert_eq!(state.levels.len(), 6);
    }

    #[test]
    fn test_trimmed_levels_all_empty() {
        let mut state = BotState::new(test_bot(1));
        state.get_or_create_level(0).unwrap();
        state.get_or_create_level(1).unwrap();
        assert!(state.trimmed_levels().is_empty());
    }

    #[tokio::test]
    async fn test_snapshot_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bot-1.json");

        let store = StateStore::new(BotState::new(test_bot(1)), Some(path.clone()));
        store
            .update(|state| {
                state
                    .get_or_create_level(5)?
                    .open_side(OrderSide::Buy, "oid-5".into(), 2.0)?;
                state.bot.last_floor = 5;
                Ok(())
            })
            .await
            .unwrap();

        let loaded = BotState::load_from_file(&path).unwrap();
        assert_eq!(loaded.bot.last_floor, 5);
        assert!(loaded.levels.get(&5).unwrap().buy.is_open());
        // no leftover temp file from the atomic rename
        assert!(!path.with_extension("tmp").exists());
    }

    #[tokio::test]
    async fn test_failed_update_not_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bot-1.json");
        let store = StateStore::new(BotState::new(test_bot(1)), Some(path.clone()));

        store.update(|_| Ok(())).await.unwrap();
        let before = std::fs::read_to_string(&path).unwrap();

        let res = store
            .update(|state| {
                state.bot.last_floor = 99;
                state.get_or_create_level(0)?.close_side(OrderSide::Buy)
            })
            .await;
        assert!(res.is_err());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), before);
    }
}
