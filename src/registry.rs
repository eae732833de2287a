//! Bot registry: creation, lookup, persistence, and fan-out ticking
//!
//! One registry owns every bot in the process. Each bot gets its own state
//! snapshot file (`bot-{id}.json`) under the data directory and its own
//! controller wired to the exchange account it was created with.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{error, info, warn};
use serde::Deserialize;
use tokio::sync::RwLock;
use tokio::task::JoinSet;

use crate::controller::TradingController;
use crate::errors::{GridError, GridResult};
use crate::exchange::ExchangePort;
use crate::ladder;
use crate::store::{BotRecord, BotState, StateStore};
use crate::types::{BotStatus, Level, Order, OrderSide, OrderStatus};

/// Named exchange adapters bots can be bound to
#[derive(Default, Clone)]
pub struct ExchangeAccounts {
    accounts: HashMap<String, Arc<dyn ExchangePort>>,
}

impl ExchangeAccounts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, exchange: Arc<dyn ExchangePort>) {
        self.accounts.insert(name.into(), exchange);
    }

    pub fn get(&self, name: &str) -> GridResult<Arc<dyn ExchangePort>> {
        self.accounts
            .get(name)
            .cloned()
            .ok_or_else(|| GridError::UnknownAccount(name.to_string()))
    }
}

/// Parameters for a new bot. The rung ratio is derived here: the nominal
/// spacing plus both fees, so a one-rung round trip clears its costs.
#[derive(Debug, Clone, Deserialize)]
pub struct BotConfig {
    pub name: String,
    pub exchange_account: String,
    pub symbol: String,
    pub level_height: f64,
    pub taker_fee: f64,
    pub maker_fee: f64,
    pub level_0_price: f64,
    pub trade_amount: f64,
    pub buy_up_levels: u32,
    pub buy_down_levels: u32,
    #[serde(default)]
    pub cancel_excess_buys: bool,
}

impl BotConfig {
    fn total_level_height(&self) -> f64 {
        1.0 + self.level_height + self.taker_fee + self.maker_fee
    }
}

pub struct BotRegistry {
    data_dir: Option<PathBuf>,
    accounts: ExchangeAccounts,
    bots: RwLock<HashMap<u64, Arc<TradingController>>>,
    next_id: AtomicU64,
}

impl BotRegistry {
    /// Registry without persistence; snapshots live only in memory
    pub fn in_memory(accounts: ExchangeAccounts) -> Self {
        Self {
            data_dir: None,
            accounts,
            bots: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Open a data directory, loading every `bot-*.json` snapshot in it.
    /// A snapshot whose exchange account is no longer configured fails the
    /// open; restarting with missing accounts would silently orphan bots.
    pub fn open(data_dir: impl Into<PathBuf>, accounts: ExchangeAccounts) -> GridResult<Self> {
        let data_dir = data_dir.into();
        std::fs::create_dir_all(&data_dir)?;

        let mut bots = HashMap::new();
        let mut max_id = 0u64;
        for entry in std::fs::read_dir(&data_dir)? {
            let path = entry?.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if !name.starts_with("bot-") || !name.ends_with(".json") {
                continue;
            }
            let state = BotState::load_from_file(&path)?;
            let record = state.bot.clone();
            let exchange = accounts.get(&record.exchange_account)?;
            let store = Arc::new(StateStore::new(state, Some(path.clone())));
            info!(
                "loaded bot {} ({:?}) from {:?}",
                record.id, record.status, path
            );
            max_id = max_id.max(record.id);
            bots.insert(record.id, Arc::new(TradingController::new(store, exchange)));
        }

        Ok(Self {
            data_dir: Some(data_dir),
            accounts,
            bots: RwLock::new(bots),
            next_id: AtomicU64::new(max_id + 1),
        })
    }

    fn snapshot_path(&self, id: u64) -> Option<PathBuf> {
        self.data_dir.as_ref().map(|d| d.join(format!("bot-{id}.json")))
    }

    /// Create a bot in the STOPPED state. Validated before anything is
    /// persisted, so a bad configuration never leaves a snapshot behind.
    pub async fn create_bot(&self, config: BotConfig) -> GridResult<BotRecord> {
        let exchange = self.accounts.get(&config.exchange_account)?;
        let ratio = config.total_level_height();
        ladder::validate(ratio, config.level_0_price)?;
        if !(config.trade_amount > 0.0) {
            return Err(GridError::InvalidLadderParameter(format!(
                "trade_amount must be positive, got {}",
                config.trade_amount
            )));
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let record = BotRecord {
            id,
            name: config.name,
            status: BotStatus::Stopped,
            exchange_account: config.exchange_account,
            symbol: config.symbol,
            level_height: config.level_height,
            taker_fee: config.taker_fee,
            maker_fee: config.maker_fee,
            total_level_height: ratio,
            level_0_price: config.level_0_price,
            trade_amount: config.trade_amount,
            buy_up_levels: config.buy_up_levels,
            buy_down_levels: config.buy_down_levels,
            cancel_excess_buys: config.cancel_excess_buys,
            last_price: 0.0,
            last_floor: 0,
            message: None,
            created_at: chrono::Utc::now().timestamp_millis(),
        };

        let store = Arc::new(StateStore::new(
            BotState::new(record.clone()),
            self.snapshot_path(id),
        ));
        store.save().await?;

        self.bots
            .write()
            .await
            .insert(id, Arc::new(TradingController::new(store, exchange)));
        info!("created bot {id} ({}) on {}", record.name, record.symbol);
        Ok(record)
    }

    pub async fn get(&self, id: u64) -> GridResult<Arc<TradingController>> {
        self.bots
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(GridError::BotNotFound(id))
    }

    pub async fn list_bots(&self) -> Vec<BotRecord> {
        let controllers: Vec<Arc<TradingController>> =
            self.bots.read().await.values().cloned().collect();
        let mut records = Vec::with_capacity(controllers.len());
        for controller in controllers {
            records.push(controller.bot().await);
        }
        records.sort_by_key(|r| r.id);
        records
    }

    /// Remove a STOPPED bot and its snapshot file
    pub async fn delete_bot(&self, id: u64) -> GridResult<()> {
        let controller = self.get(id).await?;
        let bot = controller.bot().await;
        if bot.status != BotStatus::Stopped {
            return Err(GridError::InvalidStateTransition {
                current: bot.status,
                action: "delete",
            });
        }
        self.bots.write().await.remove(&id);
        if let Some(path) = self.snapshot_path(id) {
            if let Err(err) = std::fs::remove_file(&path) {
                warn!("bot {id}: could not remove snapshot {path:?}: {err}");
            }
        }
        info!("deleted bot {id}");
        Ok(())
    }

    pub async fn start(&self, id: u64) -> GridResult<()> {
        self.get(id).await?.start().await
    }

    pub async fn stop(&self, id: u64, reason: &str, timeout: Duration) -> GridResult<()> {
        self.get(id).await?.stop(reason, timeout).await
    }

    pub async fn tick(&self, id: u64) -> GridResult<()> {
        self.get(id).await?.tick().await
    }

    pub async fn list_levels(&self, id: u64) -> GridResult<Vec<Level>> {
        Ok(self.get(id).await?.levels().list_levels().await)
    }

    pub async fn list_orders(
        &self,
        id: u64,
        side: Option<OrderSide>,
        status: Option<OrderStatus>,
    ) -> GridResult<Vec<Order>> {
        Ok(self.get(id).await?.ledger().list(side, status).await)
    }

    /// Tick every bot concurrently. A failing tick already stops its own
    /// bot; here it is only logged so one bad venue never starves the rest.
    pub async fn tick_all(&self) {
        let controllers: Vec<(u64, Arc<TradingController>)> = self
            .bots
            .read()
            .await
            .iter()
            .map(|(id, c)| (*id, c.clone()))
            .collect();

        let mut ticks = JoinSet::new();
        for (id, controller) in controllers {
            ticks.spawn(async move { (id, controller.tick().await) });
        }
        while let Some(joined) = ticks.join_next().await {
            match joined {
                Ok((id, Err(err))) => error!("bot {id}: tick failed: {err}"),
                Ok((_, Ok(()))) => {}
                Err(join_err) => error!("tick task panicked: {join_err}"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::mock::MockExchange;
    use std::time::Duration;

    fn test_config(account: &str) -> BotConfig {
        BotConfig {
            name: "grid".into(),
            exchange_account: account.into(),
            symbol: "BTC/USDT".into(),
            level_height: 0.028,
            taker_fee: 0.001,
            maker_fee: 0.001,
            level_0_price: 1.0,
            trade_amount: 2.0,
            buy_up_levels: 2,
            buy_down_levels: 3,
            cancel_excess_buys: false,
        }
    }

    fn mock_accounts() -> (ExchangeAccounts, Arc<MockExchange>) {
        let exchange = Arc::new(MockExchange::new(1.03f64.powi(10)));
        let mut accounts = ExchangeAccounts::new();
        accounts.insert("paper", exchange.clone());
        (accounts, exchange)
    }

    #[tokio::test]
    async fn test_create_derives_ratio_and_assigns_ids() {
        let (accounts, _) = mock_accounts();
        let registry = BotRegistry::in_memory(accounts);

        let first = registry.create_bot(test_config("paper")).await.unwrap();
        let second = registry.create_bot(test_config("paper")).await.unwrap();
        assert_eq!(first.id, 1);
        assert_eq!(second.id, 2);
        assert!((first.total_level_height - 1.03).abs() < 1e-12);
        assert_eq!(first.status, BotStatus::Stopped);
    }

    #[tokio::test]
    async fn test_create_rejects_bad_parameters() {
        let (accounts, _) = mock_accounts();
        let registry = BotRegistry::in_memory(accounts);

        assert!(matches!(
            registry.create_bot(test_config("missing")).await,
            Err(GridError::UnknownAccount(_))
        ));

        let mut negative_spacing = test_config("paper");
        negative_spacing.level_height = -0.5;
        assert!(matches!(
            registry.create_bot(negative_spacing).await,
            Err(GridError::InvalidLadderParameter(_))
        ));

        let mut zero_amount = test_config("paper");
        zero_amount.trade_amount = 0.0;
        assert!(matches!(
            registry.create_bot(zero_amount).await,
            Err(GridError::InvalidLadderParameter(_))
        ));

        // nothing leaked into the registry
        assert_eq!(registry.list_bots().await.len(), 0);
    }

    #[tokio::test]
    async fn test_lookup_and_delete() {
        let (accounts, _) = mock_accounts();
        let registry = BotRegistry::in_memory(accounts);
        let record = registry.create_bot(test_config("paper")).await.unwrap();

        assert!(registry.get(record.id).await.is_ok());
        assert!(matches!(
            registry.get(99).await,
            Err(GridError::BotNotFound(99))
        ));

        registry.start(record.id).await.unwrap();
        assert!(matches!(
            registry.delete_bot(record.id).await,
            Err(GridError::InvalidStateTransition { .. })
        ));

        registry
            .stop(record.id, "done", Duration::from_secs(1))
            .await
            .unwrap();
        registry.delete_bot(record.id).await.unwrap();
        assert!(matches!(
            registry.get(record.id).await,
            Err(GridError::BotNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_tick_all_drives_running_bots() {
        let (accounts, exchange) = mock_accounts();
        let registry = BotRegistry::in_memory(accounts);
        let record = registry.create_bot(test_config("paper")).await.unwrap();
        registry.start(record.id).await.unwrap();

        registry.tick_all().await;
        assert_eq!(exchange.placed.lock().await.len(), 5);
        let open_buys = registry
            .list_orders(record.id, Some(OrderSide::Buy), Some(OrderStatus::Open))
            .await
            .unwrap();
        assert_eq!(open_buys.len(), 5);
        // floors 8..=12 touched, trailing lazily created empties trimmed
        assert_eq!(registry.list_levels(record.id).await.unwrap().len(), 5);
    }

    #[tokio::test]
    async fn test_tick_all_survives_a_failing_bot() {
        let (mut accounts, _) = mock_accounts();
        let broken = Arc::new(MockExchange::new(1.0));
        broken.set_fail_ticker(true).await;
        accounts.insert("broken", broken);

        let registry = BotRegistry::in_memory(accounts);
        let healthy = registry.create_bot(test_config("paper")).await.unwrap();
        let failing = registry.create_bot(test_config("broken")).await.unwrap();
        registry.start(healthy.id).await.unwrap();
        registry.start(failing.id).await.unwrap();

        registry.tick_all().await;

        let bots = registry.list_bots().await;
        let failing_record = bots.iter().find(|b| b.id == failing.id).unwrap();
        let healthy_record = bots.iter().find(|b| b.id == healthy.id).unwrap();
        assert_eq!(failing_record.status, BotStatus::Stopped);
        assert_eq!(healthy_record.status, BotStatus::Running);
    }

    #[tokio::test]
    async fn test_snapshots_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let (accounts, _) = mock_accounts();

        let record = {
            let registry =
                BotRegistry::open(dir.path(), accounts.clone()).unwrap();
            let record = registry.create_bot(test_config("paper")).await.unwrap();
            let controller = registry.get(record.id).await.unwrap();
            controller.start().await.unwrap();
            controller.tick().await.unwrap();
            record
        };

        let reopened = BotRegistry::open(dir.path(), accounts).unwrap();
        let bots = reopened.list_bots().await;
        assert_eq!(bots.len(), 1);
        assert_eq!(bots[0].id, record.id);
        assert_eq!(bots[0].status, BotStatus::Running);
        assert_eq!(bots[0].last_floor, 10);

        // new ids never collide with loaded ones
        let next = reopened.create_bot(test_config("paper")).await.unwrap();
        assert_eq!(next.id, record.id + 1);
    }
}
