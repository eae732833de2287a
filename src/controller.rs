//! Trading controller: the per-bot tick loop and start/stop state machine
//!
//! A tick is one unit of work: reconcile fills, rotate filled buys into
//! sells one rung above, settle completed round trips, read the market,
//! and keep the configured window of resting buys around the current rung.
//! Ticks are single-flight per bot; any exchange failure aborts the tick
//! and stops the bot with the error as its message, so an operator must
//! look before restarting.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use tokio::sync::Mutex;

use crate::errors::{GridError, GridResult};
use crate::exchange::ExchangePort;
use crate::ladder;
use crate::ledger::OrderLedger;
use crate::levels::LevelStore;
use crate::store::{BotRecord, StateStore};
use crate::types::{BotStatus, OrderSide};

pub struct TradingController {
    store: Arc<StateStore>,
    exchange: Arc<dyn ExchangePort>,
    levels: LevelStore,
    ledger: OrderLedger,
    /// Serializes ticks per bot; `stop` also takes it so a state change
    /// never races an in-flight tick
    tick_lock: Mutex<()>,
}

impl TradingController {
    pub fn new(store: Arc<StateStore>, exchange: Arc<dyn ExchangePort>) -> Self {
        let levels = LevelStore::new(store.clone());
        let ledger = OrderLedger::new(store.clone(), exchange.clone());
        Self {
            store,
            exchange,
            levels,
            ledger,
            tick_lock: Mutex::new(()),
        }
    }

    pub async fn bot(&self) -> BotRecord {
        self.store.bot().await
    }

    pub fn levels(&self) -> &LevelStore {
        &self.levels
    }

    pub fn ledger(&self) -> &OrderLedger {
        &self.ledger
    }

    /// STOPPED -> RUNNING. Waits for any in-flight tick first.
    pub async fn start(&self) -> GridResult<()> {
        let _flight = self.tick_lock.lock().await;
        self.store
            .update(|state| {
                if state.bot.status != BotStatus::Stopped {
                    return Err(GridError::InvalidStateTransition {
                        current: state.bot.status,
                        action: "start",
                    });
                }
                state.bot.status = BotStatus::Running;
                state.bot.message = Some("running".into());
                Ok(())
            })
            .await?;
        info!("bot {}: started", self.store.read(|s| s.bot.id).await);
        Ok(())
    }

    /// RUNNING -> STOPPED, persisting the reason. Waits up to `timeout`
    /// for an in-flight tick; on timeout the request fails with no state
    /// change rather than racing the tick.
    pub async fn stop(&self, reason: &str, timeout: Duration) -> GridResult<()> {
        let _flight = tokio::time::timeout(timeout, self.tick_lock.lock())
            .await
            .map_err(|_| GridError::StopTimeout)?;
        self.store
            .update(|state| {
                if state.bot.status != BotStatus::Running {
                    return Err(GridError::InvalidStateTransition {
                        current: state.bot.status,
                        action: "stop",
                    });
                }
                state.bot.status = BotStatus::Stopped;
                state.bot.message = Some(reason.to_string());
                Ok(())
            })
            .await?;
        info!(
            "bot {}: stopped ({reason})",
            self.store.read(|s| s.bot.id).await
        );
        Ok(())
    }

    /// One tick. Single-flight: a concurrent call waits for the running
    /// one to finish, then runs against the fresh state.
    pub async fn tick(&self) -> GridResult<()> {
        let _flight = self.tick_lock.lock().await;
        match self.tick_inner().await {
            Ok(()) => Ok(()),
            Err(err) => {
                self.fail_stop(&err).await;
                Err(err)
            }
        }
    }

    async fn tick_inner(&self) -> GridResult<()> {
        let bot = self.store.bot().await;
        debug!("bot {}: tick ({:?})", bot.id, bot.status);

        self.ledger.sync_open_orders().await?;
        self.rotate_filled_buys().await?;
        self.settle_filled_sells().await?;

        let last_floor = self.refresh_market_floor(&bot).await?;

        if bot.status == BotStatus::Running {
            self.maintain_buy_window(&bot, last_floor).await?;
            if bot.cancel_excess_buys {
                self.cancel_excess_buys(&bot, last_floor).await?;
            }
        }
        Ok(())
    }

    /// Every level whose buy side has CLOSED rotates into a sell one rung
    /// above for the filled amount, then releases its buy side. This is
    /// the rule that realizes the ladder's round trips.
    async fn rotate_filled_buys(&self) -> GridResult<()> {
        for (floor, amount) in self.levels.buys_to_rotate().await {
            self.ledger.place(OrderSide::Sell, floor + 1, amount).await?;
            self.levels.clear_order(OrderSide::Buy, floor).await?;
        }
        Ok(())
    }

    /// A CLOSED sell completes a round trip; release the side
    async fn settle_filled_sells(&self) -> GridResult<()> {
        for floor in self.levels.sells_to_settle().await {
            self.levels.clear_order(OrderSide::Sell, floor).await?;
        }
        Ok(())
    }

    /// Fetch the ticker, map it to a rung, persist last price and floor
    async fn refresh_market_floor(&self, bot: &BotRecord) -> GridResult<i64> {
        let ticker = self.exchange.fetch_ticker(&bot.symbol).await?;
        let floor =
            ladder::price_to_floor(ticker.last, bot.total_level_height, bot.level_0_price)?;
        self.store
            .update(|state| {
                state.bot.last_price = ticker.last;
                state.bot.last_floor = floor;
                Ok(())
            })
            .await?;
        debug!("bot {}: last price {} -> floor {floor}", bot.id, ticker.last);
        Ok(floor)
    }

    /// Keep a window of `buy_down_levels` buys at and below the market
    /// rung and `buy_up_levels` above it, skipping floors the guard
    /// rejects (already bought, or an open sell one rung above).
    async fn maintain_buy_window(&self, bot: &BotRecord, last_floor: i64) -> GridResult<()> {
        for offset in 0..bot.buy_down_levels as i64 {
            let target = last_floor - offset;
            if self.levels.can_place_buy(target).await? {
                self.ledger
                    .place(OrderSide::Buy, target, bot.trade_amount)
                    .await?;
            }
        }
        for offset in 0..bot.buy_up_levels as i64 {
            let target = last_floor + offset + 1;
            if self.levels.can_place_buy(target).await? {
                self.ledger
                    .place(OrderSide::Buy, target, bot.trade_amount)
                    .await?;
            }
        }
        Ok(())
    }

    /// Policy step: cancel resting buys that drifted below the window.
    /// The boundary floor `last_floor - buy_down_levels` is kept; only
    /// floors strictly below it are canceled.
    async fn cancel_excess_buys(&self, bot: &BotRecord, last_floor: i64) -> GridResult<()> {
        let cutoff = last_floor - bot.buy_down_levels as i64;
        for (floor, order_id) in self.levels.open_buys_below(cutoff).await {
            info!("bot {}: canceling excess buy at floor {floor}", bot.id);
            self.ledger.cancel(&order_id).await?;
        }
        Ok(())
    }

    /// Fail-fast: force the bot STOPPED and store the error for the
    /// operator, regardless of its current state. Best-effort; a
    /// persistence failure here is only logged.
    async fn fail_stop(&self, err: &GridError) {
        let message = err.to_string();
        let result = self
            .store
            .update(|state| {
                state.bot.status = BotStatus::Stopped;
                state.bot.message = Some(message.clone());
                Ok(())
            })
            .await;
        match result {
            Ok(()) => warn!(
                "bot {}: stopped by tick failure: {message}",
                self.store.read(|s| s.bot.id).await
            ),
            Err(persist) => warn!("failed to persist stop after tick failure: {persist}"),
        }
    }
}
