//! Backtest runner
//!
//! Replays a recorded price series through a bot and prints what the
//! ladder did with it. Each tick consumes one price; the run ends when
//! the series is exhausted.
//!
//! ```bash
//! cargo run --bin backtest -- prices.txt --config config.toml
//! ```
//!
//! The config only needs a `[bot]` section; the exchange section is
//! ignored because fills are simulated locally.

use std::env;
use std::sync::Arc;

use log::{error, info};

use expogrid::config::Settings;
use expogrid::exchange::ReplayExchange;
use expogrid::registry::{BotConfig, BotRegistry, ExchangeAccounts};
use expogrid::types::{OrderSide, OrderStatus};
use expogrid::GridError;

const REPLAY_ACCOUNT: &str = "replay";

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = env::args().collect();
    let Some(prices_path) = args.get(1).filter(|a| !a.starts_with("--")) else {
        error!("Usage: backtest <prices-file> [--config <config>]");
        return;
    };
    let config_path = args
        .iter()
        .position(|a| a == "--config")
        .and_then(|i| args.get(i + 1))
        .cloned();

    let bot_config = match config_path {
        Some(path) => match Settings::new(&path) {
            Ok(settings) => match settings.bot {
                Some(mut bot) => {
                    bot.exchange_account = REPLAY_ACCOUNT.to_string();
                    bot
                }
                None => {
                    error!("Config {path:?} has no [bot] section");
                    return;
                }
            },
            Err(e) => {
                error!("Failed to load config {path:?}: {e}");
                return;
            }
        },
        None => example_bot_config(),
    };

    let exchange = match ReplayExchange::from_file(prices_path) {
        Ok(exchange) => Arc::new(exchange),
        Err(e) => {
            error!("Failed to load price series {prices_path:?}: {e}");
            return;
        }
    };

    let mut accounts = ExchangeAccounts::new();
    accounts.insert(REPLAY_ACCOUNT, exchange);
    let registry = BotRegistry::in_memory(accounts);

    let record = match registry.create_bot(bot_config).await {
        Ok(record) => record,
        Err(e) => {
            error!("Failed to create bot: {e}");
            return;
        }
    };
    let controller = match registry.get(record.id).await {
        Ok(controller) => controller,
        Err(e) => {
            error!("Bot vanished after creation: {e}");
            return;
        }
    };
    if let Err(e) = controller.start().await {
        error!("Failed to start bot: {e}");
        return;
    }

    info!(
        "Replaying {prices_path} through {} (ratio {:.5}, anchor {})",
        record.symbol, record.total_level_height, record.level_0_price
    );

    // exhaustion trips the fail-fast stop, which ends the run cleanly
    let mut ticks = 0u64;
    loop {
        match controller.tick().await {
            Ok(()) => ticks += 1,
            Err(GridError::ReplayExhausted) => break,
            Err(e) => {
                error!("Backtest aborted after {ticks} tick(s): {e}");
                return;
            }
        }
    }

    let bot = controller.bot().await;
    let buys = controller
        .ledger()
        .list(Some(OrderSide::Buy), Some(OrderStatus::Closed))
        .await;
    let sells = controller
        .ledger()
        .list(Some(OrderSide::Sell), Some(OrderStatus::Closed))
        .await;
    let proceeds: f64 = sells.iter().filter_map(|o| o.cost).sum();
    let spent: f64 = buys.iter().filter_map(|o| o.cost).sum();

    info!("Replay finished after {ticks} tick(s)");
    info!(
        "Last price {:.6} (floor {}), {} level(s) touched",
        bot.last_price,
        bot.last_floor,
        controller.levels().list_levels().await.len()
    );
    info!(
        "{} buy fill(s) spending {spent:.6}, {} sell fill(s) returning {proceeds:.6}",
        buys.len(),
        sells.len()
    );
}

fn example_bot_config() -> BotConfig {
    BotConfig {
        name: "backtest".into(),
        exchange_account: REPLAY_ACCOUNT.into(),
        symbol: "BTC/USDT".into(),
        level_height: 0.028,
        taker_fee: 0.001,
        maker_fee: 0.001,
        level_0_price: 1.0,
        trade_amount: 1.0,
        buy_up_levels: 2,
        buy_down_levels: 3,
        cancel_excess_buys: false,
    }
}
