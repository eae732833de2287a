//! Grid trading daemon
//!
//! Loads the configuration, wires an exchange account, restores every bot
//! snapshot from the data directory and drives them on a fixed tick
//! interval until interrupted.
//!
//! ## Setup
//!
//! 1. Optionally create a `.env` file in the project root:
//!    ```
//!    APP_EXCHANGE__API_KEY=your-gateway-key
//!    ```
//!
//! 2. Run the daemon:
//!    ```bash
//!    cargo run --bin expogrid -- --config config.toml
//!    ```

use std::env;
use std::sync::Arc;
use std::time::Duration;

use log::{error, info};
use tokio::time::interval;

use expogrid::config::Settings;
use expogrid::exchange::{RestExchange, SimulatedExchange};
use expogrid::registry::{BotRegistry, ExchangeAccounts};
use expogrid::types::BotStatus;
use expogrid::ExchangePort;

#[tokio::main]
async fn main() {
    // Load .env before the config, which reads the environment
    let dotenv_path = dotenvy::dotenv().ok();

    // Parse arguments
    let args: Vec<String> = env::args().collect();
    let config_path = if args.len() > 2 && args[1] == "--config" {
        args[2].clone()
    } else {
        "config".to_string()
    };

    let settings = match Settings::new(&config_path) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Failed to load config {config_path:?}: {e}");
            return;
        }
    };

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(settings.log.level.as_str()),
    )
    .init();
    match dotenv_path {
        Some(path) => info!("Loaded environment from: {}", path.display()),
        None => info!("No .env file found, using system environment variables"),
    }
    info!("Loaded configuration from {config_path:?}");

    let gateway = Arc::new(RestExchange::new(
        settings.exchange.base_url.clone(),
        settings.exchange.api_key.clone(),
    ));
    let exchange: Arc<dyn ExchangePort> = match settings.exchange.mode.as_str() {
        "live" => gateway,
        "simulated" => {
            info!("Simulated mode: real market data, local fills");
            Arc::new(SimulatedExchange::new(gateway))
        }
        other => {
            error!("Unknown exchange mode {other:?} (expected \"live\" or \"simulated\")");
            return;
        }
    };

    let mut accounts = ExchangeAccounts::new();
    accounts.insert(settings.exchange.account.clone(), exchange);

    let registry = match BotRegistry::open(&settings.data_dir, accounts) {
        Ok(registry) => registry,
        Err(e) => {
            error!("Failed to open data directory {}: {e}", settings.data_dir);
            return;
        }
    };

    let bots = registry.list_bots().await;
    info!("Restored {} bot(s) from {}", bots.len(), settings.data_dir);

    if bots.is_empty() {
        if let Some(bot_config) = settings.bot {
            match registry.create_bot(bot_config).await {
                Ok(record) => {
                    info!("Created bot {} ({}) from config", record.id, record.name);
                    let controller = match registry.get(record.id).await {
                        Ok(controller) => controller,
                        Err(e) => {
                            error!("Bot {} vanished after creation: {e}", record.id);
                            return;
                        }
                    };
                    if let Err(e) = controller.start().await {
                        error!("Failed to start bot {}: {e}", record.id);
                        return;
                    }
                }
                Err(e) => {
                    error!("Failed to create bot from config: {e}");
                    return;
                }
            }
        }
    } else {
        for bot in &bots {
            if bot.status == BotStatus::Running {
                info!("bot {} ({}) resumes running", bot.id, bot.name);
            }
        }
    }

    let mut ticker = interval(Duration::from_secs(settings.scheduler.tick_interval_secs));
    info!(
        "Scheduler running, ticking every {}s",
        settings.scheduler.tick_interval_secs
    );

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                registry.tick_all().await;
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, shutting down");
                break;
            }
        }
    }
}
