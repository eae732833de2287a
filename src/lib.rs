#![deny(unreachable_pub)]
pub mod config;
pub mod controller;
pub mod errors;
pub mod exchange;
pub mod ladder;
pub mod ledger;
pub mod levels;
pub mod registry;
pub mod store;
pub mod types;
pub use controller::TradingController;
pub use errors::{GridError, GridResult};
pub use exchange::{
    ExchangePort, MarketFeed, ReplayExchange, RestExchange, SimulatedExchange,
};
pub use ledger::OrderLedger;
pub use levels::LevelStore;
pub use registry::{BotConfig, BotRegistry, ExchangeAccounts};
pub use store::{BotRecord, BotState, StateStore};
