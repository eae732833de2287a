//! Grid-specific error types

use thiserror::Error;

use crate::types::{BotStatus, LevelStatus, OrderSide};

/// Errors that can occur in grid trading operations
#[derive(Error, Debug, Clone)]
pub enum GridError {
    #[error("Invalid ladder parameter: {0}")]
    InvalidLadderParameter(String),

    #[error("Invalid bot state transition: cannot {action} while {current:?}")]
    InvalidStateTransition {
        current: BotStatus,
        action: &'static str,
    },

    #[error("Level {floor} unavailable for a {side:?} order")]
    LevelUnavailable { floor: i64, side: OrderSide },

    #[error("Invalid level transition at floor {floor}: {side:?} side is {from:?}, expected {expected}")]
    InvalidTransition {
        floor: i64,
        side: OrderSide,
        from: LevelStatus,
        expected: &'static str,
    },

    #[error("Order not found: {0}")]
    OrderNotFound(String),

    #[error("Bot not found: id {0}")]
    BotNotFound(u64),

    #[error("Unknown exchange account: {0}")]
    UnknownAccount(String),

    #[error("Exchange rejected order: {0}")]
    ExchangeRejected(String),

    #[error("Order not cancelable: {0}")]
    OrderNotCancelable(String),

    #[error("Exchange transport error: {0}")]
    Transport(String),

    #[error("State persistence error: {0}")]
    StatePersistence(String),

    #[error("Stop request timed out waiting for in-flight tick")]
    StopTimeout,

    #[error("Replay price series exhausted")]
    ReplayExhausted,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl From<std::io::Error> for GridError {
    fn from(err: std::io::Error) -> Self {
        GridError::StatePersistence(err.to_string())
    }
}

impl From<serde_json::Error> for GridError {
    fn from(err: serde_json::Error) -> Self {
        GridError::StatePersistence(err.to_string())
    }
}

impl From<reqwest::Error> for GridError {
    fn from(err: reqwest::Error) -> Self {
        GridError::Transport(err.to_string())
    }
}

/// Result type for grid operations
pub type GridResult<T> = std::result::Result<T, GridError>;
