//! Core data types for the grid ladder

use serde::{Deserialize, Serialize};

use crate::errors::{GridError, GridResult};

/// Order side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    /// Returns the opposite side
    pub fn opposite(&self) -> Self {
        match self {
            OrderSide::Buy => OrderSide::Sell,
            OrderSide::Sell => OrderSide::Buy,
        }
    }

    /// Wire representation used by exchange adapters
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSide::Buy => "buy",
            OrderSide::Sell => "sell",
        }
    }
}

/// Bot execution status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BotStatus {
    /// Not trading; resting orders are left as-is
    Stopped,
    /// Normal operation: the tick loop maintains the buy window
    Running,
}

/// Status of one side (buy or sell) of a grid level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum LevelStatus {
    /// No order tied to this side
    #[default]
    None,
    /// An order is resting on the exchange book
    Open,
    /// The order filled; awaiting the tick loop's rotation
    Closed,
}

/// Exchange order status as tracked locally
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    Open,
    Closed,
    Canceled,
}

/// One side of a level: a tiny NONE -> OPEN -> CLOSED -> NONE state machine.
///
/// Invariant: `status == Open` iff `order_id` and `amount` are both set;
/// `status == None` iff both are unset.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LevelSide {
    pub status: LevelStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<f64>,
}

impl LevelSide {
    pub fn is_none(&self) -> bool {
        self.status == LevelStatus::None
    }

    pub fn is_open(&self) -> bool {
        self.status == LevelStatus::Open
    }

    pub fn is_closed(&self) -> bool {
        self.status == LevelStatus::Closed
    }

    /// Whether this side is tied to the given exchange order
    pub fn holds_order(&self, order_id: &str) -> bool {
        self.order_id.as_deref() == Some(order_id)
    }
}

/// A single rung of the ladder, identified by its floor index.
///
/// The price is derived once from the ladder parameters when the level is
/// first referenced and never changes afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Level {
    pub floor: i64,
    pub price: f64,
    #[serde(default)]
    pub buy: LevelSide,
    #[serde(default)]
    pub sell: LevelSide,
}

impl Level {
    pub fn new(floor: i64, price: f64) -> Self {
        Self {
            floor,
            price,
            buy: LevelSide::default(),
            sell: LevelSide::default(),
        }
    }

    /// A level is empty when neither side carries state
    pub fn is_empty(&self) -> bool {
        self.buy.is_none() && self.sell.is_none()
    }

    pub fn side(&self, side: OrderSide) -> &LevelSide {
        match side {
            OrderSide::Buy => &self.buy,
            OrderSide::Sell => &self.sell,
        }
    }

    fn side_mut(&mut self, side: OrderSide) -> &mut LevelSide {
        match side {
            OrderSide::Buy => &mut self.buy,
            OrderSide::Sell => &mut self.sell,
        }
    }

    /// Transition a side NONE -> OPEN, attaching the resting order
    pub fn open_side(&mut self, side: OrderSide, order_id: String, amount: f64) -> GridResult<()> {
        let floor = self.floor;
        let s = self.side_mut(side);
        if s.status != LevelStatus::None {
            return Err(GridError::InvalidTransition {
                floor,
                side,
                from: s.status,
                expected: "None",
            });
        }
        s.status = LevelStatus::Open;
        s.order_id = Some(order_id);
        s.amount = Some(amount);
        Ok(())
    }

    /// Transition a side OPEN -> CLOSED (the resting order filled)
    pub fn close_side(&mut self, side: OrderSide) -> GridResult<()> {
        let floor = self.floor;
        let s = self.side_mut(side);
        if s.status != LevelStatus::Open {
            return Err(GridError::InvalidTransition {
                floor,
                side,
                from: s.status,
                expected: "Open",
            });
        }
        s.status = LevelStatus::Closed;
        Ok(())
    }

    /// Transition a side CLOSED (or OPEN, for cancellation) -> NONE,
    /// releasing the order id and amount
    pub fn clear_side(&mut self, side: OrderSide) -> GridResult<()> {
        let floor = self.floor;
        let s = self.side_mut(side);
        if s.status == LevelStatus::None {
            return Err(GridError::InvalidTransition {
                floor,
                side,
                from: s.status,
                expected: "Open or Closed",
            });
        }
        *s = LevelSide::default();
        Ok(())
    }
}

/// A locally tracked exchange order, scoped to one bot.
///
/// Fills are all-or-nothing: `average` and `cost` are written exactly once
/// when the order closes, and the record is immutable afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    /// Exchange-assigned id
    pub id: String,
    pub side: OrderSide,
    pub status: OrderStatus,
    /// Requested limit price
    pub price: f64,
    /// Requested amount of base currency
    pub amount: f64,
    /// Average fill price, set at close
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub average: Option<f64>,
    /// Total cost in quote currency, set at close
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost: Option<f64>,
    /// Exchange timestamp, milliseconds
    pub timestamp: i64,
}

/// Ticker snapshot from the exchange
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Ticker {
    /// Last traded price
    pub last: f64,
    /// Best bid, if the venue reports one
    #[serde(default)]
    pub bid: Option<f64>,
    /// Best ask, if the venue reports one
    #[serde(default)]
    pub ask: Option<f64>,
}

impl Ticker {
    pub fn new(last: f64) -> Self {
        Self {
            last,
            bid: None,
            ask: None,
        }
    }

    /// Best ask, falling back to the last trade
    pub fn best_ask(&self) -> f64 {
        self.ask.unwrap_or(self.last)
    }

    /// Best bid, falling back to the last trade
    pub fn best_bid(&self) -> f64 {
        self.bid.unwrap_or(self.last)
    }
}

/// Per-order reconciliation report from the exchange
#[derive(Debug, Clone)]
pub struct OrderUpdate {
    pub id: String,
    pub status: OrderStatus,
    pub average: Option<f64>,
    pub cost: Option<f64>,
}

/// Exchange acknowledgement of a newly placed order
#[derive(Debug, Clone)]
pub struct ExchangeOrder {
    pub id: String,
    /// Placement timestamp, milliseconds
    pub timestamp: i64,
    pub price: f64,
    pub amount: f64,
    pub cost: Option<f64>,
    pub average: Option<f64>,
}
