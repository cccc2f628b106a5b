// ============================================================================
// Order Domain Model
// ============================================================================

use crate::error::{ExchangeError, ExchangeResult};
use crate::numeric::{
    max_magnitude, notional, within_precision, Amount, Price, Quantity, PRICE_SCALE, QUANTITY_SCALE,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::fmt;
use uuid::Uuid;

use super::UserId;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

// ============================================================================
// Value Objects
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct OrderId(Uuid);

impl OrderId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for OrderId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Direction {
    /// Buy side
    Bid,
    /// Sell side
    Ask,
}

impl Direction {
    pub fn opposite(self) -> Self {
        match self {
            Direction::Bid => Direction::Ask,
            Direction::Ask => Direction::Bid,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum OrderType {
    Limit,
    Market,
}

// ============================================================================
// Order State Machine
// ============================================================================

pub mod state {
    #[cfg(feature = "serde")]
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    #[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
    #[cfg_attr(feature = "serde", serde(rename_all = "SCREAMING_SNAKE_CASE"))]
    pub enum OrderStatus {
        New,
        PartiallyExecuted,
        Executed,
        Cancelled,
    }

    impl OrderStatus {
        pub fn is_terminal(&self) -> bool {
            matches!(self, OrderStatus::Executed | OrderStatus::Cancelled)
        }

        pub fn can_be_cancelled(&self) -> bool {
            matches!(self, OrderStatus::New | OrderStatus::PartiallyExecuted)
        }
    }

    /// Valid state transitions for the order state machine
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum OrderStatusTransition {
        PartialFill,
        Fill,
        Cancel,
    }

    impl OrderStatus {
        /// Next status, or `None` when the transition is not allowed.
        pub fn transition(&self, transition: OrderStatusTransition) -> Option<OrderStatus> {
            match (self, transition) {
                (OrderStatus::New, OrderStatusTransition::PartialFill)
                | (OrderStatus::PartiallyExecuted, OrderStatusTransition::PartialFill) => {
                    Some(OrderStatus::PartiallyExecuted)
                },
                (OrderStatus::New, OrderStatusTransition::Fill)
                | (OrderStatus::PartiallyExecuted, OrderStatusTransition::Fill) => {
                    Some(OrderStatus::Executed)
                },
                (OrderStatus::New, OrderStatusTransition::Cancel)
                | (OrderStatus::PartiallyExecuted, OrderStatusTransition::Cancel) => {
                    Some(OrderStatus::Cancelled)
                },
                _ => None,
            }
        }
    }
}

use state::{OrderStatus, OrderStatusTransition};

// ============================================================================
// Order Request
// ============================================================================

/// What a caller asks the exchange to place.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct OrderRequest {
    pub user_id: UserId,
    pub ticker: String,
    pub direction: Direction,
    pub quantity: Quantity,
    /// `None` places a market order
    pub price: Option<Price>,
}

impl OrderRequest {
    pub fn limit(
        user_id: UserId,
        ticker: impl Into<String>,
        direction: Direction,
        quantity: Quantity,
        price: Price,
    ) -> Self {
        Self {
            user_id,
            ticker: ticker.into(),
            direction,
            quantity,
            price: Some(price),
        }
    }

    pub fn market(
        user_id: UserId,
        ticker: impl Into<String>,
        direction: Direction,
        quantity: Quantity,
    ) -> Self {
        Self {
            user_id,
            ticker: ticker.into(),
            direction,
            quantity,
            price: None,
        }
    }

    pub fn order_type(&self) -> OrderType {
        match self.price {
            Some(_) => OrderType::Limit,
            None => OrderType::Market,
        }
    }

    /// Reject non-positive quantities and prices, values with more decimal
    /// places than [`QUANTITY_SCALE`]/[`PRICE_SCALE`], and limit orders whose
    /// notional exceeds [`max_magnitude`].
    pub fn validate(&self) -> ExchangeResult<()> {
        if self.quantity <= Decimal::ZERO {
            return Err(ExchangeError::InvalidQuantity(format!(
                "quantity must be positive, got {}",
                self.quantity
            )));
        }
        within_precision(self.quantity, QUANTITY_SCALE)
            .map_err(|e| ExchangeError::InvalidQuantity(format!("{}: {}", self.quantity, e)))?;

        if let Some(price) = self.price {
            if price <= Decimal::ZERO {
                return Err(ExchangeError::InvalidPrice(format!(
                    "price must be positive, got {}",
                    price
                )));
            }
            within_precision(price, PRICE_SCALE)
                .map_err(|e| ExchangeError::InvalidPrice(format!("{}: {}", price, e)))?;

            match notional(self.quantity, price) {
                Ok(value) if value <= max_magnitude() => {},
                _ => {
                    return Err(ExchangeError::InvalidPrice(format!(
                        "notional of {} @ {} exceeds {}",
                        self.quantity,
                        price,
                        max_magnitude()
                    )))
                },
            }
        }

        Ok(())
    }
}

// ============================================================================
// Order Entity
// ============================================================================

/// An order record.
///
/// Fill state is private so that `remaining + filled == original` holds at
/// every observable point; only [`Order::fill`] and [`Order::cancel`] mutate it.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Order {
    pub id: OrderId,
    pub user_id: UserId,
    pub ticker: String,
    pub direction: Direction,
    pub price: Option<Price>,
    pub original_qty: Quantity,
    pub created_at: DateTime<Utc>,
    /// Monotonic placement sequence, breaks time-priority ties
    pub sequence: u64,

    remaining_qty: Quantity,
    filled_qty: Quantity,
    status: OrderStatus,
}

impl Order {
    pub fn new(request: &OrderRequest, sequence: u64) -> Self {
        Self {
            id: OrderId::new(),
            user_id: request.user_id,
            ticker: request.ticker.clone(),
            direction: request.direction,
            price: request.price.map(|price| price.normalize()),
            original_qty: request.quantity.normalize(),
            created_at: Utc::now(),
            sequence,
            remaining_qty: request.quantity.normalize(),
            filled_qty: Decimal::ZERO,
            status: OrderStatus::New,
        }
    }

    pub fn remaining_qty(&self) -> Quantity {
        self.remaining_qty
    }

    pub fn filled_qty(&self) -> Quantity {
        self.filled_qty
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn order_type(&self) -> OrderType {
        match self.price {
            Some(_) => OrderType::Limit,
            None => OrderType::Market,
        }
    }

    pub fn is_market_order(&self) -> bool {
        self.price.is_none()
    }

    pub fn is_limit_order(&self) -> bool {
        self.price.is_some()
    }

    /// Amount still reserved for the unfilled part: `remaining × price` of
    /// base currency for a bid, `remaining` units for an ask.
    pub fn reserved_amount(&self) -> ExchangeResult<Amount> {
        match (self.direction, self.price) {
            (Direction::Bid, Some(price)) => Ok(notional(self.remaining_qty, price)?),
            (Direction::Ask, Some(_)) => Ok(self.remaining_qty),
            (_, None) => Ok(Decimal::ZERO),
        }
    }

    /// Execute `quantity` of this order.
    pub fn fill(&mut self, quantity: Quantity) -> ExchangeResult<OrderStatus> {
        if quantity <= Decimal::ZERO || quantity > self.remaining_qty {
            return Err(ExchangeError::invariant(format!(
                "fill of {} on order {} with {} remaining",
                quantity, self.id, self.remaining_qty
            )));
        }

        let transition = if quantity == self.remaining_qty {
            OrderStatusTransition::Fill
        } else {
            OrderStatusTransition::PartialFill
        };
        let next = self.status.transition(transition).ok_or_else(|| {
            ExchangeError::invariant(format!(
                "fill on order {} in terminal status {:?}",
                self.id, self.status
            ))
        })?;

        self.remaining_qty -= quantity;
        self.filled_qty += quantity;
        self.status = next;
        Ok(next)
    }

    /// Move the order to `Cancelled`. Fill quantities are kept as they are.
    pub fn cancel(&mut self) -> ExchangeResult<()> {
        match self.status.transition(OrderStatusTransition::Cancel) {
            Some(next) => {
                self.status = next;
                Ok(())
            },
            None => Err(ExchangeError::InvalidState {
                order_id: self.id,
                status: self.status,
                reason: "order is already in a terminal state",
            }),
        }
    }
}
