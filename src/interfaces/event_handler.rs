// ============================================================================
// Event Handler Interface
// Defines the contract for handling order, trade and registry events
// ============================================================================

use crate::domain::{Direction, OrderId, OrderStatus, Transaction, UserId};
use crate::numeric::{Amount, Price, Quantity};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Events emitted by the exchange once the locks of the producing operation
/// have been released.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ExchangeEvent {
    /// Order admitted: reserves taken, matching done
    OrderAccepted {
        order_id: OrderId,
        user_id: UserId,
        ticker: String,
        direction: Direction,
        timestamp: DateTime<Utc>,
    },

    /// Placement rejected with reason. `order_id` is set when a record was
    /// kept (market orders without enough liquidity).
    OrderRejected {
        order_id: Option<OrderId>,
        user_id: UserId,
        ticker: String,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// Trade settled
    TradeExecuted {
        trade: Transaction,
        timestamp: DateTime<Utc>,
    },

    /// Unfilled part of a limit order added to the book
    OrderRested {
        order_id: OrderId,
        price: Price,
        quantity: Quantity,
        timestamp: DateTime<Utc>,
    },

    /// Order fully executed
    OrderExecuted {
        order_id: OrderId,
        total_filled: Quantity,
        timestamp: DateTime<Utc>,
    },

    /// Order cancelled and its reserve released
    OrderCancelled {
        order_id: OrderId,
        released: Amount,
        timestamp: DateTime<Utc>,
    },

    /// Deposit or withdrawal
    BalanceAdjusted {
        user_id: UserId,
        resource: String,
        delta: Amount,
        available: Amount,
        timestamp: DateTime<Utc>,
    },

    InstrumentListed {
        ticker: String,
        timestamp: DateTime<Utc>,
    },

    InstrumentDelisted {
        ticker: String,
        cancelled_orders: usize,
        timestamp: DateTime<Utc>,
    },

    UserRegistered {
        user_id: UserId,
        timestamp: DateTime<Utc>,
    },

    UserRemoved {
        user_id: UserId,
        cancelled_orders: usize,
        timestamp: DateTime<Utc>,
    },
}

impl ExchangeEvent {
    /// Order the event refers to, if any
    pub fn order_id(&self) -> Option<OrderId> {
        match self {
            ExchangeEvent::OrderAccepted { order_id, .. }
            | ExchangeEvent::OrderRested { order_id, .. }
            | ExchangeEvent::OrderExecuted { order_id, .. }
            | ExchangeEvent::OrderCancelled { order_id, .. } => Some(*order_id),
            ExchangeEvent::OrderRejected { order_id, .. } => *order_id,
            ExchangeEvent::TradeExecuted { trade, .. } => Some(trade.taker_order_id),
            _ => None,
        }
    }

    /// Final status implied by the event, for order events that end a
    /// placement or cancellation
    pub fn final_status(&self) -> Option<OrderStatus> {
        match self {
            ExchangeEvent::OrderExecuted { .. } => Some(OrderStatus::Executed),
            ExchangeEvent::OrderCancelled { .. } => Some(OrderStatus::Cancelled),
            ExchangeEvent::OrderRejected { order_id: Some(_), .. } => Some(OrderStatus::Cancelled),
            _ => None,
        }
    }
}

/// Event handler trait for processing exchange events
/// Implementations can handle logging, notifications, persistence, etc.
pub trait EventHandler: Send + Sync {
    /// Handle an exchange event
    fn on_event(&self, event: ExchangeEvent);

    /// Batch event handler (optional optimization)
    fn on_events(&self, events: Vec<ExchangeEvent>) {
        for event in events {
            self.on_event(event);
        }
    }
}

/// No-op event handler for testing
pub struct NoOpEventHandler;

impl EventHandler for NoOpEventHandler {
    fn on_event(&self, _event: ExchangeEvent) {
        // Do nothing
    }
}

/// Logging event handler
pub struct LoggingEventHandler;

impl EventHandler for LoggingEventHandler {
    fn on_event(&self, event: ExchangeEvent) {
        tracing::debug!("Exchange event: {:?}", event);
    }
}

/// Keeps every event in memory.
#[derive(Default)]
pub struct RecordingEventHandler {
    events: Mutex<Vec<ExchangeEvent>>,
}

impl RecordingEventHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ExchangeEvent> {
        self.events.lock().clone()
    }

    /// Remove and return everything recorded so far
    pub fn take(&self) -> Vec<ExchangeEvent> {
        std::mem::take(&mut *self.events.lock())
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }
}

impl EventHandler for RecordingEventHandler {
    fn on_event(&self, event: ExchangeEvent) {
        self.events.lock().push(event);
    }

    fn on_events(&self, events: Vec<ExchangeEvent>) {
        self.events.lock().extend(events);
    }
}
