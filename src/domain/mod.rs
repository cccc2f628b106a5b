// ============================================================================
// Domain Models Module
// Contains all core domain entities and value objects
// ============================================================================

pub mod account;
pub mod config;
pub mod order;
pub mod order_book;
pub mod trade;

pub use account::{BalanceSheet, Holding, HoldingError, Instrument, Role, User, UserId};
pub use config::ExchangeConfig;
pub use order::{Direction, Order, OrderId, OrderRequest, OrderType};
pub use order_book::{OrderBook, OrderBookSide, OrderBookSnapshot, PriceLevel, PriorityKey};
pub use trade::{TradeTape, Transaction};

// Re-export state machine
pub use order::state::{OrderStatus, OrderStatusTransition};
