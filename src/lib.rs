// ============================================================================
// Exchange Engine Library
// Order matching and settlement with a reservation ledger and ordered locking
// ============================================================================

//! # Exchange Engine
//!
//! The matching and settlement core of a simplified securities exchange.
//! Users hold a base-currency balance and per-instrument inventory, place
//! limit and market orders, and trades settle atomically against a ledger
//! that reserves ("freezes") what open orders may spend.
//!
//! ## Features
//!
//! - **Price/time priority matching**, every trade at the resting order's price
//! - **All-or-nothing admission**: an order's reserve and all of its
//!   settlements commit together or not at all
//! - **Ordered resource locking**: per-instrument locks plus one for the base
//!   currency, always taken in one global order
//! - **Implicit wallets**: every user holds every listed instrument, at zero
//!   by default
//! - **Event hooks** for logging and integration
//!
//! ## Example
//!
//! ```rust
//! use exchange_engine::prelude::*;
//! use rust_decimal::Decimal;
//!
//! let exchange = ExchangeBuilder::new("RUB").build().unwrap();
//! exchange.add_instrument("SBER", "Sberbank").unwrap();
//!
//! let seller = exchange.register_user("seller", Role::User).unwrap();
//! let buyer = exchange.register_user("buyer", Role::User).unwrap();
//! exchange.adjust_balance(seller, "SBER", Decimal::from(10)).unwrap();
//! exchange.adjust_balance(buyer, "RUB", Decimal::from(1000)).unwrap();
//!
//! exchange
//!     .place_order(OrderRequest::limit(
//!         seller,
//!         "SBER",
//!         Direction::Ask,
//!         Decimal::from(10),
//!         Decimal::from(95),
//!     ))
//!     .unwrap();
//!
//! let receipt = exchange
//!     .place_order(OrderRequest::market(buyer, "SBER", Direction::Bid, Decimal::from(4)))
//!     .unwrap();
//! assert_eq!(receipt.status, OrderStatus::Executed);
//!
//! let levels = exchange.get_order_book_levels("SBER", 10).unwrap();
//! println!("Best ask: {:?}", levels.best_ask());
//! println!("Recent trades: {:?}", exchange.get_recent_trades("SBER", 10).unwrap());
//! ```

pub mod domain;
pub mod engine;
pub mod error;
pub mod interfaces;
pub mod numeric;
pub mod utils;

// Re-exports for convenience
pub mod prelude {
    pub use crate::domain::order::state::{OrderStatus, OrderStatusTransition};
    pub use crate::domain::{
        BalanceSheet, Direction, ExchangeConfig, Holding, Instrument, Order, OrderBookSnapshot,
        OrderId, OrderRequest, OrderType, PriceLevel, Role, Transaction, User, UserId,
    };
    pub use crate::engine::{
        create_from_config, Exchange, ExchangeBuilder, PlacementReceipt, PriceTimePriority,
        ResourceId,
    };
    pub use crate::error::{ExchangeError, ExchangeResult};
    pub use crate::interfaces::{
        EventHandler, ExchangeEvent, LoggingEventHandler, MatchingAlgorithm, NoOpEventHandler,
        RecordingEventHandler,
    };
}
