// ============================================================================
// Engine Module
// Contains the matching, settlement and locking business logic
// ============================================================================

mod exchange;
mod ledger;
mod lifecycle;
mod lock_manager;
mod market;
mod matching_engine;
mod price_time;

pub mod factory;

pub use exchange::Exchange;
pub use factory::{create_from_config, ExchangeBuilder};
pub use ledger::{Ledger, LedgerTx, Settlement};
pub use lifecycle::PlacementReceipt;
pub use lock_manager::{LockManager, ResourceGuard, ResourceId};
pub use market::{Listing, Market};
pub use matching_engine::{MatchOutcome, MatchingEngine};
pub use price_time::PriceTimePriority;
