// ============================================================================
// Interfaces Module
// Contains all trait definitions and contracts
// ============================================================================

mod event_handler;
mod matching_algorithm;

pub use event_handler::{
    EventHandler, ExchangeEvent, LoggingEventHandler, NoOpEventHandler, RecordingEventHandler,
};
pub use matching_algorithm::{Fill, MatchPlan, MatchingAlgorithm};
