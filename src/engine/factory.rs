// ============================================================================
// Exchange Factory
// Creates exchanges from configuration
// ============================================================================

use crate::domain::ExchangeConfig;
use crate::engine::exchange::Exchange;
use crate::engine::matching_engine::MatchingEngine;
use crate::engine::price_time::PriceTimePriority;
use crate::interfaces::{EventHandler, MatchingAlgorithm, NoOpEventHandler};
use std::sync::Arc;
use std::time::Duration;

/// Create an exchange with price/time matching from a configuration
pub fn create_from_config(
    config: ExchangeConfig,
    event_handler: Arc<dyn EventHandler>,
) -> Result<Exchange, String> {
    ExchangeBuilder::from_config(config)
        .with_event_handler(event_handler)
        .build()
}

// ============================================================================
// Builder Pattern for Advanced Configuration
// ============================================================================

/// Builder for creating exchanges with fluent API
///
/// # Example
/// ```
/// use exchange_engine::engine::ExchangeBuilder;
/// use exchange_engine::interfaces::LoggingEventHandler;
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// let exchange = ExchangeBuilder::new("RUB")
///     .with_lock_timeout(Duration::from_millis(500))
///     .with_max_book_depth(20)
///     .with_event_handler(Arc::new(LoggingEventHandler))
///     .build()
///     .unwrap();
///
/// assert_eq!(exchange.base_currency(), "RUB");
/// ```
pub struct ExchangeBuilder {
    config: ExchangeConfig,
    algorithm: Option<Box<dyn MatchingAlgorithm>>,
    event_handler: Arc<dyn EventHandler>,
}

impl ExchangeBuilder {
    /// Create a new builder settling in `base_currency`
    pub fn new(base_currency: impl Into<String>) -> Self {
        Self::from_config(ExchangeConfig::new(base_currency))
    }

    pub fn from_config(config: ExchangeConfig) -> Self {
        Self {
            config,
            algorithm: None,
            event_handler: Arc::new(NoOpEventHandler),
        }
    }

    // ========================================================================
    // Matching Algorithm Configuration
    // ========================================================================

    /// Configure price/time priority (FIFO) matching (default)
    pub fn price_time_matching(mut self) -> Self {
        self.algorithm = Some(Box::new(PriceTimePriority::new()));
        self
    }

    pub fn with_algorithm(mut self, algorithm: Box<dyn MatchingAlgorithm>) -> Self {
        self.algorithm = Some(algorithm);
        self
    }

    // ========================================================================
    // Additional Configuration
    // ========================================================================

    /// Bound how long placements and cancellations wait for their locks
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.config = self.config.with_lock_timeout(timeout);
        self
    }

    /// Set maximum order book query depth
    pub fn with_max_book_depth(mut self, depth: usize) -> Self {
        self.config = self.config.with_max_book_depth(depth);
        self
    }

    /// Set per-instrument trade history size
    pub fn with_trade_tape_capacity(mut self, capacity: usize) -> Self {
        self.config = self.config.with_trade_tape_capacity(capacity);
        self
    }

    pub fn with_event_handler(mut self, event_handler: Arc<dyn EventHandler>) -> Self {
        self.event_handler = event_handler;
        self
    }

    // ========================================================================
    // Build
    // ========================================================================

    /// Validate the configuration and build the exchange
    pub fn build(self) -> Result<Exchange, String> {
        self.config.validate()?;
        let algorithm = self
            .algorithm
            .unwrap_or_else(|| Box::new(PriceTimePriority::new()));

        tracing::info!(
            base_currency = %self.config.base_currency,
            algorithm = algorithm.name(),
            "exchange created"
        );
        Ok(Exchange::new(
            self.config,
            MatchingEngine::new(algorithm),
            self.event_handler,
        ))
    }

    /// Get the configuration without building (for inspection)
    pub fn get_config(&self) -> &ExchangeConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_from_config() {
        let config = ExchangeConfig::new("USD").with_trade_tape_capacity(10);
        let exchange = create_from_config(config, Arc::new(NoOpEventHandler)).unwrap();

        assert_eq!(exchange.base_currency(), "USD");
        assert_eq!(exchange.config().trade_tape_capacity, 10);
        assert_eq!(exchange.algorithm_name(), "PriceTime");
    }

    #[test]
    fn test_builder_pattern() {
        let builder = ExchangeBuilder::new("RUB")
            .price_time_matching()
            .with_lock_timeout(Duration::from_millis(100))
            .with_max_book_depth(5);

        assert_eq!(builder.get_config().max_book_depth, 5);
        let exchange = builder.build().unwrap();
        assert_eq!(exchange.config().lock_timeout, Some(Duration::from_millis(100)));
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        assert!(ExchangeBuilder::new("").build().is_err());
        assert!(ExchangeBuilder::new("RUB")
            .with_trade_tape_capacity(0)
            .build()
            .is_err());
    }
}
