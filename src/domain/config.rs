// ============================================================================
// Exchange Configuration
// Settlement currency, lock waiting policy and query limits
// ============================================================================

use std::time::Duration;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Environment variable naming the settlement currency ticker
pub const BASE_CURRENCY_ENV: &str = "BASE_INSTRUMENT_TICKER";

/// Environment variable bounding the wait for resource locks, in milliseconds
pub const LOCK_TIMEOUT_ENV: &str = "EXCHANGE_LOCK_TIMEOUT_MS";

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ExchangeConfig {
    /// Ticker of the base currency every instrument is priced in
    pub base_currency: String,

    /// Optional: how long `place`/`cancel` may wait for their locks.
    /// None waits indefinitely. Once the locks are held the operation always
    /// runs to completion.
    pub lock_timeout: Option<Duration>,

    /// Upper bound on the depth returned by order book queries
    pub max_book_depth: usize,

    /// Number of recent trades kept per instrument
    pub trade_tape_capacity: usize,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            base_currency: "RUB".to_string(),
            lock_timeout: None,
            max_book_depth: 50,
            trade_tape_capacity: 10_000,
        }
    }
}

impl ExchangeConfig {
    pub fn new(base_currency: impl Into<String>) -> Self {
        Self {
            base_currency: base_currency.into(),
            ..Self::default()
        }
    }

    /// Builder method: Bound the lock wait of order operations
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = Some(timeout);
        self
    }

    /// Builder method: Set maximum order book query depth
    pub fn with_max_book_depth(mut self, depth: usize) -> Self {
        self.max_book_depth = depth;
        self
    }

    /// Builder method: Set per-instrument trade history size
    pub fn with_trade_tape_capacity(mut self, capacity: usize) -> Self {
        self.trade_tape_capacity = capacity;
        self
    }

    /// Defaults overridden by `BASE_INSTRUMENT_TICKER` and
    /// `EXCHANGE_LOCK_TIMEOUT_MS` when they are set.
    pub fn from_env() -> Result<Self, String> {
        let mut config = Self::default();

        if let Ok(ticker) = std::env::var(BASE_CURRENCY_ENV) {
            config.base_currency = ticker;
        }

        if let Ok(raw) = std::env::var(LOCK_TIMEOUT_ENV) {
            let millis: u64 = raw
                .trim()
                .parse()
                .map_err(|e| format!("{} must be milliseconds: {}", LOCK_TIMEOUT_ENV, e))?;
            config.lock_timeout = Some(Duration::from_millis(millis));
        }

        config.validate()?;
        Ok(config)
    }

    #[cfg(feature = "serde")]
    pub fn from_json(json: &str) -> Result<Self, String> {
        let config: Self = serde_json::from_str(json).map_err(|e| e.to_string())?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.base_currency.trim().is_empty() {
            return Err("Base currency cannot be empty".to_string());
        }

        if self.max_book_depth == 0 {
            return Err("Maximum book depth must be positive".to_string());
        }

        if self.trade_tape_capacity == 0 {
            return Err("Trade tape capacity must be positive".to_string());
        }

        if let Some(timeout) = self.lock_timeout {
            if timeout.is_zero() {
                return Err("Lock timeout must be positive".to_string());
            }
        }

        Ok(())
    }
}
