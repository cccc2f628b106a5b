// ============================================================================
// Account Domain Model
// Users, instruments and ledger holdings
// ============================================================================

use crate::numeric::{checked_diff, checked_sum, Amount, NumericResult};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

// ============================================================================
// Value Objects
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct UserId(Uuid);

impl UserId {
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

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Role {
    #[default]
    User,
    Admin,
}

/// A registered trader. Balances live in the ledger, not here.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub role: Role,
    pub registered_at: DateTime<Utc>,
}

impl User {
    pub fn new(name: String, role: Role) -> Self {
        Self {
            id: UserId::new(),
            name,
            role,
            registered_at: Utc::now(),
        }
    }
}

/// A tradable instrument, priced in the base currency.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Instrument {
    pub ticker: String,
    pub name: String,
}

impl Instrument {
    pub fn new(ticker: String, name: String) -> Self {
        Self { ticker, name }
    }
}

// ============================================================================
// Holding
// ============================================================================

/// One ledger cell: the spendable part and the part reserved by open orders.
///
/// Both parts are kept non-negative by every operation; a failed operation
/// leaves the holding untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Holding {
    available: Amount,
    frozen: Amount,
}

/// Why a holding refused an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HoldingError {
    /// Not enough available (unreserved) amount
    Insufficient { available: Amount },
    /// Attempt to release or consume more than is reserved
    ReserveExceeded { frozen: Amount },
    /// Amount was negative where a magnitude was expected
    NegativeAmount,
    Overflow,
}

impl From<crate::numeric::NumericError> for HoldingError {
    fn from(_: crate::numeric::NumericError) -> Self {
        HoldingError::Overflow
    }
}

impl Holding {
    pub const EMPTY: Self = Self {
        available: Decimal::ZERO,
        frozen: Decimal::ZERO,
    };

    pub fn new(available: Amount, frozen: Amount) -> Self {
        Self { available, frozen }
    }

    pub fn available(&self) -> Amount {
        self.available
    }

    pub fn frozen(&self) -> Amount {
        self.frozen
    }

    /// Available plus frozen.
    pub fn total(&self) -> NumericResult<Amount> {
        checked_sum(self.available, self.frozen)
    }

    pub fn is_empty(&self) -> bool {
        self.available.is_zero() && self.frozen.is_zero()
    }

    /// Add `delta` (either sign) to the available part.
    pub fn apply_delta(&mut self, delta: Amount) -> Result<Amount, HoldingError> {
        let next = checked_sum(self.available, delta)?;
        if next < Decimal::ZERO {
            return Err(HoldingError::Insufficient {
                available: self.available,
            });
        }
        self.available = next;
        Ok(next)
    }

    /// Move `amount` from available to frozen.
    pub fn freeze(&mut self, amount: Amount) -> Result<(), HoldingError> {
        Self::check_magnitude(amount)?;
        if self.available < amount {
            return Err(HoldingError::Insufficient {
                available: self.available,
            });
        }
        let frozen = checked_sum(self.frozen, amount)?;
        self.available = checked_diff(self.available, amount)?;
        self.frozen = frozen;
        Ok(())
    }

    /// Move `amount` from frozen back to available.
    pub fn unfreeze(&mut self, amount: Amount) -> Result<(), HoldingError> {
        Self::check_magnitude(amount)?;
        if self.frozen < amount {
            return Err(HoldingError::ReserveExceeded {
                frozen: self.frozen,
            });
        }
        let available = checked_sum(self.available, amount)?;
        self.frozen = checked_diff(self.frozen, amount)?;
        self.available = available;
        Ok(())
    }

    /// Remove `amount` from the frozen part (it leaves the holding).
    pub fn consume_frozen(&mut self, amount: Amount) -> Result<(), HoldingError> {
        Self::check_magnitude(amount)?;
        if self.frozen < amount {
            return Err(HoldingError::ReserveExceeded {
                frozen: self.frozen,
            });
        }
        self.frozen = checked_diff(self.frozen, amount)?;
        Ok(())
    }

    /// Add `amount` to the available part.
    pub fn credit(&mut self, amount: Amount) -> Result<(), HoldingError> {
        Self::check_magnitude(amount)?;
        self.available = checked_sum(self.available, amount)?;
        Ok(())
    }

    fn check_magnitude(amount: Amount) -> Result<(), HoldingError> {
        if amount < Decimal::ZERO {
            Err(HoldingError::NegativeAmount)
        } else {
            Ok(())
        }
    }
}

// ============================================================================
// Balance Sheet
// ============================================================================

/// Read-only view of every holding of one user.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BalanceSheet {
    pub user_id: UserId,
    pub base_currency: String,
    pub currency: Holding,
    pub instruments: BTreeMap<String, Holding>,
}

impl BalanceSheet {
    pub fn instrument(&self, ticker: &str) -> Option<Holding> {
        self.instruments.get(ticker).copied()
    }
}
