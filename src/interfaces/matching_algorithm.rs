// ============================================================================
// Matching Algorithm Interface
// Defines the contract for pluggable matching algorithms
// ============================================================================

use crate::domain::{Direction, Order, OrderBookSide, OrderId, UserId};
use crate::numeric::{checked_sum, notional, Amount, NumericResult, Price, Quantity};
use rust_decimal::Decimal;

/// One planned execution against a resting order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fill {
    pub maker_order_id: OrderId,
    pub maker_user_id: UserId,
    /// Execution price, the maker's limit
    pub price: Price,
    pub quantity: Quantity,
}

/// Fills an incoming order would get against the book as it stands.
///
/// A plan is computed without touching the book or the ledger, so it can be
/// rejected at no cost.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MatchPlan {
    pub fills: Vec<Fill>,
}

impl MatchPlan {
    /// Total quantity covered by the plan
    pub fn filled(&self) -> Quantity {
        self.fills.iter().map(|fill| fill.quantity).sum()
    }

    /// Base-currency value of all fills at maker prices
    pub fn notional(&self) -> NumericResult<Amount> {
        self.fills.iter().try_fold(Decimal::ZERO, |total, fill| {
            checked_sum(total, notional(fill.quantity, fill.price)?)
        })
    }

    pub fn is_empty(&self) -> bool {
        self.fills.is_empty()
    }
}

/// Strategy pattern interface for matching algorithms
pub trait MatchingAlgorithm: Send + Sync {
    /// Plan the fills of `incoming` against the opposite side of the book.
    ///
    /// # Arguments
    /// * `incoming` - The new order to match
    /// * `opposite_side` - The opposite side of the order book
    fn plan(&self, incoming: &Order, opposite_side: &OrderBookSide) -> MatchPlan;

    /// Get the algorithm name for logging
    fn name(&self) -> &str;

    /// Whether a resting price is acceptable to `incoming`. Market orders
    /// accept any price.
    fn prices_cross(&self, incoming: &Order, book_price: Price) -> bool {
        match (incoming.direction, incoming.price) {
            (_, None) => true,
            (Direction::Bid, Some(limit)) => limit >= book_price,
            (Direction::Ask, Some(limit)) => limit <= book_price,
        }
    }
}
