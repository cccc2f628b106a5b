// ============================================================================
// Trade Domain Model
// ============================================================================

use crate::numeric::{notional, NumericResult, Amount, Price, Quantity};
use chrono::{DateTime, Utc};
use crossbeam_skiplist::SkipMap;
use uuid::Uuid;

use super::{OrderId, UserId};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// An executed trade. Append-only: created once per fill, never mutated.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Transaction {
    /// Unique trade identifier
    pub id: Uuid,

    /// Exchange-wide execution sequence
    pub sequence: u64,

    pub ticker: String,

    /// Order ID of the passive order (resting in book)
    pub maker_order_id: OrderId,

    /// Order ID of the aggressive order (incoming)
    pub taker_order_id: OrderId,

    pub buyer_id: UserId,
    pub seller_id: UserId,

    /// Execution price, always the maker's limit
    pub price: Price,

    /// Executed quantity
    pub quantity: Quantity,

    /// Trade timestamp
    pub timestamp: DateTime<Utc>,
}

impl Transaction {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        sequence: u64,
        ticker: String,
        maker_order_id: OrderId,
        taker_order_id: OrderId,
        buyer_id: UserId,
        seller_id: UserId,
        price: Price,
        quantity: Quantity,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            sequence,
            ticker,
            maker_order_id,
            taker_order_id,
            buyer_id,
            seller_id,
            price,
            quantity,
            timestamp: Utc::now(),
        }
    }

    /// Base-currency value moved by the trade (price * quantity)
    pub fn notional_value(&self) -> NumericResult<Amount> {
        notional(self.quantity, self.price)
    }
}

// ============================================================================
// Trade Tape
// ============================================================================

/// Bounded log of recent trades for one instrument.
///
/// Appends happen under the instrument lock; reads go straight to the skip
/// list and never wait for matching to finish.
#[derive(Debug)]
pub struct TradeTape {
    trades: SkipMap<u64, Transaction>,
    capacity: usize,
}

impl TradeTape {
    pub fn new(capacity: usize) -> Self {
        Self {
            trades: SkipMap::new(),
            capacity,
        }
    }

    pub fn record(&self, trade: Transaction) {
        self.trades.insert(trade.sequence, trade);
        while self.trades.len() > self.capacity {
            if self.trades.pop_front().is_none() {
                break;
            }
        }
    }

    /// Up to `limit` trades, most recent first.
    pub fn recent(&self, limit: usize) -> Vec<Transaction> {
        self.trades
            .iter()
            .rev()
            .take(limit)
            .map(|entry| entry.value().clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.trades.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trades.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn trade(sequence: u64, price: Price, quantity: Quantity) -> Transaction {
        Transaction::new(
            sequence,
            "SBER".to_string(),
            OrderId::new(),
            OrderId::new(),
            UserId::new(),
            UserId::new(),
            price,
            quantity,
        )
    }

    #[test]
    fn test_trade_creation() {
        let trade = trade(1, dec!(50000), dec!(1));

        assert_eq!(trade.ticker, "SBER");
        assert_eq!(trade.notional_value().unwrap(), dec!(50000));
    }

    #[test]
    fn test_notional_value_with_fractional() {
        // 100.5 * 2 = 201.0
        assert_eq!(
            trade(1, dec!(100.5), dec!(2)).notional_value().unwrap(),
            dec!(201)
        );
    }

    #[test]
    fn test_tape_most_recent_first() {
        let tape = TradeTape::new(10);
        for seq in 1..=4 {
            tape.record(trade(seq, dec!(10), dec!(1)));
        }

        let recent: Vec<u64> = tape.recent(3).iter().map(|t| t.sequence).collect();
        assert_eq!(recent, vec![4, 3, 2]);
    }

    #[test]
    fn test_tape_is_bounded() {
        let tape = TradeTape::new(2);
        for seq in 1..=5 {
            tape.record(trade(seq, dec!(10), dec!(1)));
        }

        assert_eq!(tape.len(), 2);
        let recent: Vec<u64> = tape.recent(10).iter().map(|t| t.sequence).collect();
        assert_eq!(recent, vec![5, 4]);
    }
}
