// ============================================================================
// Order Book Domain Model
// ============================================================================

use crate::error::{ExchangeError, ExchangeResult};
use crate::numeric::{checked_sum, NumericResult, Price, Quantity};
use rust_decimal::Decimal;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

use super::{Direction, Order, OrderId, UserId};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

// ============================================================================
// Priority Key
// ============================================================================

/// Position of a resting order within its side of the book.
///
/// Asks sort by price ascending, bids by price descending; ties go to the
/// lower placement sequence in both cases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriorityKey {
    direction: Direction,
    price: Price,
    sequence: u64,
}

impl PriorityKey {
    pub fn new(direction: Direction, price: Price, sequence: u64) -> Self {
        Self {
            direction,
            price,
            sequence,
        }
    }

    pub fn price(&self) -> Price {
        self.price
    }
}

impl Ord for PriorityKey {
    fn cmp(&self, other: &Self) -> Ordering {
        let by_price = match self.direction {
            Direction::Ask => self.price.cmp(&other.price),
            Direction::Bid => other.price.cmp(&self.price),
        };
        self.direction
            .cmp(&other.direction)
            .then(by_price)
            .then(self.sequence.cmp(&other.sequence))
    }
}

impl PartialOrd for PriorityKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// ============================================================================
// Order Book Side
// ============================================================================

/// One side of the book: resting orders kept in priority order.
#[derive(Debug)]
pub struct OrderBookSide {
    pub direction: Direction,
    entries: BTreeMap<PriorityKey, Order>,
    index: HashMap<OrderId, PriorityKey>,
}

impl OrderBookSide {
    pub fn new(direction: Direction) -> Self {
        Self {
            direction,
            entries: BTreeMap::new(),
            index: HashMap::new(),
        }
    }

    fn insert(&mut self, order: Order) -> ExchangeResult<()> {
        let price = order.price.ok_or_else(|| {
            ExchangeError::invariant(format!("market order {} cannot rest", order.id))
        })?;
        if order.direction != self.direction || order.status().is_terminal() {
            return Err(ExchangeError::invariant(format!(
                "order {} ({:?}, {:?}) does not belong on the {:?} side",
                order.id,
                order.direction,
                order.status(),
                self.direction
            )));
        }

        let key = PriorityKey::new(self.direction, price, order.sequence);
        if self.index.insert(order.id, key).is_some() {
            return Err(ExchangeError::invariant(format!(
                "order {} is already resting",
                order.id
            )));
        }
        self.entries.insert(key, order);
        Ok(())
    }

    fn remove(&mut self, order_id: &OrderId) -> Option<Order> {
        let key = self.index.remove(order_id)?;
        self.entries.remove(&key)
    }

    fn get(&self, order_id: &OrderId) -> Option<&Order> {
        self.index.get(order_id).and_then(|key| self.entries.get(key))
    }

    fn get_mut(&mut self, order_id: &OrderId) -> Option<&mut Order> {
        let key = self.index.get(order_id)?;
        self.entries.get_mut(key)
    }

    /// Best resting order on this side
    pub fn best(&self) -> Option<&Order> {
        self.entries.values().next()
    }

    /// Resting orders in priority order
    pub fn iter(&self) -> impl Iterator<Item = &Order> + '_ {
        self.entries.values()
    }

    /// Resting quantity aggregated per price, best price first
    pub fn get_depth(&self, num_levels: usize) -> NumericResult<Vec<PriceLevel>> {
        let mut levels: Vec<PriceLevel> = Vec::new();

        for (key, order) in &self.entries {
            match levels.last_mut() {
                Some(level) if level.price == key.price => {
                    level.quantity = checked_sum(level.quantity, order.remaining_qty())?;
                    level.orders += 1;
                },
                _ => {
                    if levels.len() == num_levels {
                        break;
                    }
                    levels.push(PriceLevel {
                        price: key.price,
                        quantity: order.remaining_qty(),
                        orders: 1,
                    });
                },
            }
        }

        Ok(levels)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ============================================================================
// Order Book
// ============================================================================

/// Resting limit orders of one instrument.
#[derive(Debug)]
pub struct OrderBook {
    ticker: String,
    bids: OrderBookSide,
    asks: OrderBookSide,
}

impl OrderBook {
    pub fn new(ticker: String) -> Self {
        Self {
            ticker,
            bids: OrderBookSide::new(Direction::Bid),
            asks: OrderBookSide::new(Direction::Ask),
        }
    }

    pub fn ticker(&self) -> &str {
        &self.ticker
    }

    pub fn side(&self, direction: Direction) -> &OrderBookSide {
        match direction {
            Direction::Bid => &self.bids,
            Direction::Ask => &self.asks,
        }
    }

    fn side_mut(&mut self, direction: Direction) -> &mut OrderBookSide {
        match direction {
            Direction::Bid => &mut self.bids,
            Direction::Ask => &mut self.asks,
        }
    }

    /// Rest a non-terminal limit order on its own side.
    pub fn insert(&mut self, order: Order) -> ExchangeResult<()> {
        if order.ticker != self.ticker {
            return Err(ExchangeError::invariant(format!(
                "order {} for {} inserted into the {} book",
                order.id, order.ticker, self.ticker
            )));
        }
        self.side_mut(order.direction).insert(order)
    }

    /// Take an order out of the book, wherever it rests.
    pub fn remove(&mut self, order_id: &OrderId) -> Option<Order> {
        self.bids
            .remove(order_id)
            .or_else(|| self.asks.remove(order_id))
    }

    pub fn get(&self, order_id: &OrderId) -> Option<&Order> {
        self.bids.get(order_id).or_else(|| self.asks.get(order_id))
    }

    /// Execute `quantity` of a resting order. A fully executed order leaves
    /// the book and is handed back to the caller.
    pub fn fill(&mut self, order_id: &OrderId, quantity: Quantity) -> ExchangeResult<Option<Order>> {
        let direction = self
            .get(order_id)
            .map(|order| order.direction)
            .ok_or_else(|| ExchangeError::invariant(format!("order {} is not resting", order_id)))?;

        let side = self.side_mut(direction);
        let order = side
            .get_mut(order_id)
            .ok_or_else(|| ExchangeError::invariant(format!("order {} is not resting", order_id)))?;
        order.fill(quantity)?;

        if order.status().is_terminal() {
            Ok(side.remove(order_id))
        } else {
            Ok(None)
        }
    }

    pub fn peek_best(&self, direction: Direction) -> Option<&Order> {
        self.side(direction).best()
    }

    /// Resting orders of one side in priority order. The iterator borrows the
    /// book, so calling again restarts from the current best.
    pub fn iter(&self, direction: Direction) -> impl Iterator<Item = &Order> + '_ {
        self.side(direction).iter()
    }

    pub fn top_levels(&self, direction: Direction, depth: usize) -> NumericResult<Vec<PriceLevel>> {
        self.side(direction).get_depth(depth)
    }

    /// Resting orders placed by `user_id`, both sides.
    pub fn orders_of(&self, user_id: UserId) -> impl Iterator<Item = &Order> + '_ {
        self.bids
            .iter()
            .chain(self.asks.iter())
            .filter(move |order| order.user_id == user_id)
    }

    /// Remove and return every resting order.
    pub fn drain(&mut self) -> Vec<Order> {
        let mut drained: Vec<Order> = std::mem::take(&mut self.bids.entries)
            .into_values()
            .collect();
        drained.extend(std::mem::take(&mut self.asks.entries).into_values());
        self.bids.index.clear();
        self.asks.index.clear();
        drained
    }

    pub fn snapshot(&self, depth: usize) -> NumericResult<OrderBookSnapshot> {
        Ok(OrderBookSnapshot::with_depth(
            self.ticker.clone(),
            self.top_levels(Direction::Bid, depth)?,
            self.top_levels(Direction::Ask, depth)?,
        ))
    }

    pub fn len(&self) -> usize {
        self.bids.len() + self.asks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bids.is_empty() && self.asks.is_empty()
    }
}

// ============================================================================
// Order Book Snapshot
// ============================================================================

/// Resting quantity at one price.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PriceLevel {
    pub price: Price,
    pub quantity: Quantity,
    pub orders: usize,
}

/// Immutable snapshot of the order book state
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct OrderBookSnapshot {
    pub ticker: String,
    /// Bid levels, price descending
    pub bids: Vec<PriceLevel>,
    /// Ask levels, price ascending
    pub asks: Vec<PriceLevel>,
    /// Current spread (ask - bid)
    pub spread: Option<Decimal>,
}

impl OrderBookSnapshot {
    pub fn with_depth(ticker: String, bids: Vec<PriceLevel>, asks: Vec<PriceLevel>) -> Self {
        let spread = match (bids.first(), asks.first()) {
            (Some(bid), Some(ask)) => Some(ask.price - bid.price),
            _ => None,
        };

        Self {
            ticker,
            bids,
            asks,
            spread,
        }
    }

    pub fn best_bid(&self) -> Option<Price> {
        self.bids.first().map(|level| level.price)
    }

    pub fn best_ask(&self) -> Option<Price> {
        self.asks.first().map(|level| level.price)
    }

    pub fn total_bid_quantity(&self) -> NumericResult<Quantity> {
        total_quantity(&self.bids)
    }

    pub fn total_ask_quantity(&self) -> NumericResult<Quantity> {
        total_quantity(&self.asks)
    }
}

fn total_quantity(levels: &[PriceLevel]) -> NumericResult<Quantity> {
    levels
        .iter()
        .try_fold(Decimal::ZERO, |total, level| checked_sum(total, level.quantity))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{OrderRequest, OrderStatus};
    use crate::numeric::NumericError;
    use rust_decimal_macros::dec;

    fn resting(direction: Direction, price: Decimal, quantity: Decimal, sequence: u64) -> Order {
        let request = OrderRequest::limit(UserId::new(), "SBER", direction, quantity, price);
        Order::new(&request, sequence)
    }

    #[test]
    fn test_ask_side_price_time_priority() {
        let mut book = OrderBook::new("SBER".to_string());
        let late_cheap = resting(Direction::Ask, dec!(100), dec!(1), 3);
        let early = resting(Direction::Ask, dec!(101), dec!(1), 1);
        let late = resting(Direction::Ask, dec!(101), dec!(1), 2);
        let ids = [late_cheap.id, early.id, late.id];

        book.insert(late).unwrap();
        book.insert(early).unwrap();
        book.insert(late_cheap).unwrap();

        let order: Vec<OrderId> = book.iter(Direction::Ask).map(|o| o.id).collect();
        assert_eq!(order, ids);
        assert_eq!(book.peek_best(Direction::Ask).unwrap().id, ids[0]);
    }

    #[test]
    fn test_bid_side_best_price_is_highest() {
        let mut book = OrderBook::new("SBER".to_string());
        book.insert(resting(Direction::Bid, dec!(50000), dec!(1), 1)).unwrap();
        book.insert(resting(Direction::Bid, dec!(50100), dec!(1), 2)).unwrap();

        assert_eq!(book.peek_best(Direction::Bid).unwrap().price, Some(dec!(50100)));
        assert!(book.peek_best(Direction::Ask).is_none());
    }

    #[test]
    fn test_iteration_is_restartable() {
        let mut book = OrderBook::new("SBER".to_string());
        for seq in 0..4 {
            book.insert(resting(Direction::Ask, dec!(10) + Decimal::from(seq), dec!(1), seq))
                .unwrap();
        }

        let first: Vec<_> = book.iter(Direction::Ask).take(2).map(|o| o.id).collect();
        let again: Vec<_> = book.iter(Direction::Ask).take(2).map(|o| o.id).collect();
        assert_eq!(first, again);
        assert_eq!(book.iter(Direction::Ask).count(), 4);
    }

    #[test]
    fn test_fill_and_remove() {
        let mut book = OrderBook::new("SBER".to_string());
        let order = resting(Direction::Ask, dec!(10), dec!(5), 1);
        let id = order.id;
        book.insert(order).unwrap();

        assert!(book.fill(&id, dec!(2)).unwrap().is_none());
        assert_eq!(book.get(&id).unwrap().status(), OrderStatus::PartiallyExecuted);

        let done = book.fill(&id, dec!(3)).unwrap().unwrap();
        assert_eq!(done.status(), OrderStatus::Executed);
        assert!(book.get(&id).is_none());
        assert!(book.is_empty());
    }

    #[test]
    fn test_rejects_market_and_foreign_orders() {
        let mut book = OrderBook::new("SBER".to_string());
        let market = Order::new(
            &OrderRequest::market(UserId::new(), "SBER", Direction::Bid, dec!(1)),
            1,
        );
        assert!(book.insert(market).unwrap_err().is_fatal());

        let foreign = Order::new(
            &OrderRequest::limit(UserId::new(), "GAZP", Direction::Bid, dec!(1), dec!(1)),
            2,
        );
        assert!(book.insert(foreign).is_err());
    }

    #[test]
    fn test_top_levels_aggregate_by_price() {
        let mut book = OrderBook::new("SBER".to_string());
        book.insert(resting(Direction::Bid, dec!(99), dec!(2), 1)).unwrap();
        book.insert(resting(Direction::Bid, dec!(100), dec!(1), 2)).unwrap();
        book.insert(resting(Direction::Bid, dec!(100), dec!(4), 3)).unwrap();
        book.insert(resting(Direction::Bid, dec!(98), dec!(7), 4)).unwrap();

        let levels = book.top_levels(Direction::Bid, 2).unwrap();
        assert_eq!(
            levels,
            vec![
                PriceLevel {
                    price: dec!(100),
                    quantity: dec!(5),
                    orders: 2
                },
                PriceLevel {
                    price: dec!(99),
                    quantity: dec!(2),
                    orders: 1
                },
            ]
        );
    }

    #[test]
    fn test_level_overflow_is_an_error() {
        let mut book = OrderBook::new("SBER".to_string());
        let half = Decimal::MAX / dec!(2) + dec!(1);
        book.insert(resting(Direction::Ask, dec!(10), half, 1)).unwrap();
        book.insert(resting(Direction::Ask, dec!(10), half, 2)).unwrap();

        assert_eq!(book.top_levels(Direction::Ask, 5), Err(NumericError::Overflow));
        assert!(book.snapshot(5).is_err());
        assert_eq!(book.top_levels(Direction::Bid, 5).unwrap(), Vec::new());
    }

    #[test]
    fn test_order_book_snapshot() {
        let snapshot = OrderBookSnapshot::with_depth(
            "SBER".to_string(),
            vec![PriceLevel {
                price: dec!(50000),
                quantity: dec!(1),
                orders: 1,
            }],
            vec![PriceLevel {
                price: dec!(50100),
                quantity: dec!(2),
                orders: 1,
            }],
        );

        assert_eq!(snapshot.best_bid(), Some(dec!(50000)));
        assert_eq!(snapshot.best_ask(), Some(dec!(50100)));
        assert_eq!(snapshot.spread, Some(dec!(100)));
    }

    #[test]
    fn test_drain_empties_both_sides() {
        let mut book = OrderBook::new("SBER".to_string());
        book.insert(resting(Direction::Bid, dec!(1), dec!(1), 1)).unwrap();
        book.insert(resting(Direction::Ask, dec!(2), dec!(1), 2)).unwrap();

        assert_eq!(book.drain().len(), 2);
        assert!(book.is_empty());
        assert_eq!(book.len(), 0);
    }
}
