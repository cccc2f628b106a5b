// ============================================================================
// Market
// Per-instrument order state: the live book plus finished order records
// ============================================================================

use crate::domain::{Direction, Instrument, Order, OrderBook, OrderId, TradeTape, UserId};
use parking_lot::Mutex;
use std::collections::HashMap;

/// Orders of one instrument. Resting orders live in the book; orders that
/// reached a terminal state are kept in the archive.
#[derive(Debug)]
pub struct Market {
    pub book: OrderBook,
    archive: HashMap<OrderId, Order>,
}

impl Market {
    pub fn new(ticker: String) -> Self {
        Self {
            book: OrderBook::new(ticker),
            archive: HashMap::new(),
        }
    }

    pub fn archive(&mut self, order: Order) {
        debug_assert!(order.status().is_terminal());
        self.archive.insert(order.id, order);
    }

    /// Look an order up in the book first, then among finished orders.
    pub fn get(&self, order_id: &OrderId) -> Option<&Order> {
        self.book
            .get(order_id)
            .or_else(|| self.archive.get(order_id))
    }

    pub fn get_archived(&self, order_id: &OrderId) -> Option<&Order> {
        self.archive.get(order_id)
    }

    /// Every order of `user_id`, resting or finished
    pub fn orders_of(&self, user_id: UserId) -> impl Iterator<Item = &Order> + '_ {
        self.book.orders_of(user_id).chain(
            self.archive
                .values()
                .filter(move |order| order.user_id == user_id),
        )
    }

    /// Ids of every order this market knows about
    pub fn order_ids(&self) -> Vec<OrderId> {
        self.book
            .iter(Direction::Bid)
            .chain(self.book.iter(Direction::Ask))
            .map(|order| order.id)
            .chain(self.archive.keys().copied())
            .collect()
    }

    pub fn archived_len(&self) -> usize {
        self.archive.len()
    }
}

/// A listed instrument with its market and trade tape.
#[derive(Debug)]
pub struct Listing {
    pub instrument: Instrument,
    pub market: Mutex<Market>,
    pub tape: TradeTape,
}

impl Listing {
    pub fn new(instrument: Instrument, tape_capacity: usize) -> Self {
        let market = Market::new(instrument.ticker.clone());
        Self {
            instrument,
            market: Mutex::new(market),
            tape: TradeTape::new(tape_capacity),
        }
    }

    pub fn ticker(&self) -> &str {
        &self.instrument.ticker
    }
}
