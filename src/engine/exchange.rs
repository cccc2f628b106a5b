// ============================================================================
// Exchange
// Registries, queries and administrative operations around the matcher
// ============================================================================

use crate::domain::{
    BalanceSheet, Direction, ExchangeConfig, Instrument, Order, OrderBookSnapshot, OrderId, Role,
    Transaction, User, UserId,
};
use crate::engine::ledger::Ledger;
use crate::engine::lock_manager::{LockManager, ResourceGuard, ResourceId};
use crate::engine::market::{Listing, Market};
use crate::engine::matching_engine::{reserve_resource, MatchingEngine};
use crate::error::{ExchangeError, ExchangeResult};
use crate::interfaces::{EventHandler, ExchangeEvent};
use crate::numeric::{checked_sum, within_precision, Amount, AMOUNT_SCALE, QUANTITY_SCALE};
use chrono::Utc;
use parking_lot::RwLock;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::atomic::AtomicU64;
use std::sync::Arc;

/// The exchange: users, listed instruments, their books and the ledger.
///
/// Every operation that mutates a ledger cell or a book first takes the
/// resource locks it needs from the [`LockManager`], in the global order,
/// and holds them until it is done. Events are handed to the
/// [`EventHandler`] after the locks are released.
pub struct Exchange {
    pub(super) config: ExchangeConfig,
    pub(super) locks: LockManager,
    pub(super) ledger: Ledger,
    pub(super) matcher: MatchingEngine,
    pub(super) listings: RwLock<HashMap<String, Arc<Listing>>>,
    pub(super) users: RwLock<HashMap<UserId, User>>,
    /// Ticker of every order ever placed on a listed instrument
    pub(super) order_index: RwLock<HashMap<OrderId, String>>,
    pub(super) order_sequence: AtomicU64,
    pub(super) trade_sequence: AtomicU64,
    pub(super) event_handler: Arc<dyn EventHandler>,
}

impl Exchange {
    /// Create an exchange. See [`crate::engine::ExchangeBuilder`] for a
    /// validated construction path.
    pub fn new(
        config: ExchangeConfig,
        matcher: MatchingEngine,
        event_handler: Arc<dyn EventHandler>,
    ) -> Self {
        let ledger = Ledger::new(config.base_currency.clone());
        Self {
            config,
            locks: LockManager::new(),
            ledger,
            matcher,
            listings: RwLock::new(HashMap::new()),
            users: RwLock::new(HashMap::new()),
            order_index: RwLock::new(HashMap::new()),
            order_sequence: AtomicU64::new(1),
            trade_sequence: AtomicU64::new(1),
            event_handler,
        }
    }

    pub fn config(&self) -> &ExchangeConfig {
        &self.config
    }

    pub fn base_currency(&self) -> &str {
        self.ledger.base_currency()
    }

    pub fn algorithm_name(&self) -> &str {
        self.matcher.algorithm_name()
    }

    // ========================================================================
    // Users
    // ========================================================================

    /// Register a user with zero holdings of the currency and of every listed
    /// instrument.
    pub fn register_user(&self, name: impl Into<String>, role: Role) -> ExchangeResult<UserId> {
        let user = User::new(name.into(), role);
        let user_id = user.id;

        self.ledger.open_account(user_id)?;
        self.users.write().insert(user_id, user);

        tracing::info!(%user_id, ?role, "user registered");
        self.emit(vec![ExchangeEvent::UserRegistered {
            user_id,
            timestamp: Utc::now(),
        }]);
        Ok(user_id)
    }

    pub fn get_user(&self, user_id: UserId) -> ExchangeResult<User> {
        self.users
            .read()
            .get(&user_id)
            .cloned()
            .ok_or(ExchangeError::UnknownUser(user_id))
    }

    /// Cancel every resting order of the user, releasing its reserves, then
    /// close the account. Returns the holdings the account had when closed.
    pub fn remove_user(&self, user_id: UserId) -> ExchangeResult<BalanceSheet> {
        let guard = self.lock_everything();
        if !self.users.read().contains_key(&user_id) {
            return Err(ExchangeError::UnknownUser(user_id));
        }

        let mut events = Vec::new();
        for listing in self.listings_snapshot() {
            let mut market = listing.market.lock();
            let resting: Vec<OrderId> = market.book.orders_of(user_id).map(|order| order.id).collect();
            for order_id in resting {
                let (_, released) = self.release_and_cancel(&guard, &mut market, &order_id)?;
                events.push(ExchangeEvent::OrderCancelled {
                    order_id,
                    released,
                    timestamp: Utc::now(),
                });
            }
        }

        let sheet = self.ledger.close_account(&guard, user_id)?;
        self.users.write().remove(&user_id);
        drop(guard);

        tracing::info!(%user_id, cancelled = events.len(), "user removed");
        events.push(ExchangeEvent::UserRemoved {
            user_id,
            cancelled_orders: events.len(),
            timestamp: Utc::now(),
        });
        self.emit(events);
        Ok(sheet)
    }

    // ========================================================================
    // Instruments
    // ========================================================================

    /// List a new instrument. Every existing user gets a zero holding of it.
    pub fn add_instrument(
        &self,
        ticker: impl Into<String>,
        name: impl Into<String>,
    ) -> ExchangeResult<Instrument> {
        let instrument = Instrument::new(ticker.into(), name.into());
        let ticker = instrument.ticker.clone();
        if ticker == self.base_currency() {
            return Err(ExchangeError::DuplicateInstrument(ticker));
        }

        // Holding the currency lock keeps the instrument set stable for
        // operations that lock everything
        let guard = self
            .locks
            .acquire([ResourceId::Currency, ResourceId::instrument(ticker.as_str())]);
        if self.listings.read().contains_key(&ticker) {
            return Err(ExchangeError::DuplicateInstrument(ticker));
        }

        self.ledger.list_instrument(&guard, &ticker)?;
        let listing = Arc::new(Listing::new(instrument.clone(), self.config.trade_tape_capacity));
        self.listings.write().insert(ticker.clone(), listing);
        drop(guard);

        tracing::info!(%ticker, "instrument listed");
        self.emit(vec![ExchangeEvent::InstrumentListed {
            ticker,
            timestamp: Utc::now(),
        }]);
        Ok(instrument)
    }

    /// Delist an instrument: cancel every resting order (releasing its
    /// reserve), zero all inventory, and drop the book and its lock.
    pub fn remove_instrument(&self, ticker: &str) -> ExchangeResult<Instrument> {
        let listing = self.listing(ticker)?;
        let resource = ResourceId::instrument(ticker);
        let guard = self.locks.acquire([ResourceId::Currency, resource.clone()]);
        if !self.still_listed(&listing) {
            return Err(ExchangeError::UnknownInstrument(ticker.to_string()));
        }

        let mut market = listing.market.lock();
        let reserves = resting_orders(&market)
            .map(|order| Ok((order.user_id, reserve_resource(order), order.reserved_amount()?)))
            .collect::<ExchangeResult<Vec<_>>>()?;
        self.ledger.transaction(&guard, |tx| {
            for (user, resource, amount) in &reserves {
                tx.unfreeze(*user, resource, *amount)?;
            }
            Ok(())
        })?;

        let mut events = Vec::new();
        for mut order in market.book.drain() {
            let released = order.reserved_amount()?;
            order.cancel()?;
            events.push(ExchangeEvent::OrderCancelled {
                order_id: order.id,
                released,
                timestamp: Utc::now(),
            });
            market.archive(order);
        }

        let written_off = self.ledger.delist_instrument(&guard, ticker)?;
        {
            let mut index = self.order_index.write();
            for order_id in market.order_ids() {
                index.remove(&order_id);
            }
        }
        self.listings.write().remove(ticker);
        drop(market);
        drop(guard);
        self.locks.forget(&resource);

        tracing::info!(
            %ticker,
            cancelled = events.len(),
            holders = written_off.len(),
            "instrument delisted"
        );
        events.push(ExchangeEvent::InstrumentDelisted {
            ticker: ticker.to_string(),
            cancelled_orders: events.len(),
            timestamp: Utc::now(),
        });
        self.emit(events);
        Ok(listing.instrument.clone())
    }

    /// Listed instruments sorted by ticker
    pub fn list_instruments(&self) -> Vec<Instrument> {
        let mut instruments: Vec<Instrument> = self
            .listings
            .read()
            .values()
            .map(|listing| listing.instrument.clone())
            .collect();
        instruments.sort_by(|a, b| a.ticker.cmp(&b.ticker));
        instruments
    }

    // ========================================================================
    // Balances
    // ========================================================================

    /// Deposit (positive `delta`) or withdraw (negative `delta`) the base
    /// currency or an instrument. A withdrawal can only take the unreserved
    /// part. Returns the new available amount.
    ///
    /// Cash moves in steps of at most [`AMOUNT_SCALE`] decimal places and
    /// instruments in steps of [`QUANTITY_SCALE`], each no larger than
    /// [`max_magnitude`](crate::numeric::max_magnitude).
    pub fn adjust_balance(&self, user_id: UserId, resource: &str, delta: Amount) -> ExchangeResult<Amount> {
        let resource_id = self.ledger.resource(resource);
        let max_scale = match &resource_id {
            ResourceId::Currency => AMOUNT_SCALE,
            ResourceId::Instrument(ticker) => {
                self.listing(ticker)?;
                QUANTITY_SCALE
            },
        };
        let delta = within_precision(delta, max_scale).map_err(|e| {
            tracing::warn!(%user_id, %resource, %delta, "balance adjustment rejected");
            ExchangeError::InvalidQuantity(format!("{}: {}", delta, e))
        })?;

        let guard = self.locks.acquire([resource_id.clone()]);
        let available = self
            .ledger
            .apply_delta(&guard, user_id, &resource_id, delta)
            .inspect_err(|err| tracing::warn!(%user_id, %resource, %delta, error = %err, "balance adjustment rejected"))?;
        drop(guard);

        tracing::info!(%user_id, %resource, %delta, %available, "balance adjusted");
        self.emit(vec![ExchangeEvent::BalanceAdjusted {
            user_id,
            resource: resource.to_string(),
            delta,
            available,
            timestamp: Utc::now(),
        }]);
        Ok(available)
    }

    pub fn get_balances(&self, user_id: UserId) -> ExchangeResult<BalanceSheet> {
        self.ledger.balances(user_id)
    }

    // ========================================================================
    // Order queries
    // ========================================================================

    pub fn get_order(&self, order_id: OrderId) -> ExchangeResult<Order> {
        let ticker = self
            .order_index
            .read()
            .get(&order_id)
            .cloned()
            .ok_or(ExchangeError::NotFound(order_id))?;
        let listing = self
            .listing(&ticker)
            .map_err(|_| ExchangeError::NotFound(order_id))?;
        let market = listing.market.lock();
        market
            .get(&order_id)
            .cloned()
            .ok_or(ExchangeError::NotFound(order_id))
    }

    /// Every order of a user on listed instruments, in placement order
    pub fn get_user_orders(&self, user_id: UserId) -> ExchangeResult<Vec<Order>> {
        if !self.users.read().contains_key(&user_id) {
            return Err(ExchangeError::UnknownUser(user_id));
        }

        let mut orders = Vec::new();
        for listing in self.listings_snapshot() {
            let market = listing.market.lock();
            orders.extend(market.orders_of(user_id).cloned());
        }
        orders.sort_by_key(|order| order.sequence);
        Ok(orders)
    }

    /// Resting quantity per price on both sides. `depth` is capped by the
    /// configured maximum.
    pub fn get_order_book_levels(&self, ticker: &str, depth: usize) -> ExchangeResult<OrderBookSnapshot> {
        let listing = self.listing(ticker)?;
        let depth = depth.min(self.config.max_book_depth);
        let market = listing.market.lock();
        Ok(market.book.snapshot(depth)?)
    }

    /// Up to `limit` trades, most recent first
    pub fn get_recent_trades(&self, ticker: &str, limit: usize) -> ExchangeResult<Vec<Transaction>> {
        Ok(self.listing(ticker)?.tape.recent(limit))
    }

    // ========================================================================
    // Audit
    // ========================================================================

    /// Check the global invariants with every resource locked: no negative
    /// cell, fill accounting of every resting order, and frozen amounts equal
    /// to the reserves of resting orders.
    pub fn audit(&self) -> ExchangeResult<()> {
        let _guard = self.lock_everything();

        let mut expected: HashMap<(UserId, ResourceId), Amount> = HashMap::new();
        for listing in self.listings_snapshot() {
            let market = listing.market.lock();
            for order in resting_orders(&market) {
                if order.remaining_qty() + order.filled_qty() != order.original_qty {
                    return Err(ExchangeError::invariant(format!(
                        "order {} fill accounting is off",
                        order.id
                    )));
                }
                if order.status().is_terminal() {
                    return Err(ExchangeError::invariant(format!(
                        "terminal order {} is resting",
                        order.id
                    )));
                }
                let slot = expected
                    .entry((order.user_id, reserve_resource(order)))
                    .or_insert(Decimal::ZERO);
                *slot = checked_sum(*slot, order.reserved_amount()?)?;
            }
        }

        for sheet in self.ledger.all_balances() {
            let cells = std::iter::once((ResourceId::Currency, sheet.currency)).chain(
                sheet
                    .instruments
                    .iter()
                    .map(|(ticker, holding)| (ResourceId::instrument(ticker.as_str()), *holding)),
            );
            for (resource, holding) in cells {
                if holding.available() < Decimal::ZERO || holding.frozen() < Decimal::ZERO {
                    return Err(ExchangeError::invariant(format!(
                        "negative {} holding of {}",
                        resource, sheet.user_id
                    )));
                }
                let reserved = expected
                    .remove(&(sheet.user_id, resource.clone()))
                    .unwrap_or(Decimal::ZERO);
                if holding.frozen() != reserved {
                    return Err(ExchangeError::invariant(format!(
                        "{} of {} has {} frozen but {} reserved by resting orders",
                        resource,
                        sheet.user_id,
                        holding.frozen(),
                        reserved
                    )));
                }
            }
        }

        if let Some(((user, resource), _)) = expected.into_iter().next() {
            return Err(ExchangeError::invariant(format!(
                "resting order of {} reserves {} without a ledger cell",
                user, resource
            )));
        }
        Ok(())
    }

    // ========================================================================
    // Internals
    // ========================================================================

    pub(super) fn listing(&self, ticker: &str) -> ExchangeResult<Arc<Listing>> {
        self.listings
            .read()
            .get(ticker)
            .cloned()
            .ok_or_else(|| ExchangeError::UnknownInstrument(ticker.to_string()))
    }

    /// Whether `listing` is still the live listing of its ticker. Checked
    /// after the locks are taken, since a delisting may have run in between.
    pub(super) fn still_listed(&self, listing: &Arc<Listing>) -> bool {
        self.listings
            .read()
            .get(listing.ticker())
            .is_some_and(|live| Arc::ptr_eq(live, listing))
    }

    fn listings_snapshot(&self) -> Vec<Arc<Listing>> {
        self.listings.read().values().cloned().collect()
    }

    fn all_resources(&self) -> Vec<ResourceId> {
        std::iter::once(ResourceId::Currency)
            .chain(
                self.listings
                    .read()
                    .keys()
                    .map(|ticker| ResourceId::instrument(ticker.as_str())),
            )
            .collect()
    }

    /// Lock the currency and every listed instrument. Listing and delisting
    /// need the currency lock, so once it is held the set cannot change; the
    /// loop only covers a listing that landed before it was taken.
    fn lock_everything(&self) -> ResourceGuard {
        loop {
            let guard = self.locks.acquire(self.all_resources());
            self.forget_unlisted(&guard);
            if self.all_resources().iter().all(|resource| guard.covers(resource)) {
                return guard;
            }
        }
    }

    /// Drop the lock handles `guard` holds for tickers that are no longer
    /// listed, e.g. ones delisted between reading the listings and locking.
    /// `guard` must cover the currency, which keeps the listing set fixed.
    pub(super) fn forget_unlisted(&self, guard: &ResourceGuard) {
        if !guard.covers(&ResourceId::Currency) {
            return;
        }
        let listings = self.listings.read();
        for resource in guard.resources() {
            if let ResourceId::Instrument(ticker) = resource {
                if !listings.contains_key(ticker) {
                    self.locks.forget(resource);
                }
            }
        }
    }

    /// Release the reserve of a resting order, take it off the book and
    /// archive it as cancelled.
    pub(super) fn release_and_cancel(
        &self,
        guard: &ResourceGuard,
        market: &mut Market,
        order_id: &OrderId,
    ) -> ExchangeResult<(Order, Amount)> {
        let (user, resource, released) = {
            let order = market
                .book
                .get(order_id)
                .ok_or(ExchangeError::NotFound(*order_id))?;
            (order.user_id, reserve_resource(order), order.reserved_amount()?)
        };

        self.ledger.unfreeze(guard, user, &resource, released)?;
        let mut order = market.book.remove(order_id).ok_or_else(|| {
            ExchangeError::invariant(format!("order {} vanished from the book", order_id))
        })?;
        order.cancel()?;
        market.archive(order.clone());
        Ok((order, released))
    }

    pub(super) fn emit(&self, events: Vec<ExchangeEvent>) {
        if !events.is_empty() {
            self.event_handler.on_events(events);
        }
    }
}

fn resting_orders(market: &Market) -> impl Iterator<Item = &Order> + '_ {
    market
        .book
        .iter(Direction::Bid)
        .chain(market.book.iter(Direction::Ask))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{OrderRequest, OrderStatus};
    use crate::engine::ExchangeBuilder;
    use crate::interfaces::RecordingEventHandler;
    use rust_decimal_macros::dec;

    fn exchange() -> Exchange {
        let exchange = ExchangeBuilder::new("RUB").build().unwrap();
        exchange.add_instrument("SBER", "Sberbank").unwrap();
        exchange
    }

    #[test]
    fn test_implicit_wallet_for_users_and_instruments() {
        let exchange = exchange();
        let alice = exchange.register_user("alice", Role::User).unwrap();
        exchange.add_instrument("GAZP", "Gazprom").unwrap();
        let bob = exchange.register_user("bob", Role::Admin).unwrap();

        for user in [alice, bob] {
            let sheet = exchange.get_balances(user).unwrap();
            assert_eq!(sheet.base_currency, "RUB");
            assert_eq!(sheet.instruments.len(), 2);
            assert!(sheet.instrument("GAZP").unwrap().is_empty());
        }
        assert_eq!(exchange.get_user(bob).unwrap().role, Role::Admin);
    }

    #[test]
    fn test_instrument_registry() {
        let exchange = exchange();
        assert!(matches!(
            exchange.add_instrument("SBER", "again"),
            Err(ExchangeError::DuplicateInstrument(_))
        ));
        assert!(matches!(
            exchange.add_instrument("RUB", "currency"),
            Err(ExchangeError::DuplicateInstrument(_))
        ));

        exchange.add_instrument("AFLT", "Aeroflot").unwrap();
        let tickers: Vec<_> = exchange
            .list_instruments()
            .into_iter()
            .map(|i| i.ticker)
            .collect();
        assert_eq!(tickers, vec!["AFLT", "SBER"]);
    }

    #[test]
    fn test_adjust_balance() {
        let exchange = exchange();
        let alice = exchange.register_user("alice", Role::User).unwrap();

        assert_eq!(exchange.adjust_balance(alice, "RUB", dec!(100)).unwrap(), dec!(100));
        assert_eq!(exchange.adjust_balance(alice, "SBER", dec!(5)).unwrap(), dec!(5));
        assert!(matches!(
            exchange.adjust_balance(alice, "RUB", dec!(-101)),
            Err(ExchangeError::InsufficientFunds { .. })
        ));
        assert!(matches!(
            exchange.adjust_balance(alice, "SBER", dec!(-6)),
            Err(ExchangeError::InsufficientInventory { .. })
        ));
        assert!(matches!(
            exchange.adjust_balance(alice, "NOPE", dec!(1)),
            Err(ExchangeError::UnknownInstrument(_))
        ));
        assert!(matches!(
            exchange.adjust_balance(UserId::new(), "RUB", dec!(1)),
            Err(ExchangeError::UnknownUser(_))
        ));
    }

    #[test]
    fn test_adjust_balance_precision_and_size() {
        let exchange = exchange();
        let alice = exchange.register_user("alice", Role::User).unwrap();

        assert_eq!(exchange.adjust_balance(alice, "RUB", dec!(0.12345678)).unwrap(), dec!(0.12345678));
        assert_eq!(exchange.adjust_balance(alice, "SBER", dec!(0.5000)).unwrap(), dec!(0.5));
        assert!(matches!(
            exchange.adjust_balance(alice, "RUB", dec!(0.000000001)),
            Err(ExchangeError::InvalidQuantity(_))
        ));
        assert!(matches!(
            exchange.adjust_balance(alice, "SBER", dec!(0.00001)),
            Err(ExchangeError::InvalidQuantity(_))
        ));
        // A deposit large enough to overflow an aggregate is refused up front
        let huge = Decimal::MAX / dec!(2) + dec!(1);
        assert!(matches!(
            exchange.adjust_balance(alice, "SBER", huge),
            Err(ExchangeError::InvalidQuantity(_))
        ));
        assert!(matches!(
            exchange.adjust_balance(alice, "RUB", -huge),
            Err(ExchangeError::InvalidQuantity(_))
        ));

        let sheet = exchange.get_balances(alice).unwrap();
        assert_eq!(sheet.currency.available(), dec!(0.12345678));
        assert_eq!(sheet.instrument("SBER").unwrap().available(), dec!(0.5));
    }

    #[test]
    fn test_withdrawal_cannot_touch_reserve() {
        let exchange = exchange();
        let alice = exchange.register_user("alice", Role::User).unwrap();
        exchange.adjust_balance(alice, "RUB", dec!(100)).unwrap();
        exchange
            .place_order(OrderRequest::limit(alice, "SBER", Direction::Bid, dec!(6), dec!(10)))
            .unwrap();

        assert!(exchange.adjust_balance(alice, "RUB", dec!(-41)).is_err());
        assert_eq!(exchange.adjust_balance(alice, "RUB", dec!(-40)).unwrap(), dec!(0));
        exchange.audit().unwrap();
    }

    #[test]
    fn test_forget_unlisted_drops_stale_handles() {
        let exchange = exchange();
        exchange.add_instrument("GAZP", "Gazprom").unwrap();
        exchange.remove_instrument("GAZP").unwrap();
        let handles = exchange.locks.len();

        // Tickers read before a delisting completed
        let guard = exchange.locks.acquire([
            ResourceId::Currency,
            ResourceId::instrument("GAZP"),
            ResourceId::instrument("SBER"),
        ]);
        assert_eq!(exchange.locks.len(), handles + 1);
        exchange.forget_unlisted(&guard);
        drop(guard);
        assert_eq!(exchange.locks.len(), handles);

        // A full lock over the live listings leaves the handle count alone
        drop(exchange.lock_everything());
        assert_eq!(exchange.locks.len(), handles);
    }

    #[test]
    fn test_remove_instrument_releases_reserves() {
        let handler = Arc::new(RecordingEventHandler::new());
        let exchange = ExchangeBuilder::new("RUB")
            .with_event_handler(handler.clone())
            .build()
            .unwrap();
        exchange.add_instrument("SBER", "Sberbank").unwrap();
        let alice = exchange.register_user("alice", Role::User).unwrap();
        exchange.adjust_balance(alice, "RUB", dec!(1000)).unwrap();
        exchange.adjust_balance(alice, "SBER", dec!(10)).unwrap();

        let bid = exchange
            .place_order(OrderRequest::limit(alice, "SBER", Direction::Bid, dec!(5), dec!(100)))
            .unwrap();
        exchange
            .place_order(OrderRequest::limit(alice, "SBER", Direction::Ask, dec!(4), dec!(150)))
            .unwrap();

        exchange.remove_instrument("SBER").unwrap();

        let sheet = exchange.get_balances(alice).unwrap();
        assert_eq!(sheet.currency.available(), dec!(1000));
        assert_eq!(sheet.currency.frozen(), dec!(0));
        assert!(sheet.instruments.is_empty());
        assert!(matches!(exchange.get_order(bid.order_id), Err(ExchangeError::NotFound(_))));
        assert!(matches!(
            exchange.get_order_book_levels("SBER", 5),
            Err(ExchangeError::UnknownInstrument(_))
        ));
        assert!(handler.events().iter().any(|e| matches!(
            e,
            ExchangeEvent::InstrumentDelisted { cancelled_orders: 2, .. }
        )));
        exchange.audit().unwrap();

        // The ticker can be listed again from scratch
        exchange.add_instrument("SBER", "Sberbank").unwrap();
        assert!(exchange.get_balances(alice).unwrap().instrument("SBER").unwrap().is_empty());
    }

    #[test]
    fn test_remove_user_cancels_resting_orders() {
        let exchange = exchange();
        let alice = exchange.register_user("alice", Role::User).unwrap();
        let bob = exchange.register_user("bob", Role::User).unwrap();
        exchange.adjust_balance(alice, "SBER", dec!(10)).unwrap();
        exchange.adjust_balance(bob, "RUB", dec!(500)).unwrap();

        let ask = exchange
            .place_order(OrderRequest::limit(alice, "SBER", Direction::Ask, dec!(10), dec!(20)))
            .unwrap();

        let sheet = exchange.remove_user(alice).unwrap();
        assert_eq!(sheet.instrument("SBER").unwrap().available(), dec!(10));
        assert_eq!(sheet.instrument("SBER").unwrap().frozen(), dec!(0));
        assert_eq!(exchange.get_order(ask.order_id).unwrap().status(), OrderStatus::Cancelled);
        assert!(exchange
            .get_order_book_levels("SBER", 10)
            .unwrap()
            .asks
            .is_empty());
        assert!(matches!(exchange.get_user(alice), Err(ExchangeError::UnknownUser(_))));
        assert!(matches!(exchange.remove_user(alice), Err(ExchangeError::UnknownUser(_))));

        // Nothing left for bob to trade against
        let receipt = exchange
            .place_order(OrderRequest::market(bob, "SBER", Direction::Bid, dec!(1)))
            .unwrap();
        assert_eq!(receipt.status, OrderStatus::Cancelled);
        exchange.audit().unwrap();
    }

    #[test]
    fn test_book_levels_depth_is_capped() {
        let exchange = ExchangeBuilder::new("RUB")
            .with_max_book_depth(2)
            .build()
            .unwrap();
        exchange.add_instrument("SBER", "Sberbank").unwrap();
        let alice = exchange.register_user("alice", Role::User).unwrap();
        exchange.adjust_balance(alice, "RUB", dec!(1000)).unwrap();

        for price in [dec!(10), dec!(11), dec!(12)] {
            exchange
                .place_order(OrderRequest::limit(alice, "SBER", Direction::Bid, dec!(1), price))
                .unwrap();
        }

        let levels = exchange.get_order_book_levels("SBER", 10).unwrap();
        assert_eq!(levels.bids.len(), 2);
        assert_eq!(levels.best_bid(), Some(dec!(12)));
        assert!(levels.asks.is_empty());
    }
}
