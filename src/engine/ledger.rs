// ============================================================================
// Ledger
// Balances and inventory with reservation (freeze) semantics
// ============================================================================

use crate::domain::{BalanceSheet, Holding, HoldingError, UserId};
use crate::engine::lock_manager::{ResourceGuard, ResourceId};
use crate::error::{ExchangeError, ExchangeResult};
use crate::numeric::{checked_sum, notional, Amount, Price, Quantity};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Cash and units moved by one trade.
#[derive(Debug, Clone, PartialEq)]
pub struct Settlement {
    pub buyer: UserId,
    pub seller: UserId,
    pub ticker: String,
    pub quantity: Quantity,
    pub price: Price,
    /// Reserved currency handed back to the buyer on top of the notional,
    /// when the bid was reserved at a higher limit than the execution price
    pub buyer_release: Amount,
}

#[derive(Debug, Clone, Default)]
struct Account {
    currency: Holding,
    instruments: HashMap<String, Holding>,
}

#[derive(Debug, Default)]
struct LedgerState {
    instruments: BTreeSet<String>,
    accounts: HashMap<UserId, Account>,
}

/// Every (user, resource) cell of the exchange.
///
/// Every user has a holding for every listed instrument, created at zero when
/// either side is created. Mutations require a [`ResourceGuard`] covering the
/// touched resources and run inside [`Ledger::transaction`], which is
/// all-or-nothing.
pub struct Ledger {
    base_currency: String,
    state: Mutex<LedgerState>,
}

impl Ledger {
    pub fn new(base_currency: impl Into<String>) -> Self {
        Self {
            base_currency: base_currency.into(),
            state: Mutex::new(LedgerState::default()),
        }
    }

    pub fn base_currency(&self) -> &str {
        &self.base_currency
    }

    /// Map a ticker to its resource; the base currency ticker maps to
    /// [`ResourceId::Currency`].
    pub fn resource(&self, ticker: &str) -> ResourceId {
        if ticker == self.base_currency {
            ResourceId::Currency
        } else {
            ResourceId::instrument(ticker)
        }
    }

    // ========================================================================
    // Transactions
    // ========================================================================

    /// Run `f` against the ledger. If `f` fails, every cell it touched is
    /// restored before the error is returned.
    pub fn transaction<T, F>(&self, guard: &ResourceGuard, f: F) -> ExchangeResult<T>
    where
        F: FnOnce(&mut LedgerTx<'_>) -> ExchangeResult<T>,
    {
        let mut state = self.state.lock();
        let mut tx = LedgerTx {
            guard,
            state: &mut *state,
            undo: Vec::new(),
        };

        match f(&mut tx) {
            Ok(value) => Ok(value),
            Err(err) => {
                tx.rollback();
                Err(err)
            },
        }
    }

    /// Add `delta` to the available part; the result may not go negative.
    pub fn apply_delta(
        &self,
        guard: &ResourceGuard,
        user: UserId,
        resource: &ResourceId,
        delta: Amount,
    ) -> ExchangeResult<Amount> {
        self.transaction(guard, |tx| tx.apply_delta(user, resource, delta))
    }

    pub fn freeze(
        &self,
        guard: &ResourceGuard,
        user: UserId,
        resource: &ResourceId,
        amount: Amount,
    ) -> ExchangeResult<()> {
        self.transaction(guard, |tx| tx.freeze(user, resource, amount))
    }

    pub fn unfreeze(
        &self,
        guard: &ResourceGuard,
        user: UserId,
        resource: &ResourceId,
        amount: Amount,
    ) -> ExchangeResult<()> {
        self.transaction(guard, |tx| tx.unfreeze(user, resource, amount))
    }

    pub fn settle(&self, guard: &ResourceGuard, settlement: &Settlement) -> ExchangeResult<()> {
        self.transaction(guard, |tx| tx.settle(settlement))
    }

    // ========================================================================
    // Accounts and instruments
    // ========================================================================

    /// Create zero holdings for a new user.
    pub fn open_account(&self, user: UserId) -> ExchangeResult<()> {
        let mut state = self.state.lock();
        if state.accounts.contains_key(&user) {
            return Err(ExchangeError::invariant(format!("account {} already open", user)));
        }

        let account = Account {
            currency: Holding::EMPTY,
            instruments: state
                .instruments
                .iter()
                .map(|ticker| (ticker.clone(), Holding::EMPTY))
                .collect(),
        };
        state.accounts.insert(user, account);
        Ok(())
    }

    /// Remove a user's holdings. The guard must cover the currency and every
    /// listed instrument.
    pub fn close_account(&self, guard: &ResourceGuard, user: UserId) -> ExchangeResult<BalanceSheet> {
        let mut state = self.state.lock();
        guard.ensure_covers(&ResourceId::Currency)?;
        for ticker in &state.instruments {
            guard.ensure_covers(&ResourceId::instrument(ticker.as_str()))?;
        }

        let account = state
            .accounts
            .remove(&user)
            .ok_or(ExchangeError::UnknownUser(user))?;
        Ok(self.sheet(user, &account))
    }

    /// Give every account a zero holding of a new instrument.
    pub fn list_instrument(&self, guard: &ResourceGuard, ticker: &str) -> ExchangeResult<()> {
        let resource = self.resource(ticker);
        guard.ensure_covers(&resource)?;
        if resource == ResourceId::Currency {
            return Err(ExchangeError::invariant("base currency listed as instrument"));
        }

        let mut state = self.state.lock();
        if !state.instruments.insert(ticker.to_string()) {
            return Err(ExchangeError::DuplicateInstrument(ticker.to_string()));
        }
        for account in state.accounts.values_mut() {
            account
                .instruments
                .insert(ticker.to_string(), Holding::EMPTY);
        }
        Ok(())
    }

    /// Zero out and drop every holding of an instrument. Returns the
    /// non-empty holdings that were written off.
    pub fn delist_instrument(
        &self,
        guard: &ResourceGuard,
        ticker: &str,
    ) -> ExchangeResult<Vec<(UserId, Holding)>> {
        guard.ensure_covers(&ResourceId::instrument(ticker))?;

        let mut state = self.state.lock();
        if !state.instruments.remove(ticker) {
            return Err(ExchangeError::UnknownInstrument(ticker.to_string()));
        }

        let mut written_off = Vec::new();
        for (user, account) in state.accounts.iter_mut() {
            if let Some(holding) = account.instruments.remove(ticker) {
                if !holding.is_empty() {
                    written_off.push((*user, holding));
                }
            }
        }
        Ok(written_off)
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub fn holding(&self, user: UserId, resource: &ResourceId) -> ExchangeResult<Holding> {
        let state = self.state.lock();
        let account = state
            .accounts
            .get(&user)
            .ok_or(ExchangeError::UnknownUser(user))?;
        Self::lookup(account, resource).copied()
    }

    pub fn balances(&self, user: UserId) -> ExchangeResult<BalanceSheet> {
        let state = self.state.lock();
        let account = state
            .accounts
            .get(&user)
            .ok_or(ExchangeError::UnknownUser(user))?;
        Ok(self.sheet(user, account))
    }

    /// Balance sheets of every account, read in one consistent pass.
    pub fn all_balances(&self) -> Vec<BalanceSheet> {
        let state = self.state.lock();
        state
            .accounts
            .iter()
            .map(|(user, account)| self.sheet(*user, account))
            .collect()
    }

    /// Sum of available plus frozen across all users.
    pub fn total(&self, resource: &ResourceId) -> ExchangeResult<Amount> {
        let state = self.state.lock();
        let mut total = Decimal::ZERO;
        for account in state.accounts.values() {
            let holding = Self::lookup(account, resource)?;
            total = checked_sum(total, holding.total()?)?;
        }
        Ok(total)
    }

    pub fn has_account(&self, user: UserId) -> bool {
        self.state.lock().accounts.contains_key(&user)
    }

    fn sheet(&self, user: UserId, account: &Account) -> BalanceSheet {
        BalanceSheet {
            user_id: user,
            base_currency: self.base_currency.clone(),
            currency: account.currency,
            instruments: account
                .instruments
                .iter()
                .map(|(ticker, holding)| (ticker.clone(), *holding))
                .collect::<BTreeMap<_, _>>(),
        }
    }

    fn lookup<'a>(account: &'a Account, resource: &ResourceId) -> ExchangeResult<&'a Holding> {
        match resource {
            ResourceId::Currency => Ok(&account.currency),
            ResourceId::Instrument(ticker) => account
                .instruments
                .get(ticker)
                .ok_or_else(|| ExchangeError::UnknownInstrument(ticker.clone())),
        }
    }
}

// ============================================================================
// Ledger Transaction
// ============================================================================

/// Open ledger transaction. Keeps the previous value of every cell it touches
/// so a failure anywhere can put them all back.
pub struct LedgerTx<'a> {
    guard: &'a ResourceGuard,
    state: &'a mut LedgerState,
    undo: Vec<(UserId, ResourceId, Holding)>,
}

impl LedgerTx<'_> {
    pub fn holding(&self, user: UserId, resource: &ResourceId) -> ExchangeResult<Holding> {
        let account = self
            .state
            .accounts
            .get(&user)
            .ok_or(ExchangeError::UnknownUser(user))?;
        Ledger::lookup(account, resource).copied()
    }

    pub fn apply_delta(
        &mut self,
        user: UserId,
        resource: &ResourceId,
        delta: Amount,
    ) -> ExchangeResult<Amount> {
        let holding = self.touch(user, resource)?;
        holding
            .apply_delta(delta)
            .map_err(|err| holding_error(user, resource, -delta, err))
    }

    pub fn freeze(&mut self, user: UserId, resource: &ResourceId, amount: Amount) -> ExchangeResult<()> {
        let holding = self.touch(user, resource)?;
        holding
            .freeze(amount)
            .map_err(|err| holding_error(user, resource, amount, err))
    }

    pub fn unfreeze(&mut self, user: UserId, resource: &ResourceId, amount: Amount) -> ExchangeResult<()> {
        let holding = self.touch(user, resource)?;
        holding
            .unfreeze(amount)
            .map_err(|err| holding_error(user, resource, amount, err))
    }

    /// Buyer pays the notional out of reserved currency, seller delivers the
    /// units out of reserved inventory. All four cells move or none do.
    pub fn settle(&mut self, settlement: &Settlement) -> ExchangeResult<()> {
        let Settlement {
            buyer,
            seller,
            ticker,
            quantity,
            price,
            buyer_release,
        } = settlement;
        let cash = ResourceId::Currency;
        let units = ResourceId::instrument(ticker.as_str());
        let value = notional(*quantity, *price)?;

        let holding = self.touch(*buyer, &cash)?;
        holding
            .consume_frozen(value)
            .and_then(|_| holding.unfreeze(*buyer_release))
            .map_err(|err| holding_error(*buyer, &cash, value, err))?;

        self.touch(*seller, &cash)?
            .credit(value)
            .map_err(|err| holding_error(*seller, &cash, value, err))?;

        self.touch(*seller, &units)?
            .consume_frozen(*quantity)
            .map_err(|err| holding_error(*seller, &units, *quantity, err))?;

        self.touch(*buyer, &units)?
            .credit(*quantity)
            .map_err(|err| holding_error(*buyer, &units, *quantity, err))?;

        Ok(())
    }

    fn touch(&mut self, user: UserId, resource: &ResourceId) -> ExchangeResult<&mut Holding> {
        self.guard.ensure_covers(resource)?;
        let account = self
            .state
            .accounts
            .get_mut(&user)
            .ok_or(ExchangeError::UnknownUser(user))?;
        let holding = match resource {
            ResourceId::Currency => &mut account.currency,
            ResourceId::Instrument(ticker) => account
                .instruments
                .get_mut(ticker)
                .ok_or_else(|| ExchangeError::UnknownInstrument(ticker.clone()))?,
        };
        self.undo.push((user, resource.clone(), *holding));
        Ok(holding)
    }

    fn rollback(&mut self) {
        while let Some((user, resource, previous)) = self.undo.pop() {
            let Some(account) = self.state.accounts.get_mut(&user) else {
                continue;
            };
            let slot = match &resource {
                ResourceId::Currency => Some(&mut account.currency),
                ResourceId::Instrument(ticker) => account.instruments.get_mut(ticker),
            };
            if let Some(slot) = slot {
                *slot = previous;
            }
        }
    }
}

fn holding_error(
    user: UserId,
    resource: &ResourceId,
    required: Amount,
    err: HoldingError,
) -> ExchangeError {
    match (err, resource) {
        (HoldingError::Insufficient { available }, ResourceId::Currency) => {
            ExchangeError::InsufficientFunds {
                user_id: user,
                required,
                available,
            }
        },
        (HoldingError::Insufficient { available }, ResourceId::Instrument(ticker)) => {
            ExchangeError::InsufficientInventory {
                user_id: user,
                ticker: ticker.clone(),
                required,
                available,
            }
        },
        (HoldingError::ReserveExceeded { frozen }, _) => ExchangeError::invariant(format!(
            "{} of {} exceeds the {} reserved by {}",
            required, resource, frozen, user
        )),
        (HoldingError::NegativeAmount, _) => ExchangeError::invariant(format!(
            "negative amount {} for {} of {}",
            required, resource, user
        )),
        (HoldingError::Overflow, _) => {
            ExchangeError::invariant(format!("{} of {} overflowed", resource, user))
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::LockManager;
    use rust_decimal_macros::dec;

    fn setup() -> (Ledger, LockManager, UserId, UserId) {
        let ledger = Ledger::new("RUB");
        let locks = LockManager::new();
        {
            let guard = locks.acquire([ResourceId::instrument("SBER")]);
            ledger.list_instrument(&guard, "SBER").unwrap();
        }
        let alice = UserId::new();
        let bob = UserId::new();
        ledger.open_account(alice).unwrap();
        ledger.open_account(bob).unwrap();
        (ledger, locks, alice, bob)
    }

    fn all(locks: &LockManager) -> ResourceGuard {
        locks.acquire([ResourceId::Currency, ResourceId::instrument("SBER")])
    }

    #[test]
    fn test_implicit_wallet_for_every_pair() {
        let (ledger, locks, alice, _) = setup();
        assert_eq!(
            ledger.holding(alice, &ResourceId::instrument("SBER")).unwrap(),
            Holding::EMPTY
        );

        let guard = locks.acquire([ResourceId::instrument("GAZP")]);
        ledger.list_instrument(&guard, "GAZP").unwrap();
        let carol = UserId::new();
        ledger.open_account(carol).unwrap();

        for user in [alice, carol] {
            let sheet = ledger.balances(user).unwrap();
            assert_eq!(sheet.instruments.len(), 2);
            assert_eq!(sheet.instrument("GAZP"), Some(Holding::EMPTY));
        }
    }

    #[test]
    fn test_apply_delta_rejects_negative_result() {
        let (ledger, locks, alice, _) = setup();
        let guard = all(&locks);

        assert_eq!(
            ledger
                .apply_delta(&guard, alice, &ResourceId::Currency, dec!(100))
                .unwrap(),
            dec!(100)
        );
        assert!(matches!(
            ledger.apply_delta(&guard, alice, &ResourceId::Currency, dec!(-101)),
            Err(ExchangeError::InsufficientFunds { .. })
        ));
        assert!(matches!(
            ledger.apply_delta(&guard, alice, &ResourceId::instrument("SBER"), dec!(-1)),
            Err(ExchangeError::InsufficientInventory { .. })
        ));
        assert_eq!(
            ledger.holding(alice, &ResourceId::Currency).unwrap().available(),
            dec!(100)
        );
    }

    #[test]
    fn test_unfreeze_above_reserve_is_invariant_violation() {
        let (ledger, locks, alice, _) = setup();
        let guard = all(&locks);
        ledger
            .apply_delta(&guard, alice, &ResourceId::Currency, dec!(10))
            .unwrap();
        ledger
            .freeze(&guard, alice, &ResourceId::Currency, dec!(4))
            .unwrap();

        let err = ledger
            .unfreeze(&guard, alice, &ResourceId::Currency, dec!(5))
            .unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_mutation_without_lock_is_rejected() {
        let (ledger, locks, alice, _) = setup();
        let guard = locks.acquire([ResourceId::instrument("SBER")]);

        let err = ledger
            .apply_delta(&guard, alice, &ResourceId::Currency, dec!(10))
            .unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_settle_moves_all_four_cells() {
        let (ledger, locks, buyer, seller) = setup();
        let guard = all(&locks);
        let cash = ResourceId::Currency;
        let units = ResourceId::instrument("SBER");

        ledger.apply_delta(&guard, buyer, &cash, dec!(1000)).unwrap();
        ledger.apply_delta(&guard, seller, &units, dec!(10)).unwrap();
        ledger.freeze(&guard, buyer, &cash, dec!(600)).unwrap();
        ledger.freeze(&guard, seller, &units, dec!(5)).unwrap();

        // Reserved at 120, executed at 100
        ledger
            .settle(
                &guard,
                &Settlement {
                    buyer,
                    seller,
                    ticker: "SBER".to_string(),
                    quantity: dec!(5),
                    price: dec!(100),
                    buyer_release: dec!(100),
                },
            )
            .unwrap();

        assert_eq!(ledger.holding(buyer, &cash).unwrap(), Holding::new(dec!(500), dec!(0)));
        assert_eq!(ledger.holding(buyer, &units).unwrap(), Holding::new(dec!(5), dec!(0)));
        assert_eq!(ledger.holding(seller, &cash).unwrap(), Holding::new(dec!(500), dec!(0)));
        assert_eq!(ledger.holding(seller, &units).unwrap(), Holding::new(dec!(5), dec!(0)));
        assert_eq!(ledger.total(&cash).unwrap(), dec!(1000));
        assert_eq!(ledger.total(&units).unwrap(), dec!(10));
    }

    #[test]
    fn test_failed_settle_changes_nothing() {
        let (ledger, locks, buyer, seller) = setup();
        let guard = all(&locks);
        let cash = ResourceId::Currency;
        let units = ResourceId::instrument("SBER");

        ledger.apply_delta(&guard, buyer, &cash, dec!(1000)).unwrap();
        ledger.freeze(&guard, buyer, &cash, dec!(500)).unwrap();
        // Seller has no reserved units: the third leg fails after two legs moved
        let before = (ledger.balances(buyer).unwrap(), ledger.balances(seller).unwrap());

        let err = ledger
            .settle(
                &guard,
                &Settlement {
                    buyer,
                    seller,
                    ticker: "SBER".to_string(),
                    quantity: dec!(5),
                    price: dec!(100),
                    buyer_release: Decimal::ZERO,
                },
            )
            .unwrap_err();

        assert!(err.is_fatal());
        assert_eq!(
            (ledger.balances(buyer).unwrap(), ledger.balances(seller).unwrap()),
            before
        );
    }

    #[test]
    fn test_transaction_rolls_back_earlier_steps() {
        let (ledger, locks, alice, _) = setup();
        let guard = all(&locks);
        let cash = ResourceId::Currency;
        ledger.apply_delta(&guard, alice, &cash, dec!(50)).unwrap();

        let result = ledger.transaction(&guard, |tx| {
            tx.freeze(alice, &cash, dec!(30))?;
            tx.freeze(alice, &cash, dec!(30))
        });

        assert!(matches!(result, Err(ExchangeError::InsufficientFunds { .. })));
        assert_eq!(ledger.holding(alice, &cash).unwrap(), Holding::new(dec!(50), dec!(0)));
    }

    #[test]
    fn test_delist_zeroes_inventory() {
        let (ledger, locks, alice, bob) = setup();
        let guard = all(&locks);
        ledger
            .apply_delta(&guard, alice, &ResourceId::instrument("SBER"), dec!(3))
            .unwrap();

        let written_off = ledger.delist_instrument(&guard, "SBER").unwrap();
        assert_eq!(written_off, vec![(alice, Holding::new(dec!(3), dec!(0)))]);
        assert!(ledger.balances(bob).unwrap().instruments.is_empty());
        assert!(matches!(
            ledger.holding(alice, &ResourceId::instrument("SBER")),
            Err(ExchangeError::UnknownInstrument(_))
        ));
    }

    #[test]
    fn test_close_account_requires_every_lock() {
        let (ledger, locks, alice, _) = setup();
        {
            let partial = locks.acquire([ResourceId::Currency]);
            assert!(ledger.close_account(&partial, alice).unwrap_err().is_fatal());
        }
        let guard = all(&locks);
        ledger.close_account(&guard, alice).unwrap();
        assert!(!ledger.has_account(alice));
    }
}
