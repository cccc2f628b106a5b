// ============================================================================
// Matching Engine
// Plans fills, admits the order against the ledger, then commits
// ============================================================================

use crate::domain::{Direction, Order, OrderBook, Transaction};
use crate::engine::ledger::{Ledger, Settlement};
use crate::engine::lock_manager::{ResourceGuard, ResourceId};
use crate::error::{ExchangeError, ExchangeResult};
use crate::interfaces::{Fill, MatchPlan, MatchingAlgorithm};
use crate::numeric::{checked_diff, max_magnitude, notional, Amount};
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicU64, Ordering};

/// Result of running one incoming order through the book.
#[derive(Debug, Clone)]
pub struct MatchOutcome {
    /// The incoming order in its final state. When `rested` is true the book
    /// holds the live copy.
    pub order: Order,
    pub trades: Vec<Transaction>,
    /// Resting orders that were fully executed and left the book
    pub executed_makers: Vec<Order>,
    pub rested: bool,
}

impl MatchOutcome {
    fn rejected(order: Order) -> Self {
        Self {
            order,
            trades: Vec::new(),
            executed_makers: Vec::new(),
            rested: false,
        }
    }
}

/// Matching with all-or-nothing admission.
///
/// Fills are planned against the book without mutating it. The reservation
/// for the whole order and the settlement of every planned fill then run in
/// one ledger transaction; only when that commits are the book and the order
/// records updated. A rejected order therefore leaves nothing behind.
pub struct MatchingEngine {
    /// Pluggable matching algorithm
    algorithm: Box<dyn MatchingAlgorithm>,
}

impl MatchingEngine {
    pub fn new(algorithm: Box<dyn MatchingAlgorithm>) -> Self {
        Self { algorithm }
    }

    pub fn algorithm_name(&self) -> &str {
        self.algorithm.name()
    }

    /// Match `order` against `book`.
    ///
    /// The caller must hold the locks of the base currency and the order's
    /// instrument, and exclusive access to `book`. `trade_sequence` numbers
    /// the produced trades.
    pub fn execute(
        &self,
        ledger: &Ledger,
        guard: &ResourceGuard,
        book: &mut OrderBook,
        mut order: Order,
        trade_sequence: &AtomicU64,
    ) -> ExchangeResult<MatchOutcome> {
        let plan = self.algorithm.plan(&order, book.side(order.direction.opposite()));

        // Market orders are all-or-nothing against the liquidity present now
        if order.is_market_order() && plan.filled() < order.remaining_qty() {
            tracing::info!(
                order_id = %order.id,
                wanted = %order.remaining_qty(),
                available = %plan.filled(),
                "market order cancelled, insufficient liquidity"
            );
            order.cancel()?;
            return Ok(MatchOutcome::rejected(order));
        }

        let (resource, reservation) = reservation(&order, &plan)?;
        let settlements = plan
            .fills
            .iter()
            .map(|fill| settlement(&order, fill))
            .collect::<ExchangeResult<Vec<_>>>()?;

        ledger.transaction(guard, |tx| {
            tx.freeze(order.user_id, &resource, reservation)?;
            for settlement in &settlements {
                tx.settle(settlement)?;
            }
            Ok(())
        })?;

        self.commit(book, order, &plan, settlements, trade_sequence)
            .inspect_err(|err| {
                tracing::error!(error = %err, "ledger settled but the book could not follow");
            })
    }

    fn commit(
        &self,
        book: &mut OrderBook,
        mut order: Order,
        plan: &MatchPlan,
        settlements: Vec<Settlement>,
        trade_sequence: &AtomicU64,
    ) -> ExchangeResult<MatchOutcome> {
        let mut trades = Vec::with_capacity(settlements.len());
        let mut executed_makers = Vec::new();

        for (fill, settlement) in plan.fills.iter().zip(settlements) {
            if let Some(done) = book.fill(&fill.maker_order_id, fill.quantity)? {
                executed_makers.push(done);
            }
            order.fill(fill.quantity)?;

            let trade = Transaction::new(
                trade_sequence.fetch_add(1, Ordering::AcqRel),
                settlement.ticker,
                fill.maker_order_id,
                order.id,
                settlement.buyer,
                settlement.seller,
                fill.price,
                fill.quantity,
            );
            tracing::debug!(
                ticker = %trade.ticker,
                maker = %trade.maker_order_id,
                taker = %trade.taker_order_id,
                price = %trade.price,
                quantity = %trade.quantity,
                "trade"
            );
            trades.push(trade);
        }

        let rested = order.remaining_qty() > Decimal::ZERO;
        if rested {
            if order.is_market_order() {
                return Err(ExchangeError::invariant(format!(
                    "market order {} left {} unfilled after admission",
                    order.id,
                    order.remaining_qty()
                )));
            }
            book.insert(order.clone())?;
            tracing::debug!(order_id = %order.id, remaining = %order.remaining_qty(), "order rested");
        }

        Ok(MatchOutcome {
            order,
            trades,
            executed_makers,
            rested,
        })
    }
}

/// What the incoming order reserves on admission: the full limit notional
/// of a bid, the planned notional of a market bid, the full quantity of an
/// ask.
fn reservation(order: &Order, plan: &MatchPlan) -> ExchangeResult<(ResourceId, Amount)> {
    let amount = match (order.direction, order.price) {
        (Direction::Bid, Some(limit)) => notional(order.remaining_qty(), limit)?,
        (Direction::Bid, None) => {
            let cost = plan.notional()?;
            if cost > max_magnitude() {
                return Err(ExchangeError::InvalidQuantity(format!(
                    "market order {} would cost {}, above {}",
                    order.id,
                    cost,
                    max_magnitude()
                )));
            }
            cost
        },
        (Direction::Ask, _) => order.remaining_qty(),
    };
    Ok((reserve_resource(order), amount))
}

/// Resource an order's reserve is held in: cash for a bid, units for an ask.
pub(crate) fn reserve_resource(order: &Order) -> ResourceId {
    match order.direction {
        Direction::Bid => ResourceId::Currency,
        Direction::Ask => ResourceId::instrument(order.ticker.as_str()),
    }
}

fn settlement(order: &Order, fill: &Fill) -> ExchangeResult<Settlement> {
    let (buyer, seller) = match order.direction {
        Direction::Bid => (order.user_id, fill.maker_user_id),
        Direction::Ask => (fill.maker_user_id, order.user_id),
    };
    // A limit bid reserved at its own limit; the gap to the maker price goes back
    let buyer_release = match (order.direction, order.price) {
        (Direction::Bid, Some(limit)) => checked_diff(
            notional(fill.quantity, limit)?,
            notional(fill.quantity, fill.price)?,
        )?,
        _ => Decimal::ZERO,
    };

    Ok(Settlement {
        buyer,
        seller,
        ticker: order.ticker.clone(),
        quantity: fill.quantity,
        price: fill.price,
        buyer_release,
    })
}
