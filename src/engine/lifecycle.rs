// ============================================================================
// Order Lifecycle
// Placement and cancellation under the resource locks
// ============================================================================

use crate::domain::{Direction, Order, OrderId, OrderRequest, OrderStatus, Transaction, UserId};
use crate::engine::exchange::Exchange;
use crate::engine::lock_manager::ResourceId;
use crate::engine::matching_engine::MatchOutcome;
use crate::error::{ExchangeError, ExchangeResult};
use crate::interfaces::ExchangeEvent;
use crate::numeric::{Amount, Quantity};
use chrono::Utc;
use smallvec::{smallvec, SmallVec};
use std::sync::atomic::Ordering;

/// What `place_order` reports back.
#[derive(Debug, Clone, PartialEq)]
pub struct PlacementReceipt {
    pub order_id: OrderId,
    pub status: OrderStatus,
    pub filled_qty: Quantity,
    pub remaining_qty: Quantity,
    /// Trades the order took part in as taker
    pub trades: Vec<Transaction>,
}

impl Exchange {
    /// Validate, admit and match an order.
    ///
    /// Either the whole placement takes effect or none of it does. A market
    /// order that cannot be filled completely is kept as a `Cancelled` record
    /// and reported through the receipt, not as an error.
    pub fn place_order(&self, request: OrderRequest) -> ExchangeResult<PlacementReceipt> {
        match self.admit(&request) {
            Ok((receipt, events)) => {
                self.emit(events);
                Ok(receipt)
            },
            Err(err) => {
                if err.is_fatal() {
                    tracing::error!(user_id = %request.user_id, ticker = %request.ticker, error = %err, "placement failed");
                } else {
                    tracing::warn!(user_id = %request.user_id, ticker = %request.ticker, error = %err, "placement rejected");
                }
                self.emit(vec![ExchangeEvent::OrderRejected {
                    order_id: None,
                    user_id: request.user_id,
                    ticker: request.ticker.clone(),
                    reason: err.to_string(),
                    timestamp: Utc::now(),
                }]);
                Err(err)
            },
        }
    }

    fn admit(&self, request: &OrderRequest) -> ExchangeResult<(PlacementReceipt, Vec<ExchangeEvent>)> {
        request.validate()?;
        if !self.users.read().contains_key(&request.user_id) {
            return Err(ExchangeError::UnknownUser(request.user_id));
        }
        let listing = self.listing(&request.ticker)?;

        let guard = self.locks.acquire_within(
            [
                ResourceId::Currency,
                ResourceId::instrument(request.ticker.as_str()),
            ],
            self.config.lock_timeout,
        )?;
        if !self.still_listed(&listing) {
            self.forget_unlisted(&guard);
            return Err(ExchangeError::UnknownInstrument(request.ticker.clone()));
        }
        if !self.ledger.has_account(request.user_id) {
            return Err(ExchangeError::UnknownUser(request.user_id));
        }

        let mut market = listing.market.lock();
        let order = Order::new(request, self.order_sequence.fetch_add(1, Ordering::AcqRel));
        let MatchOutcome {
            order,
            trades,
            executed_makers,
            rested,
        } = self.matcher.execute(
            &self.ledger,
            &guard,
            &mut market.book,
            order,
            &self.trade_sequence,
        )?;

        let now = Utc::now();
        let mut events = Vec::with_capacity(trades.len() + executed_makers.len() + 2);
        if order.status() == OrderStatus::Cancelled {
            events.push(ExchangeEvent::OrderRejected {
                order_id: Some(order.id),
                user_id: order.user_id,
                ticker: order.ticker.clone(),
                reason: "insufficient liquidity for market order".to_string(),
                timestamp: now,
            });
        } else {
            events.push(ExchangeEvent::OrderAccepted {
                order_id: order.id,
                user_id: order.user_id,
                ticker: order.ticker.clone(),
                direction: order.direction,
                timestamp: now,
            });
        }
        events.extend(trades.iter().map(|trade| ExchangeEvent::TradeExecuted {
            trade: trade.clone(),
            timestamp: now,
        }));

        for maker in executed_makers {
            events.push(ExchangeEvent::OrderExecuted {
                order_id: maker.id,
                total_filled: maker.filled_qty(),
                timestamp: now,
            });
            market.archive(maker);
        }

        match (rested, order.price) {
            (true, Some(price)) => events.push(ExchangeEvent::OrderRested {
                order_id: order.id,
                price,
                quantity: order.remaining_qty(),
                timestamp: now,
            }),
            _ => {
                if order.status() == OrderStatus::Executed {
                    events.push(ExchangeEvent::OrderExecuted {
                        order_id: order.id,
                        total_filled: order.filled_qty(),
                        timestamp: now,
                    });
                }
                market.archive(order.clone());
            },
        }

        self.order_index.write().insert(order.id, order.ticker.clone());
        for trade in &trades {
            listing.tape.record(trade.clone());
        }
        drop(market);
        drop(guard);

        tracing::info!(
            order_id = %order.id,
            ticker = %order.ticker,
            direction = ?order.direction,
            status = ?order.status(),
            filled = %order.filled_qty(),
            trades = trades.len(),
            "order placed"
        );

        let receipt = PlacementReceipt {
            order_id: order.id,
            status: order.status(),
            filled_qty: order.filled_qty(),
            remaining_qty: order.remaining_qty(),
            trades,
        };
        Ok((receipt, events))
    }

    /// Cancel a resting limit order of `user_id` and release what it still
    /// reserves. Returns the cancelled order.
    ///
    /// Orders of other users are reported as `NotFound`. Executed, cancelled
    /// and market orders give `InvalidState`.
    pub fn cancel_order(&self, order_id: OrderId, user_id: UserId) -> ExchangeResult<Order> {
        match self.try_cancel(order_id, user_id) {
            Ok((order, released)) => {
                tracing::info!(%order_id, %user_id, %released, "order cancelled");
                self.emit(vec![ExchangeEvent::OrderCancelled {
                    order_id,
                    released,
                    timestamp: Utc::now(),
                }]);
                Ok(order)
            },
            Err(err) => {
                if err.is_fatal() {
                    tracing::error!(%order_id, %user_id, error = %err, "cancel failed");
                } else {
                    tracing::warn!(%order_id, %user_id, error = %err, "cancel rejected");
                }
                Err(err)
            },
        }
    }

    fn try_cancel(&self, order_id: OrderId, user_id: UserId) -> ExchangeResult<(Order, Amount)> {
        let ticker = self
            .order_index
            .read()
            .get(&order_id)
            .cloned()
            .ok_or(ExchangeError::NotFound(order_id))?;
        let listing = self
            .listing(&ticker)
            .map_err(|_| ExchangeError::NotFound(order_id))?;

        // Owner and direction never change, so they can be read before locking
        let direction = {
            let market = listing.market.lock();
            match market.get(&order_id) {
                Some(order) if order.user_id == user_id => order.direction,
                _ => return Err(ExchangeError::NotFound(order_id)),
            }
        };

        let instrument = ResourceId::instrument(ticker.as_str());
        let resources: SmallVec<[ResourceId; 2]> = match direction {
            Direction::Bid => smallvec![ResourceId::Currency, instrument],
            Direction::Ask => smallvec![instrument],
        };
        let guard = self.locks.acquire_within(resources, self.config.lock_timeout)?;
        if !self.still_listed(&listing) {
            return Err(ExchangeError::NotFound(order_id));
        }

        let mut market = listing.market.lock();
        if market.book.get(&order_id).is_none() {
            return Err(match market.get_archived(&order_id) {
                Some(order) => ExchangeError::InvalidState {
                    order_id,
                    status: order.status(),
                    reason: if order.is_market_order() {
                        "market orders never rest"
                    } else {
                        "order is already in a terminal state"
                    },
                },
                None => ExchangeError::NotFound(order_id),
            });
        }

        self.release_and_cancel(&guard, &mut market, &order_id)
    }
}
