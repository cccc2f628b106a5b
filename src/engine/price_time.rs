// ============================================================================
// Price/Time Priority Matching Algorithm (FIFO)
// ============================================================================

use crate::domain::{Order, OrderBookSide};
use crate::interfaces::{Fill, MatchPlan, MatchingAlgorithm};
use rust_decimal::Decimal;

/// Price/Time Priority (FIFO) matching algorithm
///
/// Resting orders are taken best price first; orders at the same price are
/// taken in placement order. Every fill executes at the resting order's price.
///
/// # Example
/// ```text
/// Book:  ASK 100 @ 40 (Order A, seq=1)
///        ASK 100 @ 60 (Order B, seq=2)
///
/// Incoming: BID 70 @ 105
/// Result: 40 with A at 100, then 30 with B at 100
/// ```
#[derive(Debug, Default, Clone, Copy)]
pub struct PriceTimePriority;

impl PriceTimePriority {
    pub fn new() -> Self {
        Self
    }
}

impl MatchingAlgorithm for PriceTimePriority {
    fn plan(&self, incoming: &Order, opposite_side: &OrderBookSide) -> MatchPlan {
        let mut fills = Vec::new();
        let mut wanted = incoming.remaining_qty();

        for maker in opposite_side.iter() {
            if wanted <= Decimal::ZERO {
                break;
            }

            // Resting orders always carry a price
            let Some(price) = maker.price else {
                continue;
            };
            if !self.prices_cross(incoming, price) {
                break;
            }

            let quantity = wanted.min(maker.remaining_qty());
            fills.push(Fill {
                maker_order_id: maker.id,
                maker_user_id: maker.user_id,
                price,
                quantity,
            });
            wanted -= quantity;
        }

        MatchPlan { fills }
    }

    fn name(&self) -> &str {
        "PriceTime"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Direction, OrderBook, OrderRequest, UserId};
    use rust_decimal_macros::dec;

    fn resting(book: &mut OrderBook, direction: Direction, price: Decimal, qty: Decimal, seq: u64) -> Order {
        let order = Order::new(
            &OrderRequest::limit(UserId::new(), "SBER", direction, qty, price),
            seq,
        );
        book.insert(order.clone()).unwrap();
        order
    }

    fn incoming(direction: Direction, price: Option<Decimal>, qty: Decimal) -> Order {
        let request = OrderRequest {
            user_id: UserId::new(),
            ticker: "SBER".to_string(),
            direction,
            quantity: qty,
            price,
        };
        Order::new(&request, 100)
    }

    #[test]
    fn test_price_time_fifo_order() {
        let algo = PriceTimePriority::new();
        let mut book = OrderBook::new("SBER".to_string());
        let first = resting(&mut book, Direction::Ask, dec!(100), dec!(1), 1);
        let _second = resting(&mut book, Direction::Ask, dec!(100), dec!(1), 2);

        let plan = algo.plan(
            &incoming(Direction::Bid, Some(dec!(100)), dec!(1)),
            book.side(Direction::Ask),
        );

        assert_eq!(plan.fills.len(), 1);
        // Earlier order at the same price goes first
        assert_eq!(plan.fills[0].maker_order_id, first.id);
    }

    #[test]
    fn test_better_price_beats_earlier_order() {
        let algo = PriceTimePriority::new();
        let mut book = OrderBook::new("SBER".to_string());
        resting(&mut book, Direction::Bid, dec!(99), dec!(5), 1);
        let best = resting(&mut book, Direction::Bid, dec!(101), dec!(5), 2);

        let plan = algo.plan(
            &incoming(Direction::Ask, Some(dec!(95)), dec!(3)),
            book.side(Direction::Bid),
        );

        assert_eq!(plan.fills[0].maker_order_id, best.id);
        assert_eq!(plan.fills[0].price, dec!(101));
    }

    #[test]
    fn test_fills_execute_at_maker_price() {
        let algo = PriceTimePriority::new();
        let mut book = OrderBook::new("SBER".to_string());
        resting(&mut book, Direction::Ask, dec!(90), dec!(2), 1);
        resting(&mut book, Direction::Ask, dec!(95), dec!(2), 2);

        let plan = algo.plan(
            &incoming(Direction::Bid, Some(dec!(120)), dec!(3)),
            book.side(Direction::Ask),
        );

        let executed: Vec<_> = plan.fills.iter().map(|f| (f.price, f.quantity)).collect();
        assert_eq!(executed, vec![(dec!(90), dec!(2)), (dec!(95), dec!(1))]);
        assert_eq!(plan.filled(), dec!(3));
        assert_eq!(plan.notional().unwrap(), dec!(275));
    }

    #[test]
    fn test_limit_stops_at_price_constraint() {
        let algo = PriceTimePriority::new();
        let mut book = OrderBook::new("SBER".to_string());
        resting(&mut book, Direction::Ask, dec!(100), dec!(40), 1);
        resting(&mut book, Direction::Ask, dec!(110), dec!(40), 2);

        let plan = algo.plan(
            &incoming(Direction::Bid, Some(dec!(105)), dec!(100)),
            book.side(Direction::Ask),
        );

        assert_eq!(plan.fills.len(), 1);
        assert_eq!(plan.filled(), dec!(40));
    }

    #[test]
    fn test_market_order_ignores_price() {
        let algo = PriceTimePriority::new();
        let mut book = OrderBook::new("SBER".to_string());
        resting(&mut book, Direction::Ask, dec!(100), dec!(10), 1);
        resting(&mut book, Direction::Ask, dec!(1000), dec!(10), 2);

        let plan = algo.plan(&incoming(Direction::Bid, None, dec!(15)), book.side(Direction::Ask));

        assert_eq!(plan.filled(), dec!(15));
        assert_eq!(plan.notional().unwrap(), dec!(6000));
    }

    #[test]
    fn test_plan_leaves_book_untouched() {
        let algo = PriceTimePriority::new();
        let mut book = OrderBook::new("SBER".to_string());
        let maker = resting(&mut book, Direction::Ask, dec!(100), dec!(10), 1);

        let plan = algo.plan(
            &incoming(Direction::Bid, Some(dec!(100)), dec!(4)),
            book.side(Direction::Ask),
        );

        assert_eq!(plan.filled(), dec!(4));
        assert_eq!(book.get(&maker.id).unwrap().remaining_qty(), dec!(10));
    }

    #[test]
    fn test_empty_book_gives_empty_plan() {
        let algo = PriceTimePriority::new();
        let book = OrderBook::new("SBER".to_string());

        let plan = algo.plan(&incoming(Direction::Ask, None, dec!(1)), book.side(Direction::Bid));

        assert!(plan.is_empty());
        assert_eq!(plan.notional().unwrap(), Decimal::ZERO);
    }
}
