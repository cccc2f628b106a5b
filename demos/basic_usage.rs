// ============================================================================
// Basic Usage Example
// ============================================================================

use exchange_engine::prelude::*;
use rust_decimal::Decimal;
use std::sync::Arc;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== Exchange Engine Example ===\n");

    // Create an exchange settling in RUB with price/time matching
    let exchange = ExchangeBuilder::new("RUB")
        .price_time_matching()
        .with_event_handler(Arc::new(LoggingEventHandler))
        .build()?;

    let admin = exchange.register_user("admin", Role::Admin)?;
    let instrument = exchange.add_instrument("SBER", "Sberbank")?;
    println!(
        "Admin {} listed {} ({})\n",
        admin, instrument.ticker, instrument.name
    );

    // Fund sellers with shares and buyers with cash
    let mut sellers = Vec::new();
    let mut buyers = Vec::new();
    for i in 0..5 {
        let seller = exchange.register_user(format!("seller_{}", i), Role::User)?;
        exchange.adjust_balance(seller, "SBER", Decimal::from(10))?;
        sellers.push(seller);

        let buyer = exchange.register_user(format!("buyer_{}", i), Role::User)?;
        exchange.adjust_balance(buyer, "RUB", Decimal::from(1_000_000))?;
        buyers.push(buyer);
    }

    // Add sell orders at different prices
    println!("Adding sell orders...");
    for (i, seller) in sellers.iter().enumerate() {
        exchange.place_order(OrderRequest::limit(
            *seller,
            "SBER",
            Direction::Ask,
            Decimal::from(1),
            Decimal::from(250 + i as i64 * 5),
        ))?;
    }

    // Add buy orders
    println!("Adding buy orders...");
    let mut resting_bids = Vec::new();
    for (i, buyer) in buyers.iter().enumerate() {
        let receipt = exchange.place_order(OrderRequest::limit(
            *buyer,
            "SBER",
            Direction::Bid,
            Decimal::from(1),
            Decimal::from(245 - i as i64 * 5),
        ))?;
        resting_bids.push((*buyer, receipt.order_id));
    }

    println!("\n=== Order Book Snapshot ===");
    print_book(&exchange.get_order_book_levels("SBER", 5)?);

    // A market buy sweeps the three best asks
    println!("\n=== Submitting Market Order ===");
    let receipt = exchange.place_order(OrderRequest::market(
        buyers[0],
        "SBER",
        Direction::Bid,
        Decimal::from(3),
    ))?;
    println!("Order {} is {:?}", receipt.order_id, receipt.status);
    for trade in &receipt.trades {
        println!(
            "  Trade #{}: {} @ {} (seller {})",
            trade.sequence, trade.quantity, trade.price, trade.seller_id
        );
    }

    // A market order the book cannot cover is cancelled with no effect
    let receipt = exchange.place_order(OrderRequest::market(
        buyers[1],
        "SBER",
        Direction::Bid,
        Decimal::from(100),
    ))?;
    println!(
        "\nOversized market order is {:?} after {} fills",
        receipt.status, receipt.filled_qty
    );

    // Cancel a resting bid and get its cash back
    let (owner, order_id) = resting_bids[4];
    let cancelled = exchange.cancel_order(order_id, owner)?;
    println!("\nCancelled order {} ({:?})", cancelled.id, cancelled.status());

    let balances = exchange.get_balances(buyers[0])?;
    println!(
        "buyer_0 holds {} RUB ({} frozen) and {:?} SBER",
        balances.currency.available(),
        balances.currency.frozen(),
        balances.instrument("SBER").map(|holding| holding.available())
    );

    println!("\n=== Recent Trades ===");
    for trade in exchange.get_recent_trades("SBER", 10)? {
        println!("  {} @ {} at {}", trade.quantity, trade.price, trade.timestamp);
    }

    println!("\n=== Final Order Book ===");
    print_book(&exchange.get_order_book_levels("SBER", 10)?);

    exchange.audit()?;
    println!("\nLedger audit passed");
    Ok(())
}

fn print_book(snapshot: &OrderBookSnapshot) {
    println!("Bids:");
    for level in &snapshot.bids {
        println!("  {} @ {} ({} orders)", level.quantity, level.price, level.orders);
    }

    println!("Asks:");
    for level in &snapshot.asks {
        println!("  {} @ {} ({} orders)", level.quantity, level.price, level.orders);
    }

    println!("Spread: {:?}", snapshot.spread);
}
