//! Concurrent writers: confirmation and payment races must never double-book
//! stock or overshoot the order total.

mod common;

use common::{one_line_order, TestApp};
use rust_decimal_macros::dec;
use salespoint_api::entities::enums::{OrderStatus, PaymentMethod};
use salespoint_api::errors::ServiceError;

#[tokio::test]
async fn concurrent_confirmations_deduct_stock_exactly_once() {
    let app = TestApp::new().await;
    let ctx = app.tenant();
    let (product, _) = app.seed_stocked_product(&ctx, 100, 50).await;

    let order = app
        .orders
        .create_order(&ctx, one_line_order(product, 5, dec!(10.00)))
        .await
        .unwrap();
    app.orders
        .transition_order(&ctx, order.id, OrderStatus::Pending)
        .await
        .unwrap();

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let orders = app.orders.clone();
        let order_id = order.id;
        tasks.push(tokio::spawn(async move {
            orders
                .transition_order(&ctx, order_id, OrderStatus::Confirmed)
                .await
        }));
    }

    let mut successes = 0;
    for task in tasks {
        match task.await.expect("task panicked") {
            Ok(_) => successes += 1,
            Err(
                ServiceError::IllegalTransition { .. } | ServiceError::ConcurrencyConflict(_),
            ) => {}
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }

    assert_eq!(successes, 1, "exactly one confirmation must win");
    assert_eq!(app.stock.current_stock(&ctx, product, None).await.unwrap(), 45);

    let (movements, _) = app
        .stock
        .movement_history(&ctx, product, None, 1, 50)
        .await
        .unwrap();
    assert_eq!(movements.len(), 1, "the losers must not append deductions");

    let after = app.orders.get_order(&ctx, order.id).await.unwrap();
    assert_eq!(after.status, OrderStatus::Confirmed);
}

#[tokio::test]
async fn concurrent_creates_produce_unique_order_numbers() {
    let app = TestApp::new().await;
    let ctx = app.tenant();
    let product = app.seed_product(&ctx, 100);

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let orders = app.orders.clone();
        tasks.push(tokio::spawn(async move {
            orders
                .create_order(&ctx, one_line_order(product, 1, dec!(10.00)))
                .await
        }));
    }

    let mut numbers = Vec::new();
    for task in tasks {
        let order = task.await.expect("task panicked").expect("create failed");
        numbers.push(order.order_number);
    }

    let date_prefix = format!("ORD{}", chrono::Utc::now().format("%Y%m%d"));
    for number in &numbers {
        assert!(number.starts_with(&date_prefix), "bad number {number}");
    }

    numbers.sort();
    numbers.dedup();
    assert_eq!(numbers.len(), 8, "every create must get its own number");
}

#[tokio::test]
async fn concurrent_payments_never_overshoot_the_total() {
    let app = TestApp::new().await;
    let ctx = app.tenant();
    let product = app.seed_product(&ctx, 100);

    // Total: 2 x 125 + 19% tax = 297.50
    let order = app
        .orders
        .create_order(&ctx, one_line_order(product, 2, dec!(125.00)))
        .await
        .unwrap();
    assert_eq!(order.total_amount, dec!(297.50));

    let mut tasks = Vec::new();
    for _ in 0..6 {
        let payments = app.payments.clone();
        let order_id = order.id;
        tasks.push(tokio::spawn(async move {
            payments
                .record_payment(&ctx, order_id, PaymentMethod::Card, dec!(100.00), None)
                .await
        }));
    }

    let mut successes = 0;
    for task in tasks {
        match task.await.expect("task panicked") {
            Ok(_) => successes += 1,
            Err(
                ServiceError::OverpaymentRejected { .. } | ServiceError::ConcurrencyConflict(_),
            ) => {}
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }

    // 2 x 100 fits under 297.50; a third payment would overshoot.
    assert_eq!(successes, 2);

    let summary = app.payments.payment_summary(&ctx, order.id).await.unwrap();
    assert_eq!(summary.total_paid, dec!(200.00));
    assert!(summary.total_paid <= order.total_amount);
}

#[tokio::test]
async fn concurrent_movements_keep_counter_and_ledger_consistent() {
    let app = TestApp::new().await;
    let ctx = app.tenant();
    let product = app.seed_product(&ctx, 0);
    let location = app.seed_location(&ctx, product, "MAIN", 1000, 0).await;

    let mut tasks = Vec::new();
    for _ in 0..10 {
        let stock = app.stock.clone();
        tasks.push(tokio::spawn(async move {
            stock
                .apply_movement(
                    &ctx,
                    salespoint_api::services::stock::RecordMovementCommand {
                        product_id: product,
                        location_id: location,
                        movement_type: salespoint_api::entities::enums::MovementType::In,
                        quantity: 7,
                        reference_id: None,
                        notes: None,
                    },
                )
                .await
        }));
    }

    let mut successes = 0;
    for task in tasks {
        match task.await.expect("task panicked") {
            Ok(_) => successes += 1,
            Err(ServiceError::ConcurrencyConflict(_)) => {}
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }

    // Whatever the race outcome, the counter must equal the replayed ledger.
    let counter = app
        .stock
        .current_stock(&ctx, product, Some(location))
        .await
        .unwrap();
    assert_eq!(counter, successes * 7);

    let rebuilt = app.stock.rebuild_counter(&ctx, product, location).await.unwrap();
    assert_eq!(rebuilt as i64, counter);
}
