//! Stock ledger: movement directions, capacity guard, replay, rebuild,
//! first-fit order deduction.

mod common;

use assert_matches::assert_matches;
use common::{one_line_order, TestApp};
use rust_decimal_macros::dec;
use salespoint_api::entities::enums::{MovementType, OrderStatus};
use salespoint_api::errors::ServiceError;
use salespoint_api::services::stock::RecordMovementCommand;
use uuid::Uuid;

fn movement(
    product_id: Uuid,
    location_id: Uuid,
    movement_type: MovementType,
    quantity: i32,
) -> RecordMovementCommand {
    RecordMovementCommand {
        product_id,
        location_id,
        movement_type,
        quantity,
        reference_id: None,
        notes: None,
    }
}

#[tokio::test]
async fn movements_update_the_counter_by_type() {
    let app = TestApp::new().await;
    let ctx = app.tenant();
    let product = app.seed_product(&ctx, 0);
    let location = app.seed_location(&ctx, product, "MAIN", 100, 0).await;

    app.stock
        .apply_movement(&ctx, movement(product, location, MovementType::In, 40))
        .await
        .unwrap();
    app.stock
        .apply_movement(&ctx, movement(product, location, MovementType::Out, 10))
        .await
        .unwrap();
    app.stock
        .apply_movement(&ctx, movement(product, location, MovementType::Damage, 3))
        .await
        .unwrap();
    app.stock
        .apply_movement(&ctx, movement(product, location, MovementType::Return, 2))
        .await
        .unwrap();
    app.stock
        .apply_movement(&ctx, movement(product, location, MovementType::Adjust, 4))
        .await
        .unwrap();

    // 40 - 10 - 3 + 2 - 4
    assert_eq!(
        app.stock
            .current_stock(&ctx, product, Some(location))
            .await
            .unwrap(),
        25
    );
}

#[tokio::test]
async fn quantities_must_be_positive() {
    let app = TestApp::new().await;
    let ctx = app.tenant();
    let product = app.seed_product(&ctx, 0);
    let location = app.seed_location(&ctx, product, "MAIN", 100, 0).await;

    for qty in [0, -5] {
        assert_matches!(
            app.stock
                .apply_movement(&ctx, movement(product, location, MovementType::In, qty))
                .await,
            Err(ServiceError::ValidationError(_))
        );
    }
}

#[tokio::test]
async fn outbound_movements_cannot_drive_stock_negative() {
    let app = TestApp::new().await;
    let ctx = app.tenant();
    let product = app.seed_product(&ctx, 0);
    let location = app.seed_location(&ctx, product, "MAIN", 100, 5).await;

    assert_matches!(
        app.stock
            .apply_movement(&ctx, movement(product, location, MovementType::Out, 6))
            .await,
        Err(ServiceError::InsufficientStock(_))
    );
    // State unchanged after the rejection.
    assert_eq!(
        app.stock
            .current_stock(&ctx, product, Some(location))
            .await
            .unwrap(),
        5
    );
}

#[tokio::test]
async fn inbound_movements_respect_capacity() {
    let app = TestApp::new().await;
    let ctx = app.tenant();
    let product = app.seed_product(&ctx, 0);
    let location = app.seed_location(&ctx, product, "SMALL", 50, 45).await;

    let err = app
        .stock
        .apply_movement(&ctx, movement(product, location, MovementType::In, 10))
        .await
        .unwrap_err();
    match err {
        ServiceError::CapacityExceeded {
            location_id,
            current,
            incoming,
            capacity,
        } => {
            assert_eq!(location_id, location);
            assert_eq!(current, 45);
            assert_eq!(incoming, 10);
            assert_eq!(capacity, 50);
        }
        other => panic!("unexpected error: {other:?}"),
    }

    // Counter and ledger are untouched.
    assert_eq!(
        app.stock
            .current_stock(&ctx, product, Some(location))
            .await
            .unwrap(),
        45
    );
    let (movements, _) = app
        .stock
        .movement_history(&ctx, product, Some(location), 1, 10)
        .await
        .unwrap();
    assert!(movements.is_empty());

    // Filling exactly to capacity is fine.
    app.stock
        .apply_movement(&ctx, movement(product, location, MovementType::In, 5))
        .await
        .unwrap();
    assert_eq!(
        app.stock
            .current_stock(&ctx, product, Some(location))
            .await
            .unwrap(),
        50
    );
}

#[tokio::test]
async fn replaying_the_ledger_matches_the_counter() {
    let app = TestApp::new().await;
    let ctx = app.tenant();
    let product = app.seed_product(&ctx, 0);
    let location = app.seed_location(&ctx, product, "MAIN", 1000, 0).await;

    for (movement_type, qty) in [
        (MovementType::In, 100),
        (MovementType::Out, 30),
        (MovementType::Return, 5),
        (MovementType::Damage, 2),
        (MovementType::In, 20),
        (MovementType::Adjust, 8),
    ] {
        app.stock
            .apply_movement(&ctx, movement(product, location, movement_type, qty))
            .await
            .unwrap();
    }

    let counter = app
        .stock
        .current_stock(&ctx, product, Some(location))
        .await
        .unwrap();
    let rebuilt = app.stock.rebuild_counter(&ctx, product, location).await.unwrap();
    assert_eq!(counter, 85);
    assert_eq!(rebuilt as i64, counter);
}

#[tokio::test]
async fn rebuild_repairs_a_diverged_counter() {
    let app = TestApp::new().await;
    let ctx = app.tenant();
    let product = app.seed_product(&ctx, 0);
    // Seeded counter without any backing ledger entries: diverged by
    // construction.
    let location = app.seed_location(&ctx, product, "MAIN", 100, 42).await;

    let rebuilt = app.stock.rebuild_counter(&ctx, product, location).await.unwrap();
    assert_eq!(rebuilt, 0);
    assert_eq!(
        app.stock
            .current_stock(&ctx, product, Some(location))
            .await
            .unwrap(),
        0
    );
}

#[tokio::test]
async fn aggregate_stock_sums_all_locations() {
    let app = TestApp::new().await;
    let ctx = app.tenant();
    let product = app.seed_product(&ctx, 0);
    app.seed_location(&ctx, product, "A", 100, 10).await;
    app.seed_location(&ctx, product, "B", 100, 25).await;

    assert_eq!(app.stock.current_stock(&ctx, product, None).await.unwrap(), 35);

    let levels = app.stock.stock_levels(&ctx, Some(product)).await.unwrap();
    assert_eq!(levels.len(), 2);
}

#[tokio::test]
async fn order_deduction_picks_the_fullest_single_location() {
    let app = TestApp::new().await;
    let ctx = app.tenant();
    let product = app.seed_product(&ctx, 100);
    let small = app.seed_location(&ctx, product, "SMALL", 100, 5).await;
    let big = app.seed_location(&ctx, product, "BIG", 100, 30).await;

    let order = app
        .orders
        .create_order(&ctx, one_line_order(product, 8, dec!(10.00)))
        .await
        .unwrap();
    app.orders
        .transition_order(&ctx, order.id, OrderStatus::Pending)
        .await
        .unwrap();
    app.orders
        .transition_order(&ctx, order.id, OrderStatus::Confirmed)
        .await
        .unwrap();

    assert_eq!(
        app.stock.current_stock(&ctx, product, Some(big)).await.unwrap(),
        22
    );
    assert_eq!(
        app.stock
            .current_stock(&ctx, product, Some(small))
            .await
            .unwrap(),
        5
    );
}

#[tokio::test]
async fn demands_are_never_split_across_locations() {
    let app = TestApp::new().await;
    let ctx = app.tenant();
    // 12 on hand in total, but no single location can satisfy 10.
    let product = app.seed_product(&ctx, 100);
    app.seed_location(&ctx, product, "A", 100, 6).await;
    app.seed_location(&ctx, product, "B", 100, 6).await;

    let order = app
        .orders
        .create_order(&ctx, one_line_order(product, 10, dec!(10.00)))
        .await
        .unwrap();
    app.orders
        .transition_order(&ctx, order.id, OrderStatus::Pending)
        .await
        .unwrap();

    assert_matches!(
        app.orders
            .transition_order(&ctx, order.id, OrderStatus::Confirmed)
            .await,
        Err(ServiceError::InsufficientStockAcrossLocations { requested: 10, .. })
    );
    assert_eq!(app.stock.current_stock(&ctx, product, None).await.unwrap(), 12);
}

#[tokio::test]
async fn movements_are_invisible_across_tenants() {
    let app = TestApp::new().await;
    let ctx = app.tenant();
    let product = app.seed_product(&ctx, 0);
    let location = app.seed_location(&ctx, product, "MAIN", 100, 10).await;

    let stranger = app.tenant();
    assert_matches!(
        app.stock
            .apply_movement(&stranger, movement(product, location, MovementType::In, 1))
            .await,
        Err(ServiceError::NotFound(_))
    );
    assert_eq!(
        app.stock.current_stock(&stranger, product, None).await.unwrap(),
        0
    );
}

#[tokio::test]
async fn location_must_hold_the_product() {
    let app = TestApp::new().await;
    let ctx = app.tenant();
    let product = app.seed_product(&ctx, 0);
    let other_product = app.seed_product(&ctx, 0);
    let location = app.seed_location(&ctx, product, "MAIN", 100, 10).await;

    assert_matches!(
        app.stock
            .apply_movement(
                &ctx,
                movement(other_product, location, MovementType::In, 1)
            )
            .await,
        Err(ServiceError::NotFound(_))
    );
}
