//! Thin HTTP adapters over the fulfillment services and the API router.

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::AppState;

pub mod health;
pub mod orders;
pub mod payments;
pub mod stock;

pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route(
            "/orders",
            post(orders::create_order).get(orders::list_orders),
        )
        .route(
            "/orders/:id",
            get(orders::get_order)
                .put(orders::update_order)
                .delete(orders::delete_order),
        )
        .route("/orders/:id/transition", post(orders::transition_order))
        .route(
            "/orders/by-number/:order_number",
            get(orders::lookup_by_order_number),
        )
        .route(
            "/orders/:id/payments",
            post(payments::record_payment).get(payments::list_payments),
        )
        .route(
            "/orders/:id/payments/summary",
            get(payments::payment_summary),
        )
        .route("/payments/:id/refund", post(payments::refund_payment))
        .route(
            "/stock/movements",
            post(stock::record_movement).get(stock::movement_history),
        )
        .route("/stock/levels", get(stock::stock_levels))
        .route("/stock/current", get(stock::current_stock))
        .route("/stock/rebuild", post(stock::rebuild_counter));

    Router::new()
        .route("/health", get(health::health))
        .nest("/api/v1", api)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
