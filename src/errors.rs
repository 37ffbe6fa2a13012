use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entities::enums::OrderStatus;

/// Standard JSON error body returned by every handler.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// HTTP status category (e.g., "Not Found", "Conflict")
    pub error: String,
    /// Human-readable error description
    pub message: String,
    /// ISO 8601 timestamp when the error occurred
    pub timestamp: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] sea_orm::error::DbErr),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Illegal transition from {from} to {to}; valid targets: {valid:?}")]
    IllegalTransition {
        from: OrderStatus,
        to: OrderStatus,
        valid: Vec<OrderStatus>,
    },

    #[error("Insufficient stock: {0}")]
    InsufficientStock(String),

    #[error("Insufficient stock across locations for product {product_id}: requested {requested}")]
    InsufficientStockAcrossLocations { product_id: Uuid, requested: i32 },

    #[error("Capacity exceeded at location {location_id}: {current} + {incoming} > {capacity}")]
    CapacityExceeded {
        location_id: Uuid,
        current: i32,
        incoming: i32,
        capacity: i32,
    },

    #[error("Overpayment rejected: attempted {attempted}, remaining balance {remaining}")]
    OverpaymentRejected {
        attempted: rust_decimal::Decimal,
        remaining: rust_decimal::Decimal,
    },

    #[error("Payment {0} is already refunded")]
    AlreadyRefunded(Uuid),

    #[error("Order {order_id} is not deletable in status {status}; cancel or void it instead")]
    OrderNotDeletable {
        order_id: Uuid,
        status: OrderStatus,
    },

    #[error("Concurrent modification: {0}")]
    ConcurrencyConflict(String),

    #[error("Event error: {0}")]
    EventError(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

impl ServiceError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::ValidationError(_) => StatusCode::BAD_REQUEST,
            ServiceError::IllegalTransition { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            ServiceError::InsufficientStock(_)
            | ServiceError::InsufficientStockAcrossLocations { .. }
            | ServiceError::CapacityExceeded { .. }
            | ServiceError::OverpaymentRejected { .. }
            | ServiceError::AlreadyRefunded(_)
            | ServiceError::OrderNotDeletable { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            ServiceError::ConcurrencyConflict(_) => StatusCode::CONFLICT,
            ServiceError::DatabaseError(_)
            | ServiceError::EventError(_)
            | ServiceError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message exposed at the API boundary. Storage failures are surfaced as an
    /// opaque internal error; business-rule failures pass through unchanged.
    pub fn response_message(&self) -> String {
        match self {
            ServiceError::DatabaseError(_) | ServiceError::InternalError(_) => {
                "Internal server error".to_string()
            }
            other => other.to_string(),
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let err = ErrorResponse {
            error: status.canonical_reason().unwrap_or("Error").to_string(),
            message: self.response_message(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        };
        (status, Json(err)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn business_errors_map_to_unprocessable_entity() {
        let err = ServiceError::OverpaymentRejected {
            attempted: rust_decimal_macros::dec!(500),
            remaining: rust_decimal_macros::dec!(400),
        };
        assert_eq!(err.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
        assert!(err.response_message().contains("500"));
    }

    #[test]
    fn database_errors_are_opaque_at_the_boundary() {
        let err = ServiceError::DatabaseError(sea_orm::DbErr::Custom("table exploded".into()));
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.response_message(), "Internal server error");
    }

    #[test]
    fn concurrency_conflict_maps_to_409() {
        let err = ServiceError::ConcurrencyConflict("order version changed".into());
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
    }
}
