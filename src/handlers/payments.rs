use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    entities::enums::PaymentMethod, errors::ServiceError, tenant::TenantContext, ApiResponse,
    AppState,
};

#[derive(Debug, Deserialize)]
pub struct RecordPaymentRequest {
    pub payment_method: PaymentMethod,
    pub amount: Decimal,
    pub transaction_ref: Option<String>,
}

pub async fn record_payment(
    State(state): State<AppState>,
    ctx: TenantContext,
    Path(order_id): Path<Uuid>,
    Json(request): Json<RecordPaymentRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let payment = state
        .payments
        .record_payment(
            &ctx,
            order_id,
            request.payment_method,
            request.amount,
            request.transaction_ref,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(payment))))
}

pub async fn refund_payment(
    State(state): State<AppState>,
    ctx: TenantContext,
    Path(payment_id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let payment = state.payments.refund_payment(&ctx, payment_id).await?;
    Ok(Json(ApiResponse::success(payment)))
}

pub async fn payment_summary(
    State(state): State<AppState>,
    ctx: TenantContext,
    Path(order_id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let summary = state.payments.payment_summary(&ctx, order_id).await?;
    Ok(Json(ApiResponse::success(summary)))
}

pub async fn list_payments(
    State(state): State<AppState>,
    ctx: TenantContext,
    Path(order_id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let payments = state.payments.list_payments(&ctx, order_id).await?;
    Ok(Json(ApiResponse::success(payments)))
}
