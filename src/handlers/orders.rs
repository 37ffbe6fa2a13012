use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    entities::enums::OrderStatus,
    errors::ServiceError,
    services::orders::{CreateOrderRequest, UpdateOrderDetails},
    tenant::TenantContext,
    ApiResponse, AppState, ListQuery,
};

#[derive(Debug, Deserialize)]
pub struct TransitionRequest {
    pub target: OrderStatus,
}

pub async fn create_order(
    State(state): State<AppState>,
    ctx: TenantContext,
    Json(request): Json<CreateOrderRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let order = state.orders.create_order(&ctx, request).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(order))))
}

pub async fn get_order(
    State(state): State<AppState>,
    ctx: TenantContext,
    Path(order_id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let order = state.orders.get_order(&ctx, order_id).await?;
    Ok(Json(ApiResponse::success(order)))
}

pub async fn list_orders(
    State(state): State<AppState>,
    ctx: TenantContext,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse, ServiceError> {
    let orders = state
        .orders
        .list_orders(&ctx, query.page, query.limit)
        .await?;
    Ok(Json(ApiResponse::success(orders)))
}

pub async fn update_order(
    State(state): State<AppState>,
    ctx: TenantContext,
    Path(order_id): Path<Uuid>,
    Json(details): Json<UpdateOrderDetails>,
) -> Result<impl IntoResponse, ServiceError> {
    let order = state
        .orders
        .update_order_details(&ctx, order_id, details)
        .await?;
    Ok(Json(ApiResponse::success(order)))
}

pub async fn transition_order(
    State(state): State<AppState>,
    ctx: TenantContext,
    Path(order_id): Path<Uuid>,
    Json(request): Json<TransitionRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let order = state
        .orders
        .transition_order(&ctx, order_id, request.target)
        .await?;
    Ok(Json(ApiResponse::success(order)))
}

pub async fn lookup_by_order_number(
    State(state): State<AppState>,
    ctx: TenantContext,
    Path(order_number): Path<String>,
) -> Result<impl IntoResponse, ServiceError> {
    let order_id = state
        .orders
        .find_order_id_by_order_number(&ctx, &order_number)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_number)))?;
    let order = state.orders.get_order(&ctx, order_id).await?;
    Ok(Json(ApiResponse::success(order)))
}

pub async fn delete_order(
    State(state): State<AppState>,
    ctx: TenantContext,
    Path(order_id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    state.orders.delete_order(&ctx, order_id).await?;
    Ok(Json(ApiResponse::<()>::message("Order deleted")))
}
