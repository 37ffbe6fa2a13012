use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    entities::enums::MovementType,
    errors::ServiceError,
    services::stock::RecordMovementCommand,
    tenant::TenantContext,
    ApiResponse, AppState, PaginatedResponse,
};

#[derive(Debug, Deserialize)]
pub struct RecordMovementRequest {
    pub product_id: Uuid,
    pub location_id: Uuid,
    pub movement_type: MovementType,
    pub quantity: i32,
    pub reference_id: Option<Uuid>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StockQuery {
    pub product_id: Uuid,
    pub location_id: Option<Uuid>,
    #[serde(default = "default_page")]
    pub page: u64,
    #[serde(default = "default_limit")]
    pub limit: u64,
}

#[derive(Debug, Deserialize)]
pub struct LevelsQuery {
    pub product_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct CurrentStockResponse {
    pub product_id: Uuid,
    pub location_id: Option<Uuid>,
    pub quantity: i64,
}

#[derive(Debug, Serialize)]
pub struct RebuildResponse {
    pub product_id: Uuid,
    pub location_id: Uuid,
    pub current_stock: i32,
}

fn default_page() -> u64 {
    1
}

fn default_limit() -> u64 {
    25
}

pub async fn record_movement(
    State(state): State<AppState>,
    ctx: TenantContext,
    Json(request): Json<RecordMovementRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let movement = state
        .stock
        .apply_movement(
            &ctx,
            RecordMovementCommand {
                product_id: request.product_id,
                location_id: request.location_id,
                movement_type: request.movement_type,
                quantity: request.quantity,
                reference_id: request.reference_id,
                notes: request.notes,
            },
        )
        .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(movement))))
}

pub async fn movement_history(
    State(state): State<AppState>,
    ctx: TenantContext,
    Query(query): Query<StockQuery>,
) -> Result<impl IntoResponse, ServiceError> {
    let (movements, total) = state
        .stock
        .movement_history(
            &ctx,
            query.product_id,
            query.location_id,
            query.page,
            query.limit,
        )
        .await?;
    Ok(Json(ApiResponse::success(PaginatedResponse {
        items: movements,
        total,
        page: query.page,
        limit: query.limit,
    })))
}

pub async fn current_stock(
    State(state): State<AppState>,
    ctx: TenantContext,
    Query(query): Query<StockQuery>,
) -> Result<impl IntoResponse, ServiceError> {
    let quantity = state
        .stock
        .current_stock(&ctx, query.product_id, query.location_id)
        .await?;
    Ok(Json(ApiResponse::success(CurrentStockResponse {
        product_id: query.product_id,
        location_id: query.location_id,
        quantity,
    })))
}

pub async fn stock_levels(
    State(state): State<AppState>,
    ctx: TenantContext,
    Query(query): Query<LevelsQuery>,
) -> Result<impl IntoResponse, ServiceError> {
    let levels = state.stock.stock_levels(&ctx, query.product_id).await?;
    Ok(Json(ApiResponse::success(levels)))
}

#[derive(Debug, Deserialize)]
pub struct RebuildRequest {
    pub product_id: Uuid,
    pub location_id: Uuid,
}

pub async fn rebuild_counter(
    State(state): State<AppState>,
    ctx: TenantContext,
    Json(request): Json<RebuildRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let current_stock = state
        .stock
        .rebuild_counter(&ctx, request.product_id, request.location_id)
        .await?;
    Ok(Json(ApiResponse::success(RebuildResponse {
        product_id: request.product_id,
        location_id: request.location_id,
        current_stock,
    })))
}
