//! Tenant/actor context and the shared tenant-scoped query helpers.
//!
//! Every read and write in the fulfillment core goes through one of these
//! finders (or adds the same filters inside a service transaction), so a
//! row belonging to another tenant is indistinguishable from a missing row.

use axum::{
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
};
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter};
use uuid::Uuid;

use crate::entities::{order, payment, warehouse_location};
use crate::errors::ServiceError;

/// Authenticated caller context. The surrounding auth layer is trusted to
/// have verified it; the core only scopes by it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TenantContext {
    pub tenant_id: Uuid,
    pub actor_id: Uuid,
}

impl TenantContext {
    pub fn new(tenant_id: Uuid, actor_id: Uuid) -> Self {
        Self {
            tenant_id,
            actor_id,
        }
    }
}

const TENANT_HEADER: &str = "x-tenant-id";
const ACTOR_HEADER: &str = "x-actor-id";

fn header_uuid(parts: &Parts, name: &str) -> Result<Uuid, (StatusCode, String)> {
    let raw = parts
        .headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            (
                StatusCode::UNAUTHORIZED,
                format!("missing {} header", name),
            )
        })?;
    Uuid::parse_str(raw)
        .map_err(|_| (StatusCode::BAD_REQUEST, format!("invalid {} header", name)))
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for TenantContext
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, String);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let tenant_id = header_uuid(parts, TENANT_HEADER)?;
        let actor_id = header_uuid(parts, ACTOR_HEADER)?;
        Ok(TenantContext::new(tenant_id, actor_id))
    }
}

/// Fetches an order within the caller's tenant or reports NotFound.
pub async fn find_order<C: ConnectionTrait>(
    conn: &C,
    ctx: &TenantContext,
    order_id: Uuid,
) -> Result<order::Model, ServiceError> {
    order::Entity::find_by_id(order_id)
        .filter(order::Column::TenantId.eq(ctx.tenant_id))
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))
}

/// Fetches a payment within the caller's tenant or reports NotFound.
pub async fn find_payment<C: ConnectionTrait>(
    conn: &C,
    ctx: &TenantContext,
    payment_id: Uuid,
) -> Result<payment::Model, ServiceError> {
    payment::Entity::find_by_id(payment_id)
        .filter(payment::Column::TenantId.eq(ctx.tenant_id))
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Payment {} not found", payment_id)))
}

/// Fetches a warehouse location within the caller's tenant or reports NotFound.
pub async fn find_location<C: ConnectionTrait>(
    conn: &C,
    ctx: &TenantContext,
    location_id: Uuid,
) -> Result<warehouse_location::Model, ServiceError> {
    warehouse_location::Entity::find_by_id(location_id)
        .filter(warehouse_location::Column::TenantId.eq(ctx.tenant_id))
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Location {} not found", location_id)))
}
