//! Order orchestration: creation, status transitions, deletion.
//!
//! Confirmation is the side-effecting transition: stock for every line is
//! deducted inside the same transaction that flips the status, so a failed
//! line leaves no partial deduction behind.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseTransaction, DbErr, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set, SqlErr, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::{
    catalog::ProductLookup,
    config::TenantSettings,
    db::DbPool,
    entities::enums::{OrderStatus, PaymentStatus},
    entities::order::{self, Entity as OrderEntity},
    entities::order_item::{self, Entity as OrderItemEntity},
    errors::ServiceError,
    events::{Event, EventSender},
    services::stock::StockLedgerService,
    services::totals::{self, OrderLine},
    tenant::{self, TenantContext},
};

const ORDER_NUMBER_PREFIX: &str = "ORD";
const ORDER_NUMBER_SEQ_WIDTH: usize = 5;
const CREATE_RETRY_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateOrderRequest {
    pub customer_id: Option<Uuid>,
    #[validate(length(min = 1, message = "Order must contain at least one item"))]
    pub items: Vec<OrderItemRequest>,
    pub discount_amount: Option<Decimal>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderItemRequest {
    pub product_id: Uuid,
    pub quantity: i32,
    pub unit_price: Decimal,
}

/// Per-field update for orders that are still editable (Draft or Pending).
/// Absent fields are left untouched; amounts and items are never updatable.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateOrderDetails {
    pub customer_id: Option<Uuid>,
    pub notes: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OrderResponse {
    pub id: Uuid,
    pub order_number: String,
    pub customer_id: Option<Uuid>,
    pub status: OrderStatus,
    pub subtotal: Decimal,
    pub tax_amount: Decimal,
    pub discount_amount: Decimal,
    pub total_amount: Decimal,
    pub payment_status: PaymentStatus,
    pub notes: Option<String>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub version: i32,
    pub items: Vec<OrderItemResponse>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OrderItemResponse {
    pub id: Uuid,
    pub product_id: Uuid,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub subtotal: Decimal,
    pub tax_amount: Decimal,
    pub total: Decimal,
}

#[derive(Debug, Serialize)]
pub struct OrderListResponse {
    pub orders: Vec<OrderResponse>,
    pub total: u64,
    pub page: u64,
    pub limit: u64,
}

#[derive(Clone)]
pub struct OrderService {
    db: Arc<DbPool>,
    catalog: Arc<dyn ProductLookup>,
    settings: Arc<TenantSettings>,
    event_sender: Option<Arc<EventSender>>,
}

impl OrderService {
    pub fn new(
        db: Arc<DbPool>,
        catalog: Arc<dyn ProductLookup>,
        settings: Arc<TenantSettings>,
        event_sender: Option<Arc<EventSender>>,
    ) -> Self {
        Self {
            db,
            catalog,
            settings,
            event_sender,
        }
    }

    /// Creates a Draft order with its items in one transaction.
    ///
    /// The order number is derived from the tenant's highest same-day number
    /// inside the transaction; the unique (tenant, order_number) index plus a
    /// bounded retry makes generation race-free.
    #[instrument(skip_all, fields(tenant_id = %ctx.tenant_id, item_count = request.items.len()))]
    pub async fn create_order(
        &self,
        ctx: &TenantContext,
        request: CreateOrderRequest,
    ) -> Result<OrderResponse, ServiceError> {
        request.validate()?;

        self.preflight_items(ctx, &request.items).await?;

        let lines: Vec<OrderLine> = request
            .items
            .iter()
            .map(|item| OrderLine {
                product_id: item.product_id,
                quantity: item.quantity,
                unit_price: item.unit_price,
            })
            .collect();
        let tax_rate = self.settings.tax_rate(ctx.tenant_id);
        let discount = request.discount_amount.unwrap_or(Decimal::ZERO);
        let totals = totals::calculate(&lines, tax_rate, discount)?;

        let db = &*self.db;
        let mut last_conflict: Option<DbErr> = None;

        for attempt in 0..CREATE_RETRY_ATTEMPTS {
            let txn = db.begin().await.map_err(|e| {
                error!(error = %e, "Failed to start transaction for order creation");
                ServiceError::DatabaseError(e)
            })?;

            let now = Utc::now();
            let order_id = Uuid::new_v4();
            let order_number = next_order_number(&txn, ctx.tenant_id, now).await?;

            let order_model = order::ActiveModel {
                id: Set(order_id),
                tenant_id: Set(ctx.tenant_id),
                order_number: Set(order_number.clone()),
                customer_id: Set(request.customer_id),
                status: Set(OrderStatus::Draft),
                subtotal: Set(totals.subtotal),
                tax_amount: Set(totals.tax_amount),
                discount_amount: Set(totals.discount_amount),
                total_amount: Set(totals.total_amount),
                payment_status: Set(PaymentStatus::Unpaid),
                notes: Set(request.notes.clone()),
                created_by: Set(ctx.actor_id),
                version: Set(1),
                ..Default::default()
            };

            let inserted = match order_model.insert(&txn).await {
                Ok(model) => model,
                Err(e) if is_unique_violation(&e) => {
                    warn!(attempt, %order_number, "Order number collision; retrying");
                    last_conflict = Some(e);
                    continue;
                }
                Err(e) => {
                    error!(error = %e, "Failed to insert order");
                    return Err(ServiceError::DatabaseError(e));
                }
            };

            let item_models: Vec<order_item::ActiveModel> = totals
                .lines
                .iter()
                .map(|line| order_item::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    tenant_id: Set(ctx.tenant_id),
                    order_id: Set(order_id),
                    product_id: Set(line.product_id),
                    quantity: Set(line.quantity),
                    unit_price: Set(line.unit_price),
                    subtotal: Set(line.subtotal),
                    tax_amount: Set(line.tax_amount),
                    total: Set(line.total),
                    created_at: Set(now),
                })
                .collect();
            OrderItemEntity::insert_many(item_models).exec(&txn).await?;

            match txn.commit().await {
                Ok(()) => {}
                Err(e) if is_unique_violation(&e) => {
                    warn!(attempt, %order_number, "Order number collision on commit; retrying");
                    last_conflict = Some(e);
                    continue;
                }
                Err(e) => {
                    error!(error = %e, "Failed to commit order creation");
                    return Err(ServiceError::DatabaseError(e));
                }
            }

            info!(order_id = %order_id, %order_number, "Order created");

            if let Some(sender) = &self.event_sender {
                sender
                    .send_best_effort(Event::OrderCreated {
                        order_id,
                        tenant_id: ctx.tenant_id,
                        order_number: inserted.order_number.clone(),
                    })
                    .await;
            }

            let items = self.load_items(ctx, order_id).await?;
            return Ok(model_to_response(inserted, items));
        }

        Err(ServiceError::ConcurrencyConflict(format!(
            "Order number generation kept colliding: {}",
            last_conflict
                .map(|e| e.to_string())
                .unwrap_or_else(|| "unknown".to_string())
        )))
    }

    /// Advisory catalog check before any rows are written. The ledger check
    /// at confirmation time remains authoritative.
    async fn preflight_items(
        &self,
        ctx: &TenantContext,
        items: &[OrderItemRequest],
    ) -> Result<(), ServiceError> {
        for item in items {
            let product = self
                .catalog
                .find_product(ctx.tenant_id, item.product_id)
                .await?
                .ok_or_else(|| {
                    ServiceError::NotFound(format!("Product {} not found", item.product_id))
                })?;
            if item.quantity > product.stock_quantity {
                return Err(ServiceError::InsufficientStock(format!(
                    "Product {} has {} units available, requested {}",
                    item.product_id, product.stock_quantity, item.quantity
                )));
            }
        }
        Ok(())
    }

    #[instrument(skip_all, fields(tenant_id = %ctx.tenant_id, order_id = %order_id))]
    pub async fn get_order(
        &self,
        ctx: &TenantContext,
        order_id: Uuid,
    ) -> Result<OrderResponse, ServiceError> {
        let db = &*self.db;
        let order = tenant::find_order(db, ctx, order_id).await?;
        let items = self.load_items(ctx, order_id).await?;
        Ok(model_to_response(order, items))
    }

    #[instrument(skip_all, fields(tenant_id = %ctx.tenant_id))]
    pub async fn find_order_id_by_order_number(
        &self,
        ctx: &TenantContext,
        order_number: &str,
    ) -> Result<Option<Uuid>, ServiceError> {
        let db = &*self.db;
        let order = OrderEntity::find()
            .filter(order::Column::TenantId.eq(ctx.tenant_id))
            .filter(order::Column::OrderNumber.eq(order_number))
            .one(db)
            .await?;
        Ok(order.map(|o| o.id))
    }

    #[instrument(skip_all, fields(tenant_id = %ctx.tenant_id, page = page, limit = limit))]
    pub async fn list_orders(
        &self,
        ctx: &TenantContext,
        page: u64,
        limit: u64,
    ) -> Result<OrderListResponse, ServiceError> {
        let db = &*self.db;

        let paginator = OrderEntity::find()
            .filter(order::Column::TenantId.eq(ctx.tenant_id))
            .order_by_desc(order::Column::CreatedAt)
            .paginate(db, limit);

        let total = paginator.num_items().await?;
        let orders = paginator.fetch_page(page.saturating_sub(1)).await?;

        let mut responses = Vec::with_capacity(orders.len());
        for model in orders {
            let items = self.load_items(ctx, model.id).await?;
            responses.push(model_to_response(model, items));
        }

        Ok(OrderListResponse {
            orders: responses,
            total,
            page,
            limit,
        })
    }

    /// Moves an order along the lifecycle. Entering Confirmed deducts stock
    /// for every line; any failure rolls the whole transition back.
    #[instrument(skip_all, fields(tenant_id = %ctx.tenant_id, order_id = %order_id, target = %target))]
    pub async fn transition_order(
        &self,
        ctx: &TenantContext,
        order_id: Uuid,
        target: OrderStatus,
    ) -> Result<OrderResponse, ServiceError> {
        let db = &*self.db;
        let txn = db.begin().await.map_err(|e| {
            error!(error = %e, "Failed to start transaction for order transition");
            ServiceError::DatabaseError(e)
        })?;

        let order = tenant::find_order(&txn, ctx, order_id).await?;
        let current = order.status;

        if !current.can_transition_to(target) {
            return Err(ServiceError::IllegalTransition {
                from: current,
                to: target,
                valid: current.valid_targets().to_vec(),
            });
        }

        if target == OrderStatus::Confirmed {
            let items = OrderItemEntity::find()
                .filter(order_item::Column::TenantId.eq(ctx.tenant_id))
                .filter(order_item::Column::OrderId.eq(order_id))
                .all(&txn)
                .await?;
            for item in &items {
                StockLedgerService::deduct_for_order(
                    &txn,
                    ctx,
                    order_id,
                    item.product_id,
                    item.quantity,
                )
                .await?;
            }
        }

        cas_status_update(&txn, ctx, &order, target).await?;

        txn.commit().await.map_err(|e| {
            error!(error = %e, "Failed to commit order transition");
            ServiceError::DatabaseError(e)
        })?;

        info!(order_id = %order_id, from = %current, to = %target, "Order status updated");

        if let Some(sender) = &self.event_sender {
            sender
                .send_best_effort(Event::OrderStatusChanged {
                    order_id,
                    tenant_id: ctx.tenant_id,
                    old_status: current,
                    new_status: target,
                })
                .await;
        }

        self.get_order(ctx, order_id).await
    }

    /// Deletes a Draft order and its items. Confirmed or in-flight orders are
    /// cancelled or voided through the state machine instead.
    #[instrument(skip_all, fields(tenant_id = %ctx.tenant_id, order_id = %order_id))]
    pub async fn delete_order(
        &self,
        ctx: &TenantContext,
        order_id: Uuid,
    ) -> Result<(), ServiceError> {
        let db = &*self.db;
        let txn = db.begin().await.map_err(ServiceError::DatabaseError)?;

        let order = tenant::find_order(&txn, ctx, order_id).await?;
        if order.status != OrderStatus::Draft {
            return Err(ServiceError::OrderNotDeletable {
                order_id,
                status: order.status,
            });
        }

        OrderItemEntity::delete_many()
            .filter(order_item::Column::TenantId.eq(ctx.tenant_id))
            .filter(order_item::Column::OrderId.eq(order_id))
            .exec(&txn)
            .await?;

        OrderEntity::delete_many()
            .filter(order::Column::TenantId.eq(ctx.tenant_id))
            .filter(order::Column::Id.eq(order_id))
            .exec(&txn)
            .await?;

        txn.commit().await.map_err(ServiceError::DatabaseError)?;

        info!(order_id = %order_id, "Draft order deleted");

        if let Some(sender) = &self.event_sender {
            sender
                .send_best_effort(Event::OrderDeleted {
                    order_id,
                    tenant_id: ctx.tenant_id,
                })
                .await;
        }

        Ok(())
    }

    /// Updates the editable fields of a Draft or Pending order.
    #[instrument(skip_all, fields(tenant_id = %ctx.tenant_id, order_id = %order_id))]
    pub async fn update_order_details(
        &self,
        ctx: &TenantContext,
        order_id: Uuid,
        details: UpdateOrderDetails,
    ) -> Result<OrderResponse, ServiceError> {
        let db = &*self.db;
        let txn = db.begin().await.map_err(ServiceError::DatabaseError)?;

        let order = tenant::find_order(&txn, ctx, order_id).await?;
        if !order.status.is_editable() {
            return Err(ServiceError::ValidationError(format!(
                "Order {} is {} and can no longer be edited",
                order_id, order.status
            )));
        }

        let mut update = OrderEntity::update_many()
            .col_expr(order::Column::Version, Expr::value(order.version + 1))
            .col_expr(order::Column::UpdatedAt, Expr::value(Utc::now()));
        if let Some(customer_id) = details.customer_id {
            update = update.col_expr(order::Column::CustomerId, Expr::value(customer_id));
        }
        if let Some(notes) = details.notes {
            update = update.col_expr(order::Column::Notes, Expr::value(notes));
        }

        let result = update
            .filter(order::Column::Id.eq(order_id))
            .filter(order::Column::TenantId.eq(ctx.tenant_id))
            .filter(order::Column::Version.eq(order.version))
            .exec(&txn)
            .await?;
        if result.rows_affected == 0 {
            return Err(ServiceError::ConcurrencyConflict(format!(
                "Order {} was modified concurrently",
                order_id
            )));
        }

        txn.commit().await.map_err(ServiceError::DatabaseError)?;

        self.get_order(ctx, order_id).await
    }

    async fn load_items(
        &self,
        ctx: &TenantContext,
        order_id: Uuid,
    ) -> Result<Vec<order_item::Model>, ServiceError> {
        let db = &*self.db;
        Ok(OrderItemEntity::find()
            .filter(order_item::Column::TenantId.eq(ctx.tenant_id))
            .filter(order_item::Column::OrderId.eq(order_id))
            .order_by_asc(order_item::Column::CreatedAt)
            .all(db)
            .await?)
    }
}

/// Compare-and-swap on (status, version): a concurrent transition that
/// already committed makes this affect zero rows.
async fn cas_status_update<C: ConnectionTrait>(
    conn: &C,
    ctx: &TenantContext,
    order: &order::Model,
    target: OrderStatus,
) -> Result<(), ServiceError> {
    let result = OrderEntity::update_many()
        .col_expr(order::Column::Status, Expr::value(target))
        .col_expr(order::Column::Version, Expr::value(order.version + 1))
        .col_expr(order::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(order::Column::Id.eq(order.id))
        .filter(order::Column::TenantId.eq(ctx.tenant_id))
        .filter(order::Column::Version.eq(order.version))
        .filter(order::Column::Status.eq(order.status))
        .exec(conn)
        .await?;

    if result.rows_affected == 0 {
        return Err(ServiceError::ConcurrencyConflict(format!(
            "Order {} status changed concurrently",
            order.id
        )));
    }
    Ok(())
}

/// Next `ORD<YYYYMMDD><seq>` number for the tenant, read inside the caller's
/// transaction. The unique index catches concurrent winners.
async fn next_order_number(
    txn: &DatabaseTransaction,
    tenant_id: Uuid,
    now: DateTime<Utc>,
) -> Result<String, ServiceError> {
    let prefix = format!("{}{}", ORDER_NUMBER_PREFIX, now.format("%Y%m%d"));

    let numbers: Vec<String> = OrderEntity::find()
        .select_only()
        .column(order::Column::OrderNumber)
        .filter(order::Column::TenantId.eq(tenant_id))
        .filter(order::Column::OrderNumber.starts_with(&prefix))
        .into_tuple()
        .all(txn)
        .await?;

    Ok(format!(
        "{}{:0width$}",
        prefix,
        next_sequence(&prefix, &numbers),
        width = ORDER_NUMBER_SEQ_WIDTH
    ))
}

/// Highest parsed sequence plus one. Sequences are compared numerically, not
/// lexically, so numbers past the zero-padded width keep incrementing.
fn next_sequence(prefix: &str, numbers: &[String]) -> u32 {
    numbers
        .iter()
        .filter_map(|n| n.strip_prefix(prefix))
        .filter_map(|suffix| suffix.parse::<u32>().ok())
        .max()
        .map_or(1, |seq| seq + 1)
}

fn is_unique_violation(err: &DbErr) -> bool {
    matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
}

fn model_to_response(model: order::Model, items: Vec<order_item::Model>) -> OrderResponse {
    OrderResponse {
        id: model.id,
        order_number: model.order_number,
        customer_id: model.customer_id,
        status: model.status,
        subtotal: model.subtotal,
        tax_amount: model.tax_amount,
        discount_amount: model.discount_amount,
        total_amount: model.total_amount,
        payment_status: model.payment_status,
        notes: model.notes,
        created_by: model.created_by,
        created_at: model.created_at,
        updated_at: model.updated_at,
        version: model.version,
        items: items
            .into_iter()
            .map(|item| OrderItemResponse {
                id: item.id,
                product_id: item.product_id,
                quantity: item.quantity,
                unit_price: item.unit_price,
                subtotal: item.subtotal,
                tax_amount: item.tax_amount,
                total: item.total,
            })
            .collect(),
    }
}
