//! Stock ledger and capacity guard.
//!
//! Movements are append-only; the `current_stock` counter on a warehouse
//! location is a materialized view of the ledger and is only mutated in the
//! same transaction that appends a movement (or by the rebuild repair).

use std::sync::Arc;

use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::{
    db::DbPool,
    entities::enums::MovementType,
    entities::stock_movement::{self, Entity as StockMovementEntity},
    entities::warehouse_location::{self, Entity as LocationEntity},
    errors::ServiceError,
    events::{Event, EventSender},
    tenant::{self, TenantContext},
};

/// Request to append one ledger entry.
#[derive(Debug, Clone)]
pub struct RecordMovementCommand {
    pub product_id: Uuid,
    pub location_id: Uuid,
    pub movement_type: MovementType,
    pub quantity: i32,
    pub reference_id: Option<Uuid>,
    pub notes: Option<String>,
}

#[derive(Clone)]
pub struct StockLedgerService {
    db: Arc<DbPool>,
    event_sender: Option<Arc<EventSender>>,
}

impl StockLedgerService {
    pub fn new(db: Arc<DbPool>, event_sender: Option<Arc<EventSender>>) -> Self {
        Self { db, event_sender }
    }

    /// Current quantity of a product, from the cached counters.
    ///
    /// With a location this is that location's counter; without one it is the
    /// sum over all of the tenant's locations holding the product.
    #[instrument(skip_all, fields(tenant_id = %ctx.tenant_id, product_id = %product_id))]
    pub async fn current_stock(
        &self,
        ctx: &TenantContext,
        product_id: Uuid,
        location_id: Option<Uuid>,
    ) -> Result<i64, ServiceError> {
        let db = &*self.db;
        match location_id {
            Some(location_id) => {
                let location = tenant::find_location(db, ctx, location_id).await?;
                if location.product_id != product_id {
                    return Err(ServiceError::NotFound(format!(
                        "Location {} does not hold product {}",
                        location_id, product_id
                    )));
                }
                Ok(location.current_stock as i64)
            }
            None => {
                let locations = LocationEntity::find()
                    .filter(warehouse_location::Column::TenantId.eq(ctx.tenant_id))
                    .filter(warehouse_location::Column::ProductId.eq(product_id))
                    .all(db)
                    .await?;
                Ok(locations.iter().map(|l| l.current_stock as i64).sum())
            }
        }
    }

    /// Authoritative quantity: signed replay of the full movement history for
    /// the (product, location) pair, floored at zero.
    pub async fn replayed_stock<C: ConnectionTrait>(
        conn: &C,
        tenant_id: Uuid,
        product_id: Uuid,
        location_id: Uuid,
    ) -> Result<i64, ServiceError> {
        let movements = StockMovementEntity::find()
            .filter(stock_movement::Column::TenantId.eq(tenant_id))
            .filter(stock_movement::Column::ProductId.eq(product_id))
            .filter(stock_movement::Column::LocationId.eq(location_id))
            .all(conn)
            .await?;

        let sum: i64 = movements.iter().map(|m| m.signed_delta()).sum();
        Ok(sum.max(0))
    }

    /// Validates and applies one movement: ledger append plus counter update
    /// in a single transaction.
    #[instrument(skip_all, fields(
        tenant_id = %ctx.tenant_id,
        product_id = %cmd.product_id,
        location_id = %cmd.location_id,
        movement_type = %cmd.movement_type,
        quantity = cmd.quantity,
    ))]
    pub async fn apply_movement(
        &self,
        ctx: &TenantContext,
        cmd: RecordMovementCommand,
    ) -> Result<stock_movement::Model, ServiceError> {
        let db = &*self.db;
        let txn = db.begin().await.map_err(|e| {
            error!(error = %e, "Failed to start transaction for stock movement");
            ServiceError::DatabaseError(e)
        })?;

        let location = tenant::find_location(&txn, ctx, cmd.location_id).await?;
        if location.product_id != cmd.product_id {
            return Err(ServiceError::NotFound(format!(
                "Location {} does not hold product {}",
                cmd.location_id, cmd.product_id
            )));
        }

        let (movement, new_stock) = Self::apply_movement_on(
            &txn,
            ctx,
            &location,
            cmd.movement_type,
            cmd.quantity,
            cmd.reference_id,
            cmd.notes,
        )
        .await?;

        txn.commit().await.map_err(|e| {
            error!(error = %e, "Failed to commit stock movement transaction");
            ServiceError::DatabaseError(e)
        })?;

        info!(movement_id = %movement.id, new_stock, "Stock movement recorded");

        if let Some(sender) = &self.event_sender {
            sender
                .send_best_effort(Event::StockMovementRecorded {
                    movement_id: movement.id,
                    tenant_id: ctx.tenant_id,
                    product_id: movement.product_id,
                    location_id: movement.location_id,
                    movement_type: movement.movement_type,
                    quantity: movement.quantity,
                    new_stock,
                })
                .await;
        }

        Ok(movement)
    }

    /// Core guard + append + counter CAS, running on the caller's connection
    /// (a transaction for every production path).
    pub(crate) async fn apply_movement_on<C: ConnectionTrait>(
        conn: &C,
        ctx: &TenantContext,
        location: &warehouse_location::Model,
        movement_type: MovementType,
        quantity: i32,
        reference_id: Option<Uuid>,
        notes: Option<String>,
    ) -> Result<(stock_movement::Model, i32), ServiceError> {
        if quantity <= 0 {
            return Err(ServiceError::ValidationError(format!(
                "Movement quantity must be a positive integer, got {}",
                quantity
            )));
        }

        let new_stock = location.current_stock as i64 + movement_type.signed_delta(quantity);
        if new_stock < 0 {
            return Err(ServiceError::InsufficientStock(format!(
                "Location {} holds {} of product {}; cannot remove {}",
                location.id, location.current_stock, location.product_id, quantity
            )));
        }
        if movement_type.is_inbound() && new_stock > location.capacity as i64 {
            return Err(ServiceError::CapacityExceeded {
                location_id: location.id,
                current: location.current_stock,
                incoming: quantity,
                capacity: location.capacity,
            });
        }
        let new_stock = new_stock as i32;

        let movement = stock_movement::ActiveModel {
            id: Set(Uuid::new_v4()),
            tenant_id: Set(ctx.tenant_id),
            product_id: Set(location.product_id),
            location_id: Set(location.id),
            movement_type: Set(movement_type),
            quantity: Set(quantity),
            reference_id: Set(reference_id),
            notes: Set(notes),
            created_by: Set(ctx.actor_id),
            ..Default::default()
        }
        .insert(conn)
        .await?;

        // Version CAS: a concurrent movement on the same location loses the
        // race here and rolls back its ledger append with the transaction.
        let update = LocationEntity::update_many()
            .col_expr(
                warehouse_location::Column::CurrentStock,
                Expr::value(new_stock),
            )
            .col_expr(
                warehouse_location::Column::Version,
                Expr::value(location.version + 1),
            )
            .col_expr(
                warehouse_location::Column::UpdatedAt,
                Expr::value(Utc::now()),
            )
            .filter(warehouse_location::Column::Id.eq(location.id))
            .filter(warehouse_location::Column::TenantId.eq(ctx.tenant_id))
            .filter(warehouse_location::Column::Version.eq(location.version))
            .exec(conn)
            .await?;

        if update.rows_affected == 0 {
            warn!(location_id = %location.id, "Lost stock counter race");
            return Err(ServiceError::ConcurrencyConflict(format!(
                "Stock at location {} changed concurrently",
                location.id
            )));
        }

        Ok((movement, new_stock))
    }

    /// First-fit deduction for an order line, on the orchestrator's
    /// transaction: the fullest single location able to satisfy the whole
    /// quantity receives an Out movement referencing the order. Demands are
    /// never split across locations.
    pub(crate) async fn deduct_for_order<C: ConnectionTrait>(
        conn: &C,
        ctx: &TenantContext,
        order_id: Uuid,
        product_id: Uuid,
        quantity: i32,
    ) -> Result<stock_movement::Model, ServiceError> {
        let locations = LocationEntity::find()
            .filter(warehouse_location::Column::TenantId.eq(ctx.tenant_id))
            .filter(warehouse_location::Column::ProductId.eq(product_id))
            .order_by_desc(warehouse_location::Column::CurrentStock)
            .all(conn)
            .await?;

        let target = locations
            .into_iter()
            .find(|l| l.current_stock >= quantity)
            .ok_or(ServiceError::InsufficientStockAcrossLocations {
                product_id,
                requested: quantity,
            })?;

        let (movement, _) = Self::apply_movement_on(
            conn,
            ctx,
            &target,
            MovementType::Out,
            quantity,
            Some(order_id),
            None,
        )
        .await?;

        Ok(movement)
    }

    /// Administrative repair: recompute the cached counter from the ledger.
    #[instrument(skip_all, fields(tenant_id = %ctx.tenant_id, product_id = %product_id, location_id = %location_id))]
    pub async fn rebuild_counter(
        &self,
        ctx: &TenantContext,
        product_id: Uuid,
        location_id: Uuid,
    ) -> Result<i32, ServiceError> {
        let db = &*self.db;
        let txn = db.begin().await.map_err(ServiceError::DatabaseError)?;

        let location = tenant::find_location(&txn, ctx, location_id).await?;
        if location.product_id != product_id {
            return Err(ServiceError::NotFound(format!(
                "Location {} does not hold product {}",
                location_id, product_id
            )));
        }

        let replayed = Self::replayed_stock(&txn, ctx.tenant_id, product_id, location_id).await?;
        let replayed = replayed.min(i32::MAX as i64) as i32;

        let update = LocationEntity::update_many()
            .col_expr(
                warehouse_location::Column::CurrentStock,
                Expr::value(replayed),
            )
            .col_expr(
                warehouse_location::Column::Version,
                Expr::value(location.version + 1),
            )
            .col_expr(
                warehouse_location::Column::UpdatedAt,
                Expr::value(Utc::now()),
            )
            .filter(warehouse_location::Column::Id.eq(location.id))
            .filter(warehouse_location::Column::TenantId.eq(ctx.tenant_id))
            .filter(warehouse_location::Column::Version.eq(location.version))
            .exec(&txn)
            .await?;

        if update.rows_affected == 0 {
            return Err(ServiceError::ConcurrencyConflict(format!(
                "Stock at location {} changed during rebuild",
                location.id
            )));
        }

        txn.commit().await.map_err(ServiceError::DatabaseError)?;

        if location.current_stock != replayed {
            warn!(
                location_id = %location.id,
                cached = location.current_stock,
                replayed,
                "Counter diverged from ledger; repaired"
            );
        } else {
            info!(location_id = %location.id, replayed, "Counter matches ledger");
        }

        if let Some(sender) = &self.event_sender {
            sender
                .send_best_effort(Event::StockCounterRebuilt {
                    tenant_id: ctx.tenant_id,
                    product_id,
                    location_id,
                    old_stock: location.current_stock,
                    new_stock: replayed,
                    at: Utc::now(),
                })
                .await;
        }

        Ok(replayed)
    }

    /// Paginated movement history for one product, optionally narrowed to a
    /// location, newest first.
    #[instrument(skip_all, fields(tenant_id = %ctx.tenant_id, product_id = %product_id))]
    pub async fn movement_history(
        &self,
        ctx: &TenantContext,
        product_id: Uuid,
        location_id: Option<Uuid>,
        page: u64,
        limit: u64,
    ) -> Result<(Vec<stock_movement::Model>, u64), ServiceError> {
        let db = &*self.db;

        let mut query = StockMovementEntity::find()
            .filter(stock_movement::Column::TenantId.eq(ctx.tenant_id))
            .filter(stock_movement::Column::ProductId.eq(product_id));
        if let Some(location_id) = location_id {
            query = query.filter(stock_movement::Column::LocationId.eq(location_id));
        }

        let paginator = query
            .order_by_desc(stock_movement::Column::CreatedAt)
            .paginate(db, limit);

        let total = paginator.num_items().await?;
        let movements = paginator.fetch_page(page.saturating_sub(1)).await?;
        Ok((movements, total))
    }

    /// Cached per-location stock levels for the tenant, optionally narrowed
    /// to one product.
    #[instrument(skip_all, fields(tenant_id = %ctx.tenant_id))]
    pub async fn stock_levels(
        &self,
        ctx: &TenantContext,
        product_id: Option<Uuid>,
    ) -> Result<Vec<warehouse_location::Model>, ServiceError> {
        let db = &*self.db;
        let mut query = LocationEntity::find()
            .filter(warehouse_location::Column::TenantId.eq(ctx.tenant_id));
        if let Some(product_id) = product_id {
            query = query.filter(warehouse_location::Column::ProductId.eq(product_id));
        }
        Ok(query
            .order_by_desc(warehouse_location::Column::CurrentStock)
            .all(db)
            .await?)
    }
}
