//! Payment reconciliation.
//!
//! The paid total is always recomputed inside the transaction that inserts
//! or refunds a payment, and the order's derived payment_status is updated
//! with a version CAS, so concurrent payments cannot jointly overshoot the
//! order total.

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};
use serde::Serialize;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::{
    db::DbPool,
    entities::enums::{PaymentMethod, PaymentState, PaymentStatus},
    entities::order::{self, Entity as OrderEntity},
    entities::payment::{self, Entity as PaymentEntity},
    errors::ServiceError,
    events::{Event, EventSender},
    tenant::{self, TenantContext},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PaymentSummary {
    pub total_paid: Decimal,
    pub balance: Decimal,
    pub payment_status: PaymentStatus,
    pub payment_count: usize,
}

#[derive(Clone)]
pub struct PaymentService {
    db: Arc<DbPool>,
    event_sender: Option<Arc<EventSender>>,
}

impl PaymentService {
    pub fn new(db: Arc<DbPool>, event_sender: Option<Arc<EventSender>>) -> Self {
        Self { db, event_sender }
    }

    /// Records a completed payment against an order and rederives the
    /// order's payment status.
    #[instrument(skip_all, fields(tenant_id = %ctx.tenant_id, order_id = %order_id, amount = %amount))]
    pub async fn record_payment(
        &self,
        ctx: &TenantContext,
        order_id: Uuid,
        method: PaymentMethod,
        amount: Decimal,
        transaction_ref: Option<String>,
    ) -> Result<payment::Model, ServiceError> {
        if amount <= Decimal::ZERO {
            return Err(ServiceError::ValidationError(format!(
                "Payment amount must be positive, got {}",
                amount
            )));
        }

        let db = &*self.db;
        let txn = db.begin().await.map_err(|e| {
            error!(error = %e, "Failed to start transaction for payment");
            ServiceError::DatabaseError(e)
        })?;

        let order = tenant::find_order(&txn, ctx, order_id).await?;

        let total_paid = paid_total(&txn, ctx, order_id, None).await?;
        let remaining = order.total_amount - total_paid;
        if amount > remaining {
            return Err(ServiceError::OverpaymentRejected {
                attempted: amount,
                remaining,
            });
        }

        let now = Utc::now();
        let inserted = payment::ActiveModel {
            id: Set(Uuid::new_v4()),
            tenant_id: Set(ctx.tenant_id),
            order_id: Set(order_id),
            payment_method: Set(method),
            amount: Set(amount),
            transaction_ref: Set(transaction_ref),
            status: Set(PaymentState::Completed),
            payment_date: Set(now),
            ..Default::default()
        }
        .insert(&txn)
        .await?;

        let new_status = derive_payment_status(total_paid + amount, order.total_amount);
        cas_payment_status(&txn, ctx, &order, new_status).await?;

        txn.commit().await.map_err(|e| {
            error!(error = %e, "Failed to commit payment transaction");
            ServiceError::DatabaseError(e)
        })?;

        info!(
            payment_id = %inserted.id,
            order_id = %order_id,
            %new_status,
            "Payment recorded"
        );

        if let Some(sender) = &self.event_sender {
            sender
                .send_best_effort(Event::PaymentRecorded {
                    payment_id: inserted.id,
                    order_id,
                    tenant_id: ctx.tenant_id,
                    amount,
                    payment_status: new_status,
                })
                .await;
        }

        Ok(inserted)
    }

    /// Marks a payment refunded and rederives the order's payment status
    /// from the remaining non-refunded payments.
    #[instrument(skip_all, fields(tenant_id = %ctx.tenant_id, payment_id = %payment_id))]
    pub async fn refund_payment(
        &self,
        ctx: &TenantContext,
        payment_id: Uuid,
    ) -> Result<payment::Model, ServiceError> {
        let db = &*self.db;
        let txn = db.begin().await.map_err(ServiceError::DatabaseError)?;

        let existing = tenant::find_payment(&txn, ctx, payment_id).await?;
        if existing.status == PaymentState::Refunded {
            return Err(ServiceError::AlreadyRefunded(payment_id));
        }

        let order = tenant::find_order(&txn, ctx, existing.order_id).await?;

        let mut active: payment::ActiveModel = existing.clone().into();
        active.status = Set(PaymentState::Refunded);
        let refunded = active.update(&txn).await?;

        let remaining_paid = paid_total(&txn, ctx, order.id, Some(payment_id)).await?;
        let new_status = derive_payment_status(remaining_paid, order.total_amount);
        cas_payment_status(&txn, ctx, &order, new_status).await?;

        txn.commit().await.map_err(ServiceError::DatabaseError)?;

        info!(
            payment_id = %payment_id,
            order_id = %order.id,
            %new_status,
            "Payment refunded"
        );

        if let Some(sender) = &self.event_sender {
            sender
                .send_best_effort(Event::PaymentRefunded {
                    payment_id,
                    order_id: order.id,
                    tenant_id: ctx.tenant_id,
                    amount: refunded.amount,
                    payment_status: new_status,
                })
                .await;
        }

        Ok(refunded)
    }

    /// Derived payment position of an order; no mutation.
    #[instrument(skip_all, fields(tenant_id = %ctx.tenant_id, order_id = %order_id))]
    pub async fn payment_summary(
        &self,
        ctx: &TenantContext,
        order_id: Uuid,
    ) -> Result<PaymentSummary, ServiceError> {
        let db = &*self.db;
        let order = tenant::find_order(db, ctx, order_id).await?;
        let payments = self.list_payments(ctx, order_id).await?;

        let total_paid: Decimal = payments
            .iter()
            .filter(|p| p.counts_toward_paid())
            .map(|p| p.amount)
            .sum();

        Ok(PaymentSummary {
            total_paid,
            balance: order.total_amount - total_paid,
            payment_status: order.payment_status,
            payment_count: payments.len(),
        })
    }

    #[instrument(skip_all, fields(tenant_id = %ctx.tenant_id, order_id = %order_id))]
    pub async fn list_payments(
        &self,
        ctx: &TenantContext,
        order_id: Uuid,
    ) -> Result<Vec<payment::Model>, ServiceError> {
        let db = &*self.db;
        Ok(PaymentEntity::find()
            .filter(payment::Column::TenantId.eq(ctx.tenant_id))
            .filter(payment::Column::OrderId.eq(order_id))
            .order_by_asc(payment::Column::CreatedAt)
            .all(db)
            .await?)
    }
}

/// Sum of completed (non-refunded) payment amounts for an order, optionally
/// excluding one payment that is being refunded in the same transaction.
async fn paid_total<C: ConnectionTrait>(
    conn: &C,
    ctx: &TenantContext,
    order_id: Uuid,
    exclude: Option<Uuid>,
) -> Result<Decimal, ServiceError> {
    let payments = PaymentEntity::find()
        .filter(payment::Column::TenantId.eq(ctx.tenant_id))
        .filter(payment::Column::OrderId.eq(order_id))
        .filter(payment::Column::Status.eq(PaymentState::Completed))
        .all(conn)
        .await?;

    Ok(payments
        .iter()
        .filter(|p| Some(p.id) != exclude)
        .map(|p| p.amount)
        .sum())
}

/// Three-way rule: PAID when paid >= total, PARTIALLY_PAID when > 0, else
/// UNPAID.
fn derive_payment_status(total_paid: Decimal, order_total: Decimal) -> PaymentStatus {
    if total_paid >= order_total && order_total > Decimal::ZERO {
        PaymentStatus::Paid
    } else if total_paid > Decimal::ZERO {
        PaymentStatus::PartiallyPaid
    } else {
        PaymentStatus::Unpaid
    }
}

async fn cas_payment_status<C: ConnectionTrait>(
    conn: &C,
    ctx: &TenantContext,
    order: &order::Model,
    new_status: PaymentStatus,
) -> Result<(), ServiceError> {
    let result = OrderEntity::update_many()
        .col_expr(order::Column::PaymentStatus, Expr::value(new_status))
        .col_expr(order::Column::Version, Expr::value(order.version + 1))
        .col_expr(order::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(order::Column::Id.eq(order.id))
        .filter(order::Column::TenantId.eq(ctx.tenant_id))
        .filter(order::Column::Version.eq(order.version))
        .exec(conn)
        .await?;

    if result.rows_affected == 0 {
        warn!(order_id = %order.id, "Lost payment status race");
        return Err(ServiceError::ConcurrencyConflict(format!(
            "Order {} was modified concurrently during payment",
            order.id
        )));
    }
    Ok(())
}
