//! Best-effort domain events.
//!
//! Events notify surrounding modules (customer stats, notification delivery)
//! of completed operations. Delivery failures are logged and never abort the
//! primary operation.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::entities::enums::{MovementType, OrderStatus, PaymentStatus};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    OrderCreated {
        order_id: Uuid,
        tenant_id: Uuid,
        order_number: String,
    },
    OrderStatusChanged {
        order_id: Uuid,
        tenant_id: Uuid,
        old_status: OrderStatus,
        new_status: OrderStatus,
    },
    OrderDeleted {
        order_id: Uuid,
        tenant_id: Uuid,
    },
    PaymentRecorded {
        payment_id: Uuid,
        order_id: Uuid,
        tenant_id: Uuid,
        amount: Decimal,
        payment_status: PaymentStatus,
    },
    PaymentRefunded {
        payment_id: Uuid,
        order_id: Uuid,
        tenant_id: Uuid,
        amount: Decimal,
        payment_status: PaymentStatus,
    },
    StockMovementRecorded {
        movement_id: Uuid,
        tenant_id: Uuid,
        product_id: Uuid,
        location_id: Uuid,
        movement_type: MovementType,
        quantity: i32,
        new_stock: i32,
    },
    StockCounterRebuilt {
        tenant_id: Uuid,
        product_id: Uuid,
        location_id: Uuid,
        old_stock: i32,
        new_stock: i32,
        at: DateTime<Utc>,
    },
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event, logging (not propagating) delivery failures.
    pub async fn send_best_effort(&self, event: Event) {
        if let Err(e) = self.sender.send(event).await {
            warn!(error = %e, "Failed to publish domain event");
        }
    }
}

/// Drains the event channel. Downstream consumers (notifications, customer
/// stats) subscribe here; the default loop just logs.
pub async fn process_events(mut receiver: mpsc::Receiver<Event>) {
    while let Some(event) = receiver.recv().await {
        info!(?event, "Processing domain event");
    }
    info!("Event channel closed; stopping event processor");
}
