//! Shared harness for the integration tests: services wired to an in-memory
//! SQLite database with the full schema migrated.
#![allow(dead_code)]

use std::sync::Arc;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sea_orm::{ActiveModelTrait, Set};
use tokio::sync::mpsc;
use uuid::Uuid;

use salespoint_api::catalog::{InMemoryCatalog, ProductSummary};
use salespoint_api::config::TenantSettings;
use salespoint_api::db::{self, DbConfig, DbPool};
use salespoint_api::entities::warehouse_location;
use salespoint_api::events::{self, EventSender};
use salespoint_api::services::orders::{CreateOrderRequest, OrderItemRequest, OrderService};
use salespoint_api::services::payments::PaymentService;
use salespoint_api::services::stock::StockLedgerService;
use salespoint_api::tenant::TenantContext;

pub struct TestApp {
    pub db: Arc<DbPool>,
    pub catalog: Arc<InMemoryCatalog>,
    pub settings: Arc<TenantSettings>,
    pub orders: OrderService,
    pub payments: PaymentService,
    pub stock: StockLedgerService,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    /// Fresh application services over a private in-memory database.
    ///
    /// The pool is pinned to a single connection so every task sees the same
    /// in-memory database and concurrent transactions serialize instead of
    /// hitting separate blank databases.
    pub async fn new() -> Self {
        let config = DbConfig {
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
            min_connections: 1,
            ..Default::default()
        };
        let pool = db::establish_connection_with_config(&config)
            .await
            .expect("failed to open test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to migrate test database");
        let db = Arc::new(pool);

        let (event_tx, event_rx) = mpsc::channel(64);
        let event_sender = Arc::new(EventSender::new(event_tx));
        let event_task = tokio::spawn(events::process_events(event_rx));

        let catalog = Arc::new(InMemoryCatalog::new());
        let settings = Arc::new(TenantSettings::new(dec!(0.19)));

        Self {
            orders: OrderService::new(
                db.clone(),
                catalog.clone(),
                settings.clone(),
                Some(event_sender.clone()),
            ),
            payments: PaymentService::new(db.clone(), Some(event_sender.clone())),
            stock: StockLedgerService::new(db.clone(), Some(event_sender)),
            db,
            catalog,
            settings,
            _event_task: event_task,
        }
    }

    /// A tenant/actor pair for a fresh tenant.
    pub fn tenant(&self) -> TenantContext {
        TenantContext::new(Uuid::new_v4(), Uuid::new_v4())
    }

    /// Registers a product in the catalog and returns its id.
    pub fn seed_product(&self, ctx: &TenantContext, catalog_stock: i32) -> Uuid {
        let id = Uuid::new_v4();
        self.catalog.upsert(
            ctx.tenant_id,
            ProductSummary {
                id,
                stock_quantity: catalog_stock,
            },
        );
        id
    }

    /// Inserts a storage slot for a product, seeding the counter directly.
    pub async fn seed_location(
        &self,
        ctx: &TenantContext,
        product_id: Uuid,
        name: &str,
        capacity: i32,
        current_stock: i32,
    ) -> Uuid {
        let id = Uuid::new_v4();
        warehouse_location::ActiveModel {
            id: Set(id),
            tenant_id: Set(ctx.tenant_id),
            product_id: Set(product_id),
            name: Set(name.to_string()),
            capacity: Set(capacity),
            current_stock: Set(current_stock),
            version: Set(1),
            ..Default::default()
        }
        .insert(&*self.db)
        .await
        .expect("failed to seed warehouse location");
        id
    }

    /// Catalog product plus one stocked location, the common fixture.
    pub async fn seed_stocked_product(
        &self,
        ctx: &TenantContext,
        capacity: i32,
        current_stock: i32,
    ) -> (Uuid, Uuid) {
        let product_id = self.seed_product(ctx, current_stock);
        let location_id = self
            .seed_location(ctx, product_id, "MAIN", capacity, current_stock)
            .await;
        (product_id, location_id)
    }
}

pub fn one_line_order(product_id: Uuid, quantity: i32, unit_price: Decimal) -> CreateOrderRequest {
    CreateOrderRequest {
        customer_id: None,
        items: vec![OrderItemRequest {
            product_id,
            quantity,
            unit_price,
        }],
        discount_amount: None,
        notes: None,
    }
}
