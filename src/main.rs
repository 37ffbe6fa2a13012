use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::signal;
use tokio::sync::mpsc;
use tracing::{error, info};

use salespoint_api::catalog::InMemoryCatalog;
use salespoint_api::config::{self, TenantSettings};
use salespoint_api::db;
use salespoint_api::events::{self, EventSender};
use salespoint_api::handlers;
use salespoint_api::services::orders::OrderService;
use salespoint_api::services::payments::PaymentService;
use salespoint_api::services::stock::StockLedgerService;
use salespoint_api::AppState;

const EVENT_CHANNEL_CAPACITY: usize = 1024;

#[tokio::main]
async fn main() -> Result<()> {
    let app_config = config::load_config().context("Failed to load configuration")?;
    config::init_tracing(app_config.log_level(), app_config.log_json);

    info!(
        environment = %app_config.environment,
        "Starting salespoint-api"
    );

    let db = Arc::new(
        db::establish_connection_from_app_config(&app_config)
            .await
            .context("Failed to connect to database")?,
    );

    if app_config.auto_migrate {
        db::run_migrations(&db)
            .await
            .context("Failed to run database migrations")?;
    }

    let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
    let event_sender = Arc::new(EventSender::new(event_tx));
    tokio::spawn(events::process_events(event_rx));

    let catalog = Arc::new(InMemoryCatalog::new());
    let settings = Arc::new(TenantSettings::new(app_config.default_tax_rate));

    let state = AppState {
        db: db.clone(),
        config: app_config.clone(),
        orders: OrderService::new(
            db.clone(),
            catalog,
            settings,
            Some(event_sender.clone()),
        ),
        payments: PaymentService::new(db.clone(), Some(event_sender.clone())),
        stock: StockLedgerService::new(db.clone(), Some(event_sender)),
    };

    let app = handlers::router(state);

    let addr = app_config.server_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => error!(error = %e, "Failed to install SIGTERM handler"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}
