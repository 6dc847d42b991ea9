use std::sync::Arc;

use anyhow::Context;
use axum::Router;
use clap::Parser;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use keyshelf::config::Config;
use keyshelf::db::{AppState, create_pool, init_db, queries};
use keyshelf::handlers;
use keyshelf::intents::{
    FeederHandle, IntentEvents, IntentHub, LogAlertSink, NotificationGate, PollSettings,
    WebhookAlertSink,
};
use keyshelf::models::CreatePurchaseIntent;

#[derive(Parser, Debug)]
#[command(name = "keyshelf")]
#[command(about = "License key inventory and subscription back-office")]
struct Cli {
    /// Seed the database with sample keys and a purchase intent (dev mode only)
    #[arg(long)]
    seed: bool,

    /// Delete the database on exit (dev mode only, useful for fresh starts)
    #[arg(long)]
    ephemeral: bool,
}

/// Seeds sample inventory when the store is empty.
fn seed_dev_data(state: &AppState) -> anyhow::Result<()> {
    let mut conn = state.db.get()?;

    if !queries::get_inventory(&conn)?.is_empty() {
        tracing::info!("Database already has keys, skipping seed");
        return Ok(());
    }

    tracing::info!("============================================");
    tracing::info!("SEEDING DEV DATA");
    tracing::info!("============================================");

    for (product_id, prefix) in [("starter", "STR"), ("pro", "PRO")] {
        let values: Vec<String> = (0..10)
            .map(|_| queries::generate_license_value(prefix))
            .collect();
        let outcome = queries::add_license_keys(&mut conn, product_id, &values)?;
        tracing::info!("Product {}: {} key(s)", product_id, outcome.inserted);
    }

    let intent = queries::create_purchase_intent(
        &conn,
        &CreatePurchaseIntent {
            product_id: "pro".to_string(),
            product_title: "Pro (30 days)".to_string(),
            country: Some("US".to_string()),
            email: "buyer@keyshelf.local".to_string(),
            phone_number: None,
        },
    )?;
    tracing::info!("Purchase intent: {} ({})", intent.id, intent.email);

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "keyshelf=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();

    if config.dev_mode {
        tracing::info!("Running in DEVELOPMENT mode");
    }
    if config.admin_api_key.is_none() {
        if !config.dev_mode {
            anyhow::bail!("ADMIN_API_KEY must be set outside dev mode");
        }
        tracing::warn!("ADMIN_API_KEY not set: admin routes are unauthenticated");
    }

    let db_pool = create_pool(&config.database_path).context("Failed to create database pool")?;
    {
        let conn = db_pool.get().context("Failed to get connection")?;
        init_db(&conn).context("Failed to initialize database")?;
    }

    let hub = IntentHub::new(NotificationGate::new(config.alert_freshness));
    hub.add_sink(Arc::new(LogAlertSink));
    if let Some(url) = config.alert_webhook_url.as_deref() {
        hub.add_sink(Arc::new(WebhookAlertSink::new(
            url,
            config.alert_webhook_secret.clone(),
        )));
        tracing::info!("Intent alerts will be POSTed to {}", url);
    }

    let events = IntentEvents::default();

    let state = AppState {
        db: db_pool,
        admin_api_key: config.admin_api_key.clone(),
        intent_events: events.clone(),
        intents: hub.clone(),
    };

    if cli.seed {
        if !config.dev_mode {
            tracing::warn!("--seed flag ignored: not in dev mode (set KEYSHELF_ENV=dev)");
        } else {
            seed_dev_data(&state)?;
        }
    }

    // Both feeders run; either alone would keep the ledger consistent
    let feeders = FeederHandle::spawn(
        &hub,
        &state.db,
        Some(&events),
        Some(PollSettings {
            interval: config.intent_poll_interval,
            overlap: config.intent_poll_overlap,
        }),
    );

    let mut app = Router::new().merge(handlers::router(state.clone()));
    if config.dev_mode {
        app = app.layer(CorsLayer::permissive());
    }
    let app = app.layer(TraceLayer::new_for_http()).with_state(state);

    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    let cleanup_on_exit = cli.ephemeral && config.dev_mode;
    if cleanup_on_exit {
        tracing::info!("EPHEMERAL MODE: database will be deleted on exit");
    }

    tracing::info!("Keyshelf server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    feeders.shutdown().await;

    if cleanup_on_exit {
        let db_path = &config.database_path;
        tracing::info!("Cleaning up ephemeral database...");
        if let Err(e) = std::fs::remove_file(db_path) {
            tracing::warn!("Failed to remove {}: {}", db_path, e);
        } else {
            tracing::info!("Removed {}", db_path);
        }
        // Also remove WAL and SHM files if they exist
        let _ = std::fs::remove_file(format!("{}-wal", db_path));
        let _ = std::fs::remove_file(format!("{}-shm", db_path));
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to install Ctrl+C handler: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received, stopping server...");
}
