use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing_subscriber::EnvFilter;

use therapybook::config::AppConfig;
use therapybook::db;
use therapybook::handlers;
use therapybook::services::lifecycle;
use therapybook::services::notify::LogNotifier;
use therapybook::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = AppConfig::from_env();

    let conn = db::init_db(&config.database_url)?;

    if config.calendly_signing_key.is_empty() {
        tracing::warn!("CALENDLY_SIGNING_KEY not set, webhook signatures will not be verified");
    }

    let state = Arc::new(AppState {
        db: Arc::new(Mutex::new(conn)),
        config: config.clone(),
        notifier: Box::new(LogNotifier),
    });

    tokio::spawn(run_sweeper(Arc::clone(&state)));

    let app = handlers::router(state);

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("starting server on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Periodically generates upcoming recurring sessions and completes
/// sessions that have ended.
async fn run_sweeper(state: Arc<AppState>) {
    let mut ticker = tokio::time::interval(Duration::from_secs(state.config.sweep_interval_secs.max(1)));
    loop {
        ticker.tick().await;
        if let Err(e) = sweep_once(&state) {
            tracing::error!(error = %e, "booking sweep failed");
        }
    }
}

fn sweep_once(state: &AppState) -> anyhow::Result<()> {
    let db = state
        .db
        .lock()
        .map_err(|_| anyhow::anyhow!("database lock poisoned"))?;
    let now = chrono::Utc::now();

    let created =
        lifecycle::generate_recurring_bookings(&db, now, state.config.recurring_horizon_days)?;
    let completed = lifecycle::complete_past_bookings(&db, now)?;
    tracing::debug!(created = created.len(), completed, "booking sweep finished");
    Ok(())
}
