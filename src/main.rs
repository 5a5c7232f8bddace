use chrono::Utc;
use tracing_subscriber::EnvFilter;

use cleanbook::app::build_router;
use cleanbook::config::AppConfig;
use cleanbook::db;
use cleanbook::services::notify::webhook::{LogNotifier, WebhookNotifier};
use cleanbook::services::notify::Notifier;
use cleanbook::services::payments::stripe::StripeGateway;
use cleanbook::services::sweeper;
use cleanbook::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = AppConfig::from_env();

    let conn = db::init_db(&config.database_url)?;

    if config.stripe_secret_key.is_empty() {
        tracing::warn!("STRIPE_SECRET_KEY is not set; payment calls will be rejected by the gateway");
    }
    let payments = StripeGateway::new(
        config.stripe_secret_key.clone(),
        config.stripe_api_base.clone(),
    );

    let notifier: Box<dyn Notifier> = if config.notify_webhook_url.is_empty() {
        tracing::info!("no NOTIFY_WEBHOOK_URL set, notifications are logged only");
        Box::new(LogNotifier)
    } else {
        tracing::info!("delivering notifications via {}", config.notify_webhook_url);
        Box::new(WebhookNotifier::new(config.notify_webhook_url.clone()))
    };

    let state = AppState::new(conn, config.clone(), Box::new(payments), notifier);

    // Deadlines that passed while the process was down.
    sweeper::run_sweep(&state, Utc::now().naive_utc()).await;
    tokio::spawn(sweeper::start_sweeper(state.clone()));

    let app = build_router(state);

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("starting server on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
