mod alerts;
mod broadcast;
mod config;
mod error;
mod history;
mod metrics;
mod openapi;
mod plants;
mod routes;
mod scheduler;
mod sensitivity;
mod sms;
mod weather;

use axum::{error_handling::HandleErrorLayer, http::StatusCode, BoxError};
use reqwest::Client;
use std::{sync::Arc, time::Duration};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::alerts::AlertEngine;
use crate::broadcast::BroadcastChannel;
use crate::config::AppConfig;
use crate::history::{HistorySink, HistoryStore};
use crate::metrics::MetricsService;
use crate::plants::{PlantCache, PlantsClient, PlantsSource};
use crate::scheduler::SchedulerService;
use crate::sensitivity::SensitivityRegistry;
use crate::sms::{SMSChannel, SmsSink};
use crate::weather::{WeatherClient, WeatherSource};

/// Shared HTTP client configuration
const HTTP_TIMEOUT_SECS: u64 = 30;
const HTTP_CONNECT_TIMEOUT_SECS: u64 = 5;
const HTTP_POOL_IDLE_TIMEOUT_SECS: u64 = 90;

#[derive(Clone)]
pub struct AppState {
    pub http_client: Client,
    pub config: Arc<AppConfig>,
    pub weather_client: Arc<WeatherClient>,
    pub history_store: Arc<HistoryStore>,
    pub sms_channel: Arc<SMSChannel>,
    pub broadcast_channel: Arc<BroadcastChannel>,
    pub metrics: Arc<MetricsService>,
}

/// Create shared HTTP client with connection pooling
fn create_http_client() -> Result<Client, reqwest::Error> {
    Client::builder()
        .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
        .connect_timeout(Duration::from_secs(HTTP_CONNECT_TIMEOUT_SECS))
        .pool_idle_timeout(Duration::from_secs(HTTP_POOL_IDLE_TIMEOUT_SECS))
        .pool_max_idle_per_host(10)
        .build()
}

/// Handle request timeout errors
async fn handle_timeout_error(err: BoxError) -> (StatusCode, String) {
    if err.is::<tower::timeout::error::Elapsed>() {
        (StatusCode::REQUEST_TIMEOUT, "Request timed out".to_string())
    } else {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Internal error: {}", err),
        )
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to listen for ctrl+c");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to listen for SIGTERM")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gardensentry=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration. Missing/invalid gardens or sensitivity profiles
    // are fatal at startup, per spec.
    let config = AppConfig::load()?;
    tracing::info!("Configuration loaded successfully");

    let gardens = config::load_gardens(&config.gardens_config_path)?;
    tracing::info!(count = gardens.len(), "Gardens loaded");

    let profiles = config::load_profiles(&config.profiles_config_path)?;
    tracing::info!(count = profiles.len(), "Sensitivity profiles loaded");

    // Create shared HTTP client with connection pooling
    let http_client = create_http_client()?;
    tracing::debug!("Shared HTTP client created");

    let metrics = Arc::new(MetricsService::new());

    let weather_client = Arc::new(WeatherClient::with_metrics(
        http_client.clone(),
        Arc::clone(&metrics),
    ));
    let plants_client = Arc::new(PlantsClient::with_metrics(
        http_client.clone(),
        config.backend_url.clone(),
        Arc::clone(&metrics),
    ));
    let plant_cache = Arc::new(PlantCache::new());
    let sensitivity_registry = Arc::new(SensitivityRegistry::new(profiles));

    let alert_engine = Arc::new(AlertEngine::new(
        Arc::clone(&weather_client) as Arc<dyn WeatherSource>,
        Arc::clone(&plant_cache),
        Arc::clone(&sensitivity_registry),
    ));

    let sms_channel = Arc::new(
        SMSChannel::new(
            http_client.clone(),
            config.twilio_account_sid.clone(),
            config.twilio_auth_token.clone(),
            config.twilio_phone_number.clone(),
        )
        .with_metrics(Arc::clone(&metrics)),
    );
    if sms_channel.is_enabled() {
        tracing::info!("SMS channel enabled");
    } else {
        tracing::warn!("Twilio credentials not fully configured, SMS channel disabled");
    }

    let broadcast_channel = Arc::new(BroadcastChannel::new());

    let history_store = Arc::new(HistoryStore::new());
    history_store.initialize(config.mongo_url.as_deref()).await;

    let scheduler_service = Arc::new(
        SchedulerService::new(
            gardens,
            Arc::clone(&alert_engine),
            Arc::clone(&plants_client) as Arc<dyn PlantsSource>,
            Arc::clone(&plant_cache),
            Arc::clone(&sms_channel) as Arc<dyn SmsSink>,
            Arc::clone(&broadcast_channel),
            Arc::clone(&history_store) as Arc<dyn HistorySink>,
            Arc::clone(&metrics),
        )
        .await?,
    );

    scheduler_service.start().await?;
    tracing::info!("Alert pipeline started");

    let port = config.port;

    // Create shared application state
    let state = AppState {
        http_client,
        config: Arc::new(config),
        weather_client,
        history_store,
        sms_channel,
        broadcast_channel,
        metrics,
    };

    // Build router using the routes module
    let app = routes::build_router()
        .layer(
            ServiceBuilder::new()
                // Handle timeout errors
                .layer(HandleErrorLayer::new(handle_timeout_error))
                // Request timeout (60 seconds for slow API calls)
                .timeout(Duration::from_secs(60)),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    // Start server with graceful shutdown
    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    scheduler_service.stop().await?;
    tracing::info!("Server shutdown complete");

    Ok(())
}
