use std::time::{Duration, Instant};

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::openapi::swagger_ui;
use crate::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
enum ServiceStatus {
    Ok,
    Degraded,
    Error,
}

#[derive(Debug, Serialize)]
struct ServiceHealth {
    status: ServiceStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    latency: Option<u64>,
}

impl ServiceHealth {
    fn ok(latency: Duration) -> Self {
        Self {
            status: ServiceStatus::Ok,
            message: None,
            latency: Some(latency.as_millis() as u64),
        }
    }

    fn degraded(message: impl Into<String>) -> Self {
        Self {
            status: ServiceStatus::Degraded,
            message: Some(message.into()),
            latency: None,
        }
    }

    fn error(message: impl Into<String>, latency: Duration) -> Self {
        Self {
            status: ServiceStatus::Error,
            message: Some(message.into()),
            latency: Some(latency.as_millis() as u64),
        }
    }
}

#[derive(Debug, Serialize)]
struct ServicesHealth {
    postgres: ServiceHealth,
    mongodb: ServiceHealth,
    openmeteo: ServiceHealth,
    twilio: ServiceHealth,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    timestamp: String,
    services: ServicesHealth,
}

const PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// `GET /health`. Issues one lightweight live probe per upstream dependency
/// (Open-Meteo, the plants backend) rather than reporting stale cached
/// state; Mongo/Twilio reflect whatever `initialize`/construction already
/// determined, since those are cheap to check without a network round trip.
async fn health(State(state): State<AppState>) -> Response {
    let backend = probe_backend(&state).await;
    let openmeteo = probe_weather(&state).await;

    let mongodb = if state.history_store.is_ready() {
        ServiceHealth {
            status: ServiceStatus::Ok,
            message: None,
            latency: None,
        }
    } else {
        ServiceHealth::degraded("MongoDB not configured or unreachable")
    };

    let twilio = if state.sms_channel.is_enabled() {
        ServiceHealth {
            status: ServiceStatus::Ok,
            message: None,
            latency: None,
        }
    } else {
        ServiceHealth::degraded("Twilio credentials not configured")
    };

    let any_error = matches!(backend.status, ServiceStatus::Error)
        || matches!(openmeteo.status, ServiceStatus::Error);
    let any_non_ok = any_error
        || !matches!(mongodb.status, ServiceStatus::Ok)
        || !matches!(twilio.status, ServiceStatus::Ok);

    let overall = if any_error {
        "unhealthy"
    } else if any_non_ok {
        "degraded"
    } else {
        "healthy"
    };

    let status_code = if overall == "unhealthy" {
        axum::http::StatusCode::SERVICE_UNAVAILABLE
    } else {
        axum::http::StatusCode::OK
    };

    let body = HealthResponse {
        status: overall,
        timestamp: chrono::Utc::now().to_rfc3339(),
        services: ServicesHealth {
            postgres: backend,
            mongodb,
            openmeteo,
            twilio,
        },
    };

    (status_code, Json(body)).into_response()
}

async fn probe_backend(state: &AppState) -> ServiceHealth {
    let url = format!("{}/api/health", state.config.backend_url);
    let started = Instant::now();
    match state
        .http_client
        .get(&url)
        .timeout(PROBE_TIMEOUT)
        .send()
        .await
    {
        Ok(response) if response.status().is_success() => ServiceHealth::ok(started.elapsed()),
        Ok(response) => ServiceHealth::error(format!("backend returned {}", response.status()), started.elapsed()),
        Err(e) => ServiceHealth::error(e.to_string(), started.elapsed()),
    }
}

async fn probe_weather(state: &AppState) -> ServiceHealth {
    use crate::weather::WeatherSource;

    let started = Instant::now();
    match state.weather_client.fetch_weather(0.0, 0.0).await {
        Some(_) => ServiceHealth::ok(started.elapsed()),
        None => ServiceHealth::error("weather provider unreachable", started.elapsed()),
    }
}

/// `GET /metrics`. Returns the bespoke JSON shape from `MetricsService`
/// directly; not a Prometheus exposition format.
async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.metrics.snapshot().await)
}

/// `GET /ws`. Upgrades to a subscriber connection; the server only ever
/// pushes `WEATHER_ALERT` broadcasts on this socket, inbound messages are
/// read and discarded.
async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_subscriber(socket, state))
}

async fn handle_subscriber(socket: WebSocket, state: AppState) {
    let id = Uuid::new_v4();
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    state.broadcast_channel.on_connect(id, tx);
    tracing::info!(
        subscriber_id = %id,
        count = state.broadcast_channel.subscriber_count(),
        "Subscriber connected"
    );

    let (mut sender, mut receiver) = socket.split();

    let mut send_task = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            if sender.send(Message::Text(message.into())).await.is_err() {
                break;
            }
        }
    });

    let mut recv_task = tokio::spawn(async move {
        while receiver.next().await.is_some() {
            // inbound subscriber messages are ignored
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    state.broadcast_channel.on_disconnect(id);
    tracing::info!(subscriber_id = %id, "Subscriber disconnected");
}

/// Build the complete application router: the operational `/health` and
/// `/metrics` surface, the `/ws` subscriber channel, and Swagger UI.
pub fn build_router() -> Router<AppState> {
    Router::new()
        .route("/", get(health))
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route("/ws", get(ws_upgrade))
        .merge(swagger_ui())
}
