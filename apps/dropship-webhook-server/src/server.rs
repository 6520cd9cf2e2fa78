//! HTTP Server implementation

use anyhow::{Context, Result};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::json;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info};

use dropship_webhook::{DeliveryRequest, DeliveryResponse};

use crate::app::AppState;

const DEFAULT_DELIVERY_LIMIT: usize = 50;
const MAX_DELIVERY_LIMIT: usize = 500;

pub struct Server {
    addr: String,
    state: AppState,
}

impl Server {
    pub fn new(addr: String, state: AppState) -> Self {
        Self { addr, state }
    }

    pub async fn run(self) -> Result<()> {
        let app = build_router(self.state);

        let listener = tokio::net::TcpListener::bind(&self.addr)
            .await
            .with_context(|| format!("Failed to bind HTTP server to {}", self.addr))?;

        info!("HTTP server listening on {}", self.addr);

        axum::serve(listener, app.into_make_service())
            .with_graceful_shutdown(shutdown_signal())
            .await
            .context("HTTP server error")?;

        Ok(())
    }
}

pub fn build_router(state: AppState) -> Router {
    let api = Router::new()
        .route("/webhooks/deliver", post(deliver_webhook))
        .route("/webhooks/:id/deliveries", get(list_deliveries));

    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .nest("/api/v1", api)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        return;
    }
    info!("Shutdown signal received");
}

// Route handlers

async fn root() -> Json<serde_json::Value> {
    Json(json!({
        "service": "Dropship Webhook Delivery",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running"
    }))
}

async fn health_check() -> StatusCode {
    StatusCode::OK
}

async fn deliver_webhook(
    State(state): State<AppState>,
    Json(request): Json<DeliveryRequest>,
) -> (StatusCode, Json<DeliveryResponse>) {
    let response = state.engine.trigger(request).await;
    let status =
        StatusCode::from_u16(response.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

    (status, Json(response))
}

#[derive(Debug, Deserialize)]
struct DeliveriesQuery {
    limit: Option<usize>,
}

async fn list_deliveries(
    State(state): State<AppState>,
    Path(webhook_id): Path<String>,
    Query(query): Query<DeliveriesQuery>,
) -> Response {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_DELIVERY_LIMIT)
        .clamp(1, MAX_DELIVERY_LIMIT);

    match state.delivery_log.list_by_webhook(&webhook_id, limit).await {
        Ok(attempts) => Json(attempts).into_response(),
        Err(e) => {
            error!(webhook_id = %webhook_id, error = %e, "Failed to list deliveries");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": e.to_string() })),
            )
                .into_response()
        }
    }
}
