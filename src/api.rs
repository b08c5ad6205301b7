//! REST control surface: inbound delivery, destination settings and
//! capability reporting.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use serde::Deserialize;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use crate::capability::{PermissionResult, ReportedPermissionHost};
use crate::error::Error;
use crate::inbound::InboundBatch;
use crate::relay::{BatchSummary, RelayService};

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<RelayService>,
    /// Host fed by `/api/capabilities/result` (None when the host reports
    /// grants some other way).
    pub host: Option<Arc<ReportedPermissionHost>>,
}

/// Build the Axum router with the relay's REST routes.
pub fn relay_routes(
    service: Arc<RelayService>,
    host: Option<Arc<ReportedPermissionHost>>,
) -> Router {
    let state = AppState { service, host };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/api/inbound", post(inbound))
        .route("/api/target", get(get_target).post(save_target))
        .route("/api/target/refresh", post(refresh_target))
        .route("/api/capabilities", get(get_capabilities))
        .route("/api/capabilities/request", post(request_capabilities))
        .route("/api/capabilities/result", post(capability_result))
        .route("/api/capabilities/settings", post(open_settings))
        .layer(cors)
        .with_state(state)
}

// ── Health ──────────────────────────────────────────────────────────────

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "sms-relay"
    }))
}

// ── Inbound ─────────────────────────────────────────────────────────────

async fn inbound(State(state): State<AppState>, Json(batch): Json<InboundBatch>) -> impl IntoResponse {
    let outcomes = state.service.handle_inbound_event(batch).await;
    let summary = BatchSummary::from_outcomes(&outcomes);
    Json(serde_json::json!({
        "outcomes": outcomes,
        "summary": summary,
    }))
}

// ── Destination ─────────────────────────────────────────────────────────

async fn get_target(State(state): State<AppState>) -> impl IntoResponse {
    match state.service.current_target().await {
        Ok(view) => (StatusCode::OK, Json(serde_json::json!(view))),
        Err(e) => {
            error!(error = %e, "Failed to read destination");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"error": e.to_string()})),
            )
        }
    }
}

#[derive(Deserialize)]
struct SaveTargetRequest {
    value: String,
}

async fn save_target(
    State(state): State<AppState>,
    Json(body): Json<SaveTargetRequest>,
) -> impl IntoResponse {
    match state.service.save_address(&body.value).await {
        Ok(target) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "display": target.display(),
                "target": target,
            })),
        ),
        Err(Error::Validation(e)) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(serde_json::json!({"error": e.to_string()})),
        ),
        Err(e) => {
            error!(error = %e, "Failed to save destination");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"error": e.to_string()})),
            )
        }
    }
}

async fn refresh_target(State(state): State<AppState>) -> impl IntoResponse {
    match state.service.refresh_remote().await {
        Ok(status) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "message": status.message(),
                "status": status,
            })),
        ),
        Err(e) => {
            error!(error = %e, "Remote refresh task failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"error": "refresh task failed"})),
            )
        }
    }
}

// ── Capabilities ────────────────────────────────────────────────────────

async fn get_capabilities(State(state): State<AppState>) -> impl IntoResponse {
    let snapshot = state.service.capabilities().await;
    let pending = match state.host {
        Some(ref host) => host.pending().await,
        None => Vec::new(),
    };
    Json(serde_json::json!({
        "states": snapshot.states,
        "all_granted": snapshot.all_granted,
        "needs_settings": snapshot.needs_settings,
        "pending": pending,
    }))
}

async fn request_capabilities(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.service.request_capabilities().await)
}

async fn capability_result(
    State(state): State<AppState>,
    Json(result): Json<PermissionResult>,
) -> impl IntoResponse {
    if let Some(ref host) = state.host {
        host.record(&result).await;
    }
    let snapshot = state.service.on_permission_result(&result).await;
    info!(all_granted = snapshot.all_granted, "Permission result applied");
    Json(snapshot)
}

async fn open_settings(State(state): State<AppState>) -> impl IntoResponse {
    state.service.open_host_settings().await;
    Json(serde_json::json!({"status": "settings_opened"}))
}
