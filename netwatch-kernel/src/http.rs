/**
 * API HTTP NETWATCH - Serveur HTTP du kernel
 *
 * RÔLE :
 * Expose l'état du moteur de surveillance aux dashboards et aux scripts :
 * lecture de l'état courant, historique, vérification à la demande, et la
 * connexion WebSocket temps réel.
 *
 * ROUTES :
 * - GET  /health                 : "ok"
 * - GET  /system/health          : état du kernel (uptime, abonnés, canal d'alerte)
 * - GET  /ws                     : WebSocket abonné
 * - GET  /devices                : snapshot complet (status_update)
 * - GET  /devices/{name}         : état d'un équipement
 * - POST /devices/{name}/check   : vérification prioritaire (202)
 * - GET  /history?device=&limit= : transitions récentes
 */

use crate::health::KernelHealth;
use crate::models::{DeviceState, HistoryEvent};
use crate::monitor::Monitor;
use crate::publisher::ServerMessage;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use std::sync::Arc;

const DEFAULT_HISTORY_LIMIT: usize = 100;

#[derive(Clone)]
pub struct AppState {
    pub monitor: Arc<Monitor>,
}

#[derive(Debug, Deserialize)]
struct HistoryParams {
    device: Option<String>,
    limit: Option<usize>,
}

pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/system/health", get(get_system_health))
        .route("/ws", get(crate::ws::ws_handler))
        .route("/devices", get(get_devices))
        .route("/devices/{name}", get(get_device))
        .route("/devices/{name}/check", post(check_device))
        .route("/history", get(get_history))
        .with_state(app_state)
}

// GET /system/health
async fn get_system_health(State(app): State<AppState>) -> Json<KernelHealth> {
    Json(app.monitor.health())
}

// GET /devices
async fn get_devices(State(app): State<AppState>) -> Json<ServerMessage> {
    Json(app.monitor.snapshot())
}

// GET /devices/{name}
async fn get_device(
    State(app): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<DeviceState>, StatusCode> {
    app.monitor.device(&name).map(Json).ok_or(StatusCode::NOT_FOUND)
}

// POST /devices/{name}/check
async fn check_device(
    State(app): State<AppState>,
    Path(name): Path<String>,
) -> (StatusCode, Json<serde_json::Value>) {
    if app.monitor.trigger_check(&name) {
        (StatusCode::ACCEPTED, Json(serde_json::json!({ "ok": true, "device": name })))
    } else {
        (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "ok": false, "msg": format!("unknown device: {}", name) })),
        )
    }
}

// GET /history
async fn get_history(
    State(app): State<AppState>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<Vec<HistoryEvent>>, StatusCode> {
    let limit = params.limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
    match app.monitor.history().recent(params.device.as_deref(), limit).await {
        Ok(events) => Ok(Json(events)),
        Err(e) => {
            tracing::error!("[http] history read failed: {}", e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}
