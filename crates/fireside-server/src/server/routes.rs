//! HTTP handlers for status, settings, tunnel claims and the pause toggle.

use std::sync::Arc;
use std::sync::atomic::Ordering;

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{error, info, warn};

use super::AppState;
use crate::storage::{DatabaseError, keys};
use crate::tunnel::{ClaimOutcome, RegistrationError, TunnelOrchestrator};

fn json_error(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

fn invalid_json(rejection: &JsonRejection) -> Response {
    warn!(error = %rejection, "Rejected request body");
    json_error(StatusCode::BAD_REQUEST, "invalid JSON")
}

fn store_failure(e: &DatabaseError) -> Response {
    error!(error = %e, "Config store failure");
    json_error(StatusCode::INTERNAL_SERVER_ERROR, "failed to access config store")
}

fn registration_failure(e: &RegistrationError) -> Response {
    warn!(error = %e, "Registration request failed");
    let message = match e {
        RegistrationError::Unreachable(_) => "registration service unreachable",
        RegistrationError::InvalidResponse(_) => "invalid response from registration service",
    };
    json_error(StatusCode::BAD_GATEWAY, message)
}

fn status_code(status: reqwest::StatusCode) -> StatusCode {
    StatusCode::from_u16(status.as_u16()).unwrap_or(StatusCode::BAD_GATEWAY)
}

/// `GET /health`
pub async fn health(State(state): State<AppState>) -> Response {
    match state.db.config_value(keys::SERVER_NAME).await {
        Ok(server_name) => Json(json!({"status": "ok", "server_name": server_name})).into_response(),
        Err(e) => store_failure(&e),
    }
}

/// `GET /api/status`: public server name and pause state.
pub async fn status(State(state): State<AppState>) -> Response {
    match state.db.config_value(keys::SERVER_NAME).await {
        Ok(server_name) => Json(json!({
            "status": "ok",
            "server_name": server_name,
            "paused": state.paused.load(Ordering::Relaxed),
        }))
        .into_response(),
        Err(e) => store_failure(&e),
    }
}

/// `GET /api/admin/settings`
pub async fn get_settings(State(state): State<AppState>) -> Response {
    let read = async {
        Ok::<_, DatabaseError>((
            state.db.config_value(keys::SERVER_NAME).await?,
            state.db.config_value(keys::TUNNEL_URL).await?,
            state.db.config_value(keys::TUNNEL_SUBDOMAIN).await?,
        ))
    };
    match read.await {
        Ok((server_name, tunnel_url, tunnel_subdomain)) => Json(json!({
            "server_name": server_name,
            "tunnel_url": tunnel_url,
            "tunnel_mode": state.tunnel.mode().await,
            "tunnel_subdomain": tunnel_subdomain,
        }))
        .into_response(),
        Err(e) => store_failure(&e),
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateSettings {
    server_name: Option<String>,
    tunnel_url: Option<String>,
}

/// `PUT /api/admin/settings`: absent fields are left unchanged.
pub async fn update_settings(
    State(state): State<AppState>,
    body: Result<Json<UpdateSettings>, JsonRejection>,
) -> Response {
    let Json(req) = match body {
        Ok(body) => body,
        Err(rejection) => return invalid_json(&rejection),
    };

    let write = async {
        if let Some(name) = &req.server_name {
            state.db.set_config(keys::SERVER_NAME, name).await?;
        }
        if let Some(url) = &req.tunnel_url {
            state.db.set_config(keys::TUNNEL_URL, url).await?;
        }
        Ok::<_, DatabaseError>(())
    };
    match write.await {
        Ok(()) => Json(json!({"status": "updated"})).into_response(),
        Err(e) => store_failure(&e),
    }
}

#[derive(Debug, Deserialize)]
pub struct NameRequest {
    name: String,
}

/// `POST /api/admin/tunnel/check`: proxied to the registration service.
pub async fn tunnel_check(
    State(state): State<AppState>,
    body: Result<Json<NameRequest>, JsonRejection>,
) -> Response {
    let Json(req) = match body {
        Ok(body) => body,
        Err(rejection) => return invalid_json(&rejection),
    };

    match state.registration.check(&req.name).await {
        Ok((status, body)) => (status_code(status), Json(body)).into_response(),
        Err(e) => registration_failure(&e),
    }
}

/// `POST /api/admin/tunnel/claim`: claim a name, store its credentials and
/// switch the running tunnel over in the background.
pub async fn tunnel_claim(
    State(state): State<AppState>,
    body: Result<Json<NameRequest>, JsonRejection>,
) -> Response {
    let Json(req) = match body {
        Ok(body) => body,
        Err(rejection) => return invalid_json(&rejection),
    };

    let instance_id = match state.db.ensure_instance_id().await {
        Ok(id) => id,
        Err(e) => return store_failure(&e),
    };

    let (credentials, body) = match state.registration.claim(&req.name, &instance_id).await {
        Ok(ClaimOutcome::Claimed { credentials, body }) => (credentials, body),
        Ok(ClaimOutcome::Rejected { status, body }) => {
            return (status_code(status), Json(body)).into_response();
        }
        Err(e) => return registration_failure(&e),
    };

    if let Err(e) = state.db.store_tunnel_credentials(&credentials).await {
        return store_failure(&e);
    }
    info!(subdomain = %credentials.subdomain, "Tunnel name claimed");

    spawn_hot_swap(Arc::clone(&state.tunnel));
    (StatusCode::CREATED, Json(body)).into_response()
}

fn spawn_hot_swap(tunnel: Arc<TunnelOrchestrator>) {
    tokio::spawn(async move {
        if let Err(e) = tunnel.activate_named().await {
            warn!(error = %e, "Hot-swap to named tunnel failed");
        }
    });
}

/// `GET /api/admin/pause`
pub async fn get_pause(State(state): State<AppState>) -> Json<Value> {
    Json(json!({"paused": state.paused.load(Ordering::Relaxed)}))
}

#[derive(Debug, Deserialize)]
pub struct PauseRequest {
    paused: bool,
}

/// `PUT /api/admin/pause`: persisted first, then applied.
pub async fn set_pause(
    State(state): State<AppState>,
    body: Result<Json<PauseRequest>, JsonRejection>,
) -> Response {
    let Json(req) = match body {
        Ok(body) => body,
        Err(rejection) => return invalid_json(&rejection),
    };

    if let Err(e) = state.db.set_paused(req.paused).await {
        error!(error = %e, "Failed to persist pause state");
        return json_error(StatusCode::INTERNAL_SERVER_ERROR, "failed to save");
    }
    state.paused.store(req.paused, Ordering::Relaxed);
    info!(paused = req.paused, "Server pause state changed");

    Json(json!({"paused": req.paused})).into_response()
}
