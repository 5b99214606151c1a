//! HTTP surface of the gateway.
//!
//! Admin routes are reachable from the host machine only; everything else
//! passes through the pause guard.

pub mod guard;
pub mod routes;

use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use axum::Router;
use axum::middleware;
use axum::routing::{get, post};

use crate::storage::Database;
use crate::tunnel::{RegistrationClient, TunnelOrchestrator};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub tunnel: Arc<TunnelOrchestrator>,
    pub registration: RegistrationClient,
    /// In-memory copy of the persisted pause flag, read on every request.
    pub paused: Arc<AtomicBool>,
}

impl AppState {
    pub fn new(
        db: Database,
        tunnel: Arc<TunnelOrchestrator>,
        registration: RegistrationClient,
        paused: bool,
    ) -> Self {
        Self {
            db,
            tunnel,
            registration,
            paused: Arc::new(AtomicBool::new(paused)),
        }
    }
}

/// Build the router. Serve it with
/// `into_make_service_with_connect_info::<SocketAddr>()`; the guards need
/// the peer address.
pub fn build_router(state: AppState) -> Router {
    let admin = Router::new()
        .route(
            "/api/admin/settings",
            get(routes::get_settings).put(routes::update_settings),
        )
        .route("/api/admin/tunnel/check", post(routes::tunnel_check))
        .route("/api/admin/tunnel/claim", post(routes::tunnel_claim))
        .route(
            "/api/admin/pause",
            get(routes::get_pause).put(routes::set_pause),
        )
        .route_layer(middleware::from_fn(guard::require_local));

    Router::new()
        .route("/health", get(routes::health))
        .route("/api/status", get(routes::status))
        .merge(admin)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            guard::pause_guard,
        ))
        .with_state(state)
}

#[cfg(test)]
#[path = "routes_tests.rs"]
mod tests;
