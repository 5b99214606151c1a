//! Request guards: loopback-only admin access and the pause switch.

use std::net::SocketAddr;
use std::sync::atomic::Ordering;

use axum::Json;
use axum::extract::{ConnectInfo, Request, State};
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use tracing::debug;

use super::AppState;

/// Header cloudflared adds to every request it forwards.
pub const CF_CONNECTING_IP: &str = "cf-connecting-ip";

/// Message shown to remote users while the host has paused the server.
pub const PAUSED_MESSAGE: &str =
    "This server is temporarily paused by the host. Please try again later.";

/// A request is local when it did not come through the tunnel and its peer
/// is a loopback address.
pub fn is_local_request(headers: &HeaderMap, peer: SocketAddr) -> bool {
    if headers.contains_key(CF_CONNECTING_IP) {
        return false;
    }
    peer.ip().to_canonical().is_loopback()
}

/// Paths remote users can still reach while the server is paused.
pub fn is_essential_path(path: &str) -> bool {
    matches!(
        path,
        "/" | "/health"
            | "/api/status"
            | "/api/setup/status"
            | "/api/auth/login"
            | "/api/auth/logout"
            | "/api/auth/me"
    ) || path.starts_with("/assets/")
}

/// Reject anything that is not a local request with 403.
pub async fn require_local(
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    request: Request,
    next: Next,
) -> Response {
    if !is_local_request(request.headers(), peer) {
        debug!(%peer, path = request.uri().path(), "Rejected non-local admin request");
        return (
            StatusCode::FORBIDDEN,
            Json(json!({"error": "admin access is only available from this machine"})),
        )
            .into_response();
    }
    next.run(request).await
}

/// Block remote, non-essential requests with 503 while paused.
pub async fn pause_guard(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    request: Request,
    next: Next,
) -> Response {
    if !state.paused.load(Ordering::Relaxed)
        || is_local_request(request.headers(), peer)
        || is_essential_path(request.uri().path())
    {
        return next.run(request).await;
    }

    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(json!({"error": "server_paused", "message": PAUSED_MESSAGE})),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    fn addr(s: &str) -> SocketAddr {
        s.parse().unwrap()
    }

    #[test]
    fn loopback_without_tunnel_header_is_local() {
        let headers = HeaderMap::new();
        assert!(is_local_request(&headers, addr("127.0.0.1:5000")));
        assert!(is_local_request(&headers, addr("[::1]:5000")));
        assert!(is_local_request(&headers, addr("[::ffff:127.0.0.1]:5000")));
        assert!(!is_local_request(&headers, addr("192.168.1.20:5000")));
    }

    #[test]
    fn tunnel_header_marks_request_remote() {
        let mut headers = HeaderMap::new();
        headers.insert(CF_CONNECTING_IP, HeaderValue::from_static("203.0.113.7"));
        assert!(!is_local_request(&headers, addr("127.0.0.1:5000")));
    }

    #[test]
    fn essential_paths() {
        for path in ["/", "/health", "/api/status", "/api/auth/me", "/assets/app.js"] {
            assert!(is_essential_path(path), "{path}");
        }
        for path in ["/api/chat", "/api/admin/pause", "/assets", "/v1/models"] {
            assert!(!is_essential_path(path), "{path}");
        }
    }
}
