//! Client for the name registration service (`api.fireside.run`).
//!
//! The service hands out `<name>.fireside.run` hostnames together with the
//! tunnel token that serves them, and expects periodic heartbeats to keep
//! a claimed name alive.

use std::time::Duration;

use reqwest::StatusCode;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::storage::TunnelCredentials;

/// Registration client errors.
#[derive(Debug, Error)]
pub enum RegistrationError {
    #[error("registration service unreachable: {0}")]
    Unreachable(#[from] reqwest::Error),

    #[error("invalid response from registration service: {0}")]
    InvalidResponse(String),
}

/// Outcome of a claim that reached the service.
#[derive(Debug)]
pub enum ClaimOutcome {
    /// 201: the name now belongs to this installation.
    Claimed {
        credentials: TunnelCredentials,
        body: Value,
    },
    /// Any other status, passed through to the caller untouched.
    Rejected { status: StatusCode, body: Value },
}

#[derive(Serialize)]
struct NameRequest<'a> {
    name: &'a str,
}

#[derive(Serialize)]
struct InstanceRequest<'a> {
    name: &'a str,
    instance_id: &'a str,
}

/// HTTP client for the registration service.
#[derive(Debug, Clone)]
pub struct RegistrationClient {
    http: reqwest::Client,
    base_url: String,
}

impl RegistrationClient {
    pub fn new(base_url: &str) -> Result<Self, RegistrationError> {
        // reqwest is built with rustls-no-provider; `Err` means already installed.
        let _ = rustls::crypto::ring::default_provider().install_default();

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Ask whether `name` is available. Status and body are returned as-is;
    /// a body that is not JSON becomes `null`.
    pub async fn check(&self, name: &str) -> Result<(StatusCode, Value), RegistrationError> {
        let resp = self
            .http
            .post(self.url("/check"))
            .json(&NameRequest { name })
            .send()
            .await?;
        let status = resp.status();
        let body = resp.json::<Value>().await.unwrap_or(Value::Null);
        Ok((status, body))
    }

    /// Claim `name` for this installation.
    pub async fn claim(
        &self,
        name: &str,
        instance_id: &str,
    ) -> Result<ClaimOutcome, RegistrationError> {
        let resp = self
            .http
            .post(self.url("/claim"))
            .json(&InstanceRequest { name, instance_id })
            .send()
            .await?;
        let status = resp.status();
        let body: Value = resp
            .json()
            .await
            .map_err(|e| RegistrationError::InvalidResponse(e.to_string()))?;

        if status != StatusCode::CREATED {
            return Ok(ClaimOutcome::Rejected { status, body });
        }

        let credentials: TunnelCredentials = serde_json::from_value(body.clone())
            .map_err(|e| RegistrationError::InvalidResponse(e.to_string()))?;
        if !credentials.is_complete() {
            return Err(RegistrationError::InvalidResponse(
                "claim response is missing tunnel_token or subdomain".into(),
            ));
        }
        Ok(ClaimOutcome::Claimed { credentials, body })
    }

    /// Keep a claimed name alive. The response body is ignored.
    pub async fn heartbeat(&self, name: &str, instance_id: &str) -> Result<(), RegistrationError> {
        let resp = self
            .http
            .post(self.url("/heartbeat"))
            .json(&InstanceRequest { name, instance_id })
            .send()
            .await?;
        debug!(status = %resp.status(), name, "Registration heartbeat sent");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;
    use std::sync::{Arc, Mutex};

    use axum::extract::State;
    use axum::http::StatusCode as AxumStatus;
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::json;

    use super::*;

    async fn serve(router: Router) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        addr
    }

    #[test]
    fn trailing_slash_is_trimmed() {
        let client = RegistrationClient::new("https://api.fireside.run/").unwrap();
        assert_eq!(client.base_url(), "https://api.fireside.run");
        assert_eq!(client.url("/claim"), "https://api.fireside.run/claim");
    }

    #[tokio::test]
    async fn check_passes_status_and_body_through() {
        let router = Router::new().route(
            "/check",
            post(|Json(req): Json<Value>| async move {
                (
                    AxumStatus::CONFLICT,
                    Json(json!({"available": false, "name": req["name"]})),
                )
            }),
        );
        let addr = serve(router).await;
        let client = RegistrationClient::new(&format!("http://{addr}")).unwrap();

        let (status, body) = client.check("alice").await.unwrap();
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body, json!({"available": false, "name": "alice"}));
    }

    #[tokio::test]
    async fn claim_created_yields_credentials() {
        let router = Router::new().route(
            "/claim",
            post(|Json(req): Json<Value>| async move {
                assert_eq!(req["instance_id"], "inst-1");
                (
                    AxumStatus::CREATED,
                    Json(json!({"tunnel_token": "xyz", "subdomain": "carol.example.com"})),
                )
            }),
        );
        let addr = serve(router).await;
        let client = RegistrationClient::new(&format!("http://{addr}")).unwrap();

        match client.claim("carol", "inst-1").await.unwrap() {
            ClaimOutcome::Claimed { credentials, body } => {
                assert_eq!(credentials.token, "xyz");
                assert_eq!(credentials.subdomain, "carol.example.com");
                assert_eq!(body["subdomain"], "carol.example.com");
            }
            ClaimOutcome::Rejected { status, .. } => panic!("unexpected rejection: {status}"),
        }
    }

    #[tokio::test]
    async fn claim_other_status_is_rejected() {
        let router = Router::new().route(
            "/claim",
            post(|| async { (AxumStatus::CONFLICT, Json(json!({"error": "name taken"}))) }),
        );
        let addr = serve(router).await;
        let client = RegistrationClient::new(&format!("http://{addr}")).unwrap();

        match client.claim("bob", "inst-1").await.unwrap() {
            ClaimOutcome::Rejected { status, body } => {
                assert_eq!(status, StatusCode::CONFLICT);
                assert_eq!(body["error"], "name taken");
            }
            ClaimOutcome::Claimed { .. } => panic!("expected rejection"),
        }
    }

    #[tokio::test]
    async fn claim_non_json_body_is_invalid() {
        let router = Router::new().route("/claim", post(|| async { "not json" }));
        let addr = serve(router).await;
        let client = RegistrationClient::new(&format!("http://{addr}")).unwrap();

        let err = client.claim("bob", "inst-1").await.unwrap_err();
        assert!(matches!(err, RegistrationError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn unreachable_service() {
        // Bind then drop to get a port nothing listens on.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let client = RegistrationClient::new(&format!("http://{addr}")).unwrap();

        let err = client.check("alice").await.unwrap_err();
        assert!(matches!(err, RegistrationError::Unreachable(_)));
    }

    #[tokio::test]
    async fn heartbeat_sends_name_and_instance() {
        let seen: Arc<Mutex<Vec<Value>>> = Arc::default();
        let router = Router::new()
            .route(
                "/heartbeat",
                post(
                    |State(seen): State<Arc<Mutex<Vec<Value>>>>, Json(req): Json<Value>| async move {
                        seen.lock().unwrap().push(req);
                        AxumStatus::OK
                    },
                ),
            )
            .with_state(Arc::clone(&seen));
        let addr = serve(router).await;
        let client = RegistrationClient::new(&format!("http://{addr}")).unwrap();

        client.heartbeat("alice", "inst-1").await.unwrap();
        let seen = seen.lock().unwrap();
        assert_eq!(seen.as_slice(), &[json!({"name": "alice", "instance_id": "inst-1"})]);
    }
}
