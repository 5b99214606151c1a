//! Heartbeat task keeping a claimed name alive at the registration service.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::registration::RegistrationClient;
use crate::storage::{Database, keys};

/// Spawn a task that sends a heartbeat immediately and then every
/// `interval`, until `cancel` fires.
pub fn spawn_heartbeat_task(
    client: RegistrationClient,
    db: Database,
    interval: Duration,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(interval);

        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    debug!("Heartbeat task shutting down");
                    return;
                }
                _ = timer.tick() => send_heartbeat(&client, &db).await,
            }
        }
    })
}

/// Send one heartbeat. Skipped when no claimed name or instance id is stored.
pub async fn send_heartbeat(client: &RegistrationClient, db: &Database) {
    let creds = match db.tunnel_credentials().await {
        Ok(Some(creds)) => creds,
        Ok(None) => return,
        Err(e) => {
            warn!(error = %e, "Heartbeat could not read tunnel credentials");
            return;
        }
    };
    let instance_id = match db.config_value(keys::INSTANCE_ID).await {
        Ok(v) => v,
        Err(e) => {
            warn!(error = %e, "Heartbeat could not read instance id");
            return;
        }
    };

    let name = creds.name();
    if name.is_empty() || instance_id.is_empty() {
        return;
    }

    if let Err(e) = client.heartbeat(name, &instance_id).await {
        warn!(error = %e, "Tunnel heartbeat failed");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use axum::extract::State;
    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::{Value, json};

    use super::*;
    use crate::storage::TunnelCredentials;

    type Seen = Arc<Mutex<Vec<Value>>>;

    async fn recording_service() -> (RegistrationClient, Seen) {
        let seen: Seen = Arc::default();
        let router = Router::new()
            .route(
                "/heartbeat",
                post(|State(seen): State<Seen>, Json(req): Json<Value>| async move {
                    seen.lock().unwrap().push(req);
                    StatusCode::OK
                }),
            )
            .with_state(Arc::clone(&seen));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        let client = RegistrationClient::new(&format!("http://{addr}")).unwrap();
        (client, seen)
    }

    async fn claimed_db() -> Database {
        let db = Database::open_in_memory().await.unwrap();
        db.store_tunnel_credentials(&TunnelCredentials {
            token: "tok".into(),
            subdomain: "alice.fireside.run".into(),
        })
        .await
        .unwrap();
        db
    }

    #[tokio::test]
    async fn skipped_without_instance_id() {
        let (client, seen) = recording_service().await;
        let db = claimed_db().await;

        send_heartbeat(&client, &db).await;
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn skipped_without_claimed_name() {
        let (client, seen) = recording_service().await;
        let db = Database::open_in_memory().await.unwrap();
        db.set_config(keys::INSTANCE_ID, "inst-1").await.unwrap();

        send_heartbeat(&client, &db).await;
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn task_sends_immediately_and_stops_on_cancel() {
        let (client, seen) = recording_service().await;
        let db = claimed_db().await;
        db.set_config(keys::INSTANCE_ID, "inst-1").await.unwrap();

        let cancel = CancellationToken::new();
        let handle =
            spawn_heartbeat_task(client, db, Duration::from_secs(3600), cancel.clone());

        for _ in 0..200 {
            if !seen.lock().unwrap().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(
            seen.lock().unwrap().as_slice(),
            &[json!({"name": "alice", "instance_id": "inst-1"})]
        );

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
