//! Named tunnel: a permanent `<name>.fireside.run` hostname backed by a
//! token claimed from the registration service.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::config::TunnelConfig;
use super::error::TunnelError;
use super::provider::{ProviderMode, TunnelProvider, UrlEvents, url_channel};
use super::supervisor::{Invocation, OutputMode, Supervisor, resolve_binary};
use crate::storage::Database;

/// Supervises `cloudflared tunnel run --token <token>`.
///
/// Credentials are read from the config store on every `start`, so a fresh
/// claim takes effect on the next start without rebuilding the provider.
pub struct NamedTunnel {
    binary: String,
    db: Database,
    supervisor: Supervisor,
}

impl NamedTunnel {
    pub fn new(config: &TunnelConfig, db: Database) -> Self {
        Self {
            binary: config.binary.clone(),
            db,
            supervisor: Supervisor::new("named", OutputMode::Discard, config.backoff),
        }
    }

    pub fn is_running(&self) -> bool {
        self.supervisor.is_running()
    }
}

#[async_trait]
impl TunnelProvider for NamedTunnel {
    async fn start(&self, cancel: &CancellationToken) -> Result<UrlEvents, TunnelError> {
        let creds = self
            .db
            .tunnel_credentials()
            .await?
            .ok_or(TunnelError::NotConfigured)?;
        let program = resolve_binary(&self.binary).ok_or_else(|| TunnelError::BinaryNotFound {
            binary: self.binary.clone(),
        })?;

        let (tx, rx) = url_channel();
        // The hostname is known up front; report it before the process is up.
        let url = creds.public_url();
        if tx.try_send(url.clone()).is_err() {
            debug!(url = %url, "Named tunnel URL event dropped");
        }

        info!(url = %url, "Starting named tunnel");
        self.supervisor.launch(
            Invocation {
                program,
                args: vec![
                    "tunnel".into(),
                    "run".into(),
                    "--token".into(),
                    creds.token,
                ],
            },
            cancel,
            tx,
        );
        Ok(rx)
    }

    fn stop(&self) {
        self.supervisor.stop();
    }

    fn mode(&self) -> ProviderMode {
        ProviderMode::Auto
    }
}
