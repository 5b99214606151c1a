//! Tunnel lifecycle: picks a provider at boot, mirrors its URL into the
//! config store, and hot-swaps to a named tunnel once a name is claimed.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::config::TunnelConfig;
use super::error::TunnelError;
use super::heartbeat::spawn_heartbeat_task;
use super::named::NamedTunnel;
use super::noop::NoopTunnel;
use super::provider::{ProviderMode, TunnelProvider, UrlEvents};
use super::quick::QuickTunnel;
use super::registration::RegistrationClient;
use super::supervisor::resolve_binary;
use crate::storage::{Database, DatabaseError, keys};

/// Which provider is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TunnelKind {
    Disabled,
    Quick,
    Named,
}

impl TunnelKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Disabled => "disabled",
            Self::Quick => "quick",
            Self::Named => "named",
        }
    }
}

impl fmt::Display for TunnelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

struct ActiveTunnel {
    provider: Arc<dyn TunnelProvider>,
    kind: TunnelKind,
    /// Scopes the provider's run loop, its forwarder and its heartbeat.
    cancel: CancellationToken,
    forwarder: Option<JoinHandle<()>>,
}

impl ActiveTunnel {
    /// Stop the provider and wait for its forwarder, so nothing it started
    /// can write `tunnel_url` afterwards.
    async fn retire(&mut self) {
        self.provider.stop();
        self.cancel.cancel();
        if let Some(forwarder) = self.forwarder.take() {
            let _ = forwarder.await;
        }
    }
}

/// Owns the single active tunnel provider.
pub struct TunnelOrchestrator {
    db: Database,
    config: TunnelConfig,
    registration: Option<RegistrationClient>,
    root: CancellationToken,
    active: Mutex<ActiveTunnel>,
}

impl TunnelOrchestrator {
    /// Create an orchestrator in the `Disabled` state. Call [`boot`](Self::boot)
    /// to start a real provider.
    pub fn new(
        config: TunnelConfig,
        db: Database,
        registration: Option<RegistrationClient>,
    ) -> Self {
        let root = CancellationToken::new();
        let active = ActiveTunnel {
            provider: Arc::new(NoopTunnel),
            kind: TunnelKind::Disabled,
            cancel: root.child_token(),
            forwarder: None,
        };
        Self {
            db,
            config,
            registration,
            root,
            active: Mutex::new(active),
        }
    }

    /// Decide which provider boot should start.
    pub async fn select_initial_kind(&self) -> Result<TunnelKind, DatabaseError> {
        if self.config.disabled {
            return Ok(TunnelKind::Disabled);
        }
        if self.db.has_named_tunnel().await? {
            return Ok(TunnelKind::Named);
        }
        if resolve_binary(&self.config.binary).is_some() {
            return Ok(TunnelKind::Quick);
        }
        Ok(TunnelKind::Disabled)
    }

    fn build_provider(&self, kind: TunnelKind) -> Arc<dyn TunnelProvider> {
        match kind {
            TunnelKind::Disabled => Arc::new(NoopTunnel),
            TunnelKind::Quick => Arc::new(QuickTunnel::new(&self.config)),
            TunnelKind::Named => Arc::new(NamedTunnel::new(&self.config, self.db.clone())),
        }
    }

    /// Start the initial provider and wait (bounded) for its first URL.
    ///
    /// Never fails: configuration problems degrade to `Disabled`. Returns the
    /// first public URL if one arrived in time.
    pub async fn boot(&self) -> Option<String> {
        let kind = self.select_initial_kind().await.unwrap_or_else(|e| {
            warn!(error = %e, "Could not read tunnel credentials, tunnel disabled");
            TunnelKind::Disabled
        });

        let (kind, provider, cancel, events) = match self.start_provider(kind).await {
            Ok((provider, cancel, events)) => (kind, provider, cancel, Some(events)),
            Err(e) => {
                warn!(error = %e, tunnel = %kind, "Tunnel unavailable, running in manual mode");
                let provider: Arc<dyn TunnelProvider> = Arc::new(NoopTunnel);
                let cancel = self.root.child_token();
                let events = match provider.start(&cancel).await {
                    Ok(events) => Some(events),
                    Err(e) => {
                        error!(error = %e, "Noop tunnel failed to start");
                        None
                    }
                };
                (TunnelKind::Disabled, provider, cancel, events)
            }
        };
        info!(tunnel = %kind, mode = %provider.mode(), "Tunnel provider selected");

        let (first_url, forwarder) = match events {
            Some(mut events) => {
                let first = self.wait_first_url(kind, &mut events, &cancel).await;
                (first, Some(self.spawn_tasks(kind, events, &cancel)))
            }
            None => (None, None),
        };

        let mut active = self.active.lock().await;
        active.retire().await;
        *active = ActiveTunnel {
            provider,
            kind,
            cancel,
            forwarder,
        };
        first_url
    }

    async fn wait_first_url(
        &self,
        kind: TunnelKind,
        events: &mut UrlEvents,
        cancel: &CancellationToken,
    ) -> Option<String> {
        match timeout(self.config.first_url_timeout, events.recv()).await {
            Ok(Some(url)) => {
                if !cancel.is_cancelled() {
                    record_url(&self.db, &url).await;
                }
                Some(url)
            }
            Ok(None) => None,
            Err(_) => {
                warn!(
                    tunnel = %kind,
                    timeout_secs = self.config.first_url_timeout.as_secs(),
                    "Tunnel did not report a URL in time, continuing without one"
                );
                None
            }
        }
    }

    /// Switch to the named tunnel after a successful claim.
    ///
    /// From `Disabled` nothing changes at runtime; stored credentials are
    /// picked up on the next start. If the named tunnel fails to start, the
    /// previous provider is restarted and the error returned.
    pub async fn activate_named(&self) -> Result<(), TunnelError> {
        let mut active = self.active.lock().await;

        if active.kind == TunnelKind::Disabled {
            info!("Tunnel disabled, named tunnel will be used on next start");
            return Ok(());
        }
        if self.db.tunnel_credentials().await?.is_none() {
            warn!("Named tunnel requested but credentials are incomplete");
            return Err(TunnelError::NotConfigured);
        }

        info!(from = %active.kind, "Switching to named tunnel");
        active.retire().await;

        match self.start_provider(TunnelKind::Named).await {
            Ok((provider, cancel, events)) => {
                let forwarder = self.spawn_tasks(TunnelKind::Named, events, &cancel);
                *active = ActiveTunnel {
                    provider,
                    kind: TunnelKind::Named,
                    cancel,
                    forwarder: Some(forwarder),
                };
                info!("Named tunnel active");
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, tunnel = %active.kind, "Named tunnel failed to start, restoring previous tunnel");
                self.restore(&mut active).await;
                Err(e)
            }
        }
    }

    /// Restart the provider in `active` under a fresh token.
    async fn restore(&self, active: &mut ActiveTunnel) {
        let cancel = self.root.child_token();
        match active.provider.start(&cancel).await {
            Ok(events) => {
                active.forwarder = Some(self.spawn_tasks(active.kind, events, &cancel));
                active.cancel = cancel;
            }
            Err(e) => {
                error!(error = %e, tunnel = %active.kind, "Previous tunnel failed to restart, running in manual mode");
                cancel.cancel();
                active.provider = Arc::new(NoopTunnel);
                active.kind = TunnelKind::Disabled;
                active.cancel = self.root.child_token();
            }
        }
    }

    async fn start_provider(
        &self,
        kind: TunnelKind,
    ) -> Result<(Arc<dyn TunnelProvider>, CancellationToken, UrlEvents), TunnelError> {
        let provider = self.build_provider(kind);
        let cancel = self.root.child_token();
        match provider.start(&cancel).await {
            Ok(events) => Ok((provider, cancel, events)),
            Err(e) => {
                cancel.cancel();
                Err(e)
            }
        }
    }

    /// Spawn the URL forwarder and, for named tunnels, the heartbeat.
    /// Returns the forwarder's handle.
    fn spawn_tasks(
        &self,
        kind: TunnelKind,
        events: UrlEvents,
        cancel: &CancellationToken,
    ) -> JoinHandle<()> {
        let forwarder = spawn_forwarder(self.db.clone(), events, cancel.clone());
        if kind == TunnelKind::Named {
            if let Some(client) = &self.registration {
                spawn_heartbeat_task(
                    client.clone(),
                    self.db.clone(),
                    self.config.heartbeat_interval,
                    cancel.clone(),
                );
            }
        }
        forwarder
    }

    pub async fn kind(&self) -> TunnelKind {
        self.active.lock().await.kind
    }

    pub async fn mode(&self) -> ProviderMode {
        self.active.lock().await.provider.mode()
    }

    /// Last-known public URL, or `None` if nothing has been recorded.
    pub async fn public_url(&self) -> Result<Option<String>, DatabaseError> {
        let url = self.db.config_value(keys::TUNNEL_URL).await?;
        Ok((!url.is_empty()).then_some(url))
    }

    /// Stop the active provider and every task spawned for it.
    pub async fn shutdown(&self) {
        self.active.lock().await.retire().await;
        self.root.cancel();
        debug!("Tunnel orchestrator shut down");
    }
}

/// Mirror URL events into `tunnel_url` until the stream closes or `cancel`
/// fires. A cancelled forwarder never writes.
fn spawn_forwarder(
    db: Database,
    mut events: UrlEvents,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let next = tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                next = events.recv() => next,
            };
            let Some(url) = next else { break };
            if cancel.is_cancelled() {
                break;
            }
            record_url(&db, &url).await;
        }
    })
}

async fn record_url(db: &Database, url: &str) {
    match db.set_config(keys::TUNNEL_URL, url).await {
        Ok(()) => info!(url = %url, "Tunnel public URL"),
        Err(e) => warn!(error = %e, url = %url, "Failed to record tunnel URL"),
    }
}

#[cfg(test)]
#[path = "orchestrator_tests.rs"]
mod tests;
