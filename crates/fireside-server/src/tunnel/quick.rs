//! Quick tunnel: an anonymous `trycloudflare.com` URL that changes on every
//! process restart.

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::config::TunnelConfig;
use super::error::TunnelError;
use super::provider::{ProviderMode, TunnelProvider, UrlEvents, url_channel};
use super::supervisor::{Invocation, OutputMode, Supervisor, resolve_binary};

/// Pre-compiled matcher for the URL cloudflared prints once the tunnel is up.
#[allow(clippy::expect_used)]
static QUICK_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"https://[a-z0-9-]+\.trycloudflare\.com").expect("static regex is valid")
});

/// First quick-tunnel URL appearing anywhere in `line`.
pub fn extract_quick_url(line: &str) -> Option<String> {
    QUICK_URL.find(line).map(|m| m.as_str().to_string())
}

/// Supervises `cloudflared tunnel --url http://localhost:<port>`.
pub struct QuickTunnel {
    binary: String,
    port: u16,
    supervisor: Supervisor,
}

impl QuickTunnel {
    pub fn new(config: &TunnelConfig) -> Self {
        Self {
            binary: config.binary.clone(),
            port: config.port,
            supervisor: Supervisor::new(
                "quick",
                OutputMode::Scan(extract_quick_url),
                config.backoff,
            ),
        }
    }

    /// Whether the supervised process is currently alive.
    pub fn is_running(&self) -> bool {
        self.supervisor.is_running()
    }
}

#[async_trait]
impl TunnelProvider for QuickTunnel {
    async fn start(&self, cancel: &CancellationToken) -> Result<UrlEvents, TunnelError> {
        let program = resolve_binary(&self.binary).ok_or_else(|| TunnelError::BinaryNotFound {
            binary: self.binary.clone(),
        })?;

        let (tx, rx) = url_channel();
        info!(binary = %program.display(), port = self.port, "Starting quick tunnel");
        self.supervisor.launch(
            Invocation {
                program,
                args: vec![
                    "tunnel".into(),
                    "--url".into(),
                    format!("http://localhost:{}", self.port),
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
