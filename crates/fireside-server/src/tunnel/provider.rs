//! Tunnel provider trait and types.
//!
//! A provider makes the local HTTP server reachable from outside. Every
//! variant (quick, named, noop) exposes exactly the same three operations.

use std::fmt;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::error::TunnelError;

/// Stream of public-URL events. Each event replaces the previous URL.
/// The channel closes when the provider's run loop exits.
pub type UrlEvents = mpsc::Receiver<String>;

/// Sending half held by a provider's run loop.
pub type UrlSender = mpsc::Sender<String>;

/// Capacity of the URL event channel. Senders never block: an event that
/// does not fit is dropped in favour of a later, fresher one.
pub const URL_EVENT_CAPACITY: usize = 1;

/// Create a URL event channel.
pub fn url_channel() -> (UrlSender, UrlEvents) {
    mpsc::channel(URL_EVENT_CAPACITY)
}

/// Whether connectivity is managed by Fireside or by the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderMode {
    Auto,
    Manual,
}

impl ProviderMode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Manual => "manual",
        }
    }
}

impl fmt::Display for ProviderMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Trait implemented by all tunnel providers.
#[async_trait]
pub trait TunnelProvider: Send + Sync {
    /// Start the tunnel in the background and return its URL events.
    ///
    /// Does not wait for the tunnel to come up. Errors only for fast-fail
    /// configuration problems (binary missing, credentials missing).
    /// Cancelling `cancel` stops the run loop and kills the process.
    async fn start(&self, cancel: &CancellationToken) -> Result<UrlEvents, TunnelError>;

    /// Kill the running tunnel process, if any. Idempotent.
    fn stop(&self);

    /// Connectivity mode reported to the admin surface.
    fn mode(&self) -> ProviderMode;
}
