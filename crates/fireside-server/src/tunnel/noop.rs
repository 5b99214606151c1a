//! Disabled connectivity: the operator exposes the server themselves.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::error::TunnelError;
use super::provider::{ProviderMode, TunnelProvider, UrlEvents, url_channel};

/// Provider that never spawns anything and never reports a URL.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopTunnel;

#[async_trait]
impl TunnelProvider for NoopTunnel {
    async fn start(&self, _cancel: &CancellationToken) -> Result<UrlEvents, TunnelError> {
        // Dropping the sender closes the stream immediately.
        let (_tx, rx) = url_channel();
        Ok(rx)
    }

    fn stop(&self) {}

    fn mode(&self) -> ProviderMode {
        ProviderMode::Manual
    }
}
