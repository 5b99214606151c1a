//! Records persisted in the `server_config` key-value table.

use serde::{Deserialize, Serialize};

/// Well-known `server_config` keys.
pub mod keys {
    /// Named-tunnel secret credential.
    pub const TUNNEL_TOKEN: &str = "tunnel_token";
    /// Claimed permanent hostname, without scheme.
    pub const TUNNEL_SUBDOMAIN: &str = "tunnel_subdomain";
    /// Last-known public URL of whichever provider is active.
    pub const TUNNEL_URL: &str = "tunnel_url";
    /// Random per-installation identifier sent to the registration service.
    pub const INSTANCE_ID: &str = "instance_id";
    pub const SERVER_NAME: &str = "server_name";
    pub const SERVER_PAUSED: &str = "server_paused";
}

/// Long-lived credentials for a claimed named tunnel.
///
/// Field names match the registration service's claim response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TunnelCredentials {
    #[serde(rename = "tunnel_token")]
    pub token: String,
    pub subdomain: String,
}

impl TunnelCredentials {
    /// Both parts must be present for the named tunnel to run.
    pub fn is_complete(&self) -> bool {
        !self.token.is_empty() && !self.subdomain.is_empty()
    }

    /// The permanent public URL, e.g. `https://alice.fireside.run`.
    pub fn public_url(&self) -> String {
        format!("https://{}", self.subdomain)
    }

    /// The claimed name: the first label of the subdomain.
    pub fn name(&self) -> &str {
        self.subdomain.split('.').next().unwrap_or_default()
    }
}
