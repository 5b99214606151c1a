//! Public reachability for the gateway.
//!
//! A supervised `cloudflared` process exposes the local HTTP server, either
//! as an ephemeral quick tunnel or as a permanent named tunnel claimed from
//! the registration service. The orchestrator owns whichever is active and
//! hot-swaps quick to named without a restart.

pub mod config;
pub mod error;
pub mod heartbeat;
pub mod named;
pub mod noop;
pub mod orchestrator;
pub mod provider;
pub mod quick;
pub mod registration;
pub mod supervisor;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use config::{BackoffPolicy, TunnelConfig};
pub use error::TunnelError;
pub use orchestrator::{TunnelKind, TunnelOrchestrator};
pub use provider::{ProviderMode, TunnelProvider, UrlEvents};
pub use registration::{ClaimOutcome, RegistrationClient, RegistrationError};
