//! Tunnel subsystem error types.

use crate::storage::DatabaseError;

/// Errors returned synchronously from provider start-up and hot-swaps.
///
/// Process crashes after a successful start never surface here; the
/// supervisor absorbs and retries them.
#[derive(Debug, thiserror::Error)]
pub enum TunnelError {
    #[error("{binary} not found in PATH")]
    BinaryNotFound { binary: String },

    #[error("named tunnel not configured")]
    NotConfigured,

    #[error("Failed to spawn tunnel process: {0}")]
    Spawn(String),

    #[error("tunnel process exited: {0}")]
    Exited(String),

    #[error("Config store error: {0}")]
    Store(#[from] DatabaseError),
}

impl TunnelError {
    /// Configuration-class errors are the only ones boot logic degrades on.
    pub const fn is_configuration(&self) -> bool {
        matches!(self, Self::BinaryNotFound { .. } | Self::NotConfigured)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configuration_class() {
        assert!(
            TunnelError::BinaryNotFound {
                binary: "cloudflared".into()
            }
            .is_configuration()
        );
        assert!(TunnelError::NotConfigured.is_configuration());
        assert!(!TunnelError::Exited("exit status: 1".into()).is_configuration());
    }

    #[test]
    fn binary_not_found_message_names_binary() {
        let err = TunnelError::BinaryNotFound {
            binary: "cloudflared".into(),
        };
        assert_eq!(err.to_string(), "cloudflared not found in PATH");
    }
}
