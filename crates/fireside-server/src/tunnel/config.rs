//! Tunnel configuration and respawn backoff.

use std::time::Duration;

use fireside_core::config::TunnelSettings;

/// Smallest respawn delay a policy built from settings will use.
const MIN_BACKOFF: Duration = Duration::from_millis(1);

/// Smallest heartbeat period; `tokio::time::interval` rejects zero.
const MIN_HEARTBEAT: Duration = Duration::from_secs(1);

/// Configuration for the tunnel subsystem.
#[derive(Debug, Clone)]
pub struct TunnelConfig {
    /// Tunnel binary name (looked up on `PATH`) or explicit path.
    pub binary: String,

    /// Local HTTP port the quick tunnel forwards to.
    pub port: u16,

    /// Force the noop provider regardless of stored credentials.
    pub disabled: bool,

    /// Respawn policy for the supervised process.
    pub backoff: BackoffPolicy,

    /// How long boot waits for the first public URL.
    pub first_url_timeout: Duration,

    /// Registration heartbeat interval for named tunnels.
    pub heartbeat_interval: Duration,
}

impl TunnelConfig {
    /// Create a tunnel config with default timings.
    pub fn new(binary: impl Into<String>, port: u16) -> Self {
        Self {
            binary: binary.into(),
            port,
            disabled: false,
            backoff: BackoffPolicy::default(),
            first_url_timeout: Duration::from_secs(15),
            heartbeat_interval: Duration::from_secs(24 * 60 * 60),
        }
    }

    /// Build from the file/env layer of the gateway configuration.
    ///
    /// Zero timings are raised to a minimum and the ceiling never sits
    /// below the floor, even for settings that skipped validation.
    pub fn from_settings(settings: &TunnelSettings, port: u16) -> Self {
        let floor = settings.backoff_floor().max(MIN_BACKOFF);
        Self {
            binary: settings.binary.clone(),
            port,
            disabled: settings.disabled,
            backoff: BackoffPolicy {
                floor,
                ceiling: settings.backoff_ceiling().max(floor),
            },
            first_url_timeout: settings.first_url_timeout(),
            heartbeat_interval: settings.heartbeat_interval().max(MIN_HEARTBEAT),
        }
    }
}

/// Exponential respawn policy: start at `floor`, double after every wait,
/// never exceed `ceiling`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub floor: Duration,
    pub ceiling: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            floor: Duration::from_secs(2),
            ceiling: Duration::from_secs(60),
        }
    }
}

impl BackoffPolicy {
    /// Fresh schedule for one supervised run loop.
    pub const fn start(self) -> Backoff {
        Backoff {
            policy: self,
            current: self.floor,
        }
    }
}

/// The live backoff state of a run loop.
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: BackoffPolicy,
    current: Duration,
}

impl Backoff {
    /// Return the delay to wait now and advance the schedule.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current.min(self.policy.ceiling);
        self.current = self.current.saturating_mul(2).min(self.policy.ceiling);
        delay
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.floor, Duration::from_secs(2));
        assert_eq!(policy.ceiling, Duration::from_secs(60));
    }

    #[test]
    fn exponential_backoff_delays() {
        let mut backoff = BackoffPolicy::default().start();

        // 2s, 4s, 8s, 16s, 32s, 60s (capped), 60s
        let delays: Vec<u64> = (0..7).map(|_| backoff.next_delay().as_secs()).collect();
        assert_eq!(delays, vec![2, 4, 8, 16, 32, 60, 60]);
    }

    #[test]
    fn delays_non_decreasing_and_bounded() {
        let policy = BackoffPolicy::default();
        let mut backoff = policy.start();
        let mut previous = Duration::ZERO;
        for attempt in 0..200 {
            let delay = backoff.next_delay();
            if attempt == 0 {
                assert_eq!(delay, policy.floor);
            }
            assert!(delay >= previous, "attempt {attempt}: {delay:?} < {previous:?}");
            assert!(delay >= policy.floor);
            assert!(delay <= policy.ceiling);
            previous = delay;
        }
    }

    #[test]
    fn floor_above_ceiling_is_clamped() {
        let mut backoff = BackoffPolicy {
            floor: Duration::from_secs(90),
            ceiling: Duration::from_secs(60),
        }
        .start();
        assert_eq!(backoff.next_delay(), Duration::from_secs(60));
        assert_eq!(backoff.next_delay(), Duration::from_secs(60));
    }

    #[test]
    fn tunnel_config_from_settings() {
        let settings = TunnelSettings {
            binary: "/opt/cloudflared".into(),
            disabled: true,
            backoff_floor_ms: 10,
            backoff_ceiling_ms: 40,
            ..TunnelSettings::default()
        };
        let config = TunnelConfig::from_settings(&settings, 8080);
        assert_eq!(config.binary, "/opt/cloudflared");
        assert_eq!(config.port, 8080);
        assert!(config.disabled);
        assert_eq!(config.backoff.floor, Duration::from_millis(10));
        assert_eq!(config.backoff.ceiling, Duration::from_millis(40));
        assert_eq!(config.first_url_timeout, Duration::from_secs(15));
    }

    #[test]
    fn zero_floor_from_settings_still_backs_off() {
        let settings = TunnelSettings {
            backoff_floor_ms: 0,
            backoff_ceiling_ms: 0,
            ..TunnelSettings::default()
        };
        let config = TunnelConfig::from_settings(&settings, 8080);
        assert_eq!(config.backoff.floor, MIN_BACKOFF);
        assert_eq!(config.backoff.ceiling, MIN_BACKOFF);

        let mut backoff = config.backoff.start();
        for _ in 0..4 {
            assert!(backoff.next_delay() >= MIN_BACKOFF);
        }
    }

    #[test]
    fn ceiling_below_floor_from_settings_is_raised() {
        let settings = TunnelSettings {
            backoff_floor_ms: 5_000,
            backoff_ceiling_ms: 1_000,
            ..TunnelSettings::default()
        };
        let mut backoff = TunnelConfig::from_settings(&settings, 8080).backoff.start();
        assert_eq!(backoff.next_delay(), Duration::from_secs(5));
        assert_eq!(backoff.next_delay(), Duration::from_secs(5));
    }

    #[test]
    fn zero_heartbeat_interval_from_settings_is_raised() {
        let settings = TunnelSettings {
            heartbeat_interval_secs: 0,
            ..TunnelSettings::default()
        };
        let config = TunnelConfig::from_settings(&settings, 8080);
        assert_eq!(config.heartbeat_interval, MIN_HEARTBEAT);
    }
}
