//! Shared test helpers for the tunnel test modules.

use std::path::{Path, PathBuf};
use std::time::Duration;

use super::config::{BackoffPolicy, TunnelConfig};

/// Millisecond-scale backoff so respawn tests finish quickly.
pub const fn fast_backoff() -> BackoffPolicy {
    BackoffPolicy {
        floor: Duration::from_millis(10),
        ceiling: Duration::from_millis(40),
    }
}

/// Tunnel config pointing at `binary` with test-friendly timings.
pub fn test_config(binary: &Path) -> TunnelConfig {
    TunnelConfig {
        backoff: fast_backoff(),
        first_url_timeout: Duration::from_secs(5),
        ..TunnelConfig::new(binary.to_string_lossy(), 7654)
    }
}

/// Write an executable `/bin/sh` script standing in for the tunnel binary.
#[cfg(unix)]
pub fn fake_binary(dir: &Path, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join("fake-cloudflared");
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// Whether a process with `pid` is still alive (Linux only).
#[cfg(target_os = "linux")]
pub fn process_alive(pid: u32) -> bool {
    let Ok(status) = std::fs::read_to_string(format!("/proc/{pid}/status")) else {
        return false;
    };
    // Zombies have exited; they just haven't been reaped yet.
    !status
        .lines()
        .any(|l| l.starts_with("State:") && l.contains('Z'))
}

/// Poll `pidfile` until the fake binary has written its PID.
pub async fn wait_for_pid(pidfile: &Path) -> u32 {
    for _ in 0..200 {
        if let Ok(text) = std::fs::read_to_string(pidfile) {
            if let Ok(pid) = text.trim().parse() {
                return pid;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("fake tunnel never wrote {}", pidfile.display());
}
