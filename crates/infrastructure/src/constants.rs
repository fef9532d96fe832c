use std::time::Duration;

// ── Monitor defaults ───────────────────────────────────────────────

/// Sliding-window horizon when the config leaves `monitor.window` unset.
pub const DEFAULT_WINDOW_SECS: u64 = 30;

/// Idle-peer eviction horizon when `monitor.timeout` is unset (24 h).
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 86_400;

/// Read timeout on the capture handle; bounds shutdown latency of the
/// capture thread.
pub const CAPTURE_READ_TIMEOUT: Duration = Duration::from_millis(500);

// ── Firewall defaults ──────────────────────────────────────────────

pub const DEFAULT_CHAIN: &str = "NETWARDEN";

// ── Web defaults ───────────────────────────────────────────────────

pub const DEFAULT_LISTEN: &str = "0.0.0.0:8080";
pub const DEFAULT_ASSETS_DIR: &str = "web";

/// Hard cap on an import download body. Prevents OOM from hostile or
/// misconfigured sources.
pub const MAX_IMPORT_BODY_BYTES: usize = 100 * 1024 * 1024;

// ── Storage defaults ───────────────────────────────────────────────

pub const DEFAULT_DATABASE_PATH: &str = "netwarden.redb";

/// Upper bound on rows per batch-insert transaction.
pub const BATCH_INSERT_CHUNK: usize = 1_000;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        assert!(DEFAULT_WINDOW_SECS > 0);
        assert!(DEFAULT_IDLE_TIMEOUT_SECS >= DEFAULT_WINDOW_SECS);
        assert!(BATCH_INSERT_CHUNK > 0);
        assert!(MAX_IMPORT_BODY_BYTES >= 1024 * 1024);
    }

    #[test]
    fn capture_timeout_is_subsecond() {
        assert!(CAPTURE_READ_TIMEOUT < Duration::from_secs(1));
    }
}
