//! Time utilities

use std::sync::OnceLock;
use std::time::Instant;

static SERVER_START: OnceLock<Instant> = OnceLock::new();

/// Mark the process start. Later calls are no-ops.
pub fn init_server_time() {
    SERVER_START.get_or_init(Instant::now);
}

/// Seconds since `init_server_time`, zero before it
pub fn uptime_secs() -> u64 {
    SERVER_START.get().map_or(0, |start| start.elapsed().as_secs())
}
