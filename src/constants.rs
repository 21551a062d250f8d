use std::time::Duration;

pub mod timing {
    use super::*;
    pub const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(50);
    pub const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(200);
    pub const SESSION_READ_TIMEOUT: Duration = Duration::from_millis(250);
    pub const PROBE_RETRY_INTERVAL: Duration = Duration::from_millis(100);
}

pub mod limits {
    pub const SESSION_READ_BUFFER: usize = 4096;
}

pub mod events {
    pub const ENVIRONMENT_READY: &str = "environment-ready";
    pub const LATE_STARTUP_COMPLETE: &str = "late-startup-complete";
    pub const APPLICATION_QUITTING: &str = "application-quitting";
}

pub const DEFAULT_PORT: u16 = 24242;
pub const DEFAULT_BIND_HOST: &str = "127.0.0.1";

/// Host-style command-line flag carrying the bridge port.
pub const PORT_FLAG: &str = "jsbridge";
