/// Configuration default values
///
/// This module contains all the default values for configuration options,
/// making them easily changeable in one central location.
use std::time::Duration;

// Job engine defaults
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(30);
pub const DEFAULT_SHUTDOWN_POLL: Duration = Duration::from_millis(100);

// Source selector defaults
pub const DEFAULT_RACE_WIDTH: usize = 5;
pub const DEFAULT_TIE_WINDOW: f64 = 200.0;
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(30);
pub const DEFAULT_CACHE_CAPACITY: usize = 1000;
pub const DEFAULT_ERROR_WINDOW: Duration = Duration::from_secs(60);
pub const DEFAULT_SELECTION_WINDOW: Duration = Duration::from_secs(60);

// Health tracker defaults
pub const DEFAULT_HEALTH_RETENTION: Duration = Duration::from_secs(5 * 60);
pub const DEFAULT_HEALTH_SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);

// URL prober defaults
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_millis(7_500);
pub const DEFAULT_MAX_REDIRECTS: usize = 3;
pub const DEFAULT_MAX_BODY_BYTES: usize = 100;
pub const DEFAULT_USER_AGENT: &str = concat!("iptv-arbiter/", env!("CARGO_PKG_VERSION"));

// Provider defaults
pub const DEFAULT_DISABLE_ON_AUTH_FAILURE: bool = false;
pub const DEFAULT_PROVIDER_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_DETAILS_BATCH_SIZE: usize = 50;

// Logging defaults
pub const DEFAULT_LOG_LEVEL: &str = "info";

// Cooperative cancellation checkpoint spacing inside long loops
pub const CANCELLATION_CHECK_EVERY: usize = 100;
