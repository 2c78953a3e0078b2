//! Constants for the download module (timeouts, concurrency, sign-in hosts).

/// Default HTTP connect timeout (30 seconds).
pub const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default HTTP read timeout (5 minutes for large bundles).
pub const READ_TIMEOUT_SECS: u64 = 300;

/// Default number of simultaneous fetches.
pub const DEFAULT_CONCURRENCY: usize = 3;

/// Minimum allowed concurrency value.
pub const MIN_CONCURRENCY: usize = 1;

/// Maximum allowed concurrency value.
pub const MAX_CONCURRENCY: usize = 32;

/// Hosts that serve a sign-in page instead of the requested file.
pub const SIGN_IN_HOSTS: &[&str] = &["accounts.google.com"];
