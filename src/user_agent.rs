//! Request identity for asset downloads.
//!
//! Asset hosts (Steam's CDN, image hosts, file lockers) reject requests that
//! look like a generic HTTP library, so downloads present as curl and accept
//! any content type.

/// User-Agent sent with every asset request.
pub(crate) const DOWNLOAD_USER_AGENT: &str = "curl/7.84.0";

/// Accept header sent with every asset request.
pub(crate) const ACCEPT_ANY: &str = "*/*";
