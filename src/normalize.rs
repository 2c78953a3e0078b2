//! URL normalization and filename derivation for asset references.
//!
//! Exports reference the same asset through several spellings: bare hosts
//! without a scheme, and a legacy Steam CDN host that now redirects to the
//! Akamai mirror. Every URL is normalized before it is used as a key so the
//! same asset collapses to a single entry.

use std::sync::LazyLock;

use regex::Regex;

/// Legacy Steam CDN prefix still present in older exports.
const LEGACY_CDN_PREFIX: &str = "http://cloud-3.steamusercontent.com";

/// Canonical CDN prefix that replaces [`LEGACY_CDN_PREFIX`].
const CANONICAL_CDN_PREFIX: &str = "https://steamusercontent-a.akamaihd.net";

#[allow(clippy::expect_used)]
static NON_WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\W").expect("static regex is valid"));

/// Normalizes a raw asset URL.
///
/// Returns an empty string for empty input. Otherwise prepends `http://` when
/// the string does not start with `http`, then rewrites the scheme and host
/// when they are the legacy Steam CDN. Only the leading occurrence is
/// rewritten; the legacy host appearing later in the URL (for example in a
/// query string) is left alone.
///
/// Normalizing an already-normalized URL returns it unchanged.
///
/// # Example
///
/// ```
/// use tts_archiver_core::normalize::normalize_url;
///
/// assert_eq!(
///     normalize_url("http://cloud-3.steamusercontent.com/ugc/1/"),
///     "https://steamusercontent-a.akamaihd.net/ugc/1/"
/// );
/// assert_eq!(normalize_url("example.com/a.png"), "http://example.com/a.png");
/// ```
#[must_use]
pub fn normalize_url(raw: &str) -> String {
    if raw.is_empty() {
        return String::new();
    }

    let with_scheme = if raw.starts_with("http") {
        raw.to_string()
    } else {
        format!("http://{raw}")
    };

    match with_scheme.strip_prefix(LEGACY_CDN_PREFIX) {
        Some(rest) if rest.is_empty() || rest.starts_with(['/', '?', '#', ':']) => {
            format!("{CANONICAL_CDN_PREFIX}{rest}")
        }
        _ => with_scheme,
    }
}

/// Derives a filesystem-safe file stem from a normalized URL.
///
/// Every non-word character is stripped. Two distinct URLs can in principle
/// map to the same stem; no collision check is made.
#[must_use]
pub fn filename_from_url(url: &str) -> String {
    NON_WORD.replace_all(url, "").into_owned()
}
