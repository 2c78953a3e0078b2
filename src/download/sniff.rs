//! Content-type sniffing over a streamed response body.
//!
//! [`sniff`] pulls chunks from a byte stream until it has seen
//! [`SNIFF_LEN`] bytes (or the stream ends), detects an extension from those
//! leading bytes, and hands back a stream that yields the held chunks followed
//! by the untouched remainder. Every byte of the body is produced exactly
//! once and only the leading chunks are ever buffered.

use futures_util::stream::{self, Chain, Iter, Stream, StreamExt};

/// Number of leading bytes inspected for detection.
pub const SNIFF_LEN: usize = 3072;

/// Body stream replaying the held chunks before the rest of the source.
pub type Replay<S, B, E> = Chain<Iter<std::vec::IntoIter<Result<B, E>>>, S>;

/// Outcome of sniffing a body stream.
pub struct Sniffed<S, B, E> {
    /// Detected extension including the leading dot, empty when unknown.
    pub extension: &'static str,
    /// The complete body, starting from its first byte.
    pub body: Replay<S, B, E>,
}

/// Sniffs the extension of a body stream.
///
/// # Errors
///
/// Returns the first stream error encountered while reading the leading
/// chunks. Nothing is replayed in that case.
pub async fn sniff<S, B, E>(mut source: S) -> Result<Sniffed<S, B, E>, E>
where
    S: Stream<Item = Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
{
    let mut head = Vec::with_capacity(SNIFF_LEN);
    let mut held = Vec::new();

    while head.len() < SNIFF_LEN {
        let Some(chunk) = source.next().await else {
            break;
        };
        let chunk = chunk?;
        let bytes = chunk.as_ref();
        let take = bytes.len().min(SNIFF_LEN - head.len());
        head.extend_from_slice(&bytes[..take]);
        held.push(Ok(chunk));
    }

    Ok(Sniffed {
        extension: detect_extension(&head),
        body: stream::iter(held).chain(source),
    })
}

/// Leading-byte signatures, checked in order.
const SIGNATURES: &[(&[u8], &str)] = &[
    (b"\x89PNG\r\n\x1a\n", ".png"),
    (b"\xff\xd8\xff", ".jpg"),
    (b"GIF87a", ".gif"),
    (b"GIF89a", ".gif"),
    (b"%PDF-", ".pdf"),
    (b"ID3", ".mp3"),
    (b"OggS", ".ogg"),
    (b"fLaC", ".flac"),
    (b"\x1a\x45\xdf\xa3", ".webm"),
    (b"UnityFS", ".unity3d"),
    (b"UnityWeb", ".unity3d"),
    (b"UnityRaw", ".unity3d"),
    (b"PK\x03\x04", ".zip"),
    (b"\x1f\x8b", ".gz"),
    (b"II*\x00", ".tiff"),
    (b"MM\x00*", ".tiff"),
    (b"\x00\x00\x01\x00", ".ico"),
    (b"BM", ".bmp"),
];

/// Maps the leading bytes of a body to a file extension.
///
/// Returns `""` for binary content that matches no known signature. An empty
/// body counts as text.
#[must_use]
pub fn detect_extension(head: &[u8]) -> &'static str {
    if let Some(extension) = riff_extension(head).or_else(|| ftyp_extension(head)) {
        return extension;
    }

    if let Some((_, extension)) = SIGNATURES
        .iter()
        .find(|(signature, _)| head.starts_with(signature))
    {
        return *extension;
    }

    // MPEG audio frame sync without an ID3 tag.
    if head.len() >= 2 && head[0] == 0xff && head[1] & 0xe0 == 0xe0 {
        return ".mp3";
    }

    if let Some(extension) = markup_extension(head) {
        return extension;
    }

    if is_text(head) { ".txt" } else { "" }
}

fn riff_extension(head: &[u8]) -> Option<&'static str> {
    if head.len() < 12 || &head[..4] != b"RIFF" {
        return None;
    }
    match &head[8..12] {
        b"WEBP" => Some(".webp"),
        b"WAVE" => Some(".wav"),
        _ => None,
    }
}

fn ftyp_extension(head: &[u8]) -> Option<&'static str> {
    if head.len() < 12 || &head[4..8] != b"ftyp" {
        return None;
    }
    match &head[8..12] {
        b"M4A " | b"M4B " => Some(".m4a"),
        _ => Some(".mp4"),
    }
}

fn markup_extension(head: &[u8]) -> Option<&'static str> {
    let text = head.strip_prefix(b"\xef\xbb\xbf").unwrap_or(head);
    let start = text.iter().position(|b| !b.is_ascii_whitespace())?;
    let text = &text[start..];
    let prefix: Vec<u8> = text.iter().take(14).map(u8::to_ascii_lowercase).collect();

    if prefix.starts_with(b"<?xml") {
        Some(".xml")
    } else if prefix.starts_with(b"<!doctype html")
        || prefix.starts_with(b"<html")
        || prefix.starts_with(b"<head")
        || prefix.starts_with(b"<body")
    {
        Some(".html")
    } else {
        None
    }
}

fn is_text(head: &[u8]) -> bool {
    let valid = match std::str::from_utf8(head) {
        Ok(_) => true,
        // A multi-byte character cut off at the end of the sniff window.
        Err(err) => err.error_len().is_none(),
    };
    valid
        && !head
            .iter()
            .any(|&b| b < 0x20 && !matches!(b, b'\t' | b'\n' | b'\r' | 0x0c | 0x1b))
}
