//! Text preparation for cloud TTS: normalization and request-sized chunking.
//!
//! Pure functions, no I/O. The cloud endpoint rejects long inputs, so text is
//! cut into pieces of at most [`CLOUD_TTS_MAX_CHUNK_LEN`] bytes and fetched
//! one request per piece.

use regex::Regex;
use std::sync::LazyLock;

static RE_END_OF_LINE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"-\r?\n").unwrap());
static RE_WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Longest input the cloud TTS endpoint accepts in one request.
pub const CLOUD_TTS_MAX_CHUNK_LEN: usize = 100;

/// Join words hyphenated across line breaks and collapse whitespace.
pub fn normalize_for_speech(text: &str) -> String {
    let joined = RE_END_OF_LINE.replace_all(text, "");
    RE_WHITESPACE.replace_all(&joined, " ").trim().to_string()
}

/// Split text into chunks of at most `max_len` bytes.
///
/// Prefers sentence boundaries (`. `, `! `, `? `) in the back half of the
/// window, then word boundaries, then hard-splits on a char boundary.
/// Empty input yields no chunks.
pub fn split_text(text: &str, max_len: usize) -> Vec<String> {
    let max_len = max_len.max(1);
    let text = text.trim();
    if text.is_empty() {
        return Vec::new();
    }
    if text.len() <= max_len {
        return vec![text.to_string()];
    }

    let mut result = Vec::new();
    let mut remaining = text;

    while remaining.len() > max_len {
        let window = &remaining[..floor_char_boundary(remaining, max_len)];

        let split_at = if window.is_empty() {
            // A single char wider than max_len; emit it alone.
            remaining.chars().next().map_or(remaining.len(), char::len_utf8)
        } else {
            sentence_boundary(window, max_len)
                .or_else(|| word_boundary(window, max_len))
                .unwrap_or(window.len())
        };

        let chunk = remaining[..split_at].trim_end();
        if !chunk.is_empty() {
            result.push(chunk.to_string());
        }
        remaining = remaining[split_at..].trim_start();
    }

    if !remaining.is_empty() {
        result.push(remaining.to_string());
    }

    result
}

/// Largest char boundary in `s` that is `<= index`.
fn floor_char_boundary(s: &str, index: usize) -> usize {
    if index >= s.len() {
        return s.len();
    }
    let mut i = index;
    while !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

/// Position of the space after the last sentence-ending punctuation mark.
fn sentence_boundary(window: &str, max_len: usize) -> Option<usize> {
    let bytes = window.as_bytes();
    (1..bytes.len())
        .rev()
        .find(|&i| bytes[i] == b' ' && matches!(bytes[i - 1], b'.' | b'!' | b'?'))
        .filter(|&i| i >= max_len / 2)
}

fn word_boundary(window: &str, max_len: usize) -> Option<usize> {
    window.rfind(' ').filter(|&pos| pos > 0 && pos >= max_len / 3)
}
