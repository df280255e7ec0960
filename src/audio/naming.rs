// Capture file naming
//
// Files are named <UTC timestamp>_<label>_<short id>.wav so the capture root
// needs no separate index. Mixed audio uses the call id instead of a speaker id.

use chrono::{DateTime, Utc};

/// Source id used for the combined (pre-mixed) stream of a call
pub const MIXED_SOURCE_ID: &str = "mixed";

/// Label substituted when sanitizing leaves nothing usable
pub const UNKNOWN_LABEL: &str = "unknown";

/// Number of identifier characters kept in a file name
pub const SHORT_ID_LEN: usize = 8;

const INVALID_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Replace every filesystem-invalid character with `_`; blank results become "unknown"
pub fn sanitize_label(label: &str) -> String {
    let sanitized: String = label
        .trim()
        .chars()
        .map(|c| {
            if c.is_control() || INVALID_CHARS.contains(&c) {
                '_'
            } else {
                c
            }
        })
        .collect();

    if sanitized.trim().is_empty() {
        UNKNOWN_LABEL.to_string()
    } else {
        sanitized
    }
}

/// Sanitized identifier truncated to `SHORT_ID_LEN` characters
pub fn short_id(id: &str) -> String {
    sanitize_label(id).chars().take(SHORT_ID_LEN).collect()
}

/// Base file name for a capture source
pub fn capture_file_name(
    started_at: DateTime<Utc>,
    call_id: &str,
    source_id: &str,
    display_label: &str,
) -> String {
    let timestamp = started_at.format("%Y%m%dT%H%M%SZ");

    if source_id == MIXED_SOURCE_ID {
        format!("{}_{}_{}.wav", timestamp, MIXED_SOURCE_ID, short_id(call_id))
    } else {
        format!(
            "{}_{}_{}.wav",
            timestamp,
            sanitize_label(display_label),
            short_id(source_id)
        )
    }
}

/// `name.wav` → `name_<n>.wav`, used when the base name is already taken
pub fn with_suffix(file_name: &str, n: usize) -> String {
    match file_name.strip_suffix(".wav") {
        Some(stem) => format!("{}_{}.wav", stem, n),
        None => format!("{}_{}", file_name, n),
    }
}
