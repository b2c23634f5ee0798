//! Length enforcement for outbound messages.
//!
//! Lengths are counted in Unicode scalar values so truncation never splits a
//! character.

/// Marker appended to truncated replies
pub const ELLIPSIS: &str = "...";

/// Fit `text` into `limit` characters.
///
/// Text that already fits is returned unchanged. Longer text is cut to
/// `limit - 3` characters and suffixed with [`ELLIPSIS`], giving exactly
/// `limit` characters. Limits too small to hold the marker hard-cut instead.
pub fn format_reply(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }

    let marker_len = ELLIPSIS.chars().count();
    if limit <= marker_len {
        return text.chars().take(limit).collect();
    }

    let mut out: String = text.chars().take(limit - marker_len).collect();
    out.push_str(ELLIPSIS);
    out
}
