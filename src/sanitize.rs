/// Default leading character of platform address tokens
pub const ADDRESS_MARKER: char = '@';

/// Strip address tokens (`@handle`) from inbound text
pub fn sanitize(raw_text: &str) -> String {
    sanitize_with_marker(raw_text, ADDRESS_MARKER)
}

/// Drop every whitespace-separated token starting with `marker` and
/// rejoin the rest with single spaces. An empty result is returned as-is.
pub fn sanitize_with_marker(raw_text: &str, marker: char) -> String {
    raw_text
        .split_whitespace()
        .filter(|word| !word.starts_with(marker))
        .collect::<Vec<_>>()
        .join(" ")
}
