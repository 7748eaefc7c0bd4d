//! Rendering of captured output for clients.

use unicode_general_category::{GeneralCategory, get_general_category};

/// Split raw output into printable lines.
///
/// Control, format and unassigned characters are dropped unless they are
/// whitespace. Surrounding newlines are trimmed and the rest is split on `\n`.
/// Invalid UTF-8 is replaced rather than rejected.
pub fn render_lines(raw: &[u8]) -> Vec<String> {
    let text: String = String::from_utf8_lossy(raw)
        .chars()
        .filter(|&c| c.is_whitespace() || is_printable(c))
        .collect();

    let trimmed = text.trim_matches('\n');
    if trimmed.is_empty() {
        return Vec::new();
    }
    trimmed.split('\n').map(str::to_string).collect()
}

fn is_printable(c: char) -> bool {
    !matches!(
        get_general_category(c),
        GeneralCategory::Control
            | GeneralCategory::Format
            | GeneralCategory::Unassigned
            | GeneralCategory::Surrogate
    )
}
