//! Inserts display text when `|` is typed at the end of a wikilink.
//!
//! With the caret right before the `]]` of `[[Target]]`, typing `|` produces
//! `[[Target|target]]` and leaves the caret after the pipe, so the display
//! text can be typed over.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::{config::Settings, editor::EditorBuffer, offsets, vault::Position};

/// The key that triggers insertion.
pub const TRIGGER_KEY: char = '|';

/// A complete link on a single line, in byte offsets of that line.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct LineLink {
    pub start: usize,
    /// One past the closing `]]`.
    pub end: usize,
    pub link_text: String,
}

/// Finds the `[[...]]` surrounding `cursor` (a byte offset in `line`).
///
/// The link must contain no brackets and no pipe.
pub fn find_wikilink_at_cursor(line: &str, cursor: usize) -> Option<LineLink> {
    static PLAIN_LINK_RE: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"^\[\[[^\[\]|]+\]\]$").expect("Plain link regex"));

    let search_end = (cursor + 2).min(line.len());
    let start = line.get(..search_end)?.rfind("[[")?;
    let end = cursor + line.get(cursor..)?.find("]]")? + 2;

    let content = &line[start..end];
    if !PLAIN_LINK_RE.is_match(content) {
        return None;
    }

    Some(LineLink {
        start,
        end,
        link_text: content[2..content.len() - 2].to_string(),
    })
}

fn display_text(link_text: &str, lowercase_first_char: bool) -> String {
    let mut chars = link_text.chars();
    match chars.next() {
        Some(first) if lowercase_first_char => first.to_lowercase().chain(chars).collect(),
        _ => link_text.to_string(),
    }
}

/// Handles a `|` keypress. Returns true when the display text was
/// inserted and the default insertion of the key must be cancelled.
pub fn handle_pipe_key(buffer: &mut EditorBuffer, settings: &Settings) -> bool {
    let cursor = buffer.get_cursor();
    let Some(line) = buffer.get_line(cursor.line) else {
        return false;
    };
    let Some(cursor_byte) = offsets::utf16_col_to_byte(&line, cursor.character) else {
        return false;
    };

    let Some(link) = find_wikilink_at_cursor(&line, cursor_byte) else {
        return false;
    };
    if cursor_byte != link.end - 2 {
        return false;
    }

    let inserted = format!(
        "|{}",
        display_text(&link.link_text, settings.lowercase_first_char)
    );
    if !buffer.insert(cursor, &inserted) {
        return false;
    }
    buffer.set_cursor(Position::new(cursor.line, cursor.character + 1));
    true
}
