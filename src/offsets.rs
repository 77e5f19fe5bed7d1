//! Conversions between (line, column) positions and flat byte offsets.
//!
//! Columns are counted in UTF-16 code units, the same way an editor reports
//! them. Lines are separated by `\n` only; a `\r` before it is line content.

use crate::vault::{Position, TextRange};

/// Byte offset inside `line` for a UTF-16 column.
///
/// Returns `None` when the column is past the end of the line or falls in the
/// middle of a surrogate pair.
pub fn utf16_col_to_byte(line: &str, col: u32) -> Option<usize> {
    let col = col as usize;
    let mut units = 0;
    for (byte, ch) in line.char_indices() {
        if units == col {
            return Some(byte);
        }
        units += ch.len_utf16();
        if units > col {
            return None;
        }
    }
    (units == col).then_some(line.len())
}

/// Flat byte offset of `pos` in `text`, or `None` when out of bounds.
pub fn position_to_offset(text: &str, pos: Position) -> Option<usize> {
    let mut line_start = 0;
    for (i, line) in text.split('\n').enumerate() {
        if i == pos.line as usize {
            return utf16_col_to_byte(line, pos.character).map(|byte| line_start + byte);
        }
        line_start += line.len() + 1;
    }
    None
}

/// Byte range of `range` in `text`. Both ends must be valid and ordered.
pub fn range_to_offsets(text: &str, range: &TextRange) -> Option<std::ops::Range<usize>> {
    let start = position_to_offset(text, range.start)?;
    let end = position_to_offset(text, range.end)?;
    (start <= end).then_some(start..end)
}

/// The text covered by `range`, or `None` if the range does not fit the text.
pub fn extract_range<'a>(text: &'a str, range: &TextRange) -> Option<&'a str> {
    range_to_offsets(text, range).map(|offsets| &text[offsets])
}
