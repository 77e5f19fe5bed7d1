//! An editable text buffer addressed in (line, UTF-16 column) positions.

use ropey::Rope;

use crate::vault::{Position, TextRange};

#[derive(Debug, Clone, Default)]
pub struct EditorBuffer {
    rope: Rope,
    cursor: Position,
}

impl EditorBuffer {
    pub fn new(text: &str) -> EditorBuffer {
        EditorBuffer {
            rope: Rope::from_str(text),
            cursor: Position::default(),
        }
    }

    pub fn text(&self) -> String {
        self.rope.to_string()
    }

    pub fn line_count(&self) -> usize {
        self.rope.len_lines()
    }

    /// Line `line` without its line break.
    pub fn get_line(&self, line: u32) -> Option<String> {
        let slice = self.rope.get_line(line as usize)?;
        let mut text = slice.to_string();
        if text.ends_with('\n') {
            text.pop();
        }
        Some(text)
    }

    fn char_index(&self, pos: Position) -> Option<usize> {
        let line = self.rope.get_line(pos.line as usize)?;
        let content_chars = match line.chars().last() {
            Some('\n') => line.len_chars() - 1,
            _ => line.len_chars(),
        };
        let content_units = line.char_to_utf16_cu(content_chars);

        let col = pos.character as usize;
        if col > content_units {
            return None;
        }
        let in_line = line.utf16_cu_to_char(col);
        // a column in the middle of a surrogate pair rounds down; reject it
        if line.char_to_utf16_cu(in_line) != col {
            return None;
        }
        Some(self.rope.line_to_char(pos.line as usize) + in_line)
    }

    fn char_range(&self, range: &TextRange) -> Option<std::ops::Range<usize>> {
        let start = self.char_index(range.start)?;
        let end = self.char_index(range.end)?;
        (start <= end).then_some(start..end)
    }

    pub fn get_range(&self, range: &TextRange) -> Option<String> {
        let chars = self.char_range(range)?;
        Some(self.rope.slice(chars).to_string())
    }

    /// Replaces `range` with `text`. Returns false, leaving the buffer
    /// untouched, when the range is not inside the buffer.
    pub fn replace_range(&mut self, range: &TextRange, text: &str) -> bool {
        let Some(chars) = self.char_range(range) else {
            return false;
        };
        self.rope.remove(chars.clone());
        self.rope.insert(chars.start, text);
        true
    }

    pub fn insert(&mut self, pos: Position, text: &str) -> bool {
        self.replace_range(&TextRange::new(pos, pos), text)
    }

    pub fn get_cursor(&self) -> Position {
        self.cursor
    }

    pub fn set_cursor(&mut self, pos: Position) {
        self.cursor = pos;
    }
}
