//! Core types for vault data structures.
//!
//! This module contains the types shared between the link cache and the
//! normalizer:
//! - `Position` / `TextRange`: (line, UTF-16 column) coordinates
//! - `LinkOccurrence`: one cached wikilink in a document
//! - `Document`: a document's identity

use std::ops::Range;
use std::path::{Path, PathBuf};

use ropey::Rope;
use serde::{Deserialize, Serialize};

/// A (line, column) position. `character` counts UTF-16 code units.
#[derive(Debug, Default, PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Hash, Serialize, Deserialize)]
pub struct Position {
    pub line: u32,
    pub character: u32,
}

impl Position {
    pub fn new(line: u32, character: u32) -> Position {
        Position { line, character }
    }
}

/// A half-open `[start, end)` span of a document.
#[derive(Debug, Default, PartialEq, Eq, Clone, Copy, Hash, Serialize, Deserialize)]
pub struct TextRange {
    pub start: Position,
    pub end: Position,
}

impl TextRange {
    pub fn new(start: Position, end: Position) -> TextRange {
        TextRange { start, end }
    }

    /// Creates a `TextRange` from a byte offset range using rope for position calculation.
    pub fn from_byte_range(rope: &Rope, range: Range<usize>) -> TextRange {
        let to_position = |byte: usize| {
            let char_idx = rope.byte_to_char(byte);
            let line = rope.char_to_line(char_idx);
            let line_start = rope.line_to_char(line);
            let character =
                rope.char_to_utf16_cu(char_idx) - rope.char_to_utf16_cu(line_start);
            Position::new(line as u32, character as u32)
        };

        TextRange {
            start: to_position(range.start),
            end: to_position(range.end),
        }
    }
}

/// A wikilink as recorded by the link cache.
#[derive(Debug, PartialEq, Eq, Clone, Hash)]
pub struct LinkOccurrence {
    /// The link target, i.e. the text before the first `|`.
    pub target: String,
    /// The full `[[...]]` text at the time the cache was built.
    pub raw_text: String,
    pub range: TextRange,
}

/// A document in the vault.
#[derive(Debug, PartialEq, Eq, Clone, Hash, PartialOrd, Ord)]
pub struct Document {
    pub path: PathBuf,
    /// File name without directory or extension; the wikilink namespace.
    pub basename: String,
}

impl Document {
    pub fn new(path: impl Into<PathBuf>) -> Document {
        let path = path.into();
        let basename = basename(&path);
        Document { path, basename }
    }
}

pub fn basename(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default()
}
