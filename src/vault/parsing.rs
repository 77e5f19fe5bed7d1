//! Wikilink extraction for the link cache.

use std::ops::Range;

use itertools::Itertools;
use once_cell::sync::Lazy;
use regex::Regex;
use ropey::Rope;

use super::types::{LinkOccurrence, TextRange};

/// A fenced code block, as a byte range of the document.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct MDCodeBlock {
    pub range: Range<usize>,
}

impl MDCodeBlock {
    /// Fenced blocks opened by ``` or ~~~. An unclosed fence runs to the end of the text.
    pub fn new(text: &str) -> Vec<MDCodeBlock> {
        let mut blocks = Vec::new();
        let mut open: Option<(usize, &str)> = None;
        let mut line_start = 0;

        for line in text.split_inclusive('\n') {
            let trimmed = line.trim_start();
            let fence = ["```", "~~~"]
                .into_iter()
                .find(|fence| trimmed.starts_with(fence));

            match (open, fence) {
                (None, Some(fence)) => open = Some((line_start, fence)),
                (Some((start, opened)), Some(fence)) if fence == opened => {
                    blocks.push(MDCodeBlock {
                        range: start..line_start + line.len(),
                    });
                    open = None;
                }
                _ => {}
            }
            line_start += line.len();
        }

        if let Some((start, _)) = open {
            blocks.push(MDCodeBlock {
                range: start..text.len(),
            });
        }

        blocks
    }

    fn includes(&self, range: &Range<usize>) -> bool {
        self.range.start <= range.start && range.end <= self.range.end
    }
}

/// An inline code span (`` `code` ``), as a byte range of the document.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct MDCodeSpan {
    pub range: Range<usize>,
}

impl MDCodeSpan {
    /// Spans outside of `blocks`. A backtick run is closed by the next run of
    /// the same length before a blank line; an unclosed run is literal text.
    pub fn new(text: &str, blocks: &[MDCodeBlock]) -> Vec<MDCodeSpan> {
        static BACKTICKS_RE: Lazy<Regex> =
            Lazy::new(|| Regex::new(r"`+").expect("Backtick run regex"));
        static BLANK_LINE_RE: Lazy<Regex> =
            Lazy::new(|| Regex::new(r"\n[ \t]*\n").expect("Blank line regex"));

        let runs = BACKTICKS_RE
            .find_iter(text)
            .map(|run| run.range())
            .filter(|run| !blocks.iter().any(|block| block.range.contains(&run.start)))
            .collect_vec();
        let breaks = BLANK_LINE_RE
            .find_iter(text)
            .map(|blank| blank.start())
            .collect_vec();

        let mut spans = Vec::new();
        let mut i = 0;
        while i < runs.len() {
            let open = &runs[i];
            let limit = breaks
                .iter()
                .copied()
                .find(|&blank| blank > open.start)
                .unwrap_or(text.len());
            let close = runs[i + 1..]
                .iter()
                .take_while(|run| run.start < limit)
                .position(|run| run.len() == open.len());

            match close {
                Some(offset) => {
                    let close = &runs[i + 1 + offset];
                    spans.push(MDCodeSpan {
                        range: open.start..close.end,
                    });
                    i += offset + 2;
                }
                None => i += 1,
            }
        }

        spans
    }

    fn includes(&self, range: &Range<usize>) -> bool {
        self.range.start <= range.start && range.end <= self.range.end
    }
}

/// All `[[...]]` links of `text` in document order.
///
/// Embeds (`![[...]]`) and links inside fenced code blocks or inline code
/// spans are not links.
pub fn link_occurrences(text: &str) -> Vec<LinkOccurrence> {
    static WIKI_LINK_RE: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"(?<embed>!)?\[\[(?<inner>[^\[\]]*)\]\]").expect("Wiki link regex")
    }); // A [[link]] that does not have any [ or ] in it

    let code_blocks = MDCodeBlock::new(text);
    let code_spans = MDCodeSpan::new(text, &code_blocks);
    let rope = Rope::from_str(text);

    WIKI_LINK_RE
        .captures_iter(text)
        .filter(|captures| captures.name("embed").is_none())
        .filter_map(|captures| {
            let full = captures.get(0)?;
            let inner = captures.name("inner")?.as_str();
            Some((full.range(), inner))
        })
        .filter(|(range, _)| !code_blocks.iter().any(|block| block.includes(range)))
        .filter(|(range, _)| !code_spans.iter().any(|span| span.includes(range)))
        .map(|(range, inner)| {
            let target = inner.split_once('|').map_or(inner, |(target, _)| target);
            LinkOccurrence {
                target: target.to_string(),
                raw_text: text[range.clone()].to_string(),
                range: TextRange::from_byte_range(&rope, range),
            }
        })
        .collect()
}
