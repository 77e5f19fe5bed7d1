//! Wikilink normalization.
//!
//! A link is rewritten when its target's casing differs from the document
//! it resolves to (`[[note]]` -> `[[Note|note]]`), and, unless only existing
//! notes are matched, when it points at a missing note with a lowercase
//! initial and has no display text (`[[idea]]` -> `[[idea|idea]]`).
//!
//! Replacements are always computed bottom-to-top: applying one never moves
//! the positions of the ones still to be applied.

use std::{cell::Cell, rc::Rc};

use tracing::{debug, error, info};

use crate::{
    config::Settings,
    editor::EditorBuffer,
    index::{FilenameIndex, FilenameIndexCache},
    offsets,
    vault::{link_occurrences, Document, DocumentStore, LinkOccurrence, TextRange},
};

/// One substitution in a document.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Replacement {
    pub range: TextRange,
    pub new_text: String,
}

/// Aggregate result of a corpus pass.
#[derive(Debug, Default, PartialEq, Eq, Clone, Copy)]
pub struct NormalizeSummary {
    pub documents_changed: usize,
    pub links_changed: usize,
}

/// Reads the current text under a range, from whatever holds the document.
pub trait TextExtractor {
    fn extract(&self, range: &TextRange) -> Option<String>;
}

/// Extraction from an immutable snapshot.
pub struct StrExtractor<'a>(pub &'a str);

impl TextExtractor for StrExtractor<'_> {
    fn extract(&self, range: &TextRange) -> Option<String> {
        offsets::extract_range(self.0, range).map(str::to_string)
    }
}

impl TextExtractor for EditorBuffer {
    fn extract(&self, range: &TextRange) -> Option<String> {
        self.get_range(range)
    }
}

/// New text for one link, or `None` when it should stay as it is.
///
/// `existing` is the text currently under the link's range; anything that is
/// not a `[[...]]` link means the cached range is stale and nothing is done.
pub fn compute_replacement(
    target: &str,
    existing: &str,
    index: &FilenameIndex,
    only_match_existing_notes: bool,
) -> Option<String> {
    let inner = existing.strip_prefix("[[")?.strip_suffix("]]")?;
    let existing_display = inner.split_once('|').map(|(_, display)| display);

    let Some(real_name) = index.lookup(target) else {
        let lowercase_initial = target.chars().next().is_some_and(|c| !c.is_uppercase());
        let has_display = existing_display.is_some_and(|display| !display.is_empty());

        return (!only_match_existing_notes && !has_display && lowercase_initial)
            .then(|| format!("[[{target}|{target}]]"));
    };

    // Correctly cased links are left alone even without display text.
    if real_name == target {
        return None;
    }

    let display = existing_display.unwrap_or(target);
    Some(format!("[[{real_name}|{display}]]"))
}

/// Replacements for a document's links, ordered from the last link to the first.
pub fn find_link_replacements(
    occurrences: &[LinkOccurrence],
    text: &impl TextExtractor,
    index: &FilenameIndex,
    only_match_existing_notes: bool,
) -> Vec<Replacement> {
    let mut links: Vec<&LinkOccurrence> = occurrences.iter().collect();
    links.sort_by(|a, b| b.range.start.cmp(&a.range.start));

    links
        .into_iter()
        .filter(|link| !link.target.is_empty())
        .filter_map(|link| {
            let existing = text.extract(&link.range)?;
            let new_text =
                compute_replacement(&link.target, &existing, index, only_match_existing_notes)?;
            Some(Replacement {
                range: link.range,
                new_text,
            })
        })
        .collect()
}

/// Applies bottom-to-top `replacements` to `text`.
///
/// Offsets are resolved against the untouched text before splicing. A
/// replacement with an invalid range, or one overlapping a replacement that
/// was already spliced, is skipped. Returns the new text and how many
/// replacements were applied.
pub fn apply_to_text(text: &str, replacements: &[Replacement]) -> (String, usize) {
    let mut resolved: Vec<_> = replacements
        .iter()
        .filter_map(|replacement| {
            offsets::range_to_offsets(text, &replacement.range)
                .map(|range| (range, replacement.new_text.as_str()))
        })
        .collect();
    resolved.sort_by(|(a, _), (b, _)| b.start.cmp(&a.start));

    let mut result = text.to_string();
    let mut applied = 0;
    let mut lowest_start = usize::MAX;
    for (range, new_text) in resolved {
        if range.end > lowest_start {
            continue;
        }
        lowest_start = range.start;
        result.replace_range(range, new_text);
        applied += 1;
    }

    (result, applied)
}

/// Applies bottom-to-top `replacements` directly to a live buffer.
pub fn apply_to_buffer(buffer: &mut EditorBuffer, replacements: &[Replacement]) -> usize {
    replacements
        .iter()
        .filter(|replacement| buffer.replace_range(&replacement.range, &replacement.new_text))
        .count()
}

/// Owns the filename index and the corpus pass guard.
///
/// Settings are passed to every call, so a change takes effect on the next one.
#[derive(Debug, Default)]
pub struct Normalizer {
    index: FilenameIndexCache,
    in_flight: Cell<bool>,
}

/// A document whose current text lives in an editor buffer instead of the store.
pub struct OpenBuffer<'a> {
    pub document: &'a Document,
    pub buffer: &'a mut EditorBuffer,
}

/// Clears the in-flight flag when the pass ends, however it ends.
struct PassGuard<'a>(&'a Cell<bool>);

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

impl Normalizer {
    pub fn new() -> Normalizer {
        Normalizer::default()
    }

    /// Drops the filename index; call on document creation, deletion and rename.
    pub fn invalidate_index(&self) {
        self.index.invalidate();
    }

    pub fn index(&self, store: &impl DocumentStore) -> Rc<FilenameIndex> {
        self.index.get_or_build(|| store.basenames())
    }

    pub fn is_normalizing(&self) -> bool {
        self.in_flight.get()
    }

    fn begin_pass(&self) -> Option<PassGuard<'_>> {
        if self.in_flight.replace(true) {
            return None;
        }
        Some(PassGuard(&self.in_flight))
    }

    /// Normalizes a live buffer in place given its links. Returns the number of links rewritten.
    pub fn normalize_buffer(
        &self,
        buffer: &mut EditorBuffer,
        occurrences: &[LinkOccurrence],
        index: &FilenameIndex,
        settings: &Settings,
    ) -> usize {
        let replacements = find_link_replacements(
            occurrences,
            &*buffer,
            index,
            settings.only_match_existing_notes,
        );
        apply_to_buffer(buffer, &replacements)
    }

    /// Normalizes a live buffer using the links parsed from its own text.
    pub fn normalize_live(
        &self,
        buffer: &mut EditorBuffer,
        index: &FilenameIndex,
        settings: &Settings,
    ) -> usize {
        let occurrences = link_occurrences(&buffer.text());
        if occurrences.is_empty() {
            return 0;
        }
        self.normalize_buffer(buffer, &occurrences, index, settings)
    }

    /// Normalizes a text snapshot given its links.
    pub fn normalize_text(
        &self,
        text: &str,
        occurrences: &[LinkOccurrence],
        index: &FilenameIndex,
        settings: &Settings,
    ) -> (String, usize) {
        let replacements = find_link_replacements(
            occurrences,
            &StrExtractor(text),
            index,
            settings.only_match_existing_notes,
        );
        apply_to_text(text, &replacements)
    }

    /// Reads, normalizes and, when anything changed, writes one document.
    pub async fn normalize_document(
        &self,
        store: &impl DocumentStore,
        document: &Document,
        index: &FilenameIndex,
        settings: &Settings,
    ) -> anyhow::Result<usize> {
        let occurrences = match store.link_occurrences(document) {
            Some(occurrences) if !occurrences.is_empty() => occurrences,
            _ => return Ok(0),
        };

        let text = store.read(document).await?;
        let (new_text, count) = self.normalize_text(&text, &occurrences, index, settings);
        if count == 0 {
            return Ok(0);
        }

        store.write(document, &new_text).await?;
        debug!(path = %document.path.display(), links = count, "normalized document");
        Ok(count)
    }

    /// Normalizes every document of `store`.
    ///
    /// Returns `None` without doing anything when a pass is already running.
    /// Documents that fail to read or write are logged and left out of the summary.
    pub async fn normalize_all(
        &self,
        store: &impl DocumentStore,
        settings: &Settings,
    ) -> Option<NormalizeSummary> {
        self.normalize_all_with_open(store, settings, None).await
    }

    /// Like [`Normalizer::normalize_all`], except that the document in `open`
    /// is normalized in its buffer and is not written to the store.
    pub async fn normalize_all_with_open(
        &self,
        store: &impl DocumentStore,
        settings: &Settings,
        mut open: Option<OpenBuffer<'_>>,
    ) -> Option<NormalizeSummary> {
        let Some(_guard) = self.begin_pass() else {
            debug!("vault normalization already running");
            return None;
        };

        let index = self.index(store);
        let mut summary = NormalizeSummary::default();

        for document in store.documents() {
            let result = match open.as_mut() {
                Some(open) if *open.document == document => {
                    Ok(self.normalize_live(&mut *open.buffer, &index, settings))
                }
                _ => {
                    self.normalize_document(store, &document, &index, settings)
                        .await
                }
            };

            match result {
                Ok(0) => {}
                Ok(count) => {
                    summary.documents_changed += 1;
                    summary.links_changed += count;
                }
                Err(err) => {
                    error!(path = %document.path.display(), "error normalizing: {err:#}");
                }
            }
        }

        info!(
            documents = summary.documents_changed,
            links = summary.links_changed,
            "normalized vault"
        );
        Some(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::MemoryStore;
    use crate::vault::Position;

    fn index() -> FilenameIndex {
        FilenameIndex::build(["Note", "Project Plan"])
    }

    fn normalize(text: &str, only_existing: bool) -> String {
        let settings = Settings {
            only_match_existing_notes: only_existing,
            ..Settings::default()
        };
        Normalizer::new()
            .normalize_text(text, &link_occurrences(text), &index(), &settings)
            .0
    }

    #[test]
    fn test_case_correction() {
        assert_eq!(normalize("[[note]]", true), "[[Note|note]]");
        assert_eq!(normalize("[[note|note]]", true), "[[Note|note]]");
        assert_eq!(normalize("[[Note]]", true), "[[Note]]");
        assert_eq!(normalize("[[Note|shown]]", true), "[[Note|shown]]");
    }

    #[test]
    fn test_existing_display_text_is_kept() {
        assert_eq!(normalize("[[project plan|the plan]]", true), "[[Project Plan|the plan]]");
        assert_eq!(normalize("[[NOTE]]", true), "[[Note|NOTE]]");
    }

    #[test]
    fn test_display_text_synthesis_for_missing_notes() {
        assert_eq!(
            normalize("[[nonexistentNote]]", false),
            "[[nonexistentNote|nonexistentNote]]"
        );
        assert_eq!(normalize("[[nonexistentNote]]", true), "[[nonexistentNote]]");
        assert_eq!(normalize("[[Missing]]", false), "[[Missing]]");
        assert_eq!(normalize("[[missing|shown]]", false), "[[missing|shown]]");
    }

    #[test]
    fn test_uncased_initial_is_eligible_for_synthesis() {
        assert_eq!(normalize("[[2024 log]]", false), "[[2024 log|2024 log]]");
        assert_eq!(normalize("[[日記]]", false), "[[日記|日記]]");
    }

    #[test]
    fn test_stale_range_is_rejected() {
        let stale = LinkOccurrence {
            target: "note".into(),
            raw_text: "[[note]]".into(),
            range: TextRange::new(Position::new(0, 0), Position::new(0, 8)),
        };
        let text = "plain text here";
        let replacements = find_link_replacements(&[stale], &StrExtractor(text), &index(), true);
        assert!(replacements.is_empty());
    }

    #[test]
    fn test_out_of_bounds_occurrence_is_skipped() {
        let text = "[[note]]\n[[note]]";
        let mut occurrences = link_occurrences(text);
        occurrences.push(LinkOccurrence {
            target: "note".into(),
            raw_text: "[[note]]".into(),
            range: TextRange::new(Position::new(7, 0), Position::new(7, 8)),
        });

        let replacements = find_link_replacements(&occurrences, &StrExtractor(text), &index(), true);
        assert_eq!(replacements.len(), 2);
        let (result, count) = apply_to_text(text, &replacements);
        assert_eq!(result, "[[Note|note]]\n[[Note|note]]");
        assert_eq!(count, 2);
    }

    #[test]
    fn test_empty_target_is_skipped() {
        let text = "[[]] and [[|x]]";
        let replacements =
            find_link_replacements(&link_occurrences(text), &StrExtractor(text), &index(), false);
        assert!(replacements.is_empty());
    }

    #[test]
    fn test_replacements_are_bottom_to_top() {
        let text = "[[note]] a\nb [[note]] [[project plan]]";
        let replacements =
            find_link_replacements(&link_occurrences(text), &StrExtractor(text), &index(), true);

        let starts: Vec<_> = replacements.iter().map(|r| r.range.start).collect();
        assert_eq!(
            starts,
            vec![Position::new(1, 11), Position::new(1, 2), Position::new(0, 0)]
        );
    }

    #[test]
    fn test_normalizing_twice_is_idempotent() {
        let text = "[[note]], [[project PLAN|plan]] and [[idea]] with [[Note]]";
        let once = normalize(text, false);
        let settings = Settings {
            only_match_existing_notes: false,
            ..Settings::default()
        };
        let (twice, count) = Normalizer::new().normalize_text(
            &once,
            &link_occurrences(&once),
            &index(),
            &settings,
        );

        assert_eq!(count, 0);
        assert_eq!(twice, once);
    }

    #[test]
    fn test_buffer_and_offset_application_agree() {
        let text = "intro [[note]] x\n[[project plan]] and 𝄞 [[NOTE|n]]\n\ntail [[note]]";
        let occurrences = link_occurrences(text);
        let index = index();
        let settings = Settings::default();
        let normalizer = Normalizer::new();

        let mut buffer = EditorBuffer::new(text);
        let live = normalizer.normalize_buffer(&mut buffer, &occurrences, &index, &settings);
        let (offline, count) = normalizer.normalize_text(text, &occurrences, &index, &settings);

        // absolute offsets computed once on the original text, spliced by hand
        let mut expected = text.to_string();
        for replacement in find_link_replacements(&occurrences, &StrExtractor(text), &index, true) {
            let range = offsets::range_to_offsets(text, &replacement.range).unwrap();
            expected.replace_range(range, &replacement.new_text);
        }

        assert_eq!(live, 4);
        assert_eq!(count, 4);
        assert_eq!(buffer.text(), offline);
        assert_eq!(offline, expected);
        assert_eq!(
            offline,
            "intro [[Note|note]] x\n[[Project Plan|project plan]] and 𝄞 [[Note|n]]\n\ntail [[Note|note]]"
        );
    }

    #[test]
    fn test_overlapping_replacements_are_skipped() {
        let outer = Replacement {
            range: TextRange::new(Position::new(0, 0), Position::new(0, 6)),
            new_text: "AAAAAA".into(),
        };
        let inner = Replacement {
            range: TextRange::new(Position::new(0, 2), Position::new(0, 8)),
            new_text: "B".into(),
        };
        let (result, count) = apply_to_text("0123456789", &[inner, outer]);
        assert_eq!(result, "01B89");
        assert_eq!(count, 1);
    }

    fn three_document_store() -> MemoryStore {
        let store = MemoryStore::new();
        store.insert("A.md", "see [[b]]");
        store.insert("B.md", "see [[C]]");
        store.insert("C.md", "see [[a|first]]");
        store
    }

    #[tokio::test]
    async fn test_corpus_pass_aggregates_counts() {
        let store = three_document_store();
        let normalizer = Normalizer::new();

        let summary = normalizer.normalize_all(&store, &Settings::default()).await.unwrap();

        assert_eq!(
            summary,
            NormalizeSummary {
                documents_changed: 2,
                links_changed: 2
            }
        );
        assert_eq!(store.text("A.md").unwrap(), "see [[B|b]]");
        assert_eq!(store.text("B.md").unwrap(), "see [[C]]");
        assert_eq!(store.text("C.md").unwrap(), "see [[A|first]]");
        assert!(!normalizer.is_normalizing());
    }

    #[tokio::test]
    async fn test_corpus_pass_survives_unchanged_document_write_failure() {
        let store = three_document_store();
        store.fail_writes_to("B.md");
        let normalizer = Normalizer::new();

        let summary = normalizer.normalize_all(&store, &Settings::default()).await.unwrap();

        assert_eq!(summary.documents_changed, 2);
        assert_eq!(summary.links_changed, 2);
    }

    #[tokio::test]
    async fn test_corpus_pass_continues_after_failure() {
        let store = three_document_store();
        store.fail_writes_to("A.md");
        store.fail_reads_from("C.md");
        store.insert("D.md", "[[note]] [[b]]");
        let normalizer = Normalizer::new();

        let summary = normalizer.normalize_all(&store, &Settings::default()).await.unwrap();

        assert_eq!(
            summary,
            NormalizeSummary {
                documents_changed: 1,
                links_changed: 1
            }
        );
        assert_eq!(store.text("A.md").unwrap(), "see [[b]]");
        assert_eq!(store.text("D.md").unwrap(), "[[note]] [[B|b]]");
        assert!(!normalizer.is_normalizing());
    }

    #[tokio::test]
    async fn test_pass_started_during_a_pass_is_ignored() {
        let store = three_document_store();
        store.yield_on_reads();
        let settings = Settings::default();
        let normalizer = Normalizer::new();

        // the nested pass starts while the outer one is suspended in a read
        let nested = async {
            assert!(normalizer.is_normalizing());
            normalizer.normalize_all(&store, &settings).await
        };
        let (outer, nested) = tokio::join!(normalizer.normalize_all(&store, &settings), nested);

        assert_eq!(nested, None);
        assert_eq!(
            outer,
            Some(NormalizeSummary {
                documents_changed: 2,
                links_changed: 2
            })
        );
        assert_eq!(store.text("A.md").unwrap(), "see [[B|b]]");
        assert_eq!(store.text("C.md").unwrap(), "see [[A|first]]");
        assert!(!normalizer.is_normalizing());

        assert_eq!(
            normalizer.normalize_all(&store, &settings).await,
            Some(NormalizeSummary::default())
        );
    }

    #[tokio::test]
    async fn test_open_document_is_normalized_in_its_buffer() {
        let store = three_document_store();
        let settings = Settings::default();
        let normalizer = Normalizer::new();

        let a = Document::new("A.md");
        let mut buffer = EditorBuffer::new("unsaved, see [[b]] and [[c]]");
        let open = OpenBuffer {
            document: &a,
            buffer: &mut buffer,
        };
        let summary = normalizer
            .normalize_all_with_open(&store, &settings, Some(open))
            .await
            .unwrap();

        assert_eq!(
            summary,
            NormalizeSummary {
                documents_changed: 2,
                links_changed: 3
            }
        );
        assert_eq!(buffer.text(), "unsaved, see [[B|b]] and [[C|c]]");
        assert_eq!(store.text("A.md").unwrap(), "see [[b]]");
        assert_eq!(store.text("C.md").unwrap(), "see [[A|first]]");
    }

    #[test]
    fn test_setting_change_applies_to_next_call() {
        let normalizer = Normalizer::new();
        let text = "[[idea]]";
        let mut settings = Settings::default();

        let (unchanged, _) =
            normalizer.normalize_text(text, &link_occurrences(text), &index(), &settings);
        settings.only_match_existing_notes = false;
        let (changed, _) =
            normalizer.normalize_text(text, &link_occurrences(text), &index(), &settings);

        assert_eq!(unchanged, "[[idea]]");
        assert_eq!(changed, "[[idea|idea]]");
    }

    #[tokio::test]
    async fn test_document_without_cache_entry_is_zero_work() {
        let store = MemoryStore::new();
        store.insert("A.md", "[[b]]");
        store.insert("B.md", "");
        store.drop_link_cache("A.md");
        let normalizer = Normalizer::new();

        let summary = normalizer.normalize_all(&store, &Settings::default()).await.unwrap();
        assert_eq!(summary, NormalizeSummary::default());
    }
}
