//! Shared test utilities for wikinorm.
//!
//! This module provides common helpers used across multiple test modules.
//! It is only compiled when running tests.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail};
use async_trait::async_trait;
use tempfile::TempDir;

use crate::vault::{link_occurrences, Document, DocumentStore, LinkOccurrence};

/// Creates a temporary vault directory for testing.
///
/// Returns a tuple of (TempDir, PathBuf) where:
/// - TempDir: The temp directory handle (must be kept alive for the test duration)
/// - PathBuf: The path to the vault subdirectory
///
/// # Why this helper exists
///
/// The vault construction skips hidden entries (those starting with `.`).
/// On some systems, temp directories are created under paths like
/// `/tmp/.tmpXXXXX`. A non-hidden subdirectory called "vault" keeps the
/// test files visible.
pub fn create_test_vault_dir() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let vault_dir = temp_dir.path().join("vault");
    fs::create_dir(&vault_dir).expect("Failed to create vault subdirectory");
    (temp_dir, vault_dir)
}

/// A document store held in memory, with injectable I/O failures.
///
/// Paths are used as given; the link cache is refreshed on every write.
#[derive(Default)]
pub struct MemoryStore {
    texts: RefCell<BTreeMap<PathBuf, String>>,
    links: RefCell<BTreeMap<PathBuf, Vec<LinkOccurrence>>>,
    failing_reads: RefCell<HashSet<PathBuf>>,
    failing_writes: RefCell<HashSet<PathBuf>>,
    yielding_reads: Cell<bool>,
}

impl MemoryStore {
    pub fn new() -> MemoryStore {
        MemoryStore::default()
    }

    pub fn insert(&self, path: impl Into<PathBuf>, text: &str) {
        let path = path.into();
        self.links
            .borrow_mut()
            .insert(path.clone(), link_occurrences(text));
        self.texts.borrow_mut().insert(path, text.to_string());
    }

    pub fn text(&self, path: impl AsRef<Path>) -> Option<String> {
        self.texts.borrow().get(path.as_ref()).cloned()
    }

    pub fn fail_reads_from(&self, path: impl Into<PathBuf>) {
        self.failing_reads.borrow_mut().insert(path.into());
    }

    pub fn fail_writes_to(&self, path: impl Into<PathBuf>) {
        self.failing_writes.borrow_mut().insert(path.into());
    }

    /// Makes every read suspend once before completing, like real I/O.
    pub fn yield_on_reads(&self) {
        self.yielding_reads.set(true);
    }

    pub fn drop_link_cache(&self, path: impl AsRef<Path>) {
        self.links.borrow_mut().remove(path.as_ref());
    }
}

#[async_trait(?Send)]
impl DocumentStore for MemoryStore {
    fn documents(&self) -> Vec<Document> {
        self.texts.borrow().keys().map(Document::new).collect()
    }

    fn link_occurrences(&self, document: &Document) -> Option<Vec<LinkOccurrence>> {
        self.links.borrow().get(&document.path).cloned()
    }

    async fn read(&self, document: &Document) -> anyhow::Result<String> {
        if self.yielding_reads.get() {
            tokio::task::yield_now().await;
        }
        if self.failing_reads.borrow().contains(&document.path) {
            bail!("read failure injected for {}", document.path.display());
        }
        self.text(&document.path)
            .ok_or_else(|| anyhow!("{} does not exist", document.path.display()))
    }

    async fn write(&self, document: &Document, text: &str) -> anyhow::Result<()> {
        if self.failing_writes.borrow().contains(&document.path) {
            bail!("write failure injected for {}", document.path.display());
        }
        self.insert(document.path.clone(), text);
        Ok(())
    }

    async fn create(&self, path: &Path, text: &str) -> anyhow::Result<Document> {
        if self.texts.borrow().contains_key(path) {
            bail!("{} already exists", path.display());
        }
        self.insert(path, text);
        Ok(Document::new(path))
    }

    async fn delete(&self, document: &Document) -> anyhow::Result<()> {
        self.texts
            .borrow_mut()
            .remove(&document.path)
            .ok_or_else(|| anyhow!("{} does not exist", document.path.display()))?;
        self.links.borrow_mut().remove(&document.path);
        Ok(())
    }

    async fn rename(&self, document: &Document, new_path: &Path) -> anyhow::Result<Document> {
        let text = self
            .texts
            .borrow_mut()
            .remove(&document.path)
            .ok_or_else(|| anyhow!("{} does not exist", document.path.display()))?;
        self.links.borrow_mut().remove(&document.path);
        self.insert(new_path, &text);
        Ok(Document::new(new_path))
    }
}
