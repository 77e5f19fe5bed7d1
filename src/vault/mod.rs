mod parsing;
mod types;

pub use parsing::{link_occurrences, MDCodeBlock, MDCodeSpan};
pub use types::{basename, Document, LinkOccurrence, Position, TextRange};

use std::{
    cell::RefCell,
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use itertools::Itertools;
use rayon::prelude::*;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// The host side of normalization: which documents exist, their cached
/// links, and how to read and write them.
///
/// Every method runs on the caller's thread; futures are not `Send`.
#[async_trait(?Send)]
pub trait DocumentStore {
    fn documents(&self) -> Vec<Document>;

    /// Cached links of `document` in document order, `None` when the cache has no entry.
    fn link_occurrences(&self, document: &Document) -> Option<Vec<LinkOccurrence>>;

    async fn read(&self, document: &Document) -> anyhow::Result<String>;

    async fn write(&self, document: &Document, text: &str) -> anyhow::Result<()>;

    async fn create(&self, path: &Path, text: &str) -> anyhow::Result<Document>;

    async fn delete(&self, document: &Document) -> anyhow::Result<()>;

    async fn rename(&self, document: &Document, new_path: &Path) -> anyhow::Result<Document>;

    fn basenames(&self) -> Vec<String> {
        self.documents()
            .into_iter()
            .map(|document| document.basename)
            .collect()
    }
}

#[derive(Debug, PartialEq, Eq, Clone)]
struct CachedDocument {
    document: Document,
    links: Vec<LinkOccurrence>,
}

impl CachedDocument {
    fn new(path: PathBuf, text: &str) -> CachedDocument {
        CachedDocument {
            document: Document::new(path),
            links: link_occurrences(text),
        }
    }
}

/// The Markdown files under a root directory together with their link cache.
#[derive(Debug)]
pub struct Vault {
    documents: RefCell<BTreeMap<PathBuf, CachedDocument>>,
    root_dir: PathBuf,
}

impl Vault {
    /// Fails when `root_dir` cannot be read. Files that cannot be read are
    /// skipped with a warning.
    pub fn construct_vault(root_dir: &Path) -> Result<Vault, std::io::Error> {
        std::fs::read_dir(root_dir)?;

        let md_file_paths = WalkDir::new(root_dir)
            .into_iter()
            .filter_entry(|e| {
                e.depth() == 0
                    || !e
                        .file_name()
                        .to_str()
                        .map(|s| s.starts_with('.'))
                        .unwrap_or(false)
            })
            .flatten()
            .filter(|f| f.path().extension().and_then(|e| e.to_str()) == Some("md"))
            .map(|entry| entry.into_path())
            .collect_vec();

        let documents: BTreeMap<PathBuf, CachedDocument> = md_file_paths
            .par_iter()
            .filter_map(|path| match std::fs::read_to_string(path) {
                Ok(text) => Some((path.clone(), CachedDocument::new(path.clone(), &text))),
                Err(err) => {
                    warn!(path = %path.display(), "skipping unreadable document: {err}");
                    None
                }
            })
            .collect();

        debug!(root = %root_dir.display(), documents = documents.len(), "constructed vault");

        Ok(Vault {
            documents: RefCell::new(documents),
            root_dir: root_dir.into(),
        })
    }

    pub fn root_dir(&self) -> &PathBuf {
        &self.root_dir
    }

    pub fn document_count(&self) -> usize {
        self.documents.borrow().len()
    }

    /// Looks up a document by path, relative paths being resolved against the root.
    pub fn select_document(&self, path: &Path) -> Option<Document> {
        let path = self.resolve(path);
        self.documents
            .borrow()
            .get(&path)
            .map(|cached| cached.document.clone())
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root_dir.join(path)
        }
    }

    fn update_document(&self, path: &Path, text: &str) {
        self.documents.borrow_mut().insert(
            path.to_path_buf(),
            CachedDocument::new(path.to_path_buf(), text),
        );
    }
}

#[async_trait(?Send)]
impl DocumentStore for Vault {
    fn documents(&self) -> Vec<Document> {
        self.documents
            .borrow()
            .values()
            .map(|cached| cached.document.clone())
            .collect()
    }

    fn link_occurrences(&self, document: &Document) -> Option<Vec<LinkOccurrence>> {
        self.documents
            .borrow()
            .get(&document.path)
            .map(|cached| cached.links.clone())
    }

    async fn read(&self, document: &Document) -> anyhow::Result<String> {
        tokio::fs::read_to_string(&document.path)
            .await
            .with_context(|| format!("reading {}", document.path.display()))
    }

    async fn write(&self, document: &Document, text: &str) -> anyhow::Result<()> {
        tokio::fs::write(&document.path, text)
            .await
            .with_context(|| format!("writing {}", document.path.display()))?;
        self.update_document(&document.path, text);
        Ok(())
    }

    async fn create(&self, path: &Path, text: &str) -> anyhow::Result<Document> {
        let path = self.resolve(path);
        if self.documents.borrow().contains_key(&path) {
            return Err(anyhow!("{} already exists", path.display()));
        }
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        tokio::fs::write(&path, text)
            .await
            .with_context(|| format!("creating {}", path.display()))?;
        self.update_document(&path, text);
        Ok(Document::new(path))
    }

    async fn delete(&self, document: &Document) -> anyhow::Result<()> {
        tokio::fs::remove_file(&document.path)
            .await
            .with_context(|| format!("deleting {}", document.path.display()))?;
        self.documents.borrow_mut().remove(&document.path);
        Ok(())
    }

    async fn rename(&self, document: &Document, new_path: &Path) -> anyhow::Result<Document> {
        let new_path = self.resolve(new_path);
        tokio::fs::rename(&document.path, &new_path)
            .await
            .with_context(|| {
                format!(
                    "renaming {} to {}",
                    document.path.display(),
                    new_path.display()
                )
            })?;

        let mut documents = self.documents.borrow_mut();
        let links = documents
            .remove(&document.path)
            .map(|cached| cached.links)
            .unwrap_or_default();
        let renamed = Document::new(new_path.clone());
        documents.insert(
            new_path,
            CachedDocument {
                document: renamed.clone(),
                links,
            },
        );
        Ok(renamed)
    }
}
