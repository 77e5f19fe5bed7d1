//! Case-insensitive lookup of document basenames.

use std::{cell::RefCell, collections::HashMap, rc::Rc};

use tracing::debug;

/// Map: lowercase basename -> basename as it is cased on disk.
#[derive(Debug, Default, PartialEq, Eq, Clone)]
pub struct FilenameIndex(HashMap<String, String>);

impl FilenameIndex {
    /// Later basenames win when two differ only in case.
    pub fn build<I, S>(basenames: I) -> FilenameIndex
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        FilenameIndex(
            basenames
                .into_iter()
                .map(Into::into)
                .map(|basename| (basename.to_lowercase(), basename))
                .collect(),
        )
    }

    pub fn lookup(&self, target: &str) -> Option<&str> {
        self.0.get(&target.to_lowercase()).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Holds the last built index until it is invalidated.
///
/// There is no incremental update: every structural change of the document
/// set discards the index and the next lookup rebuilds it from scratch.
#[derive(Debug, Default)]
pub struct FilenameIndexCache {
    cached: RefCell<Option<Rc<FilenameIndex>>>,
}

impl FilenameIndexCache {
    pub fn new() -> FilenameIndexCache {
        FilenameIndexCache::default()
    }

    pub fn get_or_build<I, S>(&self, basenames: impl FnOnce() -> I) -> Rc<FilenameIndex>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if let Some(index) = self.cached.borrow().as_ref() {
            return Rc::clone(index);
        }

        let index = Rc::new(FilenameIndex::build(basenames()));
        debug!(entries = index.len(), "rebuilt filename index");
        *self.cached.borrow_mut() = Some(Rc::clone(&index));
        index
    }

    pub fn invalidate(&self) {
        self.cached.borrow_mut().take();
    }

    pub fn is_built(&self) -> bool {
        self.cached.borrow().is_some()
    }
}
