//! Markup loading by tag name.
//!
//! A [`MarkupSource`] turns a tag into markup text. [`FragmentCache`] sits in
//! front of it for the lifetime of the runtime: the first request for a tag
//! starts the one fetch, every later request (including ones that arrive while
//! that fetch is still running) shares its result. Failed loads are evicted so
//! a later request fetches again; nothing retries on its own.

use futures::future::{FutureExt, LocalBoxFuture, Shared};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use tracing::{debug, trace, warn};
use walkdir::WalkDir;

use crate::cache::TemplateCache;
use crate::error::{LoadError, Result};
use crate::parse::{is_component_tag, Fragment};

pub type MarkupFuture = LocalBoxFuture<'static, Result<String, LoadError>>;

pub trait MarkupSource {
    fn fetch(&self, tag: &str) -> MarkupFuture;
}

// ═══════════════════════════════════════════════════════════════════════════════
// SOURCES
// ═══════════════════════════════════════════════════════════════════════════════

/// Markup files named `<tag>.<extension>` anywhere under a base directory.
#[derive(Debug, Clone)]
pub struct DirectorySource {
    base: PathBuf,
    extension: String,
    files: HashMap<String, PathBuf>,
}

impl DirectorySource {
    pub fn new(base: impl AsRef<Path>, extension: &str) -> Self {
        let base = base.as_ref().to_path_buf();
        let files = find_markup_files(&base, extension);
        debug!(base = %base.display(), found = files.len(), "scanned markup directory");
        Self {
            base,
            extension: extension.to_string(),
            files,
        }
    }

    /// Pick up files added since construction.
    pub fn rescan(&mut self) {
        self.files = find_markup_files(&self.base, &self.extension);
    }

    pub fn tags(&self) -> Vec<&str> {
        let mut tags: Vec<&str> = self.files.keys().map(String::as_str).collect();
        tags.sort_unstable();
        tags
    }
}

/// Map component tags to files. On duplicate names the first path in
/// file-name order wins.
fn find_markup_files(dir: &Path, extension: &str) -> HashMap<String, PathBuf> {
    let mut files = HashMap::new();

    for entry in WalkDir::new(dir)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .flatten()
    {
        let path = entry.path();
        if !path.is_file() || path.extension().and_then(|e| e.to_str()) != Some(extension) {
            continue;
        }
        let Some(tag) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        if !is_component_tag(tag) {
            trace!(path = %path.display(), "skipping non-component markup file");
            continue;
        }
        files
            .entry(tag.to_string())
            .or_insert_with(|| path.to_path_buf());
    }

    files
}

impl MarkupSource for DirectorySource {
    fn fetch(&self, tag: &str) -> MarkupFuture {
        let tag = tag.to_string();
        let Some(path) = self.files.get(&tag).cloned() else {
            return futures::future::ready(Err(LoadError::NotFound { tag })).boxed_local();
        };
        async move {
            fs::read_to_string(&path).map_err(|e| LoadError::Io {
                tag,
                message: e.to_string(),
            })
        }
        .boxed_local()
    }
}

/// In-memory markup, for embedding and tests.
#[derive(Debug, Default)]
pub struct MemorySource {
    entries: RefCell<HashMap<String, String>>,
    fetches: Cell<usize>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, tag: &str, markup: &str) -> Self {
        self.insert(tag, markup);
        self
    }

    pub fn insert(&self, tag: &str, markup: &str) {
        self.entries
            .borrow_mut()
            .insert(tag.to_string(), markup.to_string());
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.get()
    }
}

impl MarkupSource for MemorySource {
    fn fetch(&self, tag: &str) -> MarkupFuture {
        self.fetches.set(self.fetches.get() + 1);
        let result = self
            .entries
            .borrow()
            .get(tag)
            .cloned()
            .ok_or_else(|| LoadError::NotFound {
                tag: tag.to_string(),
            });
        futures::future::ready(result).boxed_local()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// FRAGMENT CACHE
// ═══════════════════════════════════════════════════════════════════════════════

type FragmentFuture = LocalBoxFuture<'static, Result<Rc<Fragment>>>;
type SharedLoad = Shared<FragmentFuture>;

struct FragmentCacheInner {
    source: Rc<dyn MarkupSource>,
    templates: Rc<TemplateCache>,
    entries: RefCell<HashMap<String, SharedLoad>>,
}

#[derive(Clone)]
pub struct FragmentCache {
    inner: Rc<FragmentCacheInner>,
}

impl FragmentCache {
    pub fn new(source: Rc<dyn MarkupSource>) -> Self {
        Self {
            inner: Rc::new(FragmentCacheInner {
                source,
                templates: Rc::new(TemplateCache::new()),
                entries: RefCell::new(HashMap::new()),
            }),
        }
    }

    /// Parsed fragment for `tag`, fetching it on first use.
    pub fn load(&self, tag: &str) -> FragmentFuture {
        let shared = self.entry(tag);
        let inner = Rc::downgrade(&self.inner);
        let tag = tag.to_string();
        let pending = shared.clone();
        async move {
            let result = pending.await;
            if let Err(e) = &result {
                warn!(tag = %tag, code = e.code(), error = %e, "markup load failed");
                if let Some(inner) = inner.upgrade() {
                    let mut entries = inner.entries.borrow_mut();
                    if entries.get(&tag).is_some_and(|current| current.ptr_eq(&shared)) {
                        entries.remove(&tag);
                    }
                }
            }
            result
        }
        .boxed_local()
    }

    fn entry(&self, tag: &str) -> SharedLoad {
        if let Some(existing) = self.inner.entries.borrow().get(tag) {
            trace!(tag, "fragment cache hit");
            return existing.clone();
        }

        debug!(tag, "fetching markup");
        let fetch = self.inner.source.fetch(tag);
        let templates = self.inner.templates.clone();
        let name = tag.to_string();
        let load: FragmentFuture = async move {
            let markup = fetch.await?;
            templates.get_or_parse(&markup, &name)
        }
        .boxed_local();
        let shared = load.shared();
        self.inner
            .entries
            .borrow_mut()
            .insert(tag.to_string(), shared.clone());
        shared
    }

    /// True once `tag` has loaded successfully.
    pub fn is_cached(&self, tag: &str) -> bool {
        self.inner
            .entries
            .borrow()
            .get(tag)
            .and_then(|shared| shared.peek())
            .is_some_and(|result| result.is_ok())
    }

    pub fn len(&self) -> usize {
        self.inner.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.entries.borrow().is_empty()
    }
}
