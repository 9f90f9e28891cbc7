//! Path-keyed memoization of resolved files.

use crate::buffer::{Buffer, MemoryFile};
use crate::http::Connection;
use crate::mime::web_name;
use crate::resolve::{FileResolver, ResolveError};
use crate::route::{handler, PathHandler};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("no file resolver is set")]
    NoResolver,
    #[error("`{subpath}` is already cached")]
    Duplicate { subpath: String },
    #[error("no data for `{subpath}` is cached in memory")]
    NotCached { subpath: String },
    #[error(transparent)]
    Resolve(#[from] ResolveError),
}

/// A cache of in-memory files indexed by normalized subpath.
///
/// This is a memoize-on-demand store, not an LRU: entries are inserted by the
/// `add` family or lazily through [`FileCache::get_or_add`], replaced by the
/// `refresh` family, and removed only by [`FileCache::clear`]. The backing map
/// is guarded by a single lock, so lazy population resolves at most once per
/// key even with concurrent callers.
#[derive(Default)]
pub struct FileCache {
    files: Mutex<FxHashMap<String, MemoryFile>>,
    resolver: Option<Box<dyn FileResolver>>,
}

impl FileCache {
    /// A cache with no resolver; only direct inserts are possible.
    pub fn new() -> Self {
        Self::default()
    }

    /// A cache that lazily populates entries through the given resolver.
    pub fn with_resolver(resolver: impl FileResolver + 'static) -> Self {
        Self {
            files: Mutex::new(FxHashMap::default()),
            resolver: Some(Box::new(resolver)),
        }
    }

    pub fn set_resolver(&mut self, resolver: impl FileResolver + 'static) {
        self.resolver = Some(Box::new(resolver));
    }

    fn resolver(&self) -> Result<&dyn FileResolver, CacheError> {
        self.resolver.as_deref().ok_or(CacheError::NoResolver)
    }

    /// Resolves the subpath through the configured resolver and inserts it.
    ///
    /// Not idempotent: an already-cached subpath is a duplicate-key error.
    pub fn add(&self, subpath: &str) -> Result<(), CacheError> {
        let resolver = self.resolver()?;
        let key = web_name(subpath);
        let mut files = self.files.lock();
        if files.contains_key(&key) {
            return Err(CacheError::Duplicate { subpath: key });
        }
        let file = resolver.resolve(subpath)?;
        files.insert(key, file);
        Ok(())
    }

    /// Like [`FileCache::add`], but swallows any failure.
    pub fn try_add(&self, subpath: &str) -> bool {
        self.add(subpath).is_ok()
    }

    /// Inserts a pre-built file without consulting the resolver.
    pub fn add_file(&self, subpath: &str, file: MemoryFile) -> Result<(), CacheError> {
        let key = web_name(subpath);
        let mut files = self.files.lock();
        if files.contains_key(&key) {
            return Err(CacheError::Duplicate { subpath: key });
        }
        files.insert(key, file);
        Ok(())
    }

    /// Inserts raw content, deriving the MIME type from the subpath extension.
    pub fn add_buffer(&self, subpath: &str, buffer: Buffer) -> Result<(), CacheError> {
        let file = MemoryFile::new(buffer, subpath);
        self.add_file(subpath, file)
    }

    pub fn has(&self, subpath: &str) -> bool {
        self.files.lock().contains_key(&web_name(subpath))
    }

    pub fn get(&self, subpath: &str) -> Result<MemoryFile, CacheError> {
        self.try_get(subpath).ok_or_else(|| CacheError::NotCached {
            subpath: web_name(subpath),
        })
    }

    pub fn try_get(&self, subpath: &str) -> Option<MemoryFile> {
        self.files.lock().get(&web_name(subpath)).cloned()
    }

    /// Fetches a cached file, resolving and inserting it first when absent.
    ///
    /// The primary lazy-memoization entry point for request handlers. The map
    /// lock is held across the resolve, so each key is populated at most once.
    pub fn get_or_add(&self, subpath: &str) -> Result<MemoryFile, CacheError> {
        let key = web_name(subpath);
        let mut files = self.files.lock();
        if let Some(file) = files.get(&key) {
            return Ok(file.clone());
        }
        let file = self.resolver()?.resolve(subpath)?;
        files.insert(key, file.clone());
        Ok(file)
    }

    /// Non-failing variant of [`FileCache::get_or_add`].
    pub fn try_get_or_add(&self, subpath: &str) -> Option<MemoryFile> {
        self.get_or_add(subpath).ok()
    }

    /// Re-resolves an existing entry in place. Update-only, never an insert.
    pub fn refresh(&self, subpath: &str) -> Result<(), CacheError> {
        let resolver = self.resolver()?;
        let key = web_name(subpath);
        let mut files = self.files.lock();
        if !files.contains_key(&key) {
            return Err(CacheError::NotCached { subpath: key });
        }
        let file = resolver.resolve(subpath)?;
        files.insert(key, file);
        Ok(())
    }

    /// Replaces an existing entry with a pre-built file.
    pub fn refresh_file(&self, subpath: &str, file: MemoryFile) -> Result<(), CacheError> {
        let key = web_name(subpath);
        let mut files = self.files.lock();
        if !files.contains_key(&key) {
            return Err(CacheError::NotCached { subpath: key });
        }
        files.insert(key, file);
        Ok(())
    }

    /// Replaces the content of an existing entry, keeping its MIME type.
    pub fn refresh_buffer(&self, subpath: &str, buffer: Buffer) -> Result<(), CacheError> {
        let key = web_name(subpath);
        let mut files = self.files.lock();
        match files.get_mut(&key) {
            Some(file) => {
                file.content = buffer;
                Ok(())
            }
            None => Err(CacheError::NotCached { subpath: key }),
        }
    }

    pub fn clear(&self) {
        self.files.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.files.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.lock().is_empty()
    }

    /// A snapshot of all cached (subpath, file) pairs, taken under the lock.
    pub fn entries(&self) -> Vec<(String, MemoryFile)> {
        self.files
            .lock()
            .iter()
            .map(|(key, file)| (key.clone(), file.clone()))
            .collect()
    }
}

/// Serves every subpath under a route table from a shared [`FileCache`],
/// lazily populating it through the cache's resolver.
pub struct FolderHandler {
    cache: Arc<FileCache>,
}

impl FolderHandler {
    pub fn new(cache: Arc<FileCache>) -> Self {
        Self { cache }
    }

    /// Installs this handler as the route table's fallback.
    pub fn attach_to(&self, table: &mut PathHandler) {
        let cache = Arc::clone(&self.cache);
        table.set_fallback(handler(move |conn: Connection, subpath: String| {
            let cache = Arc::clone(&cache);
            async move {
                match cache.try_get_or_add(&subpath) {
                    Some(file) => {
                        conn.serve_file(&file).await;
                    }
                    None => {
                        conn.ratio(&subpath).await;
                    }
                }
            }
        }));
    }
}
