//! File resolution: turning a subpath into in-memory file content.
//!
//! Resolvers are composable through [`FileResolverGroup`], which tries its
//! members in registration order and takes the first success. Caching is not
//! this layer's job; see [`crate::cache::FileCache`].

use crate::buffer::{Buffer, MemoryFile};
use crate::mime::web_name;
use parking_lot::Mutex;
use std::fs::File;
use std::io::{Cursor, Read};
use std::path::PathBuf;
use thiserror::Error;
use zip::ZipArchive;

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("no resolver was able to resolve `{subpath}`")]
    NotFound { subpath: String },
    #[error("failed to read `{subpath}`: {source}")]
    Io {
        subpath: String,
        source: std::io::Error,
    },
    #[error("failed to read archive entry `{subpath}`: {source}")]
    Archive {
        subpath: String,
        source: zip::result::ZipError,
    },
}

/// A capability for resolving a subpath into file content with a MIME type.
pub trait FileResolver: Send + Sync {
    /// Resolves the file at the given subpath, failing when it cannot be found.
    fn resolve(&self, subpath: &str) -> Result<MemoryFile, ResolveError>;

    /// Non-failing variant of [`FileResolver::resolve`].
    fn try_resolve(&self, subpath: &str) -> Option<MemoryFile> {
        self.resolve(subpath).ok()
    }
}

/// Resolves files from the operating system's file system, rooted at a base
/// directory.
///
/// Subpaths are confined to the root: `.` and `..` components are resolved
/// away before touching the filesystem, so a subpath can never escape it.
/// Request paths arrive lower-cased, so on a case-sensitive filesystem the
/// served files must have lower-case names.
pub struct SystemResolver {
    root: PathBuf,
}

// Resolves `.` and `..` components against an empty base, yielding a relative
// path that stays inside whatever it is joined onto.
fn confine(subpath: &str) -> PathBuf {
    let mut confined = PathBuf::new();
    for part in subpath.split(['/', '\\']) {
        match part {
            "" | "." => {}
            ".." => {
                confined.pop();
            }
            part => confined.push(part),
        }
    }
    confined
}

impl SystemResolver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &std::path::Path {
        &self.root
    }

    /// A resolver scoped to a subdirectory of this resolver's root.
    pub fn sub_resolver(&self, subdir: &str) -> SystemResolver {
        SystemResolver::new(self.root.join(subdir))
    }
}

impl FileResolver for SystemResolver {
    fn resolve(&self, subpath: &str) -> Result<MemoryFile, ResolveError> {
        let path = self.root.join(confine(subpath));
        if !path.is_file() {
            return Err(ResolveError::NotFound {
                subpath: subpath.to_string(),
            });
        }
        let file = File::open(&path).map_err(|source| ResolveError::Io {
            subpath: subpath.to_string(),
            source,
        })?;
        let buffer = Buffer::from_reader(file, None).map_err(|err| ResolveError::Io {
            subpath: subpath.to_string(),
            source: std::io::Error::other(err),
        })?;
        Ok(MemoryFile::new(buffer, subpath))
    }
}

/// Resolves files from inside an in-memory zip archive, optionally below a
/// root prefix within the archive.
pub struct ZipResolver {
    archive: Mutex<ZipArchive<Cursor<Vec<u8>>>>,
    root: String,
}

impl ZipResolver {
    pub fn new(bytes: Vec<u8>) -> Result<Self, zip::result::ZipError> {
        Ok(Self {
            archive: Mutex::new(ZipArchive::new(Cursor::new(bytes))?),
            root: String::new(),
        })
    }

    pub fn with_root(bytes: Vec<u8>, root: &str) -> Result<Self, zip::result::ZipError> {
        let mut resolver = Self::new(bytes)?;
        resolver.set_root(root);
        Ok(resolver)
    }

    /// Sets the in-archive root prefix, normalized to `dir/` form.
    pub fn set_root(&mut self, root: &str) {
        let root = web_name(root);
        let root = root.trim_matches('/');
        self.root = if root.is_empty() {
            String::new()
        } else {
            format!("{root}/")
        };
    }

    pub fn root(&self) -> &str {
        &self.root
    }
}

impl FileResolver for ZipResolver {
    fn resolve(&self, subpath: &str) -> Result<MemoryFile, ResolveError> {
        let want = format!("{}{}", self.root, web_name(subpath));
        let mut archive = self.archive.lock();

        // Entry names inside zips vary in case and separator style, so match
        // on the normalized form rather than asking the archive by exact name.
        let name = archive
            .file_names()
            .find(|name| !name.ends_with('/') && web_name(name) == want)
            .map(str::to_owned)
            .ok_or_else(|| ResolveError::NotFound {
                subpath: subpath.to_string(),
            })?;

        let mut entry = archive
            .by_name(&name)
            .map_err(|source| ResolveError::Archive {
                subpath: subpath.to_string(),
                source,
            })?;
        let mut bytes = Vec::with_capacity(entry.size() as usize);
        entry
            .read_to_end(&mut bytes)
            .map_err(|source| ResolveError::Io {
                subpath: subpath.to_string(),
                source,
            })?;
        Ok(MemoryFile::new(Buffer::new(bytes), &want))
    }
}

/// An ordered group of resolvers tried as fallbacks, first success wins.
#[derive(Default)]
pub struct FileResolverGroup {
    resolvers: Vec<Box<dyn FileResolver>>,
}

impl FileResolverGroup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a resolver; members are consulted in registration order.
    pub fn add(&mut self, resolver: impl FileResolver + 'static) -> &mut Self {
        self.resolvers.push(Box::new(resolver));
        self
    }

    pub fn clear(&mut self) {
        self.resolvers.clear();
    }

    pub fn len(&self) -> usize {
        self.resolvers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resolvers.is_empty()
    }
}

impl FileResolver for FileResolverGroup {
    fn resolve(&self, subpath: &str) -> Result<MemoryFile, ResolveError> {
        self.try_resolve(subpath)
            .ok_or_else(|| ResolveError::NotFound {
                subpath: subpath.to_string(),
            })
    }

    fn try_resolve(&self, subpath: &str) -> Option<MemoryFile> {
        self.resolvers
            .iter()
            .find_map(|resolver| resolver.try_resolve(subpath))
    }
}
