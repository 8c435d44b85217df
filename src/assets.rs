//! Read-only asset stores.
//!
//! Models ship as a pair of files inside an asset bundle, addressed by
//! relative path. `DirectoryAssets` serves a bundle unpacked on disk;
//! `MemoryAssets` serves bytes compiled in or built by tests.

use std::collections::HashMap;
use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::{Component, Path, PathBuf};

use crate::error::{Error, Result};

/// Read-only bundle of files addressed by relative path.
pub trait AssetSource: Send + Sync {
    /// Human-readable description for logs.
    fn describe(&self) -> String;

    /// Read a whole asset into memory.
    fn read(&self, path: &str) -> Result<Vec<u8>>;

    fn exists(&self, path: &str) -> bool {
        self.read(path).is_ok()
    }
}

/// Assets rooted at a directory on disk.
#[derive(Clone, Debug)]
pub struct DirectoryAssets {
    root: PathBuf,
}

impl DirectoryAssets {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> Result<PathBuf> {
        let relative = sanitize_asset_path(path)?;
        Ok(self.root.join(relative))
    }
}

impl AssetSource for DirectoryAssets {
    fn describe(&self) -> String {
        format!("dir:{}", self.root.display())
    }

    fn read(&self, path: &str) -> Result<Vec<u8>> {
        let full = self.resolve(path)?;
        if full.is_dir() {
            return Err(Error::AssetNotFound(path.to_string()));
        }
        read_file(&full).map_err(|source| match source.kind() {
            ErrorKind::NotFound => Error::AssetNotFound(path.to_string()),
            _ => Error::Io { path: full, source },
        })
    }

    fn exists(&self, path: &str) -> bool {
        self.resolve(path).map(|p| p.is_file()).unwrap_or(false)
    }
}

/// Assets held in memory, keyed by normalized relative path.
#[derive(Clone, Debug, Default)]
pub struct MemoryAssets {
    files: HashMap<String, Vec<u8>>,
}

impl MemoryAssets {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace an asset.
    pub fn insert(&mut self, path: &str, bytes: impl Into<Vec<u8>>) -> Result<()> {
        let key = normalize_key(path)?;
        self.files.insert(key, bytes.into());
        Ok(())
    }

    pub fn with(mut self, path: &str, bytes: impl Into<Vec<u8>>) -> Result<Self> {
        self.insert(path, bytes)?;
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl AssetSource for MemoryAssets {
    fn describe(&self) -> String {
        format!("memory:{} files", self.files.len())
    }

    fn read(&self, path: &str) -> Result<Vec<u8>> {
        let key = normalize_key(path)?;
        self.files
            .get(&key)
            .cloned()
            .ok_or_else(|| Error::AssetNotFound(path.to_string()))
    }
}

/// Validate a bundle-relative path. Absolute paths and `..` are rejected so
/// a caller cannot read outside the bundle.
pub fn sanitize_asset_path(path: &str) -> Result<PathBuf> {
    let trimmed = path.trim();
    if trimmed.is_empty() {
        return Err(Error::InvalidAssetPath(path.to_string()));
    }
    let mut clean = PathBuf::new();
    for component in Path::new(trimmed).components() {
        match component {
            Component::Normal(part) => clean.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(Error::InvalidAssetPath(path.to_string()));
            }
        }
    }
    if clean.as_os_str().is_empty() {
        return Err(Error::InvalidAssetPath(path.to_string()));
    }
    Ok(clean)
}

fn normalize_key(path: &str) -> Result<String> {
    let clean = sanitize_asset_path(path)?;
    let parts: Vec<String> = clean
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    Ok(parts.join("/"))
}

fn read_file(path: &Path) -> std::io::Result<Vec<u8>> {
    let mut file = File::open(path)?;
    let mut buf = Vec::new();
    file.read_to_end(&mut buf)?;
    Ok(buf)
}
