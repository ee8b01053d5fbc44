//! Durable blob storage for fragments.
//!
//! The engine consumes storage through the [`StorageBackend`] trait:
//! staging areas for in-flight fragments, durable blob writes, ranged
//! reads, fragment listing, and an atomic publish (rename) that is the
//! only operation allowed to make a fragment visible. A staged fragment
//! that never reaches `publish` is invisible to every reader and can be
//! deleted without coordination.

use crate::error::Result;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Durable storage operations consumed by the engine.
pub trait StorageBackend: Send + Sync + std::fmt::Debug {
    /// Creates a private staging directory for an in-flight fragment.
    fn create_staging(&self, name: &str) -> Result<PathBuf>;

    /// Durably writes a named blob inside `dir`, replacing any previous
    /// content.
    fn write_blob(&self, dir: &Path, name: &str, bytes: &[u8]) -> Result<()>;

    /// Reads a whole named blob from `dir`.
    fn read_blob(&self, dir: &Path, name: &str) -> Result<Vec<u8>>;

    /// Reads `len` bytes of a named blob starting at `offset`.
    fn read_blob_range(&self, dir: &Path, name: &str, offset: u64, len: usize) -> Result<Vec<u8>>;

    /// Size in bytes of a named blob.
    fn blob_size(&self, dir: &Path, name: &str) -> Result<u64>;

    /// Lists published fragment directories as (name, path) pairs, in no
    /// particular order.
    fn list_fragments(&self) -> Result<Vec<(String, PathBuf)>>;

    /// Atomically publishes a staging directory under its final fragment
    /// name, making it visible to `list_fragments`.
    fn publish(&self, staging: &Path, name: &str) -> Result<PathBuf>;

    /// Removes a published fragment directory.
    fn delete_fragment(&self, name: &str) -> Result<()>;

    /// Removes a staging directory that will never be published.
    fn discard_staging(&self, staging: &Path) -> Result<()>;

    /// Durably writes an array-level metadata blob (for example the
    /// schema) at the storage root.
    fn write_meta(&self, name: &str, bytes: &[u8]) -> Result<()>;

    /// Reads an array-level metadata blob from the storage root.
    fn read_meta(&self, name: &str) -> Result<Vec<u8>>;
}

/// Prefix identifying published fragment directories.
const FRAGMENT_PREFIX: &str = "frag_";

/// Directory holding not-yet-published fragments.
const STAGING_DIR: &str = ".staging";

/// Filesystem-backed storage rooted at one array directory.
#[derive(Debug, Clone)]
pub struct DirectoryStorage {
    root: PathBuf,
}

impl DirectoryStorage {
    /// Creates storage rooted at `root`, creating the directory tree.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the directories cannot be created.
    pub fn create(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(root.join(STAGING_DIR))?;
        Ok(Self { root })
    }

    /// Opens storage over an existing array directory.
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(root.join(STAGING_DIR))?;
        Ok(Self { root })
    }

    /// The array root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn write_file(path: &Path, bytes: &[u8]) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        Ok(())
    }
}

impl StorageBackend for DirectoryStorage {
    fn create_staging(&self, name: &str) -> Result<PathBuf> {
        let staging = self.root.join(STAGING_DIR).join(name);
        fs::create_dir_all(&staging)?;
        Ok(staging)
    }

    fn write_blob(&self, dir: &Path, name: &str, bytes: &[u8]) -> Result<()> {
        Self::write_file(&dir.join(name), bytes)
    }

    fn read_blob(&self, dir: &Path, name: &str) -> Result<Vec<u8>> {
        Ok(fs::read(dir.join(name))?)
    }

    fn read_blob_range(&self, dir: &Path, name: &str, offset: u64, len: usize) -> Result<Vec<u8>> {
        let mut file = File::open(dir.join(name))?;
        file.seek(SeekFrom::Start(offset))?;
        let mut buf = vec![0u8; len];
        file.read_exact(&mut buf)?;
        Ok(buf)
    }

    fn blob_size(&self, dir: &Path, name: &str) -> Result<u64> {
        Ok(fs::metadata(dir.join(name))?.len())
    }

    fn list_fragments(&self) -> Result<Vec<(String, PathBuf)>> {
        let mut out = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with(FRAGMENT_PREFIX) {
                out.push((name, entry.path()));
            }
        }
        Ok(out)
    }

    fn publish(&self, staging: &Path, name: &str) -> Result<PathBuf> {
        let target = self.root.join(name);
        fs::rename(staging, &target)?;
        Ok(target)
    }

    fn delete_fragment(&self, name: &str) -> Result<()> {
        fs::remove_dir_all(self.root.join(name))?;
        Ok(())
    }

    fn discard_staging(&self, staging: &Path) -> Result<()> {
        if staging.exists() {
            fs::remove_dir_all(staging)?;
        }
        Ok(())
    }

    fn write_meta(&self, name: &str, bytes: &[u8]) -> Result<()> {
        Self::write_file(&self.root.join(name), bytes)
    }

    fn read_meta(&self, name: &str) -> Result<Vec<u8>> {
        Ok(fs::read(self.root.join(name))?)
    }
}
