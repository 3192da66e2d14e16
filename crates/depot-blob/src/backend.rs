//! # Blob Backends
//!
//! Physical byte storage behind [`crate::BlobStore`]. Backends know nothing
//! about reference counts; they only write, read and delete whole blobs.

use std::collections::HashMap;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use depot_core::BlobDigest;
use parking_lot::RwLock;

/// Where blob bytes live.
#[derive(Clone)]
pub enum Backend {
    /// Process memory. Contents are lost on restart.
    Memory(Arc<RwLock<HashMap<BlobDigest, Arc<[u8]>>>>),
    /// A directory tree sharded by the first two digest bytes.
    Filesystem(PathBuf),
}

impl std::fmt::Debug for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Memory(blobs) => f
                .debug_struct("Memory")
                .field("blobs", &blobs.read().len())
                .finish(),
            Self::Filesystem(root) => f.debug_tuple("Filesystem").field(root).finish(),
        }
    }
}

impl Backend {
    /// An empty in-memory backend.
    pub fn memory() -> Self {
        Self::Memory(Arc::new(RwLock::new(HashMap::new())))
    }

    /// A filesystem backend rooted at `root`. The directory is created on demand.
    pub fn filesystem(root: impl Into<PathBuf>) -> Self {
        Self::Filesystem(root.into())
    }

    /// Path of a blob on the filesystem backend: `{root}/ab/cd/abcd…`.
    pub fn blob_path(root: &Path, digest: &BlobDigest) -> PathBuf {
        let hex = digest.to_hex();
        root.join(&hex[0..2]).join(&hex[2..4]).join(hex)
    }

    /// Write `data` under `digest` unless a copy already exists.
    ///
    /// Returns `true` if bytes were written, `false` if an existing copy was kept.
    pub fn write(&self, digest: &BlobDigest, data: &[u8]) -> std::io::Result<bool> {
        match self {
            Self::Memory(blobs) => {
                let mut blobs = blobs.write();
                if blobs.contains_key(digest) {
                    return Ok(false);
                }
                blobs.insert(*digest, Arc::from(data));
                Ok(true)
            }
            Self::Filesystem(root) => {
                let path = Self::blob_path(root, digest);
                if path.exists() {
                    return Ok(false);
                }
                let dir = path.parent().unwrap_or(root);
                std::fs::create_dir_all(dir)?;
                let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
                tmp.write_all(data)?;
                tmp.as_file().sync_all()?;
                match tmp.persist_noclobber(&path) {
                    Ok(_) => Ok(true),
                    Err(e) if e.error.kind() == ErrorKind::AlreadyExists => Ok(false),
                    Err(e) => Err(e.error),
                }
            }
        }
    }

    /// Read a blob, or `None` if no copy exists.
    pub fn read(&self, digest: &BlobDigest) -> std::io::Result<Option<Vec<u8>>> {
        match self {
            Self::Memory(blobs) => Ok(blobs.read().get(digest).map(|b| b.to_vec())),
            Self::Filesystem(root) => match std::fs::read(Self::blob_path(root, digest)) {
                Ok(bytes) => Ok(Some(bytes)),
                Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
                Err(e) => Err(e),
            },
        }
    }

    /// Whether a physical copy exists.
    pub fn exists(&self, digest: &BlobDigest) -> bool {
        match self {
            Self::Memory(blobs) => blobs.read().contains_key(digest),
            Self::Filesystem(root) => Self::blob_path(root, digest).is_file(),
        }
    }

    /// Delete a blob. Deleting a missing blob is not an error.
    pub fn delete(&self, digest: &BlobDigest) -> std::io::Result<()> {
        match self {
            Self::Memory(blobs) => {
                blobs.write().remove(digest);
                Ok(())
            }
            Self::Filesystem(root) => match std::fs::remove_file(Self::blob_path(root, digest)) {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
                Err(e) => Err(e),
            },
        }
    }

    /// Overwrite a stored blob in place. Test-only corruption hook.
    #[cfg(test)]
    pub(crate) fn tamper(&self, digest: &BlobDigest, data: &[u8]) -> std::io::Result<()> {
        match self {
            Self::Memory(blobs) => {
                blobs.write().insert(*digest, Arc::from(data));
                Ok(())
            }
            Self::Filesystem(root) => std::fs::write(Self::blob_path(root, digest), data),
        }
    }
}
