//! # Reference-Counted Blob Store
//!
//! [`BlobStore`] pairs a [`Backend`] with an index of reference counts.
//! Every count change happens under the index lock, so concurrent stores of
//! identical bytes converge on one physical copy whose count equals the
//! number of stores.
//!
//! Garbage collection is deferred: [`BlobStore::release`] only drops the
//! count, and [`BlobStore::collect_garbage`] later deletes every blob whose
//! count is zero. A blob that is stored again before collection is revived
//! in place without rewriting its bytes.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use depot_core::{BlobDigest, BlobHashes};
use parking_lot::Mutex;
use subtle::ConstantTimeEq;

use crate::backend::Backend;
use crate::error::BlobError;

#[derive(Debug, Clone)]
struct BlobEntry {
    size: u64,
    hashes: BlobHashes,
    ref_count: u64,
    created_at: DateTime<Utc>,
}

impl BlobEntry {
    fn record(&self, digest: BlobDigest) -> BlobRecord {
        BlobRecord {
            digest,
            size: self.size,
            hashes: self.hashes.clone(),
            ref_count: self.ref_count,
            created_at: self.created_at,
        }
    }
}

/// Snapshot of a blob's index entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobRecord {
    pub digest: BlobDigest,
    pub size: u64,
    pub hashes: BlobHashes,
    /// Reference count at the time of the snapshot.
    pub ref_count: u64,
    pub created_at: DateTime<Utc>,
}

/// Content-addressed, deduplicating blob store.
///
/// Cloning is cheap and clones share state.
#[derive(Debug, Clone)]
pub struct BlobStore {
    backend: Backend,
    index: Arc<Mutex<HashMap<BlobDigest, BlobEntry>>>,
}

impl BlobStore {
    /// A store holding blobs in process memory.
    pub fn in_memory() -> Self {
        Self::with_backend(Backend::memory())
    }

    /// A store holding blobs under `root` on the local filesystem.
    pub fn filesystem(root: impl Into<PathBuf>) -> Self {
        Self::with_backend(Backend::filesystem(root))
    }

    pub fn with_backend(backend: Backend) -> Self {
        Self {
            backend,
            index: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Store `data`, taking one reference on its blob.
    ///
    /// Bytes already present (including a zero-count blob awaiting
    /// collection) are not written again; only the count is incremented.
    pub fn store(&self, data: &[u8]) -> Result<BlobRecord, BlobError> {
        let (digest, hashes) = BlobHashes::compute(data);

        if let Some(record) = self.try_reference(&digest) {
            return Ok(record);
        }

        // Write outside the lock; the backend write is create-if-absent.
        let written = self.backend.write(&digest, data)?;

        let mut index = self.index.lock();
        match index.entry(digest) {
            Entry::Occupied(mut occupied) => {
                let entry = occupied.get_mut();
                entry.ref_count += 1;
                metrics::counter!("depot_blob_dedup_total").increment(1);
                Ok(entry.record(digest))
            }
            Entry::Vacant(vacant) => {
                // A collection pass may have removed the copy between the
                // write and taking the lock.
                if !self.backend.exists(&digest) {
                    self.backend.write(&digest, data)?;
                }
                let entry = vacant.insert(BlobEntry {
                    size: data.len() as u64,
                    hashes,
                    ref_count: 1,
                    created_at: Utc::now(),
                });
                tracing::debug!(digest = %digest, size = entry.size, written, "blob stored");
                Ok(entry.record(digest))
            }
        }
    }

    /// Store `data` and hold the new reference in a [`BlobLease`].
    ///
    /// The reference is released when the lease is dropped unless
    /// [`BlobLease::keep`] was called first.
    pub fn store_leased(&self, data: &[u8]) -> Result<BlobLease, BlobError> {
        let record = self.store(data)?;
        Ok(BlobLease {
            store: self.clone(),
            record,
            kept: false,
        })
    }

    fn try_reference(&self, digest: &BlobDigest) -> Option<BlobRecord> {
        let mut index = self.index.lock();
        let entry = index.get_mut(digest)?;
        entry.ref_count += 1;
        metrics::counter!("depot_blob_dedup_total").increment(1);
        Some(entry.record(*digest))
    }

    /// Read a blob, verifying that its bytes still hash to `digest`.
    pub fn fetch(&self, digest: &BlobDigest) -> Result<Vec<u8>, BlobError> {
        let data = self
            .backend
            .read(digest)?
            .ok_or(BlobError::NotFound(*digest))?;
        let actual = BlobDigest::of(&data);
        if !bool::from(actual.as_bytes().ct_eq(digest.as_bytes())) {
            tracing::error!(expected = %digest, actual = %actual, "blob integrity violation");
            return Err(BlobError::Integrity {
                expected: *digest,
                actual,
            });
        }
        Ok(data)
    }

    /// Drop one reference. Returns the remaining count.
    ///
    /// A blob at zero stays on disk until the next [`Self::collect_garbage`].
    pub fn release(&self, digest: &BlobDigest) -> Result<u64, BlobError> {
        let mut index = self.index.lock();
        let entry = index.get_mut(digest).ok_or(BlobError::NotFound(*digest))?;
        entry.ref_count = entry.ref_count.saturating_sub(1);
        Ok(entry.ref_count)
    }

    /// Delete every blob with no remaining references. Returns how many were removed.
    ///
    /// Deletion happens under the index lock so a concurrent store cannot
    /// revive a blob whose bytes are being removed.
    pub fn collect_garbage(&self) -> usize {
        let mut index = self.index.lock();
        let unreferenced: Vec<BlobDigest> = index
            .iter()
            .filter(|(_, entry)| entry.ref_count == 0)
            .map(|(digest, _)| *digest)
            .collect();

        let mut removed = 0;
        for digest in unreferenced {
            match self.backend.delete(&digest) {
                Ok(()) => {
                    index.remove(&digest);
                    removed += 1;
                }
                Err(e) => {
                    tracing::warn!(digest = %digest, error = %e, "failed to delete unreferenced blob");
                }
            }
        }
        if removed > 0 {
            tracing::info!(removed, "blob garbage collection complete");
        }
        removed
    }

    /// Re-register a reference to a blob already present in the backend.
    ///
    /// Used when rebuilding the index from persisted catalog rows.
    pub fn restore(&self, digest: &BlobDigest, size: u64, hashes: BlobHashes) -> Result<u64, BlobError> {
        let mut index = self.index.lock();
        match index.entry(*digest) {
            Entry::Occupied(mut occupied) => {
                let entry = occupied.get_mut();
                entry.ref_count += 1;
                Ok(entry.ref_count)
            }
            Entry::Vacant(vacant) => {
                if !self.backend.exists(digest) {
                    return Err(BlobError::NotFound(*digest));
                }
                vacant.insert(BlobEntry {
                    size,
                    hashes,
                    ref_count: 1,
                    created_at: Utc::now(),
                });
                Ok(1)
            }
        }
    }

    /// Current reference count, or `None` for an unknown digest.
    pub fn ref_count(&self, digest: &BlobDigest) -> Option<u64> {
        self.index.lock().get(digest).map(|e| e.ref_count)
    }

    /// Snapshot of a blob's index entry.
    pub fn record(&self, digest: &BlobDigest) -> Option<BlobRecord> {
        self.index.lock().get(digest).map(|e| e.record(*digest))
    }

    /// Whether the blob is indexed and physically present.
    pub fn contains(&self, digest: &BlobDigest) -> bool {
        self.index.lock().contains_key(digest) && self.backend.exists(digest)
    }

    /// Number of indexed blobs, including zero-count blobs awaiting collection.
    pub fn len(&self) -> usize {
        self.index.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[cfg(test)]
    pub(crate) fn backend(&self) -> &Backend {
        &self.backend
    }
}

/// A blob reference that is released on drop unless kept.
#[derive(Debug)]
#[must_use = "dropping a lease releases the blob reference"]
pub struct BlobLease {
    store: BlobStore,
    record: BlobRecord,
    kept: bool,
}

impl BlobLease {
    /// The stored blob.
    pub fn record(&self) -> &BlobRecord {
        &self.record
    }

    /// Keep the reference permanently and return the blob record.
    pub fn keep(mut self) -> BlobRecord {
        self.kept = true;
        self.record.clone()
    }
}

impl Drop for BlobLease {
    fn drop(&mut self) {
        if self.kept {
            return;
        }
        match self.store.release(&self.record.digest) {
            Ok(remaining) => {
                tracing::debug!(digest = %self.record.digest, remaining, "blob lease released");
            }
            Err(e) => {
                tracing::warn!(digest = %self.record.digest, error = %e, "failed to release blob lease");
            }
        }
    }
}
