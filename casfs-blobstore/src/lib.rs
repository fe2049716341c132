//! The blob store: content-addressed byte-string storage keyed by
//! [`ContentHash`].
//!
//! `BlobStore` is a capability trait (spec §4.3), the blob-side analogue of
//! `s5_core::store::Store` in this workspace's lineage. [`memory::MemoryBlobStore`]
//! is a `DashMap`-backed reference implementation; [`local::LocalBlobStore`]
//! shards objects on disk by the hash's first two and next two hex
//! characters and publishes each object via write-to-temp-then-rename.

pub mod local;
pub mod memory;

use async_trait::async_trait;
use bytes::Bytes;
use casfs_core::{CasfsResult, ContentHash};

/// Stores and retrieves byte-strings keyed by content hash.
///
/// The store is content-addressed and effectively immutable per key: two
/// writers of the same hash necessarily hold the same bytes, so concurrent
/// `write`s of the same key are safe by construction (spec §4.3, §9 —
/// "the blob store is content-addressed ... write-write races are safe").
#[async_trait]
pub trait BlobStore: std::fmt::Debug + Send + Sync + 'static {
    /// Stores `bytes` under `hash`. Idempotent: writing the same `(hash,
    /// bytes)` twice leaves the store in the same observable state.
    async fn write(&self, hash: &ContentHash, bytes: Bytes) -> CasfsResult<()>;

    /// Returns the bytes stored under `hash`, or
    /// [`casfs_core::CasfsError::BlobMissing`].
    async fn read(&self, hash: &ContentHash) -> CasfsResult<Bytes>;

    /// Presence check without transferring bytes.
    async fn exists(&self, hash: &ContentHash) -> CasfsResult<bool>;

    /// Removes the object at `hash`. Missing is not an error.
    async fn delete(&self, hash: &ContentHash) -> CasfsResult<()>;

    /// Bulk delete. Partial failure returns the hashes that failed; the rest
    /// are still attempted (spec §4.3 — "partial failure returns the set of
    /// failed hashes but does not abort the rest").
    async fn delete_many(&self, hashes: &[ContentHash]) -> Vec<ContentHash> {
        let mut failed = Vec::new();
        for hash in hashes {
            if self.delete(hash).await.is_err() {
                failed.push(*hash);
            }
        }
        failed
    }
}
