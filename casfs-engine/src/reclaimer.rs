//! The orphan reclaimer: a periodic sweep, externally triggered (cron,
//! queue, admin), grounded on `s5_fs::gc::gc_store`'s batch-report
//! structure and generalized from a single-root GC pass to a bounded,
//! repeatable sweep over `MetadataStore::get_orphan_blobs` (spec §4.5).

use std::sync::Arc;

use casfs_blobstore::BlobStore;
use casfs_core::{CasfsResult, ContentHash};
use casfs_metadata::MetadataStore;
use tracing::{info, warn};

/// Summary of one reclaimer pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReclaimReport {
    /// Hashes the metadata store reported as orphaned at the start of the pass.
    pub candidates: usize,
    /// Hashes successfully deleted from the blob store.
    pub deleted: usize,
    /// Hashes that failed to delete and remain orphans, eligible for retry.
    pub failed: Vec<ContentHash>,
}

impl ReclaimReport {
    fn merge(mut self, other: ReclaimReport) -> Self {
        self.candidates += other.candidates;
        self.deleted += other.deleted;
        self.failed.extend(other.failed);
        self
    }
}

/// Sweeps orphan blobs (refcount 0) out of the blob store.
///
/// Race note (spec §4.5, §9): a hash may transition refcount 0 → 1 between
/// the snapshot read and the delete, if a concurrent writer uploads
/// identical content. The engine's write-before-increment ordering means
/// that writer also re-publishes the blob, so a racing delete here is
/// recoverable — the next `blob.exists?` on that hash returns false and the
/// writer writes it again.
pub struct OrphanReclaimer {
    metadata: Arc<dyn MetadataStore>,
    blobs: Arc<dyn BlobStore>,
    batch_size: usize,
}

impl OrphanReclaimer {
    pub fn new(metadata: Arc<dyn MetadataStore>, blobs: Arc<dyn BlobStore>) -> Self {
        Self {
            metadata,
            blobs,
            batch_size: 1000,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// One pass: fetch a bounded, oldest-first batch of orphans and delete
    /// them. Individual delete failures are logged and left for the next
    /// pass (spec §4.5 step 3).
    pub async fn run_once(&self) -> CasfsResult<ReclaimReport> {
        let hashes = self.metadata.get_orphan_blobs(self.batch_size).await?;
        let candidates = hashes.len();
        if hashes.is_empty() {
            return Ok(ReclaimReport::default());
        }

        let failed = self.blobs.delete_many(&hashes).await;
        for hash in &failed {
            warn!(%hash, "failed to delete orphan blob, will retry next pass");
        }

        let failed_set: std::collections::HashSet<_> = failed.iter().copied().collect();
        for hash in &hashes {
            if !failed_set.contains(hash) {
                self.metadata.forget_blob(hash).await?;
            }
        }

        let deleted = candidates - failed.len();
        info!(candidates, deleted, failed = failed.len(), "orphan reclaim pass complete");

        Ok(ReclaimReport {
            candidates,
            deleted,
            failed,
        })
    }

    /// Repeats [`Self::run_once`] until a pass returns fewer candidates than
    /// the batch size, i.e. the orphan set is drained (spec §4.5 step 4 —
    /// "`cleanupInBatches(N)` repeats until a batch returns fewer than N
    /// hashes").
    pub async fn run_until_dry(&self) -> CasfsResult<ReclaimReport> {
        let mut total = ReclaimReport::default();
        loop {
            let pass = self.run_once().await?;
            let exhausted = pass.candidates < self.batch_size;
            total = total.merge(pass);
            if exhausted {
                break;
            }
        }
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use casfs_blobstore::memory::MemoryBlobStore;
    use casfs_metadata::memory::InMemoryMetadataStore;

    #[tokio::test]
    async fn reclaims_orphans_and_leaves_live_blobs() {
        let metadata = Arc::new(InMemoryMetadataStore::new());
        let blobs = Arc::new(MemoryBlobStore::new());

        let orphan = ContentHash::of(b"orphan");
        let live = ContentHash::of(b"live");

        blobs.write(&orphan, Bytes::from_static(b"orphan")).await.unwrap();
        blobs.write(&live, Bytes::from_static(b"live")).await.unwrap();
        metadata.increment_blob_ref_count(&orphan).await.unwrap();
        metadata.decrement_blob_ref_count(&orphan).await.unwrap();
        metadata.increment_blob_ref_count(&live).await.unwrap();

        let reclaimer = OrphanReclaimer::new(metadata, blobs.clone());
        let report = reclaimer.run_once().await.unwrap();

        assert_eq!(report.candidates, 1);
        assert_eq!(report.deleted, 1);
        assert!(report.failed.is_empty());
        assert!(!blobs.exists(&orphan).await.unwrap());
        assert!(blobs.exists(&live).await.unwrap());
    }

    #[tokio::test]
    async fn empty_orphan_set_is_a_no_op() {
        let metadata = Arc::new(InMemoryMetadataStore::new());
        let blobs = Arc::new(MemoryBlobStore::new());
        let reclaimer = OrphanReclaimer::new(metadata, blobs);
        let report = reclaimer.run_once().await.unwrap();
        assert_eq!(report, ReclaimReport::default());
    }

    #[tokio::test]
    async fn run_until_dry_drains_more_than_one_batch() {
        let metadata = Arc::new(InMemoryMetadataStore::new());
        let blobs = Arc::new(MemoryBlobStore::new());

        for i in 0..5u8 {
            let hash = ContentHash::of(&[i]);
            blobs.write(&hash, Bytes::from(vec![i])).await.unwrap();
            metadata.increment_blob_ref_count(&hash).await.unwrap();
            metadata.decrement_blob_ref_count(&hash).await.unwrap();
        }

        let reclaimer = OrphanReclaimer::new(metadata, blobs.clone()).with_batch_size(2);
        let report = reclaimer.run_until_dry().await.unwrap();
        assert_eq!(report.candidates, 5);
        assert_eq!(report.deleted, 5);
    }
}
