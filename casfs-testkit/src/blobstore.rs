//! Conformance tests for [`BlobStore`] (spec §4.3).

use bytes::Bytes;
use casfs_blobstore::BlobStore;
use casfs_core::{CasfsError, CasfsResult, ContentHash};

pub struct BlobStoreTests<'a, S> {
    store: &'a S,
}

impl<'a, S: BlobStore> BlobStoreTests<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    pub async fn run_all(&self) -> CasfsResult<()> {
        self.test_write_then_read().await?;
        self.test_read_missing_is_blob_missing().await?;
        self.test_exists().await?;
        self.test_write_is_idempotent().await?;
        self.test_delete_is_idempotent().await?;
        self.test_delete_many_reports_partial_failure().await?;
        Ok(())
    }

    pub async fn test_write_then_read(&self) -> CasfsResult<()> {
        let hash = ContentHash::of(b"conformance: write then read");
        self.store.write(&hash, Bytes::from_static(b"conformance: write then read")).await?;
        let bytes = self.store.read(&hash).await?;
        assert_eq!(bytes.as_ref(), b"conformance: write then read");
        Ok(())
    }

    pub async fn test_read_missing_is_blob_missing(&self) -> CasfsResult<()> {
        let hash = ContentHash::of(b"conformance: never written");
        let err = self.store.read(&hash).await.unwrap_err();
        assert!(matches!(err, CasfsError::BlobMissing(_)));
        Ok(())
    }

    pub async fn test_exists(&self) -> CasfsResult<()> {
        let hash = ContentHash::of(b"conformance: exists");
        assert!(!self.store.exists(&hash).await?);
        self.store.write(&hash, Bytes::from_static(b"conformance: exists")).await?;
        assert!(self.store.exists(&hash).await?);
        Ok(())
    }

    /// Writing the same `(hash, bytes)` twice must leave the store in the
    /// same observable state (spec §4.3).
    pub async fn test_write_is_idempotent(&self) -> CasfsResult<()> {
        let hash = ContentHash::of(b"conformance: idempotent write");
        self.store.write(&hash, Bytes::from_static(b"conformance: idempotent write")).await?;
        self.store.write(&hash, Bytes::from_static(b"conformance: idempotent write")).await?;
        let bytes = self.store.read(&hash).await?;
        assert_eq!(bytes.as_ref(), b"conformance: idempotent write");
        Ok(())
    }

    pub async fn test_delete_is_idempotent(&self) -> CasfsResult<()> {
        let hash = ContentHash::of(b"conformance: delete");
        self.store.write(&hash, Bytes::from_static(b"conformance: delete")).await?;
        self.store.delete(&hash).await?;
        assert!(!self.store.exists(&hash).await?);
        // Deleting an absent hash is not an error.
        self.store.delete(&hash).await?;
        Ok(())
    }

    pub async fn test_delete_many_reports_partial_failure(&self) -> CasfsResult<()> {
        let present = ContentHash::of(b"conformance: delete_many present");
        let absent = ContentHash::of(b"conformance: delete_many absent");
        self.store
            .write(&present, Bytes::from_static(b"conformance: delete_many present"))
            .await?;

        let failed = self.store.delete_many(&[present, absent]).await;
        assert!(failed.is_empty(), "deleting an absent hash is not a failure");
        assert!(!self.store.exists(&present).await?);
        Ok(())
    }
}
