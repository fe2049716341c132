//! An in-memory [`BlobStore`], the reference backing used throughout the
//! engine's own test suite — modeled on `s5_store_memory::MemoryStore` in
//! this workspace's lineage.

use async_trait::async_trait;
use bytes::Bytes;
use casfs_core::{CasfsError, CasfsResult, ContentHash};
use dashmap::DashMap;

use crate::BlobStore;

#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    objects: DashMap<ContentHash, Bytes>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn write(&self, hash: &ContentHash, bytes: Bytes) -> CasfsResult<()> {
        self.objects.insert(*hash, bytes);
        Ok(())
    }

    async fn read(&self, hash: &ContentHash) -> CasfsResult<Bytes> {
        self.objects
            .get(hash)
            .map(|b| b.clone())
            .ok_or_else(|| CasfsError::BlobMissing(hash.to_string()))
    }

    async fn exists(&self, hash: &ContentHash) -> CasfsResult<bool> {
        Ok(self.objects.contains_key(hash))
    }

    async fn delete(&self, hash: &ContentHash) -> CasfsResult<()> {
        self.objects.remove(hash);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn write_then_read_round_trips() {
        let store = MemoryBlobStore::new();
        let hash = ContentHash::of(b"hello");
        store.write(&hash, Bytes::from_static(b"hello")).await.unwrap();
        assert_eq!(store.read(&hash).await.unwrap(), Bytes::from_static(b"hello"));
    }

    #[tokio::test]
    async fn read_missing_is_blob_missing() {
        let store = MemoryBlobStore::new();
        let hash = ContentHash::of(b"nope");
        let err = store.read(&hash).await.unwrap_err();
        assert!(matches!(err, CasfsError::BlobMissing(_)));
    }

    #[tokio::test]
    async fn delete_missing_is_not_an_error() {
        let store = MemoryBlobStore::new();
        let hash = ContentHash::of(b"nope");
        store.delete(&hash).await.unwrap();
    }

    #[tokio::test]
    async fn delete_many_reports_failures_without_aborting() {
        let store = MemoryBlobStore::new();
        let present = ContentHash::of(b"present");
        store.write(&present, Bytes::from_static(b"present")).await.unwrap();
        let absent = ContentHash::of(b"absent");

        let failed = store.delete_many(&[present, absent]).await;
        assert!(failed.is_empty());
        assert!(!store.exists(&present).await.unwrap());
    }
}
