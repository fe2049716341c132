//! A sharded, on-disk [`BlobStore`] — the reference backing named in spec
//! §4.3 and §6.2. Grounded on `s5_store_local::LocalStore`'s path-resolution
//! and directory-creation discipline, generalized to content-addressed
//! sharding and write-to-temp-then-rename publication (spec §9: "prefer
//! write-to-temp, rename to give atomic publication per key").

use std::path::{Path as StdPath, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use casfs_core::{CasfsError, CasfsResult, ContentHash};
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::BlobStore;

#[derive(Clone, Debug)]
pub struct LocalBlobStoreConfig {
    pub root: PathBuf,
}

#[derive(Debug)]
pub struct LocalBlobStore {
    root: PathBuf,
}

impl LocalBlobStore {
    pub fn new(config: LocalBlobStoreConfig) -> Self {
        Self { root: config.root }
    }

    /// `/<root>/ab/c1/abc1...` — shards by the first two and next two hex
    /// characters to keep any one directory under ~65k entries at 256M
    /// objects (spec §4.3).
    fn object_path(&self, hash: &ContentHash) -> PathBuf {
        let (a, b) = hash.shard_prefix();
        self.root.join(a).join(b).join(hash.to_hex())
    }

    async fn ensure_parent(path: &StdPath) -> CasfsResult<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| CasfsError::StoreUnavailable(e.into()))?;
        }
        Ok(())
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn write(&self, hash: &ContentHash, bytes: Bytes) -> CasfsResult<()> {
        let final_path = self.object_path(hash);
        Self::ensure_parent(&final_path).await?;

        // Write to a sibling temp file, then rename: concurrent writers of
        // the same hash each publish their own complete object atomically,
        // so no reader ever observes a half-written file.
        let parent = final_path
            .parent()
            .expect("object_path always has a shard parent");
        let mut temp = tempfile::NamedTempFile::new_in(parent)
            .map_err(|e| CasfsError::StoreUnavailable(e.into()))?;
        {
            let file = temp.as_file_mut();
            let mut async_file = tokio::fs::File::from_std(
                file.try_clone()
                    .map_err(|e| CasfsError::StoreUnavailable(e.into()))?,
            );
            async_file
                .write_all(&bytes)
                .await
                .map_err(|e| CasfsError::StoreUnavailable(e.into()))?;
            async_file
                .sync_all()
                .await
                .map_err(|e| CasfsError::StoreUnavailable(e.into()))?;
        }
        temp.persist(&final_path)
            .map_err(|e| CasfsError::StoreUnavailable(e.error.into()))?;
        debug!(hash = %hash, path = %final_path.display(), "published blob");
        Ok(())
    }

    async fn read(&self, hash: &ContentHash) -> CasfsResult<Bytes> {
        let path = self.object_path(hash);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Bytes::from(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(CasfsError::BlobMissing(hash.to_string()))
            }
            Err(e) => Err(CasfsError::StoreUnavailable(e.into())),
        }
    }

    async fn exists(&self, hash: &ContentHash) -> CasfsResult<bool> {
        tokio::fs::try_exists(self.object_path(hash))
            .await
            .map_err(|e| CasfsError::StoreUnavailable(e.into()))
    }

    async fn delete(&self, hash: &ContentHash) -> CasfsResult<()> {
        match tokio::fs::remove_file(self.object_path(hash)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CasfsError::StoreUnavailable(e.into())),
        }
    }
}
