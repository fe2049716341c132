//! Conformance test suites for [`casfs_blobstore::BlobStore`] and
//! [`casfs_metadata::MetadataStore`] implementations, in the style of
//! `s5_core::testutil::StoreTests` in this workspace's lineage: a struct
//! wrapping a borrowed store reference, one `test_*` method per contract
//! clause, and a `run_all` that exercises all of them in sequence.
//!
//! ```ignore
//! use casfs_testkit::BlobStoreTests;
//!
//! #[tokio::test]
//! async fn conforms() {
//!     let store = MyBlobStore::new(...);
//!     BlobStoreTests::new(&store).run_all().await.unwrap();
//! }
//! ```

pub mod blobstore;
pub mod metadata;

pub use blobstore::BlobStoreTests;
pub use metadata::MetadataStoreTests;

#[cfg(test)]
mod conformance {
    use super::*;
    use casfs_blobstore::local::{LocalBlobStore, LocalBlobStoreConfig};
    use casfs_blobstore::memory::MemoryBlobStore;
    use casfs_metadata::memory::InMemoryMetadataStore;
    use casfs_metadata::sqlite::{SqliteMetadataConfig, SqliteMetadataStore};

    #[tokio::test]
    async fn memory_blob_store_conforms() {
        let store = MemoryBlobStore::new();
        BlobStoreTests::new(&store).run_all().await.unwrap();
    }

    #[tokio::test]
    async fn local_blob_store_conforms() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalBlobStore::new(LocalBlobStoreConfig {
            root: dir.path().to_path_buf(),
        });
        BlobStoreTests::new(&store).run_all().await.unwrap();
    }

    #[tokio::test]
    async fn in_memory_metadata_store_conforms() {
        let store = InMemoryMetadataStore::new();
        MetadataStoreTests::new(&store).run_all().await.unwrap();
    }

    #[tokio::test]
    async fn sqlite_metadata_store_conforms() {
        let store = SqliteMetadataStore::connect(SqliteMetadataConfig::default())
            .await
            .unwrap();
        MetadataStoreTests::new(&store).run_all().await.unwrap();
    }
}
