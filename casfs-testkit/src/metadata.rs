//! Conformance tests for [`MetadataStore`] (spec §4.2).

use casfs_core::{CasfsError, CasfsResult, ContentHash, Path, TenantId};
use casfs_metadata::{DirectoryNode, FileNode, MetadataStore, Node};
use chrono::Utc;
use uuid::Uuid;

pub struct MetadataStoreTests<'a, S> {
    store: &'a S,
}

fn tenant() -> TenantId {
    TenantId::new(Uuid::new_v4())
}

fn dir(path: &str) -> Node {
    Node::Directory(DirectoryNode {
        path: Path::parse(path).unwrap(),
        created_at: Utc::now(),
        modified_at: Utc::now(),
    })
}

fn file(path: &str, hash: ContentHash) -> Node {
    Node::File(FileNode {
        path: Path::parse(path).unwrap(),
        hash,
        size: 4,
        mime_type: "application/octet-stream".into(),
        created_at: Utc::now(),
        modified_at: Utc::now(),
    })
}

impl<'a, S: MetadataStore> MetadataStoreTests<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    pub async fn run_all(&self) -> CasfsResult<()> {
        self.test_create_then_get().await?;
        self.test_create_rejects_duplicate().await?;
        self.test_update_is_noop_when_missing().await?;
        self.test_delete_is_idempotent().await?;
        self.test_list_children_orders_directories_first().await?;
        self.test_tenant_isolation().await?;
        self.test_refcount_lifecycle().await?;
        self.test_decrement_below_zero_is_invariant().await?;
        self.test_orphans_ordered_oldest_first().await?;
        Ok(())
    }

    pub async fn test_create_then_get(&self) -> CasfsResult<()> {
        let t = tenant();
        self.store.create_node(&t, dir("/")).await?;
        let got = self.store.get_node_by_path(&t, &Path::parse("/")?).await?;
        assert!(got.unwrap().is_directory());
        Ok(())
    }

    pub async fn test_create_rejects_duplicate(&self) -> CasfsResult<()> {
        let t = tenant();
        self.store.create_node(&t, dir("/")).await?;
        let err = self.store.create_node(&t, dir("/")).await.unwrap_err();
        assert!(matches!(err, CasfsError::Conflict(_)));
        Ok(())
    }

    pub async fn test_update_is_noop_when_missing(&self) -> CasfsResult<()> {
        let t = tenant();
        // No row exists at "/never-created"; update must not error.
        self.store
            .update_node(&t, dir("/never-created"))
            .await?;
        Ok(())
    }

    pub async fn test_delete_is_idempotent(&self) -> CasfsResult<()> {
        let t = tenant();
        self.store.create_node(&t, dir("/")).await?;
        self.store.delete_node(&t, &Path::parse("/")?).await?;
        // Deleting an absent path is not an error at this layer.
        self.store.delete_node(&t, &Path::parse("/")?).await?;
        Ok(())
    }

    pub async fn test_list_children_orders_directories_first(&self) -> CasfsResult<()> {
        let t = tenant();
        self.store.create_node(&t, dir("/")).await?;
        self.store.create_node(&t, dir("/z-dir")).await?;
        self.store
            .create_node(&t, file("/a-file", ContentHash::of(b"conformance")))
            .await?;

        let children = self.store.list_children(&t, &Path::parse("/")?).await?;
        let paths: Vec<&str> = children.iter().map(|n| n.path().as_str()).collect();
        assert_eq!(paths, vec!["/z-dir", "/a-file"]);
        Ok(())
    }

    pub async fn test_tenant_isolation(&self) -> CasfsResult<()> {
        let t1 = tenant();
        let t2 = tenant();
        self.store.create_node(&t1, dir("/isolated")).await?;
        let seen_by_other = self
            .store
            .get_node_by_path(&t2, &Path::parse("/isolated")?)
            .await?;
        assert!(seen_by_other.is_none());
        Ok(())
    }

    pub async fn test_refcount_lifecycle(&self) -> CasfsResult<()> {
        let hash = ContentHash::of(b"conformance: refcount lifecycle");
        self.store.increment_blob_ref_count(&hash).await?;
        self.store.increment_blob_ref_count(&hash).await?;
        let n = self.store.decrement_blob_ref_count(&hash).await?;
        assert_eq!(n, 1);
        let n = self.store.decrement_blob_ref_count(&hash).await?;
        assert_eq!(n, 0);
        Ok(())
    }

    pub async fn test_decrement_below_zero_is_invariant(&self) -> CasfsResult<()> {
        let hash = ContentHash::of(b"conformance: never incremented");
        // Missing row: not an error, returns 0.
        assert_eq!(self.store.decrement_blob_ref_count(&hash).await?, 0);

        let hash = ContentHash::of(b"conformance: decremented twice");
        self.store.increment_blob_ref_count(&hash).await?;
        self.store.decrement_blob_ref_count(&hash).await?;
        let err = self.store.decrement_blob_ref_count(&hash).await.unwrap_err();
        assert!(matches!(err, CasfsError::Invariant(_)));
        Ok(())
    }

    pub async fn test_orphans_ordered_oldest_first(&self) -> CasfsResult<()> {
        let h1 = ContentHash::of(b"conformance: orphan one");
        let h2 = ContentHash::of(b"conformance: orphan two");
        self.store.increment_blob_ref_count(&h1).await?;
        self.store.decrement_blob_ref_count(&h1).await?;
        self.store.increment_blob_ref_count(&h2).await?;
        self.store.decrement_blob_ref_count(&h2).await?;

        let orphans = self.store.get_orphan_blobs(1000).await?;
        let h1_idx = orphans.iter().position(|h| h == &h1);
        let h2_idx = orphans.iter().position(|h| h == &h2);
        if let (Some(a), Some(b)) = (h1_idx, h2_idx) {
            assert!(a < b, "orphans must be ordered oldest-first");
        }
        Ok(())
    }
}
