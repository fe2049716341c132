//! An in-memory [`MetadataStore`], the reference backing used throughout
//! the engine's own test suite — the metadata-side analogue of
//! `s5_store_memory::MemoryStore` in this workspace's blob-store layer.

use async_trait::async_trait;
use casfs_core::{CasfsError, CasfsResult, ContentHash, Path, TenantId};
use chrono::Utc;
use dashmap::DashMap;

use crate::{BlobRecord, MetadataStore, Node};

#[derive(Debug, Default)]
pub struct InMemoryMetadataStore {
    nodes: DashMap<(TenantId, Path), Node>,
    blobs: DashMap<ContentHash, BlobRecord>,
}

impl InMemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MetadataStore for InMemoryMetadataStore {
    async fn create_node(&self, tenant: &TenantId, node: Node) -> CasfsResult<()> {
        let key = (*tenant, node.path().clone());
        match self.nodes.entry(key) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(CasfsError::Conflict(format!(
                "node already exists at {}",
                node.path()
            ))),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(node);
                Ok(())
            }
        }
    }

    async fn get_node_by_path(&self, tenant: &TenantId, path: &Path) -> CasfsResult<Option<Node>> {
        Ok(self.nodes.get(&(*tenant, path.clone())).map(|n| n.clone()))
    }

    async fn update_node(&self, tenant: &TenantId, node: Node) -> CasfsResult<()> {
        let key = (*tenant, node.path().clone());
        if let Some(mut slot) = self.nodes.get_mut(&key) {
            *slot = node;
        }
        Ok(())
    }

    async fn delete_node(&self, tenant: &TenantId, path: &Path) -> CasfsResult<()> {
        self.nodes.remove(&(*tenant, path.clone()));
        Ok(())
    }

    async fn list_children(&self, tenant: &TenantId, directory: &Path) -> CasfsResult<Vec<Node>> {
        let mut children: Vec<Node> = self
            .nodes
            .iter()
            .filter(|entry| {
                let (node_tenant, node_path) = entry.key();
                node_tenant == tenant && node_path.is_immediate_child_of(directory)
            })
            .map(|entry| entry.value().clone())
            .collect();

        children.sort_by(|a, b| {
            let dir_rank = |n: &Node| if n.is_directory() { 0 } else { 1 };
            dir_rank(a)
                .cmp(&dir_rank(b))
                .then_with(|| a.path().as_str().cmp(b.path().as_str()))
        });

        Ok(children)
    }

    async fn increment_blob_ref_count(&self, hash: &ContentHash) -> CasfsResult<()> {
        let now = Utc::now();
        self.blobs
            .entry(*hash)
            .and_modify(|record| {
                record.reference_count += 1;
                record.last_accessed_at = now;
            })
            .or_insert_with(|| BlobRecord {
                reference_count: 1,
                size: 0,
                created_at: now,
                last_accessed_at: now,
            });
        Ok(())
    }

    async fn decrement_blob_ref_count(&self, hash: &ContentHash) -> CasfsResult<u64> {
        let Some(mut record) = self.blobs.get_mut(hash) else {
            return Ok(0);
        };
        let Some(next) = record.reference_count.checked_sub(1) else {
            return Err(CasfsError::Invariant(format!(
                "refcount for {hash} would go negative"
            )));
        };
        record.reference_count = next;
        Ok(next)
    }

    async fn get_orphan_blobs(&self, limit: usize) -> CasfsResult<Vec<ContentHash>> {
        let mut orphans: Vec<(ContentHash, chrono::DateTime<Utc>)> = self
            .blobs
            .iter()
            .filter(|entry| entry.value().reference_count == 0)
            .map(|entry| (*entry.key(), entry.value().last_accessed_at))
            .collect();

        orphans.sort_by_key(|(_, last_accessed)| *last_accessed);
        orphans.truncate(limit);
        Ok(orphans.into_iter().map(|(hash, _)| hash).collect())
    }

    async fn forget_blob(&self, hash: &ContentHash) -> CasfsResult<()> {
        self.blobs.remove_if(hash, |_, record| record.reference_count == 0);
        Ok(())
    }
}

impl InMemoryMetadataStore {
    /// Test/inspection hook: read back a blob's current refcount record.
    pub fn blob_record(&self, hash: &ContentHash) -> Option<BlobRecord> {
        self.blobs.get(hash).map(|r| *r)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use casfs_core::Path;
    use uuid::Uuid;

    fn tenant() -> TenantId {
        TenantId::new(Uuid::new_v4())
    }

    fn dir(path: &str) -> Node {
        Node::Directory(crate::DirectoryNode {
            path: Path::parse(path).unwrap(),
            created_at: Utc::now(),
            modified_at: Utc::now(),
        })
    }

    #[tokio::test]
    async fn create_rejects_duplicate_path() {
        let store = InMemoryMetadataStore::new();
        let t = tenant();
        store.create_node(&t, dir("/")).await.unwrap();
        let err = store.create_node(&t, dir("/")).await.unwrap_err();
        assert!(matches!(err, CasfsError::Conflict(_)));
    }

    #[tokio::test]
    async fn tenants_are_isolated() {
        let store = InMemoryMetadataStore::new();
        let t1 = tenant();
        let t2 = tenant();
        store.create_node(&t1, dir("/")).await.unwrap();
        assert!(store
            .get_node_by_path(&t2, &Path::parse("/").unwrap())
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn refcount_increments_and_decrements() {
        let store = InMemoryMetadataStore::new();
        let hash = ContentHash::of(b"x");
        store.increment_blob_ref_count(&hash).await.unwrap();
        store.increment_blob_ref_count(&hash).await.unwrap();
        assert_eq!(store.blob_record(&hash).unwrap().reference_count, 2);

        let n = store.decrement_blob_ref_count(&hash).await.unwrap();
        assert_eq!(n, 1);
        let n = store.decrement_blob_ref_count(&hash).await.unwrap();
        assert_eq!(n, 0);
    }

    #[tokio::test]
    async fn decrement_missing_hash_returns_zero() {
        let store = InMemoryMetadataStore::new();
        let hash = ContentHash::of(b"missing");
        assert_eq!(store.decrement_blob_ref_count(&hash).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn decrement_below_zero_is_invariant_violation() {
        let store = InMemoryMetadataStore::new();
        let hash = ContentHash::of(b"x");
        store.increment_blob_ref_count(&hash).await.unwrap();
        store.decrement_blob_ref_count(&hash).await.unwrap();
        let err = store.decrement_blob_ref_count(&hash).await.unwrap_err();
        assert!(matches!(err, CasfsError::Invariant(_)));
    }

    #[tokio::test]
    async fn forget_blob_removes_reclaimed_record_but_not_a_freshly_live_one() {
        let store = InMemoryMetadataStore::new();
        let h1 = ContentHash::of(b"1");
        store.increment_blob_ref_count(&h1).await.unwrap();
        store.decrement_blob_ref_count(&h1).await.unwrap();
        store.forget_blob(&h1).await.unwrap();
        assert!(store.blob_record(&h1).is_none());

        let h2 = ContentHash::of(b"2");
        store.increment_blob_ref_count(&h2).await.unwrap();
        store.forget_blob(&h2).await.unwrap();
        assert!(store.blob_record(&h2).is_some());
    }

    #[tokio::test]
    async fn orphans_are_oldest_first() {
        let store = InMemoryMetadataStore::new();
        let h1 = ContentHash::of(b"1");
        let h2 = ContentHash::of(b"2");
        store.increment_blob_ref_count(&h1).await.unwrap();
        store.decrement_blob_ref_count(&h1).await.unwrap();
        store.increment_blob_ref_count(&h2).await.unwrap();
        store.decrement_blob_ref_count(&h2).await.unwrap();

        let orphans = store.get_orphan_blobs(10).await.unwrap();
        assert_eq!(orphans, vec![h1, h2]);
    }

    #[tokio::test]
    async fn list_children_orders_directories_before_files_then_by_path() {
        let store = InMemoryMetadataStore::new();
        let t = tenant();
        store.create_node(&t, dir("/")).await.unwrap();
        store.create_node(&t, dir("/z")).await.unwrap();
        store
            .create_node(
                &t,
                Node::File(crate::FileNode {
                    path: Path::parse("/a").unwrap(),
                    hash: ContentHash::of(b"a"),
                    size: 1,
                    mime_type: "text/plain".into(),
                    created_at: Utc::now(),
                    modified_at: Utc::now(),
                }),
            )
            .await
            .unwrap();

        let children = store
            .list_children(&t, &Path::parse("/").unwrap())
            .await
            .unwrap();
        let paths: Vec<&str> = children.iter().map(|n| n.path().as_str()).collect();
        assert_eq!(paths, vec!["/z", "/a"]);
    }
}
