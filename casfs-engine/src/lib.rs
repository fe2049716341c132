//! The deduplicating file-system service: the only component permitted to
//! mutate the metadata/blob pair together (spec §4.4). Grounded on this
//! workspace's `s5_core::api::blobs::store::BlobStore` (a thin façade over
//! a `Store` trait object) and `s5_fs::gc` (the orphan sweep), generalized
//! from a single-root blob/registry pair to a two-interface, multi-tenant
//! dedup engine.

pub mod mime;
pub mod reclaimer;

use std::sync::Arc;

use bytes::Bytes;
use casfs_blobstore::BlobStore;
use casfs_core::{CasfsError, CasfsResult, ContentHash, Path, TenantId};
use casfs_metadata::{DirectoryNode, FileNode, MetadataStore, Node};
use chrono::Utc;
use tracing::{debug, instrument, warn};

pub use reclaimer::{OrphanReclaimer, ReclaimReport};

/// Couples a [`MetadataStore`] and a [`BlobStore`] behind the operations of
/// spec §4.4. Holds no mutable state beyond the two store handles — all
/// per-request state (tenant, path) is a call argument, never bound to the
/// service instance (spec §5 — "implementations must not use process-global
/// tenant state").
#[derive(Clone)]
pub struct FileSystemService {
    metadata: Arc<dyn MetadataStore>,
    blobs: Arc<dyn BlobStore>,
}

impl FileSystemService {
    pub fn new(metadata: Arc<dyn MetadataStore>, blobs: Arc<dyn BlobStore>) -> Self {
        Self { metadata, blobs }
    }

    async fn require_directory(&self, tenant: &TenantId, path: &Path) -> CasfsResult<DirectoryNode> {
        match self.metadata.get_node_by_path(tenant, path).await? {
            Some(Node::Directory(d)) => Ok(d),
            Some(Node::File(_)) => Err(CasfsError::Conflict(format!("{path} is a file"))),
            None => Err(CasfsError::DirectoryNotFound(path.to_string())),
        }
    }

    async fn require_file(&self, tenant: &TenantId, path: &Path) -> CasfsResult<FileNode> {
        match self.metadata.get_node_by_path(tenant, path).await? {
            Some(Node::File(f)) => Ok(f),
            Some(Node::Directory(_)) => Err(CasfsError::Conflict(format!("{path} is a directory"))),
            None => Err(CasfsError::FileNotFound(path.to_string())),
        }
    }

    /// Creates a directory at `path`. The root (`"/"`) may be created
    /// exactly once; subsequent callers get **Conflict** like any other
    /// path (spec §4.4.1).
    #[instrument(skip(self), fields(tenant = %tenant))]
    pub async fn create_directory(&self, tenant: &TenantId, path: &Path) -> CasfsResult<()> {
        if self.metadata.get_node_by_path(tenant, path).await?.is_some() {
            return Err(CasfsError::Conflict(format!("{path} already exists")));
        }
        if !path.is_root() {
            self.require_directory(tenant, &path.parent()).await?;
        }
        let now = Utc::now();
        self.metadata
            .create_node(
                tenant,
                Node::Directory(DirectoryNode {
                    path: path.clone(),
                    created_at: now,
                    modified_at: now,
                }),
            )
            .await
    }

    /// Writes `bytes` to `path`, deduplicating against the content hash.
    /// Ordering follows spec §4.4.3: the blob is written before any
    /// metadata commits, and on overwrite the new hash's refcount is
    /// incremented before the old hash's is decremented, so the blob is
    /// never transiently orphaned.
    #[instrument(skip(self, bytes), fields(tenant = %tenant, len = bytes.len()))]
    pub async fn write_file(&self, tenant: &TenantId, path: &Path, bytes: Bytes) -> CasfsResult<()> {
        let hash = ContentHash::of(&bytes);

        if !self.blobs.exists(&hash).await? {
            self.blobs.write(&hash, bytes.clone()).await?;
        }

        match self.metadata.get_node_by_path(tenant, path).await? {
            Some(Node::Directory(_)) => {
                return Err(CasfsError::Conflict(format!("{path} is a directory")));
            }
            Some(Node::File(existing)) if existing.hash == hash => {
                let mut updated = existing;
                updated.modified_at = Utc::now();
                self.metadata.update_node(tenant, Node::File(updated)).await?;
            }
            Some(Node::File(existing)) => {
                let old_hash = existing.hash;
                let mut updated = existing;
                updated.hash = hash;
                updated.size = bytes.len() as u64;
                updated.modified_at = Utc::now();

                self.metadata.increment_blob_ref_count(&hash).await?;
                self.metadata.update_node(tenant, Node::File(updated)).await?;
                let remaining = self.metadata.decrement_blob_ref_count(&old_hash).await?;
                if remaining == 0 {
                    self.blobs.delete(&old_hash).await?;
                }
            }
            None => {
                self.require_directory(tenant, &path.parent()).await?;
                let now = Utc::now();
                self.metadata
                    .create_node(
                        tenant,
                        Node::File(FileNode {
                            path: path.clone(),
                            hash,
                            size: bytes.len() as u64,
                            mime_type: mime::guess_mime_type(path.as_str()),
                            created_at: now,
                            modified_at: now,
                        }),
                    )
                    .await?;
                self.metadata.increment_blob_ref_count(&hash).await?;
            }
        }

        Ok(())
    }

    /// Reads the bytes backing the file at `path`. A present `FileNode`
    /// whose blob is absent is a corruption (spec §4.4.1), surfaced as
    /// [`CasfsError::BlobMissing`] rather than retried.
    #[instrument(skip(self), fields(tenant = %tenant))]
    pub async fn read_file(&self, tenant: &TenantId, path: &Path) -> CasfsResult<Bytes> {
        let node = self.require_file(tenant, path).await?;
        match self.blobs.read(&node.hash).await {
            Ok(bytes) => Ok(bytes),
            Err(CasfsError::BlobMissing(_)) => {
                warn!(%path, hash = %node.hash, "metadata references a hash with no backing blob");
                Err(CasfsError::BlobMissing(node.hash.to_string()))
            }
            Err(e) => Err(e),
        }
    }

    #[instrument(skip(self), fields(tenant = %tenant))]
    pub async fn delete_file(&self, tenant: &TenantId, path: &Path) -> CasfsResult<()> {
        let node = self.require_file(tenant, path).await?;
        self.metadata.delete_node(tenant, path).await?;
        let remaining = self.metadata.decrement_blob_ref_count(&node.hash).await?;
        if remaining == 0 {
            self.blobs.delete(&node.hash).await?;
        }
        Ok(())
    }

    #[instrument(skip(self), fields(tenant = %tenant))]
    pub async fn list_directory(&self, tenant: &TenantId, path: &Path) -> CasfsResult<Vec<Node>> {
        self.require_directory(tenant, path).await?;
        self.metadata.list_children(tenant, path).await
    }

    /// Deletes an empty directory. The root may never be deleted (spec
    /// §4.4.1).
    #[instrument(skip(self), fields(tenant = %tenant))]
    pub async fn delete_directory(&self, tenant: &TenantId, path: &Path) -> CasfsResult<()> {
        if path.is_root() {
            return Err(CasfsError::Conflict("the root directory cannot be deleted".into()));
        }
        self.require_directory(tenant, path).await?;
        if !self.metadata.list_children(tenant, path).await?.is_empty() {
            return Err(CasfsError::Conflict(format!("{path} is not empty")));
        }
        self.metadata.delete_node(tenant, path).await
    }

    /// Metadata-only copy: no blob I/O, since the destination shares the
    /// source's content hash (spec §4.4.1 — "which is the whole point of
    /// content addressing").
    #[instrument(skip(self), fields(tenant = %tenant))]
    pub async fn copy_file(&self, tenant: &TenantId, src: &Path, dst: &Path) -> CasfsResult<()> {
        let source = self.require_file(tenant, src).await?;
        if self.metadata.get_node_by_path(tenant, dst).await?.is_some() {
            return Err(CasfsError::Conflict(format!("{dst} already exists")));
        }
        self.require_directory(tenant, &dst.parent()).await?;

        self.metadata.increment_blob_ref_count(&source.hash).await?;
        let now = Utc::now();
        self.metadata
            .create_node(
                tenant,
                Node::File(FileNode {
                    path: dst.clone(),
                    hash: source.hash,
                    size: source.size,
                    mime_type: source.mime_type,
                    created_at: now,
                    modified_at: now,
                }),
            )
            .await
    }

    /// `copyFile` then `deleteFile(src)`: the destination's `incRef` commits
    /// before the source's `decRef`, so net refcount for the shared hash is
    /// unchanged throughout (spec §4.4.1, §4.4.3).
    #[instrument(skip(self), fields(tenant = %tenant))]
    pub async fn move_file(&self, tenant: &TenantId, src: &Path, dst: &Path) -> CasfsResult<()> {
        self.copy_file(tenant, src, dst).await?;
        self.delete_file(tenant, src).await
    }

    /// Recursive, pre-order copy of the subtree rooted at `src` to `dst`.
    /// Not atomic: a failure partway through leaves previously created
    /// destination nodes in place (spec §4.4.1).
    #[instrument(skip(self), fields(tenant = %tenant))]
    pub async fn copy_directory(&self, tenant: &TenantId, src: &Path, dst: &Path) -> CasfsResult<()> {
        self.require_directory(tenant, src).await?;
        if self.metadata.get_node_by_path(tenant, dst).await?.is_some() {
            return Err(CasfsError::Conflict(format!("{dst} already exists")));
        }
        self.require_directory(tenant, &dst.parent()).await?;

        let now = Utc::now();
        self.metadata
            .create_node(
                tenant,
                Node::Directory(DirectoryNode {
                    path: dst.clone(),
                    created_at: now,
                    modified_at: now,
                }),
            )
            .await?;

        let children = self.metadata.list_children(tenant, src).await?;
        for child in children {
            let child_dst = rebase(child.path(), src, dst)?;
            match child {
                Node::Directory(d) => {
                    Box::pin(self.copy_directory(tenant, &d.path, &child_dst)).await?;
                }
                Node::File(f) => {
                    self.copy_file(tenant, &f.path, &child_dst).await?;
                }
            }
        }

        Ok(())
    }

    /// `copyDirectory` then a bottom-up `deleteDirectory` of `src` (children
    /// before parent). Not atomic, same caveat as [`Self::copy_directory`].
    #[instrument(skip(self), fields(tenant = %tenant))]
    pub async fn move_directory(&self, tenant: &TenantId, src: &Path, dst: &Path) -> CasfsResult<()> {
        self.copy_directory(tenant, src, dst).await?;
        self.delete_subtree_bottom_up(tenant, src).await
    }

    async fn delete_subtree_bottom_up(&self, tenant: &TenantId, dir: &Path) -> CasfsResult<()> {
        let children = self.metadata.list_children(tenant, dir).await?;
        for child in children {
            match child {
                Node::Directory(d) => {
                    Box::pin(self.delete_subtree_bottom_up(tenant, &d.path)).await?;
                }
                Node::File(f) => self.delete_file(tenant, &f.path).await?,
            }
        }
        if dir.is_root() {
            debug!("skipping deletion of root while unwinding a move");
            return Ok(());
        }
        self.metadata.delete_node(tenant, dir).await
    }

    #[instrument(skip(self), fields(tenant = %tenant))]
    pub async fn get_info(&self, tenant: &TenantId, path: &Path) -> CasfsResult<Node> {
        self.metadata
            .get_node_by_path(tenant, path)
            .await?
            .ok_or_else(|| CasfsError::FileNotFound(path.to_string()))
    }
}

/// Rewrites `child_path` (known to live under `src`) onto `dst`'s namespace.
fn rebase(child_path: &Path, src: &Path, dst: &Path) -> CasfsResult<Path> {
    let suffix = child_path
        .as_str()
        .strip_prefix(src.as_str())
        .ok_or_else(|| CasfsError::Invariant(format!("{child_path} is not under {src}")))?;
    Path::parse(format!("{}{}", dst.as_str(), suffix))
}
