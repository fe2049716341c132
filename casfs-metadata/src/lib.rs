//! The metadata store: per-tenant node records and blob reference counts.
//!
//! `MetadataStore` is a capability trait (spec §4.2, §9 — "a capability set
//! ... defines the metadata contract"), not an inheritance hierarchy.
//! Pluggability is first-class: [`memory::InMemoryMetadataStore`] is the
//! reference backing used throughout the engine's own test suite, and
//! [`sqlite::SqliteMetadataStore`] implements the reference schema of
//! spec §6.1.

pub mod memory;
pub mod node;
pub mod sqlite;

use async_trait::async_trait;
use casfs_core::{CasfsResult, ContentHash, Path, TenantId};

pub use node::{BlobRecord, DirectoryNode, FileNode, Node};

/// Persists per-tenant node records and blob reference counts.
///
/// Every method takes the tenant explicitly (spec §9's redesign note
/// supersedes the source's `setTenant` instance setter, which is unsafe
/// under parallel request handling). Implementations must enforce
/// `(tenant, path)` uniqueness and must serialize concurrent blob refcount
/// mutations for the same hash — the engine's dedup correctness depends on
/// `increment_blob_ref_count` / `decrement_blob_ref_count` being atomic.
#[async_trait]
pub trait MetadataStore: std::fmt::Debug + Send + Sync + 'static {
    /// Inserts a new node. Fails with [`casfs_core::CasfsError::Conflict`]
    /// if `(tenant, path)` already exists.
    async fn create_node(&self, tenant: &TenantId, node: Node) -> CasfsResult<()>;

    /// Returns the node at `path`, or `None` if absent.
    async fn get_node_by_path(&self, tenant: &TenantId, path: &Path) -> CasfsResult<Option<Node>>;

    /// Replaces the mutable attributes of the node at `node`'s path. No-op
    /// if no row matches — callers must have verified existence first.
    async fn update_node(&self, tenant: &TenantId, node: Node) -> CasfsResult<()>;

    /// Removes the row at `path`. Idempotent: deleting an absent path is
    /// not an error at this layer.
    async fn delete_node(&self, tenant: &TenantId, path: &Path) -> CasfsResult<()>;

    /// Returns exactly the nodes whose parent path equals `directory`,
    /// directories before files, then ascending by path.
    async fn list_children(&self, tenant: &TenantId, directory: &Path) -> CasfsResult<Vec<Node>>;

    /// Atomically creates (refcount 1) or increments the [`BlobRecord`] for
    /// `hash`, bumping `last_accessed_at`. Must be race-free across
    /// concurrent callers referencing the same hash.
    async fn increment_blob_ref_count(&self, hash: &ContentHash) -> CasfsResult<()>;

    /// Atomically decrements the refcount for `hash` and returns the new
    /// count. Returns `0` if no row exists. A decrement that would drive
    /// the count negative is a bug and surfaces
    /// [`casfs_core::CasfsError::Invariant`], never silently clamped.
    async fn decrement_blob_ref_count(&self, hash: &ContentHash) -> CasfsResult<u64>;

    /// Returns up to `limit` hashes with `refcount = 0`, oldest
    /// `last_accessed_at` first, so reclamation is bounded and predictable.
    async fn get_orphan_blobs(&self, limit: usize) -> CasfsResult<Vec<ContentHash>>;

    /// Removes the `BlobRecord` for `hash` if its refcount is still 0.
    /// Called by the reclaimer once the backing bytes are gone, so a
    /// reclaimed hash stops being reported by `get_orphan_blobs` (spec §9:
    /// "removes the BlobRecord only if refcount = 0"). A concurrent
    /// `increment_blob_ref_count` racing in first wins: the record survives
    /// and the hash is treated as freshly live. Idempotent if already gone.
    async fn forget_blob(&self, hash: &ContentHash) -> CasfsResult<()>;
}
