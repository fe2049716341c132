//! The error taxonomy shared by every layer of the engine.
//!
//! Kinds, not type names: callers match on the variant, not on a formatted
//! message. Adapters that wrap a foreign backend error (`sqlx::Error`,
//! `std::io::Error`) fold it into [`CasfsError::StoreUnavailable`] via
//! `#[from]`, the same way storage-service error enums in this codebase's
//! lineage flatten a driver error into one transient-failure variant.

use thiserror::Error;

/// Errors surfaced across the path validator, the two store interfaces, and
/// the file-system service. See spec §7 for the taxonomy this mirrors.
#[derive(Debug, Error)]
pub enum CasfsError {
    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("invalid content hash: {0}")]
    InvalidHash(String),

    #[error("file not found: {0}")]
    FileNotFound(String),

    #[error("directory not found: {0}")]
    DirectoryNotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("blob missing for hash {0}: metadata references bytes that are not in the blob store")]
    BlobMissing(String),

    #[error("store unavailable: {0}")]
    StoreUnavailable(#[from] anyhow::Error),

    #[error("invariant violated: {0}")]
    Invariant(String),
}

pub type CasfsResult<T> = Result<T, CasfsError>;

impl CasfsError {
    /// True for the two "not found" specializations, useful for callers
    /// that want to collapse them into one 404-shaped response.
    pub fn is_not_found(&self) -> bool {
        matches!(self, CasfsError::FileNotFound(_) | CasfsError::DirectoryNotFound(_))
    }
}
