//! Node and blob-record value types (spec §3).

use casfs_core::{ContentHash, Path};
use chrono::{DateTime, Utc};

/// A metadata record for a path: either a [`FileNode`] or a
/// [`DirectoryNode`]. Deliberately a closed sum type (spec §9: "branches
/// are closed (two variants forever)") rather than a class hierarchy.
#[derive(Clone, Debug, PartialEq)]
pub enum Node {
    File(FileNode),
    Directory(DirectoryNode),
}

impl Node {
    pub fn path(&self) -> &Path {
        match self {
            Node::File(f) => &f.path,
            Node::Directory(d) => &d.path,
        }
    }

    pub fn is_directory(&self) -> bool {
        matches!(self, Node::Directory(_))
    }

    pub fn is_file(&self) -> bool {
        matches!(self, Node::File(_))
    }

    pub fn as_file(&self) -> Option<&FileNode> {
        match self {
            Node::File(f) => Some(f),
            Node::Directory(_) => None,
        }
    }

    pub fn as_directory(&self) -> Option<&DirectoryNode> {
        match self {
            Node::Directory(d) => Some(d),
            Node::File(_) => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct FileNode {
    pub path: Path,
    pub hash: ContentHash,
    pub size: u64,
    pub mime_type: String,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct DirectoryNode {
    pub path: Path,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

/// Tracks how many live `FileNode`s reference a given content hash (spec §3).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlobRecord {
    pub reference_count: u64,
    pub size: u64,
    pub created_at: DateTime<Utc>,
    pub last_accessed_at: DateTime<Utc>,
}
