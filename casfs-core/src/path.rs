//! Absolute, POSIX-like path values.
//!
//! Validation is pure and total: it never touches storage. See spec §4.1.

use std::fmt;

use crate::error::CasfsError;

/// A validated absolute path: starts with `/`, contains no `..` segment
/// marker, no NUL byte, and is never empty.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Path(String);

impl Path {
    pub const ROOT: &'static str = "/";

    /// Validates `s` and returns a [`Path`], or [`CasfsError::InvalidPath`].
    pub fn parse(s: impl Into<String>) -> Result<Self, CasfsError> {
        let s = s.into();
        if s.is_empty() {
            return Err(CasfsError::InvalidPath("path is empty".into()));
        }
        if !s.starts_with('/') {
            return Err(CasfsError::InvalidPath(format!(
                "path must start with '/': {s}"
            )));
        }
        if s.contains("..") {
            return Err(CasfsError::InvalidPath(format!(
                "path must not contain '..': {s}"
            )));
        }
        if s.bytes().any(|b| b == 0) {
            return Err(CasfsError::InvalidPath(format!(
                "path must not contain a NUL byte: {s}"
            )));
        }
        Ok(Path(s))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0 == Self::ROOT
    }

    /// Parent of this path. Must never be called on the root — callers are
    /// expected to check [`Path::is_root`] first, per spec §4.1
    /// ("`parent(\"/\")` is undefined and must never be requested").
    pub fn parent(&self) -> Path {
        assert!(!self.is_root(), "root path has no parent");
        match self.0.rfind('/') {
            Some(0) => Path(Self::ROOT.to_string()),
            Some(idx) => Path(self.0[..idx].to_string()),
            None => unreachable!("validated paths always start with '/'"),
        }
    }

    /// File/directory name: the final path component.
    pub fn file_name(&self) -> &str {
        match self.0.rfind('/') {
            Some(idx) => &self.0[idx + 1..],
            None => &self.0,
        }
    }

    /// True if `self` is the immediate child of `dir`, i.e. exactly one path
    /// component deeper. Used by `MetadataStore::list_children` backings
    /// that implement depth filtering via prefix + slash-count, per spec §6.1.
    pub fn is_immediate_child_of(&self, dir: &Path) -> bool {
        if self.is_root() {
            return false;
        }
        self.parent() == *dir
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Path {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_root() {
        assert_eq!(Path::parse("/").unwrap().as_str(), "/");
    }

    #[test]
    fn rejects_relative() {
        assert!(Path::parse("a/b").is_err());
    }

    #[test]
    fn rejects_empty() {
        assert!(Path::parse("").is_err());
    }

    #[test]
    fn rejects_dotdot() {
        assert!(Path::parse("/../etc/passwd").is_err());
        assert!(Path::parse("/a/../b").is_err());
    }

    #[test]
    fn rejects_nul() {
        assert!(Path::parse("/a\0b").is_err());
    }

    #[test]
    fn parent_of_nested_path() {
        assert_eq!(Path::parse("/a/b/c").unwrap().parent().as_str(), "/a/b");
    }

    #[test]
    fn parent_of_top_level_path() {
        assert_eq!(Path::parse("/x").unwrap().parent().as_str(), "/");
    }

    #[test]
    fn immediate_child_detection() {
        let dir = Path::parse("/a").unwrap();
        assert!(Path::parse("/a/b").unwrap().is_immediate_child_of(&dir));
        assert!(!Path::parse("/a/b/c").unwrap().is_immediate_child_of(&dir));
        assert!(!Path::parse("/a").unwrap().is_immediate_child_of(&dir));
    }
}
