//! Typed index wrapper over [`BTree`].
//!
//! The tree itself happily stores duplicate keys in posting lists; the
//! wrapper is where index semantics live. Primary and unique indexes
//! reject a duplicate key before it reaches the tree; secondary indexes
//! let the posting list grow.

use crate::btree::BTree;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexKind {
    Primary,
    Unique,
    Secondary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexError {
    DuplicateKey(i64),
    KeyNotFound(i64),
}

impl fmt::Display for IndexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexError::DuplicateKey(key) => write!(f, "duplicate key {}", key),
            IndexError::KeyNotFound(key) => write!(f, "key {} not found", key),
        }
    }
}

impl std::error::Error for IndexError {}

pub struct Index {
    name: String,
    kind: IndexKind,
    /// Position of the indexed column in the table schema.
    column: usize,
    tree: BTree,
}

impl Index {
    pub fn new(name: impl Into<String>, kind: IndexKind, column: usize) -> Self {
        Self {
            name: name.into(),
            kind,
            column,
            tree: BTree::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> IndexKind {
        self.kind
    }

    pub fn column(&self) -> usize {
        self.column
    }

    /// Maps `key` to `row_id`. Primary/unique indexes fail on a key that
    /// is already present; secondary indexes append to the posting list.
    pub fn insert(&mut self, key: i64, row_id: i64) -> Result<(), IndexError> {
        if matches!(self.kind, IndexKind::Primary | IndexKind::Unique) && self.tree.contains(key) {
            return Err(IndexError::DuplicateKey(key));
        }
        self.tree.insert(key, row_id);
        Ok(())
    }

    /// First row id under `key`.
    pub fn find(&self, key: i64) -> Result<i64, IndexError> {
        self.tree
            .search(key)
            .and_then(|ids| ids.first().copied())
            .ok_or(IndexError::KeyNotFound(key))
    }

    /// Every row id under `key` (secondary indexes may hold several).
    pub fn find_all(&self, key: i64) -> &[i64] {
        self.tree.search(key).unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primary_index_rejects_duplicates() {
        let mut index = Index::new("users_pk", IndexKind::Primary, 0);
        index.insert(1, 100).unwrap();
        assert_eq!(index.insert(1, 200), Err(IndexError::DuplicateKey(1)));
        assert_eq!(index.find(1), Ok(100));
    }

    #[test]
    fn unique_index_rejects_duplicates() {
        let mut index = Index::new("email_uq", IndexKind::Unique, 1);
        index.insert(42, 7).unwrap();
        assert_eq!(index.insert(42, 8), Err(IndexError::DuplicateKey(42)));
    }

    #[test]
    fn secondary_index_keeps_every_row_id() {
        let mut index = Index::new("age_idx", IndexKind::Secondary, 2);
        index.insert(30, 1).unwrap();
        index.insert(30, 2).unwrap();
        index.insert(30, 3).unwrap();
        assert_eq!(index.find_all(30), &[1, 2, 3]);
        assert_eq!(index.find(30), Ok(1));
    }

    #[test]
    fn missing_key_is_key_not_found() {
        let index = Index::new("users_pk", IndexKind::Primary, 0);
        assert_eq!(index.find(9), Err(IndexError::KeyNotFound(9)));
        assert!(index.find_all(9).is_empty());
    }
}
