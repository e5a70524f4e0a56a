//! Error types for applying patches.
//!
//! A [`PatchError`] means a patch does not fit the tree it was applied to. For
//! stored history that is a data-integrity failure: the delta chain no longer
//! matches the state it was computed against. Callers must propagate it.

use thiserror::Error;

use crate::content::{NodeKind, Path};

/// Errors raised while applying a patch.
///
/// Every variant names the position of the failing operation within the patch
/// (`op`) and the path it addressed.
#[non_exhaustive]
#[derive(Debug, Clone, Error, PartialEq)]
pub enum PatchError {
    /// A map key along the path does not exist.
    #[error("Patch op {op}: path {path} not found")]
    PathNotFound { op: usize, path: Path },

    /// A list index is past the end of the list.
    #[error("Patch op {op}: index {index} out of bounds at {path} (len {len})")]
    IndexOutOfBounds {
        op: usize,
        path: Path,
        index: usize,
        len: usize,
    },

    /// The path descends into a leaf value.
    #[error("Patch op {op}: {path} descends into a {kind} value")]
    NotAContainer { op: usize, path: Path, kind: NodeKind },

    /// A list was addressed with a segment that is not an index.
    #[error("Patch op {op}: '{segment}' is not a list index at {path}")]
    InvalidIndex {
        op: usize,
        path: Path,
        segment: String,
    },

    /// The root node cannot be removed.
    #[error("Patch op {op}: cannot remove the document root")]
    RootRemoval { op: usize },
}

impl PatchError {
    /// Position of the failing operation within the patch.
    pub fn op_index(&self) -> usize {
        match self {
            PatchError::PathNotFound { op, .. }
            | PatchError::IndexOutOfBounds { op, .. }
            | PatchError::NotAContainer { op, .. }
            | PatchError::InvalidIndex { op, .. }
            | PatchError::RootRemoval { op } => *op,
        }
    }

    /// The path of the failing operation, if it has one.
    pub fn path(&self) -> Option<&Path> {
        match self {
            PatchError::PathNotFound { path, .. }
            | PatchError::IndexOutOfBounds { path, .. }
            | PatchError::NotAContainer { path, .. }
            | PatchError::InvalidIndex { path, .. } => Some(path),
            PatchError::RootRemoval { .. } => None,
        }
    }

    /// Check if this error is a failed lookup (missing key or index).
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            PatchError::PathNotFound { .. } | PatchError::IndexOutOfBounds { .. }
        )
    }

    /// Check if this error is a shape mismatch between patch and tree.
    pub fn is_type_error(&self) -> bool {
        matches!(
            self,
            PatchError::NotAContainer { .. } | PatchError::InvalidIndex { .. }
        )
    }
}

impl From<PatchError> for crate::Error {
    fn from(err: PatchError) -> Self {
        crate::Error::Patch(err)
    }
}
