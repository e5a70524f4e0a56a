//! Structural diff and patch over content trees.
//!
//! [`diff`] compares two trees and produces a [`Patch`]: an ordered list of
//! `add`/`remove`/`replace` operations addressed by [`Path`]. [`apply`] replays
//! a patch against a tree and returns the result as a new tree. Application is
//! all-or-nothing: the input is never mutated, and the first operation that
//! does not resolve aborts the whole patch with a [`PatchError`].
//!
//! ```
//! use folio::content::Node;
//! use folio::patch::{apply, diff};
//! use serde_json::json;
//!
//! let before = Node::from(json!({"title": "Draft", "blocks": ["a", "b", "c"]}));
//! let after = Node::from(json!({"title": "Final", "blocks": ["a", "x", "b", "c"]}));
//!
//! let patch = diff(&before, &after);
//! assert_eq!(patch.len(), 2); // one insertion, one title replace
//! assert_eq!(apply(&before, &patch)?, after);
//! # Ok::<(), folio::patch::PatchError>(())
//! ```

mod apply;
mod diff;
pub mod errors;

use serde::{Deserialize, Serialize};

use crate::content::{Node, Path};

pub use apply::apply;
pub use diff::{DiffOptions, diff, diff_with};
pub use errors::PatchError;

/// A single structural edit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum Op {
    /// Insert into a list (before `index`, or append at `len`) or set a map key.
    Add { path: Path, value: Node },
    /// Remove an existing list element or map key.
    Remove { path: Path },
    /// Overwrite an existing node.
    Replace { path: Path, value: Node },
}

impl Op {
    /// The path this operation addresses.
    pub fn path(&self) -> &Path {
        match self {
            Op::Add { path, .. } | Op::Remove { path } | Op::Replace { path, .. } => path,
        }
    }

    /// Short name of the operation.
    pub fn name(&self) -> &'static str {
        match self {
            Op::Add { .. } => "add",
            Op::Remove { .. } => "remove",
            Op::Replace { .. } => "replace",
        }
    }
}

/// An ordered list of operations, applied strictly in sequence.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Patch {
    ops: Vec<Op>,
}

impl Patch {
    /// The empty patch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an operation.
    pub fn push(&mut self, op: Op) {
        self.ops.push(op);
    }

    /// Returns the operations in application order.
    pub fn ops(&self) -> &[Op] {
        &self.ops
    }

    /// Number of operations.
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Returns `true` if the patch changes nothing.
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Canonical JSON encoding of the patch.
    pub fn to_canonical_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Byte length of the canonical encoding.
    pub fn encoded_len(&self) -> usize {
        self.to_canonical_json().len()
    }

    /// Apply this patch to `content`. See [`apply`].
    pub fn apply_to(&self, content: &Node) -> Result<Node, PatchError> {
        apply(content, self)
    }
}

impl From<Vec<Op>> for Patch {
    fn from(ops: Vec<Op>) -> Self {
        Self { ops }
    }
}

impl IntoIterator for Patch {
    type Item = Op;
    type IntoIter = std::vec::IntoIter<Op>;

    fn into_iter(self) -> Self::IntoIter {
        self.ops.into_iter()
    }
}

impl<'a> IntoIterator for &'a Patch {
    type Item = &'a Op;
    type IntoIter = std::slice::Iter<'a, Op>;

    fn into_iter(self) -> Self::IntoIter {
        self.ops.iter()
    }
}
