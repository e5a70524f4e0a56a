//! Patch application.

use crate::content::{Node, Path, Segment};

use super::{Op, Patch, PatchError};

/// Apply `patch` to `content`, returning the patched tree.
///
/// Operations run strictly in order against a private copy of `content`. The
/// first operation that fails to resolve aborts the whole patch; the input is
/// never touched, so callers see either the fully patched tree or an error.
pub fn apply(content: &Node, patch: &Patch) -> Result<Node, PatchError> {
    let mut doc = content.clone();
    for (index, op) in patch.ops().iter().enumerate() {
        apply_op(&mut doc, index, op)?;
    }
    Ok(doc)
}

fn apply_op(doc: &mut Node, op_index: usize, op: &Op) -> Result<(), PatchError> {
    let path = op.path();
    let Some((last, parent)) = path.split_last() else {
        // Root-addressed operations
        return match op {
            Op::Add { value, .. } | Op::Replace { value, .. } => {
                *doc = value.clone();
                Ok(())
            }
            Op::Remove { .. } => Err(PatchError::RootRemoval { op: op_index }),
        };
    };

    let target = navigate_mut(doc, parent, op_index, path)?;
    match op {
        Op::Add { value, .. } => add(target, last, value.clone(), op_index, path),
        Op::Remove { .. } => remove(target, last, op_index, path),
        Op::Replace { value, .. } => replace(target, last, value.clone(), op_index, path),
    }
}

/// Walk `segments` from `node`, requiring every step to exist.
fn navigate_mut<'a>(
    node: &'a mut Node,
    segments: &[Segment],
    op: usize,
    path: &Path,
) -> Result<&'a mut Node, PatchError> {
    let mut current = node;
    for segment in segments {
        current = match current {
            Node::Map(map) => map
                .get_mut(segment.as_key().as_ref())
                .ok_or_else(|| PatchError::PathNotFound {
                    op,
                    path: path.clone(),
                })?,
            Node::List(items) => {
                let index = list_index(segment, op, path)?;
                let len = items.len();
                items
                    .get_mut(index)
                    .ok_or_else(|| PatchError::IndexOutOfBounds {
                        op,
                        path: path.clone(),
                        index,
                        len,
                    })?
            }
            leaf => {
                return Err(PatchError::NotAContainer {
                    op,
                    path: path.clone(),
                    kind: leaf.kind(),
                });
            }
        };
    }
    Ok(current)
}

fn list_index(segment: &Segment, op: usize, path: &Path) -> Result<usize, PatchError> {
    segment.as_index().ok_or_else(|| PatchError::InvalidIndex {
        op,
        path: path.clone(),
        segment: segment.to_string(),
    })
}

fn add(parent: &mut Node, last: &Segment, value: Node, op: usize, path: &Path) -> Result<(), PatchError> {
    match parent {
        Node::Map(map) => {
            map.insert(last.as_key().into_owned(), value);
            Ok(())
        }
        Node::List(items) => {
            let index = list_index(last, op, path)?;
            if index > items.len() {
                return Err(PatchError::IndexOutOfBounds {
                    op,
                    path: path.clone(),
                    index,
                    len: items.len(),
                });
            }
            items.insert(index, value);
            Ok(())
        }
        leaf => Err(PatchError::NotAContainer {
            op,
            path: path.clone(),
            kind: leaf.kind(),
        }),
    }
}

fn remove(parent: &mut Node, last: &Segment, op: usize, path: &Path) -> Result<(), PatchError> {
    match parent {
        Node::Map(map) => map
            .remove(last.as_key().as_ref())
            .map(|_| ())
            .ok_or_else(|| PatchError::PathNotFound {
                op,
                path: path.clone(),
            }),
        Node::List(items) => {
            let index = list_index(last, op, path)?;
            if index >= items.len() {
                return Err(PatchError::IndexOutOfBounds {
                    op,
                    path: path.clone(),
                    index,
                    len: items.len(),
                });
            }
            items.remove(index);
            Ok(())
        }
        leaf => Err(PatchError::NotAContainer {
            op,
            path: path.clone(),
            kind: leaf.kind(),
        }),
    }
}

fn replace(parent: &mut Node, last: &Segment, value: Node, op: usize, path: &Path) -> Result<(), PatchError> {
    *slot_mut(parent, last, op, path)? = value;
    Ok(())
}

/// Resolve an existing child of `parent`.
fn slot_mut<'a>(
    parent: &'a mut Node,
    last: &Segment,
    op: usize,
    path: &Path,
) -> Result<&'a mut Node, PatchError> {
    navigate_mut(parent, std::slice::from_ref(last), op, path)
}
