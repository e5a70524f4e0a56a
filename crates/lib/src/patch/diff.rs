//! Structural diff between two content trees.
//!
//! Maps are compared key by key in sorted order. Lists are aligned with a
//! longest-common-subsequence table after trimming the common prefix and
//! suffix, so a single insertion into a long list costs one `add` instead of a
//! rewrite of every following element. Everything else that differs is a
//! `replace`.

use std::collections::BTreeMap;

use crate::content::{Node, Path};

use super::{Op, Patch};

/// Default upper bound on LCS table cells for one list window.
pub const DEFAULT_CELL_BUDGET: usize = 250_000;

/// Tuning knobs for [`diff_with`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiffOptions {
    /// Largest `before.len() * after.len()` (after trimming) that gets a full
    /// LCS alignment. Larger windows are compared position by position.
    pub cell_budget: usize,
}

impl Default for DiffOptions {
    fn default() -> Self {
        Self {
            cell_budget: DEFAULT_CELL_BUDGET,
        }
    }
}

/// Compute the patch that turns `before` into `after`.
///
/// Deterministic: the same pair of trees always yields the same patch, and
/// structurally equal trees yield the empty patch.
pub fn diff(before: &Node, after: &Node) -> Patch {
    diff_with(before, after, &DiffOptions::default())
}

/// [`diff`] with explicit options.
pub fn diff_with(before: &Node, after: &Node, options: &DiffOptions) -> Patch {
    let mut ops = Vec::new();
    diff_node(before, after, &Path::root(), options, &mut ops);
    Patch::from(ops)
}

fn diff_node(before: &Node, after: &Node, path: &Path, options: &DiffOptions, ops: &mut Vec<Op>) {
    if before == after {
        return;
    }
    match (before, after) {
        (Node::Map(a), Node::Map(b)) => diff_map(a, b, path, options, ops),
        (Node::List(a), Node::List(b)) => diff_list(a, b, path, options, ops),
        _ => ops.push(Op::Replace {
            path: path.clone(),
            value: after.clone(),
        }),
    }
}

fn diff_map(
    before: &BTreeMap<String, Node>,
    after: &BTreeMap<String, Node>,
    path: &Path,
    options: &DiffOptions,
    ops: &mut Vec<Op>,
) {
    let mut keys: Vec<&String> = before.keys().chain(after.keys()).collect();
    keys.sort();
    keys.dedup();

    for key in keys {
        let child = path.child(key.as_str());
        match (before.get(key), after.get(key)) {
            (Some(a), Some(b)) => diff_node(a, b, &child, options, ops),
            (Some(_), None) => ops.push(Op::Remove { path: child }),
            (None, Some(b)) => ops.push(Op::Add {
                path: child,
                value: b.clone(),
            }),
            (None, None) => {}
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Keep,
    Delete,
    Insert,
}

fn diff_list(before: &[Node], after: &[Node], path: &Path, options: &DiffOptions, ops: &mut Vec<Op>) {
    let prefix = before
        .iter()
        .zip(after)
        .take_while(|(a, b)| a == b)
        .count();
    let max_suffix = before.len().min(after.len()) - prefix;
    let suffix = before
        .iter()
        .rev()
        .zip(after.iter().rev())
        .take(max_suffix)
        .take_while(|(a, b)| a == b)
        .count();

    let old = &before[prefix..before.len() - suffix];
    let new = &after[prefix..after.len() - suffix];
    let steps = align(old, new, options.cell_budget);

    // `cursor` indexes the list as it looks after the ops emitted so far.
    let mut cursor = prefix;
    let (mut i, mut j) = (0, 0);
    let mut pos = 0;
    while pos < steps.len() {
        if steps[pos] == Step::Keep {
            cursor += 1;
            i += 1;
            j += 1;
            pos += 1;
            continue;
        }

        let run_end = steps[pos..]
            .iter()
            .position(|s| *s == Step::Keep)
            .map_or(steps.len(), |offset| pos + offset);
        let run = &steps[pos..run_end];
        let deletes = run.iter().filter(|s| **s == Step::Delete).count();
        let inserts = run.len() - deletes;
        let paired = deletes.min(inserts);

        for k in 0..paired {
            diff_node(&old[i + k], &new[j + k], &path.child(cursor), options, ops);
            cursor += 1;
        }
        for _ in paired..deletes {
            ops.push(Op::Remove {
                path: path.child(cursor),
            });
        }
        for item in &new[j + paired..j + inserts] {
            ops.push(Op::Add {
                path: path.child(cursor),
                value: item.clone(),
            });
            cursor += 1;
        }

        i += deletes;
        j += inserts;
        pos = run_end;
    }
}

/// Align two windows. Ties prefer deleting from `old` first, which keeps the
/// output stable for a given input pair.
fn align(old: &[Node], new: &[Node], cell_budget: usize) -> Vec<Step> {
    let (n, m) = (old.len(), new.len());
    if n == 0 || m == 0 || n.saturating_mul(m) > cell_budget {
        if n > 0 && m > 0 {
            tracing::debug!(n, m, cell_budget, "List window over budget, comparing by position");
        }
        let mut steps = vec![Step::Delete; n];
        steps.extend(std::iter::repeat_n(Step::Insert, m));
        return steps;
    }

    // lcs[i * width + j] = LCS length of old[i..] and new[j..]
    let width = m + 1;
    let mut lcs = vec![0u32; (n + 1) * width];
    for i in (0..n).rev() {
        for j in (0..m).rev() {
            lcs[i * width + j] = if old[i] == new[j] {
                lcs[(i + 1) * width + j + 1] + 1
            } else {
                lcs[(i + 1) * width + j].max(lcs[i * width + j + 1])
            };
        }
    }

    let mut steps = Vec::with_capacity(n + m);
    let (mut i, mut j) = (0, 0);
    while i < n && j < m {
        if old[i] == new[j] {
            steps.push(Step::Keep);
            i += 1;
            j += 1;
        } else if lcs[(i + 1) * width + j] >= lcs[i * width + j + 1] {
            steps.push(Step::Delete);
            i += 1;
        } else {
            steps.push(Step::Insert);
            j += 1;
        }
    }
    steps.extend(std::iter::repeat_n(Step::Delete, n - i));
    steps.extend(std::iter::repeat_n(Step::Insert, m - j));
    steps
}
