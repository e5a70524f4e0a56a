//! Snapshot-versus-delta decision for history writes.

use crate::content::Node;
use crate::patch::Patch;

use super::{Representation, Trigger};

/// Decides whether a history write stores the whole tree or a patch.
///
/// Rules, first match wins:
///
/// 1. Baseline and restore writes are snapshots.
/// 2. With no prior state to diff against, snapshot.
/// 3. Snapshot when the encoded patch is at least as large as the encoded tree.
/// 4. Otherwise store the delta.
///
/// Rule 3 keeps every stored entry no larger than a full copy and bounds how
/// much replay a reconstruction can cost.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SnapshotPolicy;

impl SnapshotPolicy {
    /// Returns `true` if this write should be stored as a snapshot.
    pub fn should_snapshot(&self, trigger: Trigger, has_prior: bool, patch: &Patch, after: &Node) -> bool {
        if matches!(trigger, Trigger::Baseline | Trigger::Restore) {
            return true;
        }
        if !has_prior {
            return true;
        }
        patch.encoded_len() >= after.encoded_len()
    }

    /// Pick the stored representation, consuming the patch.
    pub fn represent(&self, trigger: Trigger, has_prior: bool, patch: Patch, after: &Node) -> Representation {
        if self.should_snapshot(trigger, has_prior, &patch, after) {
            Representation::Snapshot(after.clone())
        } else {
            Representation::Delta(patch)
        }
    }
}
