//! Append-only revision history for documents.
//!
//! Every committed edit leaves a [`HistoryEntry`] storing either a full
//! [`Snapshot`](Representation::Snapshot) of the new content or a
//! [`Delta`](Representation::Delta) from the previous state. The first entry of
//! every document is a baseline snapshot, so any entry can be reconstructed by
//! replaying forward from the nearest snapshot at or before it.
//!
//! # Write path
//!
//! [`HistoryLog::record`] decides what a save should do to the log:
//!
//! - no entries yet: insert a baseline snapshot
//! - content unchanged: nothing ([`HistoryWrite::Unchanged`])
//! - latest entry younger than the coalescing window and not the baseline:
//!   overwrite it in place ([`HistoryWrite::Overwrite`])
//! - otherwise: insert a new entry ([`HistoryWrite::Insert`])
//!
//! `record` only reads storage. The resulting [`Recorded`] is committed by the
//! backend together with the document's compare-and-swap, so the log and the
//! document never disagree.
//!
//! # Read path
//!
//! [`HistoryLog::reconstruct`] returns the content as of an entry, and
//! [`replay`] exposes the forward replay itself.

mod errors;
mod policy;

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::Result;
use crate::backend::{BackendImpl, Document};
use crate::content::Node;
use crate::id::{DocumentId, EntryId};
use crate::patch::{DiffOptions, Patch, diff_with};

pub use errors::HistoryError;
pub use policy::SnapshotPolicy;

/// Why a history entry was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trigger {
    /// The document's initial state.
    Baseline,
    /// A timer-driven save.
    Autosave,
    /// An explicit flush (editor lost focus or closed).
    Blur,
    /// A restore of an earlier entry.
    Restore,
}

impl Trigger {
    /// The lowercase name used in storage and on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            Trigger::Baseline => "baseline",
            Trigger::Autosave => "autosave",
            Trigger::Blur => "blur",
            Trigger::Restore => "restore",
        }
    }
}

impl std::fmt::Display for Trigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Trigger {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "baseline" => Ok(Trigger::Baseline),
            "autosave" => Ok(Trigger::Autosave),
            "blur" => Ok(Trigger::Blur),
            "restore" => Ok(Trigger::Restore),
            other => Err(format!("unknown trigger '{other}'")),
        }
    }
}

/// How an entry stores its content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload", rename_all = "lowercase")]
pub enum Representation {
    /// The full content tree.
    Snapshot(Node),
    /// A patch from the previous entry's content.
    Delta(Patch),
}

impl Representation {
    /// `"snapshot"` or `"delta"`.
    pub fn kind(&self) -> &'static str {
        match self {
            Representation::Snapshot(_) => "snapshot",
            Representation::Delta(_) => "delta",
        }
    }

    pub fn is_snapshot(&self) -> bool {
        matches!(self, Representation::Snapshot(_))
    }

    pub fn is_delta(&self) -> bool {
        matches!(self, Representation::Delta(_))
    }

    /// Canonical JSON of the payload alone.
    pub fn payload_json(&self) -> String {
        match self {
            Representation::Snapshot(node) => node.to_canonical_json(),
            Representation::Delta(patch) => patch.to_canonical_json(),
        }
    }

    /// Stored size in bytes.
    pub fn encoded_len(&self) -> usize {
        match self {
            Representation::Snapshot(node) => node.encoded_len(),
            Representation::Delta(patch) => patch.encoded_len(),
        }
    }
}

/// One record in a document's revision log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: EntryId,
    pub document_id: DocumentId,
    /// Insertion counter within the document, starting at 0. Orders the log.
    pub seq: u64,
    /// Milliseconds since the Unix epoch.
    pub created_at: u64,
    pub trigger: Trigger,
    pub word_count: u64,
    pub char_count: u64,
    pub representation: Representation,
}

impl HistoryEntry {
    /// `created_at` as a UTC timestamp.
    pub fn created_at_utc(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.created_at as i64).unwrap_or_default()
    }
}

/// What a save does to the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryWrite {
    /// Append a new entry.
    Insert,
    /// Replace the latest entry, keeping its id and `seq`.
    Overwrite,
    /// Leave the log alone; the entry is the existing latest one.
    Unchanged,
}

/// Outcome of [`HistoryLog::record`], ready to be committed.
#[derive(Debug, Clone, PartialEq)]
pub struct Recorded {
    pub write: HistoryWrite,
    pub entry: HistoryEntry,
}

/// Summary produced by [`HistoryLog::verify`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogReport {
    pub document_id: DocumentId,
    pub entries: usize,
    pub snapshots: usize,
    pub deltas: usize,
    /// Sum of the encoded sizes of every stored representation.
    pub stored_bytes: usize,
    /// Whether replaying the whole log yields the document's current content.
    pub consistent: bool,
}

/// The history write and read paths over a backend.
#[derive(Clone)]
pub struct HistoryLog {
    backend: Arc<dyn BackendImpl>,
    coalesce_window: Duration,
    diff_options: DiffOptions,
    policy: SnapshotPolicy,
}

impl std::fmt::Debug for HistoryLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HistoryLog")
            .field("backend", &"<BackendImpl>")
            .field("coalesce_window", &self.coalesce_window)
            .field("diff_options", &self.diff_options)
            .finish()
    }
}

impl HistoryLog {
    pub fn new(backend: Arc<dyn BackendImpl>, coalesce_window: Duration, diff_options: DiffOptions) -> Self {
        Self {
            backend,
            coalesce_window,
            diff_options,
            policy: SnapshotPolicy,
        }
    }

    /// The baseline entry for a newly created document.
    pub fn baseline(&self, document_id: &DocumentId, content: &Node, now_ms: u64) -> HistoryEntry {
        new_entry(
            document_id,
            0,
            now_ms,
            Trigger::Baseline,
            content,
            Representation::Snapshot(content.clone()),
        )
    }

    /// Decide how saving `new_content` over `document` changes the log.
    ///
    /// Reads the latest entry (and, when coalescing over a delta, the entries
    /// before it) but writes nothing.
    pub async fn record(
        &self,
        document: &Document,
        trigger: Trigger,
        new_content: &Node,
        now_ms: u64,
    ) -> Result<Recorded> {
        let Some(latest) = self.backend.latest_entry(&document.id).await? else {
            debug!(document_id = %document.id, "No history yet, recording baseline");
            return Ok(Recorded {
                write: HistoryWrite::Insert,
                entry: self.baseline(&document.id, new_content, now_ms),
            });
        };

        let patch = diff_with(&document.content, new_content, &self.diff_options);
        if patch.is_empty() {
            debug!(document_id = %document.id, entry_id = %latest.id, "Content unchanged, history untouched");
            return Ok(Recorded {
                write: HistoryWrite::Unchanged,
                entry: latest,
            });
        }

        let age = now_ms.saturating_sub(latest.created_at);
        let coalesce = age < self.coalesce_window.as_millis() as u64 && latest.trigger != Trigger::Baseline;

        if coalesce {
            // The overwritten entry's delta must start from the state before it.
            let base = self.state_before(&latest).await?;
            let (patch, has_prior) = match &base {
                Some(base) => (diff_with(base, new_content, &self.diff_options), true),
                None => (Patch::new(), false),
            };
            let representation = self.policy.represent(trigger, has_prior, patch, new_content);
            debug!(
                document_id = %document.id,
                entry_id = %latest.id,
                age_ms = age,
                representation = representation.kind(),
                "Coalescing into latest history entry"
            );
            let mut entry = new_entry(
                &document.id,
                latest.seq,
                now_ms,
                trigger,
                new_content,
                representation,
            );
            entry.id = latest.id;
            return Ok(Recorded {
                write: HistoryWrite::Overwrite,
                entry,
            });
        }

        let representation = self.policy.represent(trigger, true, patch, new_content);
        debug!(
            document_id = %document.id,
            seq = latest.seq + 1,
            representation = representation.kind(),
            "Appending history entry"
        );
        Ok(Recorded {
            write: HistoryWrite::Insert,
            entry: new_entry(
                &document.id,
                latest.seq + 1,
                now_ms,
                trigger,
                new_content,
                representation,
            ),
        })
    }

    /// Content of the document as of `entry_id`.
    pub async fn reconstruct(&self, document_id: &DocumentId, entry_id: &EntryId) -> Result<Node> {
        let entries = self.backend.list_entries(document_id).await?;
        Ok(reconstruct_from(document_id, &entries, entry_id)?)
    }

    /// Replay the whole log and compare it with the stored document.
    pub async fn verify(&self, document_id: &DocumentId) -> Result<LogReport> {
        let document = self.backend.get_document(document_id).await?;
        let entries = self.backend.list_entries(document_id).await?;
        let Some(latest) = entries.last() else {
            return Err(HistoryError::EmptyLog {
                document_id: document_id.clone(),
            }
            .into());
        };

        let content = reconstruct_from(document_id, &entries, &latest.id)?;
        let snapshots = entries.iter().filter(|e| e.representation.is_snapshot()).count();
        let report = LogReport {
            document_id: document_id.clone(),
            entries: entries.len(),
            snapshots,
            deltas: entries.len() - snapshots,
            stored_bytes: entries.iter().map(|e| e.representation.encoded_len()).sum(),
            consistent: content == document.content,
        };
        if !report.consistent {
            warn!(%document_id, "Replayed history does not match stored content");
        }
        Ok(report)
    }

    /// Content as of the entry preceding `entry`, if there is one.
    async fn state_before(&self, entry: &HistoryEntry) -> Result<Option<Node>> {
        if entry.representation.is_snapshot() && entry.seq == 0 {
            return Ok(None);
        }
        let entries = self.backend.list_entries(&entry.document_id).await?;
        let Some(position) = entries.iter().position(|e| e.id == entry.id) else {
            return Ok(None);
        };
        if position == 0 {
            return Ok(None);
        }
        let previous = &entries[position - 1];
        Ok(Some(reconstruct_from(&entry.document_id, &entries, &previous.id)?))
    }
}

fn new_entry(
    document_id: &DocumentId,
    seq: u64,
    created_at: u64,
    trigger: Trigger,
    content: &Node,
    representation: Representation,
) -> HistoryEntry {
    HistoryEntry {
        id: EntryId::generate(),
        document_id: document_id.clone(),
        seq,
        created_at,
        trigger,
        word_count: content.word_count(),
        char_count: content.char_count(),
        representation,
    }
}

/// Reconstruct `entry_id` from a document's log, ordered oldest first.
///
/// Starts at the nearest snapshot at or before the target and applies each
/// delta forward.
pub fn reconstruct_from(
    document_id: &DocumentId,
    entries: &[HistoryEntry],
    entry_id: &EntryId,
) -> std::result::Result<Node, HistoryError> {
    let Some(target) = entries.iter().position(|e| &e.id == entry_id) else {
        return Err(HistoryError::EntryNotInDocument {
            document_id: document_id.clone(),
            entry_id: entry_id.clone(),
        });
    };
    let Some(base) = entries[..=target]
        .iter()
        .rposition(|e| e.representation.is_snapshot())
    else {
        error!(%document_id, %entry_id, "No snapshot precedes entry");
        return Err(HistoryError::MissingBaseSnapshot {
            document_id: document_id.clone(),
            entry_id: entry_id.clone(),
        });
    };

    let mut current = Node::Null;
    for entry in &entries[base..=target] {
        current = step(current, entry).map_err(|source| {
            error!(
                %document_id,
                %entry_id,
                failed_entry = %entry.id,
                error = %source,
                "Stored delta does not apply"
            );
            HistoryError::Reconstruction {
                document_id: document_id.clone(),
                entry_id: entry_id.clone(),
                failed_entry: entry.id.clone(),
                source,
            }
        })?;
    }
    Ok(current)
}

fn step(current: Node, entry: &HistoryEntry) -> std::result::Result<Node, crate::patch::PatchError> {
    match &entry.representation {
        Representation::Snapshot(node) => Ok(node.clone()),
        Representation::Delta(patch) => patch.apply_to(&current),
    }
}

/// Forward replay over a log, yielding the content after each entry.
///
/// The log must be ordered oldest first. Replay stops after the first error.
pub fn replay(entries: &[HistoryEntry]) -> Replay<'_> {
    Replay {
        entries: entries.iter(),
        current: None,
        failed: false,
    }
}

/// Iterator returned by [`replay`].
#[derive(Debug)]
pub struct Replay<'a> {
    entries: std::slice::Iter<'a, HistoryEntry>,
    current: Option<Node>,
    failed: bool,
}

impl<'a> Iterator for Replay<'a> {
    type Item = std::result::Result<(&'a HistoryEntry, Node), HistoryError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let entry = self.entries.next()?;
        let result = match (&entry.representation, self.current.take()) {
            (Representation::Snapshot(node), _) => Ok(node.clone()),
            (Representation::Delta(patch), Some(current)) => {
                patch
                    .apply_to(&current)
                    .map_err(|source| HistoryError::Reconstruction {
                        document_id: entry.document_id.clone(),
                        entry_id: entry.id.clone(),
                        failed_entry: entry.id.clone(),
                        source,
                    })
            }
            (Representation::Delta(_), None) => Err(HistoryError::MissingBaseSnapshot {
                document_id: entry.document_id.clone(),
                entry_id: entry.id.clone(),
            }),
        };
        match result {
            Ok(content) => {
                self.current = Some(content.clone());
                Some(Ok((entry, content)))
            }
            Err(err) => {
                self.failed = true;
                Some(Err(err))
            }
        }
    }
}
