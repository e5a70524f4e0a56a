use folio::{
    Trigger,
    content::{Node, Path},
    history::{HistoryEntry, HistoryError, Representation, reconstruct_from, replay},
    id::{DocumentId, EntryId},
    patch::{Op, Patch},
};

use crate::helpers::{START_MS, essay, essay_edited, revisions_with_essay};

async fn oldest_first(revisions: &folio::Revisions, document_id: &DocumentId) -> Vec<HistoryEntry> {
    let mut entries = revisions.list_history(document_id).await.unwrap();
    entries.reverse();
    entries
}

#[tokio::test]
async fn test_document_starts_with_baseline_snapshot() {
    let (revisions, _clock, doc) = revisions_with_essay(3).await;

    let history = revisions.list_history(&doc.id).await.unwrap();
    assert_eq!(history.len(), 1);
    let baseline = &history[0];
    assert_eq!(baseline.trigger, Trigger::Baseline);
    assert_eq!(baseline.seq, 0);
    assert_eq!(baseline.created_at, START_MS);
    assert!(baseline.representation.is_snapshot());
    assert_eq!(baseline.word_count, essay(3).word_count());
    assert_eq!(revisions.reconstruct(&doc.id, &baseline.id).await.unwrap(), essay(3));
}

#[tokio::test]
async fn test_edits_within_window_coalesce() {
    let (revisions, clock, doc) = revisions_with_essay(10).await;
    let e1 = essay_edited(10, 4, "First attempt at the fourth paragraph.");
    let e2 = essay_edited(10, 4, "Second attempt at the fourth paragraph.");

    clock.advance(20_000);
    let saved = revisions
        .save_edit(&doc.id, 1, e1, Trigger::Autosave)
        .await
        .unwrap();
    assert_eq!(saved.version(), Some(2));
    let first_entry = revisions.list_history(&doc.id).await.unwrap()[0].clone();

    clock.advance(3_000);
    let saved = revisions
        .save_edit(&doc.id, 2, e2.clone(), Trigger::Autosave)
        .await
        .unwrap();
    assert_eq!(saved.version(), Some(3));

    let history = revisions.list_history(&doc.id).await.unwrap();
    let edits: Vec<_> = history
        .iter()
        .filter(|e| e.trigger != Trigger::Baseline)
        .collect();
    assert_eq!(edits.len(), 1);

    let latest = edits[0];
    // Overwritten in place.
    assert_eq!(latest.id, first_entry.id);
    assert_eq!(latest.seq, first_entry.seq);
    assert_eq!(latest.created_at, START_MS + 23_000);
    assert!(latest.representation.is_delta());
    assert_eq!(revisions.reconstruct(&doc.id, &latest.id).await.unwrap(), e2);
}

#[tokio::test]
async fn test_edit_right_after_baseline_never_coalesces() {
    let (revisions, clock, doc) = revisions_with_essay(4).await;
    clock.advance(1_000);
    revisions
        .save_edit(&doc.id, 1, essay_edited(4, 0, "Quick fix."), Trigger::Autosave)
        .await
        .unwrap();

    let history = oldest_first(&revisions, &doc.id).await;
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].trigger, Trigger::Baseline);
    assert_eq!(revisions.reconstruct(&doc.id, &history[0].id).await.unwrap(), essay(4));
}

#[tokio::test]
async fn test_spaced_edits_get_separate_entries() {
    let (revisions, clock, doc) = revisions_with_essay(10).await;
    let e1 = essay_edited(10, 1, "Light reactions happen in the thylakoids.");
    let e2 = essay_edited(10, 1, "Light reactions happen in the thylakoid membranes.");

    clock.advance(20_000);
    revisions
        .save_edit(&doc.id, 1, e1.clone(), Trigger::Autosave)
        .await
        .unwrap();
    clock.advance(20_000);
    revisions
        .save_edit(&doc.id, 2, e2.clone(), Trigger::Blur)
        .await
        .unwrap();

    let history = oldest_first(&revisions, &doc.id).await;
    assert_eq!(history.len(), 3);
    assert_eq!(history[1].trigger, Trigger::Autosave);
    assert_eq!(history[2].trigger, Trigger::Blur);
    assert_eq!(history[1].seq, 1);
    assert_eq!(history[2].seq, 2);
    assert_eq!(revisions.reconstruct(&doc.id, &history[1].id).await.unwrap(), e1);
    assert_eq!(revisions.reconstruct(&doc.id, &history[2].id).await.unwrap(), e2);
}

#[tokio::test]
async fn test_snapshot_sizing() {
    let (revisions, clock, doc) = revisions_with_essay(50).await;

    clock.advance(20_000);
    revisions
        .save_edit(&doc.id, 1, essay_edited(50, 25, "One changed sentence."), Trigger::Autosave)
        .await
        .unwrap();

    let rewrite = Node::map([
        ("title", Node::from("Cellular respiration")),
        (
            "blocks",
            Node::list(
                (0..40)
                    .map(|i| Node::from(format!("Sentence {i} about mitochondria and ATP.")))
                    .collect(),
            ),
        ),
    ]);
    clock.advance(20_000);
    revisions
        .save_edit(&doc.id, 2, rewrite.clone(), Trigger::Autosave)
        .await
        .unwrap();

    let history = oldest_first(&revisions, &doc.id).await;
    assert!(history[1].representation.is_delta());
    assert!(history[2].representation.is_snapshot());
    assert_eq!(history[2].representation, Representation::Snapshot(rewrite));
}

#[tokio::test]
async fn test_latest_entry_reconstructs_current_content() {
    let (revisions, clock, doc) = revisions_with_essay(12).await;
    let mut version = doc.version;
    for (i, step) in [20_000, 2_000, 30_000, 4_000, 4_000, 60_000].into_iter().enumerate() {
        clock.advance(step);
        let content = essay_edited(12, i, &format!("Revision {i} of this paragraph."));
        version = revisions
            .save_edit(&doc.id, version, content, Trigger::Autosave)
            .await
            .unwrap()
            .version()
            .unwrap();
    }

    let current = revisions.get_document(&doc.id).await.unwrap();
    assert_eq!(current.version, 7);
    let latest = revisions.list_history(&doc.id).await.unwrap().remove(0);
    assert_eq!(revisions.reconstruct(&doc.id, &latest.id).await.unwrap(), current.content);

    let report = revisions.verify(&doc.id).await.unwrap();
    assert!(report.consistent);
    assert_eq!(report.entries, report.snapshots + report.deltas);
}

#[tokio::test]
async fn test_replay_stopped_early_matches_reconstruct() {
    let (revisions, clock, doc) = revisions_with_essay(6).await;
    let mut version = doc.version;
    for i in 0..5 {
        clock.advance(15_000);
        let content = if i == 2 {
            // A rewrite, so a snapshot sits mid-log.
            Node::map([("title", Node::from("Fresh start"))])
        } else {
            essay_edited(6, i, &format!("Edit number {i}."))
        };
        version = revisions
            .save_edit(&doc.id, version, content, Trigger::Autosave)
            .await
            .unwrap()
            .version()
            .unwrap();
    }

    let entries = oldest_first(&revisions, &doc.id).await;
    assert_eq!(entries.len(), 6);
    for target in &entries {
        let (_, replayed) = replay(&entries)
            .map(Result::unwrap)
            .find(|(entry, _)| entry.id == target.id)
            .unwrap();
        assert_eq!(replayed, revisions.reconstruct(&doc.id, &target.id).await.unwrap());
    }
}

#[tokio::test]
async fn test_entry_from_other_document_is_rejected() {
    let (revisions, _clock, doc) = revisions_with_essay(2).await;
    let other = revisions.create_document(Node::from("Other")).await.unwrap();
    let other_baseline = revisions.list_history(&other.id).await.unwrap().remove(0);

    let err = revisions
        .reconstruct(&doc.id, &other_baseline.id)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        folio::Error::History(HistoryError::EntryNotInDocument { .. })
    ));

    let err = revisions
        .reconstruct(&doc.id, &EntryId::new("missing"))
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

fn entry(seq: u64, representation: Representation) -> HistoryEntry {
    HistoryEntry {
        id: EntryId::new(format!("entry-{seq}")),
        document_id: DocumentId::new("doc"),
        seq,
        created_at: START_MS + seq * 20_000,
        trigger: if seq == 0 { Trigger::Baseline } else { Trigger::Autosave },
        word_count: 0,
        char_count: 0,
        representation,
    }
}

#[test]
fn test_damaged_delta_surfaces_as_history_unavailable() {
    let doc = DocumentId::new("doc");
    let entries = vec![
        entry(0, Representation::Snapshot(Node::map([("title", Node::from("A"))]))),
        entry(
            1,
            Representation::Delta(Patch::from(vec![Op::Replace {
                path: Path::root().key("title"),
                value: Node::from("B"),
            }])),
        ),
        entry(
            2,
            Representation::Delta(Patch::from(vec![Op::Remove {
                path: Path::root().key("subtitle"),
            }])),
        ),
        entry(3, Representation::Snapshot(Node::from("Recovered"))),
    ];

    assert_eq!(
        reconstruct_from(&doc, &entries, &entries[1].id).unwrap(),
        Node::map([("title", Node::from("B"))])
    );

    let err = reconstruct_from(&doc, &entries, &entries[2].id).unwrap_err();
    assert!(err.is_integrity_error());
    match &err {
        HistoryError::Reconstruction { failed_entry, .. } => assert_eq!(failed_entry, &entries[2].id),
        other => panic!("unexpected error: {other}"),
    }

    // A later snapshot is unaffected by the damaged delta before it.
    assert_eq!(
        reconstruct_from(&doc, &entries, &entries[3].id).unwrap(),
        Node::from("Recovered")
    );

    // Replay stops at the first failure.
    let results: Vec<_> = replay(&entries).collect();
    assert_eq!(results.len(), 3);
    assert!(results[2].is_err());
}

#[test]
fn test_log_starting_with_delta_has_no_base() {
    let doc = DocumentId::new("doc");
    let entries = vec![entry(0, Representation::Delta(Patch::new()))];
    let err = reconstruct_from(&doc, &entries, &entries[0].id).unwrap_err();
    assert!(matches!(err, HistoryError::MissingBaseSnapshot { .. }));
}

#[tokio::test]
async fn test_negative_zero_is_a_real_edit() {
    let (revisions, clock) = crate::helpers::test_revisions().await;
    let score = |value: f64| Node::map([("score", Node::Float(value))]);
    let doc = revisions.create_document(score(0.0)).await.unwrap();

    clock.advance(20_000);
    revisions
        .save_edit(&doc.id, 1, score(-0.0), Trigger::Autosave)
        .await
        .unwrap();

    let history = revisions.list_history(&doc.id).await.unwrap();
    assert_eq!(history.len(), 2);
    let rebuilt = revisions.reconstruct(&doc.id, &history[0].id).await.unwrap();
    assert_eq!(rebuilt.to_canonical_json(), r#"{"score":-0.0}"#);
    let current = revisions.get_document(&doc.id).await.unwrap();
    assert_eq!(rebuilt.to_canonical_json(), current.content.to_canonical_json());
}
