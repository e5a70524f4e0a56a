use tokio::task::JoinSet;

use folio::{DocumentId, SaveOutcome, Trigger, content::Node};

use crate::helpers::{essay, essay_edited, revisions_with_essay, test_revisions};

#[tokio::test]
async fn test_create_and_get_document() {
    let (revisions, _clock) = test_revisions().await;
    let a = revisions.create_document(essay(2)).await.unwrap();
    let b = revisions.create_document(Node::empty_map()).await.unwrap();

    assert_eq!(a.version, 1);
    assert!(!a.locked);
    assert_eq!(revisions.get_document(&a.id).await.unwrap(), a);

    let mut ids = revisions.list_documents().await.unwrap();
    ids.sort();
    let mut expected = vec![a.id.clone(), b.id.clone()];
    expected.sort();
    assert_eq!(ids, expected);
}

#[tokio::test]
async fn test_stale_writer_gets_conflict_with_winner_state() {
    let (revisions, clock, doc) = revisions_with_essay(5).await;
    let mut version = doc.version;
    for i in 0..4 {
        clock.advance(20_000);
        version = revisions
            .save_edit(&doc.id, version, essay_edited(5, i, "warm-up"), Trigger::Autosave)
            .await
            .unwrap()
            .version()
            .unwrap();
    }
    assert_eq!(version, 5);

    // Writer A reads version 5.
    let seen_by_a = revisions.get_document(&doc.id).await.unwrap();
    assert_eq!(seen_by_a.version, 5);

    // Writer B commits first.
    let b_content = essay_edited(5, 4, "Writer B got here first.");
    clock.advance(20_000);
    let b = revisions
        .save_edit(&doc.id, 5, b_content.clone(), Trigger::Autosave)
        .await
        .unwrap();
    assert_eq!(
        b,
        SaveOutcome::Saved {
            version: 6,
            content: b_content.clone()
        }
    );

    // Writer A is told about B's state.
    clock.advance(1_000);
    let a = revisions
        .save_edit(&doc.id, seen_by_a.version, essay_edited(5, 4, "Writer A's lost edit."), Trigger::Blur)
        .await
        .unwrap();
    assert_eq!(
        a,
        SaveOutcome::Conflict {
            version: 6,
            content: b_content.clone()
        }
    );

    let stored = revisions.get_document(&doc.id).await.unwrap();
    assert_eq!(stored.version, 6);
    assert_eq!(stored.content, b_content);
    assert!(revisions.verify(&doc.id).await.unwrap().consistent);
}

#[tokio::test]
async fn test_racing_writers_produce_one_winner() {
    let (revisions, clock, doc) = revisions_with_essay(5).await;
    clock.advance(20_000);

    let mut writers = JoinSet::new();
    for i in 0..8 {
        let revisions = revisions.clone();
        let id = doc.id.clone();
        writers.spawn(async move {
            revisions
                .save_edit(&id, 1, essay_edited(5, 0, &format!("Writer {i}")), Trigger::Autosave)
                .await
                .unwrap()
        });
    }

    let mut saved = Vec::new();
    let mut conflicts = 0;
    while let Some(outcome) = writers.join_next().await {
        match outcome.unwrap() {
            SaveOutcome::Saved { content, .. } => saved.push(content),
            SaveOutcome::Conflict { version, .. } => {
                assert_eq!(version, 2);
                conflicts += 1;
            }
            SaveOutcome::Locked => panic!("document is not locked"),
        }
    }
    assert_eq!(saved.len(), 1);
    assert_eq!(conflicts, 7);

    let stored = revisions.get_document(&doc.id).await.unwrap();
    assert_eq!(stored.version, 2);
    assert_eq!(stored.content, saved[0]);
    assert_eq!(revisions.list_history(&doc.id).await.unwrap().len(), 2);
    assert!(revisions.verify(&doc.id).await.unwrap().consistent);
}

#[tokio::test]
async fn test_locked_document_rejects_every_edit() {
    let (revisions, clock, doc) = revisions_with_essay(3).await;
    clock.advance(20_000);
    revisions
        .save_edit(&doc.id, 1, essay_edited(3, 0, "Final answer."), Trigger::Blur)
        .await
        .unwrap();

    let finalized = revisions.finalize(&doc.id).await.unwrap();
    assert!(finalized.locked);
    assert_eq!(finalized.version, 2);
    // Idempotent.
    assert!(revisions.finalize(&doc.id).await.unwrap().locked);

    let history_before = revisions.list_history(&doc.id).await.unwrap();
    for expected in [1, 2, 3] {
        clock.advance(20_000);
        let outcome = revisions
            .save_edit(&doc.id, expected, essay(1), Trigger::Autosave)
            .await
            .unwrap();
        assert_eq!(outcome, SaveOutcome::Locked);
    }

    let baseline = history_before.last().unwrap();
    assert!(
        revisions
            .restore(&doc.id, &baseline.id, 2)
            .await
            .unwrap()
            .is_locked()
    );

    let stored = revisions.get_document(&doc.id).await.unwrap();
    assert_eq!(stored.version, 2);
    assert_eq!(stored.content, essay_edited(3, 0, "Final answer."));
    assert_eq!(revisions.list_history(&doc.id).await.unwrap(), history_before);
}

#[tokio::test]
async fn test_restore_commits_snapshot_of_earlier_entry() {
    let (revisions, clock, doc) = revisions_with_essay(4).await;
    clock.advance(20_000);
    revisions
        .save_edit(&doc.id, 1, essay_edited(4, 1, "Detour."), Trigger::Autosave)
        .await
        .unwrap();
    clock.advance(20_000);
    revisions
        .save_edit(&doc.id, 2, essay_edited(4, 2, "Another detour."), Trigger::Autosave)
        .await
        .unwrap();

    let baseline = revisions.list_history(&doc.id).await.unwrap().pop().unwrap();
    clock.advance(20_000);
    let outcome = revisions.restore(&doc.id, &baseline.id, 3).await.unwrap();
    assert_eq!(
        outcome,
        SaveOutcome::Saved {
            version: 4,
            content: essay(4)
        }
    );

    let latest = revisions.list_history(&doc.id).await.unwrap().remove(0);
    assert_eq!(latest.trigger, Trigger::Restore);
    assert!(latest.representation.is_snapshot());

    // Restoring with a stale version is a conflict like any other save.
    let stale = revisions.restore(&doc.id, &baseline.id, 3).await.unwrap();
    assert!(stale.is_conflict());
}

#[tokio::test]
async fn test_unchanged_save_bumps_version_without_history() {
    let (revisions, clock, doc) = revisions_with_essay(2).await;
    clock.advance(20_000);
    let outcome = revisions
        .save_edit(&doc.id, 1, essay(2), Trigger::Blur)
        .await
        .unwrap();
    assert_eq!(outcome.version(), Some(2));
    assert_eq!(revisions.list_history(&doc.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_invalid_requests_are_errors() {
    let (revisions, clock, doc) = revisions_with_essay(1).await;

    let err = revisions
        .save_edit(&doc.id, 0, essay(1), Trigger::Autosave)
        .await
        .unwrap_err();
    assert!(err.is_invalid_input());
    assert_eq!(err.module(), "revision");

    clock.advance(20_000);
    let err = revisions
        .save_edit(&doc.id, 1, essay(2), Trigger::Baseline)
        .await
        .unwrap_err();
    assert!(err.is_invalid_input());
    let current = revisions.get_document(&doc.id).await.unwrap();
    assert_eq!(current.version, 1);
    assert_eq!(revisions.list_history(&doc.id).await.unwrap().len(), 1);

    // The refused baseline leaves coalescing intact for later saves
    revisions
        .save_edit(&doc.id, 1, essay(2), Trigger::Autosave)
        .await
        .unwrap();
    clock.advance(1_000);
    revisions
        .save_edit(&doc.id, 2, essay(3), Trigger::Autosave)
        .await
        .unwrap();
    let triggers: Vec<Trigger> = revisions
        .list_history(&doc.id)
        .await
        .unwrap()
        .iter()
        .map(|e| e.trigger)
        .collect();
    assert_eq!(triggers, vec![Trigger::Autosave, Trigger::Baseline]);

    let missing = DocumentId::new("no-such-document");
    let err = revisions
        .save_edit(&missing, 1, essay(1), Trigger::Autosave)
        .await
        .unwrap_err();
    assert!(err.is_not_found());
    assert!(revisions.list_history(&missing).await.unwrap_err().is_not_found());
    assert!(revisions.finalize(&missing).await.unwrap_err().is_not_found());
}
