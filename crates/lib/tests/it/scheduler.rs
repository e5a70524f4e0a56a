use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::{Instant, sleep};

use folio::{
    RevisionConfig, Revisions, SaveOutcome, TokioClock, Trigger,
    backend::Document,
    content::Node,
    scheduler::{EditSession, Persist, RevisionsPersist, SaveRequest, SessionEvent},
};

use crate::helpers::{essay, essay_edited, test_backend};

async fn paused_revisions() -> (Revisions, Document) {
    let revisions = Revisions::open_with_clock(
        test_backend().await,
        RevisionConfig::default(),
        Arc::new(TokioClock::new()),
    )
    .unwrap();
    let document = revisions.create_document(essay(4)).await.unwrap();
    (revisions, document)
}

fn draft(n: usize) -> Node {
    essay_edited(4, 0, &format!("Draft {n} of the opening paragraph."))
}

fn assert_elapsed(start: Instant, expected: Duration) {
    let elapsed = start.elapsed();
    assert!(
        elapsed >= expected && elapsed < expected + Duration::from_millis(50),
        "elapsed {elapsed:?}, expected {expected:?}"
    );
}

#[tokio::test(start_paused = true)]
async fn test_typing_burst_is_debounced_then_throttled() {
    let (revisions, doc) = paused_revisions().await;
    let session = EditSession::for_document(&revisions, &doc);
    let mut events = session.subscribe();
    let start = Instant::now();

    for n in 0..3 {
        session.edit(draft(n)).await.unwrap();
        sleep(Duration::from_secs(1)).await;
    }
    // Quiet for the debounce interval after the last edit at 2s.
    assert_eq!(events.recv().await.unwrap(), SessionEvent::Saved { version: 2 });
    assert_elapsed(start, Duration::from_secs(7));

    session.edit(draft(3)).await.unwrap();
    // Debounce would fire at 12s; the throttle holds it until 7s + 15s.
    assert_eq!(events.recv().await.unwrap(), SessionEvent::Saved { version: 3 });
    assert_elapsed(start, Duration::from_secs(22));

    assert_eq!(session.close().await.unwrap(), None);

    let stored = revisions.get_document(&doc.id).await.unwrap();
    assert_eq!(stored.content, draft(3));
    let history = revisions.list_history(&doc.id).await.unwrap();
    assert_eq!(history.len(), 3);
    assert!(history[..2].iter().all(|e| e.trigger == Trigger::Autosave));
}

#[tokio::test(start_paused = true)]
async fn test_flush_saves_immediately() {
    let (revisions, doc) = paused_revisions().await;
    let session = EditSession::for_document(&revisions, &doc);
    let mut events = session.subscribe();
    let start = Instant::now();

    session.edit(draft(1)).await.unwrap();
    session.flush().await.unwrap();
    assert_eq!(events.recv().await.unwrap(), SessionEvent::Saved { version: 2 });
    assert_elapsed(start, Duration::ZERO);

    let latest = revisions.list_history(&doc.id).await.unwrap().remove(0);
    assert_eq!(latest.trigger, Trigger::Blur);
    session.close().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_close_flushes_pending_edit() {
    let (revisions, doc) = paused_revisions().await;
    let session = EditSession::for_document(&revisions, &doc);

    session.edit(draft(1)).await.unwrap();
    session.edit(draft(2)).await.unwrap();
    assert_eq!(session.close().await.unwrap(), None);

    let stored = revisions.get_document(&doc.id).await.unwrap();
    assert_eq!(stored.version, 2);
    assert_eq!(stored.content, draft(2));
}

#[tokio::test(start_paused = true)]
async fn test_dropped_session_still_saves() {
    let (revisions, doc) = paused_revisions().await;
    let session = EditSession::for_document(&revisions, &doc);
    session.edit(draft(1)).await.unwrap();
    drop(session);

    sleep(Duration::from_millis(10)).await;
    let stored = revisions.get_document(&doc.id).await.unwrap();
    assert_eq!(stored.content, draft(1));
}

#[tokio::test(start_paused = true)]
async fn test_conflict_parks_unsaved_content() {
    let (revisions, doc) = paused_revisions().await;
    let session = EditSession::for_document(&revisions, &doc);
    let mut events = session.subscribe();

    // Another tab saves first.
    let theirs = essay_edited(4, 3, "Saved from another tab.");
    revisions
        .save_edit(&doc.id, 1, theirs.clone(), Trigger::Blur)
        .await
        .unwrap();

    session.edit(draft(1)).await.unwrap();
    session.flush().await.unwrap();
    assert_eq!(
        events.recv().await.unwrap(),
        SessionEvent::Conflict {
            version: 2,
            content: theirs.clone()
        }
    );

    assert_eq!(session.close().await.unwrap(), Some(draft(1)));
    assert_eq!(revisions.get_document(&doc.id).await.unwrap().content, theirs);
}

#[tokio::test(start_paused = true)]
async fn test_locked_document_is_reported() {
    let (revisions, doc) = paused_revisions().await;
    let session = EditSession::for_document(&revisions, &doc);
    let mut events = session.subscribe();
    revisions.finalize(&doc.id).await.unwrap();

    session.edit(draft(1)).await.unwrap();
    session.flush().await.unwrap();
    assert_eq!(events.recv().await.unwrap(), SessionEvent::Locked);
    assert_eq!(session.close().await.unwrap(), Some(draft(1)));
}

/// Fails the first save with an I/O error, then delegates.
struct FlakyOnce {
    inner: RevisionsPersist,
    failed: AtomicBool,
}

#[async_trait]
impl Persist for FlakyOnce {
    async fn persist(&self, request: &SaveRequest) -> folio::Result<SaveOutcome> {
        if !self.failed.swap(true, Ordering::SeqCst) {
            return Err(std::io::Error::other("connection reset").into());
        }
        self.inner.persist(request).await
    }
}

#[tokio::test(start_paused = true)]
async fn test_failed_save_is_retried_after_throttle() {
    let (revisions, doc) = paused_revisions().await;
    let persist = Arc::new(FlakyOnce {
        inner: RevisionsPersist::new(revisions.clone(), doc.id.clone(), doc.version),
        failed: AtomicBool::new(false),
    });
    let session = EditSession::start(
        doc.id.clone(),
        persist.clone(),
        revisions.config().scheduler,
        revisions.clock().clone(),
    );
    let mut events = session.subscribe();
    let start = Instant::now();

    session.edit(draft(1)).await.unwrap();
    assert!(matches!(events.recv().await.unwrap(), SessionEvent::Failed { .. }));
    assert_elapsed(start, Duration::from_secs(5));

    assert_eq!(events.recv().await.unwrap(), SessionEvent::Saved { version: 2 });
    assert_elapsed(start, Duration::from_secs(20));
    assert_eq!(persist.inner.version(), 2);

    assert_eq!(session.close().await.unwrap(), None);
    assert_eq!(revisions.get_document(&doc.id).await.unwrap().content, draft(1));
}

#[tokio::test(start_paused = true)]
async fn test_new_session_resumes_from_stored_version() {
    let (revisions, doc) = paused_revisions().await;
    let session = EditSession::for_document(&revisions, &doc);
    session.edit(draft(1)).await.unwrap();
    let id = session.document_id().clone();
    session.close().await.unwrap();

    let doc = revisions.get_document(&id).await.unwrap();
    assert_eq!(doc.version, 2);
    let session = EditSession::for_document(&revisions, &doc);
    session.edit(draft(2)).await.unwrap();
    assert_eq!(session.close().await.unwrap(), None);
    assert_eq!(revisions.get_document(&id).await.unwrap().version, 3);
}
