//! Tokio driver for an [`EditScheduler`].

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{EditScheduler, SaveRequest, SaveResult, SchedulerState};
use crate::Result;
use crate::backend::Document;
use crate::clock::Clock;
use crate::config::SchedulerConfig;
use crate::content::Node;
use crate::id::DocumentId;
use crate::revision::{RevisionError, Revisions, SaveOutcome};

const COMMAND_BUFFER: usize = 64;
const EVENT_BUFFER: usize = 32;

/// Where an [`EditSession`] sends its saves.
#[async_trait]
pub trait Persist: Send + Sync {
    async fn persist(&self, request: &SaveRequest) -> Result<SaveOutcome>;
}

/// [`Persist`] over [`Revisions::save_edit`] that tracks the document version
/// across saves.
#[derive(Debug)]
pub struct RevisionsPersist {
    revisions: Revisions,
    document_id: DocumentId,
    version: AtomicU64,
}

impl RevisionsPersist {
    pub fn new(revisions: Revisions, document_id: DocumentId, version: u64) -> Self {
        Self {
            revisions,
            document_id,
            version: AtomicU64::new(version),
        }
    }

    /// The version the next save will expect.
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }
}

#[async_trait]
impl Persist for RevisionsPersist {
    async fn persist(&self, request: &SaveRequest) -> Result<SaveOutcome> {
        let outcome = self
            .revisions
            .save_edit(
                &self.document_id,
                self.version(),
                request.content.clone(),
                request.trigger,
            )
            .await?;
        if let SaveOutcome::Saved { version, .. } = &outcome {
            self.version.store(*version, Ordering::Release);
        }
        Ok(outcome)
    }
}

/// Something that happened to a session's saves.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Saved { version: u64 },
    /// The server holds a newer version. The session's unsaved content is
    /// parked and returned by [`EditSession::close`].
    Conflict { version: u64, content: Node },
    Locked,
    /// A transient failure; the save will be retried.
    Failed { error: String },
}

enum Command {
    Edit(Node),
    Flush,
    Close(oneshot::Sender<Option<Node>>),
}

type InFlight = Pin<Box<dyn Future<Output = Result<SaveOutcome>> + Send>>;

/// A running edit session for one document.
///
/// Edits are buffered and saved on the scheduler's timers. Dropping the
/// session without calling [`close`](Self::close) still flushes and finishes
/// outstanding saves in the background.
#[derive(Debug)]
pub struct EditSession {
    document_id: DocumentId,
    commands: mpsc::Sender<Command>,
    events: broadcast::Sender<SessionEvent>,
    task: JoinHandle<()>,
}

impl EditSession {
    /// Start a session that saves through `persist`.
    pub fn start(
        document_id: DocumentId,
        persist: Arc<dyn Persist>,
        config: SchedulerConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let (commands, rx) = mpsc::channel(COMMAND_BUFFER);
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        let driver = Driver {
            document_id: document_id.clone(),
            scheduler: EditScheduler::new(config),
            persist,
            clock,
            events: events.clone(),
            in_flight: None,
        };
        let task = tokio::spawn(driver.run(rx));
        info!(%document_id, "Edit session started");
        Self {
            document_id,
            commands,
            events,
            task,
        }
    }

    /// Start a session editing `document` through `revisions`, using its
    /// scheduler config and clock.
    pub fn for_document(revisions: &Revisions, document: &Document) -> Self {
        let persist = RevisionsPersist::new(revisions.clone(), document.id.clone(), document.version);
        Self::start(
            document.id.clone(),
            Arc::new(persist),
            revisions.config().scheduler,
            revisions.clock().clone(),
        )
    }

    pub fn document_id(&self) -> &DocumentId {
        &self.document_id
    }

    /// Receive events for saves issued after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Buffer new content.
    pub async fn edit(&self, content: Node) -> Result<()> {
        self.send(Command::Edit(content)).await
    }

    /// Save buffered content now, e.g. when the editor loses focus.
    pub async fn flush(&self) -> Result<()> {
        self.send(Command::Flush).await
    }

    /// Flush, wait for outstanding saves, and stop the session.
    ///
    /// Returns content that was not persisted: content the server rejected,
    /// or content whose final save failed.
    pub async fn close(self) -> Result<Option<Node>> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Close(reply)).await?;
        let unsaved = rx.await.map_err(|_| self.closed())?;
        let _ = self.task.await;
        info!(document_id = %self.document_id, unsaved = unsaved.is_some(), "Edit session closed");
        Ok(unsaved)
    }

    async fn send(&self, command: Command) -> Result<()> {
        self.commands.send(command).await.map_err(|_| self.closed())
    }

    fn closed(&self) -> crate::Error {
        RevisionError::SessionClosed {
            document_id: self.document_id.clone(),
        }
        .into()
    }
}

async fn wait(in_flight: &mut Option<InFlight>) -> Result<SaveOutcome> {
    match in_flight {
        Some(save) => save.await,
        None => std::future::pending().await,
    }
}

struct Driver {
    document_id: DocumentId,
    scheduler: EditScheduler,
    persist: Arc<dyn Persist>,
    clock: Arc<dyn Clock>,
    events: broadcast::Sender<SessionEvent>,
    in_flight: Option<InFlight>,
}

impl Driver {
    async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        let mut closing: Option<Option<oneshot::Sender<Option<Node>>>> = None;

        loop {
            if closing.is_some() && self.in_flight.is_none() {
                break;
            }

            let deadline = self.scheduler.next_deadline();
            let sleep = tokio::time::sleep(Duration::from_millis(
                deadline.map_or(0, |at| at.saturating_sub(self.clock.now_millis())),
            ));

            tokio::select! {
                command = commands.recv(), if closing.is_none() => match command {
                    Some(Command::Edit(content)) => {
                        self.scheduler.edit(content, self.clock.now_millis());
                    }
                    Some(Command::Flush) => {
                        let request = self.scheduler.flush(self.clock.now_millis());
                        self.issue(request);
                    }
                    Some(Command::Close(reply)) => {
                        let request = self.scheduler.flush(self.clock.now_millis());
                        self.issue(request);
                        closing = Some(Some(reply));
                    }
                    None => {
                        let request = self.scheduler.flush(self.clock.now_millis());
                        self.issue(request);
                        closing = Some(None);
                    }
                },
                _ = sleep, if deadline.is_some() && closing.is_none() => {
                    let request = self.scheduler.on_timer(self.clock.now_millis());
                    self.issue(request);
                }
                outcome = wait(&mut self.in_flight), if self.in_flight.is_some() => {
                    self.in_flight = None;
                    let result = self.report(outcome);
                    let request = self.scheduler.on_save_result(result, self.clock.now_millis());
                    self.issue(request);
                }
            }
        }

        // The scheduler is Clean after a saved or rejected final save, and
        // Pending with the content still buffered after a failed one.
        let unsaved = match self.scheduler.state() {
            SchedulerState::Pending => self.scheduler.unsaved().cloned(),
            _ => None,
        };
        let unsaved = unsaved.or_else(|| self.scheduler.take_rejected());
        if let Some(Some(reply)) = closing {
            let _ = reply.send(unsaved);
        }
        debug!(document_id = %self.document_id, "Edit session driver stopped");
    }

    fn issue(&mut self, request: Option<SaveRequest>) {
        let Some(request) = request else {
            return;
        };
        let persist = self.persist.clone();
        self.in_flight = Some(Box::pin(async move { persist.persist(&request).await }));
    }

    fn report(&self, outcome: Result<SaveOutcome>) -> SaveResult {
        let (event, result) = match outcome {
            Ok(SaveOutcome::Saved { version, .. }) => (SessionEvent::Saved { version }, SaveResult::Saved),
            Ok(SaveOutcome::Conflict { version, content }) => {
                warn!(document_id = %self.document_id, version, "Session save conflicted");
                (SessionEvent::Conflict { version, content }, SaveResult::Rejected)
            }
            Ok(SaveOutcome::Locked) => {
                warn!(document_id = %self.document_id, "Session save hit a locked document");
                (SessionEvent::Locked, SaveResult::Rejected)
            }
            Err(err) => {
                warn!(document_id = %self.document_id, error = %err, "Session save failed");
                (
                    SessionEvent::Failed {
                        error: err.to_string(),
                    },
                    SaveResult::Failed,
                )
            }
        };
        // No subscribers is fine.
        let _ = self.events.send(event);
        result
    }
}
