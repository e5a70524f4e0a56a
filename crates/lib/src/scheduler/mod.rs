//! Edit scheduling: when buffered edits are actually persisted.
//!
//! [`EditScheduler`] is a sans-IO state machine, one per open document. It
//! never reads a clock or sleeps; every method takes the current time in
//! milliseconds, and [`EditScheduler::next_deadline`] tells the caller when to
//! call [`EditScheduler::on_timer`]. Methods that start a save return a
//! [`SaveRequest`]; the caller persists it and reports back through
//! [`EditScheduler::on_save_result`].
//!
//! ```text
//!            edit                   timer (throttle ok)
//!   Clean ─────────▶ Pending ────────────────────────────▶ Saving
//!     ▲               │  ▲  timer (throttled): defer         │  │
//!     │               │  └──────┘                            │  │ edit
//!     │               │ flush                                │  ▼
//!     │               └────────────────────────────────▶ Saving  DirtyWhileSaving
//!     │                        result                      │        │ result: save latest
//!     └────────────────────────────────────────────────────┘        └──────▶ Saving
//! ```
//!
//! Guarantees:
//!
//! - at most one save is in flight
//! - a save always carries the newest buffered content at the moment it is issued
//! - unsaved content is held until a save succeeds or is rejected
//!
//! [`EditSession`] drives a scheduler on a tokio task against a [`Persist`]
//! implementation.

mod session;

use std::time::Duration;

use serde::Serialize;
use tracing::{debug, trace};

use crate::config::SchedulerConfig;
use crate::content::Node;
use crate::history::Trigger;

pub use session::{EditSession, Persist, RevisionsPersist, SessionEvent};

/// Scheduler state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SchedulerState {
    /// Nothing unsaved.
    Clean,
    /// An edit is buffered and a timer is running.
    Pending,
    /// A save is in flight and nothing newer is buffered.
    Saving,
    /// A save is in flight and a newer edit is buffered.
    DirtyWhileSaving,
}

/// A save the caller must perform.
#[derive(Debug, Clone, PartialEq)]
pub struct SaveRequest {
    pub content: Node,
    /// `Autosave` for timer-driven saves, `Blur` for flushes.
    pub trigger: Trigger,
}

/// How a save issued by the scheduler ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveResult {
    /// The content was committed.
    Saved,
    /// A transient failure; the content will be retried.
    Failed,
    /// The server refused the content (conflict or locked); retrying cannot help.
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TimerKind {
    /// Fires `debounce` after the last edit.
    Debounce,
    /// Fires once the throttle interval since the last attempt has passed.
    Deferred,
}

/// Per-document debounce/throttle/flush state machine.
#[derive(Debug, Clone)]
pub struct EditScheduler {
    debounce_ms: u64,
    throttle_ms: u64,
    state: SchedulerState,
    /// Newest content not yet handed to a save.
    buffered: Option<Node>,
    /// Content of the save in flight.
    in_flight: Option<Node>,
    timer: Option<(u64, TimerKind)>,
    last_attempt: Option<u64>,
    /// The next save started from `DirtyWhileSaving` was asked for by a flush.
    flush_requested: bool,
    rejected: Option<Node>,
}

impl EditScheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            debounce_ms: duration_ms(config.debounce),
            throttle_ms: duration_ms(config.throttle),
            state: SchedulerState::Clean,
            buffered: None,
            in_flight: None,
            timer: None,
            last_attempt: None,
            flush_requested: false,
            rejected: None,
        }
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    /// When [`on_timer`](Self::on_timer) should next be called, if at all.
    pub fn next_deadline(&self) -> Option<u64> {
        self.timer.map(|(at, _)| at)
    }

    /// Newest content that has not been committed yet.
    pub fn unsaved(&self) -> Option<&Node> {
        self.buffered.as_ref().or(self.in_flight.as_ref())
    }

    /// Content the server refused, if any. Cleared by this call.
    pub fn take_rejected(&mut self) -> Option<Node> {
        self.rejected.take()
    }

    /// Buffer an edit.
    pub fn edit(&mut self, content: Node, now_ms: u64) {
        self.buffered = Some(content);
        match self.state {
            SchedulerState::Clean | SchedulerState::Pending => {
                self.timer = Some((now_ms + self.debounce_ms, TimerKind::Debounce));
                self.state = SchedulerState::Pending;
                trace!(deadline = now_ms + self.debounce_ms, "Debounce timer (re)started");
            }
            SchedulerState::Saving | SchedulerState::DirtyWhileSaving => {
                self.state = SchedulerState::DirtyWhileSaving;
            }
        }
    }

    /// Fire the pending timer if it is due.
    pub fn on_timer(&mut self, now_ms: u64) -> Option<SaveRequest> {
        let (deadline, kind) = self.timer?;
        if now_ms < deadline || self.state != SchedulerState::Pending {
            return None;
        }
        match kind {
            TimerKind::Debounce => match self.last_attempt {
                Some(last) if now_ms.saturating_sub(last) < self.throttle_ms => {
                    let at = last + self.throttle_ms;
                    debug!(deferred_until = at, "Save throttled, deferring");
                    self.timer = Some((at, TimerKind::Deferred));
                    None
                }
                _ => self.start_save(Trigger::Autosave, now_ms),
            },
            TimerKind::Deferred => self.start_save(Trigger::Autosave, now_ms),
        }
    }

    /// Save buffered content now, bypassing the throttle.
    ///
    /// In `DirtyWhileSaving` the in-flight save must finish first; the save
    /// that follows it is then issued as a flush.
    pub fn flush(&mut self, now_ms: u64) -> Option<SaveRequest> {
        match self.state {
            SchedulerState::Pending => self.start_save(Trigger::Blur, now_ms),
            SchedulerState::DirtyWhileSaving => {
                self.flush_requested = true;
                None
            }
            SchedulerState::Clean | SchedulerState::Saving => None,
        }
    }

    /// Report how the in-flight save ended.
    pub fn on_save_result(&mut self, result: SaveResult, now_ms: u64) -> Option<SaveRequest> {
        if !matches!(
            self.state,
            SchedulerState::Saving | SchedulerState::DirtyWhileSaving
        ) {
            return None;
        }
        let dirty = self.state == SchedulerState::DirtyWhileSaving;

        match result {
            SaveResult::Saved => {
                self.in_flight = None;
                if dirty {
                    return self.resave(now_ms);
                }
                self.state = SchedulerState::Clean;
                None
            }
            SaveResult::Failed => {
                let failed = self.in_flight.take();
                if dirty {
                    return self.resave(now_ms);
                }
                self.buffered = failed;
                self.state = SchedulerState::Pending;
                let at = self.last_attempt.unwrap_or(now_ms) + self.throttle_ms;
                debug!(retry_at = at, "Save failed, retry scheduled");
                self.timer = Some((at, TimerKind::Deferred));
                None
            }
            SaveResult::Rejected => {
                self.rejected = self.buffered.take().or(self.in_flight.take());
                self.in_flight = None;
                self.timer = None;
                self.flush_requested = false;
                self.state = SchedulerState::Clean;
                debug!("Save rejected, unsaved content parked");
                None
            }
        }
    }

    fn resave(&mut self, now_ms: u64) -> Option<SaveRequest> {
        let trigger = if std::mem::take(&mut self.flush_requested) {
            Trigger::Blur
        } else {
            Trigger::Autosave
        };
        self.start_save(trigger, now_ms)
    }

    fn start_save(&mut self, trigger: Trigger, now_ms: u64) -> Option<SaveRequest> {
        let content = self.buffered.take()?;
        self.in_flight = Some(content.clone());
        self.last_attempt = Some(now_ms);
        self.timer = None;
        self.state = SchedulerState::Saving;
        debug!(%trigger, "Issuing save");
        Some(SaveRequest { content, trigger })
    }
}

fn duration_ms(duration: Duration) -> u64 {
    duration.as_millis() as u64
}
