//! Progress reporting
//!
//! Observers receive every `ProgressEvent` and must not block. The tracker
//! enforces the per-directive lifecycle:
//! pending → running → (completed | failed | cancelled).

use crate::error::ActionError;
use crate::models::{Directive, ProgressEvent, ProgressStatus};
use crate::Result;
use chrono::Utc;
use std::sync::Mutex;
use tokio::sync::mpsc;
use tracing::warn;

pub trait ProgressObserver: Send + Sync {
    fn on_progress(&self, event: &ProgressEvent);
}

impl<F> ProgressObserver for F
where
    F: Fn(&ProgressEvent) + Send + Sync,
{
    fn on_progress(&self, event: &ProgressEvent) {
        self(event)
    }
}

/// Observer that drops every event
pub struct NoopObserver;

impl ProgressObserver for NoopObserver {
    fn on_progress(&self, _event: &ProgressEvent) {}
}

/// Forwards events into an unbounded channel
pub struct ChannelProgressObserver {
    sender: mpsc::UnboundedSender<ProgressEvent>,
}

impl ChannelProgressObserver {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ProgressEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl ProgressObserver for ChannelProgressObserver {
    fn on_progress(&self, event: &ProgressEvent) {
        // Receiver gone means nobody is watching any more
        let _ = self.sender.send(event.clone());
    }
}

/// Whether `from → to` is a legal lifecycle step. `None` is "not yet reported".
pub fn can_transition(from: Option<ProgressStatus>, to: ProgressStatus) -> bool {
    use ProgressStatus::*;

    match (from, to) {
        (None, Pending) | (None, Cancelled) => true,
        (Some(Pending), Running) | (Some(Pending), Failed) | (Some(Pending), Cancelled) => true,
        (Some(Running), Running) | (Some(Running), Completed) | (Some(Running), Failed) => true,
        _ => false,
    }
}

/// Lifecycle-checked progress emitter for a single directive
pub struct ProgressTracker<'a> {
    directive: &'a Directive,
    observer: &'a dyn ProgressObserver,
    status: Mutex<Option<ProgressStatus>>,
}

impl<'a> ProgressTracker<'a> {
    pub fn new(directive: &'a Directive, observer: &'a dyn ProgressObserver) -> Self {
        Self {
            directive,
            observer,
            status: Mutex::new(None),
        }
    }

    pub fn status(&self) -> Option<ProgressStatus> {
        self.status.lock().ok().and_then(|guard| *guard)
    }

    /// Move to `status` and emit the event. Illegal transitions are internal errors.
    pub fn advance(
        &self,
        status: ProgressStatus,
        progress_percent: Option<u8>,
        message: Option<String>,
    ) -> Result<()> {
        {
            let mut current = self
                .status
                .lock()
                .map_err(|_| ActionError::Internal("progress state poisoned".to_string()))?;

            if !can_transition(*current, status) {
                return Err(ActionError::Internal(format!(
                    "illegal progress transition for directive {}: {:?} -> {}",
                    self.directive.index, *current, status
                )));
            }
            *current = Some(status);
        }

        self.emit(status, progress_percent, message);
        Ok(())
    }

    /// Report a running milestone. Ignored unless the directive is running.
    pub fn milestone(&self, progress_percent: u8, message: impl Into<String>) {
        self.running_update(Some(progress_percent.min(100)), message.into());
    }

    /// Running update without a percentage, e.g. a retry notice.
    pub fn note(&self, message: impl Into<String>) {
        self.running_update(None, message.into());
    }

    fn running_update(&self, progress_percent: Option<u8>, message: String) {
        if self.status() != Some(ProgressStatus::Running) {
            warn!(
                directive_index = self.directive.index,
                message = %message,
                "Running update outside running state ignored"
            );
            return;
        }
        self.emit(ProgressStatus::Running, progress_percent, Some(message));
    }

    fn emit(&self, status: ProgressStatus, progress_percent: Option<u8>, message: Option<String>) {
        let event = ProgressEvent {
            directive: self.directive.clone(),
            status,
            progress_percent,
            message,
            // Only work not yet handed to a surface can still be cancelled
            cancellable: status == ProgressStatus::Pending,
            timestamp: Utc::now(),
        };
        self.observer.on_progress(&event);
    }
}
