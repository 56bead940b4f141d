//! Action dispatcher - the directive state machine
//!
//! TEXT → PARSE → (CANCEL? → VALIDATE → CANCEL? → EXECUTE w/ RETRY → UNDO → AUDIT)*
//!
//! Directives run strictly one at a time, in input order. Only bookkeeping
//! failures (progress lifecycle, audit sink) escape as errors; everything a
//! directive can do wrong ends up in its `ExecutionResult`.

use crate::audit::AuditSink;
use crate::cancellation::CancellationSource;
use crate::config::EngineConfig;
use crate::models::{AuditRecord, Directive, ExecutionResult, ProgressStatus};
use crate::parser::parse_directives;
use crate::progress::{NoopObserver, ProgressObserver, ProgressTracker};
use crate::retry::RetryPolicy;
use crate::safety::SafetyValidator;
use crate::state::{ActionHistory, KeyValueStore};
use crate::surfaces::Surfaces;
use crate::undo::{TabCompensator, UndoEntry, UndoLedger, UndoOutcome, UndoReport};
use crate::Result;
use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

mod handlers;


pub const CANCELLED_MESSAGE: &str = "Action was cancelled";

pub struct ActionDispatcher {
    surfaces: Surfaces,
    validator: SafetyValidator,
    retry_policy: RetryPolicy,
    undo_ledger: Arc<UndoLedger>,
    audit: Arc<dyn AuditSink>,
    observer: Arc<dyn ProgressObserver>,
    history: Option<ActionHistory>,
    config: EngineConfig,
}

impl ActionDispatcher {
    pub fn new(surfaces: Surfaces, audit: Arc<dyn AuditSink>, config: EngineConfig) -> Self {
        let compensator = Arc::new(TabCompensator::new(surfaces.tabs.clone()));

        Self {
            validator: SafetyValidator::new(config.safety.clone()),
            retry_policy: RetryPolicy::new(config.retry.clone()),
            undo_ledger: Arc::new(UndoLedger::new(compensator)),
            observer: Arc::new(NoopObserver),
            history: None,
            surfaces,
            audit,
            config,
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn ProgressObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Share an existing ledger, e.g. one the UI also undoes from.
    pub fn with_undo_ledger(mut self, ledger: Arc<UndoLedger>) -> Self {
        self.undo_ledger = ledger;
        self
    }

    /// Record every terminal outcome into a recent-action history.
    pub fn with_history(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.history = Some(ActionHistory::new(
            store,
            self.config.history_limit,
            self.config.history_ttl(),
        ));
        self
    }

    pub fn undo_ledger(&self) -> Arc<UndoLedger> {
        self.undo_ledger.clone()
    }

    pub fn history(&self) -> Option<&ActionHistory> {
        self.history.as_ref()
    }

    pub async fn undo_last(&self) -> Option<UndoOutcome> {
        self.undo_ledger.undo_last().await
    }

    pub async fn undo_all(&self) -> UndoReport {
        self.undo_ledger.undo_all().await
    }

    /// Parse `text` and dispatch every directive found in it.
    pub async fn dispatch_text(
        &self,
        text: &str,
        cancel: &dyn CancellationSource,
    ) -> Result<Vec<ExecutionResult>> {
        let directives = parse_directives(text);
        self.dispatch(&directives, cancel).await
    }

    /// Process `directives` sequentially. The result list mirrors the input.
    pub async fn dispatch(
        &self,
        directives: &[Directive],
        cancel: &dyn CancellationSource,
    ) -> Result<Vec<ExecutionResult>> {
        let start = Instant::now();
        let mut results = Vec::with_capacity(directives.len());

        info!(directive_count = directives.len(), "Dispatching directives");

        for directive in directives {
            let result = self.process(directive, cancel).await?;

            self.audit
                .append(AuditRecord {
                    directive: directive.clone(),
                    success: result.success,
                    error_message: result.error.clone(),
                    timestamp: Utc::now(),
                })
                .await?;

            if let Some(history) = &self.history {
                if let Err(e) = history.record(&result).await {
                    warn!(directive_index = directive.index, error = %e, "Failed to record history");
                }
            }

            results.push(result);
        }

        let succeeded = results.iter().filter(|r| r.success).count();
        info!(
            directive_count = results.len(),
            succeeded,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Dispatch completed"
        );

        Ok(results)
    }

    async fn process(
        &self,
        directive: &Directive,
        cancel: &dyn CancellationSource,
    ) -> Result<ExecutionResult> {
        let tracker = ProgressTracker::new(directive, self.observer.as_ref());

        debug!(
            directive_index = directive.index,
            kind = %directive.kind,
            raw = %directive.raw,
            "Processing directive"
        );

        // -------------------------------------------------
        // 1️⃣ CANCELLATION BEFORE ANY WORK
        // -------------------------------------------------
        if cancel.is_cancelled(directive) {
            return self.cancel(directive, &tracker);
        }

        tracker.advance(ProgressStatus::Pending, None, None)?;

        // -------------------------------------------------
        // 2️⃣ SAFETY VALIDATION (never retried)
        // -------------------------------------------------
        let outcome = self.validator.validate(directive);
        if !outcome.valid {
            let error = outcome
                .error_message
                .unwrap_or_else(|| format!("Invalid {} directive", directive.kind));

            warn!(
                directive_index = directive.index,
                kind = %directive.kind,
                error = %error,
                "Directive rejected"
            );
            tracker.advance(ProgressStatus::Failed, None, Some(error.clone()))?;

            return Ok(ExecutionResult {
                directive: directive.clone(),
                status: ProgressStatus::Failed,
                success: false,
                error: Some(error),
                retryable: false,
                attempts: 0,
                output: None,
            });
        }

        // -------------------------------------------------
        // 3️⃣ CANCELLATION BEFORE EXPENSIVE WORK
        // -------------------------------------------------
        if cancel.is_cancelled(directive) {
            return self.cancel(directive, &tracker);
        }

        tracker.advance(
            ProgressStatus::Running,
            Some(0),
            Some(format!("Starting {}", directive.kind)),
        )?;

        // -------------------------------------------------
        // 4️⃣ HANDLER VIA RETRY POLICY
        // -------------------------------------------------
        let payload = outcome.sanitized_payload;
        let payload = payload.as_deref();
        let surfaces = &self.surfaces;
        let validator = &self.validator;
        let progress = &tracker;

        let executed = self
            .retry_policy
            .run_with_retry(
                directive.kind,
                move || handlers::execute(surfaces, validator, directive, payload, progress),
                |attempt, max| progress.note(format!("Retrying ({}/{})", attempt, max)),
            )
            .await;

        match executed {
            Ok(retried) => {
                let handlers::HandlerOutcome { output, undo } = retried.value;
                tracker.advance(ProgressStatus::Completed, Some(100), Some("Completed".to_string()))?;

                // -------------------------------------------------
                // 5️⃣ UNDO REGISTRATION (successful, reversible only)
                // -------------------------------------------------
                if let Some((description, compensation)) = undo {
                    self.undo_ledger
                        .register(UndoEntry::new(directive.clone(), description, compensation))
                        .await;
                }

                info!(
                    directive_index = directive.index,
                    kind = %directive.kind,
                    attempts = retried.attempts,
                    "Directive completed"
                );

                Ok(ExecutionResult {
                    directive: directive.clone(),
                    status: ProgressStatus::Completed,
                    success: true,
                    error: None,
                    retryable: false,
                    attempts: retried.attempts,
                    output,
                })
            }
            Err(failure) => {
                let error = failure.error.to_string();

                warn!(
                    directive_index = directive.index,
                    kind = %directive.kind,
                    attempts = failure.attempts,
                    retryable = failure.retryable,
                    error = %error,
                    "Directive failed"
                );
                tracker.advance(ProgressStatus::Failed, None, Some(error.clone()))?;

                Ok(ExecutionResult {
                    directive: directive.clone(),
                    status: ProgressStatus::Failed,
                    success: false,
                    error: Some(error),
                    retryable: failure.retryable,
                    attempts: failure.attempts,
                    output: None,
                })
            }
        }
    }

    fn cancel(&self, directive: &Directive, tracker: &ProgressTracker<'_>) -> Result<ExecutionResult> {
        info!(directive_index = directive.index, kind = %directive.kind, "Directive cancelled");
        tracker.advance(
            ProgressStatus::Cancelled,
            None,
            Some(CANCELLED_MESSAGE.to_string()),
        )?;

        Ok(ExecutionResult {
            directive: directive.clone(),
            status: ProgressStatus::Cancelled,
            success: false,
            error: Some(CANCELLED_MESSAGE.to_string()),
            retryable: true,
            attempts: 0,
            output: None,
        })
    }
}
