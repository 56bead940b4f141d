//! Undo ledger
//!
//! LIFO stack of compensation commands for reversible directives. Entries are
//! registered only after a directive succeeded and are removed only by
//! explicit undo calls. The ledger does not know what a compensation means;
//! it hands the captured state to a `Compensator`.

use crate::models::{ActionKind, Directive, TabId};
use crate::surfaces::TabControl;
use crate::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

/// State captured at registration time, enough to reverse the action
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Compensation {
    /// Close the tab that was opened
    CloseTab { tab_id: TabId },
    /// Reopen a tab that was closed
    ReopenTab { url: String, title: String },
    /// Point a navigated tab back at its previous URL
    RestoreUrl { tab_id: TabId, url: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UndoEntry {
    pub id: Uuid,
    pub directive: Directive,
    pub action_type: ActionKind,
    pub timestamp: DateTime<Utc>,
    pub description: String,
    pub compensation: Compensation,
}

impl UndoEntry {
    pub fn new(directive: Directive, description: String, compensation: Compensation) -> Self {
        Self {
            id: Uuid::new_v4(),
            action_type: directive.kind,
            directive,
            timestamp: Utc::now(),
            description,
            compensation,
        }
    }
}

/// Executes captured compensations
#[async_trait::async_trait]
pub trait Compensator: Send + Sync {
    async fn compensate(&self, compensation: &Compensation) -> Result<()>;
}

/// Compensator backed by the tab surface
pub struct TabCompensator {
    tabs: Arc<dyn TabControl>,
}

impl TabCompensator {
    pub fn new(tabs: Arc<dyn TabControl>) -> Self {
        Self { tabs }
    }
}

#[async_trait::async_trait]
impl Compensator for TabCompensator {
    async fn compensate(&self, compensation: &Compensation) -> Result<()> {
        match compensation {
            Compensation::CloseTab { tab_id } => self.tabs.close_tab(*tab_id).await,
            Compensation::ReopenTab { url, .. } => {
                self.tabs.create_tab(url, true).await?;
                Ok(())
            }
            Compensation::RestoreUrl { tab_id, url } => self.tabs.navigate(*tab_id, url).await,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct UndoOutcome {
    pub entry: UndoEntry,
    pub success: bool,
    pub error: Option<String>,
}

/// Outcomes of a full rollback, newest entry first
#[derive(Debug, Clone, Default, Serialize)]
pub struct UndoReport {
    pub outcomes: Vec<UndoOutcome>,
}

impl UndoReport {
    pub fn all_succeeded(&self) -> bool {
        self.outcomes.iter().all(|o| o.success)
    }

    pub fn failures(&self) -> impl Iterator<Item = &UndoOutcome> {
        self.outcomes.iter().filter(|o| !o.success)
    }
}

pub struct UndoLedger {
    entries: Mutex<Vec<UndoEntry>>,
    compensator: Arc<dyn Compensator>,
}

impl UndoLedger {
    pub fn new(compensator: Arc<dyn Compensator>) -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            compensator,
        }
    }

    pub async fn register(&self, entry: UndoEntry) -> Uuid {
        let id = entry.id;
        info!(
            undo_id = %id,
            action_type = %entry.action_type,
            description = %entry.description,
            "Registered undo entry"
        );
        self.entries.lock().await.push(entry);
        id
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    /// Snapshot of the stack, oldest first
    pub async fn entries(&self) -> Vec<UndoEntry> {
        self.entries.lock().await.clone()
    }

    /// Pop and compensate the newest entry. The entry stays removed even if
    /// compensation fails.
    pub async fn undo_last(&self) -> Option<UndoOutcome> {
        let entry = self.entries.lock().await.pop()?;
        Some(self.run_compensation(entry).await)
    }

    /// Compensate every entry, newest first, continuing past failures.
    pub async fn undo_all(&self) -> UndoReport {
        let mut report = UndoReport::default();

        while let Some(outcome) = self.undo_last().await {
            report.outcomes.push(outcome);
        }

        info!(
            undone = report.outcomes.len(),
            failed = report.failures().count(),
            "Rollback finished"
        );
        report
    }

    async fn run_compensation(&self, entry: UndoEntry) -> UndoOutcome {
        match self.compensator.compensate(&entry.compensation).await {
            Ok(()) => {
                info!(undo_id = %entry.id, description = %entry.description, "Undo applied");
                UndoOutcome {
                    entry,
                    success: true,
                    error: None,
                }
            }
            Err(e) => {
                warn!(undo_id = %entry.id, error = %e, "Compensation failed");
                UndoOutcome {
                    entry,
                    success: false,
                    error: Some(e.to_string()),
                }
            }
        }
    }
}
