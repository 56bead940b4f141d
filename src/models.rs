//! Core data models for the action engine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

//
// ================= Enums =================
//

/// Directive kind, derived from the first keyword inside the brackets.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionKind {
    Open,
    Scrape,
    Trade,
    Summarize,
    Search,
    SwitchMode,
    CloseTab,
    Navigate,
    Unknown,
}

impl ActionKind {
    /// Map an uppercase keyword to its kind. Anything unrecognized is `Unknown`.
    pub fn from_keyword(keyword: &str) -> Self {
        match keyword {
            "OPEN" => ActionKind::Open,
            "SCRAPE" => ActionKind::Scrape,
            "TRADE" => ActionKind::Trade,
            "SUMMARIZE" => ActionKind::Summarize,
            "SEARCH" => ActionKind::Search,
            "SWITCH_MODE" => ActionKind::SwitchMode,
            "CLOSE_TAB" => ActionKind::CloseTab,
            "NAVIGATE" => ActionKind::Navigate,
            _ => ActionKind::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Open => "OPEN",
            ActionKind::Scrape => "SCRAPE",
            ActionKind::Trade => "TRADE",
            ActionKind::Summarize => "SUMMARIZE",
            ActionKind::Search => "SEARCH",
            ActionKind::SwitchMode => "SWITCH_MODE",
            ActionKind::CloseTab => "CLOSE_TAB",
            ActionKind::Navigate => "NAVIGATE",
            ActionKind::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProgressStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl ProgressStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProgressStatus::Completed | ProgressStatus::Failed | ProgressStatus::Cancelled
        )
    }
}

impl fmt::Display for ProgressStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProgressStatus::Pending => "pending",
            ProgressStatus::Running => "running",
            ProgressStatus::Completed => "completed",
            ProgressStatus::Failed => "failed",
            ProgressStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeSide {
    Buy,
    Sell,
}

impl fmt::Display for TradeSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradeSide::Buy => f.write_str("BUY"),
            TradeSide::Sell => f.write_str("SELL"),
        }
    }
}

//
// ================= Directive =================
//

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Directive {
    /// Ordinal position among the directives of the source text
    pub index: usize,
    /// Full bracketed token as it appeared, e.g. `[OPEN https://example.com]`
    pub raw: String,
    /// First token inside the brackets, uppercased
    pub keyword: String,
    pub kind: ActionKind,
    pub payload: String,
}

impl Directive {
    /// Build a directive from the text between the brackets.
    pub fn from_inner(index: usize, inner: &str) -> Self {
        let trimmed = inner.trim();
        let (keyword, payload) = match trimmed.split_once(char::is_whitespace) {
            Some((keyword, rest)) => (keyword, rest.trim()),
            None => (trimmed, ""),
        };
        let keyword = keyword.to_uppercase();

        Self {
            index,
            raw: format!("[{}]", inner),
            kind: ActionKind::from_keyword(&keyword),
            keyword,
            payload: payload.to_string(),
        }
    }
}

//
// ================= Validation =================
//

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ValidationOutcome {
    pub valid: bool,
    pub sanitized_payload: Option<String>,
    pub error_message: Option<String>,
}

impl ValidationOutcome {
    pub fn ok(sanitized: impl Into<String>) -> Self {
        Self {
            valid: true,
            sanitized_payload: Some(sanitized.into()),
            error_message: None,
        }
    }

    /// Valid, with nothing to carry forward.
    pub fn ok_empty() -> Self {
        Self {
            valid: true,
            sanitized_payload: None,
            error_message: None,
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self {
            valid: false,
            sanitized_payload: None,
            error_message: Some(message.into()),
        }
    }
}

//
// ================= Execution =================
//

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub directive: Directive,
    pub status: ProgressStatus,
    pub success: bool,
    pub error: Option<String>,
    /// Only meaningful when `success` is false
    pub retryable: bool,
    /// Handler invocations, 0 when the handler never ran
    pub attempts: u32,
    pub output: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub directive: Directive,
    pub status: ProgressStatus,
    pub progress_percent: Option<u8>,
    pub message: Option<String>,
    pub cancellable: bool,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuditRecord {
    pub directive: Directive,
    pub success: bool,
    pub error_message: Option<String>,
    pub timestamp: DateTime<Utc>,
}

//
// ================= Surface I/O =================
//

pub type TabId = u64;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TabInfo {
    pub id: TabId,
    pub url: String,
    pub title: String,
    pub active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScrapedPage {
    pub url: String,
    pub title: String,
    pub excerpt: String,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TradeOrder {
    pub side: TradeSide,
    pub symbol: String,
    pub quantity: u64,
}

impl fmt::Display for TradeOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.side, self.symbol, self.quantity)
    }
}

/// Typed notifications to the trading, search, mode and summary surfaces.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundEvent {
    Trade(TradeOrder),
    Search { query: String },
    ModeSwitch { mode: String },
    Summarize { url: String, title: String, content: String },
}
