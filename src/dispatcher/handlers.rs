//! Kind-specific directive handlers
//!
//! Each handler runs against the external surfaces and reports what it did,
//! plus the compensation to register when the action is reversible.

use crate::error::ActionError;
use crate::models::{ActionKind, Directive, OutboundEvent, TabId};
use crate::progress::ProgressTracker;
use crate::safety::SafetyValidator;
use crate::surfaces::Surfaces;
use crate::undo::Compensation;
use crate::Result;
use serde_json::{json, Value};
use tracing::debug;

pub(crate) struct HandlerOutcome {
    pub output: Option<Value>,
    /// Description and compensation for reversible actions
    pub undo: Option<(String, Compensation)>,
}

impl HandlerOutcome {
    fn done(output: Value) -> Self {
        Self {
            output: Some(output),
            undo: None,
        }
    }

    fn reversible(output: Value, description: String, compensation: Compensation) -> Self {
        Self {
            output: Some(output),
            undo: Some((description, compensation)),
        }
    }
}

/// Execute one validated directive. `payload` is the sanitized payload.
pub(crate) async fn execute(
    surfaces: &Surfaces,
    validator: &SafetyValidator,
    directive: &Directive,
    payload: Option<&str>,
    progress: &ProgressTracker<'_>,
) -> Result<HandlerOutcome> {
    debug!(directive_index = directive.index, kind = %directive.kind, "Running handler");

    match directive.kind {
        ActionKind::Open => open(surfaces, required(payload, "URL")?, progress).await,
        ActionKind::Navigate => navigate(surfaces, required(payload, "URL")?, progress).await,
        ActionKind::Scrape => scrape(surfaces, required(payload, "URL")?, progress).await,
        ActionKind::Summarize => summarize(surfaces, validator, payload, progress).await,
        ActionKind::Trade => {
            let order = validator
                .parse_trade(required(payload, "trade")?)
                .map_err(ActionError::Validation)?;
            progress.milestone(50, "Submitting order");
            surfaces
                .events
                .publish(OutboundEvent::Trade(order.clone()))
                .await?;
            Ok(HandlerOutcome::done(json!(order)))
        }
        ActionKind::Search => {
            let query = required(payload, "query")?.to_string();
            progress.milestone(50, "Submitting query");
            surfaces
                .events
                .publish(OutboundEvent::Search {
                    query: query.clone(),
                })
                .await?;
            Ok(HandlerOutcome::done(json!({ "query": query })))
        }
        ActionKind::SwitchMode => {
            let mode = required(payload, "mode")?.to_string();
            progress.milestone(50, "Switching mode");
            surfaces
                .events
                .publish(OutboundEvent::ModeSwitch { mode: mode.clone() })
                .await?;
            Ok(HandlerOutcome::done(json!({ "mode": mode })))
        }
        ActionKind::CloseTab => close_tab(surfaces, &directive.payload, progress).await,
        ActionKind::Unknown => Err(ActionError::UnknownAction(directive.keyword.clone())),
    }
}

fn required<'a>(payload: Option<&'a str>, what: &str) -> Result<&'a str> {
    payload
        .filter(|p| !p.is_empty())
        .ok_or_else(|| ActionError::Validation(format!("Missing {} payload", what)))
}

async fn open(surfaces: &Surfaces, url: &str, progress: &ProgressTracker<'_>) -> Result<HandlerOutcome> {
    progress.milestone(30, "Opening tab");
    let tab_id = surfaces.tabs.create_tab(url, true).await?;

    Ok(HandlerOutcome::reversible(
        json!({ "tab_id": tab_id, "url": url }),
        format!("Close tab {} opened for {}", tab_id, url),
        Compensation::CloseTab { tab_id },
    ))
}

async fn navigate(
    surfaces: &Surfaces,
    url: &str,
    progress: &ProgressTracker<'_>,
) -> Result<HandlerOutcome> {
    progress.milestone(20, "Locating active tab");

    match surfaces.active_tab().await? {
        Some(tab) => {
            progress.milestone(60, "Navigating");
            surfaces.tabs.navigate(tab.id, url).await?;

            Ok(HandlerOutcome::reversible(
                json!({ "tab_id": tab.id, "url": url, "previous_url": tab.url }),
                format!("Return tab {} to {}", tab.id, tab.url),
                Compensation::RestoreUrl {
                    tab_id: tab.id,
                    url: tab.url,
                },
            ))
        }
        None => {
            progress.milestone(60, "Opening tab");
            let tab_id = surfaces.tabs.create_tab(url, true).await?;

            Ok(HandlerOutcome::reversible(
                json!({ "tab_id": tab_id, "url": url }),
                format!("Close tab {} opened for {}", tab_id, url),
                Compensation::CloseTab { tab_id },
            ))
        }
    }
}

async fn scrape(surfaces: &Surfaces, url: &str, progress: &ProgressTracker<'_>) -> Result<HandlerOutcome> {
    progress.milestone(20, "Fetching page");
    let page = surfaces.scraper.scrape(url).await?;

    progress.milestone(60, "Opening surface");
    let tab_id = surfaces.tabs.create_tab(url, false).await?;

    Ok(HandlerOutcome::reversible(
        json!({ "tab_id": tab_id, "page": page }),
        format!("Close tab {} opened for scraped page {}", tab_id, url),
        Compensation::CloseTab { tab_id },
    ))
}

async fn summarize(
    surfaces: &Surfaces,
    validator: &SafetyValidator,
    payload: Option<&str>,
    progress: &ProgressTracker<'_>,
) -> Result<HandlerOutcome> {
    let url = match payload.filter(|p| !p.is_empty()) {
        Some(url) => url.to_string(),
        None => {
            let tab_url = surfaces
                .active_tab()
                .await?
                .map(|tab| tab.url)
                .ok_or_else(|| ActionError::NotFound("no active tab to summarize".to_string()))?;

            // The active tab's URL never went through directive validation
            let checked = validator.validate_url(&tab_url);
            match checked.sanitized_payload {
                Some(url) if checked.valid => url,
                _ => {
                    return Err(ActionError::Validation(checked.error_message.unwrap_or_else(
                        || format!("Active tab URL is not allowed: {}", tab_url),
                    )))
                }
            }
        }
    };

    progress.milestone(20, "Fetching content");
    let page = surfaces.scraper.scrape(&url).await?;

    progress.milestone(60, "Requesting summary");
    surfaces
        .events
        .publish(OutboundEvent::Summarize {
            url: page.url.clone(),
            title: page.title.clone(),
            content: page.content.clone(),
        })
        .await?;

    Ok(HandlerOutcome::done(json!({
        "url": page.url,
        "title": page.title,
        "excerpt": page.excerpt,
    })))
}

async fn close_tab(
    surfaces: &Surfaces,
    raw_payload: &str,
    progress: &ProgressTracker<'_>,
) -> Result<HandlerOutcome> {
    let requested: Option<TabId> = raw_payload.trim().parse().ok();
    let tabs = surfaces.tabs.list_tabs().await?;

    let target = match requested {
        Some(id) => tabs.into_iter().find(|tab| tab.id == id),
        None => tabs.into_iter().find(|tab| tab.active),
    }
    .ok_or_else(|| ActionError::NotFound("tab to close".to_string()))?;

    progress.milestone(50, "Closing tab");
    surfaces.tabs.close_tab(target.id).await?;

    Ok(HandlerOutcome::reversible(
        json!({ "tab_id": target.id, "url": target.url }),
        format!("Reopen {}", target.url),
        Compensation::ReopenTab {
            url: target.url,
            title: target.title,
        },
    ))
}
