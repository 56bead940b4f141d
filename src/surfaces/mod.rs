//! External surfaces the dispatcher acts on
//!
//! Tab control, page scraping and typed outbound events. Handlers only see
//! these traits; hosts plug in their own implementations.

use crate::error::ActionError;
use crate::models::{OutboundEvent, ScrapedPage, TabId, TabInfo};
use crate::Result;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tracing::debug;

pub mod http;
pub use http::HttpScraper;

/// Browser tab control
#[async_trait::async_trait]
pub trait TabControl: Send + Sync {
    async fn create_tab(&self, url: &str, activate: bool) -> Result<TabId>;
    async fn navigate(&self, tab_id: TabId, url: &str) -> Result<()>;
    async fn close_tab(&self, tab_id: TabId) -> Result<()>;
    async fn list_tabs(&self) -> Result<Vec<TabInfo>>;
}

#[async_trait::async_trait]
pub trait Scraper: Send + Sync {
    async fn scrape(&self, url: &str) -> Result<ScrapedPage>;
}

/// Fire-and-forget notifications to trading, search, mode and summary surfaces
#[async_trait::async_trait]
pub trait EventSink: Send + Sync {
    async fn publish(&self, event: OutboundEvent) -> Result<()>;
}

/// Bundle of surfaces handed to the dispatcher
#[derive(Clone)]
pub struct Surfaces {
    pub tabs: Arc<dyn TabControl>,
    pub scraper: Arc<dyn Scraper>,
    pub events: Arc<dyn EventSink>,
}

impl Surfaces {
    pub fn new(
        tabs: Arc<dyn TabControl>,
        scraper: Arc<dyn Scraper>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            tabs,
            scraper,
            events,
        }
    }

    pub async fn active_tab(&self) -> Result<Option<TabInfo>> {
        let tabs = self.tabs.list_tabs().await?;
        Ok(tabs.into_iter().find(|tab| tab.active))
    }
}

//
// ================= Channel Event Sink =================
//

/// Forwards outbound events into an unbounded channel
pub struct ChannelEventSink {
    sender: mpsc::UnboundedSender<OutboundEvent>,
}

impl ChannelEventSink {
    pub fn new(sender: mpsc::UnboundedSender<OutboundEvent>) -> Self {
        Self { sender }
    }

    /// Sink plus the receiving end for the consuming surface.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<OutboundEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self::new(sender), receiver)
    }
}

#[async_trait::async_trait]
impl EventSink for ChannelEventSink {
    async fn publish(&self, event: OutboundEvent) -> Result<()> {
        debug!(?event, "Publishing outbound event");
        self.sender
            .send(event)
            .map_err(|_| ActionError::Surface("Outbound event channel is closed".to_string()))
    }
}

//
// ================= In-Memory Tabs =================
//

#[derive(Default)]
struct TabState {
    tabs: Vec<TabInfo>,
    next_id: TabId,
}

/// In-memory tab surface for development and tests
pub struct InMemoryTabs {
    state: Arc<RwLock<TabState>>,
}

impl InMemoryTabs {
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(TabState {
                tabs: Vec::new(),
                next_id: 1,
            })),
        }
    }

    /// Start with one active tab showing `url`.
    pub async fn with_active_tab(url: &str) -> Self {
        let tabs = Self::new();
        // Fresh state, cannot fail
        let _ = tabs.create_tab(url, true).await;
        tabs
    }
}

impl Default for InMemoryTabs {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl TabControl for InMemoryTabs {
    async fn create_tab(&self, url: &str, activate: bool) -> Result<TabId> {
        let mut state = self.state.write().await;
        let id = state.next_id;
        state.next_id += 1;

        if activate {
            for tab in state.tabs.iter_mut() {
                tab.active = false;
            }
        }

        // First tab is always active
        let active = activate || state.tabs.is_empty();
        state.tabs.push(TabInfo {
            id,
            url: url.to_string(),
            title: url.to_string(),
            active,
        });

        Ok(id)
    }

    async fn navigate(&self, tab_id: TabId, url: &str) -> Result<()> {
        let mut state = self.state.write().await;
        let tab = state
            .tabs
            .iter_mut()
            .find(|tab| tab.id == tab_id)
            .ok_or_else(|| ActionError::NotFound(format!("tab {}", tab_id)))?;

        tab.url = url.to_string();
        tab.title = url.to_string();
        Ok(())
    }

    async fn close_tab(&self, tab_id: TabId) -> Result<()> {
        let mut state = self.state.write().await;
        let position = state
            .tabs
            .iter()
            .position(|tab| tab.id == tab_id)
            .ok_or_else(|| ActionError::NotFound(format!("tab {}", tab_id)))?;

        let removed = state.tabs.remove(position);
        if removed.active {
            if let Some(last) = state.tabs.last_mut() {
                last.active = true;
            }
        }
        Ok(())
    }

    async fn list_tabs(&self) -> Result<Vec<TabInfo>> {
        Ok(self.state.read().await.tabs.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_tab_lifecycle() {
        let tabs = InMemoryTabs::new();
        let first = tabs.create_tab("https://a.example/", true).await.unwrap();
        let second = tabs.create_tab("https://b.example/", false).await.unwrap();

        let listed = tabs.list_tabs().await.unwrap();
        assert_eq!(listed.len(), 2);
        assert!(listed.iter().find(|t| t.id == first).unwrap().active);
        assert!(!listed.iter().find(|t| t.id == second).unwrap().active);

        tabs.navigate(second, "https://c.example/").await.unwrap();
        tabs.close_tab(first).await.unwrap();

        let listed = tabs.list_tabs().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].url, "https://c.example/");
        assert!(listed[0].active);
    }

    #[tokio::test]
    async fn test_missing_tab_is_not_found() {
        let tabs = InMemoryTabs::new();
        let err = tabs.close_tab(99).await.unwrap_err();
        assert!(matches!(err, ActionError::NotFound(_)));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_channel_sink_delivers_and_reports_closed() {
        let (sink, mut receiver) = ChannelEventSink::channel();
        let event = OutboundEvent::Search {
            query: "rust".to_string(),
        };

        sink.publish(event.clone()).await.unwrap();
        assert_eq!(receiver.recv().await, Some(event));

        drop(receiver);
        let err = sink
            .publish(OutboundEvent::ModeSwitch {
                mode: "browse".to_string(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ActionError::Surface(_)));
    }
}
