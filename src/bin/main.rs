use agentic_action_engine::{
    audit::AuditLog,
    cancellation::NeverCancel,
    dispatcher::ActionDispatcher,
    progress::ChannelProgressObserver,
    state::InMemoryKvStore,
    surfaces::{ChannelEventSink, HttpScraper, InMemoryTabs, Surfaces, TabControl},
    EngineConfig,
};
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenv::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = EngineConfig::from_env()?;

    // Directive text from arguments, or stdin when none are given
    let args: Vec<String> = std::env::args().skip(1).collect();
    let text = if args.is_empty() {
        let mut buffer = String::new();
        tokio::io::stdin().read_to_string(&mut buffer).await?;
        buffer
    } else {
        args.join(" ")
    };

    info!("Action engine demo starting");

    // Create surfaces
    let tabs = Arc::new(InMemoryTabs::with_active_tab("https://example.com/").await);
    let scraper = Arc::new(HttpScraper::new(
        config.scrape_timeout(),
        config.safety.allow_private_hosts,
    )?);
    let (events, mut event_rx) = ChannelEventSink::channel();
    let surfaces = Surfaces::new(tabs.clone(), scraper, Arc::new(events));

    let (observer, mut progress_rx) = ChannelProgressObserver::channel();
    let progress_task = tokio::spawn(async move {
        while let Some(event) = progress_rx.recv().await {
            info!(
                directive = %event.directive.raw,
                status = %event.status,
                percent = ?event.progress_percent,
                message = ?event.message,
                "Progress"
            );
        }
    });

    let audit_log = Arc::new(AuditLog::new());
    let dispatcher = ActionDispatcher::new(surfaces, audit_log.clone(), config)
        .with_observer(Arc::new(observer))
        .with_history(Arc::new(InMemoryKvStore::default()));

    let results = dispatcher.dispatch_text(&text, &NeverCancel).await?;

    // Dropping the dispatcher closes the progress and event channels
    let ledger = dispatcher.undo_ledger();
    drop(dispatcher);
    progress_task.await?;

    while let Ok(event) = event_rx.try_recv() {
        info!(?event, "Outbound event");
    }

    println!("\n=== RESULTS ===");
    println!("{}", serde_json::to_string_pretty(&results)?);

    println!("\n=== UNDO STACK ===");
    for entry in ledger.entries().await {
        println!("  {} ({})", entry.description, entry.action_type);
    }

    println!("\n=== OPEN TABS ===");
    for tab in tabs.list_tabs().await? {
        println!("  #{} {}{}", tab.id, tab.url, if tab.active { " (active)" } else { "" });
    }

    info!(
        audit_records = audit_log.len().await,
        intact = audit_log.verify_integrity().await,
        "Audit trail"
    );

    Ok(())
}
