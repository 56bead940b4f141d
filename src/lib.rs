//! Agentic Action Execution Engine
//!
//! Turns model-produced text into executed browser actions:
//! - Extracts bracketed directives (`[OPEN https://example.com]`)
//! - Validates each against a safety policy before anything runs
//! - Executes against tab, scraping and outbound-event surfaces
//! - Retries transient failures, honours cooperative cancellation
//! - Registers compensations for reversible actions
//! - Audits every outcome
//!
//! PER-DIRECTIVE LOOP:
//! CANCEL? → VALIDATE → CANCEL? → EXECUTE (RETRY) → UNDO → AUDIT

pub mod audit;
pub mod cancellation;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod models;
pub mod parser;
pub mod progress;
pub mod retry;
pub mod safety;
pub mod state;
pub mod surfaces;
pub mod undo;

pub use error::Result;

// Re-export common types
pub use models::*;
pub use config::EngineConfig;
pub use dispatcher::ActionDispatcher;
pub use parser::parse_directives;
