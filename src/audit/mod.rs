//! Audit logging
//!
//! Every directive's terminal outcome is appended exactly once. The in-memory
//! log chains a SHA-256 digest through its records so tampering is detectable.

use crate::models::AuditRecord;
use crate::Result;
use sha2::{Digest, Sha256};
use std::io::Write;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Append-only destination for audit records
#[async_trait::async_trait]
pub trait AuditSink: Send + Sync {
    async fn append(&self, record: AuditRecord) -> Result<()>;
}

#[derive(Debug, Clone)]
struct ChainedRecord {
    record: AuditRecord,
    digest: String,
}

/// In-memory, hash-chained audit trail
pub struct AuditLog {
    entries: Arc<RwLock<Vec<ChainedRecord>>>,
}

impl AuditLog {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Snapshot of all records in append order
    pub async fn records(&self) -> Vec<AuditRecord> {
        let entries = self.entries.read().await;
        entries.iter().map(|e| e.record.clone()).collect()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Digest of the newest record, empty for an empty log
    pub async fn head_digest(&self) -> String {
        let entries = self.entries.read().await;
        entries.last().map(|e| e.digest.clone()).unwrap_or_default()
    }

    /// Recompute the chain and compare against the stored digests.
    pub async fn verify_integrity(&self) -> bool {
        let entries = self.entries.read().await;
        let mut previous = String::new();

        for entry in entries.iter() {
            if compute_record_hash(&previous, &entry.record) != entry.digest {
                return false;
            }
            previous = entry.digest.clone();
        }
        true
    }
}

impl Default for AuditLog {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl AuditSink for AuditLog {
    async fn append(&self, record: AuditRecord) -> Result<()> {
        let mut entries = self.entries.write().await;
        let previous = entries.last().map(|e| e.digest.as_str()).unwrap_or("");
        let digest = compute_record_hash(previous, &record);
        entries.push(ChainedRecord { record, digest });
        Ok(())
    }
}

/// SHA-256 over the previous digest followed by the record's JSON
pub fn compute_record_hash(previous: &str, record: &AuditRecord) -> String {
    let mut hasher = Sha256::new();
    hasher.update(previous.as_bytes());

    // Stream JSON directly into hasher (no intermediate String)
    if serde_json::to_writer(&mut HashWriter(&mut hasher), record).is_err() {
        return String::new();
    }

    hex::encode(hasher.finalize())
}

/// Adapter to allow writing into Sha256 via std::io::Write
struct HashWriter<'a, H: Digest>(&'a mut H);

impl<'a, H: Digest> Write for HashWriter<'a, H> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Directive;
    use chrono::Utc;

    fn record(inner: &str, success: bool) -> AuditRecord {
        AuditRecord {
            directive: Directive::from_inner(0, inner),
            success,
            error_message: if success { None } else { Some("boom".to_string()) },
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_append_and_verify() {
        let log = AuditLog::new();
        assert!(log.is_empty().await);
        assert!(log.verify_integrity().await);

        log.append(record("OPEN https://example.com", true)).await.unwrap();
        log.append(record("TRADE BUY AAPL 0", false)).await.unwrap();

        assert_eq!(log.len().await, 2);
        assert!(log.verify_integrity().await);
        assert_eq!(log.head_digest().await.len(), 64);

        let records = log.records().await;
        assert!(records[0].success);
        assert_eq!(records[1].error_message.as_deref(), Some("boom"));
    }

    #[tokio::test]
    async fn test_tampering_is_detected() {
        let log = AuditLog::new();
        log.append(record("SEARCH rust", true)).await.unwrap();
        log.append(record("CLOSE_TAB", true)).await.unwrap();

        {
            let mut entries = log.entries.write().await;
            entries[0].record.success = false;
        }

        assert!(!log.verify_integrity().await);
    }

    #[test]
    fn test_hash_depends_on_previous() {
        let r = record("SEARCH rust", true);
        assert_ne!(compute_record_hash("", &r), compute_record_hash("abc", &r));
    }
}
