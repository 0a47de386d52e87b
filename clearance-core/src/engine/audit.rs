//! Append-only, line-delimited audit log. One writer lock per process;
//! a persistence failure here is logged only, never propagated as a
//! failure of the triggering request (§7).

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub ts: chrono::DateTime<chrono::Utc>,
    pub document_did: String,
    pub requester_id: String,
    pub issuer_id: String,
    pub clearance_level: u8,
    pub ephemeral_id: Option<String>,
    pub client_ip: String,
    pub user_agent: Option<String>,
    pub access_granted: bool,
    pub copy_id: Option<String>,
    pub denial_reason: Option<String>,
    pub processing_time_ms: u64,
}

pub struct AuditLog {
    path: PathBuf,
    lock: Mutex<()>,
}

impl AuditLog {
    pub fn new(path: PathBuf) -> Self {
        Self { path, lock: Mutex::new(()) }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    pub fn append(&self, record: &AuditRecord) {
        let _guard = self.lock.lock();
        let Ok(line) = serde_json::to_string(record) else {
            tracing::error!("failed to serialize audit record");
            return;
        };
        let write_result = (|| -> std::io::Result<()> {
            if let Some(parent) = self.path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let mut file = std::fs::OpenOptions::new().create(true).append(true).open(&self.path)?;
            writeln!(file, "{line}")
        })();
        if let Err(e) = write_result {
            tracing::error!(error = %e, "failed to append audit record");
        }
    }
}
