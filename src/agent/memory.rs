//! Offline error-memory telemetry
//!
//! Records recovery attempts keyed by normalized error pattern. The store
//! is write-only from the engine's point of view: nothing in the runtime
//! reads it back to make decisions. On-disk format is a single JSON file
//! with last-writer-wins semantics, owned by one process.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::agent::recovery::normalize_error;

/// One remembered error pattern
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub hash: String,
    pub normalized_pattern: String,
    pub sample: String,
    pub solution: String,
    pub success: bool,
    pub occurrences: u32,
    pub last_seen: String,
}

/// On-disk error memory store
pub struct ErrorMemory {
    path: PathBuf,
    records: Mutex<HashMap<String, ErrorRecord>>,
}

impl ErrorMemory {
    /// Open (or create) the store at `path`.
    pub fn open(path: PathBuf) -> Self {
        let records = std::fs::read_to_string(&path)
            .ok()
            .and_then(|raw| serde_json::from_str(&raw).ok())
            .unwrap_or_default();
        ErrorMemory {
            path,
            records: Mutex::new(records),
        }
    }

    /// Record one recovery attempt for an error.
    pub fn record(&self, error: &str, solution: &str, success: bool) {
        let pattern = normalize_error(error);
        let hash = format!("{:x}", fingerprint(&pattern));

        let mut records = self.records.lock().unwrap();
        let record = records.entry(hash.clone()).or_insert_with(|| ErrorRecord {
            hash,
            normalized_pattern: pattern,
            sample: truncated(error),
            solution: String::new(),
            success: false,
            occurrences: 0,
            last_seen: String::new(),
        });
        record.occurrences += 1;
        record.solution = solution.to_string();
        record.success = success;
        record.last_seen = Utc::now().to_rfc3339();

        if let Err(e) = self.flush(&records) {
            warn!("Failed to persist error memory: {}", e);
        }
    }

    /// Snapshot of all records (telemetry consumers and tests)
    pub fn records(&self) -> Vec<ErrorRecord> {
        self.records.lock().unwrap().values().cloned().collect()
    }

    fn flush(&self, records: &HashMap<String, ErrorRecord>) -> crate::error::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, serde_json::to_string_pretty(records)?)?;
        Ok(())
    }
}

fn fingerprint(s: &str) -> u64 {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    s.hash(&mut hasher);
    hasher.finish()
}

fn truncated(s: &str) -> String {
    s.chars().take(500).collect()
}
