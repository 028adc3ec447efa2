use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use survey_types::AuditEntry;

/// Persistent, tamper-evident audit record.
///
/// Wraps the domain-level [`AuditEntry`] with the identity, global
/// sequencing, and hash chain that storage assigns on append.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Storage-assigned identifier
    pub entry_id: String,
    /// Global monotonically increasing sequence number
    pub sequence: u64,
    /// The entry as submitted by the workflow service
    pub entry: AuditEntry,
    /// Hash of the preceding record; `None` for the first entry
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_hash: Option<String>,
    /// BLAKE3 hash over the serialized entry, sequence, and previous hash
    pub hash: String,
}

impl AuditRecord {
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.entry.timestamp
    }
}
