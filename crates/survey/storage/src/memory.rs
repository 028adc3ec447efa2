//! In-memory reference implementation of the survey storage traits.
//!
//! Deterministic and test-friendly. Production deployments should use the
//! PostgreSQL adapter as the transactional source of truth.

use crate::model::AuditRecord;
use crate::traits::{AuditStore, QueryWindow, SurveyStore, TransitionStore};
use crate::{StorageError, StorageResult};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;
use survey_types::{AuditEntry, SurveyId, SurveyRecord};
use uuid::Uuid;

/// In-memory survey storage adapter.
///
/// Lock order is always surveys before audits; holding both write guards
/// across a commit is what makes the record update and the audit append a
/// single atomic unit.
#[derive(Default)]
pub struct InMemorySurveyStorage {
    surveys: RwLock<HashMap<SurveyId, SurveyRecord>>,
    audits: RwLock<Vec<AuditRecord>>,
}

impl InMemorySurveyStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SurveyStore for InMemorySurveyStorage {
    async fn create_survey(
        &self,
        record: SurveyRecord,
        entry: AuditEntry,
    ) -> StorageResult<(SurveyRecord, AuditRecord)> {
        let mut surveys = self
            .surveys
            .write()
            .map_err(|_| StorageError::Backend("surveys lock poisoned".to_string()))?;

        if surveys.contains_key(&record.id) {
            return Err(StorageError::Conflict(format!(
                "survey {} already exists",
                record.id
            )));
        }

        let mut audits = self
            .audits
            .write()
            .map_err(|_| StorageError::Backend("audit lock poisoned".to_string()))?;

        let mut stored = record;
        stored.version = 1;
        let audit = append_entry(&mut audits, entry)?;
        surveys.insert(stored.id.clone(), stored.clone());
        Ok((stored, audit))
    }

    async fn get_survey(&self, id: &SurveyId) -> StorageResult<Option<SurveyRecord>> {
        let surveys = self
            .surveys
            .read()
            .map_err(|_| StorageError::Backend("surveys lock poisoned".to_string()))?;
        Ok(surveys.get(id).cloned())
    }

    async fn list_surveys(&self, window: QueryWindow) -> StorageResult<Vec<SurveyRecord>> {
        let surveys = self
            .surveys
            .read()
            .map_err(|_| StorageError::Backend("surveys lock poisoned".to_string()))?;
        let mut values = surveys.values().cloned().collect::<Vec<_>>();
        values.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(apply_window(values, window))
    }
}

#[async_trait]
impl AuditStore for InMemorySurveyStorage {
    async fn list_audit_for_survey(
        &self,
        survey_id: &SurveyId,
        window: QueryWindow,
    ) -> StorageResult<Vec<AuditRecord>> {
        let audits = self
            .audits
            .read()
            .map_err(|_| StorageError::Backend("audit lock poisoned".to_string()))?;
        // The vector is already in ascending sequence order.
        let values = audits
            .iter()
            .filter(|record| &record.entry.survey_id == survey_id)
            .cloned()
            .collect::<Vec<_>>();
        Ok(apply_window(values, window))
    }

    async fn latest_audit_hash(&self) -> StorageResult<Option<String>> {
        let audits = self
            .audits
            .read()
            .map_err(|_| StorageError::Backend("audit lock poisoned".to_string()))?;
        Ok(audits.last().map(|record| record.hash.clone()))
    }
}

#[async_trait]
impl TransitionStore for InMemorySurveyStorage {
    async fn commit_transition(
        &self,
        record: SurveyRecord,
        expected_version: u64,
        entry: AuditEntry,
    ) -> StorageResult<(SurveyRecord, AuditRecord)> {
        let mut surveys = self
            .surveys
            .write()
            .map_err(|_| StorageError::Backend("surveys lock poisoned".to_string()))?;

        let stored = surveys
            .get(&record.id)
            .ok_or_else(|| StorageError::NotFound(format!("survey {} not found", record.id)))?;

        if stored.version != expected_version {
            return Err(StorageError::Conflict(format!(
                "survey {} changed since it was loaded (expected version {}, found {})",
                record.id, expected_version, stored.version
            )));
        }

        let mut audits = self
            .audits
            .write()
            .map_err(|_| StorageError::Backend("audit lock poisoned".to_string()))?;

        let mut updated = record;
        updated.version = expected_version + 1;
        let audit = append_entry(&mut audits, entry)?;
        surveys.insert(updated.id.clone(), updated.clone());
        Ok((updated, audit))
    }
}

fn append_entry(audits: &mut Vec<AuditRecord>, entry: AuditEntry) -> StorageResult<AuditRecord> {
    let previous_hash = audits.last().map(|record| record.hash.clone());
    let sequence = audits.len() as u64 + 1;
    let hash = compute_audit_hash(&entry, previous_hash.as_deref(), sequence)?;

    let record = AuditRecord {
        entry_id: format!("audit-{}", Uuid::new_v4()),
        sequence,
        entry,
        previous_hash,
        hash,
    };
    audits.push(record.clone());
    Ok(record)
}

pub(crate) fn compute_audit_hash(
    entry: &AuditEntry,
    previous_hash: Option<&str>,
    sequence: u64,
) -> StorageResult<String> {
    let serializable = serde_json::json!({
        "previous_hash": previous_hash,
        "sequence": sequence,
        "entry": entry,
    });
    let serialized = serde_json::to_vec(&serializable)
        .map_err(|e| StorageError::Serialization(e.to_string()))?;
    Ok(blake3::hash(&serialized).to_hex().to_string())
}

fn apply_window<T>(items: Vec<T>, window: QueryWindow) -> Vec<T> {
    let iter = items.into_iter().skip(window.offset);
    if window.limit == 0 {
        iter.collect()
    } else {
        iter.take(window.limit).collect()
    }
}
