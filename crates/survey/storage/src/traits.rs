use crate::model::AuditRecord;
use crate::StorageResult;
use async_trait::async_trait;
use survey_types::{AuditEntry, SurveyId, SurveyRecord};

/// Generic query window for paged reads. A `limit` of zero means
/// unbounded.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryWindow {
    pub limit: usize,
    pub offset: usize,
}

/// Storage interface for survey records.
///
/// `version` is storage-owned: `create_survey` stores the record at
/// version 1 and every committed transition bumps it by one. Callers
/// never write the field themselves.
#[async_trait]
pub trait SurveyStore: Send + Sync {
    /// Insert a fresh draft and its `CREATED` audit entry as one unit.
    /// Fails with `Conflict` if the id already exists.
    async fn create_survey(
        &self,
        record: SurveyRecord,
        entry: AuditEntry,
    ) -> StorageResult<(SurveyRecord, AuditRecord)>;

    /// Get one record by id.
    async fn get_survey(&self, id: &SurveyId) -> StorageResult<Option<SurveyRecord>>;

    /// List records newest-first.
    async fn list_surveys(&self, window: QueryWindow) -> StorageResult<Vec<SurveyRecord>>;
}

/// Storage interface for the append-only audit trail. Entries are never
/// mutated or deleted.
#[async_trait]
pub trait AuditStore: Send + Sync {
    /// Read a survey's trail in ascending sequence order (which is also
    /// non-decreasing timestamp order). Restartable via the window.
    async fn list_audit_for_survey(
        &self,
        survey_id: &SurveyId,
        window: QueryWindow,
    ) -> StorageResult<Vec<AuditRecord>>;

    /// Current anchor of the hash chain, for external re-verification.
    async fn latest_audit_hash(&self) -> StorageResult<Option<String>>;
}

/// Storage interface for committing a decided transition.
#[async_trait]
pub trait TransitionStore: Send + Sync {
    /// Persist the updated record and append its audit entry as a single
    /// atomic unit: either both are durable or neither is.
    ///
    /// `expected_version` is the version read at load time; a mismatch
    /// fails with `Conflict` and writes nothing. On success the returned
    /// record carries the bumped version.
    async fn commit_transition(
        &self,
        record: SurveyRecord,
        expected_version: u64,
        entry: AuditEntry,
    ) -> StorageResult<(SurveyRecord, AuditRecord)>;
}

/// Unified storage bundle consumed by the workflow service.
pub trait SurveyStorage: SurveyStore + AuditStore + TransitionStore + Send + Sync {}

impl<T> SurveyStorage for T where T: SurveyStore + AuditStore + TransitionStore + Send + Sync {}
