//! Workflow service facade for Haven survey verification.
//!
//! [`WorkflowService`] is the only entry point the surrounding system
//! uses. Each call loads the record, asks the state machine for a
//! decision, and commits the mutated record together with exactly one
//! audit entry as a single atomic storage operation. Failures are typed
//! and carry the current status and attempted action; nothing is ever
//! partially written.

#![deny(unsafe_code)]

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use survey_storage::memory::InMemorySurveyStorage;
use survey_storage::{
    AuditRecord, AuditStore, QueryWindow, StorageError, SurveyStorage, SurveyStore, TransitionStore,
};
use survey_types::{
    ActionPayload, AuditAction, AuditEntry, Caller, FacilityId, Role, SurveyId, SurveyRecord,
    SurveyStatus, UserId, WorkflowAction,
};
use survey_workflow::{decide, DecisionError};
use thiserror::Error;

/// Request to create a fresh draft survey.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CreateSurveyRequest {
    pub facility_id: FacilityId,
    /// Only meaningful for admins creating on a surveyor's behalf
    #[serde(skip_serializing_if = "Option::is_none")]
    pub surveyor_id: Option<UserId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl CreateSurveyRequest {
    pub fn new(facility_id: FacilityId) -> Self {
        Self {
            facility_id,
            surveyor_id: None,
            notes: None,
        }
    }

    pub fn on_behalf_of(mut self, surveyor: UserId) -> Self {
        self.surveyor_id = Some(surveyor);
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }
}

/// The workflow service facade.
///
/// Wraps a storage backend so every caller sees the same durable records
/// and audit trail.
pub struct WorkflowService {
    storage: Arc<dyn SurveyStorage>,
}

impl WorkflowService {
    /// Create a service backed by in-memory storage.
    pub fn new() -> Self {
        Self {
            storage: Arc::new(InMemorySurveyStorage::new()),
        }
    }

    /// Create a service backed by an explicit storage adapter.
    pub fn with_storage(storage: Arc<dyn SurveyStorage>) -> Self {
        Self { storage }
    }

    /// Access the underlying storage backend.
    pub fn storage(&self) -> Arc<dyn SurveyStorage> {
        Arc::clone(&self.storage)
    }

    /// Create a draft survey owned by the caller, or by the named
    /// surveyor when an admin creates on their behalf.
    pub async fn create(
        &self,
        caller: &Caller,
        request: CreateSurveyRequest,
    ) -> Result<SurveyRecord, WorkflowError> {
        let surveyor_id = match caller.role {
            Role::Surveyor => match request.surveyor_id {
                Some(id) if id != caller.id => {
                    return Err(WorkflowError::Forbidden(format!(
                        "surveyor {} may not create a survey owned by {}",
                        caller.id, id
                    )));
                }
                _ => caller.id.clone(),
            },
            Role::Admin => request.surveyor_id.unwrap_or_else(|| caller.id.clone()),
            role => {
                return Err(WorkflowError::Forbidden(format!(
                    "role {} may not create surveys",
                    role
                )));
            }
        };

        let mut record = SurveyRecord::new(request.facility_id, surveyor_id);
        if let Some(notes) = request.notes {
            record = record.with_surveyor_notes(notes);
        }

        let entry = AuditEntry::new(
            record.id.clone(),
            AuditAction::Created,
            caller.id.clone(),
            SurveyStatus::Draft,
            SurveyStatus::Draft,
        )
        .at(record.created_at);

        let (stored, _) = self.storage.create_survey(record, entry).await?;
        tracing::info!(
            survey_id = %stored.id,
            facility_id = %stored.facility_id,
            surveyor_id = %stored.surveyor_id,
            "survey created"
        );
        Ok(stored)
    }

    /// Perform a workflow action against a survey.
    ///
    /// On success the updated record is returned and exactly one audit
    /// entry has been appended; on failure nothing was written.
    pub async fn perform(
        &self,
        survey_id: &SurveyId,
        action: WorkflowAction,
        caller: &Caller,
        payload: ActionPayload,
    ) -> Result<SurveyRecord, WorkflowError> {
        let record = self.load(survey_id).await?;
        let transition = decide(&record, action, caller, &payload)?;

        let now = Utc::now();
        let updated = transition.apply(&record, now);
        // A rejection with no separate note keeps its reason visible in
        // the trail.
        let notes = payload
            .notes
            .or_else(|| transition.set_rejection_reason.clone())
            .unwrap_or_default();
        let entry = transition.audit_entry(&record, &caller.id, notes, now);

        let (saved, _) = self
            .storage
            .commit_transition(updated, record.version, entry)
            .await?;
        tracing::info!(
            survey_id = %saved.id,
            action = %action,
            actor_id = %caller.id,
            status = %saved.status,
            "transition applied"
        );
        Ok(saved)
    }

    /// Update free-text notes without changing status.
    ///
    /// The owning surveyor (or an admin owner) edits the surveyor notes
    /// while the record is in their hands; any other reviewer edits the
    /// verifier notes. One `UPDATED` audit entry per accepted call.
    pub async fn update_notes(
        &self,
        survey_id: &SurveyId,
        caller: &Caller,
        notes: impl Into<String>,
    ) -> Result<SurveyRecord, WorkflowError> {
        let record = self.load(survey_id).await?;
        let notes = notes.into();

        let mut updated = record.clone();
        if record.is_owned_by(caller) {
            if !record.status.is_editable_by_surveyor() {
                return Err(WorkflowError::Forbidden(format!(
                    "survey {} is under review and may not be edited by its surveyor",
                    record.id
                )));
            }
            updated.surveyor_notes = notes.clone();
        } else if caller.role.can_review() {
            updated.verifier_notes = notes.clone();
        } else {
            return Err(WorkflowError::Forbidden(format!(
                "caller {} may not edit notes on survey {}",
                caller.id, record.id
            )));
        }

        let now = Utc::now();
        updated.updated_at = now;
        let entry = AuditEntry::new(
            record.id.clone(),
            AuditAction::Updated,
            caller.id.clone(),
            record.status,
            record.status,
        )
        .with_notes(notes)
        .at(now);

        let (saved, _) = self
            .storage
            .commit_transition(updated, record.version, entry)
            .await?;
        tracing::info!(
            survey_id = %saved.id,
            actor_id = %caller.id,
            "notes updated"
        );
        Ok(saved)
    }

    /// Get one survey by id.
    pub async fn get_survey(&self, survey_id: &SurveyId) -> Result<SurveyRecord, WorkflowError> {
        self.load(survey_id).await
    }

    /// List surveys newest-first.
    pub async fn list_surveys(
        &self,
        window: QueryWindow,
    ) -> Result<Vec<SurveyRecord>, WorkflowError> {
        Ok(self.storage.list_surveys(window).await?)
    }

    /// Read a survey's audit trail in ascending order. Restartable via
    /// the window for UI pagination.
    pub async fn audit_trail(
        &self,
        survey_id: &SurveyId,
        window: QueryWindow,
    ) -> Result<Vec<AuditRecord>, WorkflowError> {
        // Surface a missing survey as NotFound rather than an empty page.
        self.load(survey_id).await?;
        Ok(self
            .storage
            .list_audit_for_survey(survey_id, window)
            .await?)
    }

    async fn load(&self, survey_id: &SurveyId) -> Result<SurveyRecord, WorkflowError> {
        self.storage
            .get_survey(survey_id)
            .await?
            .ok_or_else(|| WorkflowError::NotFound(survey_id.to_string()))
    }
}

impl Default for WorkflowService {
    fn default() -> Self {
        Self::new()
    }
}

// ── Errors ───────────────────────────────────────────────────────────

/// The full workflow error taxonomy surfaced to callers.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("survey {0} not found")]
    NotFound(String),

    #[error("action '{action}' is not valid while the survey is {from}")]
    InvalidTransition {
        from: SurveyStatus,
        action: WorkflowAction,
    },

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("a non-empty rejection reason is required")]
    MissingReason,

    #[error("assign requires a verifier id")]
    MissingAssignee,

    #[error("survey changed since it was loaded - refresh and retry: {0}")]
    Conflict(String),

    #[error("storage error: {0}")]
    Storage(String),
}

impl WorkflowError {
    /// Stable machine-readable kind for API consumers.
    pub fn kind(&self) -> &'static str {
        match self {
            WorkflowError::NotFound(_) => "NOT_FOUND",
            WorkflowError::InvalidTransition { .. } => "INVALID_TRANSITION",
            WorkflowError::Forbidden(_) => "FORBIDDEN",
            WorkflowError::MissingReason => "MISSING_REASON",
            WorkflowError::MissingAssignee => "MISSING_ASSIGNEE",
            WorkflowError::Conflict(_) => "CONFLICT",
            WorkflowError::Storage(_) => "STORAGE",
        }
    }
}

impl From<DecisionError> for WorkflowError {
    fn from(value: DecisionError) -> Self {
        match value {
            DecisionError::InvalidTransition { from, action } => {
                Self::InvalidTransition { from, action }
            }
            DecisionError::Forbidden(msg) => Self::Forbidden(msg),
            DecisionError::MissingReason => Self::MissingReason,
            DecisionError::MissingAssignee => Self::MissingAssignee,
        }
    }
}

impl From<StorageError> for WorkflowError {
    fn from(value: StorageError) -> Self {
        match value {
            StorageError::NotFound(msg) => Self::NotFound(msg),
            StorageError::Conflict(msg) => Self::Conflict(msg),
            StorageError::InvalidInput(msg)
            | StorageError::Serialization(msg)
            | StorageError::Backend(msg) => Self::Storage(msg),
        }
    }
}
