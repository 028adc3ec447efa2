//! Survey verification domain types for Haven.
//!
//! A survey record moves from `Draft` through `Submitted` to `Verified` or
//! `Rejected`, driven by the verification workflow. Everything that crosses
//! a layer boundary lives here: identifiers, the status and role
//! enumerations, the record itself, and the audit vocabulary.

#![deny(unsafe_code)]

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ── Identifiers ──────────────────────────────────────────────────────

/// Unique identifier for a survey record
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SurveyId(pub String);

impl SurveyId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn short(&self) -> &str {
        &self.0[..8.min(self.0.len())]
    }
}

impl std::fmt::Display for SurveyId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of a platform user (surveyor, verifier, admin, viewer)
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of the facility a survey describes
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FacilityId(pub String);

impl FacilityId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for FacilityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ── Roles and callers ────────────────────────────────────────────────

/// Role of an authenticated caller.
///
/// Identity and role are supplied by the authentication layer; this crate
/// only consumes them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Surveyor,
    Verifier,
    Admin,
    Viewer,
}

impl Role {
    /// Roles permitted to review submissions (verify, reject, assign).
    pub fn can_review(&self) -> bool {
        matches!(self, Role::Verifier | Role::Admin)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Surveyor => "SURVEYOR",
            Role::Verifier => "VERIFIER",
            Role::Admin => "ADMIN",
            Role::Viewer => "VIEWER",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = ParseRoleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "SURVEYOR" => Ok(Role::Surveyor),
            "VERIFIER" => Ok(Role::Verifier),
            "ADMIN" => Ok(Role::Admin),
            "VIEWER" => Ok(Role::Viewer),
            other => Err(ParseRoleError(other.to_string())),
        }
    }
}

/// Error for unrecognized role names.
#[derive(Debug, Error)]
#[error("unknown role: {0}")]
pub struct ParseRoleError(pub String);

/// An authenticated caller: identity plus role.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Caller {
    pub id: UserId,
    pub role: Role,
}

impl Caller {
    pub fn new(id: impl Into<String>, role: Role) -> Self {
        Self {
            id: UserId::new(id),
            role,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

// ── Survey status ────────────────────────────────────────────────────

/// Verification status of a survey record (closed enumeration).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SurveyStatus {
    /// Being authored by the surveyor; not yet visible to verifiers
    #[default]
    Draft,
    /// Awaiting verification
    Submitted,
    /// Accepted as trusted data
    Verified,
    /// Sent back to the surveyor with a reason
    Rejected,
}

impl SurveyStatus {
    /// Whether the record is back in the surveyor's hands.
    pub fn is_editable_by_surveyor(&self) -> bool {
        matches!(self, SurveyStatus::Draft | SurveyStatus::Rejected)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SurveyStatus::Draft => "DRAFT",
            SurveyStatus::Submitted => "SUBMITTED",
            SurveyStatus::Verified => "VERIFIED",
            SurveyStatus::Rejected => "REJECTED",
        }
    }
}

impl std::fmt::Display for SurveyStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ── Workflow actions ─────────────────────────────────────────────────

/// Action a caller requests against a survey record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowAction {
    Submit,
    Verify,
    Reject,
    Resubmit,
    Assign,
}

impl WorkflowAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowAction::Submit => "submit",
            WorkflowAction::Verify => "verify",
            WorkflowAction::Reject => "reject",
            WorkflowAction::Resubmit => "resubmit",
            WorkflowAction::Assign => "assign",
        }
    }
}

impl std::fmt::Display for WorkflowAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Action-specific inputs carried alongside a workflow action.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionPayload {
    /// Free-text note recorded on the audit entry
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// Required for `reject`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,
    /// Required for `assign`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verifier_id: Option<UserId>,
}

impl ActionPayload {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn with_rejection_reason(mut self, reason: impl Into<String>) -> Self {
        self.rejection_reason = Some(reason.into());
        self
    }

    pub fn with_verifier(mut self, verifier: UserId) -> Self {
        self.verifier_id = Some(verifier);
        self
    }
}

// ── Survey record ────────────────────────────────────────────────────

/// A field-collected survey response and its verification state.
///
/// `status` is only ever mutated by the verification workflow; `version`
/// is owned by storage and bumped on every committed write.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurveyRecord {
    /// Unique record identifier
    pub id: SurveyId,
    /// The facility this survey describes
    pub facility_id: FacilityId,
    /// The user who owns and authored the survey (immutable)
    pub surveyor_id: UserId,
    /// Current verification status
    pub status: SurveyStatus,
    /// Verifier assigned to review, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_verifier_id: Option<UserId>,
    /// Who last verified the record, if it has ever been verified
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verified_by_id: Option<UserId>,
    /// Non-empty exactly while the record is `Rejected`
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub rejection_reason: String,
    /// Free text owned by the surveyor; never affects transitions
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub surveyor_notes: String,
    /// Free text owned by reviewers; never affects transitions
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub verifier_notes: String,
    /// Optimistic-concurrency token, assigned and bumped by storage
    pub version: u64,
    /// When the record was created
    pub created_at: DateTime<Utc>,
    /// When the record last changed
    pub updated_at: DateTime<Utc>,
}

impl SurveyRecord {
    /// Create a fresh draft owned by `surveyor_id`.
    pub fn new(facility_id: FacilityId, surveyor_id: UserId) -> Self {
        let now = Utc::now();
        Self {
            id: SurveyId::generate(),
            facility_id,
            surveyor_id,
            status: SurveyStatus::Draft,
            assigned_verifier_id: None,
            verified_by_id: None,
            rejection_reason: String::new(),
            surveyor_notes: String::new(),
            verifier_notes: String::new(),
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_surveyor_notes(mut self, notes: impl Into<String>) -> Self {
        self.surveyor_notes = notes.into();
        self
    }

    /// Whether `caller` is the owning surveyor.
    pub fn is_owned_by(&self, caller: &Caller) -> bool {
        self.surveyor_id == caller.id
    }
}

// ── Audit vocabulary ─────────────────────────────────────────────────

/// What happened to a survey record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    Created,
    Updated,
    Submitted,
    Assigned,
    Verified,
    Rejected,
    Resubmitted,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Created => "CREATED",
            AuditAction::Updated => "UPDATED",
            AuditAction::Submitted => "SUBMITTED",
            AuditAction::Assigned => "ASSIGNED",
            AuditAction::Verified => "VERIFIED",
            AuditAction::Rejected => "REJECTED",
            AuditAction::Resubmitted => "RESUBMITTED",
        }
    }
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One audit trail entry. Immutable once written; storage assigns
/// sequencing and the tamper-evidence chain.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub survey_id: SurveyId,
    pub action: AuditAction,
    pub actor_id: UserId,
    pub previous_status: SurveyStatus,
    pub new_status: SurveyStatus,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub notes: String,
    pub timestamp: DateTime<Utc>,
}

impl AuditEntry {
    pub fn new(
        survey_id: SurveyId,
        action: AuditAction,
        actor_id: UserId,
        previous_status: SurveyStatus,
        new_status: SurveyStatus,
    ) -> Self {
        Self {
            survey_id,
            action,
            actor_id,
            previous_status,
            new_status,
            notes: String::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = notes.into();
        self
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_record_is_draft() {
        let record = SurveyRecord::new(FacilityId::new("fac-1"), UserId::new("42"));
        assert_eq!(record.status, SurveyStatus::Draft);
        assert_eq!(record.version, 1);
        assert!(record.rejection_reason.is_empty());
        assert!(record.verified_by_id.is_none());
        assert_eq!(record.created_at, record.updated_at);
    }

    #[test]
    fn test_ownership() {
        let record = SurveyRecord::new(FacilityId::new("fac-1"), UserId::new("42"));
        assert!(record.is_owned_by(&Caller::new("42", Role::Surveyor)));
        assert!(!record.is_owned_by(&Caller::new("7", Role::Surveyor)));
        // Role does not grant ownership
        assert!(!record.is_owned_by(&Caller::new("7", Role::Admin)));
    }

    #[test]
    fn test_role_predicates() {
        assert!(Role::Verifier.can_review());
        assert!(Role::Admin.can_review());
        assert!(!Role::Surveyor.can_review());
        assert!(!Role::Viewer.can_review());
    }

    #[test]
    fn test_role_parsing() {
        assert_eq!("verifier".parse::<Role>().unwrap(), Role::Verifier);
        assert_eq!("ADMIN".parse::<Role>().unwrap(), Role::Admin);
        assert!("superuser".parse::<Role>().is_err());
    }

    #[test]
    fn test_status_serialization_matches_contract() {
        let json = serde_json::to_string(&SurveyStatus::Submitted).unwrap();
        assert_eq!(json, "\"SUBMITTED\"");
        let back: SurveyStatus = serde_json::from_str("\"REJECTED\"").unwrap();
        assert_eq!(back, SurveyStatus::Rejected);
    }

    #[test]
    fn test_action_serialization_is_lowercase() {
        let json = serde_json::to_string(&WorkflowAction::Resubmit).unwrap();
        assert_eq!(json, "\"resubmit\"");
    }

    #[test]
    fn test_editable_statuses() {
        assert!(SurveyStatus::Draft.is_editable_by_surveyor());
        assert!(SurveyStatus::Rejected.is_editable_by_surveyor());
        assert!(!SurveyStatus::Submitted.is_editable_by_surveyor());
        assert!(!SurveyStatus::Verified.is_editable_by_surveyor());
    }

    #[test]
    fn test_payload_builders() {
        let payload = ActionPayload::new()
            .with_notes("checked on site")
            .with_rejection_reason("missing bed data")
            .with_verifier(UserId::new("7"));
        assert_eq!(payload.notes.as_deref(), Some("checked on site"));
        assert_eq!(payload.rejection_reason.as_deref(), Some("missing bed data"));
        assert_eq!(payload.verifier_id, Some(UserId::new("7")));
    }

    #[test]
    fn test_audit_entry_builder() {
        let entry = AuditEntry::new(
            SurveyId::new("s-1"),
            AuditAction::Submitted,
            UserId::new("42"),
            SurveyStatus::Draft,
            SurveyStatus::Submitted,
        )
        .with_notes("first pass");
        assert_eq!(entry.action, AuditAction::Submitted);
        assert_eq!(entry.notes, "first pass");
    }

    #[test]
    fn test_survey_id_display() {
        let id = SurveyId::generate();
        assert!(!id.0.is_empty());
        assert!(id.short().len() <= 8);

        let named = SurveyId::new("survey-1");
        assert_eq!(format!("{}", named), "survey-1");
    }
}
