//! Verification state machine for Haven surveys.
//!
//! [`decide`] is the single authority on which transitions are allowed.
//! It is a pure function: no I/O, no clock, no global state. Given the
//! current record, the requested action, the caller, and the action
//! payload, it either returns a complete [`Transition`] or a typed
//! [`DecisionError`] - never a partial result.
//!
//! Checks run in a fixed order so failures are stable:
//!
//! 1. `(status, action)` table lookup → [`DecisionError::InvalidTransition`]
//! 2. authorization → [`DecisionError::Forbidden`]
//! 3. payload validation → [`DecisionError::MissingReason`] /
//!    [`DecisionError::MissingAssignee`]
//!
//! Separation of duties is uniform: the caller who authored a submission
//! can never verify or reject it, regardless of role. There is no admin
//! override; relaxing this would require a separately named action.

#![deny(unsafe_code)]

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use survey_types::{
    ActionPayload, AuditAction, AuditEntry, Caller, SurveyRecord, SurveyStatus, UserId,
    WorkflowAction,
};
use thiserror::Error;

// ── Decision errors ──────────────────────────────────────────────────

/// Failures the state machine itself can produce. Purely logical; this
/// crate never touches storage.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum DecisionError {
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
}

// ── Transition ───────────────────────────────────────────────────────

/// A fully decided transition: the resulting status, the field mutations
/// to apply, and the audit action label. Produced only by [`decide`];
/// applying it cannot fail.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    /// The action that was decided
    pub action: WorkflowAction,
    /// Label for the audit trail entry
    pub audit_action: AuditAction,
    /// Status after the transition (`assign` keeps the current status)
    pub new_status: SurveyStatus,
    /// Set `verified_by_id` to this caller
    #[serde(skip_serializing_if = "Option::is_none")]
    pub set_verified_by: Option<UserId>,
    /// Set `assigned_verifier_id`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub set_assigned_verifier: Option<UserId>,
    /// Set `rejection_reason` (already validated non-empty)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub set_rejection_reason: Option<String>,
    /// Clear `rejection_reason` on the way out of `Rejected`
    pub clear_rejection_reason: bool,
}

impl Transition {
    /// Produce the updated record. `now` is supplied by the caller so the
    /// crate stays deterministic.
    pub fn apply(&self, record: &SurveyRecord, now: DateTime<Utc>) -> SurveyRecord {
        let mut updated = record.clone();
        updated.status = self.new_status;
        if self.clear_rejection_reason {
            updated.rejection_reason.clear();
        }
        if let Some(reason) = &self.set_rejection_reason {
            updated.rejection_reason = reason.clone();
        }
        if let Some(verifier) = &self.set_verified_by {
            updated.verified_by_id = Some(verifier.clone());
        }
        if let Some(assignee) = &self.set_assigned_verifier {
            updated.assigned_verifier_id = Some(assignee.clone());
        }
        updated.updated_at = now;
        updated
    }

    /// Build the audit entry for this transition against the record as it
    /// was *before* the transition applied.
    pub fn audit_entry(
        &self,
        record: &SurveyRecord,
        actor: &UserId,
        notes: impl Into<String>,
        now: DateTime<Utc>,
    ) -> AuditEntry {
        AuditEntry::new(
            record.id.clone(),
            self.audit_action,
            actor.clone(),
            record.status,
            self.new_status,
        )
        .with_notes(notes)
        .at(now)
    }
}

// ── Decision function ────────────────────────────────────────────────

/// Decide whether `caller` may perform `action` on `record`.
///
/// Deterministic and side-effect free. Every `Ok` result corresponds to
/// exactly one row of the transition table; everything else is a typed
/// failure.
pub fn decide(
    record: &SurveyRecord,
    action: WorkflowAction,
    caller: &Caller,
    payload: &ActionPayload,
) -> Result<Transition, DecisionError> {
    match (record.status, action) {
        (SurveyStatus::Draft, WorkflowAction::Submit) => {
            authorize_owner(record, caller, action)?;
            Ok(Transition {
                action,
                audit_action: AuditAction::Submitted,
                new_status: SurveyStatus::Submitted,
                set_verified_by: None,
                set_assigned_verifier: None,
                set_rejection_reason: None,
                clear_rejection_reason: true,
            })
        }
        (SurveyStatus::Submitted, WorkflowAction::Verify) => {
            authorize_reviewer(record, caller, action)?;
            Ok(Transition {
                action,
                audit_action: AuditAction::Verified,
                new_status: SurveyStatus::Verified,
                set_verified_by: Some(caller.id.clone()),
                set_assigned_verifier: None,
                set_rejection_reason: None,
                clear_rejection_reason: true,
            })
        }
        (SurveyStatus::Submitted, WorkflowAction::Reject) => {
            authorize_reviewer(record, caller, action)?;
            let reason = required_reason(payload)?;
            Ok(Transition {
                action,
                audit_action: AuditAction::Rejected,
                new_status: SurveyStatus::Rejected,
                set_verified_by: None,
                set_assigned_verifier: None,
                set_rejection_reason: Some(reason),
                clear_rejection_reason: false,
            })
        }
        (SurveyStatus::Rejected, WorkflowAction::Resubmit) => {
            authorize_owner(record, caller, action)?;
            Ok(Transition {
                action,
                audit_action: AuditAction::Resubmitted,
                new_status: SurveyStatus::Submitted,
                set_verified_by: None,
                set_assigned_verifier: None,
                set_rejection_reason: None,
                clear_rejection_reason: true,
            })
        }
        // assign is valid from any status and keeps it
        (status, WorkflowAction::Assign) => {
            if !caller.role.can_review() {
                return Err(DecisionError::Forbidden(format!(
                    "role {} may not assign verifiers",
                    caller.role
                )));
            }
            let assignee = payload
                .verifier_id
                .clone()
                .ok_or(DecisionError::MissingAssignee)?;
            Ok(Transition {
                action,
                audit_action: AuditAction::Assigned,
                new_status: status,
                set_verified_by: None,
                set_assigned_verifier: Some(assignee),
                set_rejection_reason: None,
                clear_rejection_reason: false,
            })
        }
        (from, action) => Err(DecisionError::InvalidTransition { from, action }),
    }
}

/// The owning surveyor, or an admin acting on their behalf.
fn authorize_owner(
    record: &SurveyRecord,
    caller: &Caller,
    action: WorkflowAction,
) -> Result<(), DecisionError> {
    if record.is_owned_by(caller) || caller.is_admin() {
        return Ok(());
    }
    Err(DecisionError::Forbidden(format!(
        "only the owning surveyor or an admin may {} survey {}",
        action, record.id
    )))
}

/// A reviewer who is not the author. Applies uniformly to verifiers and
/// admins: self-certification is never allowed.
fn authorize_reviewer(
    record: &SurveyRecord,
    caller: &Caller,
    action: WorkflowAction,
) -> Result<(), DecisionError> {
    if !caller.role.can_review() {
        return Err(DecisionError::Forbidden(format!(
            "role {} may not {} submissions",
            caller.role, action
        )));
    }
    if caller.id == record.surveyor_id {
        return Err(DecisionError::Forbidden(format!(
            "caller {} may not {} their own submission",
            caller.id, action
        )));
    }
    Ok(())
}

fn required_reason(payload: &ActionPayload) -> Result<String, DecisionError> {
    match payload.rejection_reason.as_deref().map(str::trim) {
        Some(reason) if !reason.is_empty() => Ok(reason.to_string()),
        _ => Err(DecisionError::MissingReason),
    }
}
