//! Survey workflow handlers.

use crate::error::ApiError;
use crate::state::AppState;
use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use survey_service::CreateSurveyRequest;
use survey_storage::{AuditRecord, QueryWindow};
use survey_types::{
    ActionPayload, Caller, FacilityId, Role, SurveyId, SurveyRecord, SurveyStatus, UserId,
    WorkflowAction,
};

/// Header carrying the authenticated caller's id.
pub const CALLER_ID_HEADER: &str = "x-haven-caller-id";
/// Header carrying the authenticated caller's role.
pub const CALLER_ROLE_HEADER: &str = "x-haven-caller-role";

// ── Request/response bodies ──────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CreateSurveyBody {
    pub facility_id: String,
    pub surveyor_id: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TransitionBody {
    pub action: WorkflowAction,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub rejection_reason: Option<String>,
    #[serde(default)]
    pub verifier_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct NotesBody {
    pub notes: String,
}

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
}

fn default_limit() -> usize {
    50
}

#[derive(Debug, Serialize)]
pub struct SurveyResponse {
    pub id: String,
    pub facility_id: String,
    pub surveyor_id: String,
    pub status: SurveyStatus,
    pub assigned_verifier_id: Option<String>,
    pub verified_by_id: Option<String>,
    pub rejection_reason: String,
    pub surveyor_notes: String,
    pub verifier_notes: String,
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<SurveyRecord> for SurveyResponse {
    fn from(record: SurveyRecord) -> Self {
        Self {
            id: record.id.0,
            facility_id: record.facility_id.0,
            surveyor_id: record.surveyor_id.0,
            status: record.status,
            assigned_verifier_id: record.assigned_verifier_id.map(|id| id.0),
            verified_by_id: record.verified_by_id.map(|id| id.0),
            rejection_reason: record.rejection_reason,
            surveyor_notes: record.surveyor_notes,
            verifier_notes: record.verifier_notes,
            version: record.version,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AuditEntryResponse {
    pub sequence: u64,
    pub action: survey_types::AuditAction,
    pub actor_id: String,
    pub previous_status: SurveyStatus,
    pub new_status: SurveyStatus,
    pub notes: String,
    pub timestamp: DateTime<Utc>,
}

impl From<AuditRecord> for AuditEntryResponse {
    fn from(record: AuditRecord) -> Self {
        Self {
            sequence: record.sequence,
            action: record.entry.action,
            actor_id: record.entry.actor_id.0,
            previous_status: record.entry.previous_status,
            new_status: record.entry.new_status,
            notes: record.entry.notes,
            timestamp: record.entry.timestamp,
        }
    }
}

// ── Handlers ─────────────────────────────────────────────────────────

pub async fn create_survey(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<CreateSurveyBody>,
) -> Result<(StatusCode, Json<SurveyResponse>), ApiError> {
    let caller = caller_from_headers(&headers)?;
    let mut request = CreateSurveyRequest::new(FacilityId::new(body.facility_id));
    if let Some(surveyor) = body.surveyor_id {
        request = request.on_behalf_of(UserId::new(surveyor));
    }
    if let Some(notes) = body.notes {
        request = request.with_notes(notes);
    }

    let record = state.service.create(&caller, request).await?;
    Ok((StatusCode::CREATED, Json(record.into())))
}

pub async fn get_survey(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SurveyResponse>, ApiError> {
    let record = state.service.get_survey(&SurveyId::new(id)).await?;
    Ok(Json(record.into()))
}

pub async fn list_surveys(
    State(state): State<AppState>,
    Query(page): Query<PageQuery>,
) -> Result<Json<Vec<SurveyResponse>>, ApiError> {
    let records = state
        .service
        .list_surveys(QueryWindow {
            limit: page.limit,
            offset: page.offset,
        })
        .await?;
    Ok(Json(records.into_iter().map(Into::into).collect()))
}

pub async fn perform_transition(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<TransitionBody>,
) -> Result<Json<SurveyResponse>, ApiError> {
    let caller = caller_from_headers(&headers)?;
    let mut payload = ActionPayload::new();
    payload.notes = body.notes;
    payload.rejection_reason = body.rejection_reason;
    payload.verifier_id = body.verifier_id.map(UserId::new);

    let record = state
        .service
        .perform(&SurveyId::new(id), body.action, &caller, payload)
        .await?;
    Ok(Json(record.into()))
}

pub async fn update_notes(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<NotesBody>,
) -> Result<Json<SurveyResponse>, ApiError> {
    let caller = caller_from_headers(&headers)?;
    let record = state
        .service
        .update_notes(&SurveyId::new(id), &caller, body.notes)
        .await?;
    Ok(Json(record.into()))
}

pub async fn audit_trail(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(page): Query<PageQuery>,
) -> Result<Json<Vec<AuditEntryResponse>>, ApiError> {
    let records = state
        .service
        .audit_trail(
            &SurveyId::new(id),
            QueryWindow {
                limit: page.limit,
                offset: page.offset,
            },
        )
        .await?;
    Ok(Json(records.into_iter().map(Into::into).collect()))
}

// ── Caller identity ──────────────────────────────────────────────────

/// Extract the caller identity the upstream auth layer injected.
pub fn caller_from_headers(headers: &HeaderMap) -> Result<Caller, ApiError> {
    let id = header_value(headers, CALLER_ID_HEADER)?;
    let role = header_value(headers, CALLER_ROLE_HEADER)?
        .parse::<Role>()
        .map_err(|err| ApiError::Unauthorized(err.to_string()))?;
    Ok(Caller::new(id, role))
}

fn header_value(headers: &HeaderMap, name: &str) -> Result<String, ApiError> {
    let value = headers
        .get(name)
        .ok_or_else(|| ApiError::Unauthorized(format!("missing {name} header")))?;
    let value = value
        .to_str()
        .map_err(|_| ApiError::Unauthorized(format!("malformed {name} header")))?;
    if value.trim().is_empty() {
        return Err(ApiError::Unauthorized(format!("empty {name} header")));
    }
    Ok(value.to_string())
}
