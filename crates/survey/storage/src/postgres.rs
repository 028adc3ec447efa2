//! PostgreSQL adapter for Haven survey storage.
//!
//! The transactional source-of-truth backend. A committed transition is
//! one transaction: the version-guarded record update doubles as the
//! optimistic-concurrency check, and the audit append rides in the same
//! transaction, so neither write can exist without the other.

use crate::memory::compute_audit_hash;
use crate::model::AuditRecord;
use crate::traits::{AuditStore, QueryWindow, SurveyStore, TransitionStore};
use crate::{StorageError, StorageResult};
use async_trait::async_trait;
use sqlx::postgres::{PgConnection, PgPool, PgPoolOptions};
use sqlx::{Acquire, Row};
use survey_types::{
    AuditAction, AuditEntry, FacilityId, SurveyId, SurveyRecord, SurveyStatus, UserId,
};
use uuid::Uuid;

/// PostgreSQL-backed storage adapter.
#[derive(Clone)]
pub struct PostgresSurveyStorage {
    pool: PgPool,
}

impl PostgresSurveyStorage {
    /// Connect to PostgreSQL and initialize the required schema.
    pub async fn connect(database_url: &str) -> StorageResult<Self> {
        Self::connect_with_options(database_url, 10, 5).await
    }

    /// Connect with explicit pool parameters.
    pub async fn connect_with_options(
        database_url: &str,
        max_connections: u32,
        connect_timeout_secs: u64,
    ) -> StorageResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(std::time::Duration::from_secs(connect_timeout_secs))
            .connect(database_url)
            .await
            .map_err(|e| StorageError::Backend(format!("failed to connect postgres: {e}")))?;
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// Create adapter from an existing pool.
    pub async fn from_pool(pool: PgPool) -> StorageResult<Self> {
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn init_schema(&self) -> StorageResult<()> {
        let ddl = [
            r#"
            CREATE TABLE IF NOT EXISTS haven_surveys (
                id TEXT PRIMARY KEY,
                facility_id TEXT NOT NULL,
                surveyor_id TEXT NOT NULL,
                status TEXT NOT NULL,
                assigned_verifier_id TEXT,
                verified_by_id TEXT,
                rejection_reason TEXT NOT NULL DEFAULT '',
                surveyor_notes TEXT NOT NULL DEFAULT '',
                verifier_notes TEXT NOT NULL DEFAULT '',
                version BIGINT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS haven_survey_audit (
                entry_id TEXT PRIMARY KEY,
                sequence BIGINT NOT NULL UNIQUE,
                survey_id TEXT NOT NULL,
                action TEXT NOT NULL,
                actor_id TEXT NOT NULL,
                previous_status TEXT NOT NULL,
                new_status TEXT NOT NULL,
                notes TEXT NOT NULL DEFAULT '',
                timestamp TIMESTAMPTZ NOT NULL,
                previous_hash TEXT,
                hash TEXT NOT NULL
            )
            "#,
            r#"
            CREATE INDEX IF NOT EXISTS haven_survey_audit_survey_idx
                ON haven_survey_audit (survey_id, sequence)
            "#,
        ];

        for stmt in ddl {
            sqlx::query(stmt)
                .execute(&self.pool)
                .await
                .map_err(|e| StorageError::Backend(format!("schema init failed: {e}")))?;
        }
        Ok(())
    }
}

#[async_trait]
impl SurveyStore for PostgresSurveyStorage {
    async fn create_survey(
        &self,
        record: SurveyRecord,
        entry: AuditEntry,
    ) -> StorageResult<(SurveyRecord, AuditRecord)> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        let conn = tx
            .acquire()
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        let mut stored = record;
        stored.version = 1;

        let result = sqlx::query(
            r#"
            INSERT INTO haven_surveys
                (id, facility_id, surveyor_id, status, assigned_verifier_id, verified_by_id,
                 rejection_reason, surveyor_notes, verifier_notes, version, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(stored.id.0.clone())
        .bind(stored.facility_id.0.clone())
        .bind(stored.surveyor_id.0.clone())
        .bind(stored.status.as_str())
        .bind(stored.assigned_verifier_id.as_ref().map(|id| id.0.clone()))
        .bind(stored.verified_by_id.as_ref().map(|id| id.0.clone()))
        .bind(stored.rejection_reason.clone())
        .bind(stored.surveyor_notes.clone())
        .bind(stored.verifier_notes.clone())
        .bind(to_i64(stored.version as usize)?)
        .bind(stored.created_at)
        .bind(stored.updated_at)
        .execute(&mut *conn)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(StorageError::Conflict(format!(
                "survey {} already exists",
                stored.id
            )));
        }

        let audit = append_audit_in_tx(conn, &entry).await?;

        tx.commit()
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok((stored, audit))
    }

    async fn get_survey(&self, id: &SurveyId) -> StorageResult<Option<SurveyRecord>> {
        let row = sqlx::query(
            r#"
            SELECT id, facility_id, surveyor_id, status, assigned_verifier_id, verified_by_id,
                   rejection_reason, surveyor_notes, verifier_notes, version, created_at, updated_at
              FROM haven_surveys
             WHERE id = $1
            "#,
        )
        .bind(id.0.clone())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;

        row.map(survey_row_to_record).transpose()
    }

    async fn list_surveys(&self, window: QueryWindow) -> StorageResult<Vec<SurveyRecord>> {
        let rows = if window.limit == 0 {
            sqlx::query(
                r#"
                SELECT id, facility_id, surveyor_id, status, assigned_verifier_id, verified_by_id,
                       rejection_reason, surveyor_notes, verifier_notes, version, created_at, updated_at
                  FROM haven_surveys
                 ORDER BY updated_at DESC
                 OFFSET $1
                "#,
            )
            .bind(to_i64(window.offset)?)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?
        } else {
            sqlx::query(
                r#"
                SELECT id, facility_id, surveyor_id, status, assigned_verifier_id, verified_by_id,
                       rejection_reason, surveyor_notes, verifier_notes, version, created_at, updated_at
                  FROM haven_surveys
                 ORDER BY updated_at DESC
                 LIMIT $1 OFFSET $2
                "#,
            )
            .bind(to_i64(window.limit)?)
            .bind(to_i64(window.offset)?)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?
        };

        rows.into_iter().map(survey_row_to_record).collect()
    }
}

#[async_trait]
impl AuditStore for PostgresSurveyStorage {
    async fn list_audit_for_survey(
        &self,
        survey_id: &SurveyId,
        window: QueryWindow,
    ) -> StorageResult<Vec<AuditRecord>> {
        let rows = if window.limit == 0 {
            sqlx::query(
                r#"
                SELECT entry_id, sequence, survey_id, action, actor_id, previous_status,
                       new_status, notes, timestamp, previous_hash, hash
                  FROM haven_survey_audit
                 WHERE survey_id = $1
                 ORDER BY sequence ASC
                 OFFSET $2
                "#,
            )
            .bind(survey_id.0.clone())
            .bind(to_i64(window.offset)?)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?
        } else {
            sqlx::query(
                r#"
                SELECT entry_id, sequence, survey_id, action, actor_id, previous_status,
                       new_status, notes, timestamp, previous_hash, hash
                  FROM haven_survey_audit
                 WHERE survey_id = $1
                 ORDER BY sequence ASC
                 LIMIT $2 OFFSET $3
                "#,
            )
            .bind(survey_id.0.clone())
            .bind(to_i64(window.limit)?)
            .bind(to_i64(window.offset)?)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?
        };

        rows.into_iter().map(audit_row_to_record).collect()
    }

    async fn latest_audit_hash(&self) -> StorageResult<Option<String>> {
        let row =
            sqlx::query("SELECT hash FROM haven_survey_audit ORDER BY sequence DESC LIMIT 1")
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| StorageError::Backend(e.to_string()))?;

        row.map(|r| {
            r.try_get::<String, _>("hash")
                .map_err(|e| StorageError::Backend(e.to_string()))
        })
        .transpose()
    }
}

#[async_trait]
impl TransitionStore for PostgresSurveyStorage {
    async fn commit_transition(
        &self,
        record: SurveyRecord,
        expected_version: u64,
        entry: AuditEntry,
    ) -> StorageResult<(SurveyRecord, AuditRecord)> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        let conn = tx
            .acquire()
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        let mut updated = record;
        updated.version = expected_version + 1;

        let result = sqlx::query(
            r#"
            UPDATE haven_surveys
               SET status = $1,
                   assigned_verifier_id = $2,
                   verified_by_id = $3,
                   rejection_reason = $4,
                   surveyor_notes = $5,
                   verifier_notes = $6,
                   version = $7,
                   updated_at = $8
             WHERE id = $9
               AND version = $10
            "#,
        )
        .bind(updated.status.as_str())
        .bind(updated.assigned_verifier_id.as_ref().map(|id| id.0.clone()))
        .bind(updated.verified_by_id.as_ref().map(|id| id.0.clone()))
        .bind(updated.rejection_reason.clone())
        .bind(updated.surveyor_notes.clone())
        .bind(updated.verifier_notes.clone())
        .bind(to_i64(updated.version as usize)?)
        .bind(updated.updated_at)
        .bind(updated.id.0.clone())
        .bind(to_i64(expected_version as usize)?)
        .execute(&mut *conn)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;

        if result.rows_affected() == 0 {
            let exists = sqlx::query("SELECT 1 FROM haven_surveys WHERE id = $1")
                .bind(updated.id.0.clone())
                .fetch_optional(&mut *conn)
                .await
                .map_err(|e| StorageError::Backend(e.to_string()))?
                .is_some();
            if exists {
                return Err(StorageError::Conflict(format!(
                    "survey {} changed since it was loaded (expected version {})",
                    updated.id, expected_version
                )));
            }
            return Err(StorageError::NotFound(format!(
                "survey {} not found",
                updated.id
            )));
        }

        let audit = append_audit_in_tx(conn, &entry).await?;

        tx.commit()
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok((updated, audit))
    }
}

/// Append an audit entry inside the caller's transaction. The exclusive
/// table lock serializes sequence assignment and chain extension.
async fn append_audit_in_tx(
    conn: &mut PgConnection,
    entry: &AuditEntry,
) -> StorageResult<AuditRecord> {
    sqlx::query("LOCK TABLE haven_survey_audit IN EXCLUSIVE MODE")
        .execute(&mut *conn)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;

    let last =
        sqlx::query("SELECT sequence, hash FROM haven_survey_audit ORDER BY sequence DESC LIMIT 1")
            .fetch_optional(&mut *conn)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

    let (sequence, previous_hash) = if let Some(row) = last {
        let seq: i64 = row
            .try_get("sequence")
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        let prev: String = row
            .try_get("hash")
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        (seq + 1, Some(prev))
    } else {
        (1_i64, None)
    };

    let hash = compute_audit_hash(entry, previous_hash.as_deref(), sequence as u64)?;
    let entry_id = format!("audit-{}", Uuid::new_v4());

    sqlx::query(
        r#"
        INSERT INTO haven_survey_audit
            (entry_id, sequence, survey_id, action, actor_id, previous_status,
             new_status, notes, timestamp, previous_hash, hash)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        "#,
    )
    .bind(entry_id.clone())
    .bind(sequence)
    .bind(entry.survey_id.0.clone())
    .bind(entry.action.as_str())
    .bind(entry.actor_id.0.clone())
    .bind(entry.previous_status.as_str())
    .bind(entry.new_status.as_str())
    .bind(entry.notes.clone())
    .bind(entry.timestamp)
    .bind(previous_hash.clone())
    .bind(hash.clone())
    .execute(&mut *conn)
    .await
    .map_err(|e| StorageError::Backend(e.to_string()))?;

    Ok(AuditRecord {
        entry_id,
        sequence: sequence as u64,
        entry: entry.clone(),
        previous_hash,
        hash,
    })
}

fn survey_row_to_record(row: sqlx::postgres::PgRow) -> StorageResult<SurveyRecord> {
    let version: i64 = get_column(&row, "version")?;
    Ok(SurveyRecord {
        id: SurveyId::new(get_column::<String>(&row, "id")?),
        facility_id: FacilityId::new(get_column::<String>(&row, "facility_id")?),
        surveyor_id: UserId::new(get_column::<String>(&row, "surveyor_id")?),
        status: status_from_str(&get_column::<String>(&row, "status")?)?,
        assigned_verifier_id: get_column::<Option<String>>(&row, "assigned_verifier_id")?
            .map(UserId::new),
        verified_by_id: get_column::<Option<String>>(&row, "verified_by_id")?.map(UserId::new),
        rejection_reason: get_column(&row, "rejection_reason")?,
        surveyor_notes: get_column(&row, "surveyor_notes")?,
        verifier_notes: get_column(&row, "verifier_notes")?,
        version: version as u64,
        created_at: get_column(&row, "created_at")?,
        updated_at: get_column(&row, "updated_at")?,
    })
}

fn audit_row_to_record(row: sqlx::postgres::PgRow) -> StorageResult<AuditRecord> {
    let sequence: i64 = get_column(&row, "sequence")?;
    let entry = AuditEntry {
        survey_id: SurveyId::new(get_column::<String>(&row, "survey_id")?),
        action: action_from_str(&get_column::<String>(&row, "action")?)?,
        actor_id: UserId::new(get_column::<String>(&row, "actor_id")?),
        previous_status: status_from_str(&get_column::<String>(&row, "previous_status")?)?,
        new_status: status_from_str(&get_column::<String>(&row, "new_status")?)?,
        notes: get_column(&row, "notes")?,
        timestamp: get_column(&row, "timestamp")?,
    };
    Ok(AuditRecord {
        entry_id: get_column(&row, "entry_id")?,
        sequence: sequence as u64,
        entry,
        previous_hash: get_column(&row, "previous_hash")?,
        hash: get_column(&row, "hash")?,
    })
}

fn get_column<'r, T>(row: &'r sqlx::postgres::PgRow, name: &str) -> StorageResult<T>
where
    T: sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
{
    row.try_get(name)
        .map_err(|e| StorageError::Backend(format!("column {name}: {e}")))
}

fn status_from_str(value: &str) -> StorageResult<SurveyStatus> {
    match value {
        "DRAFT" => Ok(SurveyStatus::Draft),
        "SUBMITTED" => Ok(SurveyStatus::Submitted),
        "VERIFIED" => Ok(SurveyStatus::Verified),
        "REJECTED" => Ok(SurveyStatus::Rejected),
        other => Err(StorageError::Serialization(format!(
            "unknown survey status: {other}"
        ))),
    }
}

fn action_from_str(value: &str) -> StorageResult<AuditAction> {
    match value {
        "CREATED" => Ok(AuditAction::Created),
        "UPDATED" => Ok(AuditAction::Updated),
        "SUBMITTED" => Ok(AuditAction::Submitted),
        "ASSIGNED" => Ok(AuditAction::Assigned),
        "VERIFIED" => Ok(AuditAction::Verified),
        "REJECTED" => Ok(AuditAction::Rejected),
        "RESUBMITTED" => Ok(AuditAction::Resubmitted),
        other => Err(StorageError::Serialization(format!(
            "unknown audit action: {other}"
        ))),
    }
}

fn to_i64(value: usize) -> StorageResult<i64> {
    i64::try_from(value).map_err(|_| StorageError::InvalidInput("value exceeds i64".to_string()))
}
