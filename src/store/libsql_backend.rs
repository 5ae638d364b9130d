//! libSQL backend — async `Database` trait implementation.
//!
//! Supports local file and in-memory databases. All uniqueness rules are
//! expressed as `ON CONFLICT` upserts so concurrent duplicate saves from
//! the same user converge to one row.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::info;
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::sequences::step::{ResponseMap, SequenceKind, StepKey, StepTag};
use crate::store::migrations;
use crate::store::model::{
    DailyLog, Metric, MetricResponse, MetricType, PageEvent, ProgressStatus, SequenceProgress,
    UserProfile,
};
use crate::store::traits::Database;

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.run_migrations().await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.run_migrations().await?;
        Ok(backend)
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }
}

// ── Helper functions ────────────────────────────────────────────────

fn query_err(e: libsql::Error) -> DatabaseError {
    DatabaseError::Query(e.to_string())
}

/// Convert `Option<&str>` to libsql Value.
fn opt_text(s: Option<&str>) -> libsql::Value {
    match s {
        Some(s) => libsql::Value::Text(s.to_string()),
        None => libsql::Value::Null,
    }
}

/// Convert `Option<String>` to libsql Value.
fn opt_text_owned(s: Option<String>) -> libsql::Value {
    match s {
        Some(s) => libsql::Value::Text(s),
        None => libsql::Value::Null,
    }
}

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

fn parse_optional_datetime(s: &Option<String>) -> Option<DateTime<Utc>> {
    s.as_ref().map(|s| parse_datetime(s))
}

fn parse_date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap_or_default()
}

fn parse_uuid(s: &str) -> Uuid {
    Uuid::parse_str(s).unwrap_or_else(|_| Uuid::nil())
}

fn status_to_str(status: &ProgressStatus) -> &'static str {
    match status {
        ProgressStatus::NotStarted => "not_started",
        ProgressStatus::InProgress => "in_progress",
        ProgressStatus::Completed => "completed",
    }
}

fn str_to_status(s: &str) -> ProgressStatus {
    match s {
        "in_progress" => ProgressStatus::InProgress,
        "completed" => ProgressStatus::Completed,
        _ => ProgressStatus::NotStarted,
    }
}

/// Map a libsql row to a UserProfile.
///
/// Column order: 0:user_id, 1:email, 2:display_name, 3:timezone,
/// 4:onboarded, 5:created_at
fn row_to_profile(row: &libsql::Row) -> Result<UserProfile, libsql::Error> {
    Ok(UserProfile {
        user_id: row.get(0)?,
        email: row.get(1)?,
        display_name: row.get(2).ok(),
        timezone: row.get(3)?,
        onboarded: row.get::<i64>(4)? != 0,
        created_at: parse_datetime(&row.get::<String>(5)?),
    })
}

/// Column order: 0:id, 1:user_id, 2:date, 3:created_at
fn row_to_daily_log(row: &libsql::Row) -> Result<DailyLog, libsql::Error> {
    Ok(DailyLog {
        id: parse_uuid(&row.get::<String>(0)?),
        user_id: row.get(1)?,
        date: parse_date(&row.get::<String>(2)?),
        created_at: parse_datetime(&row.get::<String>(3)?),
    })
}

/// Column order: 0:id, 1:user_id, 2:sequence_key, 3:daily_log_id,
/// 4:current_step, 5:responses, 6:status, 7:started_at, 8:completed_at
fn row_to_progress(row: &libsql::Row) -> Result<SequenceProgress, DatabaseError> {
    let sequence_str: String = row.get(2).map_err(query_err)?;
    let sequence: SequenceKind = sequence_str
        .parse()
        .map_err(DatabaseError::Serialization)?;
    let step_str: String = row.get(4).map_err(query_err)?;
    let current_step: StepKey = step_str.parse().map_err(DatabaseError::Serialization)?;
    let responses_str: String = row.get(5).map_err(query_err)?;
    let responses: ResponseMap = serde_json::from_str(&responses_str).unwrap_or_default();

    Ok(SequenceProgress {
        id: parse_uuid(&row.get::<String>(0).map_err(query_err)?),
        user_id: row.get(1).map_err(query_err)?,
        sequence,
        daily_log_id: row.get::<String>(3).ok().map(|s| parse_uuid(&s)),
        current_step,
        responses,
        status: str_to_status(&row.get::<String>(6).map_err(query_err)?),
        started_at: parse_datetime(&row.get::<String>(7).map_err(query_err)?),
        completed_at: parse_optional_datetime(&row.get::<String>(8).ok()),
    })
}

/// Column order: 0:id, 1:user_id, 2:daily_log_id, 3:metric_name, 4:value,
/// 5:recorded_at
fn row_to_metric_response(row: &libsql::Row) -> Result<MetricResponse, libsql::Error> {
    Ok(MetricResponse {
        id: parse_uuid(&row.get::<String>(0)?),
        user_id: row.get(1)?,
        daily_log_id: parse_uuid(&row.get::<String>(2)?),
        metric: row.get(3)?,
        value: row.get(4)?,
        recorded_at: parse_datetime(&row.get::<String>(5)?),
    })
}

const PROGRESS_COLUMNS: &str =
    "id, user_id, sequence_key, daily_log_id, current_step, responses, status, \
     started_at, completed_at";

#[async_trait]
impl Database for LibSqlBackend {
    async fn run_migrations(&self) -> Result<(), DatabaseError> {
        migrations::run_migrations(self.conn()).await
    }

    // ── Profiles ────────────────────────────────────────────────────

    async fn get_profile(&self, user_id: &str) -> Result<Option<UserProfile>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT user_id, email, display_name, timezone, onboarded, created_at
                 FROM profiles WHERE user_id = ?1",
                params![user_id],
            )
            .await
            .map_err(query_err)?;

        match rows.next().await.map_err(query_err)? {
            Some(row) => Ok(Some(row_to_profile(&row).map_err(query_err)?)),
            None => Ok(None),
        }
    }

    async fn upsert_profile(&self, profile: &UserProfile) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT INTO profiles (user_id, email, display_name, timezone, onboarded, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT (user_id) DO UPDATE SET
                     email = excluded.email,
                     display_name = excluded.display_name,
                     timezone = excluded.timezone,
                     onboarded = excluded.onboarded",
                params![
                    profile.user_id.as_str(),
                    profile.email.as_str(),
                    opt_text(profile.display_name.as_deref()),
                    profile.timezone.as_str(),
                    profile.onboarded as i64,
                    profile.created_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(query_err)?;
        Ok(())
    }

    async fn set_onboarded(&self, user_id: &str, onboarded: bool) -> Result<(), DatabaseError> {
        let affected = self
            .conn()
            .execute(
                "UPDATE profiles SET onboarded = ?2 WHERE user_id = ?1",
                params![user_id, onboarded as i64],
            )
            .await
            .map_err(query_err)?;
        if affected == 0 {
            return Err(DatabaseError::NotFound {
                entity: "profile".to_string(),
                id: user_id.to_string(),
            });
        }
        Ok(())
    }

    async fn update_profile_details(
        &self,
        user_id: &str,
        display_name: Option<&str>,
        timezone: Option<&str>,
    ) -> Result<(), DatabaseError> {
        let affected = self
            .conn()
            .execute(
                "UPDATE profiles SET
                     display_name = COALESCE(?2, display_name),
                     timezone = COALESCE(?3, timezone)
                 WHERE user_id = ?1",
                params![user_id, opt_text(display_name), opt_text(timezone)],
            )
            .await
            .map_err(query_err)?;
        if affected == 0 {
            return Err(DatabaseError::NotFound {
                entity: "profile".to_string(),
                id: user_id.to_string(),
            });
        }
        Ok(())
    }

    // ── Daily logs ──────────────────────────────────────────────────

    async fn get_daily_log(
        &self,
        user_id: &str,
        date: NaiveDate,
    ) -> Result<Option<DailyLog>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT id, user_id, date, created_at FROM daily_logs
                 WHERE user_id = ?1 AND date = ?2",
                params![user_id, date.format("%Y-%m-%d").to_string()],
            )
            .await
            .map_err(query_err)?;

        match rows.next().await.map_err(query_err)? {
            Some(row) => Ok(Some(row_to_daily_log(&row).map_err(query_err)?)),
            None => Ok(None),
        }
    }

    async fn get_or_create_daily_log(
        &self,
        user_id: &str,
        date: NaiveDate,
    ) -> Result<DailyLog, DatabaseError> {
        // One row per (user, date); a concurrent duplicate insert is a no-op.
        self.conn()
            .execute(
                "INSERT INTO daily_logs (id, user_id, date) VALUES (?1, ?2, ?3)
                 ON CONFLICT (user_id, date) DO NOTHING",
                params![
                    Uuid::new_v4().to_string(),
                    user_id,
                    date.format("%Y-%m-%d").to_string(),
                ],
            )
            .await
            .map_err(query_err)?;

        self.get_daily_log(user_id, date)
            .await?
            .ok_or_else(|| DatabaseError::NotFound {
                entity: "daily_log".to_string(),
                id: format!("{user_id}/{date}"),
            })
    }

    // ── Sequence progress ───────────────────────────────────────────

    async fn get_progress(
        &self,
        user_id: &str,
        sequence: SequenceKind,
        daily_log_id: Option<Uuid>,
    ) -> Result<Option<SequenceProgress>, DatabaseError> {
        let sql = format!(
            "SELECT {PROGRESS_COLUMNS} FROM sequence_progress
             WHERE user_id = ?1 AND sequence_key = ?2 AND {}",
            match daily_log_id {
                Some(_) => "daily_log_id = ?3",
                None => "daily_log_id IS NULL",
            }
        );
        let mut rows = match daily_log_id {
            Some(id) => self
                .conn()
                .query(
                    &sql,
                    params![user_id, sequence.to_string(), id.to_string()],
                )
                .await
                .map_err(query_err)?,
            None => self
                .conn()
                .query(&sql, params![user_id, sequence.to_string()])
                .await
                .map_err(query_err)?,
        };

        match rows.next().await.map_err(query_err)? {
            Some(row) => Ok(Some(row_to_progress(&row)?)),
            None => Ok(None),
        }
    }

    async fn upsert_progress(
        &self,
        user_id: &str,
        sequence: SequenceKind,
        daily_log_id: Option<Uuid>,
        step: StepKey,
        responses: &ResponseMap,
    ) -> Result<SequenceProgress, DatabaseError> {
        let responses_json = serde_json::to_string(responses)
            .map_err(|e| DatabaseError::Serialization(e.to_string()))?;

        // New responses are merged over the accumulated map; a completed
        // run stays completed.
        let update = "DO UPDATE SET
                current_step = excluded.current_step,
                responses = json_patch(sequence_progress.responses, excluded.responses),
                status = CASE sequence_progress.status
                    WHEN 'completed' THEN 'completed'
                    ELSE 'in_progress'
                END";

        match daily_log_id {
            Some(log_id) => {
                let sql = format!(
                    "INSERT INTO sequence_progress
                         (id, user_id, sequence_key, daily_log_id, current_step, responses, status)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'in_progress')
                     ON CONFLICT (user_id, sequence_key, daily_log_id)
                         WHERE daily_log_id IS NOT NULL
                     {update}"
                );
                self.conn()
                    .execute(
                        &sql,
                        params![
                            Uuid::new_v4().to_string(),
                            user_id,
                            sequence.to_string(),
                            log_id.to_string(),
                            step.to_string(),
                            responses_json,
                        ],
                    )
                    .await
                    .map_err(query_err)?;
            }
            None => {
                let sql = format!(
                    "INSERT INTO sequence_progress
                         (id, user_id, sequence_key, daily_log_id, current_step, responses, status)
                     VALUES (?1, ?2, ?3, NULL, ?4, ?5, 'in_progress')
                     ON CONFLICT (user_id, sequence_key) WHERE daily_log_id IS NULL
                     {update}"
                );
                self.conn()
                    .execute(
                        &sql,
                        params![
                            Uuid::new_v4().to_string(),
                            user_id,
                            sequence.to_string(),
                            step.to_string(),
                            responses_json,
                        ],
                    )
                    .await
                    .map_err(query_err)?;
            }
        }

        self.get_progress(user_id, sequence, daily_log_id)
            .await?
            .ok_or_else(|| DatabaseError::NotFound {
                entity: "sequence_progress".to_string(),
                id: format!("{user_id}/{sequence}"),
            })
    }

    async fn complete_progress(
        &self,
        user_id: &str,
        sequence: SequenceKind,
        daily_log_id: Option<Uuid>,
    ) -> Result<(), DatabaseError> {
        let sql = format!(
            "UPDATE sequence_progress SET
                 status = '{}',
                 completed_at = COALESCE(completed_at, datetime('now'))
             WHERE user_id = ?1 AND sequence_key = ?2 AND {}",
            status_to_str(&ProgressStatus::Completed),
            match daily_log_id {
                Some(_) => "daily_log_id = ?3",
                None => "daily_log_id IS NULL",
            }
        );
        let affected = match daily_log_id {
            Some(id) => self
                .conn()
                .execute(
                    &sql,
                    params![user_id, sequence.to_string(), id.to_string()],
                )
                .await
                .map_err(query_err)?,
            None => self
                .conn()
                .execute(&sql, params![user_id, sequence.to_string()])
                .await
                .map_err(query_err)?,
        };
        if affected == 0 {
            return Err(DatabaseError::NotFound {
                entity: "sequence_progress".to_string(),
                id: format!("{user_id}/{sequence}"),
            });
        }
        Ok(())
    }

    // ── Metrics ─────────────────────────────────────────────────────

    async fn get_metric(&self, name: &str) -> Result<Option<Metric>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT name, value_type FROM metrics WHERE name = ?1",
                params![name],
            )
            .await
            .map_err(query_err)?;

        match rows.next().await.map_err(query_err)? {
            Some(row) => {
                let name: String = row.get(0).map_err(query_err)?;
                let type_str: String = row.get(1).map_err(query_err)?;
                let value_type = MetricType::parse(&type_str).ok_or_else(|| {
                    DatabaseError::Serialization(format!("unknown metric type: {type_str}"))
                })?;
                Ok(Some(Metric { name, value_type }))
            }
            None => Ok(None),
        }
    }

    async fn upsert_metric_response(
        &self,
        user_id: &str,
        daily_log_id: Uuid,
        metric: &str,
        value: &str,
    ) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT INTO metric_responses (id, user_id, daily_log_id, metric_name, value)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT (user_id, daily_log_id, metric_name) DO UPDATE SET
                     value = excluded.value,
                     recorded_at = datetime('now')",
                params![
                    Uuid::new_v4().to_string(),
                    user_id,
                    daily_log_id.to_string(),
                    metric,
                    value,
                ],
            )
            .await
            .map_err(query_err)?;
        Ok(())
    }

    async fn get_metric_response(
        &self,
        user_id: &str,
        daily_log_id: Uuid,
        metric: &str,
    ) -> Result<Option<MetricResponse>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT id, user_id, daily_log_id, metric_name, value, recorded_at
                 FROM metric_responses
                 WHERE user_id = ?1 AND daily_log_id = ?2 AND metric_name = ?3",
                params![user_id, daily_log_id.to_string(), metric],
            )
            .await
            .map_err(query_err)?;

        match rows.next().await.map_err(query_err)? {
            Some(row) => Ok(Some(row_to_metric_response(&row).map_err(query_err)?)),
            None => Ok(None),
        }
    }

    async fn latest_metric_response(
        &self,
        user_id: &str,
        metric: &str,
    ) -> Result<Option<MetricResponse>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT id, user_id, daily_log_id, metric_name, value, recorded_at
                 FROM metric_responses
                 WHERE user_id = ?1 AND metric_name = ?2
                 ORDER BY recorded_at DESC, rowid DESC
                 LIMIT 1",
                params![user_id, metric],
            )
            .await
            .map_err(query_err)?;

        match rows.next().await.map_err(query_err)? {
            Some(row) => Ok(Some(row_to_metric_response(&row).map_err(query_err)?)),
            None => Ok(None),
        }
    }

    // ── Page events ─────────────────────────────────────────────────

    async fn insert_page_event(&self, event: &PageEvent) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT INTO page_events (id, user_id, step_key, daily_log_id, kind, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    event.id.to_string(),
                    event.user_id.as_str(),
                    event.step_key.to_string(),
                    opt_text_owned(event.daily_log_id.map(|id| id.to_string())),
                    event.kind.as_str(),
                    event.created_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(query_err)?;
        Ok(())
    }

    async fn has_any_event_for_tag(
        &self,
        user_id: &str,
        tag: StepTag,
    ) -> Result<bool, DatabaseError> {
        let pattern = format!("v1-{}-%", tag.as_str());
        let mut rows = self
            .conn()
            .query(
                "SELECT 1 FROM page_events WHERE user_id = ?1 AND step_key LIKE ?2 LIMIT 1",
                params![user_id, pattern],
            )
            .await
            .map_err(query_err)?;
        Ok(rows.next().await.map_err(query_err)?.is_some())
    }

    async fn steps_visited(
        &self,
        user_id: &str,
        daily_log_id: Uuid,
        tag: StepTag,
    ) -> Result<Vec<StepKey>, DatabaseError> {
        let pattern = format!("v1-{}-%", tag.as_str());
        let mut rows = self
            .conn()
            .query(
                "SELECT step_key FROM page_events
                 WHERE user_id = ?1 AND daily_log_id = ?2 AND step_key LIKE ?3",
                params![user_id, daily_log_id.to_string(), pattern],
            )
            .await
            .map_err(query_err)?;

        let mut keys = Vec::new();
        while let Some(row) = rows.next().await.map_err(query_err)? {
            let raw: String = row.get(0).map_err(query_err)?;
            if let Ok(key) = raw.parse::<StepKey>() {
                keys.push(key);
            }
        }
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sequences::step::StepTag;
    use crate::store::model::PageEventKind;

    async fn backend() -> LibSqlBackend {
        LibSqlBackend::new_memory().await.unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[tokio::test]
    async fn profile_roundtrip_and_upsert() {
        let db = backend().await;
        let mut profile = UserProfile::new("u1", "u1@example.com");
        db.upsert_profile(&profile).await.unwrap();

        let loaded = db.get_profile("u1").await.unwrap().unwrap();
        assert_eq!(loaded.email, "u1@example.com");
        assert!(!loaded.onboarded);
        assert_eq!(loaded.timezone, "UTC");

        profile.timezone = "America/New_York".to_string();
        profile.display_name = Some("Ada".to_string());
        db.upsert_profile(&profile).await.unwrap();

        let loaded = db.get_profile("u1").await.unwrap().unwrap();
        assert_eq!(loaded.timezone, "America/New_York");
        assert_eq!(loaded.display_name.as_deref(), Some("Ada"));
    }

    #[tokio::test]
    async fn onboarded_flag_and_details() {
        let db = backend().await;
        db.upsert_profile(&UserProfile::new("u1", "u1@example.com"))
            .await
            .unwrap();

        db.update_profile_details("u1", Some("Ada"), Some("Europe/Berlin"))
            .await
            .unwrap();
        db.set_onboarded("u1", true).await.unwrap();

        let loaded = db.get_profile("u1").await.unwrap().unwrap();
        assert!(loaded.onboarded);
        assert_eq!(loaded.timezone, "Europe/Berlin");

        // COALESCE keeps existing values on partial updates.
        db.update_profile_details("u1", None, None).await.unwrap();
        let loaded = db.get_profile("u1").await.unwrap().unwrap();
        assert_eq!(loaded.display_name.as_deref(), Some("Ada"));

        assert!(db.set_onboarded("missing", true).await.is_err());
    }

    #[tokio::test]
    async fn daily_log_unique_per_user_date() {
        let db = backend().await;
        db.upsert_profile(&UserProfile::new("u1", "u1@example.com"))
            .await
            .unwrap();

        let d = date(2024, 6, 15);
        let first = db.get_or_create_daily_log("u1", d).await.unwrap();
        let second = db.get_or_create_daily_log("u1", d).await.unwrap();
        assert_eq!(first.id, second.id);

        let other_day = db.get_or_create_daily_log("u1", date(2024, 6, 16)).await.unwrap();
        assert_ne!(first.id, other_day.id);

        assert!(db.get_daily_log("u1", date(2024, 1, 1)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn progress_upsert_is_idempotent() {
        let db = backend().await;
        db.upsert_profile(&UserProfile::new("u1", "u1@example.com"))
            .await
            .unwrap();
        let log = db.get_or_create_daily_log("u1", date(2024, 6, 15)).await.unwrap();

        let step: StepKey = "v1-m-2".parse().unwrap();
        let mut responses = ResponseMap::new();
        responses.insert("mood_score".into(), serde_json::json!("7"));

        let first = db
            .upsert_progress("u1", SequenceKind::Morning, Some(log.id), step, &responses)
            .await
            .unwrap();
        let second = db
            .upsert_progress("u1", SequenceKind::Morning, Some(log.id), step, &responses)
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.current_step, step);
        assert_eq!(second.status, ProgressStatus::InProgress);
        assert_eq!(second.responses, first.responses);
    }

    #[tokio::test]
    async fn progress_accumulates_responses() {
        let db = backend().await;
        db.upsert_profile(&UserProfile::new("u1", "u1@example.com"))
            .await
            .unwrap();
        let log = db.get_or_create_daily_log("u1", date(2024, 6, 15)).await.unwrap();

        let mut r1 = ResponseMap::new();
        r1.insert("day_score".into(), serde_json::json!("8"));
        db.upsert_progress(
            "u1",
            SequenceKind::Evening,
            Some(log.id),
            "v1-e-2".parse().unwrap(),
            &r1,
        )
        .await
        .unwrap();

        let mut r2 = ResponseMap::new();
        r2.insert("gratitude".into(), serde_json::json!("the quiet hour"));
        let progress = db
            .upsert_progress(
                "u1",
                SequenceKind::Evening,
                Some(log.id),
                "v1-e-3".parse().unwrap(),
                &r2,
            )
            .await
            .unwrap();

        assert_eq!(progress.responses.len(), 2);
        assert_eq!(progress.responses["day_score"], "8");
        assert_eq!(progress.current_step.to_string(), "v1-e-3");
    }

    #[tokio::test]
    async fn onboarding_progress_has_no_daily_log() {
        let db = backend().await;
        db.upsert_profile(&UserProfile::new("u1", "u1@example.com"))
            .await
            .unwrap();

        let step: StepKey = "v1-o-2".parse().unwrap();
        let first = db
            .upsert_progress("u1", SequenceKind::Onboarding, None, step, &ResponseMap::new())
            .await
            .unwrap();
        let second = db
            .upsert_progress("u1", SequenceKind::Onboarding, None, step, &ResponseMap::new())
            .await
            .unwrap();
        assert_eq!(first.id, second.id);
        assert!(second.daily_log_id.is_none());

        db.complete_progress("u1", SequenceKind::Onboarding, None)
            .await
            .unwrap();
        let done = db
            .get_progress("u1", SequenceKind::Onboarding, None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(done.status, ProgressStatus::Completed);
        assert!(done.completed_at.is_some());
    }

    #[tokio::test]
    async fn completed_progress_stays_completed() {
        let db = backend().await;
        db.upsert_profile(&UserProfile::new("u1", "u1@example.com"))
            .await
            .unwrap();
        let log = db.get_or_create_daily_log("u1", date(2024, 6, 15)).await.unwrap();

        db.upsert_progress(
            "u1",
            SequenceKind::Morning,
            Some(log.id),
            "v1-m-6".parse().unwrap(),
            &ResponseMap::new(),
        )
        .await
        .unwrap();
        db.complete_progress("u1", SequenceKind::Morning, Some(log.id))
            .await
            .unwrap();

        // A late duplicate save must not reopen the run.
        let after = db
            .upsert_progress(
                "u1",
                SequenceKind::Morning,
                Some(log.id),
                "v1-m-6".parse().unwrap(),
                &ResponseMap::new(),
            )
            .await
            .unwrap();
        assert_eq!(after.status, ProgressStatus::Completed);
    }

    #[tokio::test]
    async fn metric_response_upsert_single_row() {
        let db = backend().await;
        db.upsert_profile(&UserProfile::new("u1", "u1@example.com"))
            .await
            .unwrap();
        let log = db.get_or_create_daily_log("u1", date(2024, 6, 15)).await.unwrap();

        db.upsert_metric_response("u1", log.id, "day_score", "6")
            .await
            .unwrap();
        db.upsert_metric_response("u1", log.id, "day_score", "9")
            .await
            .unwrap();

        let response = db
            .get_metric_response("u1", log.id, "day_score")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(response.value, "9");
    }

    #[tokio::test]
    async fn latest_metric_response_across_days() {
        let db = backend().await;
        db.upsert_profile(&UserProfile::new("u1", "u1@example.com"))
            .await
            .unwrap();
        let monday = db.get_or_create_daily_log("u1", date(2024, 6, 10)).await.unwrap();
        let friday = db.get_or_create_daily_log("u1", date(2024, 6, 14)).await.unwrap();

        db.upsert_metric_response("u1", monday.id, "return_date", "2024-06-12")
            .await
            .unwrap();
        db.upsert_metric_response("u1", friday.id, "return_date", "2024-06-17")
            .await
            .unwrap();

        let latest = db
            .latest_metric_response("u1", "return_date")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(latest.value, "2024-06-17");

        assert!(db.latest_metric_response("u1", "gratitude").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn metric_catalog_is_seeded() {
        let db = backend().await;
        let metric = db.get_metric("evening_reflection_time").await.unwrap().unwrap();
        assert_eq!(metric.value_type, MetricType::Time);
        assert!(db.get_metric("nonexistent").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn page_event_queries() {
        let db = backend().await;
        db.upsert_profile(&UserProfile::new("u1", "u1@example.com"))
            .await
            .unwrap();
        let log = db.get_or_create_daily_log("u1", date(2024, 6, 15)).await.unwrap();

        assert!(!db.has_any_event_for_tag("u1", StepTag::Evening).await.unwrap());

        for n in [1u32, 2, 3] {
            let key: StepKey = format!("v1-m-{n}").parse().unwrap();
            db.insert_page_event(&PageEvent::new("u1", key, Some(log.id), PageEventKind::View))
                .await
                .unwrap();
        }
        let evening_key: StepKey = "v1-e-1".parse().unwrap();
        db.insert_page_event(&PageEvent::new("u1", evening_key, Some(log.id), PageEventKind::View))
            .await
            .unwrap();

        assert!(db.has_any_event_for_tag("u1", StepTag::Evening).await.unwrap());
        assert!(db.has_any_event_for_tag("u1", StepTag::Morning).await.unwrap());
        assert!(!db.has_any_event_for_tag("u2", StepTag::Morning).await.unwrap());

        let morning = db.steps_visited("u1", log.id, StepTag::Morning).await.unwrap();
        let mut numbers: Vec<u32> = morning.iter().map(|k| k.number).collect();
        numbers.sort_unstable();
        assert_eq!(numbers, vec![1, 2, 3]);

        let evening = db.steps_visited("u1", log.id, StepTag::Evening).await.unwrap();
        assert_eq!(evening.len(), 1);
    }

    #[tokio::test]
    async fn migrations_are_idempotent() {
        let db = backend().await;
        db.run_migrations().await.unwrap();
    }

    #[tokio::test]
    async fn local_file_creates_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nested").join("daybreak.db");
        let db = LibSqlBackend::new_local(&path).await.unwrap();
        assert!(path.exists());
        drop(db);
    }
}
