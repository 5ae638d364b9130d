//! Backend-agnostic `Database` trait — single async interface for all
//! persistence.
//!
//! Uniqueness (one daily log per user per date, one progress row per
//! (user, sequence, daily log), one metric response per (user, daily log,
//! metric)) is enforced by upsert-on-conflict in the backend, never by
//! application-level locking.

use async_trait::async_trait;
use chrono::NaiveDate;
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::sequences::step::{ResponseMap, SequenceKind, StepKey, StepTag};
use crate::store::model::{
    DailyLog, Metric, MetricResponse, PageEvent, SequenceProgress, UserProfile,
};

#[async_trait]
pub trait Database: Send + Sync {
    /// Run all pending schema migrations.
    async fn run_migrations(&self) -> Result<(), DatabaseError>;

    // ── Profiles ────────────────────────────────────────────────────

    async fn get_profile(&self, user_id: &str) -> Result<Option<UserProfile>, DatabaseError>;

    /// Insert or update the profile row for `profile.user_id`.
    async fn upsert_profile(&self, profile: &UserProfile) -> Result<(), DatabaseError>;

    /// Flip the onboarded flag.
    async fn set_onboarded(&self, user_id: &str, onboarded: bool) -> Result<(), DatabaseError>;

    /// Update display name and timezone from onboarding answers.
    async fn update_profile_details(
        &self,
        user_id: &str,
        display_name: Option<&str>,
        timezone: Option<&str>,
    ) -> Result<(), DatabaseError>;

    // ── Daily logs ──────────────────────────────────────────────────

    /// Read-only lookup by (user, logical date).
    async fn get_daily_log(
        &self,
        user_id: &str,
        date: NaiveDate,
    ) -> Result<Option<DailyLog>, DatabaseError>;

    /// Lazily create the day's log on first write access.
    async fn get_or_create_daily_log(
        &self,
        user_id: &str,
        date: NaiveDate,
    ) -> Result<DailyLog, DatabaseError>;

    // ── Sequence progress ───────────────────────────────────────────

    async fn get_progress(
        &self,
        user_id: &str,
        sequence: SequenceKind,
        daily_log_id: Option<Uuid>,
    ) -> Result<Option<SequenceProgress>, DatabaseError>;

    /// Idempotent upsert keyed by (user, sequence, daily log). Merges
    /// `responses` over any previously accumulated map and marks the run
    /// in progress.
    async fn upsert_progress(
        &self,
        user_id: &str,
        sequence: SequenceKind,
        daily_log_id: Option<Uuid>,
        step: StepKey,
        responses: &ResponseMap,
    ) -> Result<SequenceProgress, DatabaseError>;

    /// Mark a run completed and stamp the completion time.
    async fn complete_progress(
        &self,
        user_id: &str,
        sequence: SequenceKind,
        daily_log_id: Option<Uuid>,
    ) -> Result<(), DatabaseError>;

    // ── Metrics ─────────────────────────────────────────────────────

    /// Catalog lookup.
    async fn get_metric(&self, name: &str) -> Result<Option<Metric>, DatabaseError>;

    /// Insert or replace the one (user, daily log, metric) value row.
    async fn upsert_metric_response(
        &self,
        user_id: &str,
        daily_log_id: Uuid,
        metric: &str,
        value: &str,
    ) -> Result<(), DatabaseError>;

    async fn get_metric_response(
        &self,
        user_id: &str,
        daily_log_id: Uuid,
        metric: &str,
    ) -> Result<Option<MetricResponse>, DatabaseError>;

    /// Most recently recorded response for a metric across all days.
    async fn latest_metric_response(
        &self,
        user_id: &str,
        metric: &str,
    ) -> Result<Option<MetricResponse>, DatabaseError>;

    // ── Page events ─────────────────────────────────────────────────

    /// Append one event. Events are never mutated.
    async fn insert_page_event(&self, event: &PageEvent) -> Result<(), DatabaseError>;

    /// Whether any event with a step key in `tag`'s sequence exists for
    /// this user, on any day.
    async fn has_any_event_for_tag(
        &self,
        user_id: &str,
        tag: StepTag,
    ) -> Result<bool, DatabaseError>;

    /// Step keys of events recorded against a daily log for one sequence
    /// tag. Unparseable keys are skipped.
    async fn steps_visited(
        &self,
        user_id: &str,
        daily_log_id: Uuid,
        tag: StepTag,
    ) -> Result<Vec<StepKey>, DatabaseError>;
}
