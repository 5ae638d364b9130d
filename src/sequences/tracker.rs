//! StepTracker — coordinates a step submission end to end.
//!
//! One `respond` call: validate the value, lazily open the day's log,
//! upsert the metric response and progress row, append the completion
//! event, and compute the next visible step. Idempotency comes entirely
//! from the store's upsert keys; a rapid double-submit converges to the
//! same rows.

use std::sync::Arc;

use chrono::NaiveDate;
use tracing::{debug, info};
use uuid::Uuid;

use crate::clock::{self, Clock};
use crate::error::{DatabaseError, Error, StepError};
use crate::sequences::{catalog, navigator};
use crate::sequences::step::{ResponseMap, SequenceKind, Step, StepKey, StepKind};
use crate::store::Database;
use crate::store::model::{MetricType, PageEvent, PageEventKind, metric_names};

/// Result of a step submission.
#[derive(Debug, Clone, serde::Serialize)]
pub struct StepOutcome {
    /// Next visible step, or `None` at end of sequence.
    pub next: Option<StepKey>,
    /// Whether this submission completed the sequence.
    pub completed: bool,
}

pub struct StepTracker {
    db: Arc<dyn Database>,
    clock: Arc<dyn Clock>,
}

impl StepTracker {
    pub fn new(db: Arc<dyn Database>, clock: Arc<dyn Clock>) -> Self {
        Self { db, clock }
    }

    /// The user's current logical date, from their stored timezone.
    async fn logical_date(&self, user_id: &str) -> Result<NaiveDate, Error> {
        let profile = self
            .db
            .get_profile(user_id)
            .await?
            .ok_or_else(|| DatabaseError::NotFound {
                entity: "profile".to_string(),
                id: user_id.to_string(),
            })?;
        let tz = clock::parse_timezone(&profile.timezone);
        Ok(clock::local_day(self.clock.now_utc(), tz).date)
    }

    async fn daily_log_for(
        &self,
        user_id: &str,
        sequence: SequenceKind,
    ) -> Result<Option<Uuid>, Error> {
        if !sequence.is_daily() {
            return Ok(None);
        }
        let date = self.logical_date(user_id).await?;
        let log = self.db.get_or_create_daily_log(user_id, date).await?;
        Ok(Some(log.id))
    }

    /// Record a response for a step and advance the sequence.
    pub async fn respond(
        &self,
        user_id: &str,
        key: StepKey,
        value: Option<&str>,
    ) -> Result<StepOutcome, Error> {
        let step = catalog::find_step(key)
            .ok_or_else(|| StepError::UnknownStep(key.to_string()))?;
        let sequence = key
            .tag
            .sequence()
            .ok_or_else(|| StepError::UnknownSequence(key.tag.as_str().to_string()))?;

        let value = validate_response(step, value)?;
        let daily_log_id = self.daily_log_for(user_id, sequence).await?;

        if let (Some(metric), Some(value)) = (step.kind.metric(), value) {
            // Cross-check against the seeded metric catalog; the step
            // tables and the catalog must agree on the value type.
            if let Some(definition) = self.db.get_metric(metric).await? {
                definition
                    .value_type
                    .validate(value)
                    .map_err(|message| StepError::InvalidResponse {
                        metric: metric.to_string(),
                        message,
                    })?;
            }
            // Onboarding has no daily log, so its answers land on the
            // profile (or, for the reflection time, on today's log).
            if let Some(log_id) = daily_log_id {
                self.db
                    .upsert_metric_response(user_id, log_id, metric, value)
                    .await?;
            }
            if sequence == SequenceKind::Onboarding {
                self.apply_onboarding_answer(user_id, metric, value).await?;
            }
        }

        let mut delta = ResponseMap::new();
        if let (Some(metric), Some(value)) = (step.kind.metric(), value) {
            delta.insert(metric.to_string(), serde_json::Value::String(value.to_string()));
        }
        let progress = self
            .db
            .upsert_progress(user_id, sequence, daily_log_id, key, &delta)
            .await?;

        self.db
            .insert_page_event(&PageEvent::new(
                user_id,
                key,
                daily_log_id,
                PageEventKind::Complete,
            ))
            .await?;

        match navigator::next_visible_step(catalog::steps(sequence), key, value, &progress.responses)
        {
            Some(next) => {
                debug!(user = user_id, step = %key, next = %next, "Step recorded");
                Ok(StepOutcome {
                    next: Some(next),
                    completed: false,
                })
            }
            None => {
                self.db
                    .complete_progress(user_id, sequence, daily_log_id)
                    .await?;
                if sequence == SequenceKind::Onboarding {
                    self.db.set_onboarded(user_id, true).await?;
                }
                info!(user = user_id, %sequence, "Sequence completed");
                Ok(StepOutcome {
                    next: None,
                    completed: true,
                })
            }
        }
    }

    async fn apply_onboarding_answer(
        &self,
        user_id: &str,
        metric: &str,
        value: &str,
    ) -> Result<(), Error> {
        match metric {
            "display_name" => {
                self.db
                    .update_profile_details(user_id, Some(value), None)
                    .await?
            }
            "timezone" => {
                if value.parse::<chrono_tz::Tz>().is_err() {
                    return Err(StepError::InvalidResponse {
                        metric: metric.to_string(),
                        message: format!("not an IANA timezone: {value}"),
                    }
                    .into());
                }
                self.db
                    .update_profile_details(user_id, None, Some(value))
                    .await?
            }
            // The reflection time drives routing day by day, so the
            // onboarding answer is recorded against today's daily log
            // where the resolver reads it.
            metric_names::EVENING_REFLECTION_TIME => {
                let date = self.logical_date(user_id).await?;
                let log = self.db.get_or_create_daily_log(user_id, date).await?;
                self.db
                    .upsert_metric_response(user_id, log.id, metric, value)
                    .await?
            }
            _ => {}
        }
        Ok(())
    }

    /// Append an interaction event (view, help/error/stuck, link click)
    /// against a step.
    pub async fn record_event(
        &self,
        user_id: &str,
        key: StepKey,
        kind: PageEventKind,
    ) -> Result<(), Error> {
        let daily_log_id = match key.tag.sequence() {
            Some(sequence) => self.daily_log_for(user_id, sequence).await?,
            None => None,
        };
        self.db
            .insert_page_event(&PageEvent::new(user_id, key, daily_log_id, kind))
            .await?;
        Ok(())
    }

    /// Mark an otherwise-scheduled day off as a work day.
    pub async fn override_day_off(&self, user_id: &str) -> Result<(), Error> {
        let date = self.logical_date(user_id).await?;
        let log = self.db.get_or_create_daily_log(user_id, date).await?;
        self.db
            .upsert_metric_response(user_id, log.id, metric_names::DAY_OFF_OVERRIDE, "true")
            .await?;
        info!(user = user_id, %date, "Day off overridden");
        Ok(())
    }
}

/// Validate a submitted value against the step's kind. Returns the value
/// to record (info steps record nothing and ignore any payload).
fn validate_response<'a>(
    step: &Step,
    value: Option<&'a str>,
) -> Result<Option<&'a str>, StepError> {
    match &step.kind {
        StepKind::Info => Ok(None),
        StepKind::Question { metric, input } => {
            let value = require(step, value, metric)?;
            input.validate(value).map_err(|message| StepError::InvalidResponse {
                metric: metric.to_string(),
                message,
            })?;
            Ok(Some(value))
        }
        StepKind::Choice { metric, options, .. } => {
            let name = metric.unwrap_or("choice");
            let value = require(step, value, name)?;
            if !options.contains(&value) {
                return Err(StepError::InvalidResponse {
                    metric: name.to_string(),
                    message: format!("expected one of {options:?}, got {value}"),
                });
            }
            Ok(Some(value))
        }
        StepKind::Audio { metric, .. } => {
            let value = require(step, value, metric)?;
            MetricType::Integer
                .validate(value)
                .map_err(|message| StepError::InvalidResponse {
                    metric: metric.to_string(),
                    message,
                })?;
            Ok(Some(value))
        }
    }
}

fn require<'a>(
    step: &Step,
    value: Option<&'a str>,
    metric: &str,
) -> Result<&'a str, StepError> {
    value.ok_or_else(|| StepError::InvalidResponse {
        metric: metric.to_string(),
        message: format!("step {} requires a value", step.key),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    use crate::clock::FixedClock;
    use crate::store::LibSqlBackend;
    use crate::store::model::{ProgressStatus, UserProfile};

    async fn setup() -> (Arc<LibSqlBackend>, StepTracker) {
        let db = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let clock = Arc::new(FixedClock(
            Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap(),
        ));
        db.upsert_profile(&UserProfile::new("u1", "u1@example.com"))
            .await
            .unwrap();
        let tracker = StepTracker::new(db.clone(), clock);
        (db, tracker)
    }

    fn key(s: &str) -> StepKey {
        s.parse().unwrap()
    }

    #[tokio::test]
    async fn onboarding_walk_flips_profile_flag() {
        let (db, tracker) = setup().await;

        let answers: [(&str, Option<&str>); 5] = [
            ("v1-o-1", None),
            ("v1-o-2", Some("Ada")),
            ("v1-o-3", Some("Europe/Berlin")),
            ("v1-o-4", Some("21:30")),
            ("v1-o-5", None),
        ];
        let mut last = StepOutcome { next: None, completed: false };
        for (step, value) in answers {
            last = tracker.respond("u1", key(step), value).await.unwrap();
        }
        assert!(last.completed);
        assert!(last.next.is_none());

        let profile = db.get_profile("u1").await.unwrap().unwrap();
        assert!(profile.onboarded);
        assert_eq!(profile.display_name.as_deref(), Some("Ada"));
        assert_eq!(profile.timezone, "Europe/Berlin");

        let progress = db
            .get_progress("u1", SequenceKind::Onboarding, None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(progress.status, ProgressStatus::Completed);
    }

    #[tokio::test]
    async fn onboarding_reflection_time_lands_on_todays_log() {
        let (db, tracker) = setup().await;
        tracker
            .respond("u1", key("v1-o-4"), Some("21:30"))
            .await
            .unwrap();

        let date = chrono::NaiveDate::from_ymd_opt(2024, 6, 15).unwrap();
        let log = db.get_daily_log("u1", date).await.unwrap().unwrap();
        let response = db
            .get_metric_response("u1", log.id, "evening_reflection_time")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(response.value, "21:30");
    }

    #[tokio::test]
    async fn invalid_timezone_is_rejected() {
        let (_db, tracker) = setup().await;
        let err = tracker
            .respond("u1", key("v1-o-3"), Some("Middle/Earth"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Step(StepError::InvalidResponse { .. })));
    }

    #[tokio::test]
    async fn scale_out_of_range_is_rejected() {
        let (_db, tracker) = setup().await;
        let err = tracker
            .respond("u1", key("v1-m-2"), Some("12"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Step(StepError::InvalidResponse { .. })));
        assert!(tracker.respond("u1", key("v1-m-2"), Some("8")).await.is_ok());
    }

    #[tokio::test]
    async fn missing_required_value_is_rejected() {
        let (_db, tracker) = setup().await;
        let err = tracker.respond("u1", key("v1-m-2"), None).await.unwrap_err();
        assert!(matches!(err, Error::Step(StepError::InvalidResponse { .. })));
    }

    #[tokio::test]
    async fn unknown_step_is_rejected() {
        let (_db, tracker) = setup().await;
        let err = tracker.respond("u1", key("v1-e-42"), None).await.unwrap_err();
        assert!(matches!(err, Error::Step(StepError::UnknownStep(_))));
        let err = tracker.respond("u1", key("v1-bf-1"), None).await.unwrap_err();
        assert!(matches!(err, Error::Step(StepError::UnknownStep(_))));
    }

    #[tokio::test]
    async fn choice_branch_skips_work_reflection() {
        let (_db, tracker) = setup().await;
        let outcome = tracker
            .respond("u1", key("v1-e-4"), Some("no"))
            .await
            .unwrap();
        assert_eq!(outcome.next, Some(key("v1-e-6")));
    }

    #[tokio::test]
    async fn choice_rejects_unlisted_option() {
        let (_db, tracker) = setup().await;
        let err = tracker
            .respond("u1", key("v1-e-4"), Some("maybe"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Step(StepError::InvalidResponse { .. })));
    }

    #[tokio::test]
    async fn double_submit_converges_to_one_row() {
        let (db, tracker) = setup().await;
        tracker.respond("u1", key("v1-e-2"), Some("7")).await.unwrap();
        tracker.respond("u1", key("v1-e-2"), Some("7")).await.unwrap();

        let date = chrono::NaiveDate::from_ymd_opt(2024, 6, 15).unwrap();
        let log = db.get_daily_log("u1", date).await.unwrap().unwrap();
        let response = db
            .get_metric_response("u1", log.id, "day_score")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(response.value, "7");

        let progress = db
            .get_progress("u1", SequenceKind::Evening, Some(log.id))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(progress.status, ProgressStatus::InProgress);
        assert_eq!(progress.current_step, key("v1-e-2"));
    }

    #[tokio::test]
    async fn evening_walk_completes_with_branching() {
        let (db, tracker) = setup().await;
        let steps: [(&str, Option<&str>); 6] = [
            ("v1-e-1", None),
            ("v1-e-2", Some("8")),
            ("v1-e-3", Some("a quiet walk")),
            ("v1-e-4", Some("yes")),
            ("v1-e-5", Some("shipped the report")),
            ("v1-e-6", Some("yes")),
        ];
        let mut outcome = StepOutcome { next: None, completed: false };
        for (step, value) in steps {
            outcome = tracker.respond("u1", key(step), value).await.unwrap();
        }
        // working_tomorrow=yes branched to the terminal step.
        assert_eq!(outcome.next, Some(key("v1-e-8")));

        let outcome = tracker.respond("u1", key("v1-e-8"), None).await.unwrap();
        assert!(outcome.completed);

        let date = chrono::NaiveDate::from_ymd_opt(2024, 6, 15).unwrap();
        let log = db.get_daily_log("u1", date).await.unwrap().unwrap();
        let progress = db
            .get_progress("u1", SequenceKind::Evening, Some(log.id))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(progress.status, ProgressStatus::Completed);
    }

    #[tokio::test]
    async fn night_owl_submission_lands_on_previous_day() {
        let db = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        // 01:30 local → logical date is the 14th.
        let clock = Arc::new(FixedClock(
            Utc.with_ymd_and_hms(2024, 6, 15, 1, 30, 0).unwrap(),
        ));
        db.upsert_profile(&UserProfile::new("u1", "u1@example.com"))
            .await
            .unwrap();
        let tracker = StepTracker::new(db.clone(), clock);

        tracker.respond("u1", key("v1-e-2"), Some("6")).await.unwrap();

        let yesterday = chrono::NaiveDate::from_ymd_opt(2024, 6, 14).unwrap();
        assert!(db.get_daily_log("u1", yesterday).await.unwrap().is_some());
        let today = chrono::NaiveDate::from_ymd_opt(2024, 6, 15).unwrap();
        assert!(db.get_daily_log("u1", today).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn day_off_override_recorded() {
        let (db, tracker) = setup().await;
        tracker.override_day_off("u1").await.unwrap();
        tracker.override_day_off("u1").await.unwrap();

        let date = chrono::NaiveDate::from_ymd_opt(2024, 6, 15).unwrap();
        let log = db.get_daily_log("u1", date).await.unwrap().unwrap();
        let response = db
            .get_metric_response("u1", log.id, "day_off_override")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(response.value, "true");
    }

    #[tokio::test]
    async fn events_are_appended_with_daily_log() {
        let (db, tracker) = setup().await;
        tracker
            .record_event("u1", key("v1-m-1"), PageEventKind::View)
            .await
            .unwrap();
        tracker
            .record_event("u1", key("v1-m-2"), PageEventKind::View)
            .await
            .unwrap();

        let date = chrono::NaiveDate::from_ymd_opt(2024, 6, 15).unwrap();
        let log = db.get_daily_log("u1", date).await.unwrap().unwrap();
        let visited = db
            .steps_visited("u1", log.id, crate::sequences::step::StepTag::Morning)
            .await
            .unwrap();
        assert_eq!(visited.len(), 2);
    }
}
