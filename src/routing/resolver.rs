//! Daily routing resolver — single source of truth for "what should this
//! user see right now".
//!
//! A pure function of the injected clock, the user's timezone, and store
//! reads. Rules are evaluated in strict priority order and the first match
//! wins. Store read failures are soft: log, fall through with defaults.
//! The resolver never errors past this boundary — it always produces a
//! redirect decision.

use std::sync::Arc;

use chrono::{NaiveDate, NaiveTime};
use serde::Serialize;
use tracing::warn;

use crate::clock::{self, Clock};
use crate::error::DatabaseError;
use crate::sequences::catalog::{
    EVENING_AFTER_MORNING, EVENING_FIRST, EVENING_TERMINAL, MORNING_FIRST, ONBOARDING_FIRST,
};
use crate::sequences::catalog;
use crate::sequences::step::{SequenceKind, StepKey, StepTag};
use crate::store::Database;
use crate::store::model::{DailyLog, ProgressStatus, metric_names};

/// Authenticated caller, taken as given — session validation is external.
#[derive(Debug, Clone)]
pub struct Identity {
    pub user_id: String,
    pub email: String,
}

/// Where a decision sends the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Destination {
    Login,
    Step(StepKey),
    DayOff,
    EveningComplete,
}

impl Destination {
    pub fn path(&self) -> String {
        match self {
            Self::Login => "/login".to_string(),
            Self::Step(key) => format!("/steps/{key}"),
            Self::DayOff => "/day-off".to_string(),
            Self::EveningComplete => "/evening/complete".to_string(),
        }
    }
}

/// Why a decision was made. Serialized as the wire `reason` string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteReason {
    Unauthenticated,
    NoProfile,
    NotOnboarded,
    FirstEvening,
    OnboardingDay,
    DayOff,
    MorningNotStarted,
    MorningInProgress,
    MorningComplete,
    EveningNotStarted,
    EveningInProgress,
    EveningComplete,
    NightOwlEveningNotStarted,
    NightOwlEveningInProgress,
    NightOwlEveningComplete,
    Fallback,
}

impl RouteReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unauthenticated => "unauthenticated",
            Self::NoProfile => "no_profile",
            Self::NotOnboarded => "not_onboarded",
            Self::FirstEvening => "first_evening",
            Self::OnboardingDay => "onboarding_day",
            Self::DayOff => "day_off",
            Self::MorningNotStarted => "morning_not_started",
            Self::MorningInProgress => "morning_in_progress",
            Self::MorningComplete => "morning_complete",
            Self::EveningNotStarted => "evening_not_started",
            Self::EveningInProgress => "evening_in_progress",
            Self::EveningComplete => "evening_complete",
            Self::NightOwlEveningNotStarted => "night_owl_evening_not_started",
            Self::NightOwlEveningInProgress => "night_owl_evening_in_progress",
            Self::NightOwlEveningComplete => "night_owl_evening_complete",
            Self::Fallback => "fallback",
        }
    }
}

impl std::fmt::Display for RouteReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The wire response of the routing check endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct RouteDecision {
    pub redirect: Option<String>,
    pub reason: RouteReason,
}

impl RouteDecision {
    fn to(destination: Destination, reason: RouteReason) -> Self {
        Self {
            redirect: Some(destination.path()),
            reason,
        }
    }
}

pub struct Resolver {
    db: Arc<dyn Database>,
    clock: Arc<dyn Clock>,
    default_reflection_time: NaiveTime,
}

impl Resolver {
    pub fn new(
        db: Arc<dyn Database>,
        clock: Arc<dyn Clock>,
        default_reflection_time: NaiveTime,
    ) -> Self {
        Self {
            db,
            clock,
            default_reflection_time,
        }
    }

    /// Resolve the redirect for the current instant.
    pub async fn resolve(&self, identity: Option<&Identity>) -> RouteDecision {
        // Rule 1: unauthenticated.
        let Some(identity) = identity else {
            return RouteDecision::to(Destination::Login, RouteReason::Unauthenticated);
        };
        let user = identity.user_id.as_str();

        // Rule 2: no profile row.
        let Some(profile) = soft(self.db.get_profile(user).await, "profile").flatten() else {
            return RouteDecision::to(
                Destination::Step(ONBOARDING_FIRST),
                RouteReason::NoProfile,
            );
        };

        // Rule 3: not onboarded.
        if !profile.onboarded {
            return RouteDecision::to(
                Destination::Step(ONBOARDING_FIRST),
                RouteReason::NotOnboarded,
            );
        }

        let tz = clock::parse_timezone(&profile.timezone);
        let day = clock::local_day(self.clock.now_utc(), tz);

        // Rule 4: every new user's first interaction is an evening
        // reflection, regardless of time of day.
        let seen_evening = soft(
            self.db.has_any_event_for_tag(user, StepTag::Evening).await,
            "evening history",
        )
        .unwrap_or(false);
        if !seen_evening {
            return RouteDecision::to(
                Destination::Step(EVENING_FIRST),
                RouteReason::FirstEvening,
            );
        }

        // Rule 5: onboarding completion day — today's evening counts as
        // already satisfied.
        if clock::local_date_of(profile.created_at, tz) == day.date {
            return RouteDecision::to(
                Destination::Step(EVENING_TERMINAL),
                RouteReason::OnboardingDay,
            );
        }

        let daily_log = soft(self.db.get_daily_log(user, day.date).await, "daily log").flatten();
        let morning = self
            .progress_status(user, SequenceKind::Morning, daily_log.as_ref())
            .await;
        let evening = self
            .progress_status(user, SequenceKind::Evening, daily_log.as_ref())
            .await;

        // Rule 6: scheduled day off.
        if morning == ProgressStatus::NotStarted
            && evening == ProgressStatus::NotStarted
            && self.is_scheduled_day_off(user, day.date, daily_log.as_ref()).await
        {
            return RouteDecision::to(Destination::DayOff, RouteReason::DayOff);
        }

        // Rule 9: night owl — yesterday's evening, same resolution as the
        // normal evening window.
        if day.night_owl {
            return self
                .evening_decision(user, evening, daily_log.as_ref(), true)
                .await;
        }

        let reflection = self.reflection_time(user, daily_log.as_ref()).await;
        if day.time < reflection {
            // Rule 7: before reflection time — morning branch.
            match morning {
                ProgressStatus::NotStarted => RouteDecision::to(
                    Destination::Step(MORNING_FIRST),
                    RouteReason::MorningNotStarted,
                ),
                ProgressStatus::InProgress => {
                    let resume = self
                        .resume_point(user, daily_log.as_ref(), SequenceKind::Morning)
                        .await;
                    RouteDecision::to(Destination::Step(resume), RouteReason::MorningInProgress)
                }
                ProgressStatus::Completed => match evening {
                    ProgressStatus::Completed => RouteDecision::to(
                        Destination::EveningComplete,
                        RouteReason::EveningComplete,
                    ),
                    ProgressStatus::InProgress => {
                        let resume = self
                            .resume_point(user, daily_log.as_ref(), SequenceKind::Evening)
                            .await;
                        RouteDecision::to(
                            Destination::Step(resume),
                            RouteReason::EveningInProgress,
                        )
                    }
                    // Arriving from a completed morning skips the intro.
                    ProgressStatus::NotStarted => RouteDecision::to(
                        Destination::Step(EVENING_AFTER_MORNING),
                        RouteReason::MorningComplete,
                    ),
                },
            }
        } else {
            // Rule 8: at/after reflection time — evening branch.
            self.evening_decision(user, evening, daily_log.as_ref(), false)
                .await
        }
    }

    /// Rules 8/9 shared evening resolution.
    async fn evening_decision(
        &self,
        user: &str,
        status: ProgressStatus,
        daily_log: Option<&DailyLog>,
        night_owl: bool,
    ) -> RouteDecision {
        match status {
            ProgressStatus::NotStarted => RouteDecision::to(
                Destination::Step(EVENING_FIRST),
                if night_owl {
                    RouteReason::NightOwlEveningNotStarted
                } else {
                    RouteReason::EveningNotStarted
                },
            ),
            ProgressStatus::InProgress => {
                let resume = self
                    .resume_point(user, daily_log, SequenceKind::Evening)
                    .await;
                RouteDecision::to(
                    Destination::Step(resume),
                    if night_owl {
                        RouteReason::NightOwlEveningInProgress
                    } else {
                        RouteReason::EveningInProgress
                    },
                )
            }
            ProgressStatus::Completed => RouteDecision::to(
                Destination::EveningComplete,
                if night_owl {
                    RouteReason::NightOwlEveningComplete
                } else {
                    RouteReason::EveningComplete
                },
            ),
        }
    }

    async fn progress_status(
        &self,
        user: &str,
        sequence: SequenceKind,
        daily_log: Option<&DailyLog>,
    ) -> ProgressStatus {
        let Some(log) = daily_log else {
            return ProgressStatus::NotStarted;
        };
        soft(
            self.db.get_progress(user, sequence, Some(log.id)).await,
            "sequence progress",
        )
        .flatten()
        .map(|p| p.status)
        .unwrap_or(ProgressStatus::NotStarted)
    }

    /// Highest-numbered step visited today, or the sequence's hardcoded
    /// first-resumable step when no numeric events exist.
    async fn resume_point(
        &self,
        user: &str,
        daily_log: Option<&DailyLog>,
        sequence: SequenceKind,
    ) -> StepKey {
        let fallback = catalog::first_resumable(sequence);
        let Some(log) = daily_log else {
            return fallback;
        };
        let visited = soft(
            self.db.steps_visited(user, log.id, sequence.into()).await,
            "visited steps",
        )
        .unwrap_or_default();
        visited
            .iter()
            .map(|key| key.number)
            .max()
            .map(|number| StepKey::new(sequence.into(), number))
            .unwrap_or(fallback)
    }

    /// Most recent `return_date` strictly after today, with no override
    /// recorded against today's daily log.
    async fn is_scheduled_day_off(
        &self,
        user: &str,
        today: NaiveDate,
        daily_log: Option<&DailyLog>,
    ) -> bool {
        let Some(response) = soft(
            self.db
                .latest_metric_response(user, metric_names::RETURN_DATE)
                .await,
            "return date",
        )
        .flatten() else {
            return false;
        };
        let Ok(return_date) = NaiveDate::parse_from_str(&response.value, "%Y-%m-%d") else {
            warn!(value = %response.value, "Unparseable return_date response, ignoring");
            return false;
        };
        if return_date <= today {
            return false;
        }
        if let Some(log) = daily_log {
            let overridden = soft(
                self.db
                    .get_metric_response(user, log.id, metric_names::DAY_OFF_OVERRIDE)
                    .await,
                "day off override",
            )
            .flatten()
            .is_some();
            if overridden {
                return false;
            }
        }
        true
    }

    /// Today's configured evening reflection time, default 18:00.
    async fn reflection_time(&self, user: &str, daily_log: Option<&DailyLog>) -> NaiveTime {
        let Some(log) = daily_log else {
            return self.default_reflection_time;
        };
        soft(
            self.db
                .get_metric_response(user, log.id, metric_names::EVENING_REFLECTION_TIME)
                .await,
            "reflection time",
        )
        .flatten()
        .and_then(|r| NaiveTime::parse_from_str(&r.value, "%H:%M").ok())
        .unwrap_or(self.default_reflection_time)
    }
}

/// Soft-failure read: a store error is logged and treated as "no data" so
/// the rule chain can keep going with defaults.
fn soft<T>(result: Result<T, DatabaseError>, what: &str) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(error) => {
            warn!(%error, what, "Store read failed during routing, using defaults");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn destination_paths() {
        assert_eq!(Destination::Login.path(), "/login");
        assert_eq!(Destination::DayOff.path(), "/day-off");
        assert_eq!(Destination::EveningComplete.path(), "/evening/complete");
        assert_eq!(
            Destination::Step("v1-m-3".parse().unwrap()).path(),
            "/steps/v1-m-3"
        );
    }

    #[test]
    fn reason_serde_matches_as_str() {
        for reason in [
            RouteReason::Unauthenticated,
            RouteReason::NoProfile,
            RouteReason::NotOnboarded,
            RouteReason::FirstEvening,
            RouteReason::OnboardingDay,
            RouteReason::DayOff,
            RouteReason::MorningNotStarted,
            RouteReason::MorningInProgress,
            RouteReason::MorningComplete,
            RouteReason::EveningNotStarted,
            RouteReason::EveningInProgress,
            RouteReason::EveningComplete,
            RouteReason::NightOwlEveningNotStarted,
            RouteReason::NightOwlEveningInProgress,
            RouteReason::NightOwlEveningComplete,
            RouteReason::Fallback,
        ] {
            let json = serde_json::to_string(&reason).unwrap();
            assert_eq!(json, format!("\"{}\"", reason.as_str()));
        }
    }

    #[test]
    fn decision_wire_shape() {
        let decision = RouteDecision::to(Destination::DayOff, RouteReason::DayOff);
        let json = serde_json::to_value(&decision).unwrap();
        assert_eq!(json["redirect"], "/day-off");
        assert_eq!(json["reason"], "day_off");
    }
}
