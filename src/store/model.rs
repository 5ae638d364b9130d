//! Persisted data model — profiles, daily logs, progress, metrics, events.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::sequences::step::{ResponseMap, SequenceKind, StepKey};

/// User profile — created at signup, mutated during onboarding, read by the
/// resolver for every routing decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// IANA timezone identifier, e.g. "America/New_York".
    pub timezone: String,
    pub onboarded: bool,
    pub created_at: DateTime<Utc>,
}

impl UserProfile {
    /// Fresh profile at signup: UTC timezone until onboarding sets one.
    pub fn new(user_id: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            email: email.into(),
            display_name: None,
            timezone: "UTC".to_string(),
            onboarded: false,
            created_at: Utc::now(),
        }
    }
}

/// One row per user per logical day, created lazily on first write access.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyLog {
    pub id: Uuid,
    pub user_id: String,
    /// Logical date (`YYYY-MM-DD` in the user's timezone, night-owl shifted).
    pub date: NaiveDate,
    pub created_at: DateTime<Utc>,
}

/// Lifecycle of a sequence run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStatus {
    NotStarted,
    InProgress,
    Completed,
}

impl std::fmt::Display for ProgressStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::NotStarted => "not_started",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
        };
        write!(f, "{s}")
    }
}

/// Per (user, sequence, daily log) progress. Onboarding's row has no daily
/// log — that flow is day-independent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SequenceProgress {
    pub id: Uuid,
    pub user_id: String,
    pub sequence: SequenceKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub daily_log_id: Option<Uuid>,
    pub current_step: StepKey,
    /// Accumulated free-form responses, keyed by metric name.
    pub responses: ResponseMap,
    pub status: ProgressStatus,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

/// Value type of a metric field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricType {
    Text,
    Integer,
    Date,
    Time,
    Boolean,
    /// 1–10 rating.
    Scale,
}

impl MetricType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Integer => "integer",
            Self::Date => "date",
            Self::Time => "time",
            Self::Boolean => "boolean",
            Self::Scale => "scale",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "text" => Some(Self::Text),
            "integer" => Some(Self::Integer),
            "date" => Some(Self::Date),
            "time" => Some(Self::Time),
            "boolean" => Some(Self::Boolean),
            "scale" => Some(Self::Scale),
            _ => None,
        }
    }

    /// Validate a raw value against this type.
    ///
    /// Dates are `YYYY-MM-DD`, times `HH:MM`, booleans `true`/`false`,
    /// scales integers in 1..=10.
    pub fn validate(&self, value: &str) -> Result<(), String> {
        match self {
            Self::Text => Ok(()),
            Self::Integer => value
                .parse::<i64>()
                .map(|_| ())
                .map_err(|_| format!("not an integer: {value}")),
            Self::Date => NaiveDate::parse_from_str(value, "%Y-%m-%d")
                .map(|_| ())
                .map_err(|_| format!("expected YYYY-MM-DD, got {value}")),
            Self::Time => chrono::NaiveTime::parse_from_str(value, "%H:%M")
                .map(|_| ())
                .map_err(|_| format!("expected HH:MM, got {value}")),
            Self::Boolean => match value {
                "true" | "false" => Ok(()),
                other => Err(format!("expected true/false, got {other}")),
            },
            Self::Scale => match value.parse::<i64>() {
                Ok(n) if (1..=10).contains(&n) => Ok(()),
                _ => Err(format!("expected 1-10, got {value}")),
            },
        }
    }
}

/// Metric names the routing logic depends on.
pub mod metric_names {
    pub const EVENING_REFLECTION_TIME: &str = "evening_reflection_time";
    pub const RETURN_DATE: &str = "return_date";
    pub const DAY_OFF_OVERRIDE: &str = "day_off_override";
}

/// A named, typed metric definition from the catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metric {
    pub name: String,
    pub value_type: MetricType,
}

/// A (user, daily log, metric) value row — at most one per metric per day.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricResponse {
    pub id: Uuid,
    pub user_id: String,
    pub daily_log_id: Uuid,
    pub metric: String,
    pub value: String,
    pub recorded_at: DateTime<Utc>,
}

/// Interaction kinds logged against a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageEventKind {
    View,
    Complete,
    HelpClick,
    ErrorClick,
    StuckClick,
    LinkClick,
}

impl PageEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::View => "view",
            Self::Complete => "complete",
            Self::HelpClick => "help_click",
            Self::ErrorClick => "error_click",
            Self::StuckClick => "stuck_click",
            Self::LinkClick => "link_click",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "view" => Some(Self::View),
            "complete" => Some(Self::Complete),
            "help_click" => Some(Self::HelpClick),
            "error_click" => Some(Self::ErrorClick),
            "stuck_click" => Some(Self::StuckClick),
            "link_click" => Some(Self::LinkClick),
            _ => None,
        }
    }

    /// Whether this event should hand the user a support link.
    pub fn wants_support(&self) -> bool {
        matches!(self, Self::HelpClick | Self::ErrorClick | Self::StuckClick)
    }
}

/// Append-only record of a step visit or interaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageEvent {
    pub id: Uuid,
    pub user_id: String,
    pub step_key: StepKey,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub daily_log_id: Option<Uuid>,
    pub kind: PageEventKind,
    pub created_at: DateTime<Utc>,
}

impl PageEvent {
    pub fn new(
        user_id: impl Into<String>,
        step_key: StepKey,
        daily_log_id: Option<Uuid>,
        kind: PageEventKind,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            step_key,
            daily_log_id,
            kind,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metric_validation() {
        assert!(MetricType::Text.validate("anything at all").is_ok());
        assert!(MetricType::Integer.validate("42").is_ok());
        assert!(MetricType::Integer.validate("4.2").is_err());
        assert!(MetricType::Date.validate("2024-06-15").is_ok());
        assert!(MetricType::Date.validate("15/06/2024").is_err());
        assert!(MetricType::Time.validate("18:00").is_ok());
        assert!(MetricType::Time.validate("6pm").is_err());
        assert!(MetricType::Boolean.validate("true").is_ok());
        assert!(MetricType::Boolean.validate("yes").is_err());
        assert!(MetricType::Scale.validate("7").is_ok());
        assert!(MetricType::Scale.validate("0").is_err());
        assert!(MetricType::Scale.validate("11").is_err());
    }

    #[test]
    fn metric_type_str_roundtrip() {
        for t in [
            MetricType::Text,
            MetricType::Integer,
            MetricType::Date,
            MetricType::Time,
            MetricType::Boolean,
            MetricType::Scale,
        ] {
            assert_eq!(MetricType::parse(t.as_str()), Some(t));
        }
    }

    #[test]
    fn support_events() {
        assert!(PageEventKind::HelpClick.wants_support());
        assert!(PageEventKind::StuckClick.wants_support());
        assert!(PageEventKind::ErrorClick.wants_support());
        assert!(!PageEventKind::View.wants_support());
        assert!(!PageEventKind::Complete.wants_support());
        assert!(!PageEventKind::LinkClick.wants_support());
    }

    #[test]
    fn event_kind_str_roundtrip() {
        for k in [
            PageEventKind::View,
            PageEventKind::Complete,
            PageEventKind::HelpClick,
            PageEventKind::ErrorClick,
            PageEventKind::StuckClick,
            PageEventKind::LinkClick,
        ] {
            assert_eq!(PageEventKind::parse(k.as_str()), Some(k));
        }
    }
}
