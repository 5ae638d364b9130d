//! Step and sequence descriptors.
//!
//! Step keys follow the wire pattern `v1-<seq>-<n>` where `<seq>` is a
//! one/two letter sequence tag and `<n>` a positive integer. Resume-point
//! logic depends on that numeric suffix being parseable.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::store::model::MetricType;

/// The guided flows a user can be in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SequenceKind {
    Onboarding,
    Morning,
    Evening,
}

impl SequenceKind {
    /// Short tag used inside step keys.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Onboarding => "o",
            Self::Morning => "m",
            Self::Evening => "e",
        }
    }

    /// Whether progress for this sequence is scoped to a daily log.
    ///
    /// Onboarding is day-independent; morning and evening are per-day.
    pub fn is_daily(&self) -> bool {
        !matches!(self, Self::Onboarding)
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "o" => Some(Self::Onboarding),
            "m" => Some(Self::Morning),
            "e" => Some(Self::Evening),
            _ => None,
        }
    }
}

impl fmt::Display for SequenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Onboarding => "onboarding",
            Self::Morning => "morning",
            Self::Evening => "evening",
        };
        write!(f, "{s}")
    }
}

impl FromStr for SequenceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "onboarding" => Ok(Self::Onboarding),
            "morning" => Ok(Self::Morning),
            "evening" => Ok(Self::Evening),
            other => Err(format!("unknown sequence: {other}")),
        }
    }
}

/// Tag segment of a step key. `Backfill` is reserved for imported history
/// and has no shipped catalog sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StepTag {
    Onboarding,
    Morning,
    Evening,
    Backfill,
}

impl StepTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Onboarding => "o",
            Self::Morning => "m",
            Self::Evening => "e",
            Self::Backfill => "bf",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "o" => Some(Self::Onboarding),
            "m" => Some(Self::Morning),
            "e" => Some(Self::Evening),
            "bf" => Some(Self::Backfill),
            _ => None,
        }
    }

    /// The sequence this tag belongs to, if any.
    pub fn sequence(&self) -> Option<SequenceKind> {
        match self {
            Self::Onboarding => Some(SequenceKind::Onboarding),
            Self::Morning => Some(SequenceKind::Morning),
            Self::Evening => Some(SequenceKind::Evening),
            Self::Backfill => None,
        }
    }
}

impl From<SequenceKind> for StepTag {
    fn from(kind: SequenceKind) -> Self {
        match kind {
            SequenceKind::Onboarding => Self::Onboarding,
            SequenceKind::Morning => Self::Morning,
            SequenceKind::Evening => Self::Evening,
        }
    }
}

/// A parsed `v1-<seq>-<n>` step key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StepKey {
    pub tag: StepTag,
    pub number: u32,
}

impl StepKey {
    pub const fn new(tag: StepTag, number: u32) -> Self {
        Self { tag, number }
    }
}

impl fmt::Display for StepKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v1-{}-{}", self.tag.as_str(), self.number)
    }
}

impl FromStr for StepKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.splitn(3, '-');
        let (version, tag, number) = (parts.next(), parts.next(), parts.next());
        let (Some("v1"), Some(tag), Some(number)) = (version, tag, number) else {
            return Err(format!("malformed step key: {s}"));
        };
        let tag = StepTag::parse(tag).ok_or_else(|| format!("unknown step tag in: {s}"))?;
        let number: u32 = number
            .parse()
            .map_err(|_| format!("non-numeric step suffix in: {s}"))?;
        if number == 0 {
            return Err(format!("step numbers start at 1: {s}"));
        }
        Ok(Self { tag, number })
    }
}

impl Serialize for StepKey {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for StepKey {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Accumulated free-form responses for a sequence run, keyed by metric name.
pub type ResponseMap = serde_json::Map<String, serde_json::Value>;

/// Visibility predicate over the accumulated response map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Always,
    /// Visible only when `metric` was answered with exactly `value`.
    IfEquals {
        metric: &'static str,
        value: &'static str,
    },
    /// Visible only when `metric` has any recorded answer.
    IfPresent { metric: &'static str },
    /// Visible only when `metric` has no recorded answer.
    IfAbsent { metric: &'static str },
}

impl Visibility {
    /// Evaluate against the accumulated responses.
    pub fn is_visible(&self, responses: &ResponseMap) -> bool {
        match self {
            Self::Always => true,
            Self::IfEquals { metric, value } => responses
                .get(*metric)
                .and_then(|v| v.as_str())
                .is_some_and(|v| v == *value),
            Self::IfPresent { metric } => responses.contains_key(*metric),
            Self::IfAbsent { metric } => !responses.contains_key(*metric),
        }
    }
}

/// A branch target: answering `value` jumps to `target` instead of the next
/// step in list order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Branch {
    pub value: &'static str,
    pub target: StepKey,
}

/// What a step is, and the fields that kind needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
    /// Plain content page; collects nothing.
    Info,
    /// Collects one typed metric value.
    Question {
        metric: &'static str,
        input: MetricType,
    },
    /// Fixed options; may branch on the chosen value. Collects the choice
    /// as a metric when `metric` is set.
    Choice {
        metric: Option<&'static str>,
        options: &'static [&'static str],
        branches: &'static [Branch],
    },
    /// Audio lesson page; records listening progress as an integer metric.
    Audio {
        media: &'static str,
        metric: &'static str,
    },
}

impl StepKind {
    /// The metric this step collects, if any.
    pub fn metric(&self) -> Option<&'static str> {
        match self {
            Self::Info => None,
            Self::Question { metric, .. } => Some(metric),
            Self::Choice { metric, .. } => *metric,
            Self::Audio { metric, .. } => Some(metric),
        }
    }

    /// Branch table for this step (empty for non-choice steps).
    pub fn branches(&self) -> &'static [Branch] {
        match self {
            Self::Choice { branches, .. } => branches,
            _ => &[],
        }
    }
}

/// One page/prompt within a sequence.
#[derive(Debug, Clone, Copy)]
pub struct Step {
    pub key: StepKey,
    pub prompt: &'static str,
    pub kind: StepKind,
    pub visibility: Visibility,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_key_roundtrip() {
        let keys = ["v1-o-1", "v1-m-3", "v1-e-12", "v1-bf-7"];
        for raw in keys {
            let key: StepKey = raw.parse().unwrap();
            assert_eq!(key.to_string(), raw);
        }
    }

    #[test]
    fn step_key_rejects_malformed() {
        for raw in ["", "v2-m-1", "v1-m", "v1-x-1", "v1-m-zero", "v1-m-0", "m-1"] {
            assert!(raw.parse::<StepKey>().is_err(), "{raw} should not parse");
        }
    }

    #[test]
    fn step_key_serde_matches_display() {
        let key = StepKey::new(StepTag::Evening, 4);
        let json = serde_json::to_string(&key).unwrap();
        assert_eq!(json, "\"v1-e-4\"");
        let parsed: StepKey = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, key);
    }

    #[test]
    fn sequence_tags_roundtrip() {
        for kind in [SequenceKind::Onboarding, SequenceKind::Morning, SequenceKind::Evening] {
            assert_eq!(SequenceKind::from_tag(kind.tag()), Some(kind));
            assert_eq!(kind.to_string().parse::<SequenceKind>().unwrap(), kind);
        }
        assert_eq!(SequenceKind::from_tag("bf"), None);
    }

    #[test]
    fn only_onboarding_is_day_independent() {
        assert!(!SequenceKind::Onboarding.is_daily());
        assert!(SequenceKind::Morning.is_daily());
        assert!(SequenceKind::Evening.is_daily());
    }

    #[test]
    fn visibility_predicates() {
        let mut responses = ResponseMap::new();
        responses.insert("worked_today".into(), serde_json::json!("yes"));

        assert!(Visibility::Always.is_visible(&responses));
        assert!(
            Visibility::IfEquals { metric: "worked_today", value: "yes" }.is_visible(&responses)
        );
        assert!(
            !Visibility::IfEquals { metric: "worked_today", value: "no" }.is_visible(&responses)
        );
        assert!(Visibility::IfPresent { metric: "worked_today" }.is_visible(&responses));
        assert!(!Visibility::IfPresent { metric: "mood_score" }.is_visible(&responses));
        assert!(Visibility::IfAbsent { metric: "mood_score" }.is_visible(&responses));
        assert!(!Visibility::IfAbsent { metric: "worked_today" }.is_visible(&responses));
    }
}
