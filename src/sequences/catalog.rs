//! Static sequence catalog — the ordered step tables for each flow.
//!
//! Leaf data, no behavior. The navigator and routing resolver consume
//! these tables; the step keys here are the only ones the app serves.

use crate::sequences::step::{
    Branch, SequenceKind, Step, StepKey, StepKind, StepTag, Visibility,
};
use crate::store::model::MetricType;

/// First step shown when routing into the morning flow.
pub const MORNING_FIRST: StepKey = StepKey::new(StepTag::Morning, 1);
/// First step shown when routing into the evening flow.
pub const EVENING_FIRST: StepKey = StepKey::new(StepTag::Evening, 1);
/// Where the evening flow starts when the user arrives from a completed
/// morning — the intro step is skipped.
pub const EVENING_AFTER_MORNING: StepKey = StepKey::new(StepTag::Evening, 2);
/// Closing step of the evening flow.
pub const EVENING_TERMINAL: StepKey = StepKey::new(StepTag::Evening, 8);
/// First step of onboarding.
pub const ONBOARDING_FIRST: StepKey = StepKey::new(StepTag::Onboarding, 1);

static ONBOARDING_STEPS: &[Step] = &[
    Step {
        key: StepKey::new(StepTag::Onboarding, 1),
        prompt: "Welcome to Daybreak. A few questions and you're in.",
        kind: StepKind::Info,
        visibility: Visibility::Always,
    },
    Step {
        key: StepKey::new(StepTag::Onboarding, 2),
        prompt: "What should we call you?",
        kind: StepKind::Question {
            metric: "display_name",
            input: MetricType::Text,
        },
        visibility: Visibility::Always,
    },
    Step {
        key: StepKey::new(StepTag::Onboarding, 3),
        prompt: "Which timezone are you in?",
        kind: StepKind::Question {
            metric: "timezone",
            input: MetricType::Text,
        },
        visibility: Visibility::Always,
    },
    Step {
        key: StepKey::new(StepTag::Onboarding, 4),
        prompt: "When do you usually sit down for your evening reflection?",
        kind: StepKind::Question {
            metric: "evening_reflection_time",
            input: MetricType::Time,
        },
        visibility: Visibility::Always,
    },
    Step {
        key: StepKey::new(StepTag::Onboarding, 5),
        prompt: "You're all set. Tonight starts with an evening reflection.",
        kind: StepKind::Info,
        visibility: Visibility::Always,
    },
];

static MORNING_STEPS: &[Step] = &[
    Step {
        key: StepKey::new(StepTag::Morning, 1),
        prompt: "Good morning. Take a breath before the day starts.",
        kind: StepKind::Info,
        visibility: Visibility::Always,
    },
    Step {
        key: StepKey::new(StepTag::Morning, 2),
        prompt: "How well did you sleep?",
        kind: StepKind::Question {
            metric: "sleep_quality",
            input: MetricType::Scale,
        },
        visibility: Visibility::Always,
    },
    Step {
        key: StepKey::new(StepTag::Morning, 3),
        prompt: "How do you feel right now?",
        kind: StepKind::Question {
            metric: "mood_score",
            input: MetricType::Scale,
        },
        visibility: Visibility::Always,
    },
    Step {
        key: StepKey::new(StepTag::Morning, 4),
        prompt: "What is the one thing today is about?",
        kind: StepKind::Question {
            metric: "intention",
            input: MetricType::Text,
        },
        visibility: Visibility::Always,
    },
    Step {
        key: StepKey::new(StepTag::Morning, 5),
        prompt: "Today's short lesson.",
        kind: StepKind::Audio {
            media: "lessons/morning-focus.mp3",
            metric: "audio_progress",
        },
        visibility: Visibility::Always,
    },
    Step {
        key: StepKey::new(StepTag::Morning, 6),
        prompt: "That's your morning done. See you tonight.",
        kind: StepKind::Info,
        visibility: Visibility::Always,
    },
];

static EVENING_STEPS: &[Step] = &[
    Step {
        key: StepKey::new(StepTag::Evening, 1),
        prompt: "Time to close the day.",
        kind: StepKind::Info,
        visibility: Visibility::Always,
    },
    Step {
        key: StepKey::new(StepTag::Evening, 2),
        prompt: "How was today, all things considered?",
        kind: StepKind::Question {
            metric: "day_score",
            input: MetricType::Scale,
        },
        visibility: Visibility::Always,
    },
    Step {
        key: StepKey::new(StepTag::Evening, 3),
        prompt: "Name one thing you're grateful for today.",
        kind: StepKind::Question {
            metric: "gratitude",
            input: MetricType::Text,
        },
        visibility: Visibility::Always,
    },
    Step {
        key: StepKey::new(StepTag::Evening, 4),
        prompt: "Did you work today?",
        kind: StepKind::Choice {
            metric: Some("worked_today"),
            options: &["yes", "no"],
            branches: &[Branch {
                value: "no",
                target: StepKey::new(StepTag::Evening, 6),
            }],
        },
        visibility: Visibility::Always,
    },
    Step {
        key: StepKey::new(StepTag::Evening, 5),
        prompt: "How did the work go?",
        kind: StepKind::Question {
            metric: "work_reflection",
            input: MetricType::Text,
        },
        visibility: Visibility::IfEquals {
            metric: "worked_today",
            value: "yes",
        },
    },
    Step {
        key: StepKey::new(StepTag::Evening, 6),
        prompt: "Are you working tomorrow?",
        kind: StepKind::Choice {
            metric: Some("working_tomorrow"),
            options: &["yes", "no"],
            branches: &[Branch {
                value: "yes",
                target: StepKey::new(StepTag::Evening, 8),
            }],
        },
        visibility: Visibility::Always,
    },
    Step {
        key: StepKey::new(StepTag::Evening, 7),
        prompt: "When are you back?",
        kind: StepKind::Question {
            metric: "return_date",
            input: MetricType::Date,
        },
        visibility: Visibility::IfEquals {
            metric: "working_tomorrow",
            value: "no",
        },
    },
    Step {
        key: StepKey::new(StepTag::Evening, 8),
        prompt: "Day closed. Rest well.",
        kind: StepKind::Info,
        visibility: Visibility::Always,
    },
];

/// The ordered step list for a sequence.
pub fn steps(kind: SequenceKind) -> &'static [Step] {
    match kind {
        SequenceKind::Onboarding => ONBOARDING_STEPS,
        SequenceKind::Morning => MORNING_STEPS,
        SequenceKind::Evening => EVENING_STEPS,
    }
}

/// Look up a step across all sequences by key.
pub fn find_step(key: StepKey) -> Option<&'static Step> {
    let kind = key.tag.sequence()?;
    steps(kind).iter().find(|step| step.key == key)
}

/// First step of a sequence.
pub fn first_step(kind: SequenceKind) -> StepKey {
    steps(kind)[0].key
}

/// Fallback resume point when a day has no parseable step events.
///
/// Evening resumes at step 2 to stay consistent with the intro-skip
/// arrival rule; everything else resumes at its first step.
pub fn first_resumable(kind: SequenceKind) -> StepKey {
    match kind {
        SequenceKind::Evening => EVENING_AFTER_MORNING,
        _ => first_step(kind),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_sequences() -> [SequenceKind; 3] {
        [SequenceKind::Onboarding, SequenceKind::Morning, SequenceKind::Evening]
    }

    #[test]
    fn step_numbers_are_dense_and_ordered() {
        for kind in all_sequences() {
            for (i, step) in steps(kind).iter().enumerate() {
                assert_eq!(step.key.tag, StepTag::from(kind), "{kind} step {i}");
                assert_eq!(step.key.number as usize, i + 1, "{kind} step {i}");
            }
        }
    }

    #[test]
    fn find_step_resolves_every_catalog_key() {
        for kind in all_sequences() {
            for step in steps(kind) {
                assert_eq!(find_step(step.key).unwrap().key, step.key);
            }
        }
        assert!(find_step("v1-e-99".parse().unwrap()).is_none());
        assert!(find_step("v1-bf-1".parse().unwrap()).is_none());
    }

    #[test]
    fn branch_targets_exist_in_their_sequence() {
        for kind in all_sequences() {
            for step in steps(kind) {
                for branch in step.kind.branches() {
                    assert!(
                        find_step(branch.target).is_some(),
                        "{} branches to missing {}",
                        step.key,
                        branch.target
                    );
                }
            }
        }
    }

    #[test]
    fn terminal_constants_match_catalog() {
        assert_eq!(first_step(SequenceKind::Onboarding), ONBOARDING_FIRST);
        assert_eq!(first_step(SequenceKind::Morning), MORNING_FIRST);
        assert_eq!(first_step(SequenceKind::Evening), EVENING_FIRST);
        assert_eq!(steps(SequenceKind::Evening).last().unwrap().key, EVENING_TERMINAL);
    }

    #[test]
    fn first_resumable_skips_evening_intro() {
        assert_eq!(first_resumable(SequenceKind::Evening), EVENING_AFTER_MORNING);
        assert_eq!(first_resumable(SequenceKind::Morning), MORNING_FIRST);
    }

    #[test]
    fn visibility_only_references_earlier_metrics() {
        for kind in all_sequences() {
            let mut seen: Vec<&str> = Vec::new();
            for step in steps(kind) {
                let referenced = match step.visibility {
                    Visibility::Always => None,
                    Visibility::IfEquals { metric, .. }
                    | Visibility::IfPresent { metric }
                    | Visibility::IfAbsent { metric } => Some(metric),
                };
                if let Some(metric) = referenced {
                    assert!(
                        seen.contains(&metric),
                        "{} tests {metric} before any step collects it",
                        step.key
                    );
                }
                if let Some(metric) = step.kind.metric() {
                    seen.push(metric);
                }
            }
        }
    }
}
