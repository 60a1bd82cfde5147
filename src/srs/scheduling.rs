use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::clock::Clock;
use crate::storage::{NewErrorEvent, Storage, StorageResult, WordProgress};

pub const MAX_INTERVAL_DAYS: u32 = 365;
const FIRST_INTERVAL_DAYS: u32 = 1;
const SECOND_INTERVAL_DAYS: u32 = 6;

pub const DEFAULT_ERROR_TYPE: &str = "srs_review";

/// Answer quality on the 0..=5 scale. Only the pass threshold matters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Grade(u8);

impl Grade {
    pub const MAX: u8 = 5;
    pub const PASS_THRESHOLD: u8 = 3;
    pub const CORRECT: Grade = Grade(4);
    pub const INCORRECT: Grade = Grade(1);

    /// Out-of-range grades are clamped, not rejected.
    pub fn clamped(raw: i64) -> Self {
        let value = raw.clamp(0, i64::from(Self::MAX));
        if value != raw {
            tracing::warn!(raw, clamped = value, "grade outside 0..=5 clamped");
        }
        Self(value as u8)
    }

    pub fn from_correct(is_correct: bool) -> Self {
        if is_correct {
            Self::CORRECT
        } else {
            Self::INCORRECT
        }
    }

    pub fn value(self) -> u8 {
        self.0
    }

    pub fn is_pass(self) -> bool {
        self.0 >= Self::PASS_THRESHOLD
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How mastery decays after an incorrect answer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// repetitions - 1 (floored at 0), interval halved (floored at 1).
    #[default]
    Decrement,
    /// repetitions = 0, interval = 1.
    Reset,
}

impl FromStr for FailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "decrement" => Ok(Self::Decrement),
            "reset" => Ok(Self::Reset),
            other => Err(format!("unknown failure policy: {other}")),
        }
    }
}

/// The part of a progress record the state machine operates on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryState {
    pub repetitions: u32,
    pub interval_days: u32,
}

impl MemoryState {
    /// State of a word that has never been graded.
    pub const INITIAL: MemoryState = MemoryState {
        repetitions: 0,
        interval_days: 1,
    };

    pub fn of(progress: Option<&WordProgress>) -> Self {
        match progress {
            Some(p) => Self {
                repetitions: p.repetitions,
                interval_days: p.interval_days.max(1),
            },
            None => Self::INITIAL,
        }
    }

    pub fn after(self, grade: Grade, policy: FailurePolicy) -> Self {
        let next = if grade.is_pass() {
            let repetitions = self.repetitions.saturating_add(1);
            let interval_days = match repetitions {
                1 => FIRST_INTERVAL_DAYS,
                2 => SECOND_INTERVAL_DAYS,
                // floor(interval * 2.5)
                _ => self.interval_days.saturating_mul(5) / 2,
            };
            Self {
                repetitions,
                interval_days,
            }
        } else {
            match policy {
                FailurePolicy::Decrement => Self {
                    repetitions: self.repetitions.saturating_sub(1),
                    interval_days: (self.interval_days / 2).max(1),
                },
                FailurePolicy::Reset => Self::INITIAL,
            }
        };

        Self {
            interval_days: next.interval_days.clamp(1, MAX_INTERVAL_DAYS),
            ..next
        }
    }

    pub fn next_review_date(self, today: NaiveDate) -> NaiveDate {
        today + Duration::days(i64::from(self.interval_days))
    }
}

/// One graded answer as delivered by the submission collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GradedAnswer {
    pub student_id: String,
    pub word_id: String,
    pub grade: Grade,
    /// Tag stored on the error event when the answer fails.
    pub error_type: String,
    pub student_answer: String,
}

impl GradedAnswer {
    pub fn new(student_id: impl Into<String>, word_id: impl Into<String>, grade: Grade) -> Self {
        Self {
            student_id: student_id.into(),
            word_id: word_id.into(),
            grade,
            error_type: DEFAULT_ERROR_TYPE.to_string(),
            student_answer: String::new(),
        }
    }

    pub fn with_error_detail(
        mut self,
        error_type: impl Into<String>,
        student_answer: impl Into<String>,
    ) -> Self {
        self.error_type = error_type.into();
        self.student_answer = student_answer.into();
        self
    }
}

/// Applies graded answers to the progress store.
///
/// Each call is one transaction: the progress upsert and, on failure, the
/// error-event append commit together or not at all.
#[derive(Clone)]
pub struct SchedulingEngine {
    storage: Storage,
    clock: Arc<dyn Clock>,
    failure_policy: FailurePolicy,
}

impl SchedulingEngine {
    pub fn new(storage: Storage, clock: Arc<dyn Clock>) -> Self {
        Self {
            storage,
            clock,
            failure_policy: FailurePolicy::default(),
        }
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    pub fn failure_policy(&self) -> FailurePolicy {
        self.failure_policy
    }

    pub fn record_answer(
        &self,
        student_id: &str,
        word_id: &str,
        grade: Grade,
    ) -> StorageResult<WordProgress> {
        self.record_graded_answer(&GradedAnswer::new(student_id, word_id, grade))
    }

    pub fn record_graded_answer(&self, answer: &GradedAnswer) -> StorageResult<WordProgress> {
        let today = self.clock.today();
        let now = self.clock.now();
        let policy = self.failure_policy;

        let (previous, progress) = self.storage.transaction(|tx| {
            let current = WordProgress::find(tx, &answer.student_id, &answer.word_id)?;
            let previous = MemoryState::of(current.as_ref());
            let next = previous.after(answer.grade, policy);

            let progress = WordProgress {
                student_id: answer.student_id.clone(),
                word_id: answer.word_id.clone(),
                repetitions: next.repetitions,
                interval_days: next.interval_days,
                next_review_date: next.next_review_date(today),
                updated_at: now,
            };
            progress.upsert(tx)?;

            if !answer.grade.is_pass() {
                NewErrorEvent {
                    student_id: answer.student_id.clone(),
                    word_id: answer.word_id.clone(),
                    error_type: answer.error_type.clone(),
                    student_answer: answer.student_answer.clone(),
                    occurred_at: now,
                }
                .into_event()
                .insert(tx)?;
            }

            Ok((previous, progress))
        })?;

        tracing::info!(
            student_id = %answer.student_id,
            word_id = %answer.word_id,
            grade = %answer.grade,
            from_repetitions = previous.repetitions,
            repetitions = progress.repetitions,
            interval_days = progress.interval_days,
            next_review_date = %progress.next_review_date,
            "answer recorded"
        );

        Ok(progress)
    }
}
