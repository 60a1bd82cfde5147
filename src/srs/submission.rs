use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::content::ContentStore;
use crate::storage::StorageResult;

use super::grading;
use super::scheduling::{Grade, GradedAnswer, SchedulingEngine};

/// Error type recorded for a misspelled dictation answer.
pub const SPELLING_ERROR_TYPE: &str = "spelling";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmittedAnswer {
    pub word_id: String,
    #[serde(default)]
    pub answer: String,
}

impl SubmittedAnswer {
    pub fn new(word_id: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            word_id: word_id.into(),
            answer: answer.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub word_id: String,
    pub correct_spelling: String,
    pub your_answer: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionReport {
    /// Answers that were graded and recorded. Unknown words are not counted.
    pub graded: usize,
    pub error_count: usize,
    pub error_details: Vec<ErrorDetail>,
}

/// Grades a batch of dictation answers against the catalog and feeds each
/// result to the scheduling engine.
pub struct AnswerSubmission {
    engine: SchedulingEngine,
    content: Arc<dyn ContentStore>,
}

impl AnswerSubmission {
    pub fn new(engine: SchedulingEngine, content: Arc<dyn ContentStore>) -> Self {
        Self { engine, content }
    }

    /// Answers are recorded in submission order and each one commits before
    /// the next. A storage failure stops the batch; earlier answers stay
    /// recorded.
    pub fn submit(
        &self,
        student_id: &str,
        answers: &[SubmittedAnswer],
    ) -> StorageResult<SubmissionReport> {
        let mut report = SubmissionReport::default();

        for item in answers {
            let Some(spelling) = self.content.spelling(&item.word_id) else {
                tracing::warn!(
                    student_id,
                    word_id = %item.word_id,
                    "skipping answer for unknown word"
                );
                continue;
            };

            let correct = grading::is_correct(&spelling, &item.answer);
            let answer = GradedAnswer::new(student_id, &item.word_id, Grade::from_correct(correct))
                .with_error_detail(SPELLING_ERROR_TYPE, &item.answer);
            self.engine.record_graded_answer(&answer)?;

            report.graded += 1;
            if !correct {
                report.error_details.push(ErrorDetail {
                    word_id: item.word_id.clone(),
                    correct_spelling: spelling,
                    your_answer: item.answer.clone(),
                });
            }
        }

        report.error_count = report.error_details.len();
        tracing::info!(
            student_id,
            submitted = answers.len(),
            graded = report.graded,
            errors = report.error_count,
            "answers submitted"
        );

        Ok(report)
    }
}
