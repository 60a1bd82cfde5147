//! Spaced-repetition scheduling, error-first review queues and mastery reports.

pub mod grading;
pub mod mastery;
pub mod review_queue;
pub mod scheduling;
pub mod submission;

pub use mastery::{
    MasteryBucket, MasteryBucketPolicy, MasteryReporter, ProgressSummary, StreakStats, StudyDay,
};
pub use review_queue::{QueueLimit, ReviewItem, ReviewMode, ReviewQueueBuilder, ScopeFilter};
pub use scheduling::{FailurePolicy, Grade, GradedAnswer, MemoryState, SchedulingEngine};
pub use submission::{AnswerSubmission, ErrorDetail, SubmissionReport, SubmittedAnswer};
