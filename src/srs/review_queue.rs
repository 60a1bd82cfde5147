use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::clock::Clock;
use crate::content::ContentStore;
use crate::storage::{ErrorAggregate, Storage, StorageResult, WordProgress};

use super::scheduling::MemoryState;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewMode {
    /// Words whose next review date is today or earlier.
    #[default]
    Due,
    /// Every word with at least one recorded error, regardless of due date.
    ErrorReview,
}

/// Restricts which words a queue may contain.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScopeFilter {
    /// `None` means every word the student has been tested on.
    pub word_ids: Option<HashSet<String>>,
    pub mode: ReviewMode,
    /// Only errors at or after this instant are counted.
    pub errors_since: Option<DateTime<Utc>>,
}

impl ScopeFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn words<I, S>(word_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            word_ids: Some(word_ids.into_iter().map(Into::into).collect()),
            ..Self::default()
        }
    }

    pub fn for_list(content: &dyn ContentStore, list_id: &str) -> Self {
        Self::words(content.words_in_list(list_id))
    }

    pub fn error_review(mut self) -> Self {
        self.mode = ReviewMode::ErrorReview;
        self
    }

    pub fn errors_since(mut self, since: DateTime<Utc>) -> Self {
        self.errors_since = Some(since);
        self
    }

    fn contains(&self, word_id: &str) -> bool {
        self.word_ids
            .as_ref()
            .map_or(true, |ids| ids.contains(word_id))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum QueueLimit {
    #[default]
    All,
    AtMost(usize),
}

impl QueueLimit {
    fn apply<T>(self, items: &mut Vec<T>) {
        if let QueueLimit::AtMost(n) = self {
            items.truncate(n);
        }
    }
}

impl FromStr for QueueLimit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("all") {
            return Ok(Self::All);
        }
        s.parse::<usize>()
            .map(Self::AtMost)
            .map_err(|_| format!("invalid queue limit: {s}"))
    }
}

impl fmt::Display for QueueLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueueLimit::All => f.write_str("all"),
            QueueLimit::AtMost(n) => write!(f, "{n}"),
        }
    }
}

/// Progress joined with the word's error aggregate. Not persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewItem {
    pub word_id: String,
    pub repetitions: u32,
    pub interval_days: u32,
    /// `None` for an error-review word that has no progress row yet.
    pub next_review_date: Option<NaiveDate>,
    pub error_count: i64,
    pub last_error_at: Option<DateTime<Utc>>,
}

impl ReviewItem {
    fn new(word_id: String, progress: Option<&WordProgress>, errors: Option<&ErrorAggregate>) -> Self {
        let state = MemoryState::of(progress);
        Self {
            word_id,
            repetitions: state.repetitions,
            interval_days: state.interval_days,
            next_review_date: progress.map(|p| p.next_review_date),
            error_count: errors.map_or(0, |e| e.count),
            last_error_at: errors.map(|e| e.last_error_at),
        }
    }
}

/// Error count descending, then next review date ascending (missing dates
/// first), then repetitions ascending. Remaining ties go to the most recent
/// error and finally the word id, so the order is total.
pub fn queue_order(a: &ReviewItem, b: &ReviewItem) -> Ordering {
    b.error_count
        .cmp(&a.error_count)
        .then_with(|| a.next_review_date.cmp(&b.next_review_date))
        .then_with(|| a.repetitions.cmp(&b.repetitions))
        .then_with(|| b.last_error_at.cmp(&a.last_error_at))
        .then_with(|| a.word_id.cmp(&b.word_id))
}

/// Builds error-first review queues. Read-only.
#[derive(Clone)]
pub struct ReviewQueueBuilder {
    storage: Storage,
    clock: Arc<dyn Clock>,
}

impl ReviewQueueBuilder {
    pub fn new(storage: Storage, clock: Arc<dyn Clock>) -> Self {
        Self { storage, clock }
    }

    /// An empty queue means nothing is due; it is not an error.
    pub fn build_queue(
        &self,
        student_id: &str,
        scope: &ScopeFilter,
        limit: QueueLimit,
    ) -> StorageResult<Vec<ReviewItem>> {
        let errors = self
            .storage
            .error_ledger()
            .aggregates_for_student(student_id, scope.errors_since)?;

        let mut items = match scope.mode {
            ReviewMode::Due => self.due_candidates(student_id, scope, &errors)?,
            ReviewMode::ErrorReview => self.error_candidates(student_id, scope, &errors)?,
        };

        let candidates = items.len();
        items.sort_by(queue_order);
        limit.apply(&mut items);

        tracing::debug!(
            student_id,
            mode = ?scope.mode,
            candidates,
            returned = items.len(),
            limit = %limit,
            "review queue built"
        );

        Ok(items)
    }

    fn due_candidates(
        &self,
        student_id: &str,
        scope: &ScopeFilter,
        errors: &HashMap<String, ErrorAggregate>,
    ) -> StorageResult<Vec<ReviewItem>> {
        let today = self.clock.today();
        let due = self.storage.progress().due_for_student(student_id, today)?;

        Ok(due
            .into_iter()
            .filter(|p| scope.contains(&p.word_id))
            .map(|p| {
                let aggregate = errors.get(&p.word_id);
                ReviewItem::new(p.word_id.clone(), Some(&p), aggregate)
            })
            .collect())
    }

    fn error_candidates(
        &self,
        student_id: &str,
        scope: &ScopeFilter,
        errors: &HashMap<String, ErrorAggregate>,
    ) -> StorageResult<Vec<ReviewItem>> {
        let progress: HashMap<String, WordProgress> = self
            .storage
            .progress()
            .list_for_student(student_id)?
            .into_iter()
            .map(|p| (p.word_id.clone(), p))
            .collect();

        Ok(errors
            .iter()
            .filter(|(word_id, _)| scope.contains(word_id.as_str()))
            .map(|(word_id, aggregate)| {
                ReviewItem::new(word_id.clone(), progress.get(word_id), Some(aggregate))
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::content::{CatalogWord, InMemoryContentStore};
    use crate::storage::NewErrorEvent;
    use chrono::{Duration, TimeZone};

    struct Fixture {
        storage: Storage,
        clock: Arc<FixedClock>,
        builder: ReviewQueueBuilder,
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 10, 10).unwrap()
    }

    fn fixture() -> Fixture {
        let storage = Storage::in_memory().unwrap();
        let clock = Arc::new(FixedClock::on(today()));
        let builder = ReviewQueueBuilder::new(storage.clone(), clock.clone());
        Fixture {
            storage,
            clock,
            builder,
        }
    }

    fn put_progress(storage: &Storage, word: &str, repetitions: u32, days_from_today: i64) {
        storage
            .progress()
            .upsert(&WordProgress {
                student_id: "s".to_string(),
                word_id: word.to_string(),
                repetitions,
                interval_days: 1,
                next_review_date: today() + Duration::days(days_from_today),
                updated_at: Utc.with_ymd_and_hms(2025, 10, 1, 8, 0, 0).unwrap(),
            })
            .unwrap();
    }

    fn put_errors(storage: &Storage, word: &str, count: usize, day: u32) {
        for _ in 0..count {
            storage
                .error_ledger()
                .append(&NewErrorEvent {
                    student_id: "s".to_string(),
                    word_id: word.to_string(),
                    error_type: "spelling".to_string(),
                    student_answer: "x".to_string(),
                    occurred_at: Utc.with_ymd_and_hms(2025, 10, day, 8, 0, 0).unwrap(),
                })
                .unwrap();
        }
    }

    fn ids(items: &[ReviewItem]) -> Vec<&str> {
        items.iter().map(|i| i.word_id.as_str()).collect()
    }

    #[test]
    fn test_queue_limit_parse() {
        assert_eq!("all".parse::<QueueLimit>(), Ok(QueueLimit::All));
        assert_eq!("ALL".parse::<QueueLimit>(), Ok(QueueLimit::All));
        assert_eq!("25".parse::<QueueLimit>(), Ok(QueueLimit::AtMost(25)));
        assert!("ten".parse::<QueueLimit>().is_err());
    }

    #[test]
    fn test_no_history_yields_empty_queue() {
        let f = fixture();
        let queue = f
            .builder
            .build_queue("s", &ScopeFilter::all(), QueueLimit::AtMost(10))
            .unwrap();
        assert!(queue.is_empty());
    }

    #[test]
    fn test_only_due_words_are_candidates() {
        let f = fixture();
        put_progress(&f.storage, "overdue", 1, -2);
        put_progress(&f.storage, "today", 1, 0);
        put_progress(&f.storage, "tomorrow", 1, 1);

        let queue = f
            .builder
            .build_queue("s", &ScopeFilter::all(), QueueLimit::All)
            .unwrap();
        assert_eq!(ids(&queue), vec!["overdue", "today"]);
    }

    #[test]
    fn test_error_count_ranks_before_due_date() {
        let f = fixture();
        put_progress(&f.storage, "a", 1, -5);
        put_progress(&f.storage, "b", 1, 0);
        put_errors(&f.storage, "b", 2, 3);
        put_errors(&f.storage, "a", 1, 3);

        let queue = f
            .builder
            .build_queue("s", &ScopeFilter::all(), QueueLimit::All)
            .unwrap();
        assert_eq!(ids(&queue), vec!["b", "a"]);
        assert_eq!(queue[0].error_count, 2);
    }

    #[test]
    fn test_equal_errors_fall_back_to_date_then_repetitions() {
        let f = fixture();
        put_progress(&f.storage, "late", 0, 0);
        put_progress(&f.storage, "early-strong", 4, -3);
        put_progress(&f.storage, "early-weak", 1, -3);

        let queue = f
            .builder
            .build_queue("s", &ScopeFilter::all(), QueueLimit::All)
            .unwrap();
        assert_eq!(ids(&queue), vec!["early-weak", "early-strong", "late"]);
    }

    #[test]
    fn test_limit_truncates() {
        let f = fixture();
        for i in 0..5 {
            put_progress(&f.storage, &format!("w{i}"), 1, -i);
        }
        let queue = f
            .builder
            .build_queue("s", &ScopeFilter::all(), QueueLimit::AtMost(2))
            .unwrap();
        assert_eq!(ids(&queue), vec!["w4", "w3"]);
    }

    #[test]
    fn test_scope_restricts_candidates() {
        let f = fixture();
        put_progress(&f.storage, "in-scope", 1, 0);
        put_progress(&f.storage, "out-of-scope", 1, 0);

        let queue = f
            .builder
            .build_queue("s", &ScopeFilter::words(["in-scope"]), QueueLimit::All)
            .unwrap();
        assert_eq!(ids(&queue), vec!["in-scope"]);
    }

    #[test]
    fn test_scope_from_content_list() {
        let f = fixture();
        put_progress(&f.storage, "1", 1, 0);
        put_progress(&f.storage, "2", 1, 0);
        let content = InMemoryContentStore::from_words([
            CatalogWord {
                word_id: "1".to_string(),
                spelling: "apple".to_string(),
                list_id: Some("unit-1".to_string()),
            },
            CatalogWord {
                word_id: "2".to_string(),
                spelling: "pear".to_string(),
                list_id: Some("unit-2".to_string()),
            },
        ]);

        let scope = ScopeFilter::for_list(&content, "unit-2");
        let queue = f.builder.build_queue("s", &scope, QueueLimit::All).unwrap();
        assert_eq!(ids(&queue), vec!["2"]);
    }

    #[test]
    fn test_error_review_ignores_due_date() {
        let f = fixture();
        put_progress(&f.storage, "future-error", 3, 30);
        put_progress(&f.storage, "due-clean", 1, 0);
        put_errors(&f.storage, "future-error", 1, 5);
        put_errors(&f.storage, "orphan-error", 3, 6);

        let queue = f
            .builder
            .build_queue("s", &ScopeFilter::all().error_review(), QueueLimit::All)
            .unwrap();
        assert_eq!(ids(&queue), vec!["orphan-error", "future-error"]);

        let orphan = &queue[0];
        assert_eq!(orphan.next_review_date, None);
        assert_eq!(orphan.repetitions, 0);
        assert_eq!(orphan.interval_days, 1);
    }

    #[test]
    fn test_error_review_time_bound() {
        let f = fixture();
        put_errors(&f.storage, "old", 4, 1);
        put_errors(&f.storage, "recent", 1, 8);

        let since = Utc.with_ymd_and_hms(2025, 10, 5, 0, 0, 0).unwrap();
        let scope = ScopeFilter::all().error_review().errors_since(since);
        let queue = f.builder.build_queue("s", &scope, QueueLimit::All).unwrap();
        assert_eq!(ids(&queue), vec!["recent"]);
    }

    #[test]
    fn test_error_review_time_bound_within_one_second() {
        let f = fixture();
        let at = |millis| {
            today()
                .and_hms_milli_opt(9, 0, 0, millis)
                .unwrap()
                .and_utc()
        };
        f.storage
            .error_ledger()
            .append(&NewErrorEvent {
                student_id: "s".to_string(),
                word_id: "w".to_string(),
                error_type: "spelling".to_string(),
                student_answer: "x".to_string(),
                occurred_at: at(200),
            })
            .unwrap();

        let after = ScopeFilter::all().error_review().errors_since(at(700));
        assert!(f.builder.build_queue("s", &after, QueueLimit::All).unwrap().is_empty());

        let before = ScopeFilter::all().error_review().errors_since(at(200));
        assert_eq!(f.builder.build_queue("s", &before, QueueLimit::All).unwrap().len(), 1);
    }

    #[test]
    fn test_queue_is_idempotent() {
        let f = fixture();
        put_progress(&f.storage, "a", 1, 0);
        put_progress(&f.storage, "b", 1, 0);
        put_progress(&f.storage, "c", 2, -1);
        put_errors(&f.storage, "a", 1, 2);
        put_errors(&f.storage, "b", 1, 2);

        let first = f
            .builder
            .build_queue("s", &ScopeFilter::all(), QueueLimit::All)
            .unwrap();
        let second = f
            .builder
            .build_queue("s", &ScopeFilter::all(), QueueLimit::All)
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(ids(&first), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_due_evaluated_against_clock() {
        let f = fixture();
        put_progress(&f.storage, "next-week", 2, 7);
        assert!(f
            .builder
            .build_queue("s", &ScopeFilter::all(), QueueLimit::All)
            .unwrap()
            .is_empty());

        f.clock.advance_days(7);
        let queue = f
            .builder
            .build_queue("s", &ScopeFilter::all(), QueueLimit::All)
            .unwrap();
        assert_eq!(ids(&queue), vec!["next-week"]);
    }
}
