use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::clock::Clock;
use crate::storage::{Storage, StorageResult, WordProgress};

/// Display level derived from a word's repetition count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MasteryBucket {
    Unfamiliar,
    Beginner,
    Familiar,
    Mastered,
    Expert,
}

impl MasteryBucket {
    pub const ALL: [MasteryBucket; 5] = [
        MasteryBucket::Unfamiliar,
        MasteryBucket::Beginner,
        MasteryBucket::Familiar,
        MasteryBucket::Mastered,
        MasteryBucket::Expert,
    ];

    pub fn label(self) -> &'static str {
        match self {
            MasteryBucket::Unfamiliar => "未学习",
            MasteryBucket::Beginner => "初学",
            MasteryBucket::Familiar => "熟悉",
            MasteryBucket::Mastered => "掌握",
            MasteryBucket::Expert => "精通",
        }
    }
}

impl fmt::Display for MasteryBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Repetition thresholds for each bucket. Every caller that needs a mastery
/// level goes through this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MasteryBucketPolicy {
    /// Upper bound (inclusive) of `Familiar`.
    pub familiar_max: u32,
    /// Upper bound (inclusive) of `Mastered`.
    pub mastered_max: u32,
}

impl MasteryBucketPolicy {
    pub const CANONICAL: MasteryBucketPolicy = MasteryBucketPolicy {
        familiar_max: 3,
        mastered_max: 10,
    };

    pub fn bucket_for(&self, repetitions: u32) -> MasteryBucket {
        match repetitions {
            0 => MasteryBucket::Unfamiliar,
            1 => MasteryBucket::Beginner,
            r if r <= self.familiar_max => MasteryBucket::Familiar,
            r if r <= self.mastered_max => MasteryBucket::Mastered,
            _ => MasteryBucket::Expert,
        }
    }
}

impl Default for MasteryBucketPolicy {
    fn default() -> Self {
        Self::CANONICAL
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProgressSummary {
    pub total_words: usize,
    /// Words with at least one successful repetition.
    pub learned_words: usize,
    pub due_words: usize,
    pub avg_interval: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StreakStats {
    pub tested_words: usize,
    pub learned_words: usize,
    pub longest_streak: u32,
    pub average_streak: f64,
}

/// Learned words last studied on one calendar day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudyDay {
    pub study_date: NaiveDate,
    pub words_studied: usize,
}

/// Days covered by [`MasteryReporter::weekly_stats`], today included.
pub const WEEKLY_WINDOW_DAYS: i64 = 7;

/// Read-only dashboard projections over a student's progress rows.
#[derive(Clone)]
pub struct MasteryReporter {
    storage: Storage,
    clock: Arc<dyn Clock>,
    policy: MasteryBucketPolicy,
}

impl MasteryReporter {
    pub fn new(storage: Storage, clock: Arc<dyn Clock>) -> Self {
        Self {
            storage,
            clock,
            policy: MasteryBucketPolicy::CANONICAL,
        }
    }

    pub fn with_policy(mut self, policy: MasteryBucketPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> MasteryBucketPolicy {
        self.policy
    }

    /// Count of words per bucket. Every bucket is present, with zero for
    /// empty ones.
    pub fn distribution_for(&self, student_id: &str) -> StorageResult<BTreeMap<MasteryBucket, usize>> {
        let rows = self.storage.progress().list_for_student(student_id)?;

        let mut distribution: BTreeMap<MasteryBucket, usize> =
            MasteryBucket::ALL.iter().map(|b| (*b, 0)).collect();
        for row in &rows {
            *distribution
                .entry(self.policy.bucket_for(row.repetitions))
                .or_insert(0) += 1;
        }

        Ok(distribution)
    }

    pub fn progress_summary(&self, student_id: &str) -> StorageResult<ProgressSummary> {
        let rows = self.storage.progress().list_for_student(student_id)?;
        let today = self.clock.today();

        let total_words = rows.len();
        let learned_words = rows.iter().filter(|p| p.repetitions > 0).count();
        let due_words = rows.iter().filter(|p| p.is_due(today)).count();
        let avg_interval = round1(mean(rows.iter().map(|p| p.interval_days)));

        Ok(ProgressSummary {
            total_words,
            learned_words,
            due_words,
            avg_interval,
        })
    }

    pub fn streak_stats(&self, student_id: &str) -> StorageResult<StreakStats> {
        let rows = self.storage.progress().list_for_student(student_id)?;

        Ok(StreakStats {
            tested_words: rows.len(),
            learned_words: rows.iter().filter(|p| p.repetitions > 0).count(),
            longest_streak: rows.iter().map(|p| p.repetitions).max().unwrap_or(0),
            average_streak: round1(mean(rows.iter().map(|p| p.repetitions))),
        })
    }

    /// Learned words (repetitions > 0) per day over the last week, oldest day
    /// first. Each word counts on the UTC date of its last update. Days with no
    /// activity report zero.
    pub fn weekly_stats(&self, student_id: &str) -> StorageResult<Vec<StudyDay>> {
        let rows = self.storage.progress().list_for_student(student_id)?;
        let today = self.clock.today();
        let first_day = today - Duration::days(WEEKLY_WINDOW_DAYS - 1);

        let mut per_day: BTreeMap<NaiveDate, usize> = (0..WEEKLY_WINDOW_DAYS)
            .map(|offset| (first_day + Duration::days(offset), 0))
            .collect();
        for row in rows.iter().filter(|p| p.repetitions > 0) {
            if let Some(count) = per_day.get_mut(&row.updated_at.date_naive()) {
                *count += 1;
            }
        }

        Ok(per_day
            .into_iter()
            .map(|(study_date, words_studied)| StudyDay {
                study_date,
                words_studied,
            })
            .collect())
    }

    /// Most recently scheduled learned words, latest review date first.
    pub fn recent_progress(&self, student_id: &str, limit: u32) -> StorageResult<Vec<WordProgress>> {
        self.storage.progress().recent_learned(student_id, limit)
    }
}

fn mean(values: impl Iterator<Item = u32>) -> f64 {
    let (sum, count) = values.fold((0u64, 0u64), |(s, c), v| (s + u64::from(v), c + 1));
    if count == 0 {
        0.0
    } else {
        sum as f64 / count as f64
    }
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use chrono::{TimeZone, Utc};

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 1).unwrap()
    }

    fn setup() -> (Storage, MasteryReporter) {
        let storage = Storage::in_memory().unwrap();
        let clock = Arc::new(FixedClock::on(today()));
        let reporter = MasteryReporter::new(storage.clone(), clock);
        (storage, reporter)
    }

    fn put(storage: &Storage, word: &str, repetitions: u32, interval_days: u32, due_in: i64) {
        storage
            .progress()
            .upsert(&WordProgress {
                student_id: "s".to_string(),
                word_id: word.to_string(),
                repetitions,
                interval_days,
                next_review_date: today() + Duration::days(due_in),
                updated_at: Utc.with_ymd_and_hms(2025, 2, 1, 0, 0, 0).unwrap(),
            })
            .unwrap();
    }

    #[test]
    fn test_bucket_boundaries() {
        let policy = MasteryBucketPolicy::CANONICAL;
        let cases = [
            (0, MasteryBucket::Unfamiliar),
            (1, MasteryBucket::Beginner),
            (2, MasteryBucket::Familiar),
            (3, MasteryBucket::Familiar),
            (4, MasteryBucket::Mastered),
            (10, MasteryBucket::Mastered),
            (11, MasteryBucket::Expert),
            (u32::MAX, MasteryBucket::Expert),
        ];
        for (reps, bucket) in cases {
            assert_eq!(policy.bucket_for(reps), bucket, "repetitions = {reps}");
        }
    }

    #[test]
    fn test_distribution_is_zero_filled() {
        let (_storage, reporter) = setup();
        let distribution = reporter.distribution_for("nobody").unwrap();
        assert_eq!(distribution.len(), 5);
        assert!(distribution.values().all(|count| *count == 0));
    }

    #[test]
    fn test_distribution_counts() {
        let (storage, reporter) = setup();
        put(&storage, "a", 0, 1, 0);
        put(&storage, "b", 1, 1, 1);
        put(&storage, "c", 3, 15, 10);
        put(&storage, "d", 4, 37, 30);
        put(&storage, "e", 12, 365, 300);

        let distribution = reporter.distribution_for("s").unwrap();
        assert_eq!(distribution[&MasteryBucket::Unfamiliar], 1);
        assert_eq!(distribution[&MasteryBucket::Beginner], 1);
        assert_eq!(distribution[&MasteryBucket::Familiar], 1);
        assert_eq!(distribution[&MasteryBucket::Mastered], 1);
        assert_eq!(distribution[&MasteryBucket::Expert], 1);
    }

    #[test]
    fn test_custom_policy() {
        let (storage, reporter) = setup();
        put(&storage, "a", 3, 15, 10);
        let reporter = reporter.with_policy(MasteryBucketPolicy {
            familiar_max: 2,
            mastered_max: 5,
        });
        assert_eq!(reporter.distribution_for("s").unwrap()[&MasteryBucket::Mastered], 1);
    }

    #[test]
    fn test_progress_summary() {
        let (storage, reporter) = setup();
        put(&storage, "a", 0, 1, -1);
        put(&storage, "b", 2, 6, 0);
        put(&storage, "c", 3, 15, 4);

        let summary = reporter.progress_summary("s").unwrap();
        assert_eq!(summary.total_words, 3);
        assert_eq!(summary.learned_words, 2);
        assert_eq!(summary.due_words, 2);
        assert_eq!(summary.avg_interval, 7.3);
    }

    #[test]
    fn test_empty_summary() {
        let (_storage, reporter) = setup();
        let summary = reporter.progress_summary("s").unwrap();
        assert_eq!(summary.total_words, 0);
        assert_eq!(summary.avg_interval, 0.0);
    }

    #[test]
    fn test_streak_stats() {
        let (storage, reporter) = setup();
        put(&storage, "a", 0, 1, 0);
        put(&storage, "b", 2, 6, 3);
        put(&storage, "c", 5, 90, 40);

        let stats = reporter.streak_stats("s").unwrap();
        assert_eq!(stats.tested_words, 3);
        assert_eq!(stats.learned_words, 2);
        assert_eq!(stats.longest_streak, 5);
        assert_eq!(stats.average_streak, 2.3);
    }

    #[test]
    fn test_recent_progress_skips_unlearned() {
        let (storage, reporter) = setup();
        put(&storage, "a", 0, 1, 0);
        put(&storage, "b", 1, 1, 1);
        put(&storage, "c", 2, 6, 6);

        let recent = reporter.recent_progress("s", 20).unwrap();
        let ids: Vec<_> = recent.iter().map(|p| p.word_id.as_str()).collect();
        assert_eq!(ids, vec!["c", "b"]);
    }

    fn studied_on(storage: &Storage, word: &str, repetitions: u32, day: NaiveDate) {
        storage
            .progress()
            .upsert(&WordProgress {
                student_id: "s".to_string(),
                word_id: word.to_string(),
                repetitions,
                interval_days: 1,
                next_review_date: day + Duration::days(1),
                updated_at: day.and_hms_opt(18, 30, 0).unwrap().and_utc(),
            })
            .unwrap();
    }

    #[test]
    fn test_weekly_stats() {
        let (storage, reporter) = setup();
        studied_on(&storage, "a", 1, today());
        studied_on(&storage, "b", 2, today());
        studied_on(&storage, "c", 1, today() - Duration::days(2));
        studied_on(&storage, "failed", 0, today());
        studied_on(&storage, "too-old", 3, today() - Duration::days(7));

        let week = reporter.weekly_stats("s").unwrap();
        assert_eq!(week.len(), 7);
        assert_eq!(week[0].study_date, today() - Duration::days(6));
        assert_eq!(
            week[6],
            StudyDay {
                study_date: today(),
                words_studied: 2
            }
        );
        assert_eq!(week[4].words_studied, 1);
        assert_eq!(week.iter().map(|d| d.words_studied).sum::<usize>(), 3);
    }
}
