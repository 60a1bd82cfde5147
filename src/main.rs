//! danci-srs CLI: record answers and inspect review queues over the local database.

use std::collections::{BTreeMap, HashSet};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;

use danci_srs::config::Config;
use danci_srs::logging::init_tracing;
use danci_srs::srs::scheduling::DEFAULT_ERROR_TYPE;
use danci_srs::srs::{
    AnswerSubmission, Grade, GradedAnswer, MasteryReporter, QueueLimit, ReviewQueueBuilder,
    SchedulingEngine, ScopeFilter, SubmittedAnswer,
};
use danci_srs::storage::{ErrorHistoryEntry, ErrorStats, HistoryQuery, HistorySortKey, SortOrder};
use danci_srs::{Clock, ContentStore, InMemoryContentStore, Storage, SystemClock};

#[derive(Parser)]
#[command(name = "danci-srs", version, about = "Spaced-repetition scheduler for vocabulary review")]
struct Cli {
    /// SQLite database path (overrides SRS_DATABASE_PATH)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Record one graded answer
    Record {
        #[arg(long)]
        student: String,

        #[arg(long)]
        word: String,

        /// Grade on the 0-5 scale; out-of-range values are clamped
        #[arg(long, allow_hyphen_values = true)]
        grade: i64,

        /// Error type stored when the answer fails
        #[arg(long)]
        error_type: Option<String>,

        /// The answer as typed by the student
        #[arg(long, default_value = "")]
        answer: String,
    },

    /// Grade a batch of dictation answers against a word catalog
    Submit {
        #[arg(long)]
        student: String,

        /// Catalog JSON: [{"word_id", "spelling", "list_id"?}]
        #[arg(long)]
        catalog: PathBuf,

        /// Answers JSON: [{"word_id", "answer"}], "-" reads stdin
        #[arg(long, default_value = "-")]
        answers: String,
    },

    /// Build the next review queue
    Queue {
        #[arg(long)]
        student: String,

        /// Number of items, or "all"
        #[arg(long)]
        limit: Option<QueueLimit>,

        #[arg(long, value_enum, default_value_t = Mode::Due)]
        mode: Mode,

        /// Only count errors at or after this RFC 3339 timestamp
        #[arg(long)]
        since: Option<DateTime<Utc>>,

        #[command(flatten)]
        scope: ListScope,
    },

    /// Mastery distribution and progress summary
    Stats {
        #[arg(long)]
        student: String,

        #[command(flatten)]
        scope: ListScope,
    },

    /// Error history with per-word error counts
    History {
        #[arg(long)]
        student: String,

        #[arg(long, default_value = "50")]
        limit: u32,

        /// First day included (YYYY-MM-DD, UTC)
        #[arg(long)]
        from: Option<NaiveDate>,

        /// Last day included, through 23:59:59 (YYYY-MM-DD, UTC)
        #[arg(long)]
        to: Option<NaiveDate>,

        #[arg(long, value_enum, default_value_t = SortBy::Date)]
        sort_by: SortBy,

        #[arg(long, value_enum, default_value_t = Order::Desc)]
        order: Order,

        /// Catalog JSON; enables the per-list breakdown
        #[arg(long)]
        catalog: Option<PathBuf>,

        /// Restrict to the words of this list
        #[arg(long, requires = "catalog")]
        list: Option<String>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum SortBy {
    Date,
    ErrorCount,
}

impl From<SortBy> for HistorySortKey {
    fn from(value: SortBy) -> Self {
        match value {
            SortBy::Date => HistorySortKey::Date,
            SortBy::ErrorCount => HistorySortKey::ErrorCount,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum Order {
    Asc,
    Desc,
}

impl From<Order> for SortOrder {
    fn from(value: Order) -> Self {
        match value {
            Order::Asc => SortOrder::Asc,
            Order::Desc => SortOrder::Desc,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum Mode {
    Due,
    ErrorReview,
}

#[derive(clap::Args)]
struct ListScope {
    /// Catalog JSON used to resolve --list
    #[arg(long, requires = "list")]
    catalog: Option<PathBuf>,

    /// Restrict to the words of this list
    #[arg(long, requires = "catalog")]
    list: Option<String>,
}

impl ListScope {
    fn word_ids(&self) -> Result<Option<HashSet<String>>> {
        match (&self.catalog, &self.list) {
            (Some(catalog), Some(list)) => {
                let content = load_catalog(catalog)?;
                Ok(Some(content.words_in_list(list).into_iter().collect()))
            }
            _ => Ok(None),
        }
    }
}

#[derive(Serialize)]
struct HistoryOutput {
    entries: Vec<ErrorHistoryEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    list_stats: Option<BTreeMap<String, ErrorStats>>,
}

#[derive(Serialize)]
struct StatsOutput {
    distribution: Vec<BucketCount>,
    weekly: Vec<danci_srs::srs::StudyDay>,
    summary: danci_srs::srs::ProgressSummary,
    streaks: danci_srs::srs::StreakStats,
    errors: ErrorStats,
    recent: Vec<danci_srs::storage::WordProgress>,
}

#[derive(Serialize)]
struct BucketCount {
    bucket: danci_srs::srs::MasteryBucket,
    label: &'static str,
    count: usize,
}

fn main() {
    let _ = dotenvy::dotenv();
    let config = Config::from_env();
    let _log_guard = init_tracing(&config.log_level, config.log_dir.as_deref());

    let cli = Cli::parse();

    if let Err(e) = run(cli, config) {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

fn run(cli: Cli, config: Config) -> Result<()> {
    let db_path = cli.db.unwrap_or_else(|| config.database_path.clone());
    let storage = Storage::open(&db_path)
        .with_context(|| format!("failed to open database {}", db_path.display()))?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let engine =
        SchedulingEngine::new(storage.clone(), clock.clone()).with_failure_policy(config.failure_policy);

    match cli.command {
        Commands::Record {
            student,
            word,
            grade,
            error_type,
            answer,
        } => {
            let error_type = error_type.unwrap_or_else(|| DEFAULT_ERROR_TYPE.to_string());
            let graded = GradedAnswer::new(&student, &word, Grade::clamped(grade))
                .with_error_detail(error_type, answer);
            let progress = engine.record_graded_answer(&graded)?;
            print_json(&progress)
        }
        Commands::Submit {
            student,
            catalog,
            answers,
        } => {
            let content = load_catalog(&catalog)?;
            let answers: Vec<SubmittedAnswer> =
                serde_json::from_str(&read_input(&answers)?).context("invalid answers JSON")?;
            let report = AnswerSubmission::new(engine, Arc::new(content)).submit(&student, &answers)?;
            print_json(&report)
        }
        Commands::Queue {
            student,
            limit,
            mode,
            since,
            scope,
        } => {
            let mut filter = ScopeFilter {
                word_ids: scope.word_ids()?,
                ..ScopeFilter::default()
            };
            if let Mode::ErrorReview = mode {
                filter = filter.error_review();
            }
            if let Some(since) = since {
                filter = filter.errors_since(since);
            }
            let limit = limit.unwrap_or(config.default_queue_limit);
            let queue = ReviewQueueBuilder::new(storage, clock).build_queue(&student, &filter, limit)?;
            print_json(&queue)
        }
        Commands::Stats { student, scope } => {
            let word_ids = scope.word_ids()?;
            let reporter = MasteryReporter::new(storage.clone(), clock);
            let distribution = reporter
                .distribution_for(&student)?
                .into_iter()
                .map(|(bucket, count)| BucketCount {
                    bucket,
                    label: bucket.label(),
                    count,
                })
                .collect();
            let output = StatsOutput {
                distribution,
                weekly: reporter.weekly_stats(&student)?,
                summary: reporter.progress_summary(&student)?,
                streaks: reporter.streak_stats(&student)?,
                errors: storage
                    .error_ledger()
                    .stats_for_words(&student, word_ids.as_ref())?,
                recent: reporter.recent_progress(&student, 20)?,
            };
            print_json(&output)
        }
        Commands::History {
            student,
            limit,
            from,
            to,
            sort_by,
            order,
            catalog,
            list,
        } => {
            let content = catalog.as_deref().map(load_catalog).transpose()?;
            let scope: Option<HashSet<String>> = match (&content, &list) {
                (Some(content), Some(list)) => Some(content.words_in_list(list).into_iter().collect()),
                _ => None,
            };

            let mut query = HistoryQuery::newest(limit).sorted(sort_by.into(), order.into());
            if let Some(scope) = &scope {
                query = query.scoped(scope);
            }
            if let Some(from) = from {
                query = query.from_date(from);
            }
            if let Some(to) = to {
                query = query.through_date(to);
            }

            let ledger = storage.error_ledger();
            let list_stats = content
                .as_ref()
                .map(|content| ledger.stats_by_list(&student, &query, |word| content.list_of(word)))
                .transpose()?;
            let output = HistoryOutput {
                entries: ledger.query_history(&student, &query)?,
                list_stats,
            };
            print_json(&output)
        }
    }
}

fn load_catalog(path: &Path) -> Result<InMemoryContentStore> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read catalog {}", path.display()))?;
    InMemoryContentStore::from_json(&json)
        .with_context(|| format!("invalid catalog JSON in {}", path.display()))
}

fn read_input(source: &str) -> Result<String> {
    if source == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("failed to read stdin")?;
        Ok(buf)
    } else {
        std::fs::read_to_string(source).with_context(|| format!("failed to read {source}"))
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
