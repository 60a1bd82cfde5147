//! 错误记录数据库操作模块
//!
//! 只追加的错误日志，提供：
//! - 追加写入
//! - 按单词的错误次数聚合（复习队列排序用）
//! - 错误历史与范围内的错误统计

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::storage::models::{format_datetime, parse_datetime, ErrorEvent, NewErrorEvent};
use crate::storage::{StorageError, StorageResult};

/// 单个单词的错误聚合
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorAggregate {
    /// 错误次数
    pub count: i64,
    /// 最近一次错误时间
    pub last_error_at: DateTime<Utc>,
}

/// 一组单词范围内的错误统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorStats {
    /// 出过错的不同单词数
    pub error_words_count: i64,
    /// 错误总次数
    pub total_errors: i64,
}

/// 错误历史排序字段
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistorySortKey {
    /// 按发生时间
    #[default]
    Date,
    /// 按该单词的累计错误次数
    ErrorCount,
}

/// 排序方向
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    fn sql(self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

/// 错误历史查询条件
///
/// 时间范围两端都包含在内，按 UTC 比较。
#[derive(Debug, Clone)]
pub struct HistoryQuery<'a> {
    /// 单词范围，None 表示全部
    pub word_ids: Option<&'a HashSet<String>>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub sort_by: HistorySortKey,
    pub order: SortOrder,
    pub limit: u32,
}

impl Default for HistoryQuery<'_> {
    fn default() -> Self {
        Self {
            word_ids: None,
            from: None,
            to: None,
            sort_by: HistorySortKey::Date,
            order: SortOrder::Desc,
            limit: 50,
        }
    }
}

impl<'a> HistoryQuery<'a> {
    pub fn newest(limit: u32) -> Self {
        Self {
            limit,
            ..Self::default()
        }
    }

    pub fn scoped(mut self, word_ids: &'a HashSet<String>) -> Self {
        self.word_ids = Some(word_ids);
        self
    }

    /// 从该日期 00:00:00 (UTC) 开始
    pub fn from_date(mut self, date: NaiveDate) -> Self {
        self.from = date.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc());
        self
    }

    /// 到该日期结束为止（含当天全部时间）
    pub fn through_date(mut self, date: NaiveDate) -> Self {
        self.to = date
            .and_hms_nano_opt(23, 59, 59, 999_999_999)
            .map(|dt| dt.and_utc());
        self
    }

    pub fn sorted(mut self, sort_by: HistorySortKey, order: SortOrder) -> Self {
        self.sort_by = sort_by;
        self.order = order;
        self
    }

    fn in_scope(&self, word_id: &str) -> bool {
        self.word_ids.map_or(true, |scope| scope.contains(word_id))
    }
}

/// 错误历史中的一行，附带该单词的累计错误次数
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorHistoryEntry {
    #[serde(flatten)]
    pub event: ErrorEvent,
    /// 该学生在这个单词上的全部错误次数（不受时间范围影响）
    pub error_count: i64,
}

// ============================================================
// ErrorLedger - 错误记录仓储
// ============================================================

/// 错误记录仓储
pub struct ErrorLedger {
    conn: Arc<Mutex<Connection>>,
}

impl ErrorLedger {
    /// 创建新的仓储实例
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    // ========== 写入 ==========

    /// 追加一条错误记录
    ///
    /// 单独调用时不与进度更新处于同一事务；答题流程应通过调度引擎写入。
    pub fn append(&self, event: &NewErrorEvent) -> StorageResult<ErrorEvent> {
        let conn = self.get_connection()?;
        let event = event.clone().into_event();
        event.insert(&conn)?;
        Ok(event)
    }

    // ========== 聚合查询 ==========

    /// 获取某个单词的错误次数
    ///
    /// # Arguments
    /// * `since` - 只统计该时间之后（含）的错误，None 表示全部
    pub fn count_for_word(
        &self,
        student_id: &str,
        word_id: &str,
        since: Option<DateTime<Utc>>,
    ) -> StorageResult<i64> {
        let conn = self.get_connection()?;

        let count = conn.query_row(
            r#"
            SELECT COUNT(*) FROM error_events
            WHERE student_id = ?1
                AND word_id = ?2
                AND (?3 IS NULL OR occurred_at >= ?3)
            "#,
            params![student_id, word_id, since.map(format_datetime)],
            |row| row.get(0),
        )?;

        Ok(count)
    }

    /// 按单词聚合学生的错误
    ///
    /// # Returns
    /// * `HashMap<word_id, ErrorAggregate>` - 只包含至少有一次错误的单词
    pub fn aggregates_for_student(
        &self,
        student_id: &str,
        since: Option<DateTime<Utc>>,
    ) -> StorageResult<HashMap<String, ErrorAggregate>> {
        self.aggregates_between(student_id, since, None)
    }

    /// 按单词聚合某个时间范围内的错误（两端包含）
    pub fn aggregates_between(
        &self,
        student_id: &str,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> StorageResult<HashMap<String, ErrorAggregate>> {
        let conn = self.get_connection()?;

        let mut stmt = conn.prepare(
            r#"
            SELECT word_id, COUNT(*) AS error_count, MAX(occurred_at) AS last_error_at
            FROM error_events
            WHERE student_id = ?1
                AND (?2 IS NULL OR occurred_at >= ?2)
                AND (?3 IS NULL OR occurred_at <= ?3)
            GROUP BY word_id
            "#,
        )?;

        let bounds = (from.map(format_datetime), to.map(format_datetime));
        let rows = stmt
            .query_map(params![student_id, bounds.0, bounds.1], |row| {
                Ok((
                    row.get::<_, String>("word_id")?,
                    ErrorAggregate {
                        count: row.get("error_count")?,
                        last_error_at: parse_datetime(row, "last_error_at")?,
                    },
                ))
            })?
            .collect::<Result<HashMap<_, _>, _>>()?;

        Ok(rows)
    }

    /// 获取错误历史，最新的在前
    pub fn history(&self, student_id: &str, limit: u32) -> StorageResult<Vec<ErrorEvent>> {
        let conn = self.get_connection()?;

        let mut stmt = conn.prepare(
            r#"
            SELECT * FROM error_events
            WHERE student_id = ?1
            ORDER BY occurred_at DESC, rowid DESC
            LIMIT ?2
            "#,
        )?;

        let events = stmt
            .query_map(params![student_id, limit], |row| ErrorEvent::from_row(row))?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(events)
    }

    /// 按条件查询错误历史
    ///
    /// 范围过滤在排序之后进行，`limit` 作用于过滤后的结果。
    pub fn query_history(
        &self,
        student_id: &str,
        query: &HistoryQuery<'_>,
    ) -> StorageResult<Vec<ErrorHistoryEntry>> {
        let conn = self.get_connection()?;

        let direction = query.order.sql();
        let order_by = match query.sort_by {
            HistorySortKey::Date => format!("e.occurred_at {direction}, e.rowid {direction}"),
            HistorySortKey::ErrorCount => format!(
                "word_error_count {direction}, e.occurred_at DESC, e.rowid DESC"
            ),
        };

        let sql = format!(
            r#"
            SELECT e.*,
                (SELECT COUNT(*) FROM error_events c
                 WHERE c.student_id = e.student_id AND c.word_id = e.word_id) AS word_error_count
            FROM error_events e
            WHERE e.student_id = ?1
                AND (?2 IS NULL OR e.occurred_at >= ?2)
                AND (?3 IS NULL OR e.occurred_at <= ?3)
            ORDER BY {order_by}
            "#
        );
        let mut stmt = conn.prepare(&sql)?;

        let bounds = (query.from.map(format_datetime), query.to.map(format_datetime));
        let rows = stmt
            .query_map(params![student_id, bounds.0, bounds.1], |row| {
                Ok(ErrorHistoryEntry {
                    event: ErrorEvent::from_row(row)?,
                    error_count: row.get("word_error_count")?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(rows
            .into_iter()
            .filter(|entry| query.in_scope(&entry.event.word_id))
            .take(query.limit as usize)
            .collect())
    }

    /// 按单词所属列表分组统计错误
    ///
    /// 使用查询条件中的时间范围和单词范围；`list_of` 返回 None 的单词不计入。
    pub fn stats_by_list<F>(
        &self,
        student_id: &str,
        query: &HistoryQuery<'_>,
        list_of: F,
    ) -> StorageResult<BTreeMap<String, ErrorStats>>
    where
        F: Fn(&str) -> Option<String>,
    {
        let aggregates = self.aggregates_between(student_id, query.from, query.to)?;

        let mut stats: BTreeMap<String, ErrorStats> = BTreeMap::new();
        for (word_id, aggregate) in &aggregates {
            if !query.in_scope(word_id) {
                continue;
            }
            if let Some(list_id) = list_of(word_id) {
                let entry = stats.entry(list_id).or_default();
                entry.error_words_count += 1;
                entry.total_errors += aggregate.count;
            }
        }

        Ok(stats)
    }

    /// 统计一组单词范围内的错误
    ///
    /// # Arguments
    /// * `word_ids` - 范围内的单词，None 表示学生的全部错误
    pub fn stats_for_words(
        &self,
        student_id: &str,
        word_ids: Option<&HashSet<String>>,
    ) -> StorageResult<ErrorStats> {
        let aggregates = self.aggregates_for_student(student_id, None)?;

        let stats = aggregates
            .iter()
            .filter(|(word_id, _)| word_ids.map_or(true, |scope| scope.contains(*word_id)))
            .fold(ErrorStats::default(), |mut acc, (_, aggregate)| {
                acc.error_words_count += 1;
                acc.total_errors += aggregate.count;
                acc
            });

        Ok(stats)
    }

    // ========== 辅助方法 ==========

    fn get_connection(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| StorageError::LockError(e.to_string()))
    }
}

// ============================================================
// 单元测试
// ============================================================
