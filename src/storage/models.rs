//! 数据模型定义
//!
//! 定义调度子系统持久化的两类记录，以及与数据库交互的方法。

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Result as SqliteResult, Row};
use serde::{Deserialize, Serialize};

use crate::storage::StorageResult;

/// 日期存储格式
pub(crate) const DATE_FORMAT: &str = "%Y-%m-%d";
/// 时间戳存储格式 (UTC)
///
/// 固定 9 位纳秒，字符串顺序与时间顺序一致，读回的值与写入的值完全相等。
pub(crate) const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.9f";
/// 时间戳解析格式，小数部分可省略（兼容只精确到秒的旧记录）
const DATETIME_PARSE_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

// ============================================================
// WordProgress - 单词掌握进度
// ============================================================

/// 单词掌握进度
///
/// 每个 (student_id, word_id) 一条记录，复合主键不可变。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WordProgress {
    /// 学生 ID
    pub student_id: String,
    /// 单词 ID（引用外部词库）
    pub word_id: String,
    /// 自上次遗忘以来连续记住的次数
    pub repetitions: u32,
    /// 距离下次复习的天数 (1..=365)
    pub interval_days: u32,
    /// 下次复习日期 = 最近一次更新当天 + interval_days
    pub next_review_date: NaiveDate,
    /// 最近一次更新时间
    pub updated_at: DateTime<Utc>,
}

impl WordProgress {
    /// 从数据库行解析
    pub fn from_row(row: &Row) -> SqliteResult<Self> {
        Ok(Self {
            student_id: row.get("student_id")?,
            word_id: row.get("word_id")?,
            repetitions: row.get("repetitions")?,
            interval_days: row.get("interval_days")?,
            next_review_date: parse_date(row, "next_review_date")?,
            updated_at: parse_datetime(row, "updated_at")?,
        })
    }

    /// 查询单条进度
    ///
    /// 没有记录时返回 `None`，表示该单词从未被测试过。
    pub fn find(conn: &Connection, student_id: &str, word_id: &str) -> StorageResult<Option<Self>> {
        let progress = conn
            .query_row(
                "SELECT * FROM word_progress WHERE student_id = ?1 AND word_id = ?2",
                params![student_id, word_id],
                |row| Self::from_row(row),
            )
            .optional()?;

        Ok(progress)
    }

    /// 插入或更新
    ///
    /// 使用 `ON CONFLICT DO UPDATE` 原地更新，不会先删除再插入。
    pub fn upsert(&self, conn: &Connection) -> StorageResult<()> {
        conn.execute(
            r#"
            INSERT INTO word_progress (
                student_id, word_id, repetitions, interval_days, next_review_date, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(student_id, word_id) DO UPDATE SET
                repetitions = excluded.repetitions,
                interval_days = excluded.interval_days,
                next_review_date = excluded.next_review_date,
                updated_at = excluded.updated_at
            "#,
            params![
                self.student_id,
                self.word_id,
                self.repetitions,
                self.interval_days,
                format_date(self.next_review_date),
                format_datetime(self.updated_at),
            ],
        )?;
        Ok(())
    }

    /// 在给定日期是否到期
    pub fn is_due(&self, today: NaiveDate) -> bool {
        self.next_review_date <= today
    }
}

// ============================================================
// ErrorEvent - 错误记录
// ============================================================

/// 错误记录（不可变）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEvent {
    /// 记录 ID (UUID)
    pub id: String,
    /// 学生 ID
    pub student_id: String,
    /// 单词 ID
    pub word_id: String,
    /// 错误分类标签，如 `spelling`、`srs_review`
    pub error_type: String,
    /// 学生的原始错误输入
    pub student_answer: String,
    /// 发生时间
    pub occurred_at: DateTime<Utc>,
}

impl ErrorEvent {
    /// 从数据库行解析
    pub fn from_row(row: &Row) -> SqliteResult<Self> {
        Ok(Self {
            id: row.get("id")?,
            student_id: row.get("student_id")?,
            word_id: row.get("word_id")?,
            error_type: row.get("error_type")?,
            student_answer: row.get("student_answer")?,
            occurred_at: parse_datetime(row, "occurred_at")?,
        })
    }

    /// 插入到数据库
    pub fn insert(&self, conn: &Connection) -> StorageResult<()> {
        conn.execute(
            r#"
            INSERT INTO error_events (
                id, student_id, word_id, error_type, student_answer, occurred_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                self.id,
                self.student_id,
                self.word_id,
                self.error_type,
                self.student_answer,
                format_datetime(self.occurred_at),
            ],
        )?;
        Ok(())
    }
}

/// 待写入的错误记录（尚未分配 ID）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewErrorEvent {
    pub student_id: String,
    pub word_id: String,
    pub error_type: String,
    pub student_answer: String,
    pub occurred_at: DateTime<Utc>,
}

impl NewErrorEvent {
    /// 分配 UUID，生成完整记录
    pub fn into_event(self) -> ErrorEvent {
        ErrorEvent {
            id: uuid::Uuid::new_v4().to_string(),
            student_id: self.student_id,
            word_id: self.word_id,
            error_type: self.error_type,
            student_answer: self.student_answer,
            occurred_at: self.occurred_at,
        }
    }
}

// ============================================================
// 辅助函数
// ============================================================

fn parse_date(row: &Row, column: &str) -> SqliteResult<NaiveDate> {
    let raw: String = row.get(column)?;
    NaiveDate::parse_from_str(&raw, DATE_FORMAT)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, Type::Text, Box::new(e)))
}

pub(crate) fn parse_datetime(row: &Row, column: &str) -> SqliteResult<DateTime<Utc>> {
    let raw: String = row.get(column)?;
    if let Ok(dt) = DateTime::parse_from_rfc3339(&raw) {
        return Ok(dt.with_timezone(&Utc));
    }

    NaiveDateTime::parse_from_str(&raw, DATETIME_PARSE_FORMAT)
        .map(|dt| DateTime::from_naive_utc_and_offset(dt, Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, Type::Text, Box::new(e)))
}

/// 格式化日期为字符串
pub(crate) fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

/// 格式化日期时间为字符串
pub(crate) fn format_datetime(dt: DateTime<Utc>) -> String {
    dt.format(DATETIME_FORMAT).to_string()
}
