//! 掌握进度数据库操作模块
//!
//! 提供 WordProgress 的读写和按学生查询，纯数据访问，不包含调度逻辑。

use chrono::NaiveDate;
use rusqlite::{params, Connection};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::storage::models::{format_date, WordProgress};
use crate::storage::{StorageError, StorageResult};

// ============================================================
// ProgressStore - 进度仓储
// ============================================================

/// 进度仓储
pub struct ProgressStore {
    conn: Arc<Mutex<Connection>>,
}

impl ProgressStore {
    /// 创建新的仓储实例
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    // ========== 基本操作 ==========

    /// 获取单条进度
    ///
    /// # Returns
    /// * `Option<WordProgress>` - 不存在时返回 None（从未测试过）
    pub fn get(&self, student_id: &str, word_id: &str) -> StorageResult<Option<WordProgress>> {
        let conn = self.get_connection()?;
        WordProgress::find(&conn, student_id, word_id)
    }

    /// 保存进度 (插入或更新)
    pub fn upsert(&self, progress: &WordProgress) -> StorageResult<()> {
        let conn = self.get_connection()?;
        progress.upsert(&conn)
    }

    // ========== 查询方法 ==========

    /// 获取学生的所有进度，按单词 ID 排序
    pub fn list_for_student(&self, student_id: &str) -> StorageResult<Vec<WordProgress>> {
        let conn = self.get_connection()?;

        let mut stmt =
            conn.prepare("SELECT * FROM word_progress WHERE student_id = ?1 ORDER BY word_id ASC")?;

        let rows = stmt
            .query_map(params![student_id], |row| WordProgress::from_row(row))?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(rows)
    }

    /// 获取到期的进度
    ///
    /// 返回 next_review_date <= today 的记录，最久未复习的在前
    pub fn due_for_student(
        &self,
        student_id: &str,
        today: NaiveDate,
    ) -> StorageResult<Vec<WordProgress>> {
        let conn = self.get_connection()?;

        let mut stmt = conn.prepare(
            r#"
            SELECT * FROM word_progress
            WHERE student_id = ?1
                AND next_review_date <= ?2
            ORDER BY next_review_date ASC, repetitions ASC, word_id ASC
            "#,
        )?;

        let rows = stmt
            .query_map(params![student_id, format_date(today)], |row| {
                WordProgress::from_row(row)
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(rows)
    }

    /// 获取最近学过的单词
    ///
    /// 只包含 repetitions > 0 的记录，按下次复习日期倒序
    pub fn recent_learned(&self, student_id: &str, limit: u32) -> StorageResult<Vec<WordProgress>> {
        let conn = self.get_connection()?;

        let mut stmt = conn.prepare(
            r#"
            SELECT * FROM word_progress
            WHERE student_id = ?1 AND repetitions > 0
            ORDER BY next_review_date DESC, word_id ASC
            LIMIT ?2
            "#,
        )?;

        let rows = stmt
            .query_map(params![student_id, limit], |row| WordProgress::from_row(row))?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(rows)
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
