//! SQLite 存储模块
//!
//! 提供间隔重复调度所需的本地持久化：
//! - 每个 (学生, 单词) 的掌握进度 `word_progress`
//! - 只追加的错误记录 `error_events`
//! - 版本化的 schema 迁移

// ============================================================
// 子模块声明
// ============================================================

pub mod error_ledger;
pub mod migrations;
pub mod models;
pub mod progress;

// ============================================================
// 重新导出主要类型
// ============================================================

pub use error_ledger::{
    ErrorAggregate, ErrorHistoryEntry, ErrorLedger, ErrorStats, HistoryQuery, HistorySortKey,
    SortOrder,
};
pub use migrations::run_migrations;
pub use models::{ErrorEvent, NewErrorEvent, WordProgress};
pub use progress::ProgressStore;

// ============================================================
// 依赖导入
// ============================================================

use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

// ============================================================
// 错误类型定义
// ============================================================

/// 存储模块错误类型
///
/// 调用方收到任何一种错误时，本次答题都视为未记录。
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("数据库错误: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("迁移错误: {0}")]
    Migration(String),

    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),

    #[error("锁获取失败: {0}")]
    LockError(String),
}

pub type StorageResult<T> = Result<T, StorageError>;

// ============================================================
// Storage - 统一存储结构体
// ============================================================

/// 统一存储结构体
///
/// 持有共享的 SQLite 连接，提供仓储访问和事务执行。克隆成本很低，
/// 调度引擎、复习队列和统计报表共享同一个实例。
#[derive(Clone)]
pub struct Storage {
    conn: Arc<Mutex<Connection>>,
    db_path: String,
}

impl Storage {
    /// 打开（或创建）数据库文件
    ///
    /// 自动启用 WAL 模式、外键约束，并运行数据库迁移。
    ///
    /// # Arguments
    /// * `db_path` - 数据库文件路径，父目录不存在时会自动创建
    pub fn open<P: AsRef<Path>>(db_path: P) -> StorageResult<Self> {
        let path = db_path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let connection = Connection::open(path)?;

        // 启用 WAL 模式以提高并发性能
        connection.execute_batch(
            "PRAGMA journal_mode=WAL;
             PRAGMA synchronous=NORMAL;
             PRAGMA foreign_keys=ON;",
        )?;

        Self::with_connection(connection, path.to_string_lossy().to_string())
    }

    /// 创建内存数据库（用于测试）
    pub fn in_memory() -> StorageResult<Self> {
        let connection = Connection::open_in_memory()?;
        connection.execute_batch("PRAGMA foreign_keys=ON;")?;

        Self::with_connection(connection, ":memory:".to_string())
    }

    fn with_connection(connection: Connection, db_path: String) -> StorageResult<Self> {
        let conn = Arc::new(Mutex::new(connection));

        // 运行迁移
        {
            let guard = conn
                .lock()
                .map_err(|e| StorageError::LockError(e.to_string()))?;
            migrations::run_migrations(&guard)?;
        }

        Ok(Self { conn, db_path })
    }

    /// 获取数据库路径
    pub fn db_path(&self) -> &str {
        &self.db_path
    }

    /// 获取数据库连接的锁
    pub fn get_connection(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| StorageError::LockError(e.to_string()))
    }

    /// 获取进度仓储
    pub fn progress(&self) -> ProgressStore {
        ProgressStore::new(Arc::clone(&self.conn))
    }

    /// 获取错误记录仓储
    pub fn error_ledger(&self) -> ErrorLedger {
        ErrorLedger::new(Arc::clone(&self.conn))
    }

    /// 执行事务
    ///
    /// 闭包返回 `Ok` 时提交；返回 `Err` 时事务被丢弃并自动回滚，
    /// 闭包内的所有写入要么全部生效，要么全部不生效。
    ///
    /// # Example
    /// ```ignore
    /// let result = storage.transaction(|conn| {
    ///     conn.execute("INSERT INTO ...", [])?;
    ///     Ok(42)
    /// })?;
    /// ```
    pub fn transaction<F, T>(&self, f: F) -> StorageResult<T>
    where
        F: FnOnce(&Connection) -> StorageResult<T>,
    {
        let mut conn = self.get_connection()?;

        let tx = conn.transaction()?;
        let result = f(&tx)?;
        tx.commit()?;

        Ok(result)
    }
}

// ============================================================
// 测试
// ============================================================
