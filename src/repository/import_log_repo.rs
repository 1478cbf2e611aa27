// ==========================================
// 表格数据导入系统 - 导入日志 Repository
// ==========================================
// 职责: import_log 表的写入与查询（每次运行一条，只追加）
// 红线: 日志记录插入后不可变更
// ==========================================

use crate::db::open_sqlite_connection;
use crate::domain::import::ImportLogRecord;
use crate::domain::types::RunStatus;
use async_trait::async_trait;
use rusqlite::{params, Connection};
use std::error::Error;
use std::sync::{Arc, Mutex};

// ==========================================
// ImportLogRepository Trait
// ==========================================
// 用途: 运行终态的持久化审计记录
// 实现者: ImportLogRepositoryImpl（使用 rusqlite）
#[async_trait]
pub trait ImportLogRepository: Send + Sync {
    /// 插入一条导入日志
    ///
    /// # 返回
    /// - Ok(i64): 新记录的自增 ID
    async fn insert_log(&self, record: &ImportLogRecord) -> Result<i64, Box<dyn Error>>;

    /// 查询最近的导入日志
    ///
    /// # 参数
    /// - limit: 返回记录数限制
    async fn recent_logs(&self, limit: usize) -> Result<Vec<ImportLogRecord>, Box<dyn Error>>;

    /// 查询指定操作员的导入日志（按导入时间倒序）
    async fn logs_for_user(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<ImportLogRecord>, Box<dyn Error>>;
}

// ==========================================
// ImportLogRepositoryImpl
// ==========================================
pub struct ImportLogRepositoryImpl {
    conn: Arc<Mutex<Connection>>,
}

impl ImportLogRepositoryImpl {
    /// 创建新的 Repository 实例并确保 import_log 表就绪
    pub fn new(db_path: &str) -> Result<Self, Box<dyn Error>> {
        let conn = open_sqlite_connection(db_path)?;
        Self::ensure_schema(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Result<Self, Box<dyn Error>> {
        {
            let guard = conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
            Self::ensure_schema(&guard)?;
        }
        Ok(Self { conn })
    }

    fn ensure_schema(conn: &Connection) -> rusqlite::Result<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS import_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id TEXT NOT NULL,
                import_date TEXT NOT NULL,
                file_name TEXT NOT NULL,
                table_name TEXT NOT NULL,
                total_rows INTEGER NOT NULL,
                inserted INTEGER NOT NULL,
                updated INTEGER NOT NULL,
                skipped INTEGER NOT NULL,
                failed INTEGER NOT NULL,
                error_log TEXT,
                status TEXT NOT NULL,
                duration INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_import_log_user_date
                ON import_log (user_id, import_date);
            CREATE INDEX IF NOT EXISTS idx_import_log_status
                ON import_log (status);
            "#,
        )
    }

    fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<ImportLogRecord> {
        let status_raw: String = row.get(11)?;
        Ok(ImportLogRecord {
            id: Some(row.get(0)?),
            user_id: row.get(1)?,
            import_date: chrono::DateTime::parse_from_rfc3339(&row.get::<_, String>(2)?)
                .map(|dt| dt.with_timezone(&chrono::Utc))
                .unwrap_or_else(|_| chrono::Utc::now()),
            file_name: row.get(3)?,
            table_name: row.get(4)?,
            total_rows: row.get::<_, i64>(5)? as u64,
            inserted: row.get::<_, i64>(6)? as u64,
            updated: row.get::<_, i64>(7)? as u64,
            skipped: row.get::<_, i64>(8)? as u64,
            failed: row.get::<_, i64>(9)? as u64,
            error_log: row.get(10)?,
            status: RunStatus::parse(&status_raw).unwrap_or(RunStatus::Failed),
            duration_secs: row.get(12)?,
        })
    }
}

#[async_trait]
impl ImportLogRepository for ImportLogRepositoryImpl {
    /// 插入一条导入日志
    async fn insert_log(&self, record: &ImportLogRecord) -> Result<i64, Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        conn.execute(
            r#"
            INSERT INTO import_log (
                user_id, import_date, file_name, table_name,
                total_rows, inserted, updated, skipped, failed,
                error_log, status, duration
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            "#,
            params![
                record.user_id,
                record.import_date.to_rfc3339(),
                record.file_name,
                record.table_name,
                record.total_rows as i64,
                record.inserted as i64,
                record.updated as i64,
                record.skipped as i64,
                record.failed as i64,
                record.error_log,
                record.status.to_string(),
                record.duration_secs,
            ],
        )?;

        Ok(conn.last_insert_rowid())
    }

    /// 查询最近的导入日志
    async fn recent_logs(&self, limit: usize) -> Result<Vec<ImportLogRecord>, Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        let mut stmt = conn.prepare(
            r#"
            SELECT id, user_id, import_date, file_name, table_name,
                   total_rows, inserted, updated, skipped, failed,
                   error_log, status, duration
            FROM import_log
            ORDER BY import_date DESC
            LIMIT ?1
            "#,
        )?;

        let logs = stmt
            .query_map(params![limit], Self::row_to_record)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(logs)
    }

    /// 查询指定操作员的导入日志
    async fn logs_for_user(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<ImportLogRecord>, Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        let mut stmt = conn.prepare(
            r#"
            SELECT id, user_id, import_date, file_name, table_name,
                   total_rows, inserted, updated, skipped, failed,
                   error_log, status, duration
            FROM import_log
            WHERE user_id = ?1
            ORDER BY import_date DESC
            LIMIT ?2
            "#,
        )?;

        let logs = stmt
            .query_map(params![user_id, limit], Self::row_to_record)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(logs)
    }
}
