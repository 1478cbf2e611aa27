// ==========================================
// 表格数据导入系统 - 进度与锁存储实现
// ==========================================
// 职责: 基于 import_state 表的 TTL 键值存储（进程外共享，
//       每次批次调用可在全新进程中挂载）
// 红线: acquire_lock 为单条条件 UPSERT，关闭先读后写的竞态窗口
// ==========================================

use crate::db::open_sqlite_connection;
use crate::repository::progress_store::ProgressStore;
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rusqlite::{params, Connection};
use std::error::Error;
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ==========================================
// ProgressStoreImpl
// ==========================================
pub struct ProgressStoreImpl {
    conn: Arc<Mutex<Connection>>,
}

impl ProgressStoreImpl {
    /// 创建新的存储实例并确保 import_state 表就绪
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
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
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS import_state (
                store_key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                expires_at TEXT NOT NULL
            )
            "#,
            [],
        )?;
        Ok(())
    }

    fn expiry(ttl: Duration) -> DateTime<Utc> {
        Utc::now() + ChronoDuration::from_std(ttl).unwrap_or_else(|_| ChronoDuration::hours(1))
    }

    /// 机会式清理过期键（防止废弃运行无界增长）
    fn purge_expired(conn: &Connection) -> rusqlite::Result<usize> {
        conn.execute(
            "DELETE FROM import_state WHERE expires_at <= ?1",
            params![Utc::now().to_rfc3339()],
        )
    }
}

#[async_trait]
impl ProgressStore for ProgressStoreImpl {
    /// 原子获取锁
    ///
    /// 单条条件 UPSERT: 键不存在直接占用；已存在时仅当 token 相同
    /// （重入续期）或已过期（抢占）才更新，否则零行受影响即失败
    async fn acquire_lock(
        &self,
        key: &str,
        token: &str,
        ttl: Duration,
    ) -> Result<bool, Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        let now = Utc::now().to_rfc3339();
        let expires_at = Self::expiry(ttl).to_rfc3339();

        let changed = conn.execute(
            r#"
            INSERT INTO import_state (store_key, value, expires_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(store_key) DO UPDATE SET
                value = excluded.value,
                expires_at = excluded.expires_at
            WHERE import_state.value = excluded.value
               OR import_state.expires_at <= ?4
            "#,
            params![key, token, expires_at, now],
        )?;

        Ok(changed == 1)
    }

    /// 释放锁
    async fn release_lock(&self, key: &str) -> Result<(), Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        conn.execute("DELETE FROM import_state WHERE store_key = ?1", params![key])?;
        Ok(())
    }

    /// 读取键值（过期视为不存在）
    async fn get(&self, key: &str) -> Result<Option<String>, Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        let result = conn.query_row(
            "SELECT value FROM import_state WHERE store_key = ?1 AND expires_at > ?2",
            params![key, Utc::now().to_rfc3339()],
            |row| row.get::<_, String>(0),
        );

        match result {
            Ok(value) => Ok(Some(value)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(Box::new(e)),
        }
    }

    /// 写入键值（覆盖语义）
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        Self::purge_expired(&conn)?;

        conn.execute(
            r#"
            INSERT OR REPLACE INTO import_state (store_key, value, expires_at)
            VALUES (?1, ?2, ?3)
            "#,
            params![key, value, Self::expiry(ttl).to_rfc3339()],
        )?;

        Ok(())
    }

    /// 删除键
    async fn delete(&self, key: &str) -> Result<(), Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        conn.execute("DELETE FROM import_state WHERE store_key = ?1", params![key])?;
        Ok(())
    }
}
