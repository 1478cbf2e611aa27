// ==========================================
// 表格数据导入系统 - 配置管理器
// ==========================================
// 职责: 配置加载与查询、映射模板管理
// 存储: config_kv 表 (key-value + scope)
// ==========================================

use crate::config::import_config_trait::ImportConfigReader;
use crate::db::open_sqlite_connection;
use crate::domain::import::{ColumnMapping, MappingTemplate};
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection};
use std::error::Error;
use std::sync::{Arc, Mutex};

/// 映射模板的键前缀（config_kv 内独立命名空间）
const TEMPLATE_KEY_PREFIX: &str = "mapping_template/";

// ==========================================
// ConfigManager - 配置管理器
// ==========================================
pub struct ConfigManager {
    conn: Arc<Mutex<Connection>>,
}

impl ConfigManager {
    /// 创建新的 ConfigManager 实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: &str) -> Result<Self, Box<dyn Error>> {
        let conn = open_sqlite_connection(db_path)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建 ConfigManager
    ///
    /// 说明：为保证连接行为一致，会对传入连接再次应用统一 PRAGMA（幂等）。
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Result<Self, Box<dyn Error>> {
        {
            let conn_guard = conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
            crate::db::configure_sqlite_connection(&conn_guard)?;
        }

        Ok(Self { conn })
    }

    /// 从 config_kv 表读取配置值（scope_id='global'）
    ///
    /// # 返回
    /// - Some(String): 配置值
    /// - None: 配置不存在
    fn get_config_value(&self, key: &str) -> Result<Option<String>, Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        let result = conn.query_row(
            "SELECT value FROM config_kv WHERE scope_id = 'global' AND key = ?1",
            params![key],
            |row| row.get::<_, String>(0),
        );

        match result {
            Ok(value) => Ok(Some(value)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(Box::new(e)),
        }
    }

    /// 写入 global scope 的配置值（测试与管理界面用）
    pub fn set_config_value(&self, key: &str, value: &str) -> Result<(), Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        conn.execute(
            r#"
            INSERT OR REPLACE INTO config_kv (scope_id, key, value, updated_at)
            VALUES ('global', ?1, ?2, ?3)
            "#,
            params![key, value, Utc::now().to_rfc3339()],
        )?;

        Ok(())
    }

    /// 读取数值配置，缺失或非法时取默认值
    fn get_u64_or_default(&self, key: &str, default: u64) -> Result<u64, Box<dyn Error>> {
        Ok(self
            .get_config_value(key)?
            .and_then(|v| v.trim().parse::<u64>().ok())
            .unwrap_or(default))
    }

    // ==========================================
    // 映射模板管理
    // ==========================================

    /// 保存命名映射模板（同名覆盖）
    pub fn save_mapping_template(
        &self,
        name: &str,
        table: &str,
        mapping: &ColumnMapping,
    ) -> Result<MappingTemplate, Box<dyn Error>> {
        let name = name.trim();
        if name.is_empty() {
            return Err("模板名不能为空".into());
        }

        let template = MappingTemplate {
            name: name.to_string(),
            table: table.to_string(),
            mapping: mapping.clone(),
            created_at: Utc::now(),
        };

        let key = format!("{}{}", TEMPLATE_KEY_PREFIX, name);
        self.set_config_value(&key, &serde_json::to_string(&template)?)?;

        Ok(template)
    }

    /// 读取命名映射模板
    pub fn load_mapping_template(
        &self,
        name: &str,
    ) -> Result<Option<MappingTemplate>, Box<dyn Error>> {
        let key = format!("{}{}", TEMPLATE_KEY_PREFIX, name.trim());
        let raw = match self.get_config_value(&key)? {
            Some(v) => v,
            None => return Ok(None),
        };

        let template: MappingTemplate = serde_json::from_str(&raw)?;
        Ok(Some(template))
    }

    /// 列出全部映射模板（按名称排序）
    pub fn list_mapping_templates(&self) -> Result<Vec<MappingTemplate>, Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        let mut stmt = conn.prepare(
            r#"
            SELECT value FROM config_kv
            WHERE scope_id = 'global' AND key LIKE ?1
            ORDER BY key
            "#,
        )?;

        let raw_values = stmt
            .query_map(params![format!("{}%", TEMPLATE_KEY_PREFIX)], |row| {
                row.get::<_, String>(0)
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut templates = Vec::with_capacity(raw_values.len());
        for raw in raw_values {
            templates.push(serde_json::from_str(&raw)?);
        }

        Ok(templates)
    }

    /// 删除命名映射模板（不存在时为空操作）
    pub fn delete_mapping_template(&self, name: &str) -> Result<(), Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        conn.execute(
            "DELETE FROM config_kv WHERE scope_id = 'global' AND key = ?1",
            params![format!("{}{}", TEMPLATE_KEY_PREFIX, name.trim())],
        )?;

        Ok(())
    }
}

#[async_trait]
impl ImportConfigReader for ConfigManager {
    /// 获取可用内存下限（MB），默认 32
    async fn get_memory_floor_mb(&self) -> Result<u64, Box<dyn Error>> {
        self.get_u64_or_default("import_memory_floor_mb", 32)
    }

    /// 获取导入锁 TTL（秒），默认 3600
    async fn get_lock_ttl_secs(&self) -> Result<u64, Box<dyn Error>> {
        self.get_u64_or_default("import_lock_ttl_secs", 3600)
    }

    /// 获取运行状态 TTL（秒），默认 3600
    async fn get_state_ttl_secs(&self) -> Result<u64, Box<dyn Error>> {
        self.get_u64_or_default("import_state_ttl_secs", 3600)
    }

    /// 是否在任一行失败时回滚整个批次，默认 false
    async fn get_abort_batch_on_row_failure(&self) -> Result<bool, Box<dyn Error>> {
        Ok(self
            .get_config_value("import_abort_batch_on_row_failure")?
            .map(|v| matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
            .unwrap_or(false))
    }
}
