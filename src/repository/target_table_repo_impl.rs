// ==========================================
// 表格数据导入系统 - 目标表 Repository 实现
// ==========================================
// 职责: 实现对账写入与表元数据访问（使用 rusqlite）
// 红线: 值全部参数绑定，标识符统一引号包裹，禁止字符串拼接值
// ==========================================

use crate::db::open_sqlite_connection;
use crate::domain::import::{ColumnMeta, MappedRow, RowOutcome};
use crate::domain::types::{ImportMode, RowOutcomeKind};
use crate::repository::target_table_repo::{BatchWriteResult, TargetTableRepository};
use async_trait::async_trait;
use rusqlite::{params, Connection, ToSql};
use std::error::Error;
use std::sync::{Arc, Mutex};

// ==========================================
// TargetTableRepositoryImpl
// ==========================================
pub struct TargetTableRepositoryImpl {
    conn: Arc<Mutex<Connection>>,
}

/// SQL 标识符引号包裹（双引号转义）
fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

impl TargetTableRepositoryImpl {
    /// 创建新的 Repository 实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: &str) -> Result<Self, Box<dyn Error>> {
        let conn = open_sqlite_connection(db_path)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建（连接行为由调用方保证统一）
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// 存在性判定（连接内版本，供事务中复用）
    fn record_exists_conn(
        conn: &Connection,
        table: &str,
        row: &MappedRow,
        key_columns: &[String],
    ) -> rusqlite::Result<bool> {
        // 空键列集合: 永不匹配
        if key_columns.is_empty() {
            return Ok(false);
        }

        let where_clause = key_columns
            .iter()
            .enumerate()
            .map(|(i, col)| format!("{} = ?{}", quote_ident(col), i + 1))
            .collect::<Vec<_>>()
            .join(" AND ");

        let sql = format!(
            "SELECT COUNT(*) FROM {} WHERE {}",
            quote_ident(table),
            where_clause
        );

        let values: Vec<&dyn ToSql> = key_columns
            .iter()
            .map(|col| {
                row.get(col)
                    .map(|v| v as &dyn ToSql)
                    .unwrap_or(&rusqlite::types::Null as &dyn ToSql)
            })
            .collect();

        let count: i64 = conn.query_row(&sql, values.as_slice(), |r| r.get(0))?;
        Ok(count > 0)
    }

    /// 插入一行
    fn insert_row_conn(
        conn: &Connection,
        table: &str,
        row: &MappedRow,
    ) -> rusqlite::Result<usize> {
        let columns = row
            .columns
            .iter()
            .map(|c| quote_ident(&c.name))
            .collect::<Vec<_>>()
            .join(", ");
        let placeholders = (1..=row.columns.len())
            .map(|i| format!("?{}", i))
            .collect::<Vec<_>>()
            .join(", ");

        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote_ident(table),
            columns,
            placeholders
        );

        let values: Vec<&dyn ToSql> = row.columns.iter().map(|c| &c.value as &dyn ToSql).collect();
        conn.execute(&sql, values.as_slice())
    }

    /// 更新匹配行（键列从 SET 集合剔除）
    ///
    /// # 返回
    /// - Ok(true): 执行了 UPDATE（或无非键列可更新，视为空操作成功）
    fn update_row_conn(
        conn: &Connection,
        table: &str,
        row: &MappedRow,
        key_columns: &[String],
    ) -> rusqlite::Result<bool> {
        let set_columns: Vec<_> = row
            .columns
            .iter()
            .filter(|c| !key_columns.contains(&c.name))
            .collect();

        // 除键列外无可更新列: 空操作
        if set_columns.is_empty() {
            return Ok(true);
        }

        let set_clause = set_columns
            .iter()
            .enumerate()
            .map(|(i, c)| format!("{} = ?{}", quote_ident(&c.name), i + 1))
            .collect::<Vec<_>>()
            .join(", ");
        let where_clause = key_columns
            .iter()
            .enumerate()
            .map(|(i, col)| format!("{} = ?{}", quote_ident(col), set_columns.len() + i + 1))
            .collect::<Vec<_>>()
            .join(" AND ");

        let sql = format!(
            "UPDATE {} SET {} WHERE {}",
            quote_ident(table),
            set_clause,
            where_clause
        );

        let mut values: Vec<&dyn ToSql> =
            set_columns.iter().map(|c| &c.value as &dyn ToSql).collect();
        for col in key_columns {
            values.push(
                row.get(col)
                    .map(|v| v as &dyn ToSql)
                    .unwrap_or(&rusqlite::types::Null as &dyn ToSql),
            );
        }

        conn.execute(&sql, values.as_slice())?;
        Ok(true)
    }

    /// 单行对账写入（连接内版本）
    ///
    /// 行级失败只产生 Failed 分类，不向上传播为错误
    fn write_row_conn(
        conn: &Connection,
        table: &str,
        row: &MappedRow,
        mode: ImportMode,
        key_columns: &[String],
    ) -> rusqlite::Result<RowOutcome> {
        // update/upsert 必须能构造匹配条件: 键列缺失于值集合即失败。
        // insert 不写匹配条件，键列缺失时存在性按“无匹配”处理
        if mode != ImportMode::Insert {
            for key in key_columns {
                if !row.contains(key) {
                    return Ok(RowOutcome::failed(&format!("缺少键列: {}", key)));
                }
            }
        }

        match mode {
            ImportMode::Insert => {
                let exists = key_columns.iter().all(|k| row.contains(k))
                    && Self::record_exists_conn(conn, table, row, key_columns)?;
                if exists {
                    return Ok(RowOutcome::skipped("记录已存在"));
                }
                match Self::insert_row_conn(conn, table, row) {
                    Ok(_) => Ok(RowOutcome::inserted()),
                    Err(e) => Ok(RowOutcome::failed(&format!("插入失败: {}", e))),
                }
            }
            ImportMode::Update => {
                if !Self::record_exists_conn(conn, table, row, key_columns)? {
                    return Ok(RowOutcome::skipped("记录不存在"));
                }
                match Self::update_row_conn(conn, table, row, key_columns) {
                    Ok(_) => Ok(RowOutcome::updated()),
                    Err(e) => Ok(RowOutcome::failed(&format!("更新失败: {}", e))),
                }
            }
            ImportMode::Upsert => {
                if Self::record_exists_conn(conn, table, row, key_columns)? {
                    match Self::update_row_conn(conn, table, row, key_columns) {
                        Ok(_) => Ok(RowOutcome::updated()),
                        Err(e) => Ok(RowOutcome::failed(&format!("更新失败: {}", e))),
                    }
                } else {
                    match Self::insert_row_conn(conn, table, row) {
                        Ok(_) => Ok(RowOutcome::inserted()),
                        Err(e) => Ok(RowOutcome::failed(&format!("插入失败: {}", e))),
                    }
                }
            }
        }
    }
}

#[async_trait]
impl TargetTableRepository for TargetTableRepositoryImpl {
    /// 检查目标表是否存在
    async fn table_exists(&self, table: &str) -> Result<bool, Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
            params![table],
            |row| row.get(0),
        )?;

        Ok(count > 0)
    }

    /// 读取目标表列元数据（PRAGMA table_info）
    async fn table_columns(&self, table: &str) -> Result<Vec<ColumnMeta>, Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        let sql = format!("PRAGMA table_info({})", quote_ident(table));
        let mut stmt = conn.prepare(&sql)?;

        let columns = stmt
            .query_map([], |row| {
                let name: String = row.get(1)?;
                let sql_type: String = row.get(2)?;
                let notnull: i64 = row.get(3)?;
                let dflt_value: Option<String> = row.get(4)?;
                let pk: i64 = row.get(5)?;

                // INTEGER PRIMARY KEY 在 SQLite 中是 rowid 别名（自动分配）
                let is_auto_increment = pk > 0 && sql_type.eq_ignore_ascii_case("INTEGER");

                Ok(ColumnMeta {
                    name,
                    sql_type,
                    nullable: notnull == 0,
                    has_default: dflt_value.is_some(),
                    is_key: pk > 0,
                    is_auto_increment,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        if columns.is_empty() {
            return Err(format!("目标表不存在: {}", table).into());
        }

        Ok(columns)
    }

    /// 判断记录是否已存在
    async fn record_exists(
        &self,
        table: &str,
        row: &MappedRow,
        key_columns: &[String],
    ) -> Result<bool, Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        Ok(Self::record_exists_conn(&conn, table, row, key_columns)?)
    }

    /// 写入单行（独立小事务）
    async fn write_row(
        &self,
        table: &str,
        row: &MappedRow,
        mode: ImportMode,
        key_columns: &[String],
    ) -> Result<RowOutcome, Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
        let tx = conn.unchecked_transaction()?;

        let outcome = Self::write_row_conn(&tx, table, row, mode, key_columns)?;

        tx.commit()?;
        Ok(outcome)
    }

    /// 在单个事务中写入一个批次
    async fn write_batch(
        &self,
        table: &str,
        rows: &[(u64, MappedRow)],
        mode: ImportMode,
        key_columns: &[String],
        abort_on_failure: bool,
    ) -> Result<BatchWriteResult, Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
        let tx = conn.unchecked_transaction()?;

        let mut outcomes: Vec<(u64, RowOutcome)> = Vec::with_capacity(rows.len());
        let mut abort = false;

        for (row_number, row) in rows {
            let outcome = Self::write_row_conn(&tx, table, row, mode, key_columns)?;
            let failed = outcome.kind == RowOutcomeKind::Failed;
            outcomes.push((*row_number, outcome));

            if failed && abort_on_failure {
                abort = true;
                break;
            }
        }

        if abort {
            tx.rollback()?;

            // 整体回滚: 已处理行保留原始失败明细，其余行统一标记
            let outcomes = rows
                .iter()
                .map(|(row_number, _)| {
                    let original = outcomes
                        .iter()
                        .find(|(n, o)| n == row_number && o.kind == RowOutcomeKind::Failed);
                    match original {
                        Some((_, o)) => (*row_number, o.clone()),
                        None => (*row_number, RowOutcome::failed("批次整体回滚")),
                    }
                })
                .collect();

            return Ok(BatchWriteResult {
                outcomes,
                committed: false,
            });
        }

        // 默认策略: 行级失败不触发回滚，批次末尾无条件提交
        tx.commit()?;

        Ok(BatchWriteResult {
            outcomes,
            committed: true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_ident_escapes_quotes() {
        assert_eq!(quote_ident("users"), "\"users\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }
}
