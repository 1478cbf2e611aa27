// ==========================================
// 表格数据导入系统 - 目标表 Repository Trait
// ==========================================
// 职责: 定义对账写入与表元数据访问接口（不包含实现）
// 红线: Repository 不含业务规则，只做数据 CRUD
// ==========================================

use crate::domain::import::{ColumnMeta, MappedRow, RowOutcome};
use crate::domain::types::ImportMode;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::error::Error;

// ==========================================
// BatchWriteResult - 批次写入结果
// ==========================================
// outcomes 与输入行一一对应（携带绝对行号）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchWriteResult {
    pub outcomes: Vec<(u64, RowOutcome)>,
    pub committed: bool, // abort-on-failure 策略回滚时为 false
}

// ==========================================
// TargetTableRepository Trait
// ==========================================
// 用途: 目标表对账（存在性判定 + insert/update/upsert）与列元数据
// 实现者: TargetTableRepositoryImpl（使用 rusqlite，全部参数绑定）
#[async_trait]
pub trait TargetTableRepository: Send + Sync {
    // ===== 表元数据 =====

    /// 检查目标表是否存在
    async fn table_exists(&self, table: &str) -> Result<bool, Box<dyn Error>>;

    /// 读取目标表列元数据
    ///
    /// # 返回
    /// - Ok(Vec<ColumnMeta>): 按定义顺序的列元数据
    /// - Err: 表不存在或查询失败
    async fn table_columns(&self, table: &str) -> Result<Vec<ColumnMeta>, Box<dyn Error>>;

    // ===== 对账 =====

    /// 判断记录是否已存在（所有键列 AND 连接等值匹配）
    ///
    /// # 返回
    /// - Ok(true): 存在匹配行
    /// - Ok(false): 无匹配；键列集合为空时恒为 false
    async fn record_exists(
        &self,
        table: &str,
        row: &MappedRow,
        key_columns: &[String],
    ) -> Result<bool, Box<dyn Error>>;

    /// 写入单行并返回结果分类
    ///
    /// # 说明
    /// - insert: 已存在 → skipped；约束违反 → failed
    /// - update: 不存在 → skipped；键列从 SET 集合中剔除（键不可覆写）
    /// - upsert: 存在则 update，否则 insert，永不 skipped
    /// - update/upsert 下键列缺失于值集合 → failed（无法构造匹配条件，
    ///   消息指明缺失键名）；insert 不需匹配条件，按不存在处理
    async fn write_row(
        &self,
        table: &str,
        row: &MappedRow,
        mode: ImportMode,
        key_columns: &[String],
    ) -> Result<RowOutcome, Box<dyn Error>>;

    /// 在单个事务中写入一个批次
    ///
    /// # 参数
    /// - rows: (绝对行号, 映射记录) 有序列表
    /// - abort_on_failure: false=行级失败继续并无条件提交；
    ///   true=任一行失败即整体回滚，该批次所有行报告 failed
    async fn write_batch(
        &self,
        table: &str,
        rows: &[(u64, MappedRow)],
        mode: ImportMode,
        key_columns: &[String],
        abort_on_failure: bool,
    ) -> Result<BatchWriteResult, Box<dyn Error>>;
}
