// ==========================================
// 表格数据导入系统 - 导入组件 Trait
// ==========================================
// 职责: 定义导入管道各组件接口（不包含实现）
// ==========================================

use crate::domain::import::{BatchReport, ColumnMapping, MappedRow};
use crate::importer::error::ImportResult;
use async_trait::async_trait;
use std::collections::HashMap;

// ==========================================
// RowSource Trait
// ==========================================
// 用途: 表格行来源（阶段 0）
// 实现者: CsvRowSource, ExcelRowSource（经 open_row_source 按扩展名分派）
// 约定: 打开时已消费表头行，next_row 只产出数据行
pub trait RowSource: Send {
    /// 表头列名（打开时解析，顺序与文件一致）
    fn headers(&self) -> &[String];

    /// 跳过最多 n 个数据行
    ///
    /// # 返回
    /// - Ok(usize): 实际跳过的行数。小于 n 表示先到了 EOF，
    ///   这是完成信号，不是错误
    fn skip_rows(&mut self, n: usize) -> ImportResult<usize>;

    /// 读取下一个数据行
    ///
    /// # 返回
    /// - Ok(Some(fields)): 字段已按表头宽度规整（截断多余、补齐缺失）
    /// - Ok(None): EOF
    fn next_row(&mut self) -> ImportResult<Option<Vec<String>>>;
}

// ==========================================
// FieldMapper Trait
// ==========================================
// 用途: 列映射与转换（阶段 1）
// 实现者: FieldMapperImpl
pub trait FieldMapper: Send + Sync {
    /// 将原始行（列名 → 值）按映射规则转换为目标记录
    ///
    /// # 参数
    /// - row: 原始行
    /// - mapping: 列映射（运行期间不可变）
    /// - allow_null: 全局 NULL 许可开关
    ///
    /// # 说明
    /// 映射本身不会失败: 源字段缺失落入默认值，默认值为空则产出
    /// 空字符串（或在双重 NULL 许可下产出 SQL NULL）
    fn map_row(
        &self,
        row: &HashMap<String, String>,
        mapping: &ColumnMapping,
        allow_null: bool,
    ) -> MappedRow;
}

// ==========================================
// BatchImporter Trait
// ==========================================
// 用途: 批次运行主接口（每次 HTTP 触发调用一次）
// 实现者: BatchRunner
#[async_trait]
pub trait BatchImporter: Send + Sync {
    /// 处理指定批次
    ///
    /// # 参数
    /// - operator: 操作员标识（锁与进度的作用域键）
    /// - batch_index: 批次序号（0 起始，偏移 = batch_index × 批次大小）
    ///
    /// # 返回
    /// - Ok(BatchReport): completed=true 时统计为全运行累计值，
    ///   运行状态已销毁、锁已释放、上传文件已删除
    /// - Err: 前置条件错误或致命批次错误（锁保证已释放）
    async fn process_batch(&self, operator: &str, batch_index: u64) -> ImportResult<BatchReport>;

    /// 取消当前运行
    ///
    /// # 说明
    /// 清除运行配置、删除上传文件、释放锁。幂等，无活动运行时
    /// 调用也安全
    async fn cancel(&self, operator: &str) -> ImportResult<()>;
}
