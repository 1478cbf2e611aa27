// ==========================================
// 表格数据导入系统 - 核心库
// ==========================================
// 技术栈: Rust + SQLite
// 系统定位: 批次化表格数据导入引擎（每次 HTTP 触发处理一个批次，
//           进度跨无状态调用续传）
// ==========================================

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 实体与类型
pub mod domain;

// 数据仓储层 - 数据访问
pub mod repository;

// 导入引擎层 - 行来源/映射/批次运行
pub mod importer;

// 配置层 - 系统配置与映射模板
pub mod config;

// 数据库基础设施（连接初始化/PRAGMA 统一）
pub mod db;

// 日志系统
pub mod logging;

// API 层 - 业务接口
pub mod api;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域类型
pub use domain::types::{
    ImportMode, MessageKind, RowOutcomeKind, RunStatus, Transform, ValueSource,
};

// 领域实体
pub use domain::{
    BatchMessage, BatchReport, BatchStats, ColumnMapping, ColumnMeta, ColumnRule,
    ImportLogRecord, ImportOptions, MappedRow, MappingTemplate, RunState, UploadedFile,
};

// 引擎
pub use importer::{BatchImporter, BatchRunner, FieldMapperImpl, ImportError, BATCH_SIZE};

// API
pub use api::{ApiError, ImportApi};

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "表格数据导入系统";

// ==========================================
// 预编译检查
// ==========================================

// 确保编译时所有模块可见
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
