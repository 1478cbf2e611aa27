// ==========================================
// 表格数据导入系统 - 领域模型层
// ==========================================
// 职责: 定义领域实体与类型
// 红线: 不含数据访问逻辑，不含引擎逻辑
// ==========================================

pub mod import;
pub mod types;

// 重导出核心类型
pub use import::{
    BatchMessage, BatchReport, BatchStats, ColumnMapping, ColumnMeta, ColumnRule,
    ImportLogRecord, ImportOptions, MappedColumn, MappedRow, MappingTemplate, RowOutcome,
    RunState, UploadedFile,
};
pub use types::{ImportMode, MessageKind, RowOutcomeKind, RunStatus, Transform, ValueSource};
