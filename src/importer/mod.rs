// ==========================================
// 表格数据导入系统 - 导入引擎层
// ==========================================
// 职责: 行来源、字段映射、批次运行状态机
// 支持: CSV/TXT, Excel
// ==========================================

// 模块声明
pub mod batch_runner;
pub mod error;
pub mod field_mapper;
pub mod importer_trait;
pub mod memory;
pub mod row_source;

// 重导出核心类型
pub use batch_runner::{BatchRunner, BATCH_SIZE};
pub use error::{ImportError, ImportResult};
pub use field_mapper::FieldMapperImpl;
pub use row_source::{open_row_source, CsvRowSource, ExcelRowSource};

// 重导出 Trait 接口
pub use importer_trait::{BatchImporter, FieldMapper, RowSource};
