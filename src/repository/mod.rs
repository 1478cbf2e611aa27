// ==========================================
// 表格数据导入系统 - 数据仓储层
// ==========================================
// 职责: 目标表对账、进度与锁存储、导入日志的数据访问
// 红线: Repository 不含业务规则，只做数据 CRUD
// ==========================================

pub mod import_log_repo;
pub mod progress_store;
pub mod progress_store_impl;
pub mod target_table_repo;
pub mod target_table_repo_impl;

// 重导出核心类型
pub use import_log_repo::{ImportLogRepository, ImportLogRepositoryImpl};
pub use progress_store::{lock_key, run_state_key, ProgressStore};
pub use progress_store_impl::ProgressStoreImpl;
pub use target_table_repo::{BatchWriteResult, TargetTableRepository};
pub use target_table_repo_impl::TargetTableRepositoryImpl;
