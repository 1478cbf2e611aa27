// ==========================================
// 表格数据导入系统 - API 层
// ==========================================
// 职责: 宿主（HTTP/CLI 驱动方）可调用的业务接口
// 红线: 不含路由/鉴权/渲染，仅业务触发面
// ==========================================

pub mod error;
pub mod import_api;

// 重导出核心类型
pub use error::ApiError;
pub use import_api::{ConfigureRunResponse, ImportApi, PreviewResponse};
