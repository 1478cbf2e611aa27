// ==========================================
// 表格数据导入系统 - API层错误类型
// ==========================================
// 职责: 定义API层错误类型，转换引擎/仓储错误为用户友好的错误消息
// 红线: 错误信息必须包含显式原因（可解释性）
// ==========================================

use crate::importer::ImportError;
use thiserror::Error;

/// API层错误类型
#[derive(Error, Debug)]
pub enum ApiError {
    // ==========================================
    // 业务规则错误
    // ==========================================
    #[error("无效输入: {0}")]
    InvalidInput(String),

    #[error("资源未找到: {0}")]
    NotFound(String),

    // ==========================================
    // 并发控制错误
    // ==========================================
    #[error("导入锁冲突: {0}")]
    LockContention(String),

    // ==========================================
    // 导入引擎错误
    // ==========================================
    #[error("导入失败: {0}")]
    ImportError(String),

    // ==========================================
    // 数据访问错误
    // ==========================================
    #[error("数据库错误: {0}")]
    DatabaseError(String),

    // ==========================================
    // 配置错误
    // ==========================================
    #[error("配置错误: {0}")]
    ConfigError(String),
}

// 引擎错误按分类映射为 API 错误
impl From<ImportError> for ApiError {
    fn from(err: ImportError) -> Self {
        match err {
            ImportError::MissingRunState => ApiError::NotFound(err.to_string()),
            ImportError::LockContention => ApiError::LockContention(err.to_string()),
            ImportError::ConfigReadError { .. } => ApiError::ConfigError(err.to_string()),
            ImportError::DatabaseQueryError(_) | ImportError::DatabaseTransactionError(_) => {
                ApiError::DatabaseError(err.to_string())
            }
            _ => ApiError::ImportError(err.to_string()),
        }
    }
}
