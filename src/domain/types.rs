// ==========================================
// 表格数据导入系统 - 领域类型定义
// ==========================================
// 职责: 导入模式/转换/结果分类等枚举类型
// 序列化格式: snake_case (与运行状态 JSON 一致)
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;

// ==========================================
// 导入模式 (Import Mode)
// ==========================================
// 决定行与目标表既有记录的对账语义
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportMode {
    Insert, // 仅新增，已存在则跳过
    Update, // 仅更新，不存在则跳过
    Upsert, // 存在则更新，不存在则新增
}

impl fmt::Display for ImportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImportMode::Insert => write!(f, "insert"),
            ImportMode::Update => write!(f, "update"),
            ImportMode::Upsert => write!(f, "upsert"),
        }
    }
}

impl ImportMode {
    /// 从字符串解析（大小写不敏感）
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "insert" => Some(ImportMode::Insert),
            "update" => Some(ImportMode::Update),
            "upsert" => Some(ImportMode::Upsert),
            _ => None,
        }
    }
}

// ==========================================
// 字段转换 (Transform)
// ==========================================
// 封闭枚举集合，禁止任何动态表达式求值
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transform {
    #[default]
    None,       // 原样保留
    Trim,       // 去除首尾空白
    Uppercase,  // 全大写
    Lowercase,  // 全小写
    Capitalize, // 单词首字母大写
}

impl fmt::Display for Transform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transform::None => write!(f, "none"),
            Transform::Trim => write!(f, "trim"),
            Transform::Uppercase => write!(f, "uppercase"),
            Transform::Lowercase => write!(f, "lowercase"),
            Transform::Capitalize => write!(f, "capitalize"),
        }
    }
}

// ==========================================
// 取值来源 (Value Source)
// ==========================================
// KeepCurrent: 不覆盖目标表既有值（仅 update/upsert 有意义）
// Unmapped: 无源字段，直接落入默认值
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "name")]
pub enum ValueSource {
    Column(String),
    KeepCurrent,
    Unmapped,
}

// ==========================================
// 行写入结果分类 (Row Outcome)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowOutcomeKind {
    Inserted,
    Updated,
    Skipped,
    Failed,
}

impl fmt::Display for RowOutcomeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RowOutcomeKind::Inserted => write!(f, "inserted"),
            RowOutcomeKind::Updated => write!(f, "updated"),
            RowOutcomeKind::Skipped => write!(f, "skipped"),
            RowOutcomeKind::Failed => write!(f, "failed"),
        }
    }
}

// ==========================================
// 批次消息级别 (Message Kind)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Info,
    Error,
}

// ==========================================
// 导入运行终态 (Run Status)
// ==========================================
// 序列化格式: snake_case (与 import_log.status 列一致)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    CompletedWithErrors,
    Failed,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunStatus::Completed => write!(f, "completed"),
            RunStatus::CompletedWithErrors => write!(f, "completed_with_errors"),
            RunStatus::Failed => write!(f, "failed"),
        }
    }
}

impl RunStatus {
    /// 从字符串解析（数据库读取用）
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "completed" => Some(RunStatus::Completed),
            "completed_with_errors" => Some(RunStatus::CompletedWithErrors),
            "failed" => Some(RunStatus::Failed),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_import_mode_parse() {
        assert_eq!(ImportMode::parse("Insert"), Some(ImportMode::Insert));
        assert_eq!(ImportMode::parse(" upsert "), Some(ImportMode::Upsert));
        assert_eq!(ImportMode::parse("merge"), None);
    }

    #[test]
    fn test_value_source_serde_roundtrip() {
        let source = ValueSource::Column("email".to_string());
        let json = serde_json::to_string(&source).unwrap();
        let back: ValueSource = serde_json::from_str(&json).unwrap();
        assert_eq!(source, back);

        let keep: ValueSource = serde_json::from_str(r#"{"kind":"keep_current"}"#).unwrap();
        assert_eq!(keep, ValueSource::KeepCurrent);
    }

    #[test]
    fn test_run_status_display_matches_parse() {
        for status in [
            RunStatus::Completed,
            RunStatus::CompletedWithErrors,
            RunStatus::Failed,
        ] {
            assert_eq!(RunStatus::parse(&status.to_string()), Some(status));
        }
    }
}
