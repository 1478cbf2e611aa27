// ==========================================
// 表格数据导入系统 - 导入领域模型
// ==========================================
// 职责: 列映射规则、批次统计、运行状态、导入日志等实体
// 红线: 不含数据访问逻辑，不含引擎逻辑
// ==========================================

use crate::domain::types::{
    ImportMode, MessageKind, RowOutcomeKind, RunStatus, Transform, ValueSource,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ==========================================
// ColumnRule - 单个目标列的映射规则
// ==========================================
// 用途: 映射步骤创建，运行期间不可变
// skip=true 的规则永不求值；KeepCurrent 仅在 update/upsert 下有意义
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnRule {
    pub target: String,        // 目标列名（映射内唯一）
    pub skip: bool,            // 完全跳过该列
    pub source: ValueSource,   // 取值来源
    pub default_value: String, // 源字段缺失/为空时的默认值
    pub transform: Transform,  // 封闭转换集合
    pub allow_null: bool,      // 列级 NULL 许可（需与全局开关同时成立）
}

impl ColumnRule {
    /// 构造一条从源字段取值的规则（其余字段取默认）
    pub fn from_column(target: &str, source_field: &str) -> Self {
        Self {
            target: target.to_string(),
            skip: false,
            source: ValueSource::Column(source_field.to_string()),
            default_value: String::new(),
            transform: Transform::None,
            allow_null: false,
        }
    }

    /// 构造一条跳过规则
    pub fn skipped(target: &str) -> Self {
        Self {
            target: target.to_string(),
            skip: true,
            source: ValueSource::Unmapped,
            default_value: String::new(),
            transform: Transform::None,
            allow_null: false,
        }
    }
}

// ==========================================
// ColumnMapping - 完整列映射
// ==========================================
// 有序: 规则顺序决定输出记录的列顺序
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ColumnMapping {
    pub rules: Vec<ColumnRule>,
}

impl ColumnMapping {
    pub fn new(rules: Vec<ColumnRule>) -> Self {
        Self { rules }
    }

    /// 按目标列名查找规则
    pub fn rule_for(&self, target: &str) -> Option<&ColumnRule> {
        self.rules.iter().find(|r| r.target == target)
    }
}

// ==========================================
// MappedRow - 映射引擎输出的一行
// ==========================================
// 生命周期: 仅在单个批次内（映射 → 对账写入）
// value=None 表示 SQL NULL
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MappedRow {
    pub columns: Vec<MappedColumn>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappedColumn {
    pub name: String,
    pub value: Option<String>,
}

impl MappedRow {
    pub fn push(&mut self, name: &str, value: Option<String>) {
        self.columns.push(MappedColumn {
            name: name.to_string(),
            value,
        });
    }

    /// 按列名取值（None=列不存在，Some(None)=SQL NULL）
    pub fn get(&self, name: &str) -> Option<&Option<String>> {
        self.columns.iter().find(|c| c.name == name).map(|c| &c.value)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

// ==========================================
// RowOutcome - 单行写入结果
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowOutcome {
    pub kind: RowOutcomeKind,
    pub detail: Option<String>, // skipped/failed 的人类可读原因
}

impl RowOutcome {
    pub fn inserted() -> Self {
        Self {
            kind: RowOutcomeKind::Inserted,
            detail: None,
        }
    }

    pub fn updated() -> Self {
        Self {
            kind: RowOutcomeKind::Updated,
            detail: None,
        }
    }

    pub fn skipped(detail: &str) -> Self {
        Self {
            kind: RowOutcomeKind::Skipped,
            detail: Some(detail.to_string()),
        }
    }

    pub fn failed(detail: &str) -> Self {
        Self {
            kind: RowOutcomeKind::Failed,
            detail: Some(detail.to_string()),
        }
    }
}

// ==========================================
// BatchMessage / BatchStats - 批次统计
// ==========================================
// row_number: 文件绝对行号，1 起始，含表头行（表头=第 1 行）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchMessage {
    pub kind: MessageKind,
    pub row_number: u64,
    pub message: String,
}

// 只增不减；跨批次累计副本保存在运行状态中
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchStats {
    pub processed: u64,
    pub inserted: u64,
    pub updated: u64,
    pub skipped: u64,
    pub failed: u64,
    pub messages: Vec<BatchMessage>,
}

impl BatchStats {
    /// 记录一行写入结果
    pub fn record(&mut self, row_number: u64, outcome: &RowOutcome) {
        self.processed += 1;
        match outcome.kind {
            RowOutcomeKind::Inserted => self.inserted += 1,
            RowOutcomeKind::Updated => self.updated += 1,
            RowOutcomeKind::Skipped => {
                self.skipped += 1;
                if let Some(detail) = &outcome.detail {
                    self.messages.push(BatchMessage {
                        kind: MessageKind::Info,
                        row_number,
                        message: detail.clone(),
                    });
                }
            }
            RowOutcomeKind::Failed => {
                self.failed += 1;
                self.messages.push(BatchMessage {
                    kind: MessageKind::Error,
                    row_number,
                    message: outcome
                        .detail
                        .clone()
                        .unwrap_or_else(|| "未知错误".to_string()),
                });
            }
        }
    }

    /// 并入另一份统计（跨批次累计）
    pub fn merge(&mut self, other: &BatchStats) {
        self.processed += other.processed;
        self.inserted += other.inserted;
        self.updated += other.updated;
        self.skipped += other.skipped;
        self.failed += other.failed;
        self.messages.extend(other.messages.iter().cloned());
    }
}

// ==========================================
// UploadedFile - 上传协作方提供的文件描述
// ==========================================
// 约定: path 在清理前稳定且独占
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadedFile {
    pub name: String,      // 原始文件名（用于日志展示）
    pub path: String,      // 本地存储路径
    pub extension: String, // 小写扩展名（csv/xlsx/...）
    pub size: u64,         // 字节数
}

// ==========================================
// ImportOptions - 运行选项（确认步骤提交）
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportOptions {
    pub mode: ImportMode,
    pub key_columns: Vec<String>, // 身份判定列集合
    pub allow_null: bool,         // 全局 NULL 许可开关
}

// ==========================================
// RunState - 跨批次持久化的运行状态
// ==========================================
// 存储: 进度存储 import_run/{operator}，JSON 序列化，TTL 约束
// 生命周期: 确认导入时创建，完成/取消时销毁
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunState {
    pub run_id: String, // UUID，同时作为锁的持有凭据
    pub operator: String,
    pub file: UploadedFile,
    pub table_name: String,
    pub mapping: ColumnMapping,
    pub options: ImportOptions,
    pub started_at: DateTime<Utc>,
    pub total_records: u64, // 确认步骤统计的数据行数（进度展示用）
    pub totals: BatchStats, // 跨批次累计统计
}

// ==========================================
// ColumnMeta - 目标表列元数据
// ==========================================
// 来源: 目标表协作方（PRAGMA table_info）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnMeta {
    pub name: String,
    pub sql_type: String,
    pub nullable: bool,
    pub has_default: bool,
    pub is_key: bool,
    pub is_auto_increment: bool,
}

// ==========================================
// ImportLogRecord - 导入日志（每次运行一条，只追加）
// ==========================================
// 对齐: import_log 表
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportLogRecord {
    pub id: Option<i64>, // 自增主键，插入前为 None
    pub user_id: String,
    pub import_date: DateTime<Utc>,
    pub file_name: String,
    pub table_name: String,
    pub total_rows: u64,
    pub inserted: u64,
    pub updated: u64,
    pub skipped: u64,
    pub failed: u64,
    pub error_log: Option<String>, // 消息列表 JSON 序列化
    pub status: RunStatus,
    pub duration_secs: i64,
}

// ==========================================
// BatchReport - 单次批次调用的响应
// ==========================================
// completed=true 时统计为全运行累计值，否则为本批次值
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReport {
    pub processed: u64,
    pub inserted: u64,
    pub updated: u64,
    pub skipped: u64,
    pub failed: u64,
    pub completed: bool,
    pub messages: Vec<BatchMessage>,
}

impl BatchReport {
    pub fn from_stats(stats: &BatchStats, completed: bool) -> Self {
        Self {
            processed: stats.processed,
            inserted: stats.inserted,
            updated: stats.updated,
            skipped: stats.skipped,
            failed: stats.failed,
            completed,
            messages: stats.messages.clone(),
        }
    }
}

// ==========================================
// MappingTemplate - 命名映射模板
// ==========================================
// 存储: 键值配置存储 mapping_template/{name}，生命周期独立于运行
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappingTemplate {
    pub name: String,
    pub table: String,
    pub mapping: ColumnMapping,
    pub created_at: DateTime<Utc>,
}
