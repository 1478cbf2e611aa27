// ==========================================
// 数据导入API
// ==========================================
// 职责: 封装导入流程对宿主的全部触发面
//       （配置运行/批次触发/取消/预览/历史/映射模板）
// 约定: 每次批次触发都是独立的无状态调用，进程间状态只经
//       进度存储与磁盘文件传递
// ==========================================

use crate::api::error::ApiError;
use crate::config::{ConfigManager, ImportConfigReader};
use crate::domain::import::{
    BatchReport, ColumnMapping, ImportLogRecord, ImportOptions, MappedRow, MappingTemplate,
    RunState, UploadedFile,
};
use crate::domain::types::{ImportMode, ValueSource};
use crate::importer::{
    BatchImporter, BatchRunner, FieldMapper, FieldMapperImpl, open_row_source,
};
use crate::repository::{
    run_state_key, ImportLogRepository, ImportLogRepositoryImpl, ProgressStore, ProgressStoreImpl,
    TargetTableRepository, TargetTableRepositoryImpl,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;
use uuid::Uuid;

/// 配置运行响应
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigureRunResponse {
    /// 运行ID（锁的持有凭据）
    pub run_id: String,
    /// 文件中的数据行数（进度展示用）
    pub total_records: u64,
}

/// 映射预览响应
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreviewResponse {
    /// 源文件表头
    pub headers: Vec<String>,
    /// 前 N 行映射结果（未写入）
    pub rows: Vec<MappedRow>,
}

/// 导入API
pub struct ImportApi {
    db_path: String,
}

impl ImportApi {
    /// 创建新的ImportApi实例
    ///
    /// # 说明
    /// 基础设施表（config_kv 等）需已通过 db::init_core_schema 就绪
    pub fn new(db_path: String) -> Self {
        Self { db_path }
    }

    /// 配置导入运行（映射步骤 + 选项确认）
    ///
    /// # 参数
    /// - operator: 操作员标识
    /// - file: 上传协作方提供的文件描述
    /// - table_name: 目标表名
    /// - mapping: 列映射
    /// - options: 导入选项（模式/键列/NULL 许可）
    ///
    /// # 返回
    /// - Ok(ConfigureRunResponse): 运行已就绪，等待批次触发
    /// - Err(ApiError): 校验失败（目标表/映射覆盖/键列）
    ///
    /// # 说明
    /// 同一操作员重复配置会覆盖其未开始的运行；已持锁的运行不受影响
    pub async fn configure_run(
        &self,
        operator: &str,
        file: UploadedFile,
        table_name: &str,
        mapping: ColumnMapping,
        options: ImportOptions,
    ) -> Result<ConfigureRunResponse, ApiError> {
        if operator.trim().is_empty() {
            return Err(ApiError::InvalidInput("操作员标识不能为空".to_string()));
        }
        if mapping.rules.is_empty() {
            return Err(ApiError::InvalidInput("列映射不能为空".to_string()));
        }

        // 目标列名唯一性
        let mut seen = HashSet::new();
        for rule in &mapping.rules {
            if !seen.insert(rule.target.as_str()) {
                return Err(ApiError::InvalidInput(format!(
                    "目标列重复: {}",
                    rule.target
                )));
            }
        }

        // 目标表存在性 + 列元数据校验
        let table_repo = self.table_repo()?;
        if !table_repo
            .table_exists(table_name)
            .await
            .map_err(|e| ApiError::DatabaseError(format!("目标表校验失败: {}", e)))?
        {
            return Err(ApiError::NotFound(format!("目标表不存在: {}", table_name)));
        }

        let columns = table_repo
            .table_columns(table_name)
            .await
            .map_err(|e| ApiError::DatabaseError(format!("读取列元数据失败: {}", e)))?;
        let column_names: HashSet<&str> = columns.iter().map(|c| c.name.as_str()).collect();

        // 映射目标必须是真实列
        for rule in &mapping.rules {
            if !column_names.contains(rule.target.as_str()) {
                return Err(ApiError::InvalidInput(format!(
                    "目标列在表 {} 中不存在: {}",
                    table_name, rule.target
                )));
            }
        }

        // 必填列覆盖校验: 非空、无默认值、非自增列必须有活动映射
        // （仅对产生新行的模式强制）
        if options.mode != ImportMode::Update {
            let covered: HashSet<&str> = mapping
                .rules
                .iter()
                .filter(|r| !r.skip && r.source != ValueSource::KeepCurrent)
                .map(|r| r.target.as_str())
                .collect();
            for col in &columns {
                if !col.nullable
                    && !col.has_default
                    && !col.is_auto_increment
                    && !covered.contains(col.name.as_str())
                {
                    return Err(ApiError::InvalidInput(format!(
                        "必填列未覆盖: {}（非空且无默认值）",
                        col.name
                    )));
                }
            }
        }

        // 键列必须是真实列
        for key in &options.key_columns {
            if !column_names.contains(key.as_str()) {
                return Err(ApiError::InvalidInput(format!(
                    "键列在表 {} 中不存在: {}",
                    table_name, key
                )));
            }
        }

        // 统计数据行数（完整惰性遍历，不载入行内容）
        let mut source = open_row_source(Path::new(&file.path))
            .map_err(|e| ApiError::ImportError(format!("文件打开失败: {}", e)))?;
        let total_records = source
            .skip_rows(usize::MAX)
            .map_err(|e| ApiError::ImportError(format!("文件读取失败: {}", e)))? as u64;

        // 持久化运行状态
        let run = RunState {
            run_id: Uuid::new_v4().to_string(),
            operator: operator.to_string(),
            file,
            table_name: table_name.to_string(),
            mapping,
            options,
            started_at: Utc::now(),
            total_records,
            totals: Default::default(),
        };

        let config = self.config()?;
        let state_ttl = config
            .get_state_ttl_secs()
            .await
            .map_err(|e| ApiError::ConfigError(format!("配置读取失败: {}", e)))?;

        let progress = self.progress_store()?;
        let json = serde_json::to_string(&run)
            .map_err(|e| ApiError::ImportError(format!("运行状态序列化失败: {}", e)))?;
        progress
            .set(
                &run_state_key(operator),
                &json,
                Duration::from_secs(state_ttl),
            )
            .await
            .map_err(|e| ApiError::DatabaseError(format!("运行状态写入失败: {}", e)))?;

        tracing::info!(
            operator,
            run_id = %run.run_id,
            table = table_name,
            total_records,
            "导入运行已配置"
        );

        Ok(ConfigureRunResponse {
            run_id: run.run_id,
            total_records,
        })
    }

    /// 处理指定批次（批次触发，每次调用处理最多 100 行）
    ///
    /// # 参数
    /// - operator: 操作员标识
    /// - batch_index: 批次序号（0 起始）
    ///
    /// # 返回
    /// - Ok(BatchReport): completed=true 时运行已收尾
    /// - Err(ApiError): 前置条件错误或致命批次错误
    pub async fn process_batch(
        &self,
        operator: &str,
        batch_index: u64,
    ) -> Result<BatchReport, ApiError> {
        let runner = self.create_runner()?;
        Ok(runner.process_batch(operator, batch_index).await?)
    }

    /// 取消当前运行（取消触发，幂等）
    pub async fn cancel_import(&self, operator: &str) -> Result<(), ApiError> {
        let runner = self.create_runner()?;
        Ok(runner.cancel(operator).await?)
    }

    /// 预览映射结果（不写入）
    ///
    /// # 参数
    /// - operator: 操作员标识
    /// - limit: 预览行数上限
    pub async fn preview_mapping(
        &self,
        operator: &str,
        limit: usize,
    ) -> Result<PreviewResponse, ApiError> {
        let progress = self.progress_store()?;
        let raw = progress
            .get(&run_state_key(operator))
            .await
            .map_err(|e| ApiError::DatabaseError(format!("运行状态读取失败: {}", e)))?
            .ok_or_else(|| ApiError::NotFound("缺少必需的导入数据".to_string()))?;
        let run: RunState = serde_json::from_str(&raw)
            .map_err(|e| ApiError::ImportError(format!("运行状态解析失败: {}", e)))?;

        let mut source = open_row_source(Path::new(&run.file.path))
            .map_err(|e| ApiError::ImportError(format!("文件打开失败: {}", e)))?;
        let headers: Vec<String> = source.headers().to_vec();

        let mapper = FieldMapperImpl;
        let mut rows = Vec::new();
        while rows.len() < limit {
            match source
                .next_row()
                .map_err(|e| ApiError::ImportError(format!("文件读取失败: {}", e)))?
            {
                Some(fields) => {
                    let raw_row: std::collections::HashMap<String, String> =
                        headers.iter().cloned().zip(fields).collect();
                    rows.push(mapper.map_row(&raw_row, &run.mapping, run.options.allow_null));
                }
                None => break,
            }
        }

        Ok(PreviewResponse { headers, rows })
    }

    /// 查询最近的导入日志
    pub async fn recent_logs(&self, limit: usize) -> Result<Vec<ImportLogRecord>, ApiError> {
        let repo = self.log_repo()?;
        repo.recent_logs(limit.clamp(1, 100))
            .await
            .map_err(|e| ApiError::DatabaseError(format!("日志查询失败: {}", e)))
    }

    /// 查询指定操作员的导入日志
    pub async fn logs_for_user(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<ImportLogRecord>, ApiError> {
        let repo = self.log_repo()?;
        repo.logs_for_user(user_id, limit.clamp(1, 100))
            .await
            .map_err(|e| ApiError::DatabaseError(format!("日志查询失败: {}", e)))
    }

    // ==========================================
    // 映射模板管理
    // ==========================================

    /// 保存命名映射模板（同名覆盖）
    pub fn save_mapping_template(
        &self,
        name: &str,
        table: &str,
        mapping: &ColumnMapping,
    ) -> Result<MappingTemplate, ApiError> {
        self.config()?
            .save_mapping_template(name, table, mapping)
            .map_err(|e| ApiError::DatabaseError(format!("模板保存失败: {}", e)))
    }

    /// 读取命名映射模板
    pub fn load_mapping_template(&self, name: &str) -> Result<MappingTemplate, ApiError> {
        self.config()?
            .load_mapping_template(name)
            .map_err(|e| ApiError::DatabaseError(format!("模板读取失败: {}", e)))?
            .ok_or_else(|| ApiError::NotFound(format!("模板不存在: {}", name)))
    }

    /// 列出全部映射模板
    pub fn list_mapping_templates(&self) -> Result<Vec<MappingTemplate>, ApiError> {
        self.config()?
            .list_mapping_templates()
            .map_err(|e| ApiError::DatabaseError(format!("模板查询失败: {}", e)))
    }

    /// 删除命名映射模板（幂等）
    pub fn delete_mapping_template(&self, name: &str) -> Result<(), ApiError> {
        self.config()?
            .delete_mapping_template(name)
            .map_err(|e| ApiError::DatabaseError(format!("模板删除失败: {}", e)))
    }

    // ==========================================
    // 组件装配
    // ==========================================

    fn table_repo(&self) -> Result<TargetTableRepositoryImpl, ApiError> {
        TargetTableRepositoryImpl::new(&self.db_path)
            .map_err(|e| ApiError::DatabaseError(format!("创建仓储失败: {}", e)))
    }

    fn progress_store(&self) -> Result<ProgressStoreImpl, ApiError> {
        ProgressStoreImpl::new(&self.db_path)
            .map_err(|e| ApiError::DatabaseError(format!("创建进度存储失败: {}", e)))
    }

    fn log_repo(&self) -> Result<ImportLogRepositoryImpl, ApiError> {
        ImportLogRepositoryImpl::new(&self.db_path)
            .map_err(|e| ApiError::DatabaseError(format!("创建日志仓储失败: {}", e)))
    }

    fn config(&self) -> Result<ConfigManager, ApiError> {
        ConfigManager::new(&self.db_path)
            .map_err(|e| ApiError::ConfigError(format!("创建配置读取器失败: {}", e)))
    }

    /// 创建BatchRunner实例
    fn create_runner(
        &self,
    ) -> Result<BatchRunner<TargetTableRepositoryImpl, ProgressStoreImpl, ConfigManager>, ApiError>
    {
        let table_repo = self.table_repo()?;
        let progress = self.progress_store()?;
        let config = self.config()?;
        let field_mapper = Box::new(FieldMapperImpl);
        let log_repo = Box::new(self.log_repo()?);

        Ok(BatchRunner::new(
            table_repo,
            progress,
            config,
            field_mapper,
            log_repo,
        ))
    }
}
