// ==========================================
// 表格数据导入系统 - 批次运行器实现
// ==========================================
// 职责: 整合单个批次的完整流程，跨无状态调用续传
// 流程: 前置校验 → 内存检查 → 原子取锁 → 定位偏移 → 映射 →
//       对账写入（单事务）→ 累计持久化 → 完成收尾/续传
// 红线: 步骤 4-9 的任何错误必须先释放锁再上抛（锁不泄漏）
// ==========================================

use crate::config::ImportConfigReader;
use crate::domain::import::{
    BatchMessage, BatchReport, BatchStats, ImportLogRecord, MappedRow, RunState,
};
use crate::domain::types::{MessageKind, RunStatus};
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::importer_trait::{BatchImporter, FieldMapper};
use crate::importer::memory;
use crate::importer::row_source::open_row_source;
use crate::repository::import_log_repo::ImportLogRepository;
use crate::repository::progress_store::{lock_key, run_state_key, ProgressStore};
use crate::repository::target_table_repo::TargetTableRepository;
use chrono::Utc;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// 每批次处理的数据行数
pub const BATCH_SIZE: usize = 100;

// ==========================================
// BatchRunner - 批次运行器
// ==========================================
pub struct BatchRunner<R, S, C>
where
    R: TargetTableRepository,
    S: ProgressStore,
    C: ImportConfigReader,
{
    // 数据访问层
    table_repo: R,

    // 进度与锁存储（显式注入，不依赖进程内全局状态）
    progress: S,

    // 配置读取器
    config: C,

    // 导入组件
    field_mapper: Box<dyn FieldMapper>,
    log_repo: Box<dyn ImportLogRepository>,
}

impl<R, S, C> BatchRunner<R, S, C>
where
    R: TargetTableRepository,
    S: ProgressStore,
    C: ImportConfigReader,
{
    /// 创建新的 BatchRunner 实例
    ///
    /// # 参数
    /// - table_repo: 目标表对账仓储
    /// - progress: 进度与锁存储
    /// - config: 配置读取器
    /// - field_mapper: 字段映射器
    /// - log_repo: 导入日志仓储
    pub fn new(
        table_repo: R,
        progress: S,
        config: C,
        field_mapper: Box<dyn FieldMapper>,
        log_repo: Box<dyn ImportLogRepository>,
    ) -> Self {
        Self {
            table_repo,
            progress,
            config,
            field_mapper,
            log_repo,
        }
    }

    /// 读取运行状态
    ///
    /// # 返回
    /// - Ok(RunState): 状态存在且可解析
    /// - Err(MissingRunState): 无活动运行
    async fn load_run_state(&self, operator: &str) -> ImportResult<RunState> {
        let raw = self
            .progress
            .get(&run_state_key(operator))
            .await
            .map_err(|e| ImportError::ProgressStoreError(e.to_string()))?
            .ok_or(ImportError::MissingRunState)?;

        Ok(serde_json::from_str(&raw)?)
    }

    /// 持久化运行状态（续期 TTL）
    async fn save_run_state(&self, run: &RunState) -> ImportResult<()> {
        let ttl = self
            .config
            .get_state_ttl_secs()
            .await
            .map_err(|e| ImportError::ConfigReadError {
                key: "import_state_ttl_secs".to_string(),
                message: e.to_string(),
            })?;

        let json = serde_json::to_string(run)?;
        self.progress
            .set(&run_state_key(&run.operator), &json, Duration::from_secs(ttl))
            .await
            .map_err(|e| ImportError::ProgressStoreError(e.to_string()))
    }

    /// 持锁执行步骤 4-9（调用方负责错误时释放锁）
    async fn run_locked(&self, run: &mut RunState, batch_index: u64) -> ImportResult<BatchReport> {
        // 步骤 4: 打开行来源（表头在打开时消费），定位批次偏移
        let mut source = open_row_source(Path::new(&run.file.path))?;
        let headers: Vec<String> = source.headers().to_vec();

        let offset = batch_index as usize * BATCH_SIZE;
        let skipped = source.skip_rows(offset)?;
        if skipped < offset {
            // seek 先到 EOF: 运行已完成，本批次无行可处理
            debug!(batch_index, offset, skipped, "定位越过文件末尾，运行收尾");
            return self.finalize(run).await;
        }

        // 步骤 5: 读取并映射最多 BATCH_SIZE 行（逐行顺序处理）
        let mut rows: Vec<(u64, MappedRow)> = Vec::with_capacity(BATCH_SIZE);
        let mut reached_eof = false;
        while rows.len() < BATCH_SIZE {
            match source.next_row()? {
                Some(fields) => {
                    // 绝对行号: 1 起始，含表头行（表头=第 1 行）
                    let row_number = (offset + rows.len()) as u64 + 2;
                    let raw: HashMap<String, String> =
                        headers.iter().cloned().zip(fields).collect();
                    let mapped =
                        self.field_mapper
                            .map_row(&raw, &run.mapping, run.options.allow_null);
                    rows.push((row_number, mapped));
                }
                None => {
                    reached_eof = true;
                    break;
                }
            }
        }

        // 步骤 6: 单事务对账写入，行级失败继续（默认无条件提交）
        let mut stats = BatchStats::default();
        if !rows.is_empty() {
            let abort_on_failure = self
                .config
                .get_abort_batch_on_row_failure()
                .await
                .map_err(|e| ImportError::ConfigReadError {
                    key: "import_abort_batch_on_row_failure".to_string(),
                    message: e.to_string(),
                })?;

            let result = self
                .table_repo
                .write_batch(
                    &run.table_name,
                    &rows,
                    run.options.mode,
                    &run.options.key_columns,
                    abort_on_failure,
                )
                .await
                .map_err(|e| ImportError::DatabaseTransactionError(e.to_string()))?;

            if !result.committed {
                warn!(batch_index, "批次因行失败整体回滚");
            }

            for (row_number, outcome) in &result.outcomes {
                stats.record(*row_number, outcome);
            }
        }

        info!(
            batch_index,
            processed = stats.processed,
            inserted = stats.inserted,
            updated = stats.updated,
            skipped = stats.skipped,
            failed = stats.failed,
            "批次处理完成"
        );

        // 累计统计并入运行状态
        run.totals.merge(&stats);

        // 步骤 7-9: 完成判定
        if reached_eof {
            self.finalize(run).await
        } else {
            self.save_run_state(run).await?;
            Ok(BatchReport::from_stats(&stats, false))
        }
    }

    /// 运行收尾: 写日志 → 删文件 → 销毁状态 → 释放锁
    ///
    /// # 返回
    /// - BatchReport: 全运行累计统计，completed=true
    async fn finalize(&self, run: &RunState) -> ImportResult<BatchReport> {
        let totals = &run.totals;

        // 终态判定: 全部失败 → failed；部分失败 → completed_with_errors
        let status = if totals.processed > 0 && totals.failed == totals.processed {
            RunStatus::Failed
        } else if totals.failed > 0 {
            RunStatus::CompletedWithErrors
        } else {
            RunStatus::Completed
        };

        let error_messages: Vec<&BatchMessage> = totals
            .messages
            .iter()
            .filter(|m| m.kind == MessageKind::Error)
            .collect();
        let error_log = if error_messages.is_empty() {
            None
        } else {
            Some(serde_json::to_string(&error_messages)?)
        };

        let record = ImportLogRecord {
            id: None,
            user_id: run.operator.clone(),
            import_date: Utc::now(),
            file_name: run.file.name.clone(),
            table_name: run.table_name.clone(),
            total_rows: totals.processed,
            inserted: totals.inserted,
            updated: totals.updated,
            skipped: totals.skipped,
            failed: totals.failed,
            error_log,
            status,
            duration_secs: (Utc::now() - run.started_at).num_seconds(),
        };

        self.log_repo
            .insert_log(&record)
            .await
            .map_err(|e| ImportError::DatabaseQueryError(e.to_string()))?;

        // 删除上传的临时文件（缺失忽略）
        if let Err(e) = std::fs::remove_file(&run.file.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %run.file.path, error = %e, "上传文件删除失败");
            }
        }

        // 销毁运行状态并释放锁
        self.progress
            .delete(&run_state_key(&run.operator))
            .await
            .map_err(|e| ImportError::ProgressStoreError(e.to_string()))?;
        self.progress
            .release_lock(&lock_key(&run.operator))
            .await
            .map_err(|e| ImportError::ProgressStoreError(e.to_string()))?;

        info!(
            run_id = %run.run_id,
            status = %status,
            total = totals.processed,
            inserted = totals.inserted,
            updated = totals.updated,
            skipped = totals.skipped,
            failed = totals.failed,
            "导入运行完成"
        );

        Ok(BatchReport::from_stats(totals, true))
    }
}

#[async_trait::async_trait]
impl<R, S, C> BatchImporter for BatchRunner<R, S, C>
where
    R: TargetTableRepository + Send + Sync,
    S: ProgressStore + Send + Sync,
    C: ImportConfigReader + Send + Sync,
{
    /// 处理指定批次
    #[instrument(skip(self))]
    async fn process_batch(&self, operator: &str, batch_index: u64) -> ImportResult<BatchReport> {
        // 步骤 1: 运行前置校验（文件/映射/目标表），不取锁
        let mut run = self.load_run_state(operator).await?;
        if run.table_name.trim().is_empty()
            || run.mapping.rules.is_empty()
            || !Path::new(&run.file.path).exists()
        {
            return Err(ImportError::MissingRunState);
        }

        // 步骤 2: 内存余量检查（无读数的平台跳过）
        let floor_mb = self
            .config
            .get_memory_floor_mb()
            .await
            .map_err(|e| ImportError::ConfigReadError {
                key: "import_memory_floor_mb".to_string(),
                message: e.to_string(),
            })?;
        if let Some(available_mb) = memory::available_memory_mb() {
            if available_mb < floor_mb {
                return Err(ImportError::InsufficientMemory {
                    available_mb,
                    floor_mb,
                });
            }
        }

        // 步骤 3: 原子取锁（凭据=run_id，同一运行的后续批次重入并续期）
        let lock_ttl = self
            .config
            .get_lock_ttl_secs()
            .await
            .map_err(|e| ImportError::ConfigReadError {
                key: "import_lock_ttl_secs".to_string(),
                message: e.to_string(),
            })?;
        let acquired = self
            .progress
            .acquire_lock(&lock_key(operator), &run.run_id, Duration::from_secs(lock_ttl))
            .await
            .map_err(|e| ImportError::ProgressStoreError(e.to_string()))?;
        if !acquired {
            return Err(ImportError::LockContention);
        }

        // 步骤 4-9，步骤 10: 任何错误先释放锁再上抛
        match self.run_locked(&mut run, batch_index).await {
            Ok(report) => Ok(report),
            Err(e) => {
                if let Err(release_err) = self.progress.release_lock(&lock_key(operator)).await {
                    warn!(error = %release_err, "批次失败后锁释放失败");
                }
                Err(e)
            }
        }
    }

    /// 取消当前运行（幂等）
    #[instrument(skip(self))]
    async fn cancel(&self, operator: &str) -> ImportResult<()> {
        // 运行状态存在时顺带删除上传文件
        match self.progress.get(&run_state_key(operator)).await {
            Ok(Some(raw)) => {
                if let Ok(run) = serde_json::from_str::<RunState>(&raw) {
                    let _ = std::fs::remove_file(&run.file.path);
                }
            }
            Ok(None) => {}
            Err(e) => return Err(ImportError::ProgressStoreError(e.to_string())),
        }

        self.progress
            .delete(&run_state_key(operator))
            .await
            .map_err(|e| ImportError::ProgressStoreError(e.to_string()))?;
        self.progress
            .release_lock(&lock_key(operator))
            .await
            .map_err(|e| ImportError::ProgressStoreError(e.to_string()))?;

        info!(operator, "导入已取消");
        Ok(())
    }
}
