// ==========================================
// 表格数据导入系统 - 导入配置读取 Trait
// ==========================================
// 职责: 定义导入模块所需的配置读取接口（不包含实现）
// 红线: 不包含业务逻辑
// ==========================================

use async_trait::async_trait;
use std::error::Error;

// ==========================================
// ImportConfigReader Trait
// ==========================================
// 用途: 批次运行器所需的配置读取接口
// 实现者: ConfigManager（从 config_kv 表读取）
#[async_trait]
pub trait ImportConfigReader: Send + Sync {
    /// 获取可用内存下限（MB）
    ///
    /// 低于下限时批次中止且不取锁，状态不变，可安全重试
    ///
    /// # 默认值
    /// - 32
    async fn get_memory_floor_mb(&self) -> Result<u64, Box<dyn Error>>;

    /// 获取导入锁 TTL（秒）
    ///
    /// 崩溃的批次留下的锁在 TTL 后自动过期，允许新尝试继续
    ///
    /// # 默认值
    /// - 3600
    async fn get_lock_ttl_secs(&self) -> Result<u64, Box<dyn Error>>;

    /// 获取运行状态 TTL（秒）
    ///
    /// 废弃运行的进度数据在 TTL 后过期，防止无界增长
    ///
    /// # 默认值
    /// - 3600
    async fn get_state_ttl_secs(&self) -> Result<u64, Box<dyn Error>>;

    /// 是否在任一行失败时回滚整个批次
    ///
    /// false: 行级失败继续处理，批次末尾无条件提交（默认策略）
    /// true: 任一行失败即整体回滚，该批次所有行报告失败
    ///
    /// # 默认值
    /// - false
    async fn get_abort_batch_on_row_failure(&self) -> Result<bool, Box<dyn Error>>;
}
