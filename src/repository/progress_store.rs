// ==========================================
// 表格数据导入系统 - 进度与锁存储 Trait
// ==========================================
// 职责: 定义跨无状态调用共享的 TTL 键值存储接口（不包含实现）
// 红线: 锁获取必须是单条原子操作，禁止应用层先读后写
// ==========================================

use async_trait::async_trait;
use std::error::Error;
use std::time::Duration;

// ==========================================
// ProgressStore Trait
// ==========================================
// 用途: 导入锁（互斥）与运行进度（持久化）的共享存储
// 实现者: ProgressStoreImpl（使用 rusqlite，进程外共享）
// 作用域: 键按操作员标识命名空间化（import_lock/...、import_run/...）
#[async_trait]
pub trait ProgressStore: Send + Sync {
    /// 原子获取锁（test-and-set）
    ///
    /// # 参数
    /// - key: 锁键
    /// - token: 持有凭据（同一运行的后续批次凭相同 token 重入并续期）
    /// - ttl: 存活时长，过期后锁自动可被抢占
    ///
    /// # 返回
    /// - Ok(true): 获取成功（键不存在、已过期、或 token 相同）
    /// - Ok(false): 他人持有且未过期
    async fn acquire_lock(
        &self,
        key: &str,
        token: &str,
        ttl: Duration,
    ) -> Result<bool, Box<dyn Error>>;

    /// 释放锁（键不存在时为空操作）
    async fn release_lock(&self, key: &str) -> Result<(), Box<dyn Error>>;

    /// 读取键值（已过期的键视为不存在）
    async fn get(&self, key: &str) -> Result<Option<String>, Box<dyn Error>>;

    /// 写入键值并设置 TTL（覆盖语义）
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), Box<dyn Error>>;

    /// 删除键（不存在时为空操作）
    async fn delete(&self, key: &str) -> Result<(), Box<dyn Error>>;
}

/// 导入锁键
pub fn lock_key(operator: &str) -> String {
    format!("import_lock/{}", operator)
}

/// 运行状态键
pub fn run_state_key(operator: &str) -> String {
    format!("import_run/{}", operator)
}
