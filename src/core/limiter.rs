//! 并发限流：限制同时在途的外部调用数
//!
//! 基于 tokio Semaphore（FIFO 公平）；任务结束（成功、失败或被丢弃）时许可随 guard 一起释放。

use std::future::Future;
use std::sync::Arc;

use serde::Deserialize;
use tokio::sync::Semaphore;

/// 限流器作用域
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LimiterScope {
    /// 整棵递归树共用一个限流器，每次外部调用单独占一个许可
    #[default]
    Shared,
    /// 每层递归新建限流器，分支（含其递归子树）占用所在层的一个许可
    PerFrame,
}

/// 并发限流器；Clone 后共享同一组许可
#[derive(Clone, Debug)]
pub struct ConcurrencyLimiter {
    semaphore: Arc<Semaphore>,
    limit: usize,
}

impl ConcurrencyLimiter {
    pub fn new(limit: usize) -> Self {
        let limit = limit.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(limit)),
            limit,
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// 当前空闲许可数
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// 有空位则立即执行，否则排队等待
    pub async fn run<F, T>(&self, task: F) -> T
    where
        F: Future<Output = T>,
    {
        // 信号量从不 close，acquire 不会失败
        let _permit = self.semaphore.acquire().await.ok();
        task.await
    }
}

impl Default for ConcurrencyLimiter {
    fn default() -> Self {
        Self::new(2)
    }
}
