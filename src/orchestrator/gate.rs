//! 并发闸门
//!
//! 对 `tokio::sync::Semaphore` 的薄封装：外层闸门限制同时处理的任务数，
//! 内层闸门限制单个任务内同时进行的改写调用数。

use std::sync::Arc;
use tokio::sync::{AcquireError, OwnedSemaphorePermit, Semaphore};

/// 计数闸门
#[derive(Debug, Clone)]
pub struct ConcurrencyGate {
    semaphore: Arc<Semaphore>,
    width: usize,
}

impl ConcurrencyGate {
    /// 宽度至少为 1
    pub fn new(width: usize) -> Self {
        let width = width.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(width)),
            width,
        }
    }

    /// 等待一个许可，许可被丢弃时自动归还
    pub async fn acquire(&self) -> Result<OwnedSemaphorePermit, AcquireError> {
        self.semaphore.clone().acquire_owned().await
    }

    pub fn width(&self) -> usize {
        self.width
    }

    /// 当前空闲的许可数
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }
}
