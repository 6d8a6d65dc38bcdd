//! 进度通知
//!
//! 通知只是尽力而为：发送失败只记录日志，绝不影响处理流程。

use async_trait::async_trait;
use tracing::{info, warn};

/// 进度接收方
#[async_trait]
pub trait ProgressSink: Send + Sync {
    async fn notify(&self, task_id: &str, message: &str) -> anyhow::Result<()>;
}

/// 把进度写入日志
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingProgressSink;

#[async_trait]
impl ProgressSink for TracingProgressSink {
    async fn notify(&self, task_id: &str, message: &str) -> anyhow::Result<()> {
        info!("📊 [{}] {}", short_id(task_id), message);
        Ok(())
    }
}

/// 丢弃所有通知
#[derive(Debug, Default, Clone, Copy)]
pub struct NullProgressSink;

#[async_trait]
impl ProgressSink for NullProgressSink {
    async fn notify(&self, _task_id: &str, _message: &str) -> anyhow::Result<()> {
        Ok(())
    }
}

/// 发送通知并吞掉错误
pub async fn notify_quietly(sink: Option<&dyn ProgressSink>, task_id: &str, message: &str) {
    if let Some(sink) = sink {
        if let Err(e) = sink.notify(task_id, message).await {
            warn!("⚠️ 进度通知发送失败（已忽略）: {}", e);
        }
    }
}

fn short_id(task_id: &str) -> &str {
    task_id.get(..8).unwrap_or(task_id)
}

/// 进度节流：每 `every` 个完成或跨过 25/50/75/100% 时才通知
#[derive(Debug, Clone)]
pub struct ProgressThrottle {
    total: usize,
    every: usize,
    /// 已通知过的最高里程碑（百分比）
    last_milestone: usize,
}

impl ProgressThrottle {
    const MILESTONES: [usize; 4] = [25, 50, 75, 100];

    /// `done` 为起始时已完成的数量（续跑时不重复通知已跨过的里程碑）
    pub fn new(total: usize, every: usize, done: usize) -> Self {
        let mut throttle = Self {
            total,
            every: every.max(1),
            last_milestone: 0,
        };
        throttle.last_milestone = throttle.milestone_at(done).unwrap_or(0);
        throttle
    }

    /// 记录完成数，需要通知时返回通知文本
    pub fn record(&mut self, done: usize) -> Option<String> {
        let crossed = self
            .milestone_at(done)
            .filter(|&m| m > self.last_milestone);
        if let Some(m) = crossed {
            self.last_milestone = m;
        }
        if crossed.is_none() && done % self.every != 0 {
            return None;
        }
        Some(format!(
            "已改写 {}/{} 个片段 ({}%)",
            done,
            self.total,
            self.percent(done)
        ))
    }

    fn percent(&self, done: usize) -> usize {
        if self.total == 0 {
            100
        } else {
            done * 100 / self.total
        }
    }

    fn milestone_at(&self, done: usize) -> Option<usize> {
        let percent = self.percent(done);
        Self::MILESTONES
            .iter()
            .rev()
            .find(|&&m| percent >= m)
            .copied()
    }
}
