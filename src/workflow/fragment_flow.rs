//! 片段改写流程 - 流程层
//!
//! 核心职责：定义"一个片段"的完整改写流程
//!
//! 流程顺序：
//! 1. 调用改写服务
//! 2. 暂时性错误 → 指数退避后重试
//! 3. 配额耗尽 / 不可恢复错误 / 重试用尽 → 交给上层处理

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::CollaboratorError;
use crate::services::Paraphraser;
use crate::utils::truncate_text;
use crate::workflow::fragment_ctx::FragmentCtx;

/// 重试策略（只对暂时性错误生效）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// 总尝试次数（含第一次）
    pub attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            attempts: config.retry_attempts.max(1),
            base_delay: Duration::from_millis(config.retry_base_delay_ms),
            max_delay: Duration::from_millis(config.retry_max_delay_ms),
        }
    }

    /// 不重试
    pub fn none() -> Self {
        Self {
            attempts: 1,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// 第 `attempt` 次失败后的等待时间：base * 2^(attempt-1)，不超过 max
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// 片段改写流程
///
/// - 只处理单个片段
/// - 决定何时重试、何时放弃
/// - 不写任务记录，不关心其他片段
pub struct FragmentFlow {
    paraphraser: Arc<dyn Paraphraser>,
    retry: RetryPolicy,
}

impl FragmentFlow {
    /// 创建新的片段改写流程
    pub fn new(paraphraser: Arc<dyn Paraphraser>, retry: RetryPolicy) -> Self {
        Self { paraphraser, retry }
    }

    pub async fn run(&self, ctx: &FragmentCtx, text: &str) -> Result<String, CollaboratorError> {
        debug!("{} 原文: {}", ctx, truncate_text(text, 60));

        let mut attempt = 1;
        loop {
            match self.paraphraser.paraphrase(text).await {
                Ok(paraphrased) => {
                    info!("{} ✓ 改写完成", ctx);
                    return Ok(paraphrased);
                }
                Err(e) if e.is_retryable() && attempt < self.retry.attempts => {
                    let delay = self.retry.delay_for(attempt);
                    warn!(
                        "{} ⚠️ 第 {}/{} 次尝试失败: {}，{:?} 后重试",
                        ctx, attempt, self.retry.attempts, e, delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    warn!("{} ❌ 改写失败（第 {} 次尝试）: {}", ctx, attempt, e);
                    return Err(e);
                }
            }
        }
    }
}
