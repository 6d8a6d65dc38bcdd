#![allow(dead_code)]

use async_trait::async_trait;
use paraphrase_rewrite::error::{CollaboratorError, StorageError};
use paraphrase_rewrite::infrastructure::{InMemoryTaskRepository, TaskRepository};
use paraphrase_rewrite::{Config, Paraphraser, ProgressSink, Task};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::Semaphore;

/// 按脚本返回结果的改写服务
///
/// - 指定的调用序号（从 0 开始）返回配额耗尽
/// - 有预设回复的文本返回预设回复，否则返回 `<原文> [改写]`
#[derive(Default)]
pub struct ScriptedParaphraser {
    calls: AtomicUsize,
    quota_on_calls: HashSet<usize>,
    fatal_on: HashSet<String>,
    replies: HashMap<String, String>,
    seen: Mutex<Vec<String>>,
}

impl ScriptedParaphraser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn quota_on_call(mut self, call: usize) -> Self {
        self.quota_on_calls.insert(call);
        self
    }

    pub fn fatal_on(mut self, text: &str) -> Self {
        self.fatal_on.insert(text.to_string());
        self
    }

    pub fn reply(mut self, original: &str, paraphrased: &str) -> Self {
        self.replies
            .insert(original.to_string(), paraphrased.to_string());
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// 成功改写过的原文（按完成顺序）
    pub fn seen(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }

    pub fn clear_seen(&self) {
        self.seen.lock().unwrap().clear();
    }
}

#[async_trait]
impl Paraphraser for ScriptedParaphraser {
    async fn paraphrase(&self, text: &str) -> Result<String, CollaboratorError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;

        if self.quota_on_calls.contains(&call) {
            return Err(CollaboratorError::Quota("insufficient_quota".to_string()));
        }
        if self.fatal_on.contains(text) {
            return Err(CollaboratorError::Fatal("invalid_request_error".to_string()));
        }

        self.seen.lock().unwrap().push(text.to_string());
        Ok(self
            .replies
            .get(text)
            .cloned()
            .unwrap_or_else(|| format!("{} [改写]", text)))
    }
}

/// 可以卡住调用的改写服务，同时统计并发峰值
///
/// `closed()` 创建的实例在 `release` 之前不会返回；`open(hold)` 的每次调用固定耗时 `hold`。
pub struct GatedParaphraser {
    permits: Semaphore,
    hold: Duration,
    started: AtomicUsize,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl GatedParaphraser {
    pub fn closed() -> Self {
        Self::with_permits(0, Duration::ZERO)
    }

    pub fn open(hold: Duration) -> Self {
        Self::with_permits(Semaphore::MAX_PERMITS, hold)
    }

    fn with_permits(permits: usize, hold: Duration) -> Self {
        Self {
            permits: Semaphore::new(permits),
            hold,
            started: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    /// 放行所有被卡住的调用
    pub fn release(&self) {
        self.permits.add_permits(1);
    }

    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    /// 同时在途的调用数峰值
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Paraphraser for GatedParaphraser {
    async fn paraphrase(&self, text: &str) -> Result<String, CollaboratorError> {
        self.started.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        let permit = self.permits.acquire().await;
        if !self.hold.is_zero() {
            tokio::time::sleep(self.hold).await;
        }
        drop(permit);

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(format!("{} [改写]", text))
    }
}

/// 指定的第 N 次保存（从 1 开始）失败一次，其余委托给内存仓库
pub struct FlakyTaskRepository {
    inner: InMemoryTaskRepository,
    saves: AtomicUsize,
    fail_on: HashSet<usize>,
}

impl FlakyTaskRepository {
    pub fn failing_on(saves: impl IntoIterator<Item = usize>) -> Self {
        Self {
            inner: InMemoryTaskRepository::new(),
            saves: AtomicUsize::new(0),
            fail_on: saves.into_iter().collect(),
        }
    }
}

#[async_trait]
impl TaskRepository for FlakyTaskRepository {
    async fn load(&self, task_id: &str) -> Result<Option<Task>, StorageError> {
        self.inner.load(task_id).await
    }

    async fn save(&self, task: &Task) -> Result<(), StorageError> {
        let n = self.saves.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_on.contains(&n) {
            return Err(StorageError::Io {
                path: format!("tasks/{}.json", task.id),
                source: std::io::Error::other("disk full"),
            });
        }
        self.inner.save(task).await
    }

    async fn delete(&self, task_id: &str) -> Result<bool, StorageError> {
        self.inner.delete(task_id).await
    }
}

/// 轮询直到条件成立（最多约 2 秒）
pub async fn wait_until(condition: impl Fn() -> bool) {
    for _ in 0..2000 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    panic!("等待超时");
}

/// 记录所有进度通知
#[derive(Default)]
pub struct RecordingSink {
    pub messages: Mutex<Vec<String>>,
}

#[async_trait]
impl ProgressSink for RecordingSink {
    async fn notify(&self, _task_id: &str, message: &str) -> anyhow::Result<()> {
        self.messages.lock().unwrap().push(message.to_string());
        Ok(())
    }
}

/// 每次通知都失败
pub struct FailingSink;

#[async_trait]
impl ProgressSink for FailingSink {
    async fn notify(&self, _task_id: &str, _message: &str) -> anyhow::Result<()> {
        anyhow::bail!("通知通道已关闭")
    }
}

/// 无延迟、串行派发的测试配置
pub fn test_config() -> Config {
    Config {
        max_concurrent_tasks: 2,
        max_concurrent_fragments: 1,
        dispatch_delay_ms: 0,
        retry_attempts: 2,
        retry_base_delay_ms: 1,
        retry_max_delay_ms: 2,
        ..Config::default()
    }
}
