//! 任务编排器 - 编排层
//!
//! ## 职责
//!
//! 驱动单个任务走完状态机：
//!
//! ```text
//! Created → Processing → Completed
//!                      → Failed
//!                      → QuotaPaused（可再次 process，只派发空槽位）
//! ```
//!
//! ## 核心流程
//!
//! 1. 标记 Processing 并持久化
//! 2. 通过两层闸门派发所有空槽位（每次派发前固定等待）
//! 3. 每写入一个槽位就保存一次任务，进程重启后最多丢失正在进行的调用
//! 4. 第一次配额耗尽：停止派发，等待进行中的调用结束，进入 QuotaPaused
//! 5. 所有槽位写满后：从原始文档重新构建，保存结果并记录文档版本
//!
//! 槽位的写入只在本模块的单一循环中进行，派发出去的调用只返回 `(索引, 结果)`。

use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::{JoinError, JoinSet};
use tracing::{error, info, warn};

use crate::config::Config;
use crate::error::{CollaboratorError, Result, RewriteError, ValidationError};
use crate::infrastructure::{
    DocumentStore, DocumentVersionStore, InMemoryTaskRepository, InMemoryVersionStore,
    JsonDocumentStore, JsonFileTaskRepository, JsonFileVersionStore, TaskRepository,
};
use crate::models::{DocumentVersion, Task, TaskStatus, TaskSummary};
use crate::orchestrator::gate::ConcurrencyGate;
use crate::services::progress::{notify_quietly, ProgressSink, ProgressThrottle};
use crate::services::{DocumentRewriteEngine, Paraphraser, RewriteReport};
use crate::workflow::{FragmentCtx, FragmentFlow, RetryPolicy};

/// `process` 的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// 文档已生成
    Completed { result_ref: String },
    /// 配额耗尽，部分完成，可再次处理
    QuotaPaused { processed_count: usize },
    /// 失败（错误信息已截断）
    Failed { error: String },
}

/// 续写的结果（附带新任务的 ID，配额暂停后可用它继续处理）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskRun {
    pub task_id: String,
    pub outcome: ProcessOutcome,
}

/// 编排器使用的存储
#[derive(Clone)]
pub struct Stores {
    pub tasks: Arc<dyn TaskRepository>,
    pub versions: Arc<dyn DocumentVersionStore>,
    pub documents: Arc<dyn DocumentStore>,
}

impl Stores {
    /// `<data_dir>` 下的 JSON 文件存储
    pub fn json(data_dir: impl AsRef<Path>) -> Self {
        let data_dir = data_dir.as_ref();
        Self {
            tasks: Arc::new(JsonFileTaskRepository::new(data_dir)),
            versions: Arc::new(JsonFileVersionStore::new(data_dir)),
            documents: Arc::new(JsonDocumentStore::new(data_dir)),
        }
    }

    /// 任务与版本放在内存中，文档由调用方提供
    pub fn in_memory(documents: Arc<dyn DocumentStore>) -> Self {
        Self {
            tasks: Arc::new(InMemoryTaskRepository::new()),
            versions: Arc::new(InMemoryVersionStore::new()),
            documents,
        }
    }
}

/// 一次改写调用的返回：`(槽位索引, 改写结果)`
type JoinedCall =
    std::result::Result<(usize, std::result::Result<String, CollaboratorError>), JoinError>;

/// 派发阶段的结局
enum DispatchEnd {
    Done,
    QuotaExhausted,
    Failed(String),
}

/// 派发过程中收集到的错误
#[derive(Default)]
struct DispatchState {
    quota: bool,
    failure: Option<String>,
    storage: Option<String>,
    /// 置位后不再派发新的调用
    halt: Arc<AtomicBool>,
}

impl DispatchState {
    fn halted(&self) -> bool {
        self.halt.load(Ordering::SeqCst)
    }

    fn fail(&mut self, message: String) {
        self.failure.get_or_insert(message);
        self.halt.store(true, Ordering::SeqCst);
    }

    fn storage_failed(&mut self, message: String) {
        self.storage.get_or_insert(message);
        self.halt.store(true, Ordering::SeqCst);
    }
}

/// 任务编排器
pub struct TaskOrchestrator {
    stores: Stores,
    flow: Arc<FragmentFlow>,
    engine: DocumentRewriteEngine,
    task_gate: ConcurrencyGate,
    fragment_width: usize,
    dispatch_delay: Duration,
    progress_every: usize,
    running: Mutex<HashSet<String>>,
}

impl TaskOrchestrator {
    /// 创建编排器（外层闸门在所有任务之间共享）
    pub fn new(config: &Config, paraphraser: Arc<dyn Paraphraser>, stores: Stores) -> Self {
        Self {
            stores,
            flow: Arc::new(FragmentFlow::new(
                paraphraser,
                RetryPolicy::from_config(config),
            )),
            engine: DocumentRewriteEngine::default(),
            task_gate: ConcurrencyGate::new(config.max_concurrent_tasks),
            fragment_width: config.max_concurrent_fragments.max(1),
            dispatch_delay: config.dispatch_delay(),
            progress_every: config.progress_every,
            running: Mutex::new(HashSet::new()),
        }
    }

    pub fn stores(&self) -> &Stores {
        &self.stores
    }

    /// 创建任务，返回任务 ID
    pub async fn create_task(&self, source_ref: &str) -> Result<String> {
        let task = Task::new(source_ref);
        self.stores.tasks.save(&task).await?;
        info!("📋 已创建任务 {} (源文档: {})", task.id, source_ref);
        Ok(task.id)
    }

    /// 追加片段，返回本次追加的数量
    pub async fn attach_fragments<I, S>(&self, task_id: &str, fragments: I) -> Result<usize>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let _running = RunningGuard::enter(&self.running, task_id)
            .ok_or_else(|| busy(task_id, "attach_fragments"))?;
        let mut task = self.load_task(task_id).await?;
        let added = task.attach_fragments(fragments)?;
        self.stores.tasks.save(&task).await?;
        info!(
            "📎 任务 {} 追加 {} 个片段（共 {} 个）",
            task_id,
            added,
            task.fragments.len()
        );
        Ok(added)
    }

    /// 任务状态摘要
    pub async fn task_status(&self, task_id: &str) -> Result<TaskSummary> {
        Ok(self.load_task(task_id).await?.summary())
    }

    /// 删除任务记录，返回任务是否存在
    pub async fn cleanup_task(&self, task_id: &str) -> Result<bool> {
        let removed = self.stores.tasks.delete(task_id).await?;
        if removed {
            info!("🗑️ 已清理任务 {}", task_id);
        }
        Ok(removed)
    }

    /// 处理任务
    ///
    /// 对 QuotaPaused / Failed 的任务再次调用时只派发仍为空的槽位；
    /// 对 Completed 的任务直接返回已有结果。
    ///
    /// 从进入排队到处理结束，同一任务的 `attach_fragments` / `process` 都会被拒绝。
    /// 处理过程中的存储错误会让任务进入 Failed（错误信息保留在任务上）。
    pub async fn process(
        &self,
        task_id: &str,
        sink: Option<&dyn ProgressSink>,
    ) -> Result<ProcessOutcome> {
        if let Some(outcome) = completed_outcome(&self.load_task(task_id).await?) {
            info!("✓ 任务 {} 已完成，直接返回结果", task_id);
            return Ok(outcome);
        }

        let _running =
            RunningGuard::enter(&self.running, task_id).ok_or_else(|| busy(task_id, "process"))?;
        let _task_permit = self.task_gate.acquire().await?;

        // 排队期间记录可能已被改动，拿到许可后重新读取
        let mut task = self.load_task(task_id).await?;
        if let Some(outcome) = completed_outcome(&task) {
            info!("✓ 任务 {} 已完成，直接返回结果", task_id);
            return Ok(outcome);
        }
        task.ensure_aligned()?;
        if task.fragments.is_empty() {
            return Err(ValidationError::NoFragments {
                task_id: task_id.to_string(),
            }
            .into());
        }

        match self.run(&mut task, sink).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                error!("❌ 任务 {} 处理中断: {}", task_id, e);
                match self.fail_task(&mut task, &e.to_string(), sink).await {
                    Ok(outcome) => Ok(outcome),
                    Err(save_err) => {
                        error!("❌ 任务 {} 无法保存失败状态: {}", task_id, save_err);
                        Err(e)
                    }
                }
            }
        }
    }

    /// 续写：在已有会话上追加新片段，从原始文档重新构建并生成下一版
    pub async fn continue_task<I, S>(
        &self,
        session_id: &str,
        new_fragments: I,
        sink: Option<&dyn ProgressSink>,
    ) -> Result<TaskRun>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let version = self
            .stores
            .versions
            .load(session_id)
            .await?
            .ok_or_else(|| RewriteError::not_found(format!("会话 {}", session_id)))?;

        let mut task = Task::continuation(
            session_id,
            &version.original_source_ref,
            version.fragment_history.clone(),
        );
        if task.attach_fragments(new_fragments)? == 0 {
            return Err(ValidationError::NoFragments {
                task_id: task.id.clone(),
            }
            .into());
        }
        self.stores.tasks.save(&task).await?;

        info!(
            "🔁 会话 {} 续写: 历史 {} 个片段 + 新增 {} 个 (当前版本 v{})",
            session_id,
            task.prior_fragments.len(),
            task.fragments.len(),
            version.version_number
        );

        let outcome = self.process(&task.id, sink).await?;
        Ok(TaskRun {
            task_id: task.id,
            outcome,
        })
    }

    // ========== 派发 ==========

    async fn run(&self, task: &mut Task, sink: Option<&dyn ProgressSink>) -> Result<ProcessOutcome> {
        task.error = None;
        task.set_status(TaskStatus::Processing);
        self.stores.tasks.save(task).await?;

        match self.dispatch(task, sink).await? {
            DispatchEnd::QuotaExhausted => self.pause_task(task, sink).await,
            DispatchEnd::Failed(message) => self.fail_task(task, &message, sink).await,
            DispatchEnd::Done => self.build(task, sink).await,
        }
    }

    async fn dispatch(
        &self,
        task: &mut Task,
        sink: Option<&dyn ProgressSink>,
    ) -> Result<DispatchEnd> {
        let pending = task.pending_indices();
        let total = task.fragments.len();
        if pending.is_empty() {
            return Ok(DispatchEnd::Done);
        }

        info!(
            "🚀 任务 {} 开始派发 {}/{} 个片段（并发 {}，间隔 {:?}）",
            task.id,
            pending.len(),
            total,
            self.fragment_width,
            self.dispatch_delay
        );

        let gate = ConcurrencyGate::new(self.fragment_width);
        let mut throttle = ProgressThrottle::new(total, self.progress_every, task.filled_count());
        let mut state = DispatchState::default();
        let halt = state.halt.clone();
        let mut calls = JoinSet::new();

        for index in pending {
            if state.halted() {
                break;
            }
            let permit = gate.acquire().await?;
            tokio::time::sleep(self.dispatch_delay).await;
            if state.halted() {
                break;
            }

            let fragment = &task.fragments[index];
            let ctx = FragmentCtx::new(&task.id, index, fragment.position_index, total);
            let text = fragment.original_text.clone();
            let flow = self.flow.clone();
            let halt_flag = halt.clone();

            calls.spawn(async move {
                let _permit = permit;
                let result = flow.run(&ctx, &text).await;
                if result.is_err() {
                    // 在归还许可之前置位，下一次派发一定能看到
                    halt_flag.store(true, Ordering::SeqCst);
                }
                (index, result)
            });

            while let Some(joined) = calls.try_join_next() {
                self.record(task, joined, &mut state, &mut throttle, sink)
                    .await;
            }
        }

        // 等待进行中的调用全部结束
        while let Some(joined) = calls.join_next().await {
            self.record(task, joined, &mut state, &mut throttle, sink)
                .await;
        }

        Ok(if let Some(message) = state.storage {
            DispatchEnd::Failed(message)
        } else if state.quota {
            DispatchEnd::QuotaExhausted
        } else if let Some(message) = state.failure {
            DispatchEnd::Failed(message)
        } else if task.is_fully_paraphrased() {
            DispatchEnd::Done
        } else {
            DispatchEnd::Failed("派发结束后仍有未改写的片段".to_string())
        })
    }

    /// 处理一个调用结果：写槽位、保存检查点、发送进度
    ///
    /// 出错时只记录到 `state` 并停止后续派发，进行中的调用照常收尾
    async fn record(
        &self,
        task: &mut Task,
        joined: JoinedCall,
        state: &mut DispatchState,
        throttle: &mut ProgressThrottle,
        sink: Option<&dyn ProgressSink>,
    ) {
        match joined {
            Ok((index, Ok(text))) => {
                if let Err(e) = task.fill_slot(index, text) {
                    error!("❌ 任务 {} 片段 {} 写入槽位失败: {}", task.id, index, e);
                    state.fail(format!("片段 {} 写入槽位失败: {}", index, e));
                    return;
                }
                if let Err(e) = self.stores.tasks.save(task).await {
                    error!("❌ 任务 {} 保存检查点失败: {}", task.id, e);
                    state.storage_failed(format!("保存检查点失败: {}", e));
                    return;
                }
                if let Some(message) = throttle.record(task.filled_count()) {
                    notify_quietly(sink, &task.id, &message).await;
                }
            }
            Ok((index, Err(e))) if e.is_quota() => {
                warn!("⏸️ 任务 {} 片段 {} 配额耗尽，停止派发: {}", task.id, index, e);
                state.quota = true;
            }
            Ok((index, Err(e))) => {
                error!("❌ 任务 {} 片段 {} 改写失败: {}", task.id, index, e);
                state.fail(format!("片段 {} 改写失败: {}", index, e));
            }
            Err(e) => {
                error!("❌ 任务 {} 的改写调用异常退出: {}", task.id, e);
                state.fail(format!("改写调用异常退出: {}", e));
            }
        }
    }

    // ========== 结局 ==========

    async fn pause_task(
        &self,
        task: &mut Task,
        sink: Option<&dyn ProgressSink>,
    ) -> Result<ProcessOutcome> {
        task.processed_count = task.filled_count();
        task.set_status(TaskStatus::QuotaPaused);
        self.stores.tasks.save(task).await?;

        let message = format!(
            "配额耗尽，已暂停: 已改写 {}/{} 个片段，稍后可继续",
            task.processed_count,
            task.fragments.len()
        );
        warn!("⏸️ 任务 {} {}", task.id, message);
        notify_quietly(sink, &task.id, &message).await;

        Ok(ProcessOutcome::QuotaPaused {
            processed_count: task.processed_count,
        })
    }

    async fn fail_task(
        &self,
        task: &mut Task,
        message: &str,
        sink: Option<&dyn ProgressSink>,
    ) -> Result<ProcessOutcome> {
        task.fail(message);
        self.stores.tasks.save(task).await?;

        let error = task.error.clone().unwrap_or_default();
        error!("❌ 任务 {} 失败: {}", task.id, error);
        notify_quietly(sink, &task.id, &format!("处理失败: {}", error)).await;

        Ok(ProcessOutcome::Failed { error })
    }

    async fn build(
        &self,
        task: &mut Task,
        sink: Option<&dyn ProgressSink>,
    ) -> Result<ProcessOutcome> {
        let report = match self.build_document(task).await {
            Ok(report) => report,
            Err(e) => return self.fail_task(task, &e.to_string(), sink).await,
        };

        task.set_status(TaskStatus::Completed);
        self.stores.tasks.save(task).await?;

        let result_ref = task.result_ref.clone().unwrap_or_default();
        let message = format!(
            "文档已生成: 替换 {}/{} 个片段",
            report.replaced_count,
            report.match_statuses.len()
        );
        info!("✅ 任务 {} {} → {}", task.id, message, result_ref);
        notify_quietly(sink, &task.id, &message).await;

        Ok(ProcessOutcome::Completed { result_ref })
    }

    /// 生成结果文档并记录版本
    ///
    /// 结果引用和报告先写入任务记录，再写版本记录；收尾失败后重试会复用已生成的结果，
    /// 版本号不会重复递增。
    async fn build_document(&self, task: &mut Task) -> Result<RewriteReport> {
        let (result_ref, report) = match built_result(task) {
            Some(built) => {
                info!("♻️ 任务 {} 的结果文档已生成，补记版本: {}", task.id, built.0);
                built
            }
            None => self.render(task).await?,
        };

        let version_number = self.record_version(task, &result_ref).await?;
        task.metadata.insert(
            "version_number".to_string(),
            serde_json::json!(version_number),
        );
        Ok(report)
    }

    /// 从原始文档重新构建并保存，匹配状态写回片段
    async fn render(&self, task: &mut Task) -> Result<(String, RewriteReport)> {
        let source = self.stores.documents.load(&task.source_ref).await?;
        let output = self
            .engine
            .apply_fragments(&source, &task.combined_fragments())?;
        let report = output.report;

        // 历史片段在前
        for (fragment, status) in task
            .prior_fragments
            .iter_mut()
            .chain(task.fragments.iter_mut())
            .zip(report.match_statuses.iter())
        {
            fragment.match_status = *status;
        }

        let next_number = self
            .stores
            .versions
            .load(&task.session_id)
            .await?
            .map_or(1, |v| v.version_number + 1);
        let name_hint = format!("{}_v{}", document_stem(&task.source_ref), next_number);
        let result_ref = self
            .stores
            .documents
            .save(&output.document, &name_hint)
            .await?;

        task.result_ref = Some(result_ref.clone());
        if let Ok(value) = serde_json::to_value(&report) {
            task.metadata.insert("rewrite_report".to_string(), value);
        }
        self.stores.tasks.save(task).await?;

        Ok((result_ref, report))
    }

    /// 写入版本记录；最新版本已指向该结果时不再递增
    async fn record_version(&self, task: &Task, result_ref: &str) -> Result<u32> {
        let previous = self.stores.versions.load(&task.session_id).await?;
        if let Some(previous) = &previous {
            if previous.result_ref == result_ref {
                return Ok(previous.version_number);
            }
        }

        let history = task.combined_fragments();
        let version = match previous {
            Some(previous) => previous.next(history, result_ref),
            None => DocumentVersion::first(&task.session_id, &task.source_ref, history, result_ref),
        };
        self.stores.versions.save(&version).await?;
        Ok(version.version_number)
    }

    async fn load_task(&self, task_id: &str) -> Result<Task> {
        self.stores
            .tasks
            .load(task_id)
            .await?
            .ok_or_else(|| RewriteError::not_found(format!("任务 {}", task_id)))
    }
}

/// 同一任务在本进程内只允许一个 `process` 同时运行
struct RunningGuard<'a> {
    running: &'a Mutex<HashSet<String>>,
    task_id: String,
}

impl<'a> RunningGuard<'a> {
    fn enter(running: &'a Mutex<HashSet<String>>, task_id: &str) -> Option<Self> {
        let mut set = running.lock().unwrap_or_else(PoisonError::into_inner);
        if !set.insert(task_id.to_string()) {
            return None;
        }
        Some(Self {
            running,
            task_id: task_id.to_string(),
        })
    }
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.task_id);
    }
}

/// 已完成任务的结果
fn completed_outcome(task: &Task) -> Option<ProcessOutcome> {
    if task.status != TaskStatus::Completed {
        return None;
    }
    task.result_ref
        .clone()
        .map(|result_ref| ProcessOutcome::Completed { result_ref })
}

/// 之前已生成、但任务没有走到 Completed 的结果
fn built_result(task: &Task) -> Option<(String, RewriteReport)> {
    let result_ref = task.result_ref.clone()?;
    let report = serde_json::from_value(task.metadata.get("rewrite_report")?.clone()).ok()?;
    Some((result_ref, report))
}

/// 同一任务已有操作在进行中
fn busy(task_id: &str, operation: &str) -> ValidationError {
    ValidationError::InvalidState {
        task_id: task_id.to_string(),
        status: TaskStatus::Processing.to_string(),
        operation: operation.to_string(),
    }
}

/// 源文档引用的文件名部分（用于生成结果文档名）
fn document_stem(source_ref: &str) -> String {
    Path::new(source_ref)
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "document".to_string())
}
