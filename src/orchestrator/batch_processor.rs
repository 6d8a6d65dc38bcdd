//! 批量任务处理器 - 编排层
//!
//! ## 职责
//!
//! 本模块是整个应用的入口，负责批量改写任务的加载、调度和统计。
//!
//! ## 核心功能
//!
//! 1. **应用初始化**：校验配置、创建存储和改写服务
//! 2. **批量加载**：扫描并加载所有待处理的任务文件（`Vec<RewriteJob>`）
//! 3. **并发控制**：所有任务同时提交，由编排器的外层闸门限制同时处理的数量
//! 4. **全局统计**：汇总完成 / 暂停 / 失败的数量
//!
//! ## 设计特点
//!
//! - **顶层编排**：不处理单个片段的细节
//! - **向下委托**：委托 `TaskOrchestrator` 处理单个任务

use anyhow::Result;
use futures::future::join_all;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::models::RewriteJob;
use crate::orchestrator::task_orchestrator::{ProcessOutcome, Stores, TaskOrchestrator};
use crate::services::{OpenAiParaphraser, Paraphraser, TracingProgressSink};
use crate::utils::logging::{log_jobs_loaded, log_startup, print_final_stats};

/// 应用主结构
pub struct App {
    config: Config,
    orchestrator: TaskOrchestrator,
}

impl App {
    /// 初始化应用（JSON 文件存储 + OpenAI 兼容改写服务）
    pub fn initialize(config: Config) -> Result<Self> {
        config.validate()?;
        log_startup(config.max_concurrent_tasks, config.max_concurrent_fragments);

        let paraphraser: Arc<dyn Paraphraser> = Arc::new(OpenAiParaphraser::new(&config));
        let stores = Stores::json(&config.data_dir);
        Ok(Self::with_parts(config, paraphraser, stores))
    }

    /// 使用指定的改写服务和存储创建应用
    pub fn with_parts(config: Config, paraphraser: Arc<dyn Paraphraser>, stores: Stores) -> Self {
        let orchestrator = TaskOrchestrator::new(&config, paraphraser, stores);
        Self {
            config,
            orchestrator,
        }
    }

    pub fn orchestrator(&self) -> &TaskOrchestrator {
        &self.orchestrator
    }

    /// 运行应用主逻辑
    pub async fn run(&self) -> Result<ProcessingStats> {
        info!("\n📁 正在扫描待处理的任务文件...");
        let jobs = crate::models::load_all_toml_files(&self.config.jobs_folder).await?;

        if jobs.is_empty() {
            warn!("⚠️ 没有找到待处理的TOML文件，程序结束");
            return Ok(ProcessingStats::default());
        }
        log_jobs_loaded(jobs.len());

        let stats = self.process_all_jobs(jobs).await;
        print_final_stats(stats.completed, stats.paused, stats.failed, stats.total);
        Ok(stats)
    }

    /// 并发处理所有任务文件
    pub async fn process_all_jobs(&self, jobs: Vec<RewriteJob>) -> ProcessingStats {
        let mut stats = ProcessingStats {
            total: jobs.len(),
            ..Default::default()
        };

        let results = join_all(jobs.iter().map(|job| self.process_job(job))).await;

        for (job, result) in jobs.iter().zip(results) {
            match result {
                Ok(ProcessOutcome::Completed { result_ref }) => {
                    info!("[{}] ✓ 已完成 → {}", job.display_name(), result_ref);
                    stats.completed += 1;
                }
                Ok(ProcessOutcome::QuotaPaused { processed_count }) => {
                    warn!(
                        "[{}] ⏸️ 配额耗尽，已改写 {} 个片段，稍后可继续",
                        job.display_name(),
                        processed_count
                    );
                    stats.paused += 1;
                }
                Ok(ProcessOutcome::Failed { error }) => {
                    error!("[{}] ❌ 处理失败: {}", job.display_name(), error);
                    stats.failed += 1;
                }
                Err(e) => {
                    error!("[{}] ❌ 处理过程中发生错误: {}", job.display_name(), e);
                    stats.failed += 1;
                }
            }
        }

        stats
    }

    /// 处理单个任务文件：新建任务或在已有会话上续写
    async fn process_job(&self, job: &RewriteJob) -> crate::error::Result<ProcessOutcome> {
        let sink = TracingProgressSink;
        info!(
            "[{}] 📄 开始处理: {} 个片段",
            job.display_name(),
            job.fragments.len()
        );

        match &job.session {
            Some(session_id) => {
                let run = self
                    .orchestrator
                    .continue_task(session_id, job.fragments.iter().cloned(), Some(&sink))
                    .await?;
                info!("[{}] 续写任务 ID: {}", job.display_name(), run.task_id);
                Ok(run.outcome)
            }
            None => {
                let task_id = self.orchestrator.create_task(&job.source).await?;
                self.orchestrator
                    .attach_fragments(&task_id, job.fragments.iter().cloned())
                    .await?;
                info!(
                    "[{}] 任务 ID: {}（会话 ID 相同，可用于续写）",
                    job.display_name(),
                    task_id
                );
                self.orchestrator.process(&task_id, Some(&sink)).await
            }
        }
    }
}

/// 处理统计
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ProcessingStats {
    pub completed: usize,
    pub paused: usize,
    pub failed: usize,
    pub total: usize,
}
