//! # Paraphrase Rewrite
//!
//! 在结构化文档中定位指定片段，用 AI 改写结果替换，同时保留逐字符的格式；
//! 配额耗尽时暂停，稍后可继续处理。
//!
//! ## 架构设计
//!
//! 本系统采用严格的四层架构：
//!
//! ### ① 基础设施层（Infrastructure）
//! - `infrastructure/` - 持久化，只负责存取
//! - `TaskRepository` - 任务记录（唯一的真相来源）
//! - `DocumentVersionStore` - 每个会话的最新文档版本
//! - `DocumentStore` - 读写 Block / Run 文档树
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 描述"我能做什么"
//! - `normalizer` - 比较用的文本规范化（带原文位置映射）
//! - `matching` - 有序的匹配策略链
//! - `FormattingPreservingReplacer` - 保留格式的区间替换
//! - `DocumentRewriteEngine` - 在文档副本上应用全部片段
//! - `Paraphraser` - 外部改写能力
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - 定义"一个片段"的改写流程
//! - `FragmentCtx` - 上下文封装（task_id + 槽位索引）
//! - `FragmentFlow` - 调用改写服务并按策略重试
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/task_orchestrator` - 任务状态机、并发派发、配额暂停与续写
//! - `orchestrator/batch_processor` - 批量任务文件处理器
//!
//! ## 模块结构

pub mod config;
pub mod error;
pub mod infrastructure;

pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use config::Config;
pub use error::{Result, RewriteError};
pub use models::{Block, Document, Fragment, MatchStatus, Run, RunFormatting, Task, TaskStatus};
pub use orchestrator::{App, ProcessOutcome, Stores, TaskOrchestrator};
pub use services::{DocumentRewriteEngine, Paraphraser, ProgressSink};
pub use workflow::{FragmentCtx, FragmentFlow};
