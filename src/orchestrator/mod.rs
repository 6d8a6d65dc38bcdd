//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层负责任务调度和批量处理，是整个系统的"指挥中心"。
//!
//! ## 模块划分
//!
//! ### `batch_processor` - 批量任务处理器
//! - 管理应用生命周期（初始化、运行）
//! - 批量加载任务文件（Vec<RewriteJob>）
//! - 输出全局统计信息
//!
//! ### `task_orchestrator` - 单个任务编排器
//! - 驱动任务状态机（Created → Processing → Completed / Failed / QuotaPaused）
//! - 两层闸门派发片段，配额耗尽时暂停
//! - 槽位检查点、文档重建、版本记录
//!
//! ### `gate` - 并发闸门
//!
//! ## 层次关系
//!
//! ```text
//! batch_processor (处理 Vec<RewriteJob>)
//!     ↓
//! task_orchestrator (处理 Vec<Fragment>)
//!     ↓
//! workflow::FragmentFlow (处理单个 Fragment)
//!     ↓
//! services (能力层：paraphrase / match / replace / rewrite)
//!     ↓
//! infrastructure (基础设施：任务、版本、文档存储)
//! ```
//!
//! ## 设计原则
//!
//! 1. **单一职责**：batch_processor 管批量，task_orchestrator 管单个任务
//! 2. **单一写者**：只有 task_orchestrator 写任务记录
//! 3. **向下依赖**：编排层 → workflow → services → infrastructure

pub mod batch_processor;
pub mod gate;
pub mod task_orchestrator;

// 重新导出主要类型
pub use batch_processor::{App, ProcessingStats};
pub use gate::ConcurrencyGate;
pub use task_orchestrator::{ProcessOutcome, Stores, TaskOrchestrator, TaskRun};
