//! 片段处理上下文
//!
//! 封装"我正在处理哪个任务的第几个片段"这一信息

use std::fmt::Display;

/// 片段处理上下文
#[derive(Debug, Clone)]
pub struct FragmentCtx {
    /// 任务ID
    pub task_id: String,

    /// 片段在任务中的槽位索引（从0开始）
    pub slot_index: usize,

    /// 片段在整个会话中的序号
    pub position_index: usize,

    /// 本任务片段总数（仅用于日志显示）
    pub total: usize,
}

impl FragmentCtx {
    /// 创建新的片段上下文
    pub fn new(
        task_id: impl Into<String>,
        slot_index: usize,
        position_index: usize,
        total: usize,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            slot_index,
            position_index,
            total,
        }
    }
}

impl Display for FragmentCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let short = self.task_id.get(..8).unwrap_or(&self.task_id);
        write!(
            f,
            "[任务 {} 片段 {}/{} 序号#{}]",
            short,
            self.slot_index + 1,
            self.total,
            self.position_index
        )
    }
}
