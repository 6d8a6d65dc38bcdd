//! 改写任务
//!
//! 任务记录是唯一的持久化真相来源，足以在进程重启后继续处理。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::error::ValidationError;
use crate::models::fragment::Fragment;
use crate::utils::truncate_text;

/// 任务错误信息的最大长度（字符）
pub const MAX_ERROR_LEN: usize = 500;

/// 任务状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Created,
    Processing,
    Completed,
    Failed,
    /// 配额耗尽后的部分完成状态，可再次处理
    QuotaPaused,
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TaskStatus::Created => "created",
            TaskStatus::Processing => "processing",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::QuotaPaused => "quota_paused",
        };
        f.write_str(name)
    }
}

/// 改写任务
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    /// 所属会话，首个任务的会话 ID 即任务 ID
    pub session_id: String,
    /// 原始文档引用
    pub source_ref: String,
    /// 本任务需要派发的片段（顺序固定）
    pub fragments: Vec<Fragment>,
    /// 与 `fragments` 按索引对齐的改写结果，每个槽位只写一次
    pub paraphrased: Vec<Option<String>>,
    /// 续写任务继承的历史片段（已改写，不再派发）
    #[serde(default)]
    pub prior_fragments: Vec<Fragment>,
    pub status: TaskStatus,
    pub processed_count: usize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub result_ref: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl Task {
    /// 创建新任务（片段稍后通过 `attach_fragments` 逐步加入）
    pub fn new(source_ref: impl Into<String>) -> Self {
        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now();
        Self {
            session_id: id.clone(),
            id,
            source_ref: source_ref.into(),
            fragments: Vec::new(),
            paraphrased: Vec::new(),
            prior_fragments: Vec::new(),
            status: TaskStatus::Created,
            processed_count: 0,
            created_at: now,
            updated_at: now,
            completed_at: None,
            result_ref: None,
            error: None,
            metadata: HashMap::new(),
        }
    }

    /// 创建续写任务：继承会话与历史片段
    pub fn continuation(
        session_id: impl Into<String>,
        source_ref: impl Into<String>,
        prior_fragments: Vec<Fragment>,
    ) -> Self {
        let mut task = Self::new(source_ref);
        task.session_id = session_id.into();
        task.prior_fragments = prior_fragments;
        task
    }

    /// 追加片段，同时为每个片段分配一个空的改写槽位
    pub fn attach_fragments<I, S>(&mut self, texts: I) -> Result<usize, ValidationError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if matches!(self.status, TaskStatus::Processing | TaskStatus::Completed) {
            return Err(self.invalid_state("attach_fragments"));
        }
        let offset = self.prior_fragments.len() + self.fragments.len();
        let added = Fragment::from_texts(texts, offset);
        let count = added.len();
        self.paraphrased.extend(std::iter::repeat(None).take(count));
        self.fragments.extend(added);
        if count > 0 {
            // 之前生成过但没有收尾的结果已经过时
            self.result_ref = None;
            self.metadata.remove("rewrite_report");
        }
        self.touch();
        Ok(count)
    }

    /// 检查片段与槽位是否按索引对齐
    pub fn ensure_aligned(&self) -> Result<(), ValidationError> {
        if self.fragments.len() != self.paraphrased.len() {
            return Err(ValidationError::LengthMismatch {
                originals: self.fragments.len(),
                paraphrased: self.paraphrased.len(),
            });
        }
        Ok(())
    }

    /// 尚未改写的槽位索引（升序）
    pub fn pending_indices(&self) -> Vec<usize> {
        self.paraphrased
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.is_none())
            .map(|(i, _)| i)
            .collect()
    }

    /// 写入一个改写槽位（只允许写一次）
    pub fn fill_slot(&mut self, index: usize, text: String) -> Result<(), ValidationError> {
        let len = self.paraphrased.len();
        let slot = self
            .paraphrased
            .get_mut(index)
            .ok_or(ValidationError::SlotOutOfRange { index, len })?;
        if slot.is_some() {
            return Err(ValidationError::SlotAlreadyFilled { index });
        }
        *slot = Some(text);
        self.processed_count = self.filled_count();
        self.touch();
        Ok(())
    }

    /// 已写入的槽位数量
    pub fn filled_count(&self) -> usize {
        self.paraphrased.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_fully_paraphrased(&self) -> bool {
        self.paraphrased.iter().all(Option::is_some)
    }

    /// 状态迁移
    pub fn set_status(&mut self, status: TaskStatus) {
        self.status = status;
        self.touch();
        match status {
            TaskStatus::Completed | TaskStatus::Failed => self.completed_at = Some(self.updated_at),
            _ => self.completed_at = None,
        }
    }

    /// 标记失败，错误信息截断到固定长度
    pub fn fail(&mut self, message: &str) {
        self.error = Some(truncate_text(message, MAX_ERROR_LEN - 3));
        self.set_status(TaskStatus::Failed);
    }

    /// 完整的片段序列：历史片段在前，本任务片段在后（改写文本来自槽位）
    pub fn combined_fragments(&self) -> Vec<Fragment> {
        let current = self
            .fragments
            .iter()
            .zip(self.paraphrased.iter())
            .map(|(fragment, slot)| Fragment {
                paraphrased_text: slot.clone(),
                ..fragment.clone()
            });
        self.prior_fragments.iter().cloned().chain(current).collect()
    }

    pub fn summary(&self) -> TaskSummary {
        TaskSummary {
            task_id: self.id.clone(),
            status: self.status,
            fragments_count: self.fragments.len(),
            processed_count: self.processed_count,
            created_at: self.created_at,
            completed_at: self.completed_at,
            error: self.error.clone(),
        }
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    fn invalid_state(&self, operation: &str) -> ValidationError {
        ValidationError::InvalidState {
            task_id: self.id.clone(),
            status: self.status.to_string(),
            operation: operation.to_string(),
        }
    }
}

/// 任务状态摘要
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskSummary {
    pub task_id: String,
    pub status: TaskStatus,
    pub fragments_count: usize,
    pub processed_count: usize,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}
