use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::fragment::Fragment;

/// 文档版本记录
///
/// 每次续写都从 `original_source_ref` 重新构建（使用“历史 + 新片段”），
/// 从不基于上一版的输出，避免格式漂移累积。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentVersion {
    pub session_id: String,
    pub original_source_ref: String,
    /// 迄今为止所有已改写的片段（按序号排列）
    pub fragment_history: Vec<Fragment>,
    pub version_number: u32,
    /// 本版本输出文档的引用
    pub result_ref: String,
    pub updated_at: DateTime<Utc>,
}

impl DocumentVersion {
    /// 首次构建成功后创建第 1 版
    pub fn first(
        session_id: impl Into<String>,
        original_source_ref: impl Into<String>,
        fragment_history: Vec<Fragment>,
        result_ref: impl Into<String>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            original_source_ref: original_source_ref.into(),
            fragment_history,
            version_number: 1,
            result_ref: result_ref.into(),
            updated_at: Utc::now(),
        }
    }

    /// 基于当前版本生成下一版
    pub fn next(&self, fragment_history: Vec<Fragment>, result_ref: impl Into<String>) -> Self {
        Self {
            session_id: self.session_id.clone(),
            original_source_ref: self.original_source_ref.clone(),
            fragment_history,
            version_number: self.version_number + 1,
            result_ref: result_ref.into(),
            updated_at: Utc::now(),
        }
    }
}
