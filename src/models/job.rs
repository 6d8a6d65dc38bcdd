use serde::{Deserialize, Serialize};

/// 一个待处理的改写任务文件（TOML）
///
/// ```toml
/// source = "thesis.json"
/// # 可选：在已有会话上续写
/// session = "5b0c..."
/// fragments = ["第一段需要改写的文本", "第二段"]
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewriteJob {
    /// 原始文档引用
    pub source: String,
    /// 续写的会话 ID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session: Option<String>,
    /// 按顺序排列的待改写片段
    pub fragments: Vec<String>,
    #[serde(skip_serializing, skip_deserializing)]
    pub file_path: Option<String>,
}

impl RewriteJob {
    /// 任务文件名（用于日志）
    pub fn display_name(&self) -> String {
        self.file_path
            .as_deref()
            .and_then(|p| std::path::Path::new(p).file_name())
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.source.clone())
    }
}
