use serde::{Deserialize, Serialize};
use std::fmt;

/// 片段的定位方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    /// 未找到，原文保持不变
    #[default]
    Unmatched,
    /// 原文在单个段落中逐字出现
    Exact,
    /// 规范化后在单个段落中出现
    Normalized,
    /// 规范化后跨多个相邻段落出现
    MultiBlock,
    /// 关键词兜底匹配
    Keyword,
}

impl MatchStatus {
    pub fn is_matched(self) -> bool {
        self != MatchStatus::Unmatched
    }
}

impl fmt::Display for MatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MatchStatus::Unmatched => "unmatched",
            MatchStatus::Exact => "exact",
            MatchStatus::Normalized => "normalized",
            MatchStatus::MultiBlock => "multi_block",
            MatchStatus::Keyword => "keyword",
        };
        f.write_str(name)
    }
}

/// 待改写的文本片段
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fragment {
    /// 稳定序号（从 0 开始）
    pub position_index: usize,
    pub original_text: String,
    /// 派发完成后填入
    #[serde(default)]
    pub paraphrased_text: Option<String>,
    #[serde(default)]
    pub match_status: MatchStatus,
}

impl Fragment {
    pub fn new(position_index: usize, original_text: impl Into<String>) -> Self {
        Self {
            position_index,
            original_text: original_text.into(),
            paraphrased_text: None,
            match_status: MatchStatus::Unmatched,
        }
    }

    /// 由有序文本列表构造片段，序号从 `offset` 开始
    pub fn from_texts<I, S>(texts: I, offset: usize) -> Vec<Fragment>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        texts
            .into_iter()
            .enumerate()
            .map(|(i, text)| Fragment::new(offset + i, text))
            .collect()
    }
}
