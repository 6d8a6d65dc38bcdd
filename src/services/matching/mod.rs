//! 片段定位 - 匹配策略链
//!
//! 按固定顺序尝试各个策略，第一个命中的结果生效：
//! 精确匹配 → 规范化单段落 → 规范化多段落 → 关键词兜底。
//! 每个策略都按文档顺序扫描全部段落，因此同一文本出现多次时取第一次出现。

mod exact;
mod keyword;
mod normalized;

pub use exact::ExactMatch;
pub use keyword::KeywordMatch;
pub use normalized::{NormalizedMultiBlockMatch, NormalizedSingleBlockMatch};

use crate::models::{Block, MatchStatus};
use crate::services::normalizer::{normalize, MappedChar, NormalizedText, RawPos};
use tracing::debug;

/// 多段落匹配最多拼接的段落数
pub const MAX_JOINED_BLOCKS: usize = 5;

/// 原文中的实际区间（字节偏移，左闭右开）
///
/// `start` 是 `start_block` 内的偏移，`end` 是 `end_block` 内的偏移。
/// 单段落匹配时两者相同。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActualSpan {
    pub start_block: usize,
    pub start: usize,
    pub end_block: usize,
    pub end: usize,
}

impl ActualSpan {
    /// 单个段落内的区间
    pub fn single(block: usize, start: usize, end: usize) -> Self {
        Self {
            start_block: block,
            start,
            end_block: block,
            end,
        }
    }

    pub fn is_single_block(&self) -> bool {
        self.start_block == self.end_block
    }

    fn from_bounds((start, end): (RawPos, RawPos)) -> Self {
        Self {
            start_block: start.block,
            start: start.offset,
            end_block: end.block,
            end: end.offset,
        }
    }
}

/// 待定位的片段（原文 + 规范化文本）
#[derive(Debug, Clone)]
pub struct FragmentQuery {
    pub raw: String,
    pub normalized: String,
}

impl FragmentQuery {
    pub fn new(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let normalized = normalize(&raw);
        Self { raw, normalized }
    }
}

/// 一组段落的只读视图，规范化结果只计算一次
pub struct BlockView {
    texts: Vec<String>,
    normalized: Vec<NormalizedText>,
}

impl BlockView {
    pub fn new(blocks: &[Block]) -> Self {
        let texts: Vec<String> = blocks.iter().map(Block::text).collect();
        let normalized = texts
            .iter()
            .enumerate()
            .map(|(i, text)| {
                let norm = NormalizedText::new(text);
                let chars = norm
                    .chars()
                    .iter()
                    .map(|c| MappedChar { block: i, ..*c })
                    .collect();
                NormalizedText::from_chars(chars)
            })
            .collect();
        Self { texts, normalized }
    }

    pub fn len(&self) -> usize {
        self.texts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.texts.is_empty()
    }

    pub fn text(&self, index: usize) -> &str {
        &self.texts[index]
    }

    pub fn normalized(&self, index: usize) -> &NormalizedText {
        &self.normalized[index]
    }

    /// 从 `start` 开始拼接 `count` 个段落的规范化文本
    pub fn joined(&self, start: usize, count: usize) -> NormalizedText {
        let end = (start + count).min(self.len());
        NormalizedText::join(
            (start..end)
                .map(|i| (i, self.normalized[i].clone()))
                .collect(),
        )
    }
}

/// 匹配策略
pub trait MatchStrategy: Send + Sync {
    /// 策略名称（用于日志）
    fn name(&self) -> &'static str;

    /// 命中时记录的匹配状态
    fn status(&self) -> MatchStatus;

    /// 在段落序列中定位片段，返回第一个命中的区间
    fn locate(&self, query: &FragmentQuery, view: &BlockView) -> Option<ActualSpan>;
}

/// 定位结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FragmentMatch {
    pub span: ActualSpan,
    pub status: MatchStatus,
}

/// 有序的策略链
pub struct MatchChain {
    strategies: Vec<Box<dyn MatchStrategy>>,
}

impl Default for MatchChain {
    fn default() -> Self {
        Self::new(vec![
            Box::new(ExactMatch),
            Box::new(NormalizedSingleBlockMatch),
            Box::new(NormalizedMultiBlockMatch::default()),
            Box::new(KeywordMatch::default()),
        ])
    }
}

impl MatchChain {
    pub fn new(strategies: Vec<Box<dyn MatchStrategy>>) -> Self {
        Self { strategies }
    }

    /// 依次尝试各个策略
    pub fn locate(&self, query: &FragmentQuery, view: &BlockView) -> Option<FragmentMatch> {
        if query.normalized.is_empty() || view.is_empty() {
            return None;
        }
        for strategy in &self.strategies {
            if let Some(span) = strategy.locate(query, view) {
                debug!(
                    "策略 {} 命中: 段落 {}..={} [{}, {})",
                    strategy.name(),
                    span.start_block,
                    span.end_block,
                    span.start,
                    span.end
                );
                return Some(FragmentMatch {
                    span,
                    status: strategy.status(),
                });
            }
        }
        None
    }
}
