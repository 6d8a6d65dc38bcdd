use super::{ActualSpan, BlockView, FragmentQuery, MatchStrategy, MAX_JOINED_BLOCKS};
use crate::models::MatchStatus;

/// 规范化后在单个段落中出现
pub struct NormalizedSingleBlockMatch;

impl MatchStrategy for NormalizedSingleBlockMatch {
    fn name(&self) -> &'static str {
        "normalized"
    }

    fn status(&self) -> MatchStatus {
        MatchStatus::Normalized
    }

    fn locate(&self, query: &FragmentQuery, view: &BlockView) -> Option<ActualSpan> {
        (0..view.len()).find_map(|i| {
            let norm = view.normalized(i);
            let range = norm.find(&query.normalized)?;
            norm.raw_bounds(range).map(ActualSpan::from_bounds)
        })
    }
}

/// 规范化后跨越相邻段落出现（段落之间以单个空格拼接）
pub struct NormalizedMultiBlockMatch {
    max_blocks: usize,
}

impl Default for NormalizedMultiBlockMatch {
    fn default() -> Self {
        Self {
            max_blocks: MAX_JOINED_BLOCKS,
        }
    }
}

impl NormalizedMultiBlockMatch {
    pub fn new(max_blocks: usize) -> Self {
        Self { max_blocks }
    }
}

impl MatchStrategy for NormalizedMultiBlockMatch {
    fn name(&self) -> &'static str {
        "multi_block"
    }

    fn status(&self) -> MatchStatus {
        MatchStatus::MultiBlock
    }

    fn locate(&self, query: &FragmentQuery, view: &BlockView) -> Option<ActualSpan> {
        for start in 0..view.len() {
            // 起始段落为空时，同样的拼接结果会在下一个起点出现
            if view.normalized(start).is_empty() {
                continue;
            }
            for count in 2..=self.max_blocks {
                if start + count > view.len() {
                    break;
                }
                let joined = view.joined(start, count);
                if let Some(range) = joined.find(&query.normalized) {
                    if let Some(bounds) = joined.raw_bounds(range) {
                        return Some(ActualSpan::from_bounds(bounds));
                    }
                }
            }
        }
        None
    }
}
