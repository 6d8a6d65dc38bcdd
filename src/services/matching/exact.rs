use super::{ActualSpan, BlockView, FragmentQuery, MatchStrategy};
use crate::models::MatchStatus;

/// 原文在单个段落中逐字出现
pub struct ExactMatch;

impl MatchStrategy for ExactMatch {
    fn name(&self) -> &'static str {
        "exact"
    }

    fn status(&self) -> MatchStatus {
        MatchStatus::Exact
    }

    fn locate(&self, query: &FragmentQuery, view: &BlockView) -> Option<ActualSpan> {
        if query.raw.is_empty() {
            return None;
        }
        (0..view.len()).find_map(|i| {
            view.text(i)
                .find(&query.raw)
                .map(|start| ActualSpan::single(i, start, start + query.raw.len()))
        })
    }
}
