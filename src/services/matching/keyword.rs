//! 关键词兜底匹配
//!
//! 从规范化片段中提取长度 ≥ 4 的词作为关键词，在段落中找到关键词覆盖的范围，
//! 左右各扩展若干字符作为候选，再按词重合度判定是否接受。

use super::{ActualSpan, BlockView, FragmentQuery, MatchStrategy};
use crate::models::MatchStatus;
use crate::services::normalizer::NormalizedText;
use regex::Regex;
use std::collections::HashSet;
use std::ops::Range;
use std::sync::LazyLock;

static KEYWORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\w{4,}\b").expect("静态正则表达式"));

/// 关键词匹配参数
pub struct KeywordMatch {
    /// 尝试关键词匹配所需的最少关键词数
    pub min_keywords: usize,
    /// 单段落中至少命中的关键词数
    pub min_hits_single: usize,
    /// 尝试多段落匹配所需的最少关键词数
    pub min_keywords_multi: usize,
    /// 多段落中至少命中的关键词数
    pub min_hits_multi: usize,
    /// 多段落匹配最多拼接的段落数
    pub max_blocks: usize,
    /// 候选区间左右扩展的字符数
    pub padding_chars: usize,
    /// 接受候选所需的词重合比例
    pub min_overlap: f64,
}

impl Default for KeywordMatch {
    fn default() -> Self {
        Self {
            min_keywords: 3,
            min_hits_single: 2,
            min_keywords_multi: 5,
            min_hits_multi: 3,
            max_blocks: 3,
            padding_chars: 50,
            min_overlap: 0.6,
        }
    }
}

impl MatchStrategy for KeywordMatch {
    fn name(&self) -> &'static str {
        "keyword"
    }

    fn status(&self) -> MatchStatus {
        MatchStatus::Keyword
    }

    fn locate(&self, query: &FragmentQuery, view: &BlockView) -> Option<ActualSpan> {
        let keywords = keyword_patterns(&query.normalized);
        if keywords.len() < self.min_keywords {
            return None;
        }

        for i in 0..view.len() {
            let found = self.locate_in(
                view.normalized(i),
                &keywords,
                &query.normalized,
                self.min_hits_single,
            );
            if found.is_some() {
                return found;
            }
        }

        if keywords.len() < self.min_keywords_multi {
            return None;
        }
        for start in 0..view.len() {
            for count in 2..=self.max_blocks {
                if start + count > view.len() {
                    break;
                }
                let joined = view.joined(start, count);
                if let Some(span) =
                    self.locate_in(&joined, &keywords, &query.normalized, self.min_hits_multi)
                {
                    return Some(span);
                }
            }
        }
        None
    }
}

impl KeywordMatch {
    fn locate_in(
        &self,
        haystack: &NormalizedText,
        keywords: &[Regex],
        fragment: &str,
        min_hits: usize,
    ) -> Option<ActualSpan> {
        let hits: Vec<Range<usize>> = keywords
            .iter()
            .filter_map(|re| re.find(haystack.as_str()).map(|m| m.range()))
            .collect();
        if hits.len() < min_hits {
            return None;
        }

        let covered = hits.iter().map(|r| r.start).min()?..hits.iter().map(|r| r.end).max()?;
        let wide = haystack.widen(covered.clone(), self.padding_chars);
        let candidate = snap_to_words(haystack.as_str(), wide, &covered);

        if word_overlap(fragment, &haystack.as_str()[candidate.clone()]) < self.min_overlap {
            return None;
        }
        haystack.raw_bounds(candidate).map(ActualSpan::from_bounds)
    }
}

/// 去重后的关键词（不区分大小写、按整词匹配）
fn keyword_patterns(fragment: &str) -> Vec<Regex> {
    let mut seen = HashSet::new();
    KEYWORD
        .find_iter(fragment)
        .map(|m| m.as_str())
        .filter(|w| seen.insert(w.to_lowercase()))
        .filter_map(|w| Regex::new(&format!(r"(?i)\b{}\b", regex::escape(w))).ok())
        .collect()
}

/// 把扩展后的区间收缩到完整的词上，且不切入关键词覆盖的范围
fn snap_to_words(text: &str, wide: Range<usize>, covered: &Range<usize>) -> Range<usize> {
    let mut start = wide.start;
    if start > 0 {
        if let Some(ws) = text[start..covered.start].find(char::is_whitespace) {
            start += ws;
        }
    }
    let mut end = wide.end;
    if end < text.len() {
        if let Some(ws) = text[covered.end..end].rfind(char::is_whitespace) {
            end = covered.end + ws;
        }
    }
    let slice = &text[start..end];
    let lead = slice.len() - slice.trim_start().len();
    let trail = slice.len() - slice.trim_end().len();
    start + lead..end - trail
}

/// 片段的词在候选中出现的比例（小写、按空白切分、去重）
fn word_overlap(fragment: &str, candidate: &str) -> f64 {
    let fragment_words: HashSet<String> =
        fragment.split_whitespace().map(str::to_lowercase).collect();
    if fragment_words.is_empty() {
        return 0.0;
    }
    let candidate_words: HashSet<String> =
        candidate.split_whitespace().map(str::to_lowercase).collect();
    let overlap = fragment_words.intersection(&candidate_words).count();
    overlap as f64 / fragment_words.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Block;

    #[test]
    fn test_keyword_match_tolerates_small_differences() {
        let paragraph = "Предисловие к работе. Исследование показывает, что глубокое обучение \
                         существенно улучшает качество распознавания речи. Далее по тексту.";
        let blocks = vec![Block::from_text(paragraph)];
        let view = BlockView::new(&blocks);
        // 有一个词不同，无法精确匹配
        let query = FragmentQuery::new(
            "Исследование показывает, что глубокое обучение заметно улучшает качество распознавания речи.",
        );

        let span = KeywordMatch::default().locate(&query, &view).unwrap();
        let matched = &paragraph[span.start..span.end];
        assert!(matched.contains("Исследование показывает"));
        assert!(matched.contains("распознавания речи."));
    }

    #[test]
    fn test_too_few_keywords_are_rejected() {
        let blocks = vec![Block::from_text("the cat sat on a mat")];
        let view = BlockView::new(&blocks);
        assert!(KeywordMatch::default()
            .locate(&FragmentQuery::new("the cat sat on the mat"), &view)
            .is_none());
    }

    #[test]
    fn test_low_overlap_is_rejected() {
        let blocks = vec![Block::from_text(
            "alpha bravo charlie and a lot of completely unrelated words around here",
        )];
        let view = BlockView::new(&blocks);
        let query = FragmentQuery::new("alpha bravo charlie delta echo foxtrot golf hotel india");
        assert!(KeywordMatch::default().locate(&query, &view).is_none());
    }

    #[test]
    fn test_keywords_match_whole_words_only() {
        let patterns = keyword_patterns("кошка сидела тихо");
        assert_eq!(patterns.len(), 3);
        let sat = &patterns[1];
        assert!(sat.is_match("Кошка СИДЕЛА у окна"));
        assert!(!sat.is_match("она засиделась допоздна"));
    }

    #[test]
    fn test_keyword_inside_longer_word_does_not_widen_span() {
        // "Засиделась" 中含有 "сидела"，但不是同一个词
        let paragraph = "Засиделась допоздна. \
                         Потом были совсем другие события и долгие разговоры о погоде. \
                         Рыжая кошка сидела возле окна и смотрела.";
        let blocks = vec![Block::from_text(paragraph)];
        let view = BlockView::new(&blocks);
        let query = FragmentQuery::new("Рыжая кошка сидела возле окна и смотрела.");

        let span = KeywordMatch::default().locate(&query, &view).unwrap();
        let matched = &paragraph[span.start..span.end];
        assert!(matched.ends_with("Рыжая кошка сидела возле окна и смотрела."));
        assert!(!matched.contains("Засиделась"));
    }

    #[test]
    fn test_word_overlap_is_case_insensitive() {
        assert_eq!(word_overlap("The Cat", "the cat sat"), 1.0);
        assert_eq!(word_overlap("a b c d", "a b"), 0.5);
        assert_eq!(word_overlap("", "anything"), 0.0);
    }
}
