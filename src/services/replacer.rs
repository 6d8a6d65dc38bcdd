//! 保留格式的替换器
//!
//! 给定段落中的实际区间，按 Run 从左到右重建段落：
//! 区间之前 / 之后的 Run 原样保留，跨越区间边界的 Run 被切开，
//! 替换文本只输出一次，并沿用区间起点所在 Run 的格式。
//!
//! 结构化重建失败时退回整段纯文本替换（只保留第一个 Run 的格式）。

use crate::error::{FormattingCopyError, ReplaceError};
use crate::models::{Block, Run, RunFormatting};
use crate::services::matching::ActualSpan;
use tracing::{debug, warn};

/// Word 支持的高亮颜色名
const HIGHLIGHT_NAMES: &[&str] = &[
    "black",
    "blue",
    "cyan",
    "green",
    "magenta",
    "red",
    "yellow",
    "white",
    "darkblue",
    "darkcyan",
    "darkgreen",
    "darkmagenta",
    "darkred",
    "darkyellow",
    "darkgray",
    "lightgray",
    "none",
];

/// 实际使用的替换方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplaceMode {
    /// 按 Run 重建，格式完整保留
    Structured,
    /// 整段纯文本替换
    PlainTextFallback,
}

/// 保留格式的替换器
#[derive(Debug, Default, Clone, Copy)]
pub struct FormattingPreservingReplacer;

impl FormattingPreservingReplacer {
    /// 在段落序列中替换区间
    ///
    /// 跨段落的区间会合并成一个段落：首段落的前缀 + 替换文本 + 末段落的剩余部分，
    /// 中间及末尾段落被移除。
    pub fn replace(
        &self,
        blocks: &mut Vec<Block>,
        span: ActualSpan,
        original: &str,
        replacement: &str,
    ) -> Result<ReplaceMode, ReplaceError> {
        match self.replace_structured(blocks, span, replacement) {
            Ok(()) => Ok(ReplaceMode::Structured),
            Err(e) => {
                warn!("⚠️ 结构化替换失败，改用纯文本替换: {}", e);
                let block = blocks
                    .get_mut(span.start_block)
                    .ok_or(ReplaceError::FallbackFailed)?;
                plain_text_replace(block, original, replacement)?;
                Ok(ReplaceMode::PlainTextFallback)
            }
        }
    }

    /// 按 Run 重建，出错时不修改任何段落
    pub fn replace_structured(
        &self,
        blocks: &mut Vec<Block>,
        span: ActualSpan,
        replacement: &str,
    ) -> Result<(), ReplaceError> {
        let len = blocks.len();
        if span.start_block > span.end_block {
            return Err(ReplaceError::InvalidSpan {
                start: span.start,
                end: span.end,
                len: 0,
            });
        }
        if span.end_block >= len {
            return Err(ReplaceError::BlockOutOfRange {
                index: span.end_block,
                len,
            });
        }

        // 把涉及的段落看成一个连续的 Run 序列
        let covered = &blocks[span.start_block..=span.end_block];
        let runs: Vec<Run> = covered.iter().flat_map(|b| b.runs.iter().cloned()).collect();
        let end_base: usize = covered[..covered.len() - 1].iter().map(Block::len).sum();

        let rebuilt = rewrite_runs(&runs, span.start, end_base + span.end, replacement)?;

        blocks[span.start_block].rebuild(rebuilt);
        if !span.is_single_block() {
            blocks.drain(span.start_block + 1..=span.end_block);
        }
        Ok(())
    }
}

/// 在 Run 序列上替换 `[start, end)`，返回新的 Run 序列
pub fn rewrite_runs(
    runs: &[Run],
    start: usize,
    end: usize,
    replacement: &str,
) -> Result<Vec<Run>, ReplaceError> {
    let text: String = runs.iter().map(|r| r.text.as_str()).collect();
    if start >= end
        || end > text.len()
        || !text.is_char_boundary(start)
        || !text.is_char_boundary(end)
    {
        return Err(ReplaceError::InvalidSpan {
            start,
            end,
            len: text.len(),
        });
    }

    let mut out = Vec::with_capacity(runs.len() + 2);
    let mut emitted = false;
    let mut offset = 0;

    for run in runs {
        let run_start = offset;
        let run_end = offset + run.text.len();
        offset = run_end;

        if run_end <= start || run_start >= end {
            out.push(run.clone());
            continue;
        }

        let cut_start = start.saturating_sub(run_start);
        let cut_end = end.min(run_end) - run_start;

        if cut_start > 0 {
            out.push(Run::new(&run.text[..cut_start], run.formatting.clone()));
        }
        if !emitted {
            out.push(Run::new(replacement, copy_formatting(&run.formatting)));
            emitted = true;
        }
        if cut_end < run.text.len() {
            out.push(Run::new(&run.text[cut_end..], run.formatting.clone()));
        }
    }

    if !emitted {
        // 没有 Run 与区间相交时，插到起点所在的位置
        let mut acc = 0;
        let at = out
            .iter()
            .position(|r| {
                acc += r.text.len();
                acc > start
            })
            .unwrap_or(out.len());
        let formatting = out
            .get(at)
            .map(|r| copy_formatting(&r.formatting))
            .unwrap_or_default();
        out.insert(at, Run::new(replacement, formatting));
    }

    Ok(out)
}

/// 整段纯文本替换（第一次出现），结果为单个 Run
pub fn plain_text_replace(
    block: &mut Block,
    original: &str,
    replacement: &str,
) -> Result<(), ReplaceError> {
    let text = block.text();
    if original.is_empty() || !text.contains(original) {
        return Err(ReplaceError::FallbackFailed);
    }
    let formatting = block
        .runs
        .first()
        .map(|r| copy_formatting(&r.formatting))
        .unwrap_or_default();
    block.rebuild(vec![Run::new(text.replacen(original, replacement, 1), formatting)]);
    Ok(())
}

/// 逐个属性复制格式，非法属性跳过
pub fn copy_formatting(src: &RunFormatting) -> RunFormatting {
    let mut dst = RunFormatting {
        bold: src.bold,
        italic: src.italic,
        underline: src.underline,
        ..RunFormatting::default()
    };

    if let Some(font) = &src.font_family {
        match copy_font_family(font) {
            Ok(v) => dst.font_family = Some(v),
            Err(e) => debug!("跳过格式属性: {}", e),
        }
    }
    if let Some(size) = src.size_pt {
        match copy_size(size) {
            Ok(v) => dst.size_pt = Some(v),
            Err(e) => debug!("跳过格式属性: {}", e),
        }
    }
    if let Some(color) = &src.color {
        match copy_color(color) {
            Ok(v) => dst.color = Some(v),
            Err(e) => debug!("跳过格式属性: {}", e),
        }
    }
    if let Some(highlight) = &src.highlight {
        match copy_highlight(highlight) {
            Ok(v) => dst.highlight = Some(v),
            Err(e) => debug!("跳过格式属性: {}", e),
        }
    }

    dst
}

fn copy_font_family(font: &str) -> Result<String, FormattingCopyError> {
    let font = font.trim();
    if font.is_empty() {
        return Err(FormattingCopyError::EmptyFontFamily);
    }
    Ok(font.to_string())
}

fn copy_size(size: f32) -> Result<f32, FormattingCopyError> {
    if !size.is_finite() || size <= 0.0 {
        return Err(FormattingCopyError::InvalidSize(size.to_string()));
    }
    Ok(size)
}

fn copy_color(color: &str) -> Result<String, FormattingCopyError> {
    let hex = color.trim().trim_start_matches('#');
    if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(FormattingCopyError::InvalidColor(color.to_string()));
    }
    Ok(hex.to_ascii_uppercase())
}

fn copy_highlight(highlight: &str) -> Result<String, FormattingCopyError> {
    let lower = highlight.trim().to_ascii_lowercase();
    if !HIGHLIGHT_NAMES.contains(&lower.as_str()) {
        return Err(FormattingCopyError::InvalidHighlight(highlight.to_string()));
    }
    Ok(highlight.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bold() -> RunFormatting {
        RunFormatting {
            bold: Some(true),
            ..RunFormatting::default()
        }
    }

    fn italic() -> RunFormatting {
        RunFormatting {
            italic: Some(true),
            ..RunFormatting::default()
        }
    }

    #[test]
    fn test_span_inside_single_run() {
        let runs = vec![Run::new("The cat sat.", bold())];
        let out = rewrite_runs(&runs, 4, 7, "dog").unwrap();
        let texts: Vec<&str> = out.iter().map(|r| r.text.as_str()).collect();
        assert_eq!(texts, vec!["The ", "dog", " sat."]);
        assert!(out.iter().all(|r| r.formatting == bold()));
    }

    #[test]
    fn test_span_crossing_runs_emits_replacement_once() {
        let runs = vec![
            Run::new("The ", RunFormatting::default()),
            Run::new("cat", bold()),
            Run::new(" sat", italic()),
            Run::new(".", RunFormatting::default()),
        ];
        let out = rewrite_runs(&runs, 4, 11, "dog lay").unwrap();
        let texts: Vec<&str> = out.iter().map(|r| r.text.as_str()).collect();
        assert_eq!(texts, vec!["The ", "dog lay", "."]);
        assert_eq!(out[1].formatting, bold());
        assert_eq!(out.iter().filter(|r| r.text == "dog lay").count(), 1);
    }

    #[test]
    fn test_span_starting_at_run_boundary() {
        let runs = vec![
            Run::new("one ", RunFormatting::default()),
            Run::new("two", italic()),
            Run::new(" three", bold()),
        ];
        let out = rewrite_runs(&runs, 4, 10, "2 3").unwrap();
        let texts: Vec<&str> = out.iter().map(|r| r.text.as_str()).collect();
        assert_eq!(texts, vec!["one ", "2 3", "ree"]);
        assert_eq!(out[1].formatting, italic());
    }

    #[test]
    fn test_invalid_span_is_rejected() {
        let runs = vec![Run::plain("Кот")];
        assert!(rewrite_runs(&runs, 1, 4, "x").is_err());
        assert!(rewrite_runs(&runs, 2, 2, "x").is_err());
        assert!(rewrite_runs(&runs, 0, 99, "x").is_err());
    }

    #[test]
    fn test_multi_block_span_merges_blocks() {
        let mut blocks = vec![
            Block::from_text("Intro. The first half"),
            Block::from_text("61"),
            Block::new(vec![Run::new("and the second half. Tail.", italic())]),
            Block::from_text("Next paragraph"),
        ];
        let span = ActualSpan {
            start_block: 0,
            start: 7,
            end_block: 2,
            end: 20,
        };
        let mode = FormattingPreservingReplacer
            .replace(&mut blocks, span, "unused", "Rewritten.")
            .unwrap();
        assert_eq!(mode, ReplaceMode::Structured);
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].text(), "Intro. Rewritten. Tail.");
        assert_eq!(blocks[1].text(), "Next paragraph");
    }

    #[test]
    fn test_invalid_span_falls_back_to_plain_text() {
        let mut blocks = vec![Block::new(vec![
            Run::new("The cat ", bold()),
            Run::new("sat.", italic()),
        ])];
        let span = ActualSpan::single(0, 5, 500);
        let mode = FormattingPreservingReplacer
            .replace(&mut blocks, span, "cat sat", "dog lay")
            .unwrap();
        assert_eq!(mode, ReplaceMode::PlainTextFallback);
        assert_eq!(blocks[0].runs.len(), 1);
        assert_eq!(blocks[0].text(), "The dog lay.");
        assert_eq!(blocks[0].runs[0].formatting, bold());
    }

    #[test]
    fn test_fallback_failure_is_reported() {
        let mut blocks = vec![Block::from_text("The cat sat.")];
        let span = ActualSpan::single(0, 9, 3);
        assert_eq!(
            FormattingPreservingReplacer.replace(&mut blocks, span, "absent", "x"),
            Err(ReplaceError::FallbackFailed)
        );
        assert_eq!(blocks[0].text(), "The cat sat.");
    }

    #[test]
    fn test_invalid_attributes_are_skipped_individually() {
        let src = RunFormatting {
            bold: Some(true),
            italic: None,
            underline: Some(false),
            font_family: Some("  ".into()),
            size_pt: Some(f32::NAN),
            color: Some("#ff00aa".into()),
            highlight: Some("sparkly".into()),
        };
        let copied = copy_formatting(&src);
        assert_eq!(copied.bold, Some(true));
        assert_eq!(copied.underline, Some(false));
        assert_eq!(copied.font_family, None);
        assert_eq!(copied.size_pt, None);
        assert_eq!(copied.color.as_deref(), Some("FF00AA"));
        assert_eq!(copied.highlight, None);
    }
}
