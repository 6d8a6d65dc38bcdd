//! 文档改写引擎
//!
//! 在源文档的副本上按序号倒序应用全部片段：
//! 先在正文段落中定位，找不到再逐个单元格查找表格段落。
//! 单个片段失败只记为 Unmatched，不影响其余片段。

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::ValidationError;
use crate::models::{Block, Document, Fragment, MatchStatus};
use crate::services::matching::{BlockView, FragmentQuery, MatchChain};
use crate::services::replacer::{FormattingPreservingReplacer, ReplaceMode};
use crate::utils::truncate_text;

/// 改写报告
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RewriteReport {
    pub replaced_count: usize,
    /// 未能定位或替换的片段序号（升序）
    pub unmatched_indices: Vec<usize>,
    /// 每个片段的定位方式，与输入按索引对齐
    pub match_statuses: Vec<MatchStatus>,
    /// 退回纯文本替换的片段数
    pub plain_text_fallbacks: usize,
}

/// 改写结果
#[derive(Debug, Clone)]
pub struct RewriteOutput {
    pub document: Document,
    pub report: RewriteReport,
}

/// 文档改写引擎
#[derive(Default)]
pub struct DocumentRewriteEngine {
    chain: MatchChain,
    replacer: FormattingPreservingReplacer,
}

impl DocumentRewriteEngine {
    pub fn new(chain: MatchChain) -> Self {
        Self {
            chain,
            replacer: FormattingPreservingReplacer,
        }
    }

    /// 应用改写，`originals[i]` 替换为 `paraphrased[i]`
    ///
    /// 数量不一致时直接返回错误，源文档不会被修改
    pub fn apply<S: AsRef<str>, P: AsRef<str>>(
        &self,
        source: &Document,
        originals: &[S],
        paraphrased: &[P],
    ) -> Result<RewriteOutput, ValidationError> {
        if originals.len() != paraphrased.len() {
            return Err(ValidationError::LengthMismatch {
                originals: originals.len(),
                paraphrased: paraphrased.len(),
            });
        }

        let mut document = source.clone();
        let mut report = RewriteReport {
            match_statuses: vec![MatchStatus::Unmatched; originals.len()],
            ..RewriteReport::default()
        };

        info!("📝 开始改写文档，共 {} 个片段", originals.len());

        for index in (0..originals.len()).rev() {
            let original = originals[index].as_ref();
            let replacement = paraphrased[index].as_ref();
            let (status, mode) = self.apply_one(&mut document, original, replacement);

            report.match_statuses[index] = status;
            match mode {
                Some(mode) => {
                    report.replaced_count += 1;
                    if mode == ReplaceMode::PlainTextFallback {
                        report.plain_text_fallbacks += 1;
                    }
                    debug!("✓ 片段 {} 已替换 ({})", index, status);
                }
                None => {
                    warn!(
                        "⚠️ 片段 {} 未在文档中找到: {}",
                        index,
                        truncate_text(original, 100)
                    );
                    report.unmatched_indices.push(index);
                }
            }
        }

        report.unmatched_indices.sort_unstable();
        info!(
            "✓ 文档改写完成: 替换 {}/{}，未匹配 {}",
            report.replaced_count,
            originals.len(),
            report.unmatched_indices.len()
        );

        Ok(RewriteOutput { document, report })
    }

    /// 以片段列表应用改写（每个片段都必须已有改写文本）
    pub fn apply_fragments(
        &self,
        source: &Document,
        fragments: &[Fragment],
    ) -> Result<RewriteOutput, ValidationError> {
        let originals: Vec<&str> = fragments.iter().map(|f| f.original_text.as_str()).collect();
        let paraphrased: Vec<&str> = fragments
            .iter()
            .filter_map(|f| f.paraphrased_text.as_deref())
            .collect();
        self.apply(source, &originals, &paraphrased)
    }

    /// 先正文后表格，返回匹配状态与替换方式（未替换时为 None）
    fn apply_one(
        &self,
        document: &mut Document,
        original: &str,
        replacement: &str,
    ) -> (MatchStatus, Option<ReplaceMode>) {
        let query = FragmentQuery::new(original);

        if let Some(result) = self.apply_in_blocks(&mut document.body, &query, replacement) {
            return result;
        }
        for blocks in document.cell_blocks_mut() {
            if let Some(result) = self.apply_in_blocks(blocks, &query, replacement) {
                return result;
            }
        }
        (MatchStatus::Unmatched, None)
    }

    /// 在一组段落中定位并替换；定位或替换失败都返回 None，交给下一组段落
    fn apply_in_blocks(
        &self,
        blocks: &mut Vec<Block>,
        query: &FragmentQuery,
        replacement: &str,
    ) -> Option<(MatchStatus, Option<ReplaceMode>)> {
        let found = self.chain.locate(query, &BlockView::new(blocks))?;
        match self
            .replacer
            .replace(blocks, found.span, &query.raw, replacement)
        {
            Ok(mode) => Some((found.status, Some(mode))),
            Err(e) => {
                warn!("❌ 替换失败: {}", e);
                None
            }
        }
    }
}
