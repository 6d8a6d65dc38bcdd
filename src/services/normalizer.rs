//! 文本规范化 - 业务能力层
//!
//! 只用于比较，绝不用作替换内容。规则按顺序执行：
//! 1. 去掉引用 / 页码残留：`[12]`、`[12, c. 34]`、`c. 34`、开头的“数字 数字”拼接、独占一行的数字
//! 2. 各种换行统一为一个空格
//! 3. 连续的空格 / 制表符合并为一个空格
//! 4. 去掉首尾空白
//!
//! 整个过程迭代到不动点，因此 `normalize(normalize(x)) == normalize(x)`。
//! 大小写保持不变。
//!
//! 规范化时同时记录每个输出字符对应的原文字节位置，
//! 匹配成功后据此把规范化区间映射回原文区间。

use regex::Regex;
use std::ops::Range;
use std::sync::LazyLock;

/// `[39, c. 126]`、`[14]`
static BRACKET_CITATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[\d+[,\s]*(?:[сc]\.\s*)?\d*\]").expect("静态正则表达式")
});

/// `с. 51` / `c. 51`
static PAGE_REFERENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[сc]\.\s*\d+").expect("静态正则表达式"));

/// 页码注入造成的开头拼接：`61 19 января` → `января`
static LEADING_NUMBER_SPLICE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*\d+\s+\d+\s*").expect("静态正则表达式"));

/// 独占一行的数字
static STANDALONE_NUMBER_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^[ \t]*\d+[ \t]*$").expect("静态正则表达式"));

/// 规范化文本中的一个字符及其原文位置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MappedChar {
    pub ch: char,
    /// 所在段落（单段落规范化时为 0，多段落拼接时由调用方设置）
    pub block: usize,
    /// 原文字节起点
    pub raw_start: usize,
    /// 原文字节终点（不含）
    pub raw_end: usize,
}

/// 原文中的一个位置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawPos {
    pub block: usize,
    pub offset: usize,
}

/// 带原文位置映射的规范化文本
#[derive(Debug, Clone, Default)]
pub struct NormalizedText {
    text: String,
    chars: Vec<MappedChar>,
    /// 每个字符在 `text` 中的字节起点
    offsets: Vec<usize>,
}

impl NormalizedText {
    /// 规范化原文并记录映射
    pub fn new(raw: &str) -> Self {
        let mut chars: Vec<MappedChar> = raw
            .char_indices()
            .map(|(i, ch)| MappedChar {
                ch,
                block: 0,
                raw_start: i,
                raw_end: i + ch.len_utf8(),
            })
            .collect();

        loop {
            let next = normalize_pass(chars.clone());
            if same_text(&next, &chars) {
                break;
            }
            chars = next;
        }

        Self::from_chars(chars)
    }

    /// 由已映射的字符序列构造
    pub fn from_chars(chars: Vec<MappedChar>) -> Self {
        let mut text = String::with_capacity(chars.len());
        let mut offsets = Vec::with_capacity(chars.len());
        for c in &chars {
            offsets.push(text.len());
            text.push(c.ch);
        }
        Self {
            text,
            chars,
            offsets,
        }
    }

    /// 把多个段落的规范化文本用单个空格拼接，空段落跳过
    pub fn join(parts: Vec<(usize, NormalizedText)>) -> Self {
        let mut chars: Vec<MappedChar> = Vec::new();
        for (block, part) in parts {
            if part.is_empty() {
                continue;
            }
            if let Some(prev) = chars.last().copied() {
                chars.push(MappedChar {
                    ch: ' ',
                    block: prev.block,
                    raw_start: prev.raw_end,
                    raw_end: prev.raw_end,
                });
            }
            chars.extend(part.chars.into_iter().map(|c| MappedChar { block, ..c }));
        }
        Self::from_chars(chars)
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn chars(&self) -> &[MappedChar] {
        &self.chars
    }

    /// 区分大小写的子串查找，返回规范化文本中的字节区间
    pub fn find(&self, needle: &str) -> Option<Range<usize>> {
        if needle.is_empty() {
            return None;
        }
        self.text.find(needle).map(|s| s..s + needle.len())
    }

    /// 把规范化文本中的字节区间映射回原文的起止位置
    ///
    /// 区间必须落在字符边界上且非空
    pub fn raw_bounds(&self, norm: Range<usize>) -> Option<(RawPos, RawPos)> {
        if norm.start >= norm.end || norm.end > self.text.len() {
            return None;
        }
        let first = self.offsets.binary_search(&norm.start).ok()?;
        let last = self.offsets.partition_point(|&o| o < norm.end).checked_sub(1)?;
        if last < first {
            return None;
        }
        let (a, b) = (self.chars[first], self.chars[last]);
        Some((
            RawPos {
                block: a.block,
                offset: a.raw_start,
            },
            RawPos {
                block: b.block,
                offset: b.raw_end,
            },
        ))
    }

    /// 把字节位置按字符数向左 / 向右扩展，结果落在字符边界上
    pub fn widen(&self, norm: Range<usize>, padding_chars: usize) -> Range<usize> {
        let first = self.offsets.partition_point(|&o| o < norm.start);
        let last = self.offsets.partition_point(|&o| o < norm.end);
        let start_idx = first.saturating_sub(padding_chars);
        let end_idx = (last + padding_chars).min(self.offsets.len());
        let start = self.offsets.get(start_idx).copied().unwrap_or(self.text.len());
        let end = self.offsets.get(end_idx).copied().unwrap_or(self.text.len());
        start..end
    }
}

/// 规范化文本（仅用于比较）
pub fn normalize(text: &str) -> String {
    NormalizedText::new(text).text
}

fn same_text(a: &[MappedChar], b: &[MappedChar]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.ch == y.ch)
}

fn normalize_pass(chars: Vec<MappedChar>) -> Vec<MappedChar> {
    let chars = remove_matches(chars, &BRACKET_CITATION);
    let chars = remove_matches(chars, &PAGE_REFERENCE);
    let chars = remove_matches(chars, &LEADING_NUMBER_SPLICE);
    let chars = remove_matches(chars, &STANDALONE_NUMBER_LINE);
    let chars = unify_line_breaks(chars);
    let chars = collapse_spaces(chars);
    trim(chars)
}

/// 删除正则命中的字符，其余字符保留原映射
fn remove_matches(chars: Vec<MappedChar>, re: &Regex) -> Vec<MappedChar> {
    let text: String = chars.iter().map(|c| c.ch).collect();
    let removed: Vec<Range<usize>> = re
        .find_iter(&text)
        .map(|m| m.range())
        .filter(|r| !r.is_empty())
        .collect();
    if removed.is_empty() {
        return chars;
    }

    let mut kept = Vec::with_capacity(chars.len());
    let mut pos = 0;
    let mut ranges = removed.iter().peekable();
    for c in chars {
        while ranges.peek().is_some_and(|r| r.end <= pos) {
            ranges.next();
        }
        let inside = ranges.peek().is_some_and(|r| r.start <= pos && pos < r.end);
        pos += c.ch.len_utf8();
        if !inside {
            kept.push(c);
        }
    }
    kept
}

fn is_line_break(ch: char) -> bool {
    matches!(
        ch,
        '\n' | '\r' | '\u{0B}' | '\u{0C}' | '\u{85}' | '\u{2028}' | '\u{2029}'
    )
}

/// `\r\n` 及其他换行统一为一个空格
fn unify_line_breaks(chars: Vec<MappedChar>) -> Vec<MappedChar> {
    let mut out: Vec<MappedChar> = Vec::with_capacity(chars.len());
    let mut iter = chars.into_iter().peekable();
    while let Some(c) = iter.next() {
        if c.ch == '\r' && iter.peek().is_some_and(|n| n.ch == '\n') {
            let lf = iter.next().unwrap_or(c);
            out.push(MappedChar {
                ch: ' ',
                raw_end: lf.raw_end,
                ..c
            });
        } else if is_line_break(c.ch) {
            out.push(MappedChar { ch: ' ', ..c });
        } else {
            out.push(c);
        }
    }
    out
}

/// 连续空格 / 制表符合并为一个空格，映射到第一个字符的位置
fn collapse_spaces(chars: Vec<MappedChar>) -> Vec<MappedChar> {
    let mut out: Vec<MappedChar> = Vec::with_capacity(chars.len());
    for c in chars {
        let is_space = c.ch == ' ' || c.ch == '\t';
        match out.last_mut() {
            Some(prev) if is_space && prev.ch == ' ' && prev.block == c.block => {
                prev.raw_end = prev.raw_end.max(c.raw_end);
            }
            _ if is_space => out.push(MappedChar { ch: ' ', ..c }),
            _ => out.push(c),
        }
    }
    out
}

fn trim(chars: Vec<MappedChar>) -> Vec<MappedChar> {
    let start = chars
        .iter()
        .position(|c| !c.ch.is_whitespace())
        .unwrap_or(chars.len());
    let end = chars
        .iter()
        .rposition(|c| !c.ch.is_whitespace())
        .map_or(start, |i| i + 1);
    chars[start..end].to_vec()
}
