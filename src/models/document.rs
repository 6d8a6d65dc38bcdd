//! 文档模型
//!
//! 显式的类型树：`Document { body, tables }` → `Block { runs }` → `Run { text, formatting }`。
//! 正文段落和表格单元格中的段落都是 `Block`。

use serde::{Deserialize, Serialize};

/// 文本片段的格式（每个属性都可能缺省）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunFormatting {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bold: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub italic: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub underline: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_family: Option<String>,
    /// 字号（磅）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_pt: Option<f32>,
    /// 十六进制 RGB，如 `FF0000`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    /// 高亮颜色名，如 `yellow`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub highlight: Option<String>,
}

/// 共享同一格式的最小文本单元
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Run {
    pub text: String,
    #[serde(default)]
    pub formatting: RunFormatting,
}

impl Run {
    pub fn new(text: impl Into<String>, formatting: RunFormatting) -> Self {
        Self {
            text: text.into(),
            formatting,
        }
    }

    /// 无格式的 Run
    pub fn plain(text: impl Into<String>) -> Self {
        Self::new(text, RunFormatting::default())
    }
}

/// 段落：有序的 Run 序列，段落文本 = 各 Run 文本按顺序拼接
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Block {
    #[serde(default)]
    pub runs: Vec<Run>,
}

impl Block {
    pub fn new(runs: Vec<Run>) -> Self {
        Self { runs }
    }

    /// 单个无格式 Run 组成的段落
    pub fn from_text(text: impl Into<String>) -> Self {
        Self::new(vec![Run::plain(text)])
    }

    /// 段落纯文本
    pub fn text(&self) -> String {
        self.runs.iter().map(|r| r.text.as_str()).collect()
    }

    /// 文本字节长度
    pub fn len(&self) -> usize {
        self.runs.iter().map(|r| r.text.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.iter().all(|r| r.text.is_empty())
    }

    /// 用新的 Run 序列重建段落
    ///
    /// 段落的唯一修改入口，空 Run 会被丢弃
    pub fn rebuild(&mut self, runs: Vec<Run>) {
        self.runs = runs.into_iter().filter(|r| !r.text.is_empty()).collect();
    }
}

/// 表格单元格
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableCell {
    #[serde(default)]
    pub blocks: Vec<Block>,
}

/// 表格行
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableRow {
    #[serde(default)]
    pub cells: Vec<TableCell>,
}

/// 表格
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Table {
    #[serde(default)]
    pub rows: Vec<TableRow>,
}

/// 结构化文档
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// 正文段落
    #[serde(default)]
    pub body: Vec<Block>,
    /// 表格
    #[serde(default)]
    pub tables: Vec<Table>,
}

impl Document {
    pub fn new(body: Vec<Block>) -> Self {
        Self {
            body,
            tables: Vec::new(),
        }
    }

    /// 由若干行纯文本构造文档（每行一个段落）
    pub fn from_paragraphs<I, S>(paragraphs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(paragraphs.into_iter().map(Block::from_text).collect())
    }

    /// 按单元格遍历表格中的段落序列（表格 → 行 → 单元格）
    pub fn cell_blocks_mut(&mut self) -> impl Iterator<Item = &mut Vec<Block>> {
        self.tables
            .iter_mut()
            .flat_map(|t| t.rows.iter_mut())
            .flat_map(|r| r.cells.iter_mut())
            .map(|c| &mut c.blocks)
    }

    /// 所有段落（正文在前，表格在后）
    pub fn all_blocks(&self) -> impl Iterator<Item = &Block> {
        self.body.iter().chain(
            self.tables
                .iter()
                .flat_map(|t| t.rows.iter())
                .flat_map(|r| r.cells.iter())
                .flat_map(|c| c.blocks.iter()),
        )
    }

    /// 全文纯文本，段落之间以换行分隔
    pub fn plain_text(&self) -> String {
        self.all_blocks()
            .map(|b| b.text())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// 文档中是否有非空白文本
    pub fn has_content(&self) -> bool {
        self.all_blocks().any(|b| !b.text().trim().is_empty())
    }
}
