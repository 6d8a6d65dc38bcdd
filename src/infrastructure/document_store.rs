//! 文档存储 - 基础设施层
//!
//! 按引用读取 / 保存结构化文档。保存永远生成新的引用，源文档不会被覆盖。

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;

use crate::error::StorageError;
use crate::infrastructure::json_file::{read_json, write_json};
use crate::models::Document;

/// 文档存储
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// 读取文档，引用不存在时返回 `StorageError::MissingRef`
    async fn load(&self, doc_ref: &str) -> Result<Document, StorageError>;

    /// 保存文档并返回新的引用
    async fn save(&self, document: &Document, name_hint: &str) -> Result<String, StorageError>;
}

/// 内存文档存储
#[derive(Default)]
pub struct InMemoryDocumentStore {
    documents: RwLock<HashMap<String, Document>>,
    next_id: AtomicUsize,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 预置一个文档
    pub fn with_document(mut self, doc_ref: impl Into<String>, document: Document) -> Self {
        self.documents.get_mut().insert(doc_ref.into(), document);
        self
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn load(&self, doc_ref: &str) -> Result<Document, StorageError> {
        self.documents
            .read()
            .await
            .get(doc_ref)
            .cloned()
            .ok_or_else(|| StorageError::MissingRef(doc_ref.to_string()))
    }

    async fn save(&self, document: &Document, name_hint: &str) -> Result<String, StorageError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let doc_ref = format!("{}#{}", name_hint, id);
        self.documents
            .write()
            .await
            .insert(doc_ref.clone(), document.clone());
        Ok(doc_ref)
    }
}

/// JSON 文档存储：文档以 Block / Run 树的 JSON 形式保存在 `<data_dir>/documents/` 下
///
/// 引用是相对该目录的文件名（绝对路径也可以）
pub struct JsonDocumentStore {
    dir: PathBuf,
}

impl JsonDocumentStore {
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            dir: data_dir.as_ref().join("documents"),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl DocumentStore for JsonDocumentStore {
    async fn load(&self, doc_ref: &str) -> Result<Document, StorageError> {
        read_json(&self.dir.join(doc_ref))
            .await?
            .ok_or_else(|| StorageError::MissingRef(doc_ref.to_string()))
    }

    async fn save(&self, document: &Document, name_hint: &str) -> Result<String, StorageError> {
        let stem: String = name_hint
            .chars()
            .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        let doc_ref = format!("{}_{}.json", stem, &suffix[..8]);
        write_json(&self.dir.join(&doc_ref), document).await?;
        Ok(doc_ref)
    }
}
