//! 文档版本存储 - 基础设施层

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

use crate::error::StorageError;
use crate::infrastructure::json_file::{read_json, record_path, write_json};
use crate::models::DocumentVersion;

/// 按会话保存最新的文档版本
#[async_trait]
pub trait DocumentVersionStore: Send + Sync {
    async fn load(&self, session_id: &str) -> Result<Option<DocumentVersion>, StorageError>;

    async fn save(&self, version: &DocumentVersion) -> Result<(), StorageError>;
}

/// 内存版本存储
#[derive(Default)]
pub struct InMemoryVersionStore {
    versions: RwLock<HashMap<String, DocumentVersion>>,
}

impl InMemoryVersionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentVersionStore for InMemoryVersionStore {
    async fn load(&self, session_id: &str) -> Result<Option<DocumentVersion>, StorageError> {
        Ok(self.versions.read().await.get(session_id).cloned())
    }

    async fn save(&self, version: &DocumentVersion) -> Result<(), StorageError> {
        self.versions
            .write()
            .await
            .insert(version.session_id.clone(), version.clone());
        Ok(())
    }
}

/// JSON 文件版本存储：`<data_dir>/versions/<session_id>.json`
pub struct JsonFileVersionStore {
    dir: PathBuf,
}

impl JsonFileVersionStore {
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            dir: data_dir.as_ref().join("versions"),
        }
    }
}

#[async_trait]
impl DocumentVersionStore for JsonFileVersionStore {
    async fn load(&self, session_id: &str) -> Result<Option<DocumentVersion>, StorageError> {
        read_json(&record_path(&self.dir, session_id)?).await
    }

    async fn save(&self, version: &DocumentVersion) -> Result<(), StorageError> {
        write_json(&record_path(&self.dir, &version.session_id)?, version).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Fragment;

    #[tokio::test]
    async fn test_json_version_store_keeps_latest_version() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileVersionStore::new(dir.path());

        let v1 = DocumentVersion::first("s-1", "doc.json", Fragment::from_texts(["A"], 0), "out-1");
        store.save(&v1).await.unwrap();
        let v2 = v1.next(Fragment::from_texts(["A", "B"], 0), "out-2");
        store.save(&v2).await.unwrap();

        let loaded = store.load("s-1").await.unwrap().unwrap();
        assert_eq!(loaded.version_number, 2);
        assert_eq!(loaded.original_source_ref, "doc.json");
        assert_eq!(loaded.fragment_history.len(), 2);
        assert!(store.load("unknown").await.unwrap().is_none());
    }
}
