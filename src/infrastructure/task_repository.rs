//! 任务仓库 - 基础设施层
//!
//! 任务记录的持久化，只负责存取，不认识任务流程

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

use crate::error::StorageError;
use crate::infrastructure::json_file::{read_json, record_path, remove_file, write_json};
use crate::models::Task;

/// 任务仓库
#[async_trait]
pub trait TaskRepository: Send + Sync {
    async fn load(&self, task_id: &str) -> Result<Option<Task>, StorageError>;

    /// 保存（覆盖同 ID 的旧记录）
    async fn save(&self, task: &Task) -> Result<(), StorageError>;

    /// 删除任务，返回任务是否存在
    async fn delete(&self, task_id: &str) -> Result<bool, StorageError>;
}

/// 内存任务仓库
#[derive(Default)]
pub struct InMemoryTaskRepository {
    tasks: RwLock<HashMap<String, Task>>,
}

impl InMemoryTaskRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TaskRepository for InMemoryTaskRepository {
    async fn load(&self, task_id: &str) -> Result<Option<Task>, StorageError> {
        Ok(self.tasks.read().await.get(task_id).cloned())
    }

    async fn save(&self, task: &Task) -> Result<(), StorageError> {
        self.tasks
            .write()
            .await
            .insert(task.id.clone(), task.clone());
        Ok(())
    }

    async fn delete(&self, task_id: &str) -> Result<bool, StorageError> {
        Ok(self.tasks.write().await.remove(task_id).is_some())
    }
}

/// JSON 文件任务仓库：`<data_dir>/tasks/<id>.json`
pub struct JsonFileTaskRepository {
    dir: PathBuf,
}

impl JsonFileTaskRepository {
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            dir: data_dir.as_ref().join("tasks"),
        }
    }
}

#[async_trait]
impl TaskRepository for JsonFileTaskRepository {
    async fn load(&self, task_id: &str) -> Result<Option<Task>, StorageError> {
        read_json(&record_path(&self.dir, task_id)?).await
    }

    async fn save(&self, task: &Task) -> Result<(), StorageError> {
        write_json(&record_path(&self.dir, &task.id)?, task).await
    }

    async fn delete(&self, task_id: &str) -> Result<bool, StorageError> {
        remove_file(&record_path(&self.dir, task_id)?).await
    }
}
