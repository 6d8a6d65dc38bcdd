//! JSON 文件读写 - 基础设施层
//!
//! 文件存储共用的读写函数，写入先落到临时文件再重命名。

use serde::{de::DeserializeOwned, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::error::StorageError;

/// 读取 JSON 文件，文件不存在时返回 None
pub async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StorageError> {
    let content = match fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(StorageError::io(path.display().to_string(), e)),
    };
    serde_json::from_str(&content)
        .map(Some)
        .map_err(|e| StorageError::json(path.display().to_string(), e))
}

/// 写入 JSON 文件（格式化输出），父目录不存在时自动创建
pub async fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), StorageError> {
    let display = path.display().to_string();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| StorageError::io(parent.display().to_string(), e))?;
    }

    let content =
        serde_json::to_string_pretty(value).map_err(|e| StorageError::json(display.clone(), e))?;

    let tmp = tmp_path(path);
    fs::write(&tmp, content)
        .await
        .map_err(|e| StorageError::io(tmp.display().to_string(), e))?;
    fs::rename(&tmp, path)
        .await
        .map_err(|e| StorageError::io(display, e))?;
    Ok(())
}

/// 删除文件，返回文件是否存在
pub async fn remove_file(path: &Path) -> Result<bool, StorageError> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(StorageError::io(path.display().to_string(), e)),
    }
}

/// 记录 ID 只能作为单个文件名使用
pub fn record_path(dir: &Path, id: &str) -> Result<PathBuf, StorageError> {
    if id.is_empty() || id.contains(['/', '\\']) || id.starts_with('.') {
        return Err(StorageError::MissingRef(id.to_string()));
    }
    Ok(dir.join(format!("{}.json", id)))
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}
