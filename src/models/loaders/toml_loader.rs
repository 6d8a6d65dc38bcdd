use crate::models::job::RewriteJob;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tokio::fs;

/// 从 TOML 文件加载数据并转换为 RewriteJob 对象
pub async fn load_toml_to_job(toml_file_path: &Path) -> Result<RewriteJob> {
    let content = fs::read_to_string(toml_file_path)
        .await
        .with_context(|| format!("无法读取TOML文件: {}", toml_file_path.display()))?;

    let mut job: RewriteJob = toml::from_str(&content)
        .with_context(|| format!("无法解析TOML文件: {}", toml_file_path.display()))?;

    // 设置文件路径
    job.file_path = Some(toml_file_path.to_string_lossy().to_string());

    Ok(job)
}

/// 从文件夹中加载所有 TOML 文件并转换为 RewriteJob 对象列表
///
/// 按文件名排序，解析失败的文件只记录警告并跳过
pub async fn load_all_toml_files(folder_path: &str) -> Result<Vec<RewriteJob>> {
    let folder = PathBuf::from(folder_path);

    if !folder.exists() {
        anyhow::bail!("文件夹不存在: {}", folder_path);
    }

    let mut toml_files = Vec::new();
    let mut entries = fs::read_dir(&folder)
        .await
        .with_context(|| format!("无法读取文件夹: {}", folder_path))?;

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|s| s.to_str()) == Some("toml") {
            toml_files.push(path);
        }
    }
    toml_files.sort();

    let mut jobs = Vec::new();
    for path in toml_files {
        tracing::info!(
            "正在加载: {}",
            path.file_name().unwrap_or_default().to_string_lossy()
        );

        match load_toml_to_job(&path).await {
            Ok(job) => {
                tracing::info!("成功加载 {} 个片段", job.fragments.len());
                jobs.push(job);
            }
            Err(e) => {
                tracing::warn!("加载文件失败 {}: {}", path.display(), e);
            }
        }
    }

    Ok(jobs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_load_jobs_skips_broken_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("a.toml"),
            "source = \"doc.json\"\nfragments = [\"The cat sat.\"]\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("b.toml"), "fragments = 3").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let jobs = load_all_toml_files(dir.path().to_str().unwrap())
            .await
            .unwrap();

        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].source, "doc.json");
        assert_eq!(jobs[0].session, None);
        assert_eq!(jobs[0].display_name(), "a.toml");
    }

    #[tokio::test]
    async fn test_missing_folder_is_an_error() {
        assert!(load_all_toml_files("/definitely/not/here").await.is_err());
    }
}
