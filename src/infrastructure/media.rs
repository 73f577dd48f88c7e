//! 文件下载能力 - 基础设施层

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::debug;

/// 下载远程文件到本地路径
#[async_trait]
pub trait MediaFetcher: Send + Sync {
    async fn fetch(&self, url: &str, dest: &Path) -> Result<()>;
}

/// 基于 reqwest 的下载实现
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MediaFetcher for HttpFetcher {
    async fn fetch(&self, url: &str, dest: &Path) -> Result<()> {
        debug!("正在下载: {}", url);
        let bytes = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("请求失败: {}", url))?
            .error_for_status()
            .with_context(|| format!("服务器返回错误: {}", url))?
            .bytes()
            .await
            .with_context(|| format!("读取响应失败: {}", url))?;

        tokio::fs::write(dest, &bytes)
            .await
            .with_context(|| format!("无法写入文件: {}", dest.display()))?;
        debug!("已下载 {} 字节到 {}", bytes.len(), dest.display());
        Ok(())
    }
}

/// 从 URL 推导文件名（取路径最后一段）
pub fn file_name_from_url(url: &str) -> Option<String> {
    let parsed = reqwest::Url::parse(url).ok()?;
    parsed
        .path_segments()?
        .filter(|segment| !segment.is_empty())
        .last()
        .map(|segment| segment.to_string())
}

/// 下载文件到文件夹
///
/// 文件已存在且不强制下载时直接返回已有路径。
pub async fn download_file(
    fetcher: &dyn MediaFetcher,
    url: &str,
    folder: &Path,
    file_name: Option<&str>,
    force: bool,
) -> Result<PathBuf> {
    tokio::fs::create_dir_all(folder)
        .await
        .with_context(|| format!("无法创建文件夹: {}", folder.display()))?;

    let name = match file_name {
        Some(name) => name.to_string(),
        None => file_name_from_url(url)
            .with_context(|| format!("无法从链接中提取文件名: {}", url))?,
    };
    let path = folder.join(name);

    if !force && tokio::fs::try_exists(&path).await.unwrap_or(false) {
        debug!("文件已存在，跳过下载: {}", path.display());
        return Ok(path);
    }

    fetcher.fetch(url, &path).await?;
    Ok(path)
}

/// 文件大小（字节）
pub async fn file_size(path: &Path) -> Result<u64> {
    let metadata = tokio::fs::metadata(path)
        .await
        .with_context(|| format!("无法读取文件信息: {}", path.display()))?;
    Ok(metadata.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_name_from_url() {
        assert_eq!(
            file_name_from_url("https://cdn.example.com/photos/123/a.jpg?w=200").as_deref(),
            Some("a.jpg")
        );
        assert_eq!(file_name_from_url("not a url"), None);
    }
}
