use crate::models::feed::{ListingFeed, RawRecord, RemovalFeed};
use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;
use tokio::fs;

/// 文件格式（根据扩展名判断）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileFormat {
    Toml,
    Json,
}

fn detect_format(path: &Path) -> Result<FileFormat> {
    match path.extension().and_then(|s| s.to_str()) {
        Some("toml") => Ok(FileFormat::Toml),
        Some("json") => Ok(FileFormat::Json),
        other => anyhow::bail!(
            "不支持的文件格式 {:?}: {}（仅支持 .toml / .json）",
            other,
            path.display()
        ),
    }
}

async fn load_document<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let format = detect_format(path)?;
    let content = fs::read_to_string(path)
        .await
        .with_context(|| format!("无法读取文件: {}", path.display()))?;

    let document = match format {
        FileFormat::Toml => toml::from_str(&content)
            .with_context(|| format!("无法解析TOML文件: {}", path.display()))?,
        FileFormat::Json => serde_json::from_str(&content)
            .with_context(|| format!("无法解析JSON文件: {}", path.display()))?,
    };
    Ok(document)
}

/// 从新增/编辑数据源文件加载原始记录
pub async fn load_listing_feed(path: &Path) -> Result<Vec<RawRecord>> {
    tracing::info!("正在从文件加载商品: {}", path.display());
    let feed: ListingFeed = load_document(path).await?;
    if feed.records.is_empty() {
        anyhow::bail!("输入文件无效（没有任何商品记录）: {}", path.display());
    }
    tracing::info!("成功加载 {} 条记录", feed.records.len());
    Ok(feed.records)
}

/// 从删除数据源文件加载链接
pub async fn load_removal_feed(path: &Path) -> Result<Vec<String>> {
    tracing::info!("正在从文件加载待删除链接: {}", path.display());
    let feed: RemovalFeed = load_document(path).await?;
    if feed.links.is_empty() {
        anyhow::bail!("输入文件无效（没有任何链接）: {}", path.display());
    }
    tracing::info!("成功加载 {} 个链接", feed.links.len());
    Ok(feed.links)
}

/// 将数据写入 TOML 或 JSON 文件（导出使用）
pub async fn write_document<T: Serialize>(path: &Path, document: &T) -> Result<()> {
    let content = match detect_format(path)? {
        FileFormat::Toml => toml::to_string_pretty(document)
            .with_context(|| format!("无法生成TOML内容: {}", path.display()))?,
        FileFormat::Json => serde_json::to_string_pretty(document)?,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).await?;
    }
    fs::write(path, content)
        .await
        .with_context(|| format!("无法写入文件: {}", path.display()))?;
    Ok(())
}
