use std::path::Path;

use anyhow::{Context, Result};
use chromiumoxide::cdp::browser_protocol::network::CookieParam;
use chromiumoxide::Page;
use tracing::{debug, info, warn};

/// 加载 cookies 文件到页面，返回加载的数量
///
/// 文件不存在时什么都不做；文件无法解析时替换为空列表。
pub async fn load_cookies(page: &Page, path: &Path) -> Result<usize> {
    if !tokio::fs::try_exists(path).await.unwrap_or(false) {
        debug!("cookies 文件不存在: {}", path.display());
        return Ok(0);
    }

    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("无法读取 cookies 文件: {}", path.display()))?;
    let cookies: Vec<CookieParam> = match serde_json::from_str(&content) {
        Ok(cookies) => cookies,
        Err(e) => {
            warn!("⚠️ cookies 文件无效 ({})，已重置为空列表", e);
            tokio::fs::write(path, "[]")
                .await
                .with_context(|| format!("无法写入 cookies 文件: {}", path.display()))?;
            return Ok(0);
        }
    };

    let count = cookies.len();
    if count > 0 {
        page.set_cookies(cookies).await?;
        info!("✓ 已加载 {} 个 cookies", count);
    }
    Ok(count)
}

/// 保存页面当前的 cookies
pub async fn save_cookies(page: &Page, path: &Path) -> Result<()> {
    let cookies = page.get_cookies().await?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("无法创建文件夹: {}", parent.display()))?;
    }
    let content = serde_json::to_string_pretty(&cookies)?;
    tokio::fs::write(path, content)
        .await
        .with_context(|| format!("无法写入 cookies 文件: {}", path.display()))?;
    info!("✓ cookies 已保存 ({} 个)", cookies.len());
    Ok(())
}
