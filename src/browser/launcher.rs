use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;
use chromiumoxide::{Browser, BrowserConfig};
use futures::StreamExt;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::config::Config;

/// 已启动的浏览器
pub struct LaunchedBrowser {
    pub browser: Browser,
    /// 后台事件循环
    pub handler: JoinHandle<()>,
    /// 事件循环是否已结束（浏览器进程退出或连接断开）
    pub closed: Arc<AtomicBool>,
}

/// 按配置启动浏览器（无头或有界面）
pub async fn launch_browser(config: &Config) -> Result<LaunchedBrowser> {
    info!(
        "🚀 启动浏览器 ({})...",
        if config.headless { "无头模式" } else { "有界面模式" }
    );

    let mut args = vec![
        "--no-sandbox".to_string(),            // 禁用沙盒，防止权限问题导致的崩溃
        "--disable-dev-shm-usage".to_string(), // 防止共享内存不足
        "--disable-notifications".to_string(),
        "--lang=en-US".to_string(),
    ];
    if let Some(proxy) = &config.proxy {
        debug!("使用代理: {}", proxy);
        args.push(format!("--proxy-server={}", proxy));
    }

    let mut builder = BrowserConfig::builder().window_size(1600, 900).args(args);
    builder = if config.headless {
        builder.new_headless_mode()
    } else {
        builder.with_head()
    };
    if let Some(executable) = &config.chrome_executable {
        builder = builder.chrome_executable(Path::new(executable));
    }

    let browser_config = builder.build().map_err(|e| {
        error!("配置浏览器失败: {}", e);
        anyhow::anyhow!("配置浏览器失败: {}", e)
    })?;

    let (browser, mut handler) = Browser::launch(browser_config).await.map_err(|e| {
        error!("启动浏览器失败: {}", e);
        anyhow::anyhow!("启动浏览器失败: {}", e)
    })?;
    debug!("浏览器启动成功");

    // 在后台处理浏览器事件
    let closed = Arc::new(AtomicBool::new(false));
    let closed_flag = Arc::clone(&closed);
    let handler = tokio::spawn(async move {
        while let Some(h) = handler.next().await {
            if let Err(e) = h {
                debug!("浏览器事件处理出错: {}", e);
            }
        }
        warn!("⚠️ 浏览器事件循环已结束");
        closed_flag.store(true, Ordering::SeqCst);
    });

    // 添加短暂延迟以等待浏览器状态同步
    sleep(tokio::time::Duration::from_millis(300)).await;

    Ok(LaunchedBrowser {
        browser,
        handler,
        closed,
    })
}
