//! 浏览器 - UiDriver 的 chromiumoxide 实现
//!
//! 启动浏览器、加载 cookies、接入网络响应监听，返回可操作的会话。

pub mod cookies;
pub mod launcher;
pub mod network;
pub mod session;

use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::infrastructure::{UiDriver, UiSession};
use crate::services::binding::BindingCorrelator;

pub use launcher::{launch_browser, LaunchedBrowser};
pub use session::ChromeSession;

/// 基于 Chrome 的界面驱动
pub struct ChromeDriver {
    config: Config,
}

impl ChromeDriver {
    pub fn new(config: &Config) -> Self {
        Self {
            config: config.clone(),
        }
    }
}

#[async_trait]
impl UiDriver for ChromeDriver {
    async fn open_session(&self, bindings: Arc<BindingCorrelator>) -> Result<Box<dyn UiSession>> {
        let launched = launch_browser(&self.config).await?;

        let page = launched.browser.new_page("about:blank").await.map_err(|e| {
            error!("创建页面失败: {}", e);
            anyhow::anyhow!("创建页面失败: {}", e)
        })?;

        let crashed = Arc::new(AtomicBool::new(false));
        let listeners = vec![
            network::spawn_selling_feed_listener(
                &page,
                self.config.selling_api_url.clone(),
                bindings,
            )
            .await?,
            network::spawn_crash_watch(&page, Arc::clone(&crashed)).await?,
        ];

        if let Err(e) = cookies::load_cookies(&page, Path::new(&self.config.cookies_file)).await {
            warn!("⚠️ 加载 cookies 失败: {:#}", e);
        }

        info!("✅ 浏览器页面已创建");
        Ok(Box::new(ChromeSession::new(
            launched, page, listeners, crashed,
        )))
    }
}
