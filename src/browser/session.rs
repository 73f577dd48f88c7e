//! 浏览器会话 - UiSession 的 chromiumoxide 实现
//!
//! 持有唯一的 Page 资源。元素查询和等待通过执行 JS 完成，
//! 点击、输入、按键、上传文件通过 CDP 完成。

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::dom::SetFileInputFilesParams;
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::element::Element;
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::{Browser, Page};
use rand::Rng;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::browser::cookies;
use crate::browser::launcher::LaunchedBrowser;
use crate::error::ActionError;
use crate::infrastructure::UiSession;

/// 等待元素时的轮询间隔
const POLL_INTERVAL: Duration = Duration::from_millis(200);

pub struct ChromeSession {
    browser: Mutex<Option<Browser>>,
    page: Page,
    handler: JoinHandle<()>,
    listeners: Vec<JoinHandle<()>>,
    closed: Arc<AtomicBool>,
    crashed: Arc<AtomicBool>,
}

impl ChromeSession {
    pub fn new(
        launched: LaunchedBrowser,
        page: Page,
        listeners: Vec<JoinHandle<()>>,
        crashed: Arc<AtomicBool>,
    ) -> Self {
        Self {
            browser: Mutex::new(Some(launched.browser)),
            page,
            handler: launched.handler,
            listeners,
            closed: launched.closed,
            crashed,
        }
    }

    /// 会话已失效时返回 `ActionError::SessionLost`
    fn check_alive(&self) -> Result<()> {
        if self.crashed.load(Ordering::SeqCst) {
            return Err(ActionError::SessionLost("Page crashed!".to_string()).into());
        }
        if self.closed.load(Ordering::SeqCst) {
            return Err(ActionError::SessionLost("浏览器进程已退出".to_string()).into());
        }
        Ok(())
    }

    /// 执行 JS 代码并反序列化为指定类型
    async fn eval_as<T: DeserializeOwned>(&self, script: &str) -> Result<T> {
        let value = self.eval(script).await?;
        Ok(serde_json::from_value(value)?)
    }

    async fn element(&self, selector: &str) -> Result<Element> {
        self.check_alive()?;
        self.page
            .find_element(selector)
            .await
            .with_context(|| format!("找不到元素: {}", selector))
    }

    async fn is_hidden(&self, selector: &str) -> Result<bool> {
        let script = format!(
            r#"(() => {{
                const el = document.querySelector({sel});
                if (!el) return true;
                const style = window.getComputedStyle(el);
                return style.display === 'none' || style.visibility === 'hidden'
                    || !(el.offsetWidth || el.offsetHeight || el.getClientRects().length);
            }})()"#,
            sel = js_string(selector)?
        );
        self.eval_as(&script).await
    }

    /// 轮询直到条件成立或超时
    async fn poll_until(&self, selector: &str, timeout: Duration, hidden: bool) -> Result<()> {
        let started = Instant::now();
        loop {
            let done = if hidden {
                self.is_hidden(selector).await?
            } else {
                self.exists(selector).await?
            };
            if done {
                return Ok(());
            }
            if started.elapsed() >= timeout {
                let what = if hidden { "消失" } else { "出现" };
                return Err(ActionError::Transient(format!(
                    "等待元素{}超时 ({:?}): {}",
                    what, timeout, selector
                ))
                .into());
            }
            sleep(POLL_INTERVAL).await;
        }
    }
}

/// 把字符串转为 JS 字面量
fn js_string(value: &str) -> Result<String> {
    Ok(serde_json::to_string(value)?)
}

#[async_trait]
impl UiSession for ChromeSession {
    async fn navigate(&self, url: &str) -> Result<()> {
        self.check_alive()?;
        debug!("导航到: {}", url);
        self.page
            .goto(url)
            .await
            .with_context(|| format!("导航到 {} 失败", url))?;
        Ok(())
    }

    async fn reload(&self) -> Result<()> {
        self.check_alive()?;
        self.page.reload().await.context("刷新页面失败")?;
        Ok(())
    }

    async fn click(&self, selector: &str) -> Result<()> {
        self.element(selector)
            .await?
            .click()
            .await
            .with_context(|| format!("点击失败: {}", selector))?;
        Ok(())
    }

    async fn select_all(&self, selector: &str) -> Result<()> {
        self.element(selector).await?.click().await?;
        let script = format!(
            r#"(() => {{
                const el = document.querySelector({sel});
                if (!el) return false;
                el.focus();
                if (typeof el.select === 'function') {{ el.select(); }}
                else {{ document.execCommand('selectAll', false, null); }}
                return true;
            }})()"#,
            sel = js_string(selector)?
        );
        self.eval(&script).await?;
        Ok(())
    }

    async fn type_text(&self, selector: &str, text: &str) -> Result<()> {
        let element = self.element(selector).await?;
        element.focus().await?;
        element
            .type_str(text)
            .await
            .with_context(|| format!("输入失败: {}", selector))?;
        Ok(())
    }

    async fn clear(&self, selector: &str) -> Result<()> {
        self.select_all(selector).await?;
        self.element(selector).await?.press_key("Backspace").await?;
        Ok(())
    }

    async fn press_key(&self, key: &str) -> Result<()> {
        let element = match self.element("*:focus").await {
            Ok(element) => element,
            Err(_) => self.element("body").await?,
        };
        element
            .press_key(key)
            .await
            .with_context(|| format!("按键失败: {}", key))?;
        Ok(())
    }

    async fn exists(&self, selector: &str) -> Result<bool> {
        let script = format!(
            "document.querySelector({}) !== null",
            js_string(selector)?
        );
        self.eval_as(&script).await
    }

    async fn text_of(&self, selector: &str) -> Result<Option<String>> {
        let script = format!(
            r#"(() => {{
                const el = document.querySelector({sel});
                if (!el) return null;
                if (el.tagName === 'INPUT' || el.tagName === 'TEXTAREA') return el.value;
                return el.innerText;
            }})()"#,
            sel = js_string(selector)?
        );
        self.eval_as(&script).await
    }

    async fn wait_for(&self, selector: &str, timeout: Duration) -> Result<()> {
        self.poll_until(selector, timeout, false).await
    }

    async fn wait_for_hidden(&self, selector: &str, timeout: Duration) -> Result<()> {
        self.poll_until(selector, timeout, true).await
    }

    async fn wait_for_navigation(&self) -> Result<()> {
        self.check_alive()?;
        self.page
            .wait_for_navigation()
            .await
            .context("等待页面跳转失败")?;
        Ok(())
    }

    async fn attach_files(&self, selector: &str, paths: &[PathBuf]) -> Result<()> {
        let element = self.element(selector).await?;
        let mut files = Vec::with_capacity(paths.len());
        for path in paths {
            let absolute = tokio::fs::canonicalize(path)
                .await
                .with_context(|| format!("图片文件不存在: {}", path.display()))?;
            files.push(absolute.to_string_lossy().into_owned());
        }

        let params = SetFileInputFilesParams::builder()
            .files(files)
            .node_id(element.node_id)
            .build()
            .map_err(anyhow::Error::msg)?;
        self.page
            .execute(params)
            .await
            .with_context(|| format!("上传文件失败: {}", selector))?;
        Ok(())
    }

    async fn eval(&self, script: &str) -> Result<JsonValue> {
        self.check_alive()?;
        let result = self.page.evaluate(script).await?;
        // 没有返回值的脚本视为 null
        Ok(result.into_value().unwrap_or(JsonValue::Null))
    }

    async fn screenshot(&self, folder: &Path) -> Result<PathBuf> {
        self.check_alive()?;
        tokio::fs::create_dir_all(folder)
            .await
            .with_context(|| format!("无法创建截图文件夹: {}", folder.display()))?;

        let name = format!(
            "{}_{:06}.png",
            chrono::Local::now().format("%Y%m%d_%H%M%S"),
            rand::thread_rng().gen_range(0..1_000_000)
        );
        let path = folder.join(name);

        let params = ScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Png)
            .full_page(true)
            .build();
        let bytes = self.page.screenshot(params).await.context("截图失败")?;
        tokio::fs::write(&path, bytes)
            .await
            .with_context(|| format!("无法写入截图: {}", path.display()))?;
        Ok(path)
    }

    async fn save_cookies(&self, path: &Path) -> Result<()> {
        self.check_alive()?;
        cookies::save_cookies(&self.page, path).await
    }

    async fn close(&self) -> Result<()> {
        for listener in &self.listeners {
            listener.abort();
        }

        let result = match self.browser.lock().await.take() {
            Some(mut browser) => match browser.close().await {
                Ok(_) => {
                    if let Err(e) = browser.wait().await {
                        warn!("⚠️ 等待浏览器进程退出失败: {}", e);
                    }
                    Ok(())
                }
                Err(e) => {
                    warn!("⚠️ 正常关闭浏览器失败，强制结束进程: {}", e);
                    let _ = browser.kill().await;
                    Err(anyhow::anyhow!("关闭浏览器失败: {}", e))
                }
            },
            None => Ok(()),
        };

        self.handler.abort();
        result
    }
}
