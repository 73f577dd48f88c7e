//! 浏览器操作驱动 - 服务层
//!
//! 打开/关闭浏览器会话，对单个商品执行发布、编辑、下架。
//! 表单填写失败会关闭表单后重试，操作出错时保存截图。

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::{is_already_captured, is_session_failure, ActionError};
use crate::infrastructure::{UiDriver, UiSession};
use crate::models::Listing;
use crate::services::binding::BindingCorrelator;
use crate::services::sell_form::{FormKind, SellForm};
use crate::utils::pacing::Pacer;

/// 标记在售列表中找到的操作菜单按钮
const MENU_TARGET_ATTR: &str = "data-sync-target";

/// 对已在售商品的操作
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManageAction {
    Edit,
    Remove,
}

impl ManageAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ManageAction::Edit => "edit",
            ManageAction::Remove => "remove",
        }
    }
}

impl std::fmt::Display for ManageAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 操作失败原因（不抛出错误的失败）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    /// 在售列表中找不到该商品
    AdNotFound,
}

/// 单次操作的结果
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActionResult {
    pub success: bool,
    pub failure_reason: Option<FailureReason>,
    /// 诊断截图路径
    pub diagnostic_artifact: Option<PathBuf>,
}

impl ActionResult {
    pub fn succeeded() -> Self {
        Self {
            success: true,
            ..Self::default()
        }
    }

    pub fn failed(reason: FailureReason, artifact: Option<PathBuf>) -> Self {
        Self {
            success: false,
            failure_reason: Some(reason),
            diagnostic_artifact: artifact,
        }
    }
}

/// 浏览器操作驱动
#[async_trait]
pub trait ActionDriver: Send {
    /// 打开浏览器会话（必要时登录）
    async fn open(&mut self) -> Result<()>;

    /// 关闭浏览器会话
    async fn close(&mut self) -> Result<()>;

    /// 发布商品；提交模式下等待在售列表确认
    async fn sell(&mut self, listing: &Listing) -> Result<ActionResult>;

    /// 在在售列表中找到商品并编辑或下架；找不到时返回失败结果，不返回错误
    async fn manage(&mut self, listing: &Listing, action: ManageAction) -> Result<ActionResult>;

    /// 在售列表中该标题对应的平台编号
    fn platform_id_for(&self, title: &str) -> Option<String>;
}

/// 基于界面驱动的实现
pub struct MarketplaceSeller {
    driver: Arc<dyn UiDriver>,
    session: Option<Box<dyn UiSession>>,
    bindings: Arc<BindingCorrelator>,
    config: Config,
    pacer: Pacer,
}

impl MarketplaceSeller {
    pub fn new(config: &Config, driver: Arc<dyn UiDriver>) -> Self {
        Self {
            driver,
            session: None,
            bindings: Arc::new(BindingCorrelator::new()),
            config: config.clone(),
            pacer: Pacer::new(config.pacing.clone()),
        }
    }

    pub fn bindings(&self) -> Arc<BindingCorrelator> {
        Arc::clone(&self.bindings)
    }

    fn session(&self) -> Result<&dyn UiSession> {
        self.session
            .as_deref()
            .ok_or_else(|| ActionError::NoSession.into())
    }

    fn timeout(&self) -> Duration {
        Duration::from_millis(self.config.retry.selector_timeout_ms)
    }

    fn form<'a>(&'a self, session: &'a dyn UiSession) -> SellForm<'a> {
        SellForm::new(
            session,
            &self.config.selectors,
            &self.pacer,
            self.timeout(),
            self.config.retry.upload_attempts,
        )
    }

    /// 保存当前页面截图
    async fn capture(&self) -> Option<PathBuf> {
        let session = self.session.as_deref()?;
        match session.screenshot(&self.config.screenshots_dir()).await {
            Ok(path) => {
                info!("📸 截图已保存: {}", path.display());
                Some(path)
            }
            Err(e) => {
                warn!("⚠️ 截图失败: {:#}", e);
                None
            }
        }
    }

    /// 出错时截图后原样返回错误
    async fn capture_on_error<T>(&self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            if !is_already_captured(e) {
                self.capture().await;
            }
        }
        result
    }

    // ========== 登录 ==========

    async fn go_to_marketplace(&self) -> Result<()> {
        let session = self.session()?;
        let url = &self.config.marketplace_url;
        session.navigate(url).await?;

        if !session.exists(&self.config.selectors.login_form).await? {
            debug!("已是登录状态");
            return Ok(());
        }

        let attempts = self.config.retry.login_attempts.max(1);
        for attempt in 1..=attempts {
            match self.log_in(session).await {
                Ok(()) => {
                    self.pacer.step().await;
                    let cookies = PathBuf::from(&self.config.cookies_file);
                    if let Err(e) = session.save_cookies(&cookies).await {
                        warn!("⚠️ 保存 cookies 失败: {:#}", e);
                    }
                    return Ok(());
                }
                Err(e) if is_session_failure(&e) => return Err(e),
                Err(e) => {
                    error!("❌ 第 {}/{} 次登录失败: {:#}", attempt, attempts, e);
                    if attempt < attempts {
                        session.navigate(url).await?;
                    }
                }
            }
        }

        Err(ActionError::LoginFailed { attempts }.into())
    }

    async fn log_in(&self, session: &dyn UiSession) -> Result<()> {
        let s = &self.config.selectors;
        info!("正在登录...");
        session.clear(&s.login_email).await?;
        session.type_text(&s.login_email, &self.config.login).await?;
        self.pacer.step().await;
        session.type_text(&s.login_password, &self.config.password).await?;
        self.pacer.step().await;
        session.click(&s.login_button).await?;
        session.wait_for_navigation().await?;
        if session.exists(&s.login_button).await? {
            bail!("登录后仍停留在登录页面");
        }
        info!("✓ 登录成功");
        Ok(())
    }

    // ========== 表单 ==========

    /// 打开并填写表单，失败时截图、关闭表单后重试
    async fn fill_form_with_retry(&self, kind: FormKind, listing: &Listing) -> Result<()> {
        let session = self.session()?;
        let form = self.form(session);
        let attempts = self.config.retry.form_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            let result = async {
                // 关闭表单时操作菜单也会关闭，编辑重试前需要重新打开
                if kind == FormKind::Edit && attempt > 1 && !self.open_ad_menu(listing).await? {
                    bail!("在售列表中找不到商品 \"{}\"", listing.displayed_title());
                }
                form.open(kind).await?;
                form.fill(listing, self.config.commit).await
            }
            .await;

            match result {
                Ok(()) => {
                    info!("✓ [商品 {}] 表单提交成功", listing.external_id);
                    return Ok(());
                }
                Err(e) if is_session_failure(&e) => return Err(e),
                Err(e) => {
                    error!(
                        "❌ [商品 {}] 第 {}/{} 次填写表单失败: {:#}",
                        listing.external_id, attempt, attempts, e
                    );
                    self.capture().await;
                    last_error = format!("{:#}", e);

                    info!("关闭表单...");
                    if let Err(close_err) = form.dismiss().await {
                        if is_session_failure(&close_err) {
                            return Err(close_err);
                        }
                        warn!("⚠️ 关闭表单失败: {:#}", close_err);
                    }
                }
            }
        }

        Err(ActionError::Terminal {
            external_id: listing.external_id.clone(),
            action: kind.as_str(),
            attempts,
            last_error,
        }
        .into())
    }

    // ========== 发布确认 ==========

    /// 刷新页面直到收到在售列表响应，并确认商品已出现在列表中
    async fn confirm_listed(&self, listing: &Listing) -> Result<()> {
        let session = self.session()?;
        let retry = &self.config.retry;
        let delay = Duration::from_millis(retry.binding_poll_delay_ms);
        self.pacer.step().await;

        let mut ready = false;
        for round in 1..=retry.binding_reloads.max(1) {
            self.bindings.reset();
            info!("正在刷新页面 (第 {} 次)...", round);
            session.reload().await?;
            info!("等待在售列表响应...");
            if self
                .bindings
                .wait_ready(delay, retry.binding_poll_iterations)
                .await
            {
                ready = true;
                break;
            }
            warn!("⚠️ 未收到在售列表响应");
        }

        if !ready {
            return Err(ActionError::BindingTimeout {
                external_id: listing.external_id.clone(),
            }
            .into());
        }
        if self.bindings.lookup(&listing.title).is_none() {
            return Err(ActionError::NotListed {
                external_id: listing.external_id.clone(),
            }
            .into());
        }
        info!("✓ [商品 {}] 已出现在在售列表中", listing.external_id);
        Ok(())
    }

    // ========== 在售列表 ==========

    /// 在当前页面中查找商品并标记其操作菜单按钮
    async fn mark_menu_button(&self, session: &dyn UiSession, title: &str) -> Result<bool> {
        let s = &self.config.selectors;
        let script = format!(
            r#"(() => {{
                const title = {title};
                document.querySelectorAll('[{attr}]').forEach((el) => el.removeAttribute('{attr}'));
                for (const container of document.querySelectorAll({container})) {{
                    if (!container.querySelector({section})) continue;
                    const spans = Array.from(container.querySelectorAll('span[title]'));
                    if (!spans.some((span) => span.getAttribute('title') === title)) continue;
                    const button = container.querySelector({menu});
                    if (!button) return false;
                    button.setAttribute('{attr}', '1');
                    return true;
                }}
                return false;
            }})()"#,
            title = serde_json::to_string(title)?,
            attr = MENU_TARGET_ATTR,
            container = serde_json::to_string(&s.ad_container)?,
            section = serde_json::to_string(&s.ad_section)?,
            menu = serde_json::to_string(&s.ad_menu_button)?,
        );
        Ok(session.eval(&script).await?.as_bool().unwrap_or(false))
    }

    /// 滚动到底部，返回页面高度
    async fn scroll_down(&self, session: &dyn UiSession) -> Result<i64> {
        let height = session
            .eval(
                "(() => { window.scrollTo(0, document.body.scrollHeight); \
                 return document.body.scrollHeight; })()",
            )
            .await?;
        Ok(height.as_i64().unwrap_or_default())
    }

    /// 滚动在售列表查找商品，找到后打开其操作菜单
    async fn open_ad_menu(&self, listing: &Listing) -> Result<bool> {
        let session = self.session()?;
        let title = listing.displayed_title();
        let mut last_height = None;

        for round in 0..=self.config.retry.scroll_rounds {
            debug!("在在售列表中查找 \"{}\" (第 {} 轮)...", title, round + 1);
            if self.mark_menu_button(session, title).await? {
                debug!("已找到商品");
                session
                    .click(&format!("[{}=\"1\"]", MENU_TARGET_ATTR))
                    .await?;
                session
                    .wait_for(&self.config.selectors.menu_item, self.timeout())
                    .await?;
                self.pacer.step().await;
                return Ok(true);
            }

            let height = self.scroll_down(session).await?;
            if last_height == Some(height) {
                debug!("已滚动到列表底部");
                break;
            }
            last_height = Some(height);
            self.pacer.step().await;
        }
        Ok(false)
    }

    async fn manage_inner(&self, listing: &Listing, action: ManageAction) -> Result<ActionResult> {
        if !self.open_ad_menu(listing).await? {
            error!(
                "❌ [商品 {}] 无法{}，在售列表中找不到该商品",
                listing.external_id,
                match action {
                    ManageAction::Edit => "编辑",
                    ManageAction::Remove => "下架",
                }
            );
            let artifact = self.capture().await;
            return Ok(ActionResult::failed(FailureReason::AdNotFound, artifact));
        }

        match action {
            ManageAction::Edit => self.fill_form_with_retry(FormKind::Edit, listing).await?,
            ManageAction::Remove => {
                let session = self.session()?;
                self.form(session).remove(self.config.commit).await?
            }
        }
        Ok(ActionResult::succeeded())
    }

    async fn sell_inner(&self, listing: &Listing) -> Result<ActionResult> {
        self.fill_form_with_retry(FormKind::Sell, listing).await?;
        if self.config.commit {
            self.confirm_listed(listing).await?;
        }
        Ok(ActionResult::succeeded())
    }
}

#[async_trait]
impl ActionDriver for MarketplaceSeller {
    async fn open(&mut self) -> Result<()> {
        info!("🚀 打开浏览器会话...");
        let session = self.driver.open_session(self.bindings()).await?;
        self.session = Some(session);
        let result = self.go_to_marketplace().await;
        self.capture_on_error(result).await?;
        info!("✓ 浏览器会话已就绪");
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        let Some(session) = self.session.take() else {
            return Ok(());
        };
        session.close().await?;
        info!("浏览器会话已关闭");
        Ok(())
    }

    async fn sell(&mut self, listing: &Listing) -> Result<ActionResult> {
        let result = self.sell_inner(listing).await;
        self.capture_on_error(result).await
    }

    async fn manage(&mut self, listing: &Listing, action: ManageAction) -> Result<ActionResult> {
        let result = self.manage_inner(listing, action).await;
        self.capture_on_error(result).await
    }

    fn platform_id_for(&self, title: &str) -> Option<String> {
        self.bindings.lookup(title)
    }
}
