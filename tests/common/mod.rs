//! 集成测试共用的替身实现
#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value as JsonValue};

use marketplace_sync::config::{Config, PacingConfig, StoreConfig, StoreKind};
use marketplace_sync::error::ActionError;
use marketplace_sync::infrastructure::{MediaFetcher, UiDriver, UiSession};
use marketplace_sync::models::{Listing, RawRecord};
use marketplace_sync::services::{
    ActionDriver, ActionResult, BindingCorrelator, FailureReason, ManageAction,
};

pub const LINK_PREFIX: &str = "https://www.consortium-immobilier.fr/annonce-";

pub fn link(id: &str) -> String {
    format!("{}{}.html", LINK_PREFIX, id)
}

/// 所有等待为 0、文件都放在临时目录中的配置
pub fn test_config(dir: &Path) -> Config {
    let mut config = Config {
        login: "seller@example.com".into(),
        password: "secret".into(),
        pictures_folder: dir.join("pictures").display().to_string(),
        screenshots_folder: dir.join("screenshots").display().to_string(),
        cookies_file: dir.join("cookies.json").display().to_string(),
        insert_input_file: dir.join("insert.toml").display().to_string(),
        update_input_file: dir.join("update.toml").display().to_string(),
        delete_input_file: dir.join("delete.toml").display().to_string(),
        store: StoreConfig {
            kind: StoreKind::Json,
            path: dir.join("listings.json").display().to_string(),
        },
        pacing: PacingConfig::immediate(),
        ..Config::default()
    };
    config.retry.binding_poll_delay_ms = 10;
    config.retry.binding_poll_iterations = 2;
    config.retry.selector_timeout_ms = 50;
    config
}

pub fn listing(id: &str, title: &str) -> Listing {
    Listing {
        external_id: id.into(),
        link: link(id),
        title: title.into(),
        price: "300 000".into(),
        location: "Metz".into(),
        description: "Jolie maison".into(),
        category: "Property for Sale".into(),
        pictures: vec![format!("pictures/{}-1.jpg", id)],
        platform_id: None,
        posted_at: None,
        updated_at: None,
        removed_at: None,
        old_title: None,
    }
}

pub fn record(id: &str, title: &str) -> RawRecord {
    RawRecord {
        link: Some(link(id)),
        title: Some(title.into()),
        price: Some("300 000,00 EUR".into()),
        city: Some("Metz".into()),
        description: Some("Jolie maison".into()),
        photos: vec![format!("https://cdn.example.com/photos/{}-1.jpg", id)],
    }
}

/// 在售列表响应
pub fn selling_feed(items: &[(&str, &str)]) -> JsonValue {
    let edges: Vec<JsonValue> = items
        .iter()
        .map(|(id, title)| json!({ "node": { "id": id, "group_commerce_item_title": title } }))
        .collect();
    json!({ "data": { "viewer": { "selling_feed_one_page": { "edges": edges } } } })
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

// ========== 下载 ==========

/// 写入固定内容的下载替身
#[derive(Default)]
pub struct FakeFetcher {
    /// 第一次下载时写入空文件的地址
    pub empty_once: Mutex<HashSet<String>>,
    /// 总是失败的地址
    pub failing: HashSet<String>,
    pub fetched: Mutex<Vec<String>>,
}

impl FakeFetcher {
    pub fn fetch_count(&self) -> usize {
        lock(&self.fetched).len()
    }
}

#[async_trait]
impl MediaFetcher for FakeFetcher {
    async fn fetch(&self, url: &str, dest: &Path) -> Result<()> {
        lock(&self.fetched).push(url.to_string());
        if self.failing.contains(url) {
            anyhow::bail!("404 Not Found: {}", url);
        }
        let content: &[u8] = if lock(&self.empty_once).remove(url) {
            b""
        } else {
            b"\xFF\xD8\xFF jpeg"
        };
        tokio::fs::write(dest, content).await?;
        Ok(())
    }
}

// ========== 界面会话 ==========

/// 界面会话替身的共享状态（测试在驱动被移走后仍可检查）
#[derive(Default)]
pub struct UiState {
    pub sessions_opened: usize,
    pub sessions_closed: usize,
    pub screenshots: usize,
    /// 之后的 type_text 调用中需要失败的次数
    pub type_failures: usize,
    /// 置为 true 后所有操作都返回会话崩溃
    pub crashed: bool,
    /// 视为存在的选择器
    pub present: HashSet<String>,
    /// text_of 返回的内容
    pub texts: HashMap<String, String>,
    /// 在售列表页面中显示的标题
    pub listed_titles: Vec<String>,
    /// 刷新页面时送入 BindingCorrelator 的响应
    pub feed_on_reload: Option<JsonValue>,
    pub clicks: Vec<String>,
    pub typed: Vec<(String, String)>,
    pub attached: Vec<PathBuf>,
    pub reloads: usize,
}

pub struct FakeUiDriver {
    pub state: Arc<Mutex<UiState>>,
}

impl FakeUiDriver {
    pub fn new() -> (Self, Arc<Mutex<UiState>>) {
        let state = Arc::new(Mutex::new(UiState::default()));
        (
            Self {
                state: Arc::clone(&state),
            },
            state,
        )
    }
}

#[async_trait]
impl UiDriver for FakeUiDriver {
    async fn open_session(&self, bindings: Arc<BindingCorrelator>) -> Result<Box<dyn UiSession>> {
        lock(&self.state).sessions_opened += 1;
        Ok(Box::new(FakeSession {
            state: Arc::clone(&self.state),
            bindings,
        }))
    }
}

pub struct FakeSession {
    state: Arc<Mutex<UiState>>,
    bindings: Arc<BindingCorrelator>,
}

impl FakeSession {
    fn alive(&self) -> Result<MutexGuard<'_, UiState>> {
        let state = lock(&self.state);
        if state.crashed {
            return Err(ActionError::SessionLost("Page crashed!".into()).into());
        }
        Ok(state)
    }
}

#[async_trait]
impl UiSession for FakeSession {
    async fn navigate(&self, _url: &str) -> Result<()> {
        self.alive()?;
        Ok(())
    }

    async fn reload(&self) -> Result<()> {
        let feed = {
            let mut state = self.alive()?;
            state.reloads += 1;
            state.feed_on_reload.clone()
        };
        if let Some(feed) = feed {
            self.bindings.ingest(&feed);
        }
        Ok(())
    }

    async fn click(&self, selector: &str) -> Result<()> {
        self.alive()?.clicks.push(selector.to_string());
        Ok(())
    }

    async fn select_all(&self, _selector: &str) -> Result<()> {
        self.alive()?;
        Ok(())
    }

    async fn type_text(&self, selector: &str, text: &str) -> Result<()> {
        let mut state = self.alive()?;
        if state.type_failures > 0 {
            state.type_failures -= 1;
            return Err(ActionError::Transient(format!("元素不可输入: {}", selector)).into());
        }
        state.typed.push((selector.to_string(), text.to_string()));
        Ok(())
    }

    async fn clear(&self, _selector: &str) -> Result<()> {
        self.alive()?;
        Ok(())
    }

    async fn press_key(&self, _key: &str) -> Result<()> {
        self.alive()?;
        Ok(())
    }

    async fn exists(&self, selector: &str) -> Result<bool> {
        Ok(self.alive()?.present.contains(selector))
    }

    async fn text_of(&self, selector: &str) -> Result<Option<String>> {
        Ok(self.alive()?.texts.get(selector).cloned())
    }

    async fn wait_for(&self, _selector: &str, _timeout: Duration) -> Result<()> {
        self.alive()?;
        Ok(())
    }

    async fn wait_for_hidden(&self, _selector: &str, _timeout: Duration) -> Result<()> {
        self.alive()?;
        Ok(())
    }

    async fn wait_for_navigation(&self) -> Result<()> {
        self.alive()?;
        Ok(())
    }

    async fn attach_files(&self, _selector: &str, paths: &[PathBuf]) -> Result<()> {
        self.alive()?.attached.extend(paths.iter().cloned());
        Ok(())
    }

    /// 只识别两类脚本：查找商品菜单按钮、滚动到底部
    async fn eval(&self, script: &str) -> Result<JsonValue> {
        let state = self.alive()?;
        if script.contains("data-sync-target") {
            let found = state.listed_titles.iter().any(|title| {
                serde_json::to_string(title)
                    .map(|literal| script.contains(&format!("const title = {};", literal)))
                    .unwrap_or(false)
            });
            return Ok(JsonValue::Bool(found));
        }
        if script.contains("scrollHeight") {
            return Ok(json!(2400));
        }
        Ok(JsonValue::Null)
    }

    async fn screenshot(&self, folder: &Path) -> Result<PathBuf> {
        let mut state = self.alive()?;
        state.screenshots += 1;
        Ok(folder.join(format!("shot_{}.png", state.screenshots)))
    }

    async fn save_cookies(&self, _path: &Path) -> Result<()> {
        self.alive()?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        lock(&self.state).sessions_closed += 1;
        Ok(())
    }
}

// ========== 操作驱动 ==========

/// ActionDriver 替身的共享状态
#[derive(Default)]
pub struct ScriptState {
    pub opened: usize,
    pub closed: usize,
    /// 成功发布的 externalId
    pub sold: Vec<String>,
    /// 成功操作的 (externalId, 操作)
    pub managed: Vec<(String, ManageAction)>,
    /// 在售列表中已有的标题 → 平台编号
    pub bindings: HashMap<String, String>,
    /// 在售列表中找不到的标题
    pub missing: HashSet<String>,
    pub not_found_calls: usize,
    /// 第 N 次调用 sell 时会话崩溃（只发生一次）
    pub crash_on_sell: Option<usize>,
    pub sell_calls: usize,
}

pub struct ScriptedActionDriver {
    pub state: Arc<Mutex<ScriptState>>,
}

impl ScriptedActionDriver {
    pub fn new() -> (Self, Arc<Mutex<ScriptState>>) {
        let state = Arc::new(Mutex::new(ScriptState::default()));
        (
            Self {
                state: Arc::clone(&state),
            },
            state,
        )
    }
}

#[async_trait]
impl ActionDriver for ScriptedActionDriver {
    async fn open(&mut self) -> Result<()> {
        lock(&self.state).opened += 1;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        lock(&self.state).closed += 1;
        Ok(())
    }

    async fn sell(&mut self, listing: &Listing) -> Result<ActionResult> {
        let mut state = lock(&self.state);
        state.sell_calls += 1;
        if state.crash_on_sell == Some(state.sell_calls) {
            state.crash_on_sell = None;
            anyhow::bail!("Page crashed!");
        }
        state.sold.push(listing.external_id.clone());
        state
            .bindings
            .insert(listing.title.clone(), format!("fb-{}", listing.external_id));
        Ok(ActionResult::succeeded())
    }

    async fn manage(&mut self, listing: &Listing, action: ManageAction) -> Result<ActionResult> {
        let mut state = lock(&self.state);
        if state.missing.contains(listing.displayed_title()) {
            state.not_found_calls += 1;
            return Ok(ActionResult::failed(FailureReason::AdNotFound, None));
        }
        state.managed.push((listing.external_id.clone(), action));
        Ok(ActionResult::succeeded())
    }

    fn platform_id_for(&self, title: &str) -> Option<String> {
        lock(&self.state).bindings.get(title).cloned()
    }
}
