//! 界面驱动能力 - 基础设施层
//!
//! 持有浏览器页面这一稀缺资源，只暴露"点击、输入、等待、执行 JS、截图"等能力，
//! 不认识商品，也不关心流程。选择器对这一层来说只是不透明的字符串。

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value as JsonValue;

use crate::services::binding::BindingCorrelator;

/// 一个已打开的浏览器会话
///
/// 所有操作都会挂起直到完成或超时；超时视为失败并返回错误。
#[async_trait]
pub trait UiSession: Send + Sync {
    /// 导航到指定 URL 并等待加载完成
    async fn navigate(&self, url: &str) -> Result<()>;

    /// 重新加载当前页面
    async fn reload(&self) -> Result<()>;

    async fn click(&self, selector: &str) -> Result<()>;

    /// 选中输入框中的全部文本（后续输入会覆盖原内容）
    async fn select_all(&self, selector: &str) -> Result<()>;

    async fn type_text(&self, selector: &str, text: &str) -> Result<()>;

    /// 清空输入框
    async fn clear(&self, selector: &str) -> Result<()>;

    /// 在当前焦点元素上按键（如 "Enter"、"ArrowDown"）
    async fn press_key(&self, key: &str) -> Result<()>;

    /// 元素是否存在
    async fn exists(&self, selector: &str) -> Result<bool>;

    /// 元素的文本内容，元素不存在时返回 None
    async fn text_of(&self, selector: &str) -> Result<Option<String>>;

    /// 等待元素出现
    async fn wait_for(&self, selector: &str, timeout: Duration) -> Result<()>;

    /// 等待元素消失
    async fn wait_for_hidden(&self, selector: &str, timeout: Duration) -> Result<()>;

    /// 等待页面跳转完成
    async fn wait_for_navigation(&self) -> Result<()>;

    /// 向文件输入框添加文件
    async fn attach_files(&self, selector: &str, paths: &[PathBuf]) -> Result<()>;

    /// 执行 JS 代码并返回 JSON 结果
    async fn eval(&self, script: &str) -> Result<JsonValue>;

    /// 保存当前页面截图到指定文件夹，返回文件路径
    async fn screenshot(&self, folder: &Path) -> Result<PathBuf>;

    /// 保存当前 cookies
    async fn save_cookies(&self, path: &Path) -> Result<()>;

    /// 关闭会话
    async fn close(&self) -> Result<()>;
}

/// 界面驱动：负责打开会话
#[async_trait]
pub trait UiDriver: Send + Sync {
    /// 打开新会话，并把在售列表响应接入 `bindings`
    async fn open_session(&self, bindings: Arc<BindingCorrelator>) -> Result<Box<dyn UiSession>>;
}
