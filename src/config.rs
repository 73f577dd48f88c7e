//! 程序配置
//!
//! 配置从 TOML 文件加载（文件不存在时使用默认值），再由环境变量覆盖。
//! 配置对象在启动时构造一次，通过构造函数传给各个组件。

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use regex::Regex;
use serde::Deserialize;

use crate::error::ConfigError;

/// 程序配置
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    // --- 账号 ---
    pub login: String,
    pub password: String,

    // --- 浏览器 ---
    /// 是否真正提交（false 为演练模式，填写后放弃表单）
    pub commit: bool,
    /// 是否使用无头模式
    pub headless: bool,
    /// 浏览器可执行文件路径（为空时自动查找）
    pub chrome_executable: Option<String>,
    /// 代理地址
    pub proxy: Option<String>,
    /// 卖家在售列表页面
    pub marketplace_url: String,
    /// 在售列表 API 地址（BindingCorrelator 监听的响应）
    pub selling_api_url: String,

    // --- 文件夹 ---
    pub cookies_file: String,
    pub screenshots_folder: String,
    pub pictures_folder: String,

    // --- 数据源 ---
    pub insert_input_file: String,
    pub update_input_file: String,
    pub delete_input_file: String,
    /// 商品分类（所有商品统一）
    pub item_category: String,
    /// 从链接中提取 externalId 的正则（第一个捕获组）
    pub link_pattern: String,
    /// 价格后缀（读取时去掉）
    pub price_suffix: String,

    pub store: StoreConfig,
    pub pacing: PacingConfig,
    pub retry: RetryConfig,
    pub selectors: Selectors,

    /// 是否显示详细日志
    pub verbose_logging: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            login: String::new(),
            password: String::new(),
            commit: false,
            headless: true,
            chrome_executable: None,
            proxy: None,
            marketplace_url: "https://www.facebook.com/marketplace/selling".to_string(),
            selling_api_url: "https://www.facebook.com/api/graphql/".to_string(),
            cookies_file: "cookies.json".to_string(),
            screenshots_folder: "screenshots".to_string(),
            pictures_folder: "pictures".to_string(),
            insert_input_file: "input/insert.toml".to_string(),
            update_input_file: "input/update.toml".to_string(),
            delete_input_file: "input/delete.toml".to_string(),
            item_category: "Property for Sale".to_string(),
            link_pattern: r"https://www\.consortium-immobilier\.fr/annonce-([0-9]+)\.html"
                .to_string(),
            price_suffix: ",00 EUR".to_string(),
            store: StoreConfig::default(),
            pacing: PacingConfig::default(),
            retry: RetryConfig::default(),
            selectors: Selectors::default(),
            verbose_logging: false,
        }
    }
}

/// 存储引擎
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    /// JSON 文档文件
    Json,
    /// SQLite 数据库
    Sqlite,
}

/// 存储配置
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub kind: StoreKind,
    pub path: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            kind: StoreKind::Json,
            path: "listings.json".to_string(),
        }
    }
}

/// 节奏配置（毫秒）
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct PacingConfig {
    /// 每次界面操作后的随机等待区间
    pub step_ms: (u64, u64),
    /// 地点输入后等待下拉建议的区间
    pub suggestion_ms: (u64, u64),
    /// 提交 "Next" 后的等待区间
    pub publish_ms: (u64, u64),
    /// 正式提交模式下两个商品之间的等待区间
    pub between_actions_ms: (u64, u64),
    /// 演练模式下两个商品之间的固定等待
    pub dry_run_interval_ms: u64,
    /// 在售列表中找不到商品后的退避等待
    pub not_found_backoff_ms: u64,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            step_ms: (1_000, 2_000),
            suggestion_ms: (2_000, 3_000),
            publish_ms: (3_000, 5_000),
            between_actions_ms: (60_000, 120_000),
            dry_run_interval_ms: 2_000,
            not_found_backoff_ms: 3_000,
        }
    }
}

impl PacingConfig {
    /// 所有等待都为 0（测试使用）
    pub fn immediate() -> Self {
        Self {
            step_ms: (0, 0),
            suggestion_ms: (0, 0),
            publish_ms: (0, 0),
            between_actions_ms: (0, 0),
            dry_run_interval_ms: 0,
            not_found_backoff_ms: 0,
        }
    }
}

/// 重试与超时配置
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// 表单填写最大尝试次数
    pub form_attempts: usize,
    /// 图片上传最大尝试次数
    pub upload_attempts: usize,
    /// 编辑/删除时查找商品的最大尝试次数
    pub manage_attempts: usize,
    /// 登录最大尝试次数
    pub login_attempts: usize,
    /// 单次运行中会话最多重启次数
    pub session_restarts: usize,
    /// 在售列表轮询间隔
    pub binding_poll_delay_ms: u64,
    /// 在售列表轮询次数
    pub binding_poll_iterations: u32,
    /// 为等待在售列表最多刷新页面次数
    pub binding_reloads: usize,
    /// 在售列表滚动查找的最大轮数
    pub scroll_rounds: usize,
    /// 等待元素的超时时间
    pub selector_timeout_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            form_attempts: 3,
            upload_attempts: 3,
            manage_attempts: 3,
            login_attempts: 2,
            session_restarts: 5,
            binding_poll_delay_ms: 500,
            binding_poll_iterations: 10,
            binding_reloads: 3,
            scroll_rounds: 30,
            selector_timeout_ms: 30_000,
        }
    }
}

/// 页面元素选择器
///
/// 选择器随目标网站改版而变化，全部视为可配置项。
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Selectors {
    pub login_form: String,
    pub login_email: String,
    pub login_password: String,
    pub login_button: String,

    pub create_button: String,
    pub form_type_choice: String,
    pub form_title: String,
    pub form_description: String,
    pub form_price: String,
    pub form_location: String,
    pub form_category: String,
    pub file_input: String,
    pub remove_photo: String,
    pub upload_error: String,
    pub submit_disabled: String,
    pub submit_button: String,

    pub modal_cancel: String,
    pub modal_confirm_close: String,
    pub discard_confirm: String,
    pub discarded_marker: String,

    pub ad_container: String,
    pub ad_section: String,
    pub ad_menu_button: String,
    pub menu_item: String,
    pub menu_edit: String,
    pub menu_remove: String,
    pub remove_dialog: String,
    pub remove_confirm: String,
    pub remove_cancel: String,
}

impl Default for Selectors {
    fn default() -> Self {
        let composer = r#"div[aria-label="Create a new sale post on Marketplace"]"#;
        let submit = r#"div[role=dialog] button[type="submit"][data-testid="react-composer-post-button"]"#;
        let dialog_footer = r#"div[data-testid="simple_xui_dialog_footer"]"#;
        Self {
            login_form: "#login_form".to_string(),
            login_email: "#email".to_string(),
            login_password: "#pass".to_string(),
            login_button: "#loginbutton".to_string(),

            create_button: "div[role=navigation]:nth-child(1) button".to_string(),
            form_type_choice: format!(r#"{} a[role="button"] i:nth-child(1)"#, composer),
            form_title: format!(r#"{} input[placeholder="What are you selling?"]"#, composer),
            form_description: r#"div[aria-multiline="true"]"#.to_string(),
            form_price: r#"input[placeholder="Price"]"#.to_string(),
            form_location: r#"input[placeholder="Add Location"]"#.to_string(),
            form_category: r#"input[placeholder="Select a Category"]"#.to_string(),
            file_input: r#"input[title="Choose a file to upload"]"#.to_string(),
            remove_photo: r#"button[title="Remove photo"], div.fbScrollableAreaContent button[title="Remove"]"#
                .to_string(),
            upload_error: r#"div[aria-haspopup="true"] p"#.to_string(),
            submit_disabled: format!("{}:disabled", submit),
            submit_button: submit.to_string(),

            modal_cancel: "button.layerCancel".to_string(),
            modal_confirm_close: "div.uiOverlayFooter button".to_string(),
            discard_confirm: "div.uiOverlayFooter button:nth-child(1)".to_string(),
            discarded_marker: r#"div[role=dialog] button[type="submit"][aria-haspopup="true"]"#
                .to_string(),

            ad_container: r#"div.clearfix[direction="left"]"#.to_string(),
            ad_section: "section".to_string(),
            ad_menu_button: r#"a > span > i[alt=""]"#.to_string(),
            menu_item: r#"li[role="presentation"] > a[role="menuitem"]"#.to_string(),
            menu_edit: r#"div.uiLayer:not(.hidden_elem) li[role="presentation"]:nth-child(2) > a[role="menuitem"]"#
                .to_string(),
            menu_remove: r#"li[role="presentation"]:nth-child(1) > a[role="menuitem"]"#.to_string(),
            remove_dialog: dialog_footer.to_string(),
            remove_confirm: format!(r#"{} a[action="cancel"]:nth-child(2)"#, dialog_footer),
            remove_cancel: format!(r#"{} a[action="cancel"]:nth-child(1)"#, dialog_footer),
        }
    }
}

impl Config {
    /// 从 TOML 文件加载配置，再应用环境变量覆盖
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("无法读取配置文件: {}", path.display()))?;
            toml::from_str::<Config>(&content).map_err(|source| ConfigError::Parse {
                path: path.display().to_string(),
                source,
            })?
        } else {
            tracing::warn!("⚠️ 配置文件不存在: {}，使用默认配置", path.display());
            Config::default()
        };
        Ok(config.with_env())
    }

    /// 仅从环境变量构造配置
    pub fn from_env() -> Self {
        Self::default().with_env()
    }

    /// 用环境变量覆盖配置
    pub fn with_env(self) -> Self {
        let default = self;
        Self {
            login: env_or("MARKETPLACE_LOGIN", default.login),
            password: env_or("MARKETPLACE_PASSWORD", default.password),
            commit: env_parse_or("COMMIT", default.commit),
            headless: env_parse_or("HEADLESS", default.headless),
            chrome_executable: std::env::var("CHROME_EXECUTABLE")
                .ok()
                .or(default.chrome_executable),
            proxy: std::env::var("PROXY_URL").ok().or(default.proxy),
            pictures_folder: env_or("PICTURES_FOLDER", default.pictures_folder),
            screenshots_folder: env_or("SCREENSHOTS_FOLDER", default.screenshots_folder),
            store: StoreConfig {
                path: env_or("STORE_PATH", default.store.path),
                ..default.store
            },
            verbose_logging: env_parse_or("VERBOSE_LOGGING", default.verbose_logging),
            ..default
        }
    }

    /// 启动浏览器会话之前的致命检查
    pub fn validate_for_run(&self) -> Result<(), ConfigError> {
        if self.login.is_empty() || self.password.is_empty() {
            return Err(ConfigError::MissingCredentials);
        }
        self.link_regex()?;
        Ok(())
    }

    /// 编译链接正则
    pub fn link_regex(&self) -> Result<Regex, ConfigError> {
        Regex::new(&self.link_pattern).map_err(|source| ConfigError::InvalidLinkPattern {
            pattern: self.link_pattern.clone(),
            source,
        })
    }

    /// 固定两个商品之间的等待时间（命令行 --interval）
    pub fn with_interval_secs(mut self, secs: u64) -> Self {
        let ms = secs.saturating_mul(1_000);
        self.pacing.between_actions_ms = (ms, ms);
        self
    }

    pub fn screenshots_dir(&self) -> PathBuf {
        PathBuf::from(&self.screenshots_folder)
    }
}

fn env_or(key: &str, default: String) -> String {
    std::env::var(key).unwrap_or(default)
}

fn env_parse_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_override_falls_back_on_bad_value() {
        std::env::set_var("MARKETPLACE_SYNC_TEST_FLAG", "oui");
        assert!(env_parse_or("MARKETPLACE_SYNC_TEST_FLAG", true));
        std::env::set_var("MARKETPLACE_SYNC_TEST_FLAG", "false");
        assert!(!env_parse_or("MARKETPLACE_SYNC_TEST_FLAG", true));
        std::env::remove_var("MARKETPLACE_SYNC_TEST_FLAG");
        assert_eq!(env_or("MARKETPLACE_SYNC_TEST_FLAG", "x".into()), "x");
    }

    #[test]
    fn test_missing_credentials_is_fatal() {
        let config = Config::default();
        assert!(matches!(
            config.validate_for_run(),
            Err(ConfigError::MissingCredentials)
        ));
    }

    #[test]
    fn test_invalid_link_pattern_is_fatal() {
        let config = Config {
            login: "me@example.com".into(),
            password: "secret".into(),
            link_pattern: "annonce-([0-9]+".into(),
            ..Config::default()
        };
        assert!(matches!(
            config.validate_for_run(),
            Err(ConfigError::InvalidLinkPattern { .. })
        ));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: Config = toml::from_str(
            r#"
            commit = true
            item_category = "Maisons"

            [store]
            kind = "sqlite"

            [retry]
            form_attempts = 5
            "#,
        )
        .unwrap();

        assert!(config.commit);
        assert_eq!(config.item_category, "Maisons");
        assert_eq!(config.store.kind, StoreKind::Sqlite);
        assert_eq!(config.store.path, "listings.json");
        assert_eq!(config.retry.form_attempts, 5);
        assert_eq!(config.retry.upload_attempts, 3);
        assert_eq!(config.pacing.step_ms, (1_000, 2_000));
    }

    #[test]
    fn test_interval_override() {
        let config = Config::default().with_interval_secs(30);
        assert_eq!(config.pacing.between_actions_ms, (30_000, 30_000));
    }
}
