//! 错误类型
//!
//! 业务流程统一使用 `anyhow::Result`，需要被上层识别和分类的错误使用下列类型：
//! - `ConfigError`：启动前即可发现的致命错误
//! - `ValidationError`：数据源记录校验失败（只记录和计数，不抛出）
//! - `ActionError`：浏览器操作失败（重试、终止、会话崩溃）
//! - `StoreError`：存储层错误

use std::path::PathBuf;

use thiserror::Error;

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 缺少登录凭据
    #[error("配置文件中缺少登录凭据 (login / password)")]
    MissingCredentials,

    /// 未知的运行模式
    #[error("无效的运行模式: {0} (可选: posting, edition, deletion)")]
    UnknownMode(String),

    /// 链接正则无法编译
    #[error("链接匹配规则无效 '{pattern}': {source}")]
    InvalidLinkPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// 需要输入文件但未提供
    #[error("模式 {mode} 需要输入文件")]
    MissingInputFile { mode: String },

    /// 输入文件不存在
    #[error("输入文件不存在: {0}")]
    InputFileNotFound(PathBuf),

    /// 配置文件解析失败
    #[error("配置文件解析失败 ({path}): {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

/// 数据源记录校验错误
///
/// FeedProcessor 只记录这些错误，从不向上抛出。
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// 缺少必填字段
    #[error("记录无效 \"{link}\": 缺少字段 \"{field}\"")]
    MissingField { link: String, field: &'static str },

    /// 链接无法提取 externalId
    #[error("记录无效 \"{link}\": 链接无效")]
    InvalidLink { link: String },

    /// 有图片引用但下载结果为空
    #[error("读取记录 \"{link}\" 的图片时出现异常")]
    MissingPictures { link: String },

    /// 图片下载失败
    #[error("记录 \"{link}\" 的图片下载失败 ({url}): {reason}")]
    PictureDownload {
        link: String,
        url: String,
        reason: String,
    },
}

/// 浏览器操作错误
#[derive(Debug, Error)]
pub enum ActionError {
    /// 表单填写失败（可重试）
    #[error("表单填写失败: {0}")]
    Transient(String),

    /// 图片上传多次失败
    #[error("商品 \"{title}\" 的一张或多张图片无效")]
    PictureUpload { title: String },

    /// 重试次数耗尽
    ///
    /// 每次失败的诊断截图已在重试循环中保存，外层不再重复截图。
    #[error("商品 {external_id} 的 {action} 操作在 {attempts} 次尝试后仍然失败: {last_error}")]
    Terminal {
        external_id: String,
        action: &'static str,
        attempts: usize,
        last_error: String,
    },

    /// 提交后未在规定时间内收到在售列表响应
    #[error("等待在售列表响应超时 (商品 {external_id})")]
    BindingTimeout { external_id: String },

    /// 在售列表中找不到刚发布的商品
    #[error("商品 {external_id} 未出现在在售列表中")]
    NotListed { external_id: String },

    /// 登录失败
    #[error("登录失败 (已尝试 {attempts} 次)")]
    LoginFailed { attempts: usize },

    /// 整个浏览器会话不可用，需要重启会话
    #[error("浏览器会话已失效: {0}")]
    SessionLost(String),

    /// 尚未打开会话
    #[error("浏览器会话尚未打开")]
    NoSession,
}

/// 存储层错误
#[derive(Debug, Error)]
pub enum StoreError {
    /// 文件读写失败
    #[error("存储文件读写失败 ({path}): {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// 序列化失败
    #[error("存储数据序列化失败: {0}")]
    Serialization(#[from] serde_json::Error),

    /// SQLite 错误
    #[error("数据库错误: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// 重复的 externalId
    #[error("商品 {0} 已存在")]
    Duplicate(String),

    /// 要更新的记录不存在
    #[error("商品 {0} 不存在")]
    NotFound(String),

    /// 锁已损坏
    #[error("数据库连接锁已损坏")]
    Poisoned,
}

/// 会话崩溃的已知错误特征
const SESSION_FAILURE_SIGNATURES: &[&str] = &["Page crashed", "net::ERR_NAME_NOT_RESOLVED"];

/// 判断错误是否属于整个会话崩溃（需要关闭并重新打开浏览器）
pub fn is_session_failure(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        if let Some(ActionError::SessionLost(_)) = cause.downcast_ref::<ActionError>() {
            return true;
        }
        let message = cause.to_string();
        SESSION_FAILURE_SIGNATURES
            .iter()
            .any(|signature| message.contains(signature))
    })
}

/// 判断错误是否已经在重试循环中截过图
pub(crate) fn is_already_captured(err: &anyhow::Error) -> bool {
    matches!(
        err.downcast_ref::<ActionError>(),
        Some(ActionError::Terminal { .. })
    )
}
