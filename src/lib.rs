//! # Marketplace Sync
//!
//! 把外部数据源中的房产广告同步到二手交易平台：发布、编辑、下架，
//! 并在本地存储中跟踪每个商品的生命周期（待发布 → 在售 → 已下架）。
//!
//! ## 架构设计
//!
//! 本系统采用四层架构：
//!
//! ### ① 基础设施层（Infrastructure）
//! - `infrastructure/` - 持有稀缺资源（浏览器页面、HTTP 客户端），只暴露能力
//! - `UiDriver` / `UiSession` - 界面驱动能力，`browser/` 提供 chromiumoxide 实现
//! - `MediaFetcher` - 文件下载能力
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 描述"我能做什么"
//! - `FeedProcessor` - 数据源记录校验、图片下载
//! - `Reconciler` - 对账：待新增 / 待编辑 / 待下架
//! - `MarketplaceSeller` - 浏览器操作：发布、编辑、下架
//! - `BindingCorrelator` - 从在售列表响应中关联平台编号
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - 定义"一个商品"的完整处理流程
//! - `ItemCtx` - 上下文封装（商品编号 + 位置）
//! - `ItemFlow` - 流程编排（存储检查 → 浏览器操作 → 写回存储）
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/launcher` - 选择模式、加载待处理商品、会话崩溃重启
//!
//! 存储（`storage/`）是唯一的进度来源，支持 JSON 文件和 SQLite 两种引擎。
//!
//! ## 模块结构

pub mod browser;
pub mod config;
pub mod error;
pub mod infrastructure;

pub mod models;
pub mod orchestrator;
pub mod services;
pub mod storage;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use browser::ChromeDriver;
pub use config::Config;
pub use error::{is_session_failure, ActionError, ConfigError, StoreError, ValidationError};
pub use infrastructure::{HttpFetcher, MediaFetcher, UiDriver, UiSession};
pub use models::{Listing, ListingState, RawRecord};
pub use orchestrator::{Launcher, Mode, RunStats};
pub use services::{
    ActionDriver, ActionResult, BindingCorrelator, FailureReason, FeedProcessor, ManageAction,
    MarketplaceSeller, Reconciler,
};
pub use storage::{open_repository, JsonFileRepository, Repository, SqliteRepository};
pub use workflow::{ItemCtx, ItemFlow, ItemOutcome};
