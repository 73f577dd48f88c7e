//! 存储层
//!
//! `Repository` 是商品记录的唯一数据来源。每次写操作在返回前必须已经落盘，
//! 会话崩溃重启后依赖存储中的状态判断哪些商品已经处理过。

pub mod json_store;
pub mod sqlite_store;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use crate::config::{StoreConfig, StoreKind};
use crate::models::{Listing, ListingState};

pub use json_store::JsonFileRepository;
pub use sqlite_store::SqliteRepository;

/// 商品记录存储
#[async_trait]
pub trait Repository: Send + Sync {
    /// 按 externalId 查找
    async fn get(&self, external_id: &str) -> Result<Option<Listing>>;

    /// 按标题查找
    async fn get_by_title(&self, title: &str) -> Result<Option<Listing>>;

    /// 按生命周期状态列出（保持插入顺序）
    async fn list_by_state(&self, state: ListingState) -> Result<Vec<Listing>>;

    /// 插入新记录，externalId 已存在时报错
    async fn insert(&self, listing: &Listing) -> Result<()>;

    /// 按 externalId 覆盖已有记录
    async fn update(&self, listing: &Listing) -> Result<()>;

    /// 删除记录
    async fn remove(&self, listing: &Listing) -> Result<()>;

    /// 记录总数
    async fn count(&self) -> Result<usize>;
}

/// 根据配置打开存储（启动阶段调用，失败即终止）
pub async fn open_repository(config: &StoreConfig) -> Result<Arc<dyn Repository>> {
    let repo: Arc<dyn Repository> = match config.kind {
        StoreKind::Json => Arc::new(JsonFileRepository::open(&config.path).await?),
        StoreKind::Sqlite => Arc::new(SqliteRepository::open(&config.path)?),
    };
    tracing::info!("✓ 已打开存储: {} ({:?})", config.path, config.kind);
    Ok(repo)
}
