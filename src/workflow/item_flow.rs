//! 商品处理流程 - 流程层
//!
//! 核心职责：定义"一个商品"的发布、编辑、下架流程
//!
//! 每个流程都先对照存储再检查一次（会话重启后已完成的商品会被跳过），
//! 再调用浏览器操作，成功后立即写回存储。

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{info, warn};

use crate::error::ActionError;
use crate::models::{Listing, ListingState};
use crate::services::seller::{ActionDriver, ManageAction};
use crate::storage::Repository;
use crate::utils::pacing::Pacer;
use crate::workflow::item_ctx::ItemCtx;

/// 商品处理结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemOutcome {
    /// 已完成并写入存储
    Done,
    /// 已在售，直接记录平台编号（无界面操作）
    AlreadyForSale,
    /// 试运行完成（未提交，未写入存储）
    DryRun,
    /// 存储中的状态表明无需处理
    Skipped,
    /// 在售列表中找不到该商品
    NotFound,
}

impl ItemOutcome {
    /// 是否执行了界面操作（决定之后是否需要停顿）
    pub fn acted(&self) -> bool {
        matches!(self, ItemOutcome::Done | ItemOutcome::DryRun)
    }
}

/// 商品处理流程
///
/// - 不持有浏览器会话，只借用 ActionDriver
/// - 存储是唯一的进度来源
pub struct ItemFlow<'a> {
    driver: &'a mut dyn ActionDriver,
    repo: &'a dyn Repository,
    pacer: &'a Pacer,
    commit: bool,
    manage_attempts: usize,
}

impl<'a> ItemFlow<'a> {
    pub fn new(
        driver: &'a mut dyn ActionDriver,
        repo: &'a dyn Repository,
        pacer: &'a Pacer,
        commit: bool,
        manage_attempts: usize,
    ) -> Self {
        Self {
            driver,
            repo,
            pacer,
            commit,
            manage_attempts: manage_attempts.max(1),
        }
    }

    /// 存储中的当前记录；不存在或状态不符时返回 None
    async fn stored_in_state(
        &self,
        ctx: &ItemCtx,
        expected: ListingState,
    ) -> Result<Option<Listing>> {
        let stored = self
            .repo
            .get(&ctx.external_id)
            .await
            .with_context(|| format!("{} 读取存储失败", ctx))?;

        match stored {
            None => {
                warn!("{} ⚠️ 不在存储中，跳过", ctx);
                Ok(None)
            }
            Some(stored) if stored.state() != expected => {
                info!("{} 当前状态为「{}」，跳过", ctx, stored.state());
                Ok(None)
            }
            Some(stored) => Ok(Some(stored)),
        }
    }

    /// 发布一个待发布商品
    pub async fn post(&mut self, ctx: &ItemCtx, listing: &Listing) -> Result<ItemOutcome> {
        info!("{} 📤 正在发布商品...", ctx);
        let Some(mut stored) = self.stored_in_state(ctx, ListingState::Draft).await? else {
            return Ok(ItemOutcome::Skipped);
        };

        if let Some(platform_id) = self.driver.platform_id_for(&listing.title) {
            warn!("{} ⚠️ 商品已在售，直接记录平台编号 {}", ctx, platform_id);
            stored.mark_posted(platform_id, Utc::now());
            self.repo.update(&stored).await?;
            return Ok(ItemOutcome::AlreadyForSale);
        }

        self.driver
            .sell(listing)
            .await
            .with_context(|| format!("{} 发布失败", ctx))?;

        if !self.commit {
            info!("{} ✓ 试运行完成", ctx);
            return Ok(ItemOutcome::DryRun);
        }

        let platform_id = self.driver.platform_id_for(&listing.title).ok_or_else(|| {
            ActionError::NotListed {
                external_id: listing.external_id.clone(),
            }
        })?;
        stored.mark_posted(platform_id, Utc::now());
        self.repo.update(&stored).await?;
        info!("{} ✓ 商品已在售", ctx);
        Ok(ItemOutcome::Done)
    }

    /// 编辑一个在售商品（`listing` 已包含新内容和原标题）
    pub async fn edit(&mut self, ctx: &ItemCtx, listing: &Listing) -> Result<ItemOutcome> {
        info!("{} ✏️ 正在更新商品...", ctx);
        let Some(stored) = self.stored_in_state(ctx, ListingState::ForSale).await? else {
            return Ok(ItemOutcome::Skipped);
        };
        if stored.same_content(listing) {
            info!("{} 存储中已是最新内容，跳过", ctx);
            return Ok(ItemOutcome::Skipped);
        }

        if !self.manage(ctx, listing, ManageAction::Edit).await? {
            return Ok(ItemOutcome::NotFound);
        }

        if !self.commit {
            info!("{} ✓ 试运行完成", ctx);
            return Ok(ItemOutcome::DryRun);
        }

        let mut updated = listing.clone();
        updated.mark_updated(Utc::now());
        self.repo.update(&updated).await?;
        info!("{} ✓ 商品已更新", ctx);
        Ok(ItemOutcome::Done)
    }

    /// 下架一个在售商品
    pub async fn remove(&mut self, ctx: &ItemCtx, listing: &Listing) -> Result<ItemOutcome> {
        info!("{} 🗑️ 正在下架商品...", ctx);
        let Some(mut stored) = self.stored_in_state(ctx, ListingState::ForSale).await? else {
            return Ok(ItemOutcome::Skipped);
        };

        if !self.manage(ctx, listing, ManageAction::Remove).await? {
            return Ok(ItemOutcome::NotFound);
        }

        if !self.commit {
            info!("{} ✓ 试运行完成", ctx);
            return Ok(ItemOutcome::DryRun);
        }

        stored.mark_removed(Utc::now());
        self.repo.update(&stored).await?;
        info!("{} ✓ 商品已下架", ctx);
        Ok(ItemOutcome::Done)
    }

    /// 在在售列表中查找并操作商品，找不到时重试
    async fn manage(
        &mut self,
        ctx: &ItemCtx,
        listing: &Listing,
        action: ManageAction,
    ) -> Result<bool> {
        for attempt in 1..=self.manage_attempts {
            let result = self
                .driver
                .manage(listing, action)
                .await
                .with_context(|| format!("{} {} 操作失败", ctx, action))?;
            if result.success {
                return Ok(true);
            }
            warn!(
                "{} ⚠️ 第 {}/{} 次未找到商品",
                ctx, attempt, self.manage_attempts
            );
            self.pacer.not_found_backoff().await;
        }
        warn!("{} ⚠️ 多次未找到商品，放弃", ctx);
        Ok(false)
    }
}
