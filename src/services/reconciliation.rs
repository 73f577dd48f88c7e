//! 数据源与存储的对账 - 服务层
//!
//! 计算三种差异：待新增、待编辑、待下架。跳过的记录只记录警告，不作为错误返回；
//! 只有存储层本身出错时才返回错误。

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use regex::Regex;
use tracing::{error, info, warn};

use crate::models::{Listing, ListingState};
use crate::services::feed_processor::external_id_from_link;
use crate::storage::Repository;

pub struct Reconciler {
    repo: Arc<dyn Repository>,
    link_pattern: Regex,
}

impl Reconciler {
    pub fn new(repo: Arc<dyn Repository>, link_pattern: Regex) -> Self {
        Self { repo, link_pattern }
    }

    /// 待新增：不存在的写入存储，已下架的重置为待发布
    ///
    /// 返回本次新写入或重新上架的商品。
    pub async fn to_insert(&self, drafts: &[Listing]) -> Result<Vec<Listing>> {
        let mut inserted = Vec::new();

        for draft in drafts {
            let stored = self
                .repo
                .get(&draft.external_id)
                .await
                .with_context(|| format!("读取商品 {} 失败", draft.external_id))?;

            let mut listing = draft.clone();
            listing.reset_to_draft();

            match stored {
                None => {
                    self.repo
                        .insert(&listing)
                        .await
                        .with_context(|| format!("写入商品 {} 失败", listing.external_id))?;
                    inserted.push(listing);
                }
                Some(existing) if existing.state() == ListingState::Removed => {
                    info!("商品 \"{}\" 已下架，重新作为待发布商品", existing.external_id);
                    self.repo
                        .update(&listing)
                        .await
                        .with_context(|| format!("重置商品 {} 失败", listing.external_id))?;
                    inserted.push(listing);
                }
                Some(existing) => {
                    warn!("⚠️ 商品 \"{}\" 已存在", existing.external_id);
                }
            }
        }

        if !inserted.is_empty() {
            info!("✓ {} 个新商品已写入存储", inserted.len());
        }
        let total = self.repo.count().await.context("统计商品数量失败")?;
        info!("存储中当前共有 {} 个商品", total);

        Ok(inserted)
    }

    /// 待编辑：在售且内容有变化的商品
    ///
    /// 结果保留原有的平台编号，并记住网站上当前显示的标题。
    pub async fn to_edit(&self, drafts: &[Listing]) -> Result<Vec<Listing>> {
        let mut edits = Vec::new();

        for draft in drafts {
            let stored = self
                .repo
                .get(&draft.external_id)
                .await
                .with_context(|| format!("读取商品 {} 失败", draft.external_id))?;

            let Some(stored) = stored else {
                warn!("⚠️ 商品 \"{}\" 不在存储中", draft.external_id);
                continue;
            };

            match stored.state() {
                ListingState::Draft => {
                    warn!("⚠️ 商品 \"{}\" 尚未发布", stored.external_id);
                }
                ListingState::Removed => {
                    warn!("⚠️ 商品 \"{}\" 已下架", stored.external_id);
                }
                ListingState::ForSale if stored.same_content(draft) => {
                    warn!("⚠️ 商品 \"{}\" 已是最新", stored.external_id);
                }
                ListingState::ForSale => {
                    let mut edited = stored.clone();
                    edited.apply_content(draft);
                    edited.old_title = Some(stored.title.clone());
                    edits.push(edited);
                }
            }
        }

        info!("📦 待编辑商品: {} 个", edits.len());
        Ok(edits)
    }

    /// 待下架：在售的商品
    ///
    /// 尚未发布的商品直接在存储中标记为已下架，不需要界面操作。
    pub async fn to_remove(&self, links: &[String]) -> Result<Vec<Listing>> {
        let mut removals = Vec::new();

        for link in links {
            let Some(external_id) = external_id_from_link(&self.link_pattern, link) else {
                error!("❌ 链接 \"{}\" 无效", link);
                continue;
            };

            let stored = self
                .repo
                .get(&external_id)
                .await
                .with_context(|| format!("读取商品 {} 失败", external_id))?;

            let Some(mut stored) = stored else {
                warn!("⚠️ 商品 \"{}\" 不在存储中", external_id);
                continue;
            };

            match stored.state() {
                ListingState::Draft => {
                    warn!("⚠️ 商品 \"{}\" 未在售，直接标记为已下架", external_id);
                    stored.mark_removed(Utc::now());
                    self.repo
                        .update(&stored)
                        .await
                        .with_context(|| format!("更新商品 {} 失败", external_id))?;
                }
                ListingState::Removed => {
                    warn!("⚠️ 商品 \"{}\" 已经下架", external_id);
                }
                ListingState::ForSale => removals.push(stored),
            }
        }

        info!("📦 待下架商品: {} 个", removals.len());
        Ok(removals)
    }
}
