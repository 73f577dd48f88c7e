//! 发布表单操作 - 服务层
//!
//! 新建和编辑共用同一个表单：打开、填写、上传图片、提交或放弃、关闭。
//! 每一步界面操作之后都有随机停顿。

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Result};
use tracing::{debug, error, info};

use crate::config::Selectors;
use crate::error::ActionError;
use crate::infrastructure::UiSession;
use crate::models::Listing;
use crate::utils::pacing::Pacer;

/// 清理已上传图片时最多点击的次数
const MAX_PICTURE_REMOVALS: usize = 50;

/// 表单类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormKind {
    /// 新建商品
    Sell,
    /// 编辑已在售的商品（操作菜单已打开）
    Edit,
}

impl FormKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FormKind::Sell => "sell",
            FormKind::Edit => "edit",
        }
    }
}

pub struct SellForm<'a> {
    session: &'a dyn UiSession,
    selectors: &'a Selectors,
    pacer: &'a Pacer,
    timeout: Duration,
    upload_attempts: usize,
}

impl<'a> SellForm<'a> {
    pub fn new(
        session: &'a dyn UiSession,
        selectors: &'a Selectors,
        pacer: &'a Pacer,
        timeout: Duration,
        upload_attempts: usize,
    ) -> Self {
        Self {
            session,
            selectors,
            pacer,
            timeout,
            upload_attempts: upload_attempts.max(1),
        }
    }

    /// 打开表单
    pub async fn open(&self, kind: FormKind) -> Result<()> {
        let s = self.selectors;
        info!("正在打开表单...");
        match kind {
            FormKind::Sell => {
                self.session.click(&s.create_button).await?;
                let either = format!("{}, {}", s.form_type_choice, s.form_title);
                self.session.wait_for(&either, self.timeout).await?;
                self.pacer.step().await;
                // 类型选择这一步在部分页面版本中不存在
                if self.session.exists(&s.form_type_choice).await? {
                    self.session.click(&s.form_type_choice).await?;
                }
            }
            FormKind::Edit => {
                self.session.click(&s.menu_edit).await?;
            }
        }
        self.session.wait_for(&s.form_title, self.timeout).await?;
        self.pacer.step().await;
        Ok(())
    }

    /// 填写并提交（或放弃）表单
    pub async fn fill(&self, listing: &Listing, commit: bool) -> Result<()> {
        let s = self.selectors;

        // 描述
        let previous = self.session.text_of(&s.form_description).await?;
        if previous.is_some_and(|text| !text.trim().is_empty()) {
            self.session.clear(&s.form_description).await?;
        }
        self.session
            .type_text(&s.form_description, &listing.description)
            .await?;
        self.pacer.step().await;

        // 标题和价格：全选后覆盖
        self.replace_text(&s.form_title, &listing.title).await?;
        self.replace_text(&s.form_price, &listing.price).await?;

        // 地点：页面会预选第一个建议
        self.replace_text(&s.form_location, &listing.location).await?;
        self.pacer.suggestion().await;
        self.session.press_key("Enter").await?;
        self.pacer.step().await;

        // 分类
        self.replace_text(&s.form_category, &listing.category).await?;
        self.session.press_key("ArrowDown").await?;
        self.pacer.step().await;
        self.session.press_key("Enter").await?;
        self.pacer.step().await;

        self.upload_pictures(listing).await?;
        self.pacer.step().await;

        if commit {
            self.submit().await?;
        } else {
            self.discard().await?;
        }
        info!("✓ 表单填写完成");
        Ok(())
    }

    async fn replace_text(&self, selector: &str, text: &str) -> Result<()> {
        self.session.select_all(selector).await?;
        self.pacer.step().await;
        self.session.type_text(selector, text).await?;
        self.pacer.step().await;
        Ok(())
    }

    /// 删除表单中已有的图片
    async fn clean_pictures(&self) -> Result<()> {
        let selector = &self.selectors.remove_photo;
        for _ in 0..MAX_PICTURE_REMOVALS {
            if !self.session.exists(selector).await? {
                return Ok(());
            }
            self.session.click(selector).await?;
            self.pacer.step().await;
        }
        bail!("无法清除表单中已有的图片")
    }

    /// 上传图片，出现上传错误时清除后重试
    async fn upload_pictures(&self, listing: &Listing) -> Result<()> {
        let s = self.selectors;
        self.clean_pictures().await?;

        let paths: Vec<PathBuf> = listing.pictures.iter().map(PathBuf::from).collect();
        for attempt in 1..=self.upload_attempts {
            self.session.attach_files(&s.file_input, &paths).await?;
            match self
                .session
                .wait_for_hidden(&s.submit_disabled, self.timeout)
                .await
            {
                Ok(()) => {
                    info!("✓ 图片上传成功 ({} 张)", paths.len());
                    return Ok(());
                }
                Err(e) => {
                    if !self.session.exists(&s.upload_error).await? {
                        return Err(e);
                    }
                    error!(
                        "❌ 图片上传出错 (第 {}/{} 次)，正在重试...",
                        attempt, self.upload_attempts
                    );
                    self.clean_pictures().await?;
                }
            }
        }

        Err(ActionError::PictureUpload {
            title: listing.title.clone(),
        }
        .into())
    }

    /// 提交表单（需要时先点击 "Next"）
    async fn submit(&self) -> Result<()> {
        let s = self.selectors;
        let label = self.session.text_of(&s.submit_button).await?;
        if label.as_deref().map(str::trim) == Some("Next") {
            debug!("点击 Next");
            self.session.click(&s.submit_button).await?;
            self.pacer.publish().await;
        }
        self.session.click(&s.submit_button).await?;
        self.session
            .wait_for_hidden(&s.submit_button, self.timeout)
            .await?;
        Ok(())
    }

    /// 放弃表单（试运行）
    async fn discard(&self) -> Result<()> {
        let s = self.selectors;
        self.session.click(&s.modal_cancel).await?;
        self.session.wait_for(&s.discard_confirm, self.timeout).await?;
        self.pacer.step().await;
        self.session.click(&s.discard_confirm).await?;
        self.session
            .wait_for_hidden(&s.discarded_marker, self.timeout)
            .await?;
        debug!("表单已放弃（试运行）");
        Ok(())
    }

    /// 关闭当前表单（失败重试前）
    pub async fn dismiss(&self) -> Result<()> {
        let s = self.selectors;
        self.session.click(&s.modal_cancel).await?;
        self.pacer.step().await;
        if self.session.exists(&s.modal_confirm_close).await? {
            self.session.click(&s.modal_confirm_close).await?;
            self.session
                .wait_for_hidden(&s.modal_confirm_close, self.timeout)
                .await?;
        }
        self.session
            .wait_for_hidden(&s.modal_cancel, self.timeout)
            .await?;
        Ok(())
    }

    /// 在已打开的操作菜单中下架商品，试运行时取消
    pub async fn remove(&self, commit: bool) -> Result<()> {
        let s = self.selectors;
        self.session.click(&s.menu_remove).await?;
        self.session.wait_for(&s.remove_dialog, self.timeout).await?;
        self.pacer.step().await;

        let button = if commit {
            &s.remove_confirm
        } else {
            &s.remove_cancel
        };
        self.session.click(button).await?;
        self.session
            .wait_for_hidden(&s.remove_dialog, self.timeout)
            .await?;

        if commit {
            info!("✓ 商品已下架");
        } else {
            info!("已取消下架（试运行）");
        }
        Ok(())
    }
}
