use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 商品的生命周期状态（根据字段推导，不单独存储）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ListingState {
    /// 尚未发布（没有 platformId）
    Draft,
    /// 在售
    ForSale,
    /// 已下架
    Removed,
}

impl std::fmt::Display for ListingState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            ListingState::Draft => "待发布",
            ListingState::ForSale => "在售",
            ListingState::Removed => "已下架",
        };
        f.write_str(label)
    }
}

/// 商品记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Listing {
    /// 数据源中的稳定编号（从链接中提取）
    pub external_id: String,
    /// 数据源中的原始链接
    pub link: String,
    pub title: String,
    pub price: String,
    pub location: String,
    pub description: String,
    pub category: String,
    /// 本地图片路径，顺序即展示顺序
    pub pictures: Vec<String>,

    /// 平台分配的编号，发布成功后才有
    #[serde(default)]
    pub platform_id: Option<String>,
    #[serde(default)]
    pub posted_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub removed_at: Option<DateTime<Utc>>,

    /// 编辑时网站上当前显示的标题（标题被修改时用于定位商品），不持久化
    #[serde(skip)]
    pub old_title: Option<String>,
}

impl Listing {
    pub fn state(&self) -> ListingState {
        if self.removed_at.is_some() {
            ListingState::Removed
        } else if self.platform_id.is_some() {
            ListingState::ForSale
        } else {
            ListingState::Draft
        }
    }

    /// 在售列表中用于定位商品的标题
    pub fn displayed_title(&self) -> &str {
        self.old_title.as_deref().unwrap_or(&self.title)
    }

    /// 内容是否与另一条记录一致（图片按顺序逐个比较）
    pub fn same_content(&self, other: &Listing) -> bool {
        self.external_id == other.external_id
            && self.title == other.title
            && self.price == other.price
            && self.location == other.location
            && self.description == other.description
            && self.pictures == other.pictures
    }

    /// 重置为待发布状态（已下架的商品重新出现在数据源中）
    pub fn reset_to_draft(&mut self) {
        self.platform_id = None;
        self.posted_at = None;
        self.updated_at = None;
        self.removed_at = None;
        self.old_title = None;
    }

    /// 用新内容覆盖，保留平台编号和时间戳
    pub fn apply_content(&mut self, draft: &Listing) {
        self.link = draft.link.clone();
        self.title = draft.title.clone();
        self.price = draft.price.clone();
        self.location = draft.location.clone();
        self.description = draft.description.clone();
        self.category = draft.category.clone();
        self.pictures = draft.pictures.clone();
    }

    pub fn mark_posted(&mut self, platform_id: impl Into<String>, at: DateTime<Utc>) {
        self.platform_id = Some(platform_id.into());
        self.posted_at = Some(at);
    }

    pub fn mark_updated(&mut self, at: DateTime<Utc>) {
        self.updated_at = Some(at);
        self.old_title = None;
    }

    pub fn mark_removed(&mut self, at: DateTime<Utc>) {
        self.removed_at = Some(at);
    }
}

/// 在售商品导出文件
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListingExport {
    #[serde(default)]
    pub listings: Vec<Listing>,
}
