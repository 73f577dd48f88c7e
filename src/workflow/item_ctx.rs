//! 商品处理上下文
//!
//! 封装"我正在处理第几个商品、哪个商品"这一信息

use std::fmt::Display;

use crate::models::Listing;

/// 商品处理上下文
#[derive(Debug, Clone)]
pub struct ItemCtx {
    /// 商品编号（externalId）
    pub external_id: String,

    /// 在本次待处理列表中的位置（从1开始，仅用于日志显示）
    pub position: usize,

    /// 本次待处理总数
    pub total: usize,
}

impl ItemCtx {
    pub fn new(listing: &Listing, position: usize, total: usize) -> Self {
        Self {
            external_id: listing.external_id.clone(),
            position,
            total,
        }
    }

    /// 是否是最后一个商品
    pub fn is_last(&self) -> bool {
        self.position >= self.total
    }
}

impl Display for ItemCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[商品 {} #{}/{}]",
            self.external_id, self.position, self.total
        )
    }
}
