use serde::{Deserialize, Serialize};

/// 数据源中的一条原始记录（字段名兼容数据源的法语命名）
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawRecord {
    #[serde(alias = "lien", default)]
    pub link: Option<String>,
    #[serde(alias = "titre", default)]
    pub title: Option<String>,
    #[serde(alias = "prix", default)]
    pub price: Option<String>,
    #[serde(alias = "ville", default)]
    pub city: Option<String>,
    #[serde(alias = "descriptif", default)]
    pub description: Option<String>,
    /// 图片地址列表
    #[serde(default)]
    pub photos: Vec<String>,
}

impl RawRecord {
    /// 用于日志的名称
    pub fn label(&self) -> &str {
        self.title
            .as_deref()
            .or(self.link.as_deref())
            .unwrap_or("<无标题>")
    }
}

/// 新增/编辑数据源文件
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListingFeed {
    #[serde(alias = "annonce", default)]
    pub records: Vec<RawRecord>,
}

/// 删除数据源文件（只包含链接）
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RemovalFeed {
    #[serde(alias = "lien", default)]
    pub links: Vec<String>,
}
