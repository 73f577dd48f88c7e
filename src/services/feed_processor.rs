//! 数据源记录处理 - 服务层
//!
//! 把原始记录转换为待发布的商品草稿：字段映射、价格规范化、图片下载、
//! 提取 externalId、必填字段校验。从不返回错误，无效记录只记录并计数。

use std::path::PathBuf;
use std::sync::Arc;

use regex::Regex;
use tracing::{debug, error, info};

use crate::config::Config;
use crate::error::{ConfigError, ValidationError};
use crate::infrastructure::media::{download_file, file_size, MediaFetcher};
use crate::models::{Listing, RawRecord};
use crate::utils::logging::truncate_text;

/// 一批记录的处理结果
#[derive(Debug, Default)]
pub struct FeedBatch {
    /// 有效的商品草稿，顺序与输入一致
    pub drafts: Vec<Listing>,
    /// 无效记录的原因
    pub invalid: Vec<ValidationError>,
}

impl FeedBatch {
    pub fn invalid_count(&self) -> usize {
        self.invalid.len()
    }
}

/// 从链接中提取 externalId（正则的第一个捕获组）
pub fn external_id_from_link(pattern: &Regex, link: &str) -> Option<String> {
    pattern
        .captures(link)
        .and_then(|captures| captures.get(1))
        .map(|id| id.as_str().to_string())
}

pub struct FeedProcessor {
    fetcher: Arc<dyn MediaFetcher>,
    link_pattern: Regex,
    pictures_folder: PathBuf,
    category: String,
    price_suffix: String,
    force_download: bool,
}

impl FeedProcessor {
    pub fn new(config: &Config, fetcher: Arc<dyn MediaFetcher>) -> Result<Self, ConfigError> {
        Ok(Self {
            fetcher,
            link_pattern: config.link_regex()?,
            pictures_folder: PathBuf::from(&config.pictures_folder),
            category: config.item_category.clone(),
            price_suffix: config.price_suffix.clone(),
            force_download: false,
        })
    }

    /// 已存在的图片也重新下载
    pub fn force_download(mut self, force: bool) -> Self {
        self.force_download = force;
        self
    }

    /// 处理一批原始记录
    pub async fn process(&self, records: &[RawRecord]) -> FeedBatch {
        info!("📦 待处理记录: {} 条", records.len());
        let mut batch = FeedBatch::default();

        for record in records {
            info!("正在处理记录 \"{}\"...", truncate_text(record.label(), 60));
            match self.process_record(record).await {
                Ok(draft) => batch.drafts.push(draft),
                Err(reason) => {
                    error!("❌ {}", reason);
                    batch.invalid.push(reason);
                }
            }
        }

        info!("{} 条无效记录", batch.invalid_count());
        batch
    }

    async fn process_record(&self, record: &RawRecord) -> Result<Listing, ValidationError> {
        let link = non_empty(record.link.as_deref());
        let label = link.unwrap_or_else(|| record.label()).to_string();

        // 有图片引用时，下载结果不能为空
        let pictures = if record.photos.is_empty() {
            Vec::new()
        } else {
            let pictures = self.download_pictures(&label, &record.photos).await;
            if pictures.is_empty() {
                return Err(ValidationError::MissingPictures { link: label });
            }
            pictures
        };

        let price = non_empty(record.price.as_deref())
            .map(|price| price.replace(self.price_suffix.as_str(), "").trim().to_string());

        let fields: [(&'static str, Option<&str>); 5] = [
            ("link", link),
            ("title", non_empty(record.title.as_deref())),
            ("price", non_empty(price.as_deref())),
            ("location", non_empty(record.city.as_deref())),
            ("description", non_empty(record.description.as_deref())),
        ];
        for (field, value) in fields {
            if value.is_none() {
                return Err(ValidationError::MissingField { link: label, field });
            }
        }
        if pictures.is_empty() {
            return Err(ValidationError::MissingField {
                link: label,
                field: "pictures",
            });
        }

        let link = link.unwrap_or_default().to_string();
        let external_id = external_id_from_link(&self.link_pattern, &link)
            .ok_or_else(|| ValidationError::InvalidLink { link: label.clone() })?;

        Ok(Listing {
            external_id,
            link,
            title: record.title.clone().unwrap_or_default(),
            price: price.unwrap_or_default(),
            location: record.city.clone().unwrap_or_default(),
            description: record.description.clone().unwrap_or_default(),
            category: self.category.clone(),
            pictures,
            platform_id: None,
            posted_at: None,
            updated_at: None,
            removed_at: None,
            old_title: None,
        })
    }

    /// 逐个下载图片，失败的图片被跳过
    async fn download_pictures(&self, label: &str, urls: &[String]) -> Vec<String> {
        let mut pictures = Vec::with_capacity(urls.len());
        for url in urls {
            match self.download_picture(url).await {
                Ok(path) => pictures.push(path.to_string_lossy().into_owned()),
                Err(e) => {
                    let reason = ValidationError::PictureDownload {
                        link: label.to_string(),
                        url: url.clone(),
                        reason: format!("{:#}", e),
                    };
                    error!("❌ {}", reason);
                }
            }
        }
        pictures
    }

    /// 下载单张图片；得到空文件时强制重新下载一次
    async fn download_picture(&self, url: &str) -> anyhow::Result<PathBuf> {
        let fetcher = self.fetcher.as_ref();
        let folder = self.pictures_folder.as_path();

        let path = download_file(fetcher, url, folder, None, self.force_download).await?;
        if file_size(&path).await? > 0 {
            return Ok(path);
        }

        debug!("图片文件为空，重新下载: {}", url);
        let path = download_file(fetcher, url, folder, None, true).await?;
        if file_size(&path).await? == 0 {
            anyhow::bail!("下载的图片文件为空");
        }
        Ok(path)
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}
