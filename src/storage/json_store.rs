//! JSON 文档文件存储
//!
//! 所有记录保存在一个 JSON 数组文件中。每次写操作先写临时文件并 fsync，
//! 再原子替换正式文件。

use std::path::{Path, PathBuf};

use anyhow::Result;
use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::StoreError;
use crate::models::{Listing, ListingState};
use crate::storage::Repository;

pub struct JsonFileRepository {
    path: PathBuf,
    items: Mutex<Vec<Listing>>,
}

impl JsonFileRepository {
    /// 打开存储文件，不存在时创建空存储
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let items = match tokio::fs::read_to_string(&path).await {
            Ok(content) if content.trim().is_empty() => Vec::new(),
            Ok(content) => serde_json::from_str(&content).map_err(StoreError::from)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("存储文件不存在，将创建: {}", path.display());
                Vec::new()
            }
            Err(source) => {
                return Err(StoreError::Io {
                    path: path.display().to_string(),
                    source,
                }
                .into())
            }
        };
        debug!("已加载 {} 条记录", items.len());

        Ok(Self {
            path,
            items: Mutex::new(items),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 持久化全部记录（临时文件 + fsync + rename）
    async fn flush(&self, items: &[Listing]) -> Result<(), StoreError> {
        let io_err = |source| StoreError::Io {
            path: self.path.display().to_string(),
            source,
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }

        let content = serde_json::to_vec_pretty(items)?;
        let tmp_path = self.path.with_extension("json.tmp");

        let mut file = tokio::fs::File::create(&tmp_path).await.map_err(io_err)?;
        file.write_all(&content).await.map_err(io_err)?;
        file.sync_all().await.map_err(io_err)?;
        drop(file);

        tokio::fs::rename(&tmp_path, &self.path)
            .await
            .map_err(io_err)?;
        Ok(())
    }

    /// 先写盘，成功后才替换内存中的记录
    async fn commit(&self, items: &mut Vec<Listing>, next: Vec<Listing>) -> Result<(), StoreError> {
        self.flush(&next).await?;
        *items = next;
        Ok(())
    }
}

#[async_trait]
impl Repository for JsonFileRepository {
    async fn get(&self, external_id: &str) -> Result<Option<Listing>> {
        let items = self.items.lock().await;
        Ok(items
            .iter()
            .find(|item| item.external_id == external_id)
            .cloned())
    }

    async fn get_by_title(&self, title: &str) -> Result<Option<Listing>> {
        let items = self.items.lock().await;
        Ok(items.iter().find(|item| item.title == title).cloned())
    }

    async fn list_by_state(&self, state: ListingState) -> Result<Vec<Listing>> {
        let items = self.items.lock().await;
        Ok(items
            .iter()
            .filter(|item| item.state() == state)
            .cloned()
            .collect())
    }

    async fn insert(&self, listing: &Listing) -> Result<()> {
        let mut items = self.items.lock().await;
        if items
            .iter()
            .any(|item| item.external_id == listing.external_id)
        {
            return Err(StoreError::Duplicate(listing.external_id.clone()).into());
        }

        let mut stored = listing.clone();
        stored.old_title = None;
        let mut next = items.clone();
        next.push(stored);
        self.commit(&mut items, next).await?;
        info!("商品 \"{}\" 已写入存储", listing.external_id);
        Ok(())
    }

    async fn update(&self, listing: &Listing) -> Result<()> {
        let mut items = self.items.lock().await;
        let mut next = items.clone();
        let slot = next
            .iter_mut()
            .find(|item| item.external_id == listing.external_id)
            .ok_or_else(|| StoreError::NotFound(listing.external_id.clone()))?;

        *slot = listing.clone();
        slot.old_title = None;
        self.commit(&mut items, next).await?;
        info!("商品 \"{}\" 已在存储中更新", listing.external_id);
        Ok(())
    }

    async fn remove(&self, listing: &Listing) -> Result<()> {
        let mut items = self.items.lock().await;
        let mut next = items.clone();
        next.retain(|item| item.external_id != listing.external_id);
        if next.len() == items.len() {
            return Err(StoreError::NotFound(listing.external_id.clone()).into());
        }
        self.commit(&mut items, next).await?;
        info!("商品 \"{}\" 已从存储中删除", listing.external_id);
        Ok(())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.items.lock().await.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn listing(id: &str, title: &str) -> Listing {
        Listing {
            external_id: id.into(),
            link: format!("https://www.consortium-immobilier.fr/annonce-{}.html", id),
            title: title.into(),
            price: "100 000".into(),
            location: "Nancy".into(),
            description: "Maison".into(),
            category: "Property for Sale".into(),
            pictures: vec!["pictures/1.jpg".into()],
            platform_id: None,
            posted_at: None,
            updated_at: None,
            removed_at: None,
            old_title: None,
        }
    }

    #[tokio::test]
    async fn test_writes_are_durable_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("db").join("listings.json");

        let repo = JsonFileRepository::open(&path).await.unwrap();
        repo.insert(&listing("123", "MAISON [123]")).await.unwrap();
        let mut second = listing("456", "APPARTEMENT [456]");
        repo.insert(&second).await.unwrap();
        second.mark_posted("fb-1", Utc::now());
        repo.update(&second).await.unwrap();

        let reopened = JsonFileRepository::open(&path).await.unwrap();
        assert_eq!(reopened.count().await.unwrap(), 2);
        let drafts = reopened.list_by_state(ListingState::Draft).await.unwrap();
        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].external_id, "123");
        let stored = reopened.get("456").await.unwrap().unwrap();
        assert_eq!(stored.platform_id.as_deref(), Some("fb-1"));
        assert!(reopened
            .get_by_title("APPARTEMENT [456]")
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_duplicate_insert_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let repo = JsonFileRepository::open(dir.path().join("db.json"))
            .await
            .unwrap();
        repo.insert(&listing("123", "A")).await.unwrap();
        assert!(repo.insert(&listing("123", "B")).await.is_err());
        assert_eq!(repo.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_remove_and_missing_update() {
        let dir = tempfile::tempdir().unwrap();
        let repo = JsonFileRepository::open(dir.path().join("db.json"))
            .await
            .unwrap();
        let item = listing("123", "A");
        repo.insert(&item).await.unwrap();
        repo.remove(&item).await.unwrap();
        assert_eq!(repo.count().await.unwrap(), 0);
        assert!(repo.update(&item).await.is_err());
    }

    #[tokio::test]
    async fn test_failed_write_leaves_memory_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("db.json");
        let repo = JsonFileRepository::open(&path).await.unwrap();
        let item = listing("123", "A");
        repo.insert(&item).await.unwrap();

        // 临时文件位置被目录占用，写盘必然失败
        let tmp_path = path.with_extension("json.tmp");
        tokio::fs::create_dir(&tmp_path).await.unwrap();

        assert!(repo.insert(&listing("456", "B")).await.is_err());
        assert_eq!(repo.count().await.unwrap(), 1);
        assert!(repo.get("456").await.unwrap().is_none());

        let mut posted = item.clone();
        posted.mark_posted("fb-1", Utc::now());
        assert!(repo.update(&posted).await.is_err());
        assert!(repo.get("123").await.unwrap().unwrap().platform_id.is_none());

        assert!(repo.remove(&item).await.is_err());
        assert_eq!(repo.count().await.unwrap(), 1);

        // 内存与磁盘一致
        tokio::fs::remove_dir(&tmp_path).await.unwrap();
        let reopened = JsonFileRepository::open(&path).await.unwrap();
        assert_eq!(reopened.count().await.unwrap(), 1);
        assert_eq!(
            reopened.get("123").await.unwrap(),
            repo.get("123").await.unwrap()
        );
    }
}
