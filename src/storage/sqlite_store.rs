//! SQLite 存储
//!
//! 图片列表以 JSON 文本保存在 `pictures` 列中。

use std::path::Path;
use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::info;

use crate::error::StoreError;
use crate::models::{Listing, ListingState};
use crate::storage::Repository;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS listings (
    seq          INTEGER PRIMARY KEY AUTOINCREMENT,
    external_id  TEXT NOT NULL UNIQUE,
    link         TEXT NOT NULL,
    title        TEXT NOT NULL,
    price        TEXT NOT NULL,
    location     TEXT NOT NULL,
    description  TEXT NOT NULL,
    category     TEXT NOT NULL,
    pictures     TEXT NOT NULL,
    platform_id  TEXT,
    posted_at    TEXT,
    updated_at   TEXT,
    removed_at   TEXT
);
CREATE INDEX IF NOT EXISTS idx_listings_title ON listings (title);
"#;

const COLUMNS: &str = "external_id, link, title, price, location, description, category, \
                       pictures, platform_id, posted_at, updated_at, removed_at";

pub struct SqliteRepository {
    conn: Mutex<Connection>,
}

impl SqliteRepository {
    /// 打开数据库文件并创建表结构
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path.as_ref()).map_err(StoreError::from)?;
        Self::with_connection(conn)
    }

    /// 内存数据库
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(StoreError::from)?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA).map_err(StoreError::from)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn with_conn<F, T>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Connection) -> Result<T, StoreError>,
    {
        let conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        f(&conn)
    }

    fn query_listings(
        &self,
        where_clause: &str,
        param: Option<&str>,
    ) -> Result<Vec<Listing>, StoreError> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM listings {} ORDER BY seq",
                COLUMNS, where_clause
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = match param {
                Some(value) => stmt.query_map(params![value], row_to_listing)?,
                None => stmt.query_map([], row_to_listing)?,
            };

            let mut out = Vec::new();
            for row in rows {
                out.push(row??);
            }
            Ok(out)
        })
    }
}

/// 行转换为商品记录（图片列解析失败单独返回）
fn row_to_listing(row: &Row<'_>) -> rusqlite::Result<Result<Listing, StoreError>> {
    let pictures: String = row.get(7)?;
    let listing = Listing {
        external_id: row.get(0)?,
        link: row.get(1)?,
        title: row.get(2)?,
        price: row.get(3)?,
        location: row.get(4)?,
        description: row.get(5)?,
        category: row.get(6)?,
        pictures: Vec::new(),
        platform_id: row.get(8)?,
        posted_at: row.get::<_, Option<DateTime<Utc>>>(9)?,
        updated_at: row.get::<_, Option<DateTime<Utc>>>(10)?,
        removed_at: row.get::<_, Option<DateTime<Utc>>>(11)?,
        old_title: None,
    };
    Ok(serde_json::from_str::<Vec<String>>(&pictures)
        .map(|pictures| Listing { pictures, ..listing })
        .map_err(StoreError::from))
}

#[async_trait]
impl Repository for SqliteRepository {
    async fn get(&self, external_id: &str) -> Result<Option<Listing>> {
        let mut found = self.query_listings("WHERE external_id = ?1", Some(external_id))?;
        Ok(found.pop())
    }

    async fn get_by_title(&self, title: &str) -> Result<Option<Listing>> {
        let found = self.query_listings("WHERE title = ?1", Some(title))?;
        Ok(found.into_iter().next())
    }

    async fn list_by_state(&self, state: ListingState) -> Result<Vec<Listing>> {
        let where_clause = match state {
            ListingState::Draft => "WHERE platform_id IS NULL AND removed_at IS NULL",
            ListingState::ForSale => "WHERE platform_id IS NOT NULL AND removed_at IS NULL",
            ListingState::Removed => "WHERE removed_at IS NOT NULL",
        };
        Ok(self.query_listings(where_clause, None)?)
    }

    async fn insert(&self, listing: &Listing) -> Result<()> {
        let pictures = serde_json::to_string(&listing.pictures).map_err(StoreError::from)?;
        self.with_conn(|conn| {
            let exists: Option<i64> = conn
                .query_row(
                    "SELECT seq FROM listings WHERE external_id = ?1",
                    params![listing.external_id],
                    |row| row.get(0),
                )
                .optional()?;
            if exists.is_some() {
                return Err(StoreError::Duplicate(listing.external_id.clone()));
            }

            conn.execute(
                &format!(
                    "INSERT INTO listings ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                    COLUMNS
                ),
                params![
                    listing.external_id,
                    listing.link,
                    listing.title,
                    listing.price,
                    listing.location,
                    listing.description,
                    listing.category,
                    pictures,
                    listing.platform_id,
                    listing.posted_at,
                    listing.updated_at,
                    listing.removed_at,
                ],
            )?;
            Ok(())
        })?;
        info!("商品 \"{}\" 已写入数据库", listing.external_id);
        Ok(())
    }

    async fn update(&self, listing: &Listing) -> Result<()> {
        let pictures = serde_json::to_string(&listing.pictures).map_err(StoreError::from)?;
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE listings SET link = ?2, title = ?3, price = ?4, location = ?5, \
                 description = ?6, category = ?7, pictures = ?8, platform_id = ?9, \
                 posted_at = ?10, updated_at = ?11, removed_at = ?12 WHERE external_id = ?1",
                params![
                    listing.external_id,
                    listing.link,
                    listing.title,
                    listing.price,
                    listing.location,
                    listing.description,
                    listing.category,
                    pictures,
                    listing.platform_id,
                    listing.posted_at,
                    listing.updated_at,
                    listing.removed_at,
                ],
            )?;
            if changed == 0 {
                return Err(StoreError::NotFound(listing.external_id.clone()));
            }
            Ok(())
        })?;
        info!("商品 \"{}\" 已在数据库中更新", listing.external_id);
        Ok(())
    }

    async fn remove(&self, listing: &Listing) -> Result<()> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "DELETE FROM listings WHERE external_id = ?1",
                params![listing.external_id],
            )?;
            if changed == 0 {
                return Err(StoreError::NotFound(listing.external_id.clone()));
            }
            Ok(())
        })?;
        info!("商品 \"{}\" 已从数据库中删除", listing.external_id);
        Ok(())
    }

    async fn count(&self) -> Result<usize> {
        let counter = self.with_conn(|conn| {
            Ok(conn.query_row("SELECT COUNT(*) FROM listings", [], |row| {
                row.get::<_, i64>(0)
            })?)
        })?;
        Ok(counter as usize)
    }
}
