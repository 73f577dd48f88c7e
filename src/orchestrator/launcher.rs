//! 启动器 - 编排层
//!
//! ## 职责
//!
//! 1. **选择模式**：posting / edition / deletion，各自对应输入文件、加载方式、处理方式
//! 2. **加载待处理商品**：数据源 → FeedProcessor → 对账
//! 3. **逐个处理**：打开会话 → ItemFlow → 商品之间停顿 → 关闭会话
//! 4. **会话崩溃恢复**：关闭并重新打开会话，从头再走一遍列表，
//!    已完成的商品由存储状态判断后跳过

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{error, info, warn};

use crate::config::Config;
use crate::error::{is_session_failure, ConfigError};
use crate::infrastructure::MediaFetcher;
use crate::models::{load_listing_feed, load_removal_feed, Listing, ListingState};
use crate::services::feed_processor::FeedProcessor;
use crate::services::reconciliation::Reconciler;
use crate::services::seller::ActionDriver;
use crate::storage::Repository;
use crate::utils::logging;
use crate::utils::pacing::Pacer;
use crate::workflow::{ItemCtx, ItemFlow, ItemOutcome};

/// 运行模式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// 发布新商品
    Posting,
    /// 编辑在售商品
    Edition,
    /// 下架商品
    Deletion,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Posting => "posting",
            Mode::Edition => "edition",
            Mode::Deletion => "deletion",
        }
    }

    /// 该模式默认的输入文件
    pub fn input_file<'c>(&self, config: &'c Config) -> &'c str {
        match self {
            Mode::Posting => &config.insert_input_file,
            Mode::Edition => &config.update_input_file,
            Mode::Deletion => &config.delete_input_file,
        }
    }
}

impl FromStr for Mode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "posting" => Ok(Mode::Posting),
            "edition" => Ok(Mode::Edition),
            "deletion" => Ok(Mode::Deletion),
            other => Err(ConfigError::UnknownMode(other.to_string())),
        }
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 运行统计
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunStats {
    /// 待处理商品数量
    pub pending: usize,
    /// 已完成并写入存储
    pub done: usize,
    /// 已在售，直接记录
    pub already_for_sale: usize,
    /// 试运行完成
    pub dry_run: usize,
    /// 根据存储状态跳过
    pub skipped: usize,
    /// 在售列表中找不到
    pub not_found: usize,
    /// 会话重启次数
    pub restarts: usize,
}

impl RunStats {
    fn record(&mut self, outcome: ItemOutcome) {
        match outcome {
            ItemOutcome::Done => self.done += 1,
            ItemOutcome::AlreadyForSale => self.already_for_sale += 1,
            ItemOutcome::DryRun => self.dry_run += 1,
            ItemOutcome::Skipped => self.skipped += 1,
            ItemOutcome::NotFound => self.not_found += 1,
        }
    }
}

pub struct Launcher {
    config: Config,
    repo: Arc<dyn Repository>,
    feed: FeedProcessor,
    reconciler: Reconciler,
    driver: Box<dyn ActionDriver>,
    pacer: Pacer,
    input_override: Option<PathBuf>,
}

impl Launcher {
    pub fn new(
        config: Config,
        repo: Arc<dyn Repository>,
        fetcher: Arc<dyn MediaFetcher>,
        driver: Box<dyn ActionDriver>,
    ) -> Result<Self> {
        let feed = FeedProcessor::new(&config, fetcher)?;
        let reconciler = Reconciler::new(Arc::clone(&repo), config.link_regex()?);
        let pacer = Pacer::new(config.pacing.clone());
        Ok(Self {
            config,
            repo,
            feed,
            reconciler,
            driver,
            pacer,
            input_override: None,
        })
    }

    /// 使用指定的输入文件代替配置中的默认文件
    pub fn with_input(mut self, input: Option<PathBuf>) -> Self {
        self.input_override = input;
        self
    }

    /// 已存在的图片也重新下载
    pub fn force_download(mut self, force: bool) -> Self {
        self.feed = self.feed.force_download(force);
        self
    }

    /// 按名称运行（未知模式返回 `ConfigError::UnknownMode`）
    pub async fn run_named(&mut self, mode: &str) -> Result<RunStats> {
        let mode = Mode::from_str(mode)?;
        self.run(mode).await
    }

    pub async fn run(&mut self, mode: Mode) -> Result<RunStats> {
        logging::log_startup(mode.as_str(), self.config.commit);

        let items = self.load_pending(mode).await?;
        let mut stats = RunStats {
            pending: items.len(),
            ..RunStats::default()
        };
        if items.is_empty() {
            warn!("⚠️ 没有需要处理的商品");
            return Ok(stats);
        }
        logging::log_items_loaded(items.len());

        let max_restarts = self.config.retry.session_restarts;
        loop {
            match self.open_and_process(mode, &items, &mut stats).await {
                Ok(()) => {
                    info!("✓ 处理完成");
                    self.driver.close().await?;
                    break;
                }
                Err(e) if is_session_failure(&e) && stats.restarts < max_restarts => {
                    // 统计以最后一次完整遍历为准
                    stats = RunStats {
                        pending: stats.pending,
                        restarts: stats.restarts + 1,
                        ..RunStats::default()
                    };
                    error!(
                        "❌ 浏览器会话崩溃，正在重启 ({}/{}): {:#}",
                        stats.restarts, max_restarts, e
                    );
                    if let Err(close_err) = self.driver.close().await {
                        warn!("⚠️ 关闭崩溃的会话失败: {:#}", close_err);
                    }
                }
                Err(e) => {
                    if is_session_failure(&e) {
                        error!("❌ 会话重启次数已达上限 ({})", max_restarts);
                    }
                    if let Err(close_err) = self.driver.close().await {
                        warn!("⚠️ 关闭会话失败: {:#}", close_err);
                    }
                    return Err(e);
                }
            }
        }

        logging::print_final_stats(mode.as_str(), &stats);
        Ok(stats)
    }

    fn input_path(&self, mode: Mode) -> Result<PathBuf, ConfigError> {
        let path = self
            .input_override
            .clone()
            .unwrap_or_else(|| PathBuf::from(mode.input_file(&self.config)));
        if path.as_os_str().is_empty() {
            return Err(ConfigError::MissingInputFile {
                mode: mode.to_string(),
            });
        }
        if !path.exists() {
            return Err(ConfigError::InputFileNotFound(path));
        }
        Ok(path)
    }

    /// 加载本次需要处理的商品
    async fn load_pending(&self, mode: Mode) -> Result<Vec<Listing>> {
        let path = self.input_path(mode)?;
        info!("📂 输入文件: {}", path.display());

        match mode {
            Mode::Posting => {
                let records = load_listing_feed(&path).await?;
                let batch = self.feed.process(&records).await;
                self.reconciler.to_insert(&batch.drafts).await?;
                self.repo
                    .list_by_state(ListingState::Draft)
                    .await
                    .context("读取待发布商品失败")
            }
            Mode::Edition => {
                let records = load_listing_feed(&path).await?;
                let batch = self.feed.process(&records).await;
                self.reconciler.to_edit(&batch.drafts).await
            }
            Mode::Deletion => {
                let links = load_removal_feed(&path).await?;
                self.reconciler.to_remove(&links).await
            }
        }
    }

    async fn open_and_process(
        &mut self,
        mode: Mode,
        items: &[Listing],
        stats: &mut RunStats,
    ) -> Result<()> {
        self.driver.open().await?;

        let commit = self.config.commit;
        let pacer = self.pacer.clone();
        let mut flow = ItemFlow::new(
            self.driver.as_mut(),
            self.repo.as_ref(),
            &pacer,
            commit,
            self.config.retry.manage_attempts,
        );

        let total = items.len();
        for (index, item) in items.iter().enumerate() {
            let ctx = ItemCtx::new(item, index + 1, total);
            let outcome = match mode {
                Mode::Posting => flow.post(&ctx, item).await?,
                Mode::Edition => flow.edit(&ctx, item).await?,
                Mode::Deletion => flow.remove(&ctx, item).await?,
            };
            stats.record(outcome);

            if outcome.acted() && !ctx.is_last() {
                pacer.between_items(commit).await;
            }
        }
        Ok(())
    }
}
