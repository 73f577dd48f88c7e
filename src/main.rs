use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use marketplace_sync::browser::ChromeDriver;
use marketplace_sync::config::Config;
use marketplace_sync::infrastructure::{download_file, HttpFetcher};
use marketplace_sync::models::{write_document, ListingExport, ListingState};
use marketplace_sync::orchestrator::Launcher;
use marketplace_sync::services::MarketplaceSeller;
use marketplace_sync::storage::open_repository;
use marketplace_sync::utils::logging;

/// 二手交易平台商品同步工具
#[derive(Parser, Debug)]
#[command(name = "marketplace-sync")]
#[command(version, about, long_about = None)]
struct Cli {
    /// 配置文件路径
    #[arg(short, long, default_value = "marketplace.toml")]
    config: PathBuf,

    /// 输出调试日志
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// 运行同步（posting / edition / deletion）
    Run(RunArgs),

    /// 显示存储中的一个商品
    Show {
        /// 商品编号
        #[arg(long, conflicts_with = "title")]
        id: Option<String>,
        /// 商品标题
        #[arg(long)]
        title: Option<String>,
    },

    /// 从存储中删除一个商品记录（不操作网站）
    Forget {
        /// 商品编号
        #[arg(long)]
        id: String,
    },

    /// 导出所有在售商品（.json / .toml）
    Export {
        #[arg(short, long)]
        output: PathBuf,
    },

    /// 下载数据源文件
    FetchFeed {
        #[arg(long)]
        url: String,
        #[arg(short, long)]
        output: PathBuf,
    },
}

#[derive(Parser, Debug)]
struct RunArgs {
    /// 运行模式: posting, edition, deletion
    #[arg(short, long)]
    mode: String,

    /// 真实提交表单（默认试运行）
    #[arg(long)]
    commit: bool,

    /// 两个商品之间的固定间隔（秒）
    #[arg(long)]
    interval: Option<u64>,

    /// 输入文件（默认使用配置中该模式的文件）
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// 已存在的图片也重新下载
    #[arg(long)]
    force_download: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    // 初始化日志
    let verbose = cli.verbose
        || std::env::var("VERBOSE_LOGGING")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(false);
    logging::init(verbose);

    // 加载配置
    let config = Config::load(&cli.config)?;

    match cli.command {
        Command::Run(args) => run(config, args).await,
        Command::Show { id, title } => show(&config, id, title).await,
        Command::Forget { id } => forget(&config, &id).await,
        Command::Export { output } => export(&config, &output).await,
        Command::FetchFeed { url, output } => fetch_feed(&url, &output).await,
    }
}

async fn run(mut config: Config, args: RunArgs) -> Result<()> {
    if args.commit {
        config.commit = true;
    }
    if let Some(secs) = args.interval {
        config = config.with_interval_secs(secs);
    }
    config.validate_for_run()?;

    let repo = open_repository(&config.store).await?;
    let fetcher = Arc::new(HttpFetcher::new());
    let driver = Arc::new(ChromeDriver::new(&config));
    let seller = Box::new(MarketplaceSeller::new(&config, driver));

    let mut launcher = Launcher::new(config, repo, fetcher, seller)?
        .with_input(args.input)
        .force_download(args.force_download);
    launcher.run_named(&args.mode).await?;
    Ok(())
}

async fn show(config: &Config, id: Option<String>, title: Option<String>) -> Result<()> {
    let repo = open_repository(&config.store).await?;
    let (label, listing) = match (id, title) {
        (Some(id), _) => {
            let listing = repo.get(&id).await?;
            (id, listing)
        }
        (None, Some(title)) => {
            let listing = repo.get_by_title(&title).await?;
            (title, listing)
        }
        (None, None) => anyhow::bail!("请指定 --id 或 --title"),
    };

    match listing {
        Some(listing) => {
            println!("状态: {}", listing.state());
            println!("{}", serde_json::to_string_pretty(&listing)?);
        }
        None => warn!("⚠️ 商品 \"{}\" 不存在", label),
    }
    Ok(())
}

async fn forget(config: &Config, id: &str) -> Result<()> {
    let repo = open_repository(&config.store).await?;
    let listing = repo
        .get(id)
        .await?
        .with_context(|| format!("商品 \"{}\" 不存在", id))?;
    repo.remove(&listing).await?;
    info!("✓ 剩余 {} 个商品", repo.count().await?);
    Ok(())
}

async fn export(config: &Config, output: &Path) -> Result<()> {
    let repo = open_repository(&config.store).await?;
    let listings = repo.list_by_state(ListingState::ForSale).await?;
    if listings.is_empty() {
        anyhow::bail!("没有在售商品，无法导出");
    }

    let count = listings.len();
    write_document(output, &ListingExport { listings }).await?;
    info!("✓ 已导出 {} 个在售商品到 {}", count, output.display());
    Ok(())
}

async fn fetch_feed(url: &str, output: &Path) -> Result<()> {
    let folder = output
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let file_name = output
        .file_name()
        .and_then(|name| name.to_str())
        .with_context(|| format!("输出路径无效: {}", output.display()))?;

    let path = download_file(&HttpFetcher::new(), url, folder, Some(file_name), true).await?;
    info!("✓ 数据源已下载到 {}", path.display());
    Ok(())
}
