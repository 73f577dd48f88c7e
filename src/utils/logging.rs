/// 日志工具模块
///
/// 提供日志初始化和格式化输出的辅助函数
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::orchestrator::RunStats;

/// 初始化日志
///
/// `RUST_LOG` 优先；否则默认 info，详细模式为 debug。
pub fn init(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    // 测试中可能被多次调用
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// 记录程序启动信息
///
/// # 参数
/// - `mode`: 运行模式
/// - `commit`: 是否真实提交
pub fn log_startup(mode: &str, commit: bool) {
    info!("{}", "=".repeat(60));
    info!("🚀 程序启动 - 模式: {}", mode);
    if commit {
        info!("📤 提交模式: 表单将被真实提交");
    } else {
        info!("🧪 试运行模式: 表单填写后放弃");
    }
    info!(
        "启动时间: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    info!("{}", "=".repeat(60));
}

pub fn log_items_loaded(total: usize) {
    info!("✓ 找到 {} 个待处理的商品", total);
}

/// 打印最终统计信息
pub fn print_final_stats(mode: &str, stats: &RunStats) {
    info!("\n{}", "=".repeat(60));
    info!("📊 {} 处理完成统计", mode);
    info!(
        "完成时间: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    info!("{}", "=".repeat(60));
    info!("✅ 完成: {}/{}", stats.done, stats.pending);
    if stats.already_for_sale > 0 {
        info!("📌 已在售（直接记录）: {}", stats.already_for_sale);
    }
    if stats.dry_run > 0 {
        info!("🧪 试运行: {}", stats.dry_run);
    }
    info!("⏭️ 跳过: {}", stats.skipped);
    info!("❓ 未找到: {}", stats.not_found);
    if stats.restarts > 0 {
        info!("🔄 会话重启: {} 次", stats.restarts);
    }
    info!("{}", "=".repeat(60));
}

/// 截断长文本用于日志显示
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        text.chars().take(max_len).collect::<String>() + "..."
    } else {
        text.to_string()
    }
}
