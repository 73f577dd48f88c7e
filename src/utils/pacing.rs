//! 操作节奏控制
//!
//! 每次界面操作后随机等待一小段时间，模拟人工操作，也让页面的异步更新完成。

use std::time::Duration;

use rand::Rng;
use tokio::time::sleep;
use tracing::debug;

use crate::config::PacingConfig;

#[derive(Debug, Clone)]
pub struct Pacer {
    config: PacingConfig,
}

impl Pacer {
    pub fn new(config: PacingConfig) -> Self {
        Self { config }
    }

    /// 每次界面操作之后
    pub async fn step(&self) {
        self.pause(self.config.step_ms).await;
    }

    /// 等待输入建议下拉框出现
    pub async fn suggestion(&self) {
        self.pause(self.config.suggestion_ms).await;
    }

    /// 提交 "Next" 之后
    pub async fn publish(&self) {
        self.pause(self.config.publish_ms).await;
    }

    /// 两个商品之间
    pub async fn between_items(&self, commit: bool) {
        if commit {
            self.pause(self.config.between_actions_ms).await;
        } else {
            let ms = self.config.dry_run_interval_ms;
            self.pause((ms, ms)).await;
        }
    }

    /// 在售列表中找不到商品之后
    pub async fn not_found_backoff(&self) {
        let ms = self.config.not_found_backoff_ms;
        self.pause((ms, ms)).await;
    }

    async fn pause(&self, range: (u64, u64)) {
        let ms = pick(range);
        if ms == 0 {
            return;
        }
        debug!("等待 {:.1} 秒...", ms as f64 / 1000.0);
        sleep(Duration::from_millis(ms)).await;
    }
}

/// 在区间内随机取值（区间无效时取下限）
fn pick((min, max): (u64, u64)) -> u64 {
    if max <= min {
        min
    } else {
        rand::thread_rng().gen_range(min..=max)
    }
}
