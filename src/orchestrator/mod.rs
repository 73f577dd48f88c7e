//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层负责整次运行的调度，是整个系统的"指挥中心"。
//!
//! ### `launcher` - 启动器
//! - 选择运行模式（posting / edition / deletion）
//! - 加载并对账待处理商品
//! - 持有浏览器操作驱动（ActionDriver），管理会话的打开、关闭、崩溃重启
//! - 商品之间的停顿
//! - 输出运行统计
//!
//! ## 层次关系
//!
//! ```text
//! launcher (处理 Vec<Listing>)
//!     ↓
//! workflow::ItemFlow (处理单个 Listing)
//!     ↓
//! services (能力层：feed / reconciliation / seller / binding)
//!     ↓
//! infrastructure (基础设施：UiSession / MediaFetcher)
//! ```

pub mod launcher;

pub use launcher::{Launcher, Mode, RunStats};
