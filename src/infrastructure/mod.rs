//! 基础设施层（Infrastructure）
//!
//! 持有稀缺资源（浏览器页面、HTTP 客户端），只暴露能力。

pub mod media;
pub mod ui_driver;

pub use media::{download_file, file_size, HttpFetcher, MediaFetcher};
pub use ui_driver::{UiDriver, UiSession};
