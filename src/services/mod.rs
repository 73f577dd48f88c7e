pub mod binding;
pub mod feed_processor;
pub mod reconciliation;
pub mod sell_form;
pub mod seller;

pub use binding::BindingCorrelator;
pub use feed_processor::{FeedBatch, FeedProcessor};
pub use reconciliation::Reconciler;
pub use seller::{ActionDriver, ActionResult, FailureReason, ManageAction, MarketplaceSeller};
