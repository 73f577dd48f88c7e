pub mod feed_loader;

pub use feed_loader::{load_listing_feed, load_removal_feed, write_document};
