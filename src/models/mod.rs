pub mod feed;
pub mod listing;
pub mod loaders;

pub use feed::{ListingFeed, RawRecord, RemovalFeed};
pub use listing::{Listing, ListingExport, ListingState};
pub use loaders::{load_listing_feed, load_removal_feed, write_document};
