//! Crawl orchestration: the day-advancing driver, the source adapter
//! contract, and the shared HTTP fetcher.
//!
//! The driver ([`driver::crawl_daily`]) owns when to crawl and when to stop;
//! source adapters (see [`crate::sources`]) own everything site-specific.

pub mod driver;
pub mod fetcher;
pub mod source;

pub use driver::{cap_distinct_dates, crawl_daily, crawl_open_dates};
pub use fetcher::Fetcher;
pub use source::ShowtimeSource;
