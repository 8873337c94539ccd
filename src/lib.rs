//! simya - Korean arthouse cinema showtime crawler
//!
//! Collects the daily screening schedules of Korean independent and
//! arthouse cinemas (롯데시네마 아르떼, 메가박스 아트관, 에무시네마,
//! 시네마테크KOFA, 더숲 아트시네마, ...) into one SQLite database.
//!
//! # Architecture
//!
//! - [`config`] - Configuration from environment variables or TOML
//! - [`models`] - Screening, cinema, and showtime data structures
//! - [`crawler`] - HTTP fetcher and the day-advancing crawl driver
//! - [`sources`] - One adapter per exhibitor chain
//! - [`registry`] - Venue registry resolving which cinemas to crawl
//! - [`storage`] - SQLite persistence with idempotent upserts
//! - [`poster`] - TMDB poster enrichment for collected titles
//! - [`runner`] - Multi-chain crawl runs with per-source isolation
//!
//! # Example
//!
//! ```no_run
//! use simya::config::Config;
//! use simya::models::Chain;
//! use simya::registry::VenueRegistry;
//! use simya::runner::{run_all, RunConfig};
//! use simya::storage::ScreeningStore;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let store = ScreeningStore::new(&config.database.sqlite_path)?;
//!     let registry = VenueRegistry::from_store(&store)?;
//!     let run = RunConfig {
//!         chains: vec![Chain::Lotte],
//!         start_date: None,
//!         max_days: Some(14),
//!         dry_run: false,
//!     };
//!     let report = run_all(&config, &run, &registry, &store).await?;
//!     println!("{report}");
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod crawler;
pub mod error;
pub mod models;
pub mod poster;
pub mod registry;
pub mod runner;
pub mod sources;
pub mod storage;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::crawler::{Fetcher, ShowtimeSource};
    pub use crate::error::{Error, Result};
    pub use crate::models::{Chain, Cinema, Screening, ShowTime};
    pub use crate::registry::VenueRegistry;
    pub use crate::runner::{run_all, RunConfig, RunReport};
    pub use crate::storage::ScreeningStore;
}

// Direct re-exports for convenience
pub use models::{Chain, Cinema, Screening, ShowTime};
