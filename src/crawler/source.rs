//! Capability contract for site-specific source adapters

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::error::Result;
use crate::models::{Chain, Screening};

use super::driver;

/// One exhibitor's showtime extractor.
///
/// An adapter encapsulates everything specific to one chain's site or API:
/// request formats, response parsing, and per-venue business rules such as
/// arthouse-screen filters. The driver only ever asks it one question: what
/// is showing on date D?
///
/// Error policy: a failure for a single venue is logged and swallowed inside
/// `day_batch` so the other venues still contribute. A total failure for the
/// date returns `Err`, which the daily driver maps to an empty day — it
/// cannot tell that apart from a legitimately empty schedule and will stop
/// the run there.
#[async_trait]
pub trait ShowtimeSource: Send + Sync {
    /// The chain this adapter crawls
    fn chain(&self) -> Chain;

    /// Produce the complete, materialized batch of screenings for one
    /// calendar date across all configured venues.
    ///
    /// Finite (each venue is visited once per call) and restartable: a fresh
    /// call for the same date re-fetches. No ordering guarantee across
    /// venues.
    async fn day_batch(&self, date: NaiveDate) -> Result<Vec<Screening>>;

    /// Crawl day by day from `start_date` (default: today) until a date
    /// yields nothing, optionally capped at `max_days` distinct dates.
    ///
    /// Bulk adapters whose upstream exposes its own date index override this
    /// with [`driver::crawl_open_dates`] while keeping the same return
    /// shape, so callers stay agnostic to which mode is active.
    async fn run(
        &self,
        start_date: Option<NaiveDate>,
        max_days: Option<u32>,
    ) -> Result<Vec<Screening>> {
        driver::crawl_daily(self, start_date, max_days).await
    }
}

impl std::fmt::Debug for dyn ShowtimeSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShowtimeSource")
            .field("chain", &self.chain())
            .finish()
    }
}
