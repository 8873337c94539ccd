//! Day-advancing crawl driver
//!
//! The one piece of control flow shared by every source: keep asking the
//! adapter "what is showing on date D?" with D advancing one day at a time,
//! and stop at the first empty answer. Exhibitors publish a rolling schedule
//! window with no end-of-schedule marker, so an empty day is the only
//! reliable signal that the published window is over. A source with a
//! genuine gap day is truncated early — deliberately; downstream consumers
//! depend on that truncation.

use chrono::{Days, Local, NaiveDate};

use crate::error::Result;
use crate::models::Screening;

use super::source::ShowtimeSource;

/// Crawl consecutive dates starting at `start_date` (default: today).
///
/// `max_days` is a hard cap on the number of distinct dates attempted, a
/// safety valve against a source that never stops returning data; reaching
/// it is not an error. Without it the loop is bounded only by the first
/// empty day, so production callers should always pass a cap.
///
/// Dates are strictly sequential: date N+1 is never queried before date N's
/// batch is fully materialized, because the stop decision depends on whether
/// date N was empty. A date-level failure is logged and treated as an empty
/// batch — indistinguishable, by design, from an empty schedule.
pub async fn crawl_daily<S>(
    source: &S,
    start_date: Option<NaiveDate>,
    max_days: Option<u32>,
) -> Result<Vec<Screening>>
where
    S: ShowtimeSource + ?Sized,
{
    let start = start_date.unwrap_or_else(|| Local::now().date_naive());
    let mut collected: Vec<Screening> = Vec::new();
    let mut day_offset: u32 = 0;

    loop {
        if let Some(cap) = max_days {
            if day_offset >= cap {
                tracing::debug!(
                    chain = %source.chain(),
                    days = day_offset,
                    "day cap reached, stopping"
                );
                break;
            }
        }

        let Some(target_date) = start.checked_add_days(Days::new(u64::from(day_offset))) else {
            break;
        };

        let day_batch = match source.day_batch(target_date).await {
            Ok(batch) => batch,
            Err(e) => {
                tracing::warn!(
                    chain = %source.chain(),
                    date = %target_date,
                    error = %e,
                    "date query failed, treating as empty day"
                );
                Vec::new()
            }
        };

        // Nothing for this date: the published window is over
        if day_batch.is_empty() {
            tracing::debug!(
                chain = %source.chain(),
                date = %target_date,
                days = day_offset,
                "empty day, stopping"
            );
            break;
        }

        tracing::debug!(
            chain = %source.chain(),
            date = %target_date,
            count = day_batch.len(),
            "day batch collected"
        );
        collected.extend(day_batch);
        day_offset += 1;
    }

    Ok(collected)
}

/// Bulk-mode override: crawl an adapter-resolved index of open dates.
///
/// Filters the index to dates at or after `start_date`, sorts ascending,
/// caps the count at `max_days`, and queries each date exactly once. An
/// empty or failed date contributes nothing but does not stop the loop —
/// the index already bounds the work, so the empty-day heuristic of
/// [`crawl_daily`] does not apply here.
pub async fn crawl_open_dates<S>(
    source: &S,
    open_dates: &[NaiveDate],
    start_date: Option<NaiveDate>,
    max_days: Option<u32>,
) -> Result<Vec<Screening>>
where
    S: ShowtimeSource + ?Sized,
{
    let start = start_date.unwrap_or_else(|| Local::now().date_naive());

    let mut dates: Vec<NaiveDate> = open_dates.iter().copied().filter(|d| *d >= start).collect();
    dates.sort_unstable();
    dates.dedup();
    if let Some(cap) = max_days {
        dates.truncate(cap as usize);
    }

    let mut collected: Vec<Screening> = Vec::new();
    for date in dates {
        match source.day_batch(date).await {
            Ok(batch) => collected.extend(batch),
            Err(e) => {
                tracing::warn!(
                    chain = %source.chain(),
                    date = %date,
                    error = %e,
                    "open date query failed, skipping"
                );
            }
        }
    }

    Ok(collected)
}

/// Keep only records falling on the first `max_days` distinct play-dates.
///
/// Used by bulk adapters that fetch a whole window in one upstream call and
/// must still honor the day cap of the public `run` contract.
pub fn cap_distinct_dates(records: Vec<Screening>, max_days: Option<u32>) -> Vec<Screening> {
    let Some(cap) = max_days else {
        return records;
    };

    let mut dates: Vec<NaiveDate> = records.iter().map(|r| r.play_date).collect();
    dates.sort_unstable();
    dates.dedup();
    dates.truncate(cap as usize);

    records
        .into_iter()
        .filter(|r| dates.contains(&r.play_date))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Chain, ShowTime};
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::Mutex;

    fn record(date: NaiveDate, start: &str) -> Screening {
        Screening {
            id: Screening::new_id(),
            provider: Chain::Dtryx,
            cinema_name: "에무시네마".to_string(),
            cinema_code: "M013".to_string(),
            screen_name: "1관".to_string(),
            movie_title: "어느 멋진 아침".to_string(),
            play_date: date,
            start_dt: ShowTime::parse(start).unwrap(),
            end_dt: ShowTime::parse(start).unwrap().add_minutes(100).unwrap(),
            crawl_ts: Utc::now(),
            url: None,
            remain_seat_cnt: None,
            total_seat_cnt: None,
        }
    }

    /// Scripted source: yields a fixed number of records per day offset and
    /// records which dates it was asked about.
    struct ScriptedSource {
        start: NaiveDate,
        per_day: Vec<usize>,
        queried: Mutex<Vec<NaiveDate>>,
    }

    impl ScriptedSource {
        fn new(start: NaiveDate, per_day: Vec<usize>) -> Self {
            Self {
                start,
                per_day,
                queried: Mutex::new(Vec::new()),
            }
        }

        fn queried(&self) -> Vec<NaiveDate> {
            self.queried.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ShowtimeSource for ScriptedSource {
        fn chain(&self) -> Chain {
            Chain::Dtryx
        }

        async fn day_batch(&self, date: NaiveDate) -> Result<Vec<Screening>> {
            self.queried.lock().unwrap().push(date);
            let offset = (date - self.start).num_days();
            let count = if offset >= 0 {
                self.per_day.get(offset as usize).copied().unwrap_or(0)
            } else {
                0
            };
            Ok((0..count).map(|_| record(date, "19:00")).collect())
        }
    }

    /// Source that never runs dry, for cap tests
    struct EndlessSource;

    #[async_trait]
    impl ShowtimeSource for EndlessSource {
        fn chain(&self) -> Chain {
            Chain::Megabox
        }

        async fn day_batch(&self, date: NaiveDate) -> Result<Vec<Screening>> {
            Ok(vec![record(date, "10:00"), record(date, "14:00")])
        }
    }

    fn day(offset: u64) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 5, 26)
            .unwrap()
            .checked_add_days(Days::new(offset))
            .unwrap()
    }

    #[tokio::test]
    async fn test_stops_on_first_empty_day() {
        // 3 records on day 0, 2 on day 1, nothing on day 2, 5 on day 3:
        // the run must return 5 records and never reach day 3.
        let source = ScriptedSource::new(day(0), vec![3, 2, 0, 5]);
        let result = crawl_daily(&source, Some(day(0)), None).await.unwrap();

        assert_eq!(result.len(), 5);
        assert_eq!(source.queried(), vec![day(0), day(1), day(2)]);
    }

    #[tokio::test]
    async fn test_results_accumulate_in_date_order() {
        let source = ScriptedSource::new(day(0), vec![1, 2, 1]);
        let result = crawl_daily(&source, Some(day(0)), None).await.unwrap();

        let dates: Vec<NaiveDate> = result.iter().map(|r| r.play_date).collect();
        assert_eq!(dates, vec![day(0), day(1), day(1), day(2)]);
    }

    #[tokio::test]
    async fn test_max_days_caps_endless_source() {
        let source = EndlessSource;
        let result = crawl_daily(&source, Some(day(0)), Some(2)).await.unwrap();

        // exactly the concatenation of day 0 and day 1 batches
        assert_eq!(result.len(), 4);
        assert!(result.iter().all(|r| r.play_date <= day(1)));
    }

    #[tokio::test]
    async fn test_max_days_zero_issues_no_calls() {
        let source = ScriptedSource::new(day(0), vec![3, 3, 3]);
        let result = crawl_daily(&source, Some(day(0)), Some(0)).await.unwrap();

        assert!(result.is_empty());
        assert!(source.queried().is_empty());
    }

    #[tokio::test]
    async fn test_failed_date_stops_like_empty_day() {
        struct FailsOnSecondDay {
            start: NaiveDate,
        }

        #[async_trait]
        impl ShowtimeSource for FailsOnSecondDay {
            fn chain(&self) -> Chain {
                Chain::Lotte
            }

            async fn day_batch(&self, date: NaiveDate) -> Result<Vec<Screening>> {
                if date == self.start {
                    Ok(vec![record(date, "11:00")])
                } else {
                    Err(crate::error::Error::config("upstream unreachable"))
                }
            }
        }

        let source = FailsOnSecondDay { start: day(0) };
        let result = crawl_daily(&source, Some(day(0)), Some(10)).await.unwrap();
        assert_eq!(result.len(), 1);
    }

    #[tokio::test]
    async fn test_open_dates_filter_and_cap() {
        let source = ScriptedSource::new(day(0), vec![1, 1, 1, 1, 1, 1]);
        // index out of order, with one date before the start
        let index = vec![day(4), day(1), day(0), day(3)];

        let result = crawl_open_dates(&source, &index, Some(day(1)), Some(2))
            .await
            .unwrap();

        // filtered to >= day 1, sorted, capped at 2 dates
        assert_eq!(source.queried(), vec![day(1), day(3)]);
        assert_eq!(result.len(), 2);
    }

    #[tokio::test]
    async fn test_open_dates_empty_day_does_not_stop() {
        let source = ScriptedSource::new(day(0), vec![1, 0, 2]);
        let index = vec![day(0), day(1), day(2)];

        let result = crawl_open_dates(&source, &index, Some(day(0)), None)
            .await
            .unwrap();

        // day 1 is empty but day 2 is still queried
        assert_eq!(result.len(), 3);
        assert_eq!(source.queried(), vec![day(0), day(1), day(2)]);
    }

    #[test]
    fn test_cap_distinct_dates() {
        let records = vec![
            record(day(0), "10:00"),
            record(day(0), "14:00"),
            record(day(1), "10:00"),
            record(day(2), "10:00"),
        ];

        let capped = cap_distinct_dates(records.clone(), Some(2));
        assert_eq!(capped.len(), 3);
        assert!(capped.iter().all(|r| r.play_date <= day(1)));

        let uncapped = cap_distinct_dates(records, None);
        assert_eq!(uncapped.len(), 4);
    }
}
