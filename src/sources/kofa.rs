//! 시네마테크KOFA adapter
//!
//! The Korean Film Archive does not expose a booking API; its cinematheque
//! programme is published through the KMDb open-data endpoint, which answers
//! a whole date window in one call. The adapter is therefore a bulk source:
//! `run` fetches the window once and caps it, and `day_batch` filters the
//! window down to the requested date.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Days, Local, NaiveDate, Utc};
use reqwest::header::HeaderMap;
use serde::Deserialize;

use crate::crawler::{driver, Fetcher, ShowtimeSource};
use crate::error::{ParseError, Result};
use crate::models::{Chain, Screening, ShowTime};

use super::warn_bad_record;

const KMDB_URL: &str = "https://www.kmdb.or.kr/info/api/3/api.json";
const CINEMA_NAME: &str = "시네마테크KOFA";
const CINEMA_CODE: &str = "KOFA";

pub struct KofaSource {
    service_key: String,
    fetcher: Arc<Fetcher>,
    endpoint: String,
}

#[derive(Debug, Deserialize)]
struct KmdbResponse {
    #[serde(rename = "resultList", default)]
    result_list: Vec<KmdbItem>,
}

#[derive(Debug, Deserialize)]
struct KmdbItem {
    #[serde(rename = "cMovieDate")]
    movie_date: String,
    #[serde(rename = "cMovieTime")]
    movie_time: String,
    #[serde(rename = "cMovieName")]
    movie_name: String,
    #[serde(rename = "cRunningTime", default)]
    running_time: String,
    #[serde(rename = "cCodeSubName3", default)]
    venue_label: String,
    #[serde(rename = "homePageURL", default)]
    home_page_url: Option<String>,
}

impl KofaSource {
    pub fn new(service_key: String, fetcher: Arc<Fetcher>) -> Self {
        Self {
            service_key,
            fetcher,
            endpoint: KMDB_URL.to_string(),
        }
    }

    /// Point the adapter at a mock server
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Fetch every programme entry from `start` through the end of the
    /// following month, dropping anything outside that window.
    async fn fetch_window(&self, start: NaiveDate) -> Result<Vec<Screening>> {
        let end = end_of_next_month(start).unwrap_or(start);
        let query = [
            ("serviceKey", self.service_key.clone()),
            ("StartDate", start.format("%Y%m%d").to_string()),
            ("EndDate", end.format("%Y%m%d").to_string()),
        ];

        let text = self
            .fetcher
            .get(&self.endpoint, &query, HeaderMap::new())
            .await?;

        let response: KmdbResponse = serde_json::from_str(&text)
            .map_err(|e| ParseError::UnexpectedPayload(e.to_string()))?;

        let crawl_ts = Utc::now();
        let mut records = Vec::new();
        for item in response.result_list {
            match to_screening(&item, crawl_ts) {
                Ok(record) if record.play_date >= start && record.play_date <= end => {
                    records.push(record);
                }
                Ok(_) => {}
                Err(e) => warn_bad_record(Chain::Kofa, CINEMA_CODE, &e),
            }
        }

        Ok(records)
    }
}

fn to_screening(item: &KmdbItem, crawl_ts: DateTime<Utc>) -> std::result::Result<Screening, ParseError> {
    let play_date = NaiveDate::parse_from_str(&item.movie_date, "%Y%m%d")
        .map_err(|_| ParseError::InvalidDate(item.movie_date.clone()))?;
    let start_dt = ShowTime::parse(&item.movie_time)?;

    // Runtime may be blank; a zero-length screening is better than none
    let runtime: u32 = item.running_time.trim().parse().unwrap_or(0);
    let end_dt = start_dt.add_minutes(runtime)?;

    // "시네마테크KOFA 2관" style labels carry the screen; plain labels don't
    let screen_name = if item.venue_label.contains('관') {
        item.venue_label
            .split_whitespace()
            .last()
            .unwrap_or("Main")
            .to_string()
    } else {
        "Main".to_string()
    };

    Ok(Screening {
        id: Screening::new_id(),
        provider: Chain::Kofa,
        cinema_name: CINEMA_NAME.to_string(),
        cinema_code: CINEMA_CODE.to_string(),
        screen_name,
        movie_title: item.movie_name.trim().to_string(),
        play_date,
        start_dt,
        end_dt,
        crawl_ts,
        url: item
            .home_page_url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .map(str::to_string),
        remain_seat_cnt: None,
        total_seat_cnt: None,
    })
}

/// Last day of the month after the one containing `start`
fn end_of_next_month(start: NaiveDate) -> Option<NaiveDate> {
    let (year, month) = if start.month() >= 11 {
        (start.year() + 1, start.month() - 10)
    } else {
        (start.year(), start.month() + 2)
    };
    NaiveDate::from_ymd_opt(year, month, 1)?.checked_sub_days(Days::new(1))
}

#[async_trait]
impl ShowtimeSource for KofaSource {
    fn chain(&self) -> Chain {
        Chain::Kofa
    }

    async fn day_batch(&self, date: NaiveDate) -> Result<Vec<Screening>> {
        let window = self.fetch_window(date).await?;
        Ok(window.into_iter().filter(|r| r.play_date == date).collect())
    }

    /// Bulk mode: one window fetch, then the day cap applied to the
    /// distinct play-dates actually present.
    async fn run(
        &self,
        start_date: Option<NaiveDate>,
        max_days: Option<u32>,
    ) -> Result<Vec<Screening>> {
        let start = start_date.unwrap_or_else(|| Local::now().date_naive());
        let window = self.fetch_window(start).await?;
        Ok(driver::cap_distinct_dates(window, max_days))
    }
}
