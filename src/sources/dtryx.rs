//! Dtryx adapter
//!
//! Dtryx is the white-label booking platform behind several independent
//! arthouse venues (에무시네마, 라이카시네마, ...). A single AJAX endpoint
//! serves the showtime list per cinema and date; the brand code selects
//! which storefront the cinema belongs to.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use reqwest::header::{HeaderMap, HeaderValue};
use serde::Deserialize;

use crate::crawler::{Fetcher, ShowtimeSource};
use crate::error::{ParseError, Result};
use crate::models::{Chain, Cinema, Screening, ShowTime};

use super::{absorb_venue_result, warn_bad_record};

const SHOWSEQ_URL: &str = "https://dtryx.com/cinema/showseq_list.do";
const CGID: &str = "FE8EF4D2-F22D-4802-A39A-D58F23A29C1E";
const DEFAULT_BRAND: &str = "indieart";

pub struct DtryxSource {
    venues: Vec<Cinema>,
    fetcher: Arc<Fetcher>,
    endpoint: String,
}

#[derive(Debug, Deserialize)]
struct ShowseqResponse {
    #[serde(rename = "Showseqlist", default)]
    showseq_list: Vec<ShowseqItem>,
}

#[derive(Debug, Deserialize)]
struct ShowseqItem {
    #[serde(rename = "CinemaNm")]
    cinema_name: String,
    #[serde(rename = "CinemaCd")]
    cinema_code: String,
    #[serde(rename = "ScreenNm")]
    screen_name: String,
    #[serde(rename = "MovieNmNat")]
    movie_name: String,
    #[serde(rename = "StartTime")]
    start_time: String,
    #[serde(rename = "EndTime")]
    end_time: String,
}

impl DtryxSource {
    pub fn new(venues: Vec<Cinema>, fetcher: Arc<Fetcher>) -> Self {
        Self {
            venues,
            fetcher,
            endpoint: SHOWSEQ_URL.to_string(),
        }
    }

    /// Point the adapter at a mock server
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    fn headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            "X-Requested-With",
            HeaderValue::from_static("XMLHttpRequest"),
        );
        headers
    }

    async fn fetch_venue(
        &self,
        venue: &Cinema,
        date: NaiveDate,
        crawl_ts: DateTime<Utc>,
    ) -> Result<Vec<Screening>> {
        let brand = venue.brand_cd.as_deref().unwrap_or(DEFAULT_BRAND);
        let cache_buster = Utc::now().timestamp_millis().to_string();
        let query = [
            ("cgid", CGID.to_string()),
            ("ssid", String::new()),
            ("tokn", String::new()),
            ("BrandCd", brand.to_string()),
            ("CinemaCd", venue.cinema_code.clone()),
            ("PlaySDT", date.format("%Y-%m-%d").to_string()),
            ("_", cache_buster),
        ];

        let text = self
            .fetcher
            .get(&self.endpoint, &query, Self::headers())
            .await?;

        let response: ShowseqResponse = serde_json::from_str(&text)
            .map_err(|e| ParseError::UnexpectedPayload(e.to_string()))?;

        let mut records = Vec::new();
        for item in response.showseq_list {
            match self.to_screening(date, &item, crawl_ts) {
                Ok(record) => records.push(record),
                Err(e) => warn_bad_record(self.chain(), &venue.cinema_code, &e),
            }
        }

        Ok(records)
    }

    fn to_screening(
        &self,
        date: NaiveDate,
        item: &ShowseqItem,
        crawl_ts: DateTime<Utc>,
    ) -> std::result::Result<Screening, ParseError> {
        Ok(Screening {
            id: Screening::new_id(),
            provider: self.chain(),
            cinema_name: item.cinema_name.clone(),
            cinema_code: item.cinema_code.clone(),
            screen_name: item.screen_name.clone(),
            movie_title: item.movie_name.trim().to_string(),
            play_date: date,
            start_dt: ShowTime::parse(&item.start_time)?,
            end_dt: ShowTime::parse(&item.end_time)?,
            crawl_ts,
            // the platform exposes no per-screening booking link or seat counts
            url: None,
            remain_seat_cnt: None,
            total_seat_cnt: None,
        })
    }
}

#[async_trait]
impl ShowtimeSource for DtryxSource {
    fn chain(&self) -> Chain {
        Chain::Dtryx
    }

    async fn day_batch(&self, date: NaiveDate) -> Result<Vec<Screening>> {
        let crawl_ts = Utc::now();
        let mut batch = Vec::new();

        for venue in &self.venues {
            let result = self.fetch_venue(venue, date, crawl_ts).await;
            absorb_venue_result(self.chain(), &venue.cinema_code, &mut batch, result);
        }

        Ok(batch)
    }
}
