//! Megabox adapter
//!
//! Megabox serves its per-branch timetable as a JSON schedule page. At the
//! 코엑스 multiplex only 스크린A and 스크린B are independent/art screens, so
//! everything else there is dropped (adapter-local business rule).

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Local, NaiveDate, Utc};
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE, ORIGIN, REFERER};
use serde::Deserialize;

use crate::crawler::{Fetcher, ShowtimeSource};
use crate::error::{ParseError, Result};
use crate::models::{Chain, Cinema, Screening, ShowTime};

use super::{absorb_venue_result, flex_string, flex_u32, warn_bad_record};

const SCHEDULE_URL: &str = "https://www.megabox.co.kr/on/oh/ohc/Brch/schedulePage.do";
const COEX: &str = "코엑스";
const COEX_ART_SCREENS: [&str; 2] = ["스크린A", "스크린B"];

pub struct MegaboxSource {
    venues: Vec<Cinema>,
    fetcher: Arc<Fetcher>,
    endpoint: String,
}

#[derive(Debug, Deserialize)]
struct SchedulePage {
    #[serde(rename = "megaMap", default)]
    mega_map: MegaMap,
}

#[derive(Debug, Deserialize, Default)]
struct MegaMap {
    #[serde(rename = "movieFormList", default)]
    movie_form_list: Vec<MovieForm>,
}

#[derive(Debug, Deserialize)]
struct MovieForm {
    #[serde(rename = "brchNm")]
    branch_name: String,
    #[serde(rename = "brchNo", default, deserialize_with = "flex_string")]
    branch_no: Option<String>,
    #[serde(rename = "theabExpoNm")]
    screen_name: String,
    #[serde(rename = "rpstMovieNm")]
    movie_name: String,
    #[serde(rename = "playStartTime")]
    play_start_time: String,
    #[serde(rename = "playEndTime")]
    play_end_time: String,
    #[serde(rename = "playSchdlNo", default, deserialize_with = "flex_string")]
    play_schedule_no: Option<String>,
    #[serde(rename = "restSeatCnt", default, deserialize_with = "flex_u32")]
    rest_seat_cnt: Option<u32>,
    #[serde(rename = "totSeatCnt", default, deserialize_with = "flex_u32")]
    tot_seat_cnt: Option<u32>,
}

impl MegaboxSource {
    pub fn new(venues: Vec<Cinema>, fetcher: Arc<Fetcher>) -> Self {
        Self {
            venues,
            fetcher,
            endpoint: SCHEDULE_URL.to_string(),
        }
    }

    /// Point the adapter at a mock server
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    fn headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            "X-Requested-With",
            HeaderValue::from_static("XMLHttpRequest"),
        );
        headers.insert(ORIGIN, HeaderValue::from_static("https://www.megabox.co.kr"));
        headers.insert(
            REFERER,
            HeaderValue::from_static("https://www.megabox.co.kr/booking/timetable"),
        );
        headers
    }

    async fn fetch_venue(
        &self,
        venue: &Cinema,
        date: NaiveDate,
        crawl_ts: DateTime<Utc>,
    ) -> Result<Vec<Screening>> {
        let body = serde_json::json!({
            "masterType": "brch",
            "detailType": "area",
            "brchNo": venue.cinema_code,
            "brchNo1": venue.cinema_code,
            "firstAt": "N",
            "crtDe": Local::now().date_naive().format("%Y%m%d").to_string(),
            "playDe": date.format("%Y%m%d").to_string(),
        });

        let text = self
            .fetcher
            .post_json(&self.endpoint, &body, Self::headers())
            .await?;

        let page: SchedulePage = serde_json::from_str(&text)
            .map_err(|e| ParseError::UnexpectedPayload(e.to_string()))?;

        let mut records = Vec::new();
        for item in page.mega_map.movie_form_list {
            let screen_name = item.screen_name.trim().to_string();

            // At COEX only the art screens count
            if item.branch_name == COEX && !COEX_ART_SCREENS.contains(&screen_name.as_str()) {
                continue;
            }

            match self.to_screening(venue, date, &item, screen_name, crawl_ts) {
                Ok(record) => records.push(record),
                Err(e) => warn_bad_record(self.chain(), &venue.cinema_code, &e),
            }
        }

        Ok(records)
    }

    fn to_screening(
        &self,
        venue: &Cinema,
        date: NaiveDate,
        item: &MovieForm,
        screen_name: String,
        crawl_ts: DateTime<Utc>,
    ) -> std::result::Result<Screening, ParseError> {
        let start_dt = ShowTime::parse(&item.play_start_time)?;
        let end_dt = ShowTime::parse(&item.play_end_time)?;

        let book_url = item.play_schedule_no.as_deref().map(|no| {
            format!("https://www.megabox.co.kr/bookingByPlaySchdlNo?playSchdlNo={no}")
        });

        Ok(Screening {
            id: Screening::new_id(),
            provider: self.chain(),
            cinema_name: item.branch_name.clone(),
            cinema_code: item
                .branch_no
                .clone()
                .unwrap_or_else(|| venue.cinema_code.clone()),
            screen_name,
            movie_title: item.movie_name.trim().to_string(),
            play_date: date,
            start_dt,
            end_dt,
            crawl_ts,
            url: book_url,
            remain_seat_cnt: item.rest_seat_cnt,
            total_seat_cnt: item.tot_seat_cnt,
        })
    }
}

#[async_trait]
impl ShowtimeSource for MegaboxSource {
    fn chain(&self) -> Chain {
        Chain::Megabox
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
