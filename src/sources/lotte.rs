//! Lotte Cinema adapter
//!
//! Lotte's ticketing backend answers a form-encoded `ParamList` JSON payload
//! with the full play sequence for one venue and date. Only 아르떼 screens
//! (the chain's arthouse brand) are kept.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use reqwest::header::{HeaderMap, HeaderValue, ORIGIN, REFERER};
use serde::Deserialize;

use crate::crawler::{Fetcher, ShowtimeSource};
use crate::error::{ParseError, Result};
use crate::models::{Chain, Cinema, Screening, ShowTime};

use super::{absorb_venue_result, flex_string, flex_u32, warn_bad_record};

const TICKETING_URL: &str = "https://www.lottecinema.co.kr/LCWS/Ticketing/TicketingData.aspx";
const ARTHOUSE_MARK: &str = "아르떼";

pub struct LotteSource {
    venues: Vec<Cinema>,
    fetcher: Arc<Fetcher>,
    endpoint: String,
}

#[derive(Debug, Deserialize)]
struct TicketingResponse {
    #[serde(rename = "PlaySeqs")]
    play_seqs: PlaySeqs,
}

#[derive(Debug, Deserialize)]
struct PlaySeqs {
    #[serde(rename = "Items", default)]
    items: Vec<PlaySeqItem>,
}

#[derive(Debug, Deserialize)]
struct PlaySeqItem {
    #[serde(rename = "CinemaNameKR")]
    cinema_name: String,
    #[serde(rename = "ScreenNameKR")]
    screen_name: String,
    #[serde(rename = "MovieNameKR")]
    movie_name: String,
    #[serde(rename = "PlayDt")]
    play_dt: String,
    #[serde(rename = "StartTime", default)]
    start_time: Option<String>,
    #[serde(rename = "EndTime", default)]
    end_time: Option<String>,
    #[serde(rename = "ScreenDivisionNameKR", default)]
    screen_division: Option<String>,
    #[serde(rename = "ScreenID", default, deserialize_with = "flex_string")]
    screen_id: Option<String>,
    #[serde(rename = "CinemaID", default, deserialize_with = "flex_string")]
    cinema_id: Option<String>,
    #[serde(
        rename = "RepresentationMovieCode",
        default,
        deserialize_with = "flex_string"
    )]
    movie_code: Option<String>,
    #[serde(rename = "BookingSeatCount", default, deserialize_with = "flex_u32")]
    booking_seat_count: Option<u32>,
    #[serde(rename = "TotalSeatCount", default, deserialize_with = "flex_u32")]
    total_seat_count: Option<u32>,
}

impl LotteSource {
    pub fn new(venues: Vec<Cinema>, fetcher: Arc<Fetcher>) -> Self {
        Self {
            venues,
            fetcher,
            endpoint: TICKETING_URL.to_string(),
        }
    }

    /// Point the adapter at a mock server
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    fn headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(REFERER, HeaderValue::from_static("https://www.lottecinema.co.kr"));
        headers.insert(ORIGIN, HeaderValue::from_static("https://www.lottecinema.co.kr"));
        headers
    }

    async fn fetch_venue(
        &self,
        venue: &Cinema,
        date: NaiveDate,
        crawl_ts: DateTime<Utc>,
    ) -> Result<Vec<Screening>> {
        let payload = serde_json::json!({
            "MethodName": "GetPlaySequence",
            "channelType": "HO",
            "osType": "W",
            "osVersion": "Chrome",
            "playDate": date.format("%Y-%m-%d").to_string(),
            "cinemaID": venue.cinema_code,
            "representationMovieCode": "",
        });

        let body = self
            .fetcher
            .post_form(
                &self.endpoint,
                &[("ParamList", payload.to_string())],
                Self::headers(),
            )
            .await?;

        let response: TicketingResponse = serde_json::from_str(&body)
            .map_err(|e| ParseError::UnexpectedPayload(e.to_string()))?;

        let mut records = Vec::new();
        for item in response.play_seqs.items {
            // Arthouse screens only
            if !item
                .screen_division
                .as_deref()
                .unwrap_or("")
                .contains(ARTHOUSE_MARK)
            {
                continue;
            }
            let Some(start_time) = item.start_time.as_deref().filter(|s| !s.is_empty()) else {
                continue;
            };

            match self.to_screening(venue, date, &item, start_time, crawl_ts) {
                Ok(record) => records.push(record),
                Err(e) => warn_bad_record(self.chain(), &venue.cinema_code, &e),
            }
        }

        Ok(records)
    }

    fn to_screening(
        &self,
        venue: &Cinema,
        queried_date: NaiveDate,
        item: &PlaySeqItem,
        start_time: &str,
        crawl_ts: DateTime<Utc>,
    ) -> std::result::Result<Screening, ParseError> {
        let start_dt = ShowTime::parse(start_time)?;
        let end_dt = item
            .end_time
            .as_deref()
            .filter(|s| !s.is_empty())
            .map(ShowTime::parse)
            .transpose()?
            .unwrap_or(start_dt);

        let play_date = NaiveDate::parse_from_str(&item.play_dt, "%Y-%m-%d")
            .unwrap_or(queried_date);

        let book_url = format!(
            "https://www.lottecinema.co.kr/NLCHS/ticketing\
             ?link_screenId={}&link_cinemaCode={}&link_movieCd={}\
             &link_date={}&link_time={}&link_channelCode=naver",
            item.screen_id.as_deref().unwrap_or(""),
            item.cinema_id.as_deref().unwrap_or(""),
            item.movie_code.as_deref().unwrap_or(""),
            item.play_dt,
            start_time,
        );

        Ok(Screening {
            id: Screening::new_id(),
            provider: self.chain(),
            cinema_name: item.cinema_name.clone(),
            cinema_code: venue.cinema_code.clone(),
            screen_name: item.screen_name.clone(),
            movie_title: item.movie_name.trim().to_string(),
            play_date,
            start_dt,
            end_dt,
            crawl_ts,
            url: Some(book_url),
            remain_seat_cnt: item.booking_seat_count,
            total_seat_cnt: item.total_seat_count,
        })
    }
}

#[async_trait]
impl ShowtimeSource for LotteSource {
    fn chain(&self) -> Chain {
        Chain::Lotte
    }

    async fn day_batch(&self, date: NaiveDate) -> Result<Vec<Screening>> {
        let crawl_ts = Utc::now();

        // Venues are independent for a single date, fetch them concurrently
        let fetches = self
            .venues
            .iter()
            .map(|venue| self.fetch_venue(venue, date, crawl_ts));
        let results = futures::future::join_all(fetches).await;

        let mut batch = Vec::new();
        for (venue, result) in self.venues.iter().zip(results) {
            absorb_venue_result(self.chain(), &venue.cinema_code, &mut batch, result);
        }
        Ok(batch)
    }
}
