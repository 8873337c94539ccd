//! 문화인 picturehouse adapter
//!
//! The booking site is server-rendered: a calendar page lists the dates with
//! scheduled screenings, and a per-date AJAX call answers XML whose CDATA
//! body is an HTML timetable fragment. Runtimes only appear on each film's
//! detail page, so end times need one extra lookup per title (memoized).
//!
//! Because the site publishes its own date index, this is a bulk source:
//! `run` walks the open dates instead of probing day by day.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use regex::Regex;
use reqwest::header::{HeaderMap, HeaderValue};
use scraper::{Html, Selector};
use tokio::sync::{Mutex, OnceCell};

use crate::crawler::{driver, Fetcher, ShowtimeSource};
use crate::error::{Error, ParseError, Result};
use crate::models::{Chain, Cinema, Screening, ShowTime};

use super::warn_bad_record;

const BASE_URL: &str = "https://picturehouse2.moonhwain.kr:447";
const DETAIL_BASE_URL: &str = "https://picturehouse.moonhwain.kr:447";
const BOOKING_ID: &str = "picturehouse";

fn cdata_time_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)<time>\s*<!\[CDATA\[(.*?)\]\]>\s*</time>").expect("valid regex")
    })
}

fn p_idx_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"getPfmDateJson_new\('\d+','(\d+)'\)").expect("valid regex"))
}

fn seat_count_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\d+)\s*석").expect("valid regex"))
}

fn clock_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\d{2}:\d{2}").expect("valid regex"))
}

fn minutes_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\d+)\s*분").expect("valid regex"))
}

fn selector(css: &'static str) -> Selector {
    Selector::parse(css).expect("valid static selector")
}

pub struct MoonhwainSource {
    venues: Vec<Cinema>,
    fetcher: Arc<Fetcher>,
    base_url: String,
    detail_base_url: String,
    open_dates: OnceCell<Vec<NaiveDate>>,
    runtime_cache: Mutex<HashMap<String, u32>>,
}

/// Intermediate timetable data, extracted synchronously so no parsed DOM is
/// held across an await point.
#[derive(Debug)]
struct FilmBlock {
    title: String,
    screen_name: String,
    total_seats: Option<u32>,
    p_idx: Option<String>,
    slots: Vec<Slot>,
}

#[derive(Debug)]
struct Slot {
    start: String,
    remaining: Option<u32>,
    book_path: Option<String>,
}

impl MoonhwainSource {
    pub fn new(venues: Vec<Cinema>, fetcher: Arc<Fetcher>) -> Self {
        Self {
            venues,
            fetcher,
            base_url: BASE_URL.to_string(),
            detail_base_url: DETAIL_BASE_URL.to_string(),
            open_dates: OnceCell::new(),
            runtime_cache: Mutex::new(HashMap::new()),
        }
    }

    /// Point both hosts at a mock server
    pub fn with_base_url(mut self, base: impl Into<String>) -> Self {
        let base = base.into();
        self.base_url.clone_from(&base);
        self.detail_base_url = base;
        self
    }

    fn ajax_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            "X-Requested-With",
            HeaderValue::from_static("XMLHttpRequest"),
        );
        headers
    }

    fn calendar_url(&self) -> String {
        format!("{}/rsvc/rsv_mv.html", self.base_url)
    }

    /// Dates the calendar page advertises as bookable, fetched once per
    /// adapter instance.
    async fn open_dates(&self) -> Result<&[NaiveDate]> {
        let dates = self
            .open_dates
            .get_or_try_init(|| async {
                let query = [
                    ("b_id", BOOKING_ID.to_string()),
                    ("vwCal", "1".to_string()),
                ];
                let html = self
                    .fetcher
                    .get(&self.calendar_url(), &query, HeaderMap::new())
                    .await?;
                parse_calendar_dates(&html)
            })
            .await?;
        Ok(dates)
    }

    async fn fetch_timetable(&self, date: NaiveDate) -> Result<String> {
        let iso = date.format("%Y-%m-%d").to_string();
        let form = [
            ("p_idx", String::new()),
            ("b_id", BOOKING_ID.to_string()),
            ("ss_date", iso.clone()),
            ("in_ss_date", iso),
            ("in_ss_idx", String::new()),
        ];
        let url = format!("{}/inc/getTimeM.html", self.base_url);
        let xml = self
            .fetcher
            .post_form(&url, &form, Self::ajax_headers())
            .await?;

        let fragment = cdata_time_re()
            .captures(&xml)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
            .ok_or(ParseError::MissingField("time CDATA"))?;
        Ok(fragment)
    }

    /// Runtime in minutes from the film detail page, memoized by `p_idx`.
    async fn runtime_minutes(&self, p_idx: &str) -> Option<u32> {
        {
            let cache = self.runtime_cache.lock().await;
            if let Some(&minutes) = cache.get(p_idx) {
                return Some(minutes);
            }
        }

        let url = format!("{}/movie/detail.html", self.detail_base_url);
        let query = [("p_idx", p_idx.to_string())];
        let html = match self.fetcher.get(&url, &query, HeaderMap::new()).await {
            Ok(body) => body,
            Err(e) => {
                tracing::warn!(p_idx = %p_idx, error = %e, "runtime lookup failed");
                return None;
            }
        };

        let minutes = parse_runtime(&html)?;
        self.runtime_cache
            .lock()
            .await
            .insert(p_idx.to_string(), minutes);
        Some(minutes)
    }

    async fn build_screenings(
        &self,
        date: NaiveDate,
        blocks: Vec<FilmBlock>,
    ) -> Result<Vec<Screening>> {
        let venue = self.venues.first().ok_or(Error::NoVenues(Chain::Moonhwain))?;
        let crawl_ts = Utc::now();
        let mut records = Vec::new();

        for block in blocks {
            let runtime = match &block.p_idx {
                Some(p_idx) => self.runtime_minutes(p_idx).await.unwrap_or(0),
                None => 0,
            };

            for slot in &block.slots {
                let record = (|| -> std::result::Result<Screening, ParseError> {
                    let start_dt = ShowTime::parse(&slot.start)?;
                    Ok(Screening {
                        id: Screening::new_id(),
                        provider: Chain::Moonhwain,
                        cinema_name: venue.name.clone(),
                        cinema_code: venue.cinema_code.clone(),
                        screen_name: block.screen_name.clone(),
                        movie_title: block.title.clone(),
                        play_date: date,
                        start_dt,
                        end_dt: start_dt.add_minutes(runtime)?,
                        crawl_ts,
                        url: slot
                            .book_path
                            .clone()
                            .map(|p| format!("{}{}", self.base_url, p))
                            .or_else(|| Some(self.calendar_url())),
                        remain_seat_cnt: slot.remaining,
                        total_seat_cnt: block.total_seats,
                    })
                })();

                match record {
                    Ok(r) => records.push(r),
                    Err(e) => warn_bad_record(self.chain(), &venue.cinema_code, &e),
                }
            }
        }

        Ok(records)
    }
}

/// Pull the open dates out of the calendar page's hidden `actDate` input,
/// whose value is comma-joined `YYYYMMDD:n` segments.
fn parse_calendar_dates(html: &str) -> Result<Vec<NaiveDate>> {
    let document = Html::parse_document(html);
    let act_date = selector("input#actDate");

    let value = document
        .select(&act_date)
        .next()
        .and_then(|el| el.value().attr("value"))
        .ok_or(ParseError::MissingField("actDate"))?;

    let mut dates: Vec<NaiveDate> = value
        .split(',')
        .filter_map(|segment| segment.split(':').next())
        .filter_map(|raw| NaiveDate::parse_from_str(raw.trim(), "%Y%m%d").ok())
        .collect();
    dates.sort_unstable();
    dates.dedup();
    Ok(dates)
}

/// Extract film blocks from the timetable HTML fragment. Each film is a
/// `div.title_area` (name, screen, seat total, detail handle) zipped with
/// the `ul` of its time slots.
fn parse_timetable(fragment: &str) -> Vec<FilmBlock> {
    let document = Html::parse_fragment(fragment);
    let title_area = selector("div.movie_time_select > div.title_area");
    let slot_list = selector("div.movie_time_select > ul");
    let movie_name = selector("p.movie_name");
    let seat_span = selector("h6 span");
    let screen_em = selector("h6 em");
    let time_list = selector("dl.time_list");
    let anchor = selector("a");
    let sold_out = selector("del");

    let mut blocks = Vec::new();
    for (head, list) in document.select(&title_area).zip(document.select(&slot_list)) {
        let title = head
            .select(&movie_name)
            .next()
            .map(|el| el.text().collect::<String>().trim().to_string())
            .unwrap_or_default();

        let total_seats = head
            .select(&seat_span)
            .next()
            .map(|el| el.text().collect::<String>())
            .and_then(|text| {
                seat_count_re()
                    .captures(&text)
                    .and_then(|c| c[1].parse().ok())
            });

        let screen_name = head
            .select(&screen_em)
            .next()
            .map(|el| el.text().collect::<String>().trim().to_string())
            .unwrap_or_default();

        let p_idx = p_idx_re()
            .captures(&head.html())
            .map(|c| c[1].to_string());

        let mut slots = Vec::new();
        for dl in list.select(&time_list) {
            for a in dl.select(&anchor) {
                let text = a.text().collect::<String>();
                let Some(start) = clock_re().find(&text).map(|m| m.as_str().to_string()) else {
                    continue;
                };

                // <del> marks a sold-out slot
                let remaining = if a.select(&sold_out).next().is_some() {
                    Some(0)
                } else {
                    seat_count_re()
                        .captures(&text)
                        .and_then(|c| c[1].parse().ok())
                };

                let book_path = a.value().attr("href").and_then(extract_booking_path);
                slots.push(Slot {
                    start,
                    remaining,
                    book_path,
                });
            }
        }

        blocks.push(FilmBlock {
            title,
            screen_name,
            total_seats,
            p_idx,
            slots,
        });
    }

    blocks
}

/// Booking links are wrapped in `javascript:goLogin('/path')`; anything else
/// has no direct per-slot link.
fn extract_booking_path(href: &str) -> Option<String> {
    let inner = href.strip_prefix("javascript:goLogin('")?;
    let end = inner.find("')")?;
    Some(inner[..end].to_string())
}

/// Runtime from the detail page: the `dd` after the 러닝타임 `dt`, falling
/// back to an "N분" span in the summary info block.
fn parse_runtime(html: &str) -> Option<u32> {
    let document = Html::parse_document(html);
    let dt_sel = selector("dt");
    let sinfo_span = selector("p.sinfo span");

    for dt in document.select(&dt_sel) {
        let label = dt.text().collect::<String>();
        if !label.contains("러닝타임") {
            continue;
        }
        let dd = dt
            .next_siblings()
            .filter_map(scraper::ElementRef::wrap)
            .find(|el| el.value().name() == "dd")?;
        let text = dd.text().collect::<String>();
        let digits: String = text.chars().filter(char::is_ascii_digit).collect();
        return digits.parse().ok();
    }

    for span in document.select(&sinfo_span) {
        let text = span.text().collect::<String>();
        if let Some(c) = minutes_re().captures(&text) {
            return c[1].parse().ok();
        }
    }

    None
}

#[async_trait]
impl ShowtimeSource for MoonhwainSource {
    fn chain(&self) -> Chain {
        Chain::Moonhwain
    }

    async fn day_batch(&self, date: NaiveDate) -> Result<Vec<Screening>> {
        if !self.open_dates().await?.contains(&date) {
            return Ok(Vec::new());
        }
        let fragment = self.fetch_timetable(date).await?;
        let blocks = parse_timetable(&fragment);
        self.build_screenings(date, blocks).await
    }

    /// Bulk mode: the calendar's own date index bounds the crawl.
    async fn run(
        &self,
        start_date: Option<NaiveDate>,
        max_days: Option<u32>,
    ) -> Result<Vec<Screening>> {
        let open_dates = self.open_dates().await?.to_vec();
        driver::crawl_open_dates(self, &open_dates, start_date, max_days).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMETABLE_FRAGMENT: &str = r##"
        <div class="movie_time_select">
            <div class="title_area" onclick="getPfmDateJson_new('3','412')">
                <p class="movie_name">낮과 밤</p>
                <h6><em>라운지</em><span>총 40석</span></h6>
            </div>
            <ul>
                <dl class="time_list">
                    <a href="javascript:goLogin('/rsvc/rsv_seat.html?idx=9')">
                        14:00 <dd>잔여 12석</dd>
                    </a>
                    <a href="#none">
                        19:30 <del>매진</del>
                    </a>
                </dl>
            </ul>
        </div>
    "##;

    #[test]
    fn test_parse_calendar_dates() {
        let html = r#"<html><body>
            <input type="hidden" id="actDate" value="20250526:1,20250527:2,20250530:1," />
        </body></html>"#;
        let dates = parse_calendar_dates(html).unwrap();
        assert_eq!(
            dates,
            vec![
                NaiveDate::from_ymd_opt(2025, 5, 26).unwrap(),
                NaiveDate::from_ymd_opt(2025, 5, 27).unwrap(),
                NaiveDate::from_ymd_opt(2025, 5, 30).unwrap(),
            ]
        );
    }

    #[test]
    fn test_calendar_without_act_date_is_error() {
        assert!(parse_calendar_dates("<html><body></body></html>").is_err());
    }

    #[test]
    fn test_parse_timetable_fragment() {
        let blocks = parse_timetable(TIMETABLE_FRAGMENT);
        assert_eq!(blocks.len(), 1);

        let block = &blocks[0];
        assert_eq!(block.title, "낮과 밤");
        assert_eq!(block.screen_name, "라운지");
        assert_eq!(block.total_seats, Some(40));
        assert_eq!(block.p_idx.as_deref(), Some("412"));

        assert_eq!(block.slots.len(), 2);
        assert_eq!(block.slots[0].start, "14:00");
        assert_eq!(block.slots[0].remaining, Some(12));
        assert_eq!(
            block.slots[0].book_path.as_deref(),
            Some("/rsvc/rsv_seat.html?idx=9")
        );
        assert_eq!(block.slots[1].start, "19:30");
        assert_eq!(block.slots[1].remaining, Some(0));
        assert!(block.slots[1].book_path.is_none());
    }

    #[test]
    fn test_cdata_extraction() {
        let xml = "<result><time><![CDATA[<div>내용</div>]]></time></result>";
        let captured = cdata_time_re().captures(xml).unwrap();
        assert_eq!(&captured[1], "<div>내용</div>");
    }

    #[test]
    fn test_parse_runtime_from_definition_list() {
        let html = r#"<html><body>
            <dl><dt>러닝타임</dt><dd>102분</dd></dl>
        </body></html>"#;
        assert_eq!(parse_runtime(html), Some(102));
    }

    #[test]
    fn test_parse_runtime_fallback_span() {
        let html = r#"<html><body>
            <p class="sinfo"><span>드라마</span><span>96분</span></p>
        </body></html>"#;
        assert_eq!(parse_runtime(html), Some(96));
    }

    #[test]
    fn test_booking_path_extraction() {
        assert_eq!(
            extract_booking_path("javascript:goLogin('/rsvc/rsv_seat.html?idx=9')"),
            Some("/rsvc/rsv_seat.html?idx=9".to_string())
        );
        assert_eq!(extract_booking_path("#none"), None);
    }
}
