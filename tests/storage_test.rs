//! Store behavior across a simulated re-crawl

use chrono::{NaiveDate, Utc};
use tempfile::tempdir;

use simya::models::{Chain, Screening, ShowTime};
use simya::registry::VenueRegistry;
use simya::storage::ScreeningStore;

fn screening(chain: Chain, code: &str, start: &str, title: &str, remain: Option<u32>) -> Screening {
    Screening {
        id: Screening::new_id(),
        provider: chain,
        cinema_name: "극장".to_string(),
        cinema_code: code.to_string(),
        screen_name: "1관".to_string(),
        movie_title: title.to_string(),
        play_date: NaiveDate::from_ymd_opt(2025, 5, 26).unwrap(),
        start_dt: ShowTime::parse(start).unwrap(),
        end_dt: ShowTime::parse(start).unwrap().add_minutes(100).unwrap(),
        crawl_ts: Utc::now(),
        url: None,
        remain_seat_cnt: remain,
        total_seat_cnt: Some(100),
    }
}

#[test]
fn recrawl_refreshes_rows_instead_of_duplicating() {
    let store = ScreeningStore::in_memory().unwrap();

    // First nightly pass
    let first = vec![
        screening(Chain::Lotte, "1016", "14:00", "기나긴 하루", Some(80)),
        screening(Chain::Lotte, "1016", "19:10", "기나긴 하루", Some(96)),
        screening(Chain::Dtryx, "EMU01", "14:00", "녹야", None),
    ];
    store.upsert_screenings(&first).unwrap();
    store.register_movies(&first).unwrap();
    assert_eq!(store.screening_count().unwrap(), 3);

    // Second pass hours later: seats sold, same identities
    let second = vec![
        screening(Chain::Lotte, "1016", "14:00", "기나긴 하루", Some(41)),
        screening(Chain::Lotte, "1016", "19:10", "기나긴 하루", Some(60)),
        screening(Chain::Dtryx, "EMU01", "14:00", "녹야", None),
    ];
    store.upsert_screenings(&second).unwrap();
    assert_eq!(store.screening_count().unwrap(), 3);

    let date = NaiveDate::from_ymd_opt(2025, 5, 26).unwrap();
    let rows = store.fetch_screenings(Chain::Lotte, date).unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].remain_seat_cnt, Some(41));
    assert_eq!(rows[1].remain_seat_cnt, Some(60));

    // Same start time at a different chain is a different row
    let dtryx = store.fetch_screenings(Chain::Dtryx, date).unwrap();
    assert_eq!(dtryx.len(), 1);
}

#[test]
fn store_persists_across_reopen() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("simya.db");

    {
        let store = ScreeningStore::new(&path).unwrap();
        store
            .upsert_screenings(&[screening(Chain::Kofa, "KOFA", "19:00", "하녀", None)])
            .unwrap();
    }

    let store = ScreeningStore::new(&path).unwrap();
    assert_eq!(store.screening_count().unwrap(), 1);

    let rows = store
        .fetch_screenings(Chain::Kofa, NaiveDate::from_ymd_opt(2025, 5, 26).unwrap())
        .unwrap();
    assert_eq!(rows[0].movie_title, "하녀");
}

#[test]
fn registry_round_trips_through_store() {
    let store = ScreeningStore::in_memory().unwrap();
    store
        .insert_cinemas(&[
            simya::models::Cinema {
                cinema_code: "1016".to_string(),
                name: "롯데시네마 건대입구".to_string(),
                chain: Chain::Lotte,
                latitude: 37.5384,
                longitude: 127.0713,
                brand_cd: None,
                areacode: Some("서울".to_string()),
            },
            simya::models::Cinema {
                cinema_code: "EMU01".to_string(),
                name: "에무시네마".to_string(),
                chain: Chain::Dtryx,
                latitude: 37.5759,
                longitude: 126.9697,
                brand_cd: Some("emu".to_string()),
                areacode: None,
            },
        ])
        .unwrap();

    let registry = VenueRegistry::from_store(&store).unwrap();
    assert_eq!(registry.len(), 2);

    let dtryx = registry.for_chain(Chain::Dtryx);
    assert_eq!(dtryx.len(), 1);
    assert_eq!(dtryx[0].brand_cd.as_deref(), Some("emu"));
}

#[test]
fn movie_titles_feed_the_poster_queue_once() {
    let store = ScreeningStore::in_memory().unwrap();

    let batch = vec![
        screening(Chain::Lotte, "1016", "14:00", "기나긴 하루", None),
        screening(Chain::Lotte, "1016", "19:10", "기나긴 하루", None),
        screening(Chain::Kofa, "KOFA", "19:00", "하녀", None),
    ];
    store.register_movies(&batch).unwrap();

    let pending = store.movies_missing_posters().unwrap();
    let titles: Vec<&str> = pending.iter().map(|(_, t)| t.as_str()).collect();
    assert_eq!(titles, vec!["기나긴 하루", "하녀"]);

    store
        .set_poster_url(pending[0].0, "https://image.tmdb.org/t/p/w500/a.jpg")
        .unwrap();
    assert_eq!(store.movies_missing_posters().unwrap().len(), 1);
}
