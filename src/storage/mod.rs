//! SQLite persistence gateway
//!
//! One `ScreeningStore` owns the connection behind a `Mutex`; WAL mode keeps
//! readers unblocked during the nightly write burst. Screenings are upserted
//! on their natural identity `(provider, cinema_code, play_date, screen_name,
//! start_dt)` so re-crawling a window is idempotent: a second pass refreshes
//! seat counts and crawl timestamps instead of duplicating rows.

use std::path::Path;
use std::str::FromStr;
use std::sync::Mutex;

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection};

use crate::error::{Error, ParseError, Result};
use crate::models::{Chain, Cinema, Screening, ShowTime};

pub struct ScreeningStore {
    conn: Mutex<Connection>,
}

impl ScreeningStore {
    /// Open (or create) a store at `path`, creating parent directories
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;

        let store = Self {
            conn: Mutex::new(conn),
        };
        store.create_schema()?;

        tracing::info!(path = %path.display(), "screening store opened");
        Ok(store)
    }

    /// In-memory store for tests
    pub fn in_memory() -> Result<Self> {
        let store = Self {
            conn: Mutex::new(Connection::open_in_memory()?),
        };
        store.create_schema()?;
        Ok(store)
    }

    fn create_schema(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS cinemas (
                chain TEXT NOT NULL,
                cinema_code TEXT NOT NULL,
                name TEXT NOT NULL,
                latitude REAL NOT NULL,
                longitude REAL NOT NULL,
                brand_cd TEXT,
                areacode TEXT,
                PRIMARY KEY (chain, cinema_code)
            );

            CREATE TABLE IF NOT EXISTS screenings (
                id TEXT NOT NULL,
                provider TEXT NOT NULL,
                cinema_name TEXT NOT NULL,
                cinema_code TEXT NOT NULL,
                screen_name TEXT NOT NULL,
                movie_title TEXT NOT NULL,
                play_date TEXT NOT NULL,
                start_dt TEXT NOT NULL,
                end_dt TEXT NOT NULL,
                crawl_ts TEXT NOT NULL,
                url TEXT,
                remain_seat_cnt INTEGER,
                total_seat_cnt INTEGER,
                PRIMARY KEY (provider, cinema_code, play_date, screen_name, start_dt)
            );

            CREATE INDEX IF NOT EXISTS idx_screenings_play_date
                ON screenings(play_date);

            CREATE INDEX IF NOT EXISTS idx_screenings_movie_title
                ON screenings(movie_title);

            CREATE TABLE IF NOT EXISTS movies (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title TEXT NOT NULL UNIQUE,
                poster_url TEXT
            );
            "#,
        )?;
        Ok(())
    }

    /// Upsert a batch of screenings in one transaction.
    ///
    /// Rows are keyed by their identity tuple; on conflict the volatile
    /// fields (seat counts, crawl timestamp, title, URL) are refreshed and
    /// the original row id is kept. Returns the number of rows written.
    pub fn upsert_screenings(&self, records: &[Screening]) -> Result<usize> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                r#"
                INSERT INTO screenings (
                    id, provider, cinema_name, cinema_code, screen_name,
                    movie_title, play_date, start_dt, end_dt, crawl_ts,
                    url, remain_seat_cnt, total_seat_cnt
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
                ON CONFLICT (provider, cinema_code, play_date, screen_name, start_dt)
                DO UPDATE SET
                    cinema_name = excluded.cinema_name,
                    movie_title = excluded.movie_title,
                    end_dt = excluded.end_dt,
                    crawl_ts = excluded.crawl_ts,
                    url = excluded.url,
                    remain_seat_cnt = excluded.remain_seat_cnt,
                    total_seat_cnt = excluded.total_seat_cnt
                "#,
            )?;

            for record in records {
                stmt.execute(params![
                    record.id,
                    record.provider.as_str(),
                    record.cinema_name,
                    record.cinema_code,
                    record.screen_name,
                    record.movie_title,
                    record.play_date.format("%Y-%m-%d").to_string(),
                    record.start_dt.to_string(),
                    record.end_dt.to_string(),
                    record.crawl_ts.to_rfc3339(),
                    record.url,
                    record.remain_seat_cnt,
                    record.total_seat_cnt,
                ])?;
            }
        }
        tx.commit()?;
        Ok(records.len())
    }

    /// Upsert cinemas keyed by `(chain, cinema_code)`
    pub fn insert_cinemas(&self, cinemas: &[Cinema]) -> Result<usize> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                r#"
                INSERT INTO cinemas (chain, cinema_code, name, latitude, longitude, brand_cd, areacode)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                ON CONFLICT (chain, cinema_code)
                DO UPDATE SET
                    name = excluded.name,
                    latitude = excluded.latitude,
                    longitude = excluded.longitude,
                    brand_cd = excluded.brand_cd,
                    areacode = excluded.areacode
                "#,
            )?;

            for cinema in cinemas {
                stmt.execute(params![
                    cinema.chain.as_str(),
                    cinema.cinema_code,
                    cinema.name,
                    cinema.latitude,
                    cinema.longitude,
                    cinema.brand_cd,
                    cinema.areacode,
                ])?;
            }
        }
        tx.commit()?;
        Ok(cinemas.len())
    }

    /// Fetch registered cinemas, optionally for one chain
    pub fn fetch_cinemas(&self, chain: Option<Chain>) -> Result<Vec<Cinema>> {
        let conn = self.conn.lock().unwrap();
        let base = "SELECT chain, cinema_code, name, latitude, longitude, brand_cd, areacode
                    FROM cinemas";

        type Raw = (
            String,
            String,
            String,
            f64,
            f64,
            Option<String>,
            Option<String>,
        );
        let map_row = |row: &rusqlite::Row<'_>| -> rusqlite::Result<Raw> {
            Ok((
                row.get(0)?,
                row.get(1)?,
                row.get(2)?,
                row.get(3)?,
                row.get(4)?,
                row.get(5)?,
                row.get(6)?,
            ))
        };

        let rows: Vec<Raw> = match chain {
            Some(c) => {
                let mut stmt = conn.prepare(&format!("{base} WHERE chain = ?1"))?;
                let rows = stmt.query_map(params![c.as_str()], map_row)?;
                rows.collect::<rusqlite::Result<_>>()?
            }
            None => {
                let mut stmt = conn.prepare(base)?;
                let rows = stmt.query_map([], map_row)?;
                rows.collect::<rusqlite::Result<_>>()?
            }
        };

        rows.into_iter()
            .map(
                |(chain_str, cinema_code, name, latitude, longitude, brand_cd, areacode)| {
                    Ok(Cinema {
                        chain: Chain::from_str(&chain_str)?,
                        cinema_code,
                        name,
                        latitude,
                        longitude,
                        brand_cd,
                        areacode,
                    })
                },
            )
            .collect()
    }

    /// Fetch stored screenings for one chain and play-date, ordered by
    /// start time
    pub fn fetch_screenings(&self, chain: Chain, date: NaiveDate) -> Result<Vec<Screening>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            r#"
            SELECT id, provider, cinema_name, cinema_code, screen_name,
                   movie_title, play_date, start_dt, end_dt, crawl_ts,
                   url, remain_seat_cnt, total_seat_cnt
            FROM screenings
            WHERE provider = ?1 AND play_date = ?2
            ORDER BY start_dt, cinema_code, screen_name
            "#,
        )?;

        type Raw = (
            String,
            String,
            String,
            String,
            String,
            String,
            String,
            String,
            String,
            String,
            Option<String>,
            Option<u32>,
            Option<u32>,
        );

        let raw_rows: Vec<Raw> = stmt
            .query_map(
                params![chain.as_str(), date.format("%Y-%m-%d").to_string()],
                |row| {
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                        row.get(5)?,
                        row.get(6)?,
                        row.get(7)?,
                        row.get(8)?,
                        row.get(9)?,
                        row.get(10)?,
                        row.get(11)?,
                        row.get(12)?,
                    ))
                },
            )?
            .collect::<rusqlite::Result<_>>()?;

        raw_rows.into_iter().map(from_raw_row).collect()
    }

    /// Register the distinct movie titles seen in a batch.
    ///
    /// Titles already known keep their poster; blanks are ignored. Returns
    /// the number of newly inserted titles.
    pub fn register_movies(&self, records: &[Screening]) -> Result<usize> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        let mut inserted = 0;
        {
            let mut stmt = tx.prepare("INSERT OR IGNORE INTO movies (title) VALUES (?1)")?;
            for record in records {
                let title = record.movie_title.trim();
                if title.is_empty() {
                    continue;
                }
                inserted += stmt.execute(params![title])?;
            }
        }
        tx.commit()?;
        Ok(inserted)
    }

    /// Movies with no poster yet, as `(id, title)` pairs
    pub fn movies_missing_posters(&self) -> Result<Vec<(i64, String)>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt =
            conn.prepare("SELECT id, title FROM movies WHERE poster_url IS NULL ORDER BY id")?;
        let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }

    pub fn set_poster_url(&self, movie_id: i64, poster_url: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE movies SET poster_url = ?1 WHERE id = ?2",
            params![poster_url, movie_id],
        )?;
        Ok(())
    }

    pub fn screening_count(&self) -> Result<u64> {
        let conn = self.conn.lock().unwrap();
        let count: u64 = conn.query_row("SELECT COUNT(*) FROM screenings", [], |row| row.get(0))?;
        Ok(count)
    }
}

fn from_raw_row(
    (
        id,
        provider,
        cinema_name,
        cinema_code,
        screen_name,
        movie_title,
        play_date,
        start_dt,
        end_dt,
        crawl_ts,
        url,
        remain_seat_cnt,
        total_seat_cnt,
    ): (
        String,
        String,
        String,
        String,
        String,
        String,
        String,
        String,
        String,
        String,
        Option<String>,
        Option<u32>,
        Option<u32>,
    ),
) -> Result<Screening> {
    Ok(Screening {
        id,
        provider: Chain::from_str(&provider)?,
        cinema_name,
        cinema_code,
        screen_name,
        movie_title,
        play_date: NaiveDate::parse_from_str(&play_date, "%Y-%m-%d")
            .map_err(|_| Error::Parse(ParseError::InvalidDate(play_date)))?,
        start_dt: ShowTime::parse(&start_dt)?,
        end_dt: ShowTime::parse(&end_dt)?,
        crawl_ts: DateTime::parse_from_rfc3339(&crawl_ts)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|_| Error::Parse(ParseError::InvalidDate(crawl_ts)))?,
        url,
        remain_seat_cnt,
        total_seat_cnt,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(start: &str, remain: Option<u32>) -> Screening {
        Screening {
            id: Screening::new_id(),
            provider: Chain::Lotte,
            cinema_name: "롯데시네마 건대입구".to_string(),
            cinema_code: "1016".to_string(),
            screen_name: "아르떼 1관".to_string(),
            movie_title: "기나긴 하루".to_string(),
            play_date: NaiveDate::from_ymd_opt(2025, 5, 26).unwrap(),
            start_dt: ShowTime::parse(start).unwrap(),
            end_dt: ShowTime::parse(start).unwrap().add_minutes(110).unwrap(),
            crawl_ts: Utc::now(),
            url: Some("https://example.com/book".to_string()),
            remain_seat_cnt: remain,
            total_seat_cnt: Some(96),
        }
    }

    #[test]
    fn test_upsert_is_idempotent_on_identity() {
        let store = ScreeningStore::in_memory().unwrap();

        store.upsert_screenings(&[sample("19:10", Some(50))]).unwrap();
        assert_eq!(store.screening_count().unwrap(), 1);

        // Re-crawl: same identity, fresher seat count
        store.upsert_screenings(&[sample("19:10", Some(42))]).unwrap();
        assert_eq!(store.screening_count().unwrap(), 1);

        let rows = store
            .fetch_screenings(Chain::Lotte, NaiveDate::from_ymd_opt(2025, 5, 26).unwrap())
            .unwrap();
        assert_eq!(rows[0].remain_seat_cnt, Some(42));
    }

    #[test]
    fn test_distinct_start_times_are_distinct_rows() {
        let store = ScreeningStore::in_memory().unwrap();
        store
            .upsert_screenings(&[sample("14:00", None), sample("19:10", None)])
            .unwrap();
        assert_eq!(store.screening_count().unwrap(), 2);
    }

    #[test]
    fn test_fetch_screenings_roundtrip_preserves_late_night_times() {
        let store = ScreeningStore::in_memory().unwrap();
        let mut record = sample("25:30", Some(10));
        record.end_dt = ShowTime::parse("27:05").unwrap();
        store.upsert_screenings(&[record]).unwrap();

        let rows = store
            .fetch_screenings(Chain::Lotte, NaiveDate::from_ymd_opt(2025, 5, 26).unwrap())
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].start_dt.to_string(), "25:30");
        assert_eq!(rows[0].end_dt.to_string(), "27:05");
    }

    #[test]
    fn test_register_movies_dedupes_titles() {
        let store = ScreeningStore::in_memory().unwrap();
        let records = [sample("14:00", None), sample("19:10", None)];

        assert_eq!(store.register_movies(&records).unwrap(), 1);
        assert_eq!(store.register_movies(&records).unwrap(), 0);

        let missing = store.movies_missing_posters().unwrap();
        assert_eq!(missing.len(), 1);
        assert_eq!(missing[0].1, "기나긴 하루");
    }

    #[test]
    fn test_set_poster_url_clears_missing() {
        let store = ScreeningStore::in_memory().unwrap();
        store.register_movies(&[sample("14:00", None)]).unwrap();

        let (id, _) = store.movies_missing_posters().unwrap()[0].clone();
        store
            .set_poster_url(id, "https://image.tmdb.org/t/p/w500/abc.jpg")
            .unwrap();
        assert!(store.movies_missing_posters().unwrap().is_empty());
    }

    #[test]
    fn test_cinema_roundtrip() {
        let store = ScreeningStore::in_memory().unwrap();
        let cinema = Cinema {
            cinema_code: "EMU01".to_string(),
            name: "에무시네마".to_string(),
            chain: Chain::Dtryx,
            latitude: 37.5759,
            longitude: 126.9697,
            brand_cd: Some("emu".to_string()),
            areacode: None,
        };

        store.insert_cinemas(std::slice::from_ref(&cinema)).unwrap();
        // Upsert refreshes, never duplicates
        store.insert_cinemas(std::slice::from_ref(&cinema)).unwrap();

        let all = store.fetch_cinemas(None).unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].chain, Chain::Dtryx);
        assert_eq!(all[0].brand_cd.as_deref(), Some("emu"));
        assert!(store.fetch_cinemas(Some(Chain::Lotte)).unwrap().is_empty());
    }
}
