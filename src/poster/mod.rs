//! Poster lookup against the TMDB search API
//!
//! A best-effort enrichment pass, fully decoupled from crawling: it walks
//! the movie titles with no poster yet and asks TMDB for each one. Lookups
//! that find nothing are logged and skipped, never failed.

use std::time::Duration;

use serde::Deserialize;

use crate::error::{FetchError, Result};
use crate::storage::ScreeningStore;

const SEARCH_URL: &str = "https://api.themoviedb.org/3/search/movie";
const IMAGE_BASE: &str = "https://image.tmdb.org/t/p/w500";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

pub struct PosterUpdater {
    client: reqwest::Client,
    api_token: String,
    search_url: String,
    image_base: String,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchResult>,
}

#[derive(Debug, Deserialize)]
struct SearchResult {
    poster_path: Option<String>,
}

impl PosterUpdater {
    pub fn new(api_token: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(FetchError::Http)?;

        Ok(Self {
            client,
            api_token,
            search_url: SEARCH_URL.to_string(),
            image_base: IMAGE_BASE.to_string(),
        })
    }

    /// Point the updater at a mock server
    pub fn with_endpoints(
        mut self,
        search_url: impl Into<String>,
        image_base: impl Into<String>,
    ) -> Self {
        self.search_url = search_url.into();
        self.image_base = image_base.into();
        self
    }

    /// Resolve a full poster URL for a title, or `None` when the search
    /// yields nothing usable
    pub async fn lookup_poster(&self, title: &str) -> Result<Option<String>> {
        let response = self
            .client
            .get(&self.search_url)
            .bearer_auth(&self.api_token)
            .header("accept", "application/json")
            .query(&[("query", title)])
            .send()
            .await
            .map_err(FetchError::Http)?
            .error_for_status()
            .map_err(FetchError::Http)?;

        let body: SearchResponse = response.json().await.map_err(FetchError::Http)?;

        Ok(body
            .results
            .first()
            .and_then(|r| r.poster_path.as_deref())
            .map(|path| format!("{}{}", self.image_base, path)))
    }

    /// Fill in posters for every movie that has none.
    ///
    /// Returns the number of movies actually updated. Individual lookup
    /// failures are logged and skipped so one flaky title cannot stall the
    /// whole pass.
    pub async fn update_missing(&self, store: &ScreeningStore) -> Result<usize> {
        let pending = store.movies_missing_posters()?;
        tracing::info!(count = pending.len(), "movies awaiting posters");

        let mut updated = 0;
        for (movie_id, title) in pending {
            if title.trim().is_empty() {
                continue;
            }

            match self.lookup_poster(&title).await {
                Ok(Some(url)) => {
                    store.set_poster_url(movie_id, &url)?;
                    tracing::debug!(title = %title, "poster stored");
                    updated += 1;
                }
                Ok(None) => {
                    tracing::debug!(title = %title, "no poster found");
                }
                Err(e) => {
                    tracing::warn!(title = %title, error = %e, "poster lookup failed, skipping");
                }
            }
        }

        tracing::info!(updated, "poster pass finished");
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_lookup_poster_builds_full_url() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/3/search/movie"))
            .and(query_param("query", "하녀"))
            .and(header("Authorization", "Bearer test-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "results": [{"poster_path": "/abc123.jpg"}]
            })))
            .mount(&server)
            .await;

        let updater = PosterUpdater::new("test-token".to_string())
            .unwrap()
            .with_endpoints(format!("{}/3/search/movie", server.uri()), "https://img.example");

        let url = updater.lookup_poster("하녀").await.unwrap();
        assert_eq!(url.as_deref(), Some("https://img.example/abc123.jpg"));
    }

    #[tokio::test]
    async fn test_lookup_poster_empty_results() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/3/search/movie"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"results": []})),
            )
            .mount(&server)
            .await;

        let updater = PosterUpdater::new("t".to_string())
            .unwrap()
            .with_endpoints(format!("{}/3/search/movie", server.uri()), IMAGE_BASE);

        assert!(updater.lookup_poster("무명작").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_missing_tolerates_lookup_failure() {
        let server = MockServer::start().await;
        // Every search fails server-side
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let store = ScreeningStore::in_memory().unwrap();
        let record = crate::models::Screening {
            id: crate::models::Screening::new_id(),
            provider: crate::models::Chain::Kofa,
            cinema_name: "시네마테크KOFA".to_string(),
            cinema_code: "KOFA".to_string(),
            screen_name: "2관".to_string(),
            movie_title: "오발탄".to_string(),
            play_date: chrono::NaiveDate::from_ymd_opt(2025, 5, 26).unwrap(),
            start_dt: crate::models::ShowTime::parse("19:00").unwrap(),
            end_dt: crate::models::ShowTime::parse("21:00").unwrap(),
            crawl_ts: chrono::Utc::now(),
            url: None,
            remain_seat_cnt: None,
            total_seat_cnt: None,
        };
        store.register_movies(std::slice::from_ref(&record)).unwrap();

        let updater = PosterUpdater::new("t".to_string())
            .unwrap()
            .with_endpoints(format!("{}/3/search/movie", server.uri()), IMAGE_BASE);

        let updated = updater.update_missing(&store).await.unwrap();
        assert_eq!(updated, 0);
        // Still pending for the next pass
        assert_eq!(store.movies_missing_posters().unwrap().len(), 1);
    }
}
