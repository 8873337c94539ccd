//! Shared HTTP fetcher for exhibitor sites
//!
//! Every adapter funnels its outbound requests through this fetcher, which
//! provides:
//! - Rate limiting with governor
//! - Automatic retry with exponential backoff for transient failures
//! - User-Agent rotation (the ticketing endpoints reject obvious bots)
//! - UTF-8 decoding with EUC-KR fallback for the older Korean sites

use crate::config::CrawlerConfig;
use crate::error::FetchError;
use encoding_rs::{EUC_KR, UTF_8};
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use rand::seq::SliceRandom;
use reqwest::{
    header::{HeaderMap, HeaderValue, ACCEPT_LANGUAGE, USER_AGENT},
    Client, Method, Response,
};
use std::num::NonZeroU32;
use std::time::Duration;

/// Pool of realistic User-Agent strings for rotation
const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:126.0) Gecko/20100101 Firefox/126.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Safari/605.1.15",
];

/// Request body shapes the adapters need
#[derive(Debug, Clone)]
enum Payload {
    None,
    Form(Vec<(String, String)>),
    Json(serde_json::Value),
}

/// HTTP fetcher shared across source adapters
pub struct Fetcher {
    /// HTTP client with configured timeout and compression
    client: Client,

    /// Rate limiter to control request frequency across all adapters
    rate_limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,

    /// Maximum number of retry attempts for failed requests
    max_retries: u32,

    /// Base delay in milliseconds for exponential backoff
    base_delay_ms: u64,

    /// Fixed User-Agent override; None rotates the pool
    user_agent: Option<String>,
}

impl Fetcher {
    /// Create a fetcher from crawler configuration
    ///
    /// # Errors
    ///
    /// Returns `FetchError::Http` if the HTTP client cannot be created
    pub fn new(config: &CrawlerConfig) -> Result<Self, FetchError> {
        Self::with_config(
            config.rate_limit,
            config.max_retries,
            Duration::from_secs(config.request_timeout_secs),
            config.user_agent.clone(),
        )
    }

    /// Create a fetcher with explicit settings
    ///
    /// # Errors
    ///
    /// Returns `FetchError::Http` if the HTTP client cannot be created
    pub fn with_config(
        requests_per_second: u32,
        max_retries: u32,
        timeout: Duration,
        user_agent: Option<String>,
    ) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(timeout)
            .gzip(true)
            .cookie_store(true)
            .build()?;

        let rate = NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::new(1).unwrap());
        let rate_limiter = RateLimiter::direct(Quota::per_second(rate));

        Ok(Self {
            client,
            rate_limiter,
            max_retries,
            base_delay_ms: 1000,
            user_agent,
        })
    }

    /// GET a URL and return the decoded body
    pub async fn get(
        &self,
        url: &str,
        query: &[(&str, String)],
        headers: HeaderMap,
    ) -> Result<String, FetchError> {
        let query: Vec<(String, String)> = query
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect();
        self.send_with_retry(Method::GET, url, query, headers, Payload::None)
            .await
    }

    /// POST a form-urlencoded body and return the decoded response body
    pub async fn post_form(
        &self,
        url: &str,
        form: &[(&str, String)],
        headers: HeaderMap,
    ) -> Result<String, FetchError> {
        let form: Vec<(String, String)> = form
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect();
        self.send_with_retry(Method::POST, url, Vec::new(), headers, Payload::Form(form))
            .await
    }

    /// POST a JSON body and return the decoded response body
    pub async fn post_json(
        &self,
        url: &str,
        body: &serde_json::Value,
        headers: HeaderMap,
    ) -> Result<String, FetchError> {
        self.send_with_retry(
            Method::POST,
            url,
            Vec::new(),
            headers,
            Payload::Json(body.clone()),
        )
        .await
    }

    /// Send with rate limiting and exponential backoff retry
    async fn send_with_retry(
        &self,
        method: Method,
        url: &str,
        query: Vec<(String, String)>,
        headers: HeaderMap,
        payload: Payload,
    ) -> Result<String, FetchError> {
        let mut last_error = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = self.base_delay_ms * 2_u64.pow(attempt - 1);
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }

            self.rate_limiter.until_ready().await;

            let mut request = self
                .client
                .request(method.clone(), url)
                .headers(self.build_headers(&headers));
            if !query.is_empty() {
                request = request.query(&query);
            }
            request = match &payload {
                Payload::None => request,
                Payload::Form(form) => request.form(form),
                Payload::Json(body) => request.json(body),
            };

            match request.send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return self.decode_response(response).await;
                    } else if Self::should_retry(status.as_u16()) {
                        last_error = Some(FetchError::ServerError(status.as_u16()));
                        continue;
                    } else {
                        return Err(FetchError::ServerError(status.as_u16()));
                    }
                }
                Err(e) => {
                    if e.is_timeout() {
                        last_error = Some(FetchError::Timeout);
                    } else {
                        last_error = Some(FetchError::Http(e));
                    }
                }
            }
        }

        Err(last_error.unwrap_or(FetchError::MaxRetriesExceeded))
    }

    /// Determine if a status code should trigger a retry
    ///
    /// Retry on 429 and transient 5xx; never on other 4xx.
    fn should_retry(status: u16) -> bool {
        matches!(status, 429 | 500 | 502 | 503 | 504)
    }

    /// Decode response body handling both UTF-8 and EUC-KR encodings
    async fn decode_response(&self, response: Response) -> Result<String, FetchError> {
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string())
            .unwrap_or_default();

        let bytes = response.bytes().await?;
        self.decode_bytes(&bytes, &content_type)
    }

    /// Decode bytes to a UTF-8 string with encoding detection
    ///
    /// Most exhibitor endpoints answer UTF-8 JSON, but some of the older
    /// reservation frontends still serve EUC-KR HTML.
    pub fn decode_bytes(&self, bytes: &[u8], content_type: &str) -> Result<String, FetchError> {
        let ct = content_type.to_lowercase();
        if ct.contains("charset=euc-kr") {
            return self.decode_euc_kr(bytes);
        }
        if ct.contains("charset=utf-8") {
            return self.decode_utf8(bytes);
        }

        if let Ok(text) = self.decode_utf8(bytes) {
            if !text.starts_with('\u{FFFD}') {
                return Ok(text);
            }
        }

        if let Ok(text) = self.decode_euc_kr(bytes) {
            return Ok(text);
        }

        Err(FetchError::Decode(
            "Failed to decode content with UTF-8 or EUC-KR".to_string(),
        ))
    }

    fn decode_utf8(&self, bytes: &[u8]) -> Result<String, FetchError> {
        let (cow, _encoding, had_errors) = UTF_8.decode(bytes);
        if had_errors {
            return Err(FetchError::Decode("UTF-8 decoding errors".to_string()));
        }
        Ok(cow.into_owned())
    }

    fn decode_euc_kr(&self, bytes: &[u8]) -> Result<String, FetchError> {
        let (cow, _encoding, had_errors) = EUC_KR.decode(bytes);
        if had_errors {
            return Err(FetchError::Decode("EUC-KR decoding errors".to_string()));
        }
        Ok(cow.into_owned())
    }

    /// Merge caller headers with the fetcher's defaults
    fn build_headers(&self, extra: &HeaderMap) -> HeaderMap {
        let mut headers = HeaderMap::new();

        let agent = match &self.user_agent {
            Some(ua) => HeaderValue::from_str(ua)
                .unwrap_or_else(|_| HeaderValue::from_static(USER_AGENTS[0])),
            None => HeaderValue::from_static(self.random_user_agent()),
        };
        headers.insert(USER_AGENT, agent);
        headers.insert(
            ACCEPT_LANGUAGE,
            HeaderValue::from_static("ko-KR,ko;q=0.9,en-US;q=0.8,en;q=0.7"),
        );

        for (name, value) in extra {
            headers.insert(name, value.clone());
        }

        headers
    }

    /// Get a random user agent from the pool
    fn random_user_agent(&self) -> &'static str {
        let mut rng = rand::thread_rng();
        USER_AGENTS.choose(&mut rng).unwrap_or(&USER_AGENTS[0])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_fetcher() -> Fetcher {
        Fetcher::with_config(10, 3, Duration::from_secs(5), None).unwrap()
    }

    #[test]
    fn test_user_agent_rotation() {
        let fetcher = test_fetcher();

        let mut agents = std::collections::HashSet::new();
        for _ in 0..100 {
            let agent = fetcher.random_user_agent();
            assert!(USER_AGENTS.contains(&agent));
            agents.insert(agent);
        }
        assert!(agents.len() > 1, "User agents should rotate");
    }

    #[test]
    fn test_fixed_user_agent_wins() {
        let fetcher =
            Fetcher::with_config(10, 3, Duration::from_secs(5), Some("simya/0.1".to_string()))
                .unwrap();
        let headers = fetcher.build_headers(&HeaderMap::new());
        assert_eq!(headers.get(USER_AGENT).unwrap(), "simya/0.1");
    }

    #[test]
    fn test_decode_utf8() {
        let fetcher = test_fetcher();
        let text = "심야상영 25:30";
        let decoded = fetcher.decode_bytes(text.as_bytes(), "application/json; charset=utf-8");
        assert_eq!(decoded.unwrap(), text);
    }

    #[test]
    fn test_decode_euc_kr_fallback() {
        let fetcher = test_fetcher();
        // "안녕하세요" in EUC-KR, no charset declared
        let euc_kr_bytes: &[u8] = &[0xbe, 0xc8, 0xb3, 0xe7, 0xc7, 0xcf, 0xbc, 0xbc, 0xbf, 0xe4];
        let decoded = fetcher.decode_bytes(euc_kr_bytes, "text/html");
        assert_eq!(decoded.unwrap(), "안녕하세요");
    }

    #[test]
    fn test_should_retry() {
        assert!(Fetcher::should_retry(429));
        assert!(Fetcher::should_retry(500));
        assert!(Fetcher::should_retry(503));

        assert!(!Fetcher::should_retry(400));
        assert!(!Fetcher::should_retry(403));
        assert!(!Fetcher::should_retry(404));
        assert!(!Fetcher::should_retry(200));
    }

    #[test]
    fn test_extra_headers_merged() {
        let fetcher = test_fetcher();
        let mut extra = HeaderMap::new();
        extra.insert("X-Requested-With", HeaderValue::from_static("XMLHttpRequest"));

        let headers = fetcher.build_headers(&extra);
        assert_eq!(headers.get("X-Requested-With").unwrap(), "XMLHttpRequest");
        assert!(headers.contains_key(USER_AGENT));
        assert!(headers.contains_key(ACCEPT_LANGUAGE));
    }
}
