//! Site-specific source adapters and their static factory
//!
//! One module per exhibitor chain. Each adapter turns one site's request
//! format and response shape into normalized [`Screening`] records; the
//! shared crawl semantics live in [`crate::crawler`].

mod dtryx;
mod kofa;
mod lotte;
mod megabox;
mod moonhwain;

pub use dtryx::DtryxSource;
pub use kofa::KofaSource;
pub use lotte::LotteSource;
pub use megabox::MegaboxSource;
pub use moonhwain::MoonhwainSource;

use std::sync::Arc;

use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::crawler::{Fetcher, ShowtimeSource};
use crate::error::{Error, Result};
use crate::models::{Chain, Cinema, Screening};

/// Shared collaborators handed to every adapter at construction
pub struct SourceContext {
    /// HTTP fetcher shared across adapters (rate limit is global)
    pub fetcher: Arc<Fetcher>,

    /// KMDb service key for the KOFA adapter
    pub kofa_service_key: Option<String>,
}

/// Chains this build carries an adapter for.
///
/// CGV and TinyTicket publish their schedules only through JavaScript-heavy
/// booking frontends and need a headless-browser pipeline to crawl.
pub fn supported() -> &'static [Chain] {
    &[
        Chain::Lotte,
        Chain::Megabox,
        Chain::Dtryx,
        Chain::Kofa,
        Chain::Moonhwain,
    ]
}

/// Build the adapter for a chain (static table, no runtime registration).
///
/// # Errors
///
/// - [`Error::NoVenues`] when the chain requires registry venues and none
///   were resolved — the run for this source must not start.
/// - [`Error::Config`] when a required credential is missing.
/// - [`Error::UnsupportedChain`] for browser-pipeline chains.
pub fn create_source(
    chain: Chain,
    venues: Vec<Cinema>,
    ctx: &SourceContext,
) -> Result<Box<dyn ShowtimeSource>> {
    match chain {
        Chain::Lotte => {
            require_venues(chain, &venues)?;
            Ok(Box::new(LotteSource::new(venues, ctx.fetcher.clone())))
        }
        Chain::Megabox => {
            require_venues(chain, &venues)?;
            Ok(Box::new(MegaboxSource::new(venues, ctx.fetcher.clone())))
        }
        Chain::Dtryx => {
            require_venues(chain, &venues)?;
            Ok(Box::new(DtryxSource::new(venues, ctx.fetcher.clone())))
        }
        Chain::Kofa => {
            let key = ctx
                .kofa_service_key
                .clone()
                .ok_or_else(|| Error::config("KOFA_SERVICE_KEY not set"))?;
            Ok(Box::new(KofaSource::new(key, ctx.fetcher.clone())))
        }
        Chain::Moonhwain => {
            require_venues(chain, &venues)?;
            Ok(Box::new(MoonhwainSource::new(venues, ctx.fetcher.clone())))
        }
        Chain::Cgv | Chain::TinyTicket => Err(Error::UnsupportedChain(chain)),
    }
}

fn require_venues(chain: Chain, venues: &[Cinema]) -> Result<()> {
    if venues.is_empty() {
        return Err(Error::NoVenues(chain));
    }
    Ok(())
}

/// Emit a record-level skip warning shared by the adapters
pub(crate) fn warn_bad_record(chain: Chain, cinema: &str, err: &impl std::fmt::Display) {
    tracing::warn!(chain = %chain, cinema = %cinema, error = %err, "skipping malformed record");
}

/// Extend `batch` with `records`, tolerating a venue-level failure.
///
/// The failed venue contributes zero records for the date; other venues
/// proceed (isolation by venue).
pub(crate) fn absorb_venue_result(
    chain: Chain,
    cinema_code: &str,
    batch: &mut Vec<Screening>,
    result: Result<Vec<Screening>>,
) {
    match result {
        Ok(mut records) => batch.append(&mut records),
        Err(e) => {
            tracing::warn!(
                chain = %chain,
                cinema = %cinema_code,
                error = %e,
                "venue fetch failed, skipping"
            );
        }
    }
}

/// Deserialize a JSON value that may arrive as a string or a number
pub(crate) fn flex_string<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Option<String>, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(Some(s)),
        Value::Number(n) => Ok(Some(n.to_string())),
        Value::Null => Ok(None),
        _ => Ok(None),
    }
}

/// Deserialize a count field that may arrive as a number or numeric string
pub(crate) fn flex_u32<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Option<u32>, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::Number(n) => Ok(n.as_u64().and_then(|v| u32::try_from(v).ok())),
        Value::String(s) => Ok(s.trim().parse::<u32>().ok()),
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn test_ctx(kofa_key: Option<&str>) -> SourceContext {
        SourceContext {
            fetcher: Arc::new(
                Fetcher::with_config(10, 0, Duration::from_secs(2), None).unwrap(),
            ),
            kofa_service_key: kofa_key.map(str::to_string),
        }
    }

    fn venue(chain: Chain) -> Cinema {
        Cinema {
            cinema_code: "1016".to_string(),
            name: "테스트극장".to_string(),
            chain,
            latitude: 37.54,
            longitude: 127.07,
            brand_cd: None,
            areacode: None,
        }
    }

    #[test]
    fn test_factory_builds_supported_chains() {
        let ctx = test_ctx(Some("key"));
        for &chain in supported() {
            let venues = vec![venue(chain)];
            let source = create_source(chain, venues, &ctx).unwrap();
            assert_eq!(source.chain(), chain);
        }
    }

    #[test]
    fn test_factory_rejects_empty_venue_list() {
        let ctx = test_ctx(None);
        let err = create_source(Chain::Lotte, Vec::new(), &ctx).unwrap_err();
        assert!(matches!(err, Error::NoVenues(Chain::Lotte)));
    }

    #[test]
    fn test_factory_requires_kofa_key() {
        let ctx = test_ctx(None);
        let err = create_source(Chain::Kofa, Vec::new(), &ctx).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_factory_rejects_browser_chains() {
        let ctx = test_ctx(None);
        for chain in [Chain::Cgv, Chain::TinyTicket] {
            let err = create_source(chain, vec![venue(chain)], &ctx).unwrap_err();
            assert!(matches!(err, Error::UnsupportedChain(_)));
        }
    }

    #[test]
    fn test_flex_u32_accepts_string_and_number() {
        #[derive(serde::Deserialize)]
        struct Row {
            #[serde(default, deserialize_with = "flex_u32")]
            n: Option<u32>,
        }

        let a: Row = serde_json::from_str(r#"{"n": 42}"#).unwrap();
        assert_eq!(a.n, Some(42));
        let b: Row = serde_json::from_str(r#"{"n": "42"}"#).unwrap();
        assert_eq!(b.n, Some(42));
        let c: Row = serde_json::from_str(r#"{"n": null}"#).unwrap();
        assert_eq!(c.n, None);
    }
}
