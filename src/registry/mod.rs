//! Venue registry
//!
//! The crawl plan is venue-driven: each adapter only visits the cinemas the
//! registry resolves for its chain. Venues come from a JSON snapshot file or
//! from the cinema table of an existing store.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use crate::error::{Error, Result};
use crate::models::{Chain, Cinema};
use crate::storage::ScreeningStore;

#[derive(Debug)]
pub struct VenueRegistry {
    venues: Vec<Cinema>,
}

impl VenueRegistry {
    /// Build a registry, rejecting duplicate `(chain, cinema_code)` pairs.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] on a duplicate pair, since a duplicated
    /// venue would be crawled twice and double its records.
    pub fn new(venues: Vec<Cinema>) -> Result<Self> {
        let mut seen = HashSet::new();
        for venue in &venues {
            if !seen.insert((venue.chain, venue.cinema_code.clone())) {
                return Err(Error::config(format!(
                    "duplicate venue {}/{} in registry",
                    venue.chain, venue.cinema_code
                )));
            }
        }
        Ok(Self { venues })
    }

    /// Load from a JSON snapshot file (an array of cinema objects)
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        let venues: Vec<Cinema> = serde_json::from_str(&raw)?;
        Self::new(venues)
    }

    /// Load from the cinema table of a store
    pub fn from_store(store: &ScreeningStore) -> Result<Self> {
        Self::new(store.fetch_cinemas(None)?)
    }

    /// All venues registered for one chain
    pub fn for_chain(&self, chain: Chain) -> Vec<Cinema> {
        self.venues
            .iter()
            .filter(|v| v.chain == chain)
            .cloned()
            .collect()
    }

    pub fn venues(&self) -> &[Cinema] {
        &self.venues
    }

    pub fn len(&self) -> usize {
        self.venues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.venues.is_empty()
    }
}
