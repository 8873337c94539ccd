//! Crawl run orchestration
//!
//! One run crawls a set of chains against a shared store. Sources are
//! isolated from each other: a chain that blows up is recorded as failed
//! and the remaining chains still run to completion.

use std::fmt;
use std::sync::Arc;

use chrono::NaiveDate;

use crate::config::Config;
use crate::crawler::{Fetcher, ShowtimeSource};
use crate::error::Result;
use crate::models::Chain;
use crate::registry::VenueRegistry;
use crate::sources::{create_source, SourceContext};
use crate::storage::ScreeningStore;

/// Parameters for one crawl run
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Chains to crawl, in order
    pub chains: Vec<Chain>,

    /// First date to crawl (default: today, source-local)
    pub start_date: Option<NaiveDate>,

    /// Cap on distinct dates per source
    pub max_days: Option<u32>,

    /// Crawl and report, but write nothing
    pub dry_run: bool,
}

/// What happened to one chain during a run
#[derive(Debug)]
pub enum SourceOutcome {
    Crawled {
        chain: Chain,
        screenings: usize,
        stored: usize,
    },
    Failed {
        chain: Chain,
        error: String,
    },
}

/// Aggregated result of a whole run
#[derive(Debug, Default)]
pub struct RunReport {
    pub outcomes: Vec<SourceOutcome>,
}

impl RunReport {
    pub fn total_screenings(&self) -> usize {
        self.outcomes
            .iter()
            .map(|o| match o {
                SourceOutcome::Crawled { screenings, .. } => *screenings,
                SourceOutcome::Failed { .. } => 0,
            })
            .sum()
    }

    pub fn failed_chains(&self) -> Vec<Chain> {
        self.outcomes
            .iter()
            .filter_map(|o| match o {
                SourceOutcome::Failed { chain, .. } => Some(*chain),
                SourceOutcome::Crawled { .. } => None,
            })
            .collect()
    }

    /// True when every requested chain failed
    pub fn all_failed(&self) -> bool {
        !self.outcomes.is_empty() && self.failed_chains().len() == self.outcomes.len()
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for outcome in &self.outcomes {
            match outcome {
                SourceOutcome::Crawled {
                    chain,
                    screenings,
                    stored,
                } => writeln!(f, "{chain}: {screenings} screenings ({stored} stored)")?,
                SourceOutcome::Failed { chain, error } => {
                    writeln!(f, "{chain}: FAILED ({error})")?
                }
            }
        }
        write!(f, "total: {} screenings", self.total_screenings())
    }
}

/// Crawl every requested chain and persist the results.
///
/// Adapter construction failures (missing venues, missing credentials,
/// unsupported chains) and run failures are both absorbed into the report
/// as [`SourceOutcome::Failed`].
pub async fn run_all(
    config: &Config,
    run: &RunConfig,
    registry: &VenueRegistry,
    store: &ScreeningStore,
) -> Result<RunReport> {
    let fetcher = Arc::new(Fetcher::new(&config.crawler)?);
    let ctx = SourceContext {
        fetcher,
        kofa_service_key: config.kofa.service_key.clone(),
    };

    let report = run_with_factory(
        |chain| create_source(chain, registry.for_chain(chain), &ctx),
        run,
        store,
    )
    .await;
    Ok(report)
}

/// Run every requested chain against sources produced by `factory`.
///
/// This is the isolation boundary: a factory error or a source failure is
/// one [`SourceOutcome::Failed`] entry and the remaining chains still run.
pub async fn run_with_factory<F>(factory: F, run: &RunConfig, store: &ScreeningStore) -> RunReport
where
    F: Fn(Chain) -> Result<Box<dyn ShowtimeSource>>,
{
    let mut report = RunReport::default();
    for &chain in &run.chains {
        let outcome = match factory(chain) {
            Ok(source) => crawl_source(source.as_ref(), run, store).await,
            Err(e) => SourceOutcome::Failed {
                chain,
                error: e.to_string(),
            },
        };
        match &outcome {
            SourceOutcome::Crawled {
                screenings, stored, ..
            } => {
                tracing::info!(chain = %chain, screenings, stored, "chain finished");
            }
            SourceOutcome::Failed { error, .. } => {
                tracing::error!(chain = %chain, error = %error, "chain failed");
            }
        }
        report.outcomes.push(outcome);
    }
    report
}

async fn crawl_source(
    source: &dyn ShowtimeSource,
    run: &RunConfig,
    store: &ScreeningStore,
) -> SourceOutcome {
    let chain = source.chain();

    let records = match source.run(run.start_date, run.max_days).await {
        Ok(records) => records,
        Err(e) => {
            return SourceOutcome::Failed {
                chain,
                error: e.to_string(),
            }
        }
    };

    let screenings = records.len();
    if run.dry_run {
        return SourceOutcome::Crawled {
            chain,
            screenings,
            stored: 0,
        };
    }

    let stored = match store
        .upsert_screenings(&records)
        .and_then(|stored| store.register_movies(&records).map(|_| stored))
    {
        Ok(stored) => stored,
        Err(e) => {
            return SourceOutcome::Failed {
                chain,
                error: e.to_string(),
            }
        }
    };

    SourceOutcome::Crawled {
        chain,
        screenings,
        stored,
    }
}
