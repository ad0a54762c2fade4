#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/fincalc/fincalc/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Lazily populated per-entity fact cache.
//!
//! The [`FactStore`] sits between the calculation engine and upstream
//! adapters:
//!
//! - cache misses dispatch to registered adapters in order until one yields
//!   the facts (ordered fallback),
//! - concurrent fetches for one (entity, concept) key share a single upstream
//!   call (single-flight); waiters that disconnect never cancel the fetch for
//!   the others,
//! - every upstream call is guarded by a per-adapter token bucket, a hard
//!   timeout, and bounded exponential-backoff retries,
//! - the *full* fact set per concept is cached, so later period requests for
//!   the same concept are cache hits.

/// Per-entity cached fact sets.
mod entity;
/// Bounded exponential backoff.
pub mod retry;
/// Per-adapter token buckets.
pub mod throttle;

pub use retry::BackoffPolicy;
pub use throttle::AdapterThrottle;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, instrument, warn};

use fincalc_core::{
    ConceptAlias, ConceptId, EngineError, Fact, PeriodSelector, QualityFlag, Result, SourceAdapter,
    Ticker,
};

use entity::EntityCache;

/// Default cache TTL. Raw filings rarely change once published.
pub const DEFAULT_TTL: Duration = Duration::from_secs(12 * 60 * 60);

/// Default hard timeout for one upstream call.
pub const DEFAULT_UPSTREAM_TIMEOUT: Duration = Duration::from_secs(10);

/// Default upstream rate limit per adapter, in calls per second.
pub const DEFAULT_ADAPTER_RATE: u32 = 10;

/// Tuning knobs for the store.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// How long cached fact sets stay fresh.
    pub ttl: Duration,
    /// Hard timeout applied to each upstream call.
    pub upstream_timeout: Duration,
    /// Retry schedule for failing upstream calls.
    pub backoff: BackoffPolicy,
    /// Token-bucket rate applied to each adapter, calls per second.
    pub adapter_rate_per_second: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_TTL,
            upstream_timeout: DEFAULT_UPSTREAM_TIMEOUT,
            backoff: BackoffPolicy::default(),
            adapter_rate_per_second: DEFAULT_ADAPTER_RATE,
        }
    }
}

/// An adapter together with its rate-limit state.
#[derive(Debug)]
struct RegisteredAdapter {
    adapter: Arc<dyn SourceAdapter>,
    throttle: AdapterThrottle,
}

type FetchKey = (Ticker, ConceptId);
type SharedFetch = Shared<BoxFuture<'static, Result<Arc<Vec<Fact>>>>>;

/// Per-entity fact cache backed by registered upstream adapters.
///
/// The store is the only shared mutable state between concurrent calculation
/// requests; reads and single-flight writes are safe to issue from any task.
#[derive(Debug)]
pub struct FactStore {
    adapters: Arc<Vec<RegisteredAdapter>>,
    config: StoreConfig,
    entities: RwLock<HashMap<Ticker, EntityCache>>,
    inflight: Mutex<HashMap<FetchKey, SharedFetch>>,
}

impl FactStore {
    /// Creates a store with the given configuration and adapters.
    ///
    /// Adapter order is fallback order: the first adapter that yields a
    /// non-empty result wins.
    #[must_use]
    pub fn new(config: StoreConfig, adapters: Vec<Arc<dyn SourceAdapter>>) -> Self {
        let rate = config.adapter_rate_per_second;
        let adapters = adapters
            .into_iter()
            .map(|adapter| {
                debug!(adapter = adapter.name(), "Registering source adapter");
                RegisteredAdapter {
                    adapter,
                    throttle: AdapterThrottle::per_second(rate),
                }
            })
            .collect();

        Self {
            adapters: Arc::new(adapters),
            config,
            entities: RwLock::new(HashMap::new()),
            inflight: Mutex::new(HashMap::new()),
        }
    }

    /// Names of the registered adapters, in fallback order.
    #[must_use]
    pub fn source_names(&self) -> Vec<String> {
        self.adapters
            .iter()
            .map(|reg| reg.adapter.name().to_string())
            .collect()
    }

    /// Number of registered adapters.
    #[must_use]
    pub fn source_count(&self) -> usize {
        self.adapters.len()
    }

    /// Returns all facts reported for the concept, fetching upstream on a
    /// cache miss.
    ///
    /// Concurrent callers for the same key await one shared upstream call.
    /// The fetch runs on a detached task, so a caller that goes away does not
    /// cancel the fetch for the remaining waiters.
    #[instrument(skip(self), fields(%ticker, %concept))]
    pub async fn facts_for(&self, ticker: &Ticker, concept: &ConceptId) -> Result<Arc<Vec<Fact>>> {
        if let Some(hit) = self.cached(ticker, concept).await {
            debug!(%ticker, %concept, "Fact cache hit");
            return Ok(hit);
        }

        let key = (ticker.clone(), concept.clone());
        let fetch = {
            let mut inflight = self.inflight.lock().await;
            if let Some(existing) = inflight.get(&key) {
                debug!(%ticker, %concept, "Joining in-flight fetch");
                existing.clone()
            } else {
                debug!(%ticker, %concept, "Dispatching upstream fetch");
                let adapters = Arc::clone(&self.adapters);
                let config = self.config.clone();
                let (t, c) = (ticker.clone(), concept.clone());
                let handle = tokio::spawn(async move {
                    fetch_with_fallback(&adapters, &config, &t, &c).await
                });
                let fetch: SharedFetch = async move {
                    match handle.await {
                        Ok(result) => result,
                        Err(join) => Err(EngineError::Internal(format!(
                            "upstream fetch task failed: {join}"
                        ))),
                    }
                }
                .boxed()
                .shared();
                inflight.insert(key.clone(), fetch.clone());
                fetch
            }
        };

        let result = fetch.await;

        if let Ok(facts) = &result {
            let mut entities = self.entities.write().await;
            entities
                .entry(ticker.clone())
                .or_default()
                .insert(concept.clone(), Arc::clone(facts));
        }
        self.inflight.lock().await.remove(&key);

        result
    }

    /// Resolves one fact through an alias chain for the requested period.
    ///
    /// Concepts are tried in alias order; a hit through a non-primary concept
    /// carries a fallback flag. Resolution is deterministic: the same alias
    /// wins for the same cached data every time.
    pub async fn fact_for(
        &self,
        ticker: &Ticker,
        alias: &ConceptAlias,
        selector: &PeriodSelector,
    ) -> Result<(Fact, Option<QualityFlag>)> {
        for (rank, concept) in alias.concepts.iter().enumerate() {
            let facts = self.facts_for(ticker, concept).await?;
            let hit = facts
                .iter()
                .filter(|fact| selector.matches(&fact.period))
                .max_by_key(|fact| fact.period.end_date);

            if let Some(fact) = hit {
                let flag = (rank > 0).then(|| QualityFlag::FallbackConcept(concept.clone()));
                return Ok((fact.clone(), flag));
            }
        }

        Err(EngineError::PeriodNotFound {
            ticker: ticker.to_string(),
            period: selector.to_string(),
        })
    }

    /// Fetches facts from one named adapter, bypassing cache and fallback.
    ///
    /// Used by cross-source reconciliation, which needs each source's own
    /// answer rather than the first one that responds.
    pub async fn facts_from_source(
        &self,
        source: &str,
        ticker: &Ticker,
        concept: &ConceptId,
    ) -> Result<Vec<Fact>> {
        let reg = self
            .adapters
            .iter()
            .find(|reg| reg.adapter.name() == source)
            .ok_or_else(|| EngineError::Internal(format!("no adapter named '{source}'")))?;

        let facts = fetch_one(reg, &self.config, ticker, concept).await?;
        Ok(facts)
    }

    /// Drops all cached facts for one entity.
    pub async fn invalidate(&self, ticker: &Ticker) {
        let removed = self.entities.write().await.remove(ticker).is_some();
        if removed {
            debug!(%ticker, "Invalidated entity cache");
        }
    }

    /// Drops cache entries older than the configured TTL; returns the count.
    pub async fn invalidate_stale(&self) -> usize {
        let mut entities = self.entities.write().await;
        let mut removed = 0;
        entities.retain(|_, cache| {
            removed += cache.invalidate_stale(self.config.ttl);
            !cache.is_empty()
        });
        removed
    }

    /// Clears the whole cache.
    pub async fn clear(&self) {
        self.entities.write().await.clear();
    }

    async fn cached(&self, ticker: &Ticker, concept: &ConceptId) -> Option<Arc<Vec<Fact>>> {
        let entities = self.entities.read().await;
        entities.get(ticker)?.get(concept, self.config.ttl)
    }
}

/// Walks adapters in order until one yields facts.
///
/// Adapter failures are logged and the next adapter is tried; only when every
/// adapter has failed does the error escalate. An entity unknown to every
/// source stays `EntityNotFound` rather than `DataUnavailable`.
async fn fetch_with_fallback(
    adapters: &[RegisteredAdapter],
    config: &StoreConfig,
    ticker: &Ticker,
    concept: &ConceptId,
) -> Result<Arc<Vec<Fact>>> {
    if adapters.is_empty() {
        return Err(EngineError::Internal("no source adapters registered".to_string()));
    }

    let mut last_error = None;
    for reg in adapters {
        match fetch_one(reg, config, ticker, concept).await {
            Ok(facts) => return Ok(Arc::new(facts)),
            Err(e) => {
                warn!(
                    adapter = reg.adapter.name(),
                    %ticker,
                    %concept,
                    error = %e,
                    "Adapter failed, trying next"
                );
                last_error = Some(e);
            }
        }
    }

    match last_error {
        Some(EngineError::EntityNotFound(t)) => Err(EngineError::EntityNotFound(t)),
        Some(e) => Err(EngineError::DataUnavailable {
            ticker: ticker.to_string(),
            concept: concept.to_string(),
            detail: e.to_string(),
        }),
        None => Err(EngineError::Internal("no source adapters registered".to_string())),
    }
}

/// One adapter call with throttle, timeout, and bounded retries.
async fn fetch_one(
    reg: &RegisteredAdapter,
    config: &StoreConfig,
    ticker: &Ticker,
    concept: &ConceptId,
) -> Result<Vec<Fact>> {
    let mut attempt = 0;
    loop {
        reg.throttle.acquire().await;

        let call = reg.adapter.fetch_all_facts(ticker, concept);
        let outcome = match tokio::time::timeout(config.upstream_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(EngineError::Network(format!(
                "{} timed out after {:?}",
                reg.adapter.name(),
                config.upstream_timeout
            ))),
        };

        match outcome {
            Ok(facts) => return Ok(facts),
            // Not a transient failure; retrying cannot help.
            Err(e @ EngineError::EntityNotFound(_)) => return Err(e),
            Err(e) => match config.backoff.delay_after(attempt) {
                Some(delay) => {
                    debug!(
                        adapter = reg.adapter.name(),
                        attempt,
                        ?delay,
                        error = %e,
                        "Retrying upstream call"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                None => return Err(e),
            },
        }
    }
}
