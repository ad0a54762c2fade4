//! Adapter trait for upstream regulatory data sources.
//!
//! This module defines [`SourceAdapter`], the seam between the engine and
//! external fact providers. Adapters fetch *all* reported facts for one
//! (entity, concept) pair so the store can cache the full result set and
//! serve later period requests without another upstream call.

use async_trait::async_trait;
use std::fmt::Debug;

use crate::{
    error::Result,
    types::{ConceptId, Fact, Ticker},
};

/// An upstream source of regulatory facts.
///
/// Implementations perform network I/O and must be cheap to share behind an
/// `Arc`. Rate limiting, timeouts, and retries are applied by the store, not
/// by individual adapters.
#[async_trait]
pub trait SourceAdapter: Send + Sync + Debug {
    /// Returns the name of this adapter (e.g. "sec-edgar").
    ///
    /// The name is recorded on every fact the adapter produces and appears in
    /// citations, so it must be stable.
    fn name(&self) -> &str;

    /// Returns a description of this adapter.
    fn description(&self) -> &str;

    /// Fetches every reported fact for a concept across all of the entity's
    /// filings, most recent period first.
    ///
    /// Returns an empty vector when the entity exists but has never reported
    /// under this concept; returns [`EntityNotFound`] when the entity itself
    /// is unknown to this source.
    ///
    /// [`EntityNotFound`]: crate::error::EngineError::EntityNotFound
    async fn fetch_all_facts(&self, ticker: &Ticker, concept: &ConceptId) -> Result<Vec<Fact>>;
}
