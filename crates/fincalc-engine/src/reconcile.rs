//! Cross-source reconciliation of a single fact.
//!
//! Every registered source is asked for its own answer (no fallback, no
//! cache) and the answers are compared against their median. Sources that
//! disagree beyond a relative tolerance get a discrepancy flag, and the share
//! of agreeing sources becomes the trust score attached to the result.

use std::sync::Arc;

use futures::StreamExt;
use futures::stream;
use tracing::{debug, warn};

use fincalc_core::{
    ConceptAlias, EngineError, Fact, PeriodSelector, QualityFlag, Result, Ticker,
};
use fincalc_store::FactStore;

/// Tuning knobs for reconciliation.
#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// Relative deviation from the median tolerated before a source is
    /// flagged as disagreeing.
    pub discrepancy_threshold: f64,
    /// Maximum number of sources queried concurrently.
    pub max_fanout: usize,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            discrepancy_threshold: 0.10,
            max_fanout: 5,
        }
    }
}

/// One source's answer for the fact under reconciliation.
#[derive(Debug, Clone)]
pub struct SourceReading {
    /// Name of the responding source.
    pub source: String,
    /// The fact the source reported.
    pub fact: Fact,
    /// Whether the value agreed with the consensus.
    pub agrees: bool,
}

/// Outcome of reconciling one fact across sources.
#[derive(Debug, Clone)]
pub struct Reconciliation {
    /// Median of the responding sources' values.
    pub consensus: f64,
    /// Fraction of queried sources that agreed with the consensus. A source
    /// that failed to respond counts against trust without being flagged.
    pub trust_score: f64,
    /// One discrepancy flag per disagreeing source.
    pub flags: Vec<QualityFlag>,
    /// Every response, in source registration order.
    pub readings: Vec<SourceReading>,
}

/// Queries every source for the same fact and compares the answers.
#[derive(Debug, Clone)]
pub struct CrossSourceReconciler {
    store: Arc<FactStore>,
    config: ReconcilerConfig,
}

impl CrossSourceReconciler {
    /// Creates a reconciler over the store's registered sources.
    #[must_use]
    pub fn new(store: Arc<FactStore>, config: ReconcilerConfig) -> Self {
        Self { store, config }
    }

    /// Reconciles one aliased fact across every registered source.
    ///
    /// A source that errors or has no matching fact is a non-responder; it
    /// gets no discrepancy flag but still counts against the trust score.
    /// All sources failing to respond escalates to [`DataUnavailable`].
    ///
    /// [`DataUnavailable`]: EngineError::DataUnavailable
    pub async fn reconcile(
        &self,
        ticker: &Ticker,
        alias: &ConceptAlias,
        selector: &PeriodSelector,
    ) -> Result<Reconciliation> {
        let sources = self.store.source_names();
        let queried = sources.len();

        let mut readings: Vec<(usize, String, Fact)> = stream::iter(
            sources.into_iter().enumerate(),
        )
        .map(|(order, source)| async move {
            self.reading_from(&source, ticker, alias, selector)
                .await
                .map(|fact| (order, source, fact))
        })
        .buffer_unordered(self.config.max_fanout.max(1))
        .filter_map(|reading| async move { reading })
        .collect()
        .await;

        if readings.is_empty() {
            return Err(EngineError::DataUnavailable {
                ticker: ticker.to_string(),
                concept: alias.metric.clone(),
                detail: "no source could be reconciled".to_string(),
            });
        }

        // Registration order, so output is deterministic despite the
        // unordered fanout.
        readings.sort_by_key(|(order, _, _)| *order);

        let mut values: Vec<f64> = readings.iter().map(|(_, _, f)| f.value).collect();
        values.sort_by(f64::total_cmp);
        let consensus = median_of_sorted(&values);

        let tolerance = self.config.discrepancy_threshold * consensus.abs();
        let mut flags = Vec::new();
        let mut agreeing = 0usize;
        let readings: Vec<SourceReading> = readings
            .into_iter()
            .map(|(_, source, fact)| {
                let agrees = (fact.value - consensus).abs() <= tolerance;
                if agrees {
                    agreeing += 1;
                } else {
                    warn!(
                        %ticker,
                        metric = %alias.metric,
                        source = %source,
                        value = fact.value,
                        consensus,
                        "Source disagrees with consensus"
                    );
                    flags.push(QualityFlag::Discrepancy {
                        source: source.clone(),
                    });
                }
                SourceReading {
                    source,
                    fact,
                    agrees,
                }
            })
            .collect();

        #[allow(clippy::cast_precision_loss)]
        let trust_score = agreeing as f64 / queried as f64;
        debug!(
            %ticker,
            metric = %alias.metric,
            queried,
            responders = readings.len(),
            agreeing,
            trust_score,
            "Reconciled fact across sources"
        );

        Ok(Reconciliation {
            consensus,
            trust_score,
            flags,
            readings,
        })
    }

    /// One source's best matching fact for the alias, or `None` when the
    /// source errors or holds nothing for the requested period.
    async fn reading_from(
        &self,
        source: &str,
        ticker: &Ticker,
        alias: &ConceptAlias,
        selector: &PeriodSelector,
    ) -> Option<Fact> {
        for concept in &alias.concepts {
            match self.store.facts_from_source(source, ticker, concept).await {
                Ok(facts) => {
                    let hit = facts
                        .into_iter()
                        .filter(|fact| selector.matches(&fact.period))
                        .max_by_key(|fact| fact.period.end_date);
                    if let Some(fact) = hit {
                        return Some(fact);
                    }
                }
                Err(e) => {
                    debug!(
                        source,
                        %ticker,
                        %concept,
                        error = %e,
                        "Source did not respond during reconciliation"
                    );
                    return None;
                }
            }
        }
        None
    }
}

fn median_of_sorted(values: &[f64]) -> f64 {
    let n = values.len();
    if n % 2 == 1 {
        values[n / 2]
    } else {
        (values[n / 2 - 1] + values[n / 2]) / 2.0
    }
}
