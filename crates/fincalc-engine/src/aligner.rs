//! Period alignment: selecting every required fact from one filing.
//!
//! Mixing facts from different filings is the dominant correctness hazard in
//! fundamental data (a revenue figure from one year against a cost figure
//! from another produces plausible-looking nonsense). The aligner enforces
//! the same-filing rule structurally: an [`AlignedFactSet`] can only be built
//! here, and it only ever contains facts sharing one filing reference and one
//! period key.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use fincalc_core::{
    ConceptAlias, EngineError, Fact, FilingRef, PeriodKey, PeriodSelector, QualityFlag, Result,
    Ticker,
};
use fincalc_store::FactStore;

/// A set of facts guaranteed to originate from a single filing and period.
///
/// Construction is restricted to the aligner; the rest of the pipeline can
/// rely on the same-filing invariant without re-checking it.
#[derive(Debug, Clone)]
pub struct AlignedFactSet {
    pub(crate) filing_ref: FilingRef,
    pub(crate) period: PeriodKey,
    pub(crate) facts: HashMap<String, Fact>,
    pub(crate) flags: Vec<QualityFlag>,
}

impl AlignedFactSet {
    /// The filing every fact in this set came from.
    #[must_use]
    pub fn filing_ref(&self) -> &FilingRef {
        &self.filing_ref
    }

    /// The reporting period every fact in this set covers.
    #[must_use]
    pub fn period(&self) -> &PeriodKey {
        &self.period
    }

    /// The fact bound to an input name, if present.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Fact> {
        self.facts.get(name)
    }

    /// Alias-fallback flags collected while resolving this set.
    #[must_use]
    pub fn flags(&self) -> &[QualityFlag] {
        &self.flags
    }

    /// Number of bound facts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.facts.len()
    }

    /// True when no facts are bound.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.facts.is_empty()
    }
}

/// A candidate fact for one input name, remembering its alias rank.
struct Candidate {
    fact: Fact,
    rank: usize,
}

/// Selects facts for a set of required concepts from a single filing.
#[derive(Debug, Clone)]
pub struct PeriodAligner {
    store: Arc<FactStore>,
}

impl PeriodAligner {
    /// Creates an aligner reading from the given store.
    #[must_use]
    pub fn new(store: Arc<FactStore>) -> Self {
        Self { store }
    }

    /// Finds one filing/period in which every required input resolves.
    ///
    /// Candidate filings are ordered by period end (most recent first) for
    /// [`PeriodSelector::Latest`]; an exact selector only admits exactly
    /// matching periods and fails with [`PeriodNotFound`] rather than
    /// degrading to a near period.
    ///
    /// [`PeriodNotFound`]: EngineError::PeriodNotFound
    pub async fn align(
        &self,
        ticker: &Ticker,
        required: &[(String, ConceptAlias)],
        selector: &PeriodSelector,
    ) -> Result<AlignedFactSet> {
        if required.is_empty() {
            return Err(EngineError::Internal(
                "alignment requires at least one concept".to_string(),
            ));
        }

        // Per input name: the best candidate per (filing, period), lowest
        // alias rank winning.
        let mut per_name: Vec<(String, HashMap<(FilingRef, PeriodKey), Candidate>)> = Vec::new();

        for (name, alias) in required {
            let mut candidates: HashMap<(FilingRef, PeriodKey), Candidate> = HashMap::new();
            for (rank, concept) in alias.concepts.iter().enumerate() {
                let facts = self.store.facts_for(ticker, concept).await?;
                for fact in facts.iter() {
                    if !selector.matches(&fact.period) {
                        continue;
                    }
                    let key = (fact.filing_ref.clone(), fact.period);
                    let replace = candidates.get(&key).is_none_or(|c| rank < c.rank);
                    if replace {
                        candidates.insert(
                            key,
                            Candidate {
                                fact: fact.clone(),
                                rank,
                            },
                        );
                    }
                }
            }
            per_name.push((name.clone(), candidates));
        }

        // Candidate filings: those offering the first input, most recent
        // period first, filing ref as a deterministic tiebreak.
        let mut filings: Vec<(FilingRef, PeriodKey)> =
            per_name[0].1.keys().cloned().collect();
        filings.sort_by(|a, b| b.1.end_date.cmp(&a.1.end_date).then(a.0.as_str().cmp(b.0.as_str())));

        'filings: for key in filings {
            let mut facts = HashMap::new();
            let mut flags = Vec::new();
            for (name, candidates) in &per_name {
                let Some(candidate) = candidates.get(&key) else {
                    continue 'filings;
                };
                if candidate.rank > 0 {
                    flags.push(QualityFlag::FallbackConcept(candidate.fact.concept.clone()));
                }
                facts.insert(name.clone(), candidate.fact.clone());
            }

            debug!(
                %ticker,
                filing = %key.0,
                period = %key.1,
                inputs = facts.len(),
                "Aligned facts to a single filing"
            );
            return Ok(AlignedFactSet {
                filing_ref: key.0,
                period: key.1,
                facts,
                flags,
            });
        }

        Err(EngineError::PeriodNotFound {
            ticker: ticker.to_string(),
            period: selector.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use fincalc_core::{ConceptId, SourceAdapter};
    use fincalc_store::StoreConfig;

    #[derive(Debug)]
    struct StaticAdapter {
        facts: Vec<Fact>,
    }

    #[async_trait]
    impl SourceAdapter for StaticAdapter {
        fn name(&self) -> &str {
            "static"
        }

        fn description(&self) -> &str {
            "static test adapter"
        }

        async fn fetch_all_facts(&self, _: &Ticker, concept: &ConceptId) -> Result<Vec<Fact>> {
            Ok(self
                .facts
                .iter()
                .filter(|f| &f.concept == concept)
                .cloned()
                .collect())
        }
    }

    fn fact(concept: &str, value: f64, year: i32, quarter: u8, accn: &str) -> Fact {
        let month = u32::from(quarter) * 3;
        Fact {
            concept: ConceptId::new(concept),
            value,
            unit: "USD".to_string(),
            currency: "USD".to_string(),
            period: PeriodKey::quarterly(
                year,
                quarter,
                NaiveDate::from_ymd_opt(year, month, 28).unwrap(),
            ),
            filing_ref: FilingRef::new(accn),
            source_adapter: "static".to_string(),
        }
    }

    fn aligner_for(facts: Vec<Fact>) -> PeriodAligner {
        let store = Arc::new(FactStore::new(
            StoreConfig::default(),
            vec![Arc::new(StaticAdapter { facts })],
        ));
        PeriodAligner::new(store)
    }

    fn required() -> Vec<(String, ConceptAlias)> {
        vec![
            (
                "revenue".to_string(),
                ConceptAlias::new("revenue", &["Revenues", "SalesRevenueNet"]),
            ),
            (
                "costOfRevenue".to_string(),
                ConceptAlias::new("costOfRevenue", &["CostOfRevenue"]),
            ),
        ]
    }

    #[tokio::test]
    async fn aligns_all_inputs_to_one_filing() {
        let aligner = aligner_for(vec![
            fact("Revenues", 1_060_000_000.0, 2024, 3, "acc-2024"),
            fact("CostOfRevenue", 445_000_000.0, 2024, 3, "acc-2024"),
            // Older filing also complete, must not be chosen for latest.
            fact("Revenues", 900_000_000.0, 2023, 3, "acc-2023"),
            fact("CostOfRevenue", 400_000_000.0, 2023, 3, "acc-2023"),
        ]);

        let set = aligner
            .align(&Ticker::new("ACME"), &required(), &PeriodSelector::Latest)
            .await
            .unwrap();

        assert_eq!(set.filing_ref().as_str(), "acc-2024");
        assert_eq!(set.get("revenue").unwrap().value, 1_060_000_000.0);
        assert_eq!(set.get("costOfRevenue").unwrap().value, 445_000_000.0);
        assert!(set.flags().is_empty());
    }

    #[tokio::test]
    async fn never_mixes_filings() {
        // Revenue only in the 2024 filing, cost only in the 2018 one.
        let aligner = aligner_for(vec![
            fact("Revenues", 1_060_000_000.0, 2024, 3, "acc-2024"),
            fact("CostOfRevenue", 445_000_000.0, 2018, 3, "acc-2018"),
        ]);

        let err = aligner
            .align(&Ticker::new("ACME"), &required(), &PeriodSelector::Latest)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::PeriodNotFound { .. }));
    }

    #[tokio::test]
    async fn exact_period_requires_exact_match() {
        let aligner = aligner_for(vec![
            fact("Revenues", 900_000_000.0, 2023, 3, "acc-2023"),
            fact("CostOfRevenue", 400_000_000.0, 2023, 3, "acc-2023"),
        ]);
        let selector: PeriodSelector = "2024-Q3".parse().unwrap();

        let err = aligner
            .align(&Ticker::new("ACME"), &required(), &selector)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::PeriodNotFound { .. }));
    }

    #[tokio::test]
    async fn falls_back_across_filings_until_complete() {
        // Most recent filing misses the cost concept; the previous one is
        // complete and should be selected for "latest".
        let aligner = aligner_for(vec![
            fact("Revenues", 1_100_000_000.0, 2024, 4, "acc-q4"),
            fact("Revenues", 1_060_000_000.0, 2024, 3, "acc-q3"),
            fact("CostOfRevenue", 445_000_000.0, 2024, 3, "acc-q3"),
        ]);

        let set = aligner
            .align(&Ticker::new("ACME"), &required(), &PeriodSelector::Latest)
            .await
            .unwrap();
        assert_eq!(set.filing_ref().as_str(), "acc-q3");
    }

    #[tokio::test]
    async fn alias_fallback_within_a_filing_is_flagged() {
        let aligner = aligner_for(vec![
            fact("SalesRevenueNet", 1_060_000_000.0, 2024, 3, "acc-q3"),
            fact("CostOfRevenue", 445_000_000.0, 2024, 3, "acc-q3"),
        ]);

        let set = aligner
            .align(&Ticker::new("ACME"), &required(), &PeriodSelector::Latest)
            .await
            .unwrap();
        assert_eq!(
            set.flags(),
            &[QualityFlag::FallbackConcept(ConceptId::new("SalesRevenueNet"))]
        );
    }
}
