//! The calculation pipeline facade.
//!
//! [`Engine`] wires resolution, alignment, evaluation, validation, and
//! reconciliation into the two operations callers actually use: computing a
//! named metric and explaining an ad-hoc expression. Each request flows
//! resolve -> align -> evaluate -> assemble -> validate, with cross-source
//! reconciliation bolted on when the caller asks for it.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use fincalc_core::{
    CalculationResult, ConceptAlias, EngineError, Fact, FilingRef, PeriodKey, PeriodSelector,
    QualityFlag, Result, Ticker,
};
use fincalc_store::FactStore;

use crate::aligner::PeriodAligner;
use crate::expr::ParsedExpression;
use crate::provenance::ProvenanceBuilder;
use crate::reconcile::{CrossSourceReconciler, ReconcilerConfig};
use crate::registry::CalculationRegistry;
use crate::resolver::ConceptResolver;
use crate::validator::SanityValidator;

/// The result of explaining an ad-hoc expression.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Explanation {
    /// The expression as submitted.
    pub expression: String,
    /// Evaluated value.
    pub value: f64,
    /// Reporting period the bound facts cover.
    pub period: PeriodKey,
    /// Filing every bound fact came from.
    pub filing_ref: FilingRef,
    /// Every fact bound into the expression.
    pub inputs: Vec<Fact>,
    /// Quality flags raised while binding.
    pub quality_flags: Vec<QualityFlag>,
}

/// Facade over the full fact-resolution and calculation pipeline.
#[derive(Debug)]
pub struct Engine {
    resolver: ConceptResolver,
    registry: CalculationRegistry,
    validator: SanityValidator,
    aligner: PeriodAligner,
    reconciler: CrossSourceReconciler,
    provenance: ProvenanceBuilder,
}

impl Engine {
    /// Creates an engine with the default resolver, built-in metrics, and
    /// default validation/reconciliation settings.
    #[must_use]
    pub fn new(store: Arc<FactStore>) -> Self {
        Self::with_parts(
            store,
            ConceptResolver::with_defaults(),
            CalculationRegistry::with_builtins(),
            SanityValidator::default(),
            ReconcilerConfig::default(),
        )
    }

    /// Creates an engine from explicitly configured components.
    #[must_use]
    pub fn with_parts(
        store: Arc<FactStore>,
        resolver: ConceptResolver,
        registry: CalculationRegistry,
        validator: SanityValidator,
        reconciler_config: ReconcilerConfig,
    ) -> Self {
        Self {
            resolver,
            registry,
            validator,
            aligner: PeriodAligner::new(Arc::clone(&store)),
            reconciler: CrossSourceReconciler::new(store, reconciler_config),
            provenance: ProvenanceBuilder,
        }
    }

    /// Every metric name the engine can serve: derived metrics plus raw
    /// resolvable facts, sorted and deduplicated.
    #[must_use]
    pub fn available_metrics(&self) -> Vec<String> {
        let mut names: BTreeSet<String> = self.registry.metric_names().into_iter().collect();
        names.extend(self.resolver.available());
        names.into_iter().collect()
    }

    /// Computes one metric for an entity and period.
    ///
    /// `reconcile` additionally cross-checks every consumed fact against all
    /// registered sources, attaching a trust score and discrepancy flags.
    pub async fn calculate(
        &self,
        ticker: &Ticker,
        metric: &str,
        selector: &PeriodSelector,
        reconcile: bool,
    ) -> Result<CalculationResult> {
        let mut result = if self.registry.contains(metric) {
            self.calculate_derived(ticker, metric, selector).await?
        } else if self.resolver.get(metric).is_some() {
            self.calculate_leaf(ticker, metric, selector).await?
        } else {
            return Err(EngineError::UnknownMetric {
                metric: metric.to_string(),
                available: self.available_metrics(),
            });
        };

        let sanity_flags = self.validator.validate(&result)?;
        merge_flags(&mut result.quality_flags, sanity_flags);

        if reconcile {
            self.reconcile_inputs(ticker, &mut result).await?;
        }

        info!(
            %ticker,
            metric,
            value = result.value,
            period = %result.period,
            filing = %result.filing_ref,
            flags = result.quality_flags.len(),
            "Calculated metric"
        );
        Ok(result)
    }

    /// Evaluates an ad-hoc arithmetic expression over resolvable names.
    ///
    /// Identifiers may be raw metrics or derived metrics; all facts are bound
    /// from a single filing, exactly as in named-metric calculation.
    pub async fn explain(
        &self,
        ticker: &Ticker,
        expression: &str,
        selector: &PeriodSelector,
    ) -> Result<Explanation> {
        let parsed = ParsedExpression::parse(expression)?;

        let mut leaves: BTreeSet<String> = BTreeSet::new();
        for name in parsed.identifiers() {
            if self.registry.contains(&name) {
                leaves.extend(self.registry.leaf_inputs(&name));
            } else if self.resolver.get(&name).is_some() {
                leaves.insert(name);
            } else {
                return Err(EngineError::UnboundIdentifier { name });
            }
        }

        let required = self.resolve_leaves(&leaves)?;
        let set = self.aligner.align(ticker, &required, selector).await?;

        let mut bindings = std::collections::HashMap::new();
        let mut inputs: Vec<Fact> = Vec::new();
        for name in parsed.identifiers() {
            if self.registry.contains(&name) {
                let evaluated = self.registry.evaluate(&name, &set)?;
                for fact in evaluated.leaf_inputs {
                    if !inputs.iter().any(|f| f.concept == fact.concept) {
                        inputs.push(fact);
                    }
                }
                bindings.insert(name, evaluated.value);
            } else {
                let fact = set.get(&name).ok_or_else(|| EngineError::MissingInput {
                    metric: expression.to_string(),
                    input: name.clone(),
                })?;
                if !inputs.iter().any(|f| f.concept == fact.concept) {
                    inputs.push(fact.clone());
                }
                bindings.insert(name, fact.value);
            }
        }

        let value = parsed.evaluate(&bindings)?;
        info!(
            %ticker,
            expression,
            value,
            period = %set.period(),
            "Explained expression"
        );

        Ok(Explanation {
            expression: expression.to_string(),
            value,
            period: *set.period(),
            filing_ref: set.filing_ref().clone(),
            inputs,
            quality_flags: set.flags().to_vec(),
        })
    }

    async fn calculate_derived(
        &self,
        ticker: &Ticker,
        metric: &str,
        selector: &PeriodSelector,
    ) -> Result<CalculationResult> {
        let leaves = self.registry.leaf_inputs(metric);
        let required = self.resolve_leaves(&leaves)?;
        let set = self.aligner.align(ticker, &required, selector).await?;
        let evaluated = self.registry.evaluate(metric, &set)?;
        let allows_cross_period = self
            .registry
            .get(metric)
            .is_some_and(|def| def.allows_cross_period);
        self.provenance
            .build(metric, evaluated, &set, allows_cross_period)
    }

    /// A raw metric resolves to a single fact; alignment is trivial but the
    /// result shape stays identical to derived metrics.
    async fn calculate_leaf(
        &self,
        ticker: &Ticker,
        metric: &str,
        selector: &PeriodSelector,
    ) -> Result<CalculationResult> {
        let alias = self.resolver.resolve(metric)?;
        let required = vec![(metric.to_string(), alias.clone())];
        let set = self.aligner.align(ticker, &required, selector).await?;
        let fact = set
            .get(metric)
            .ok_or_else(|| EngineError::MissingInput {
                metric: metric.to_string(),
                input: metric.to_string(),
            })?
            .clone();

        Ok(CalculationResult {
            metric: metric.to_string(),
            value: fact.value,
            unit: fact.unit.clone(),
            currency: fact.currency.clone(),
            period: *set.period(),
            filing_ref: set.filing_ref().clone(),
            inputs: vec![fact],
            quality_flags: set.flags().to_vec(),
            trust_score: None,
        })
    }

    /// Cross-checks every consumed fact at the result's exact period; the
    /// weakest input's trust becomes the result's trust.
    async fn reconcile_inputs(
        &self,
        ticker: &Ticker,
        result: &mut CalculationResult,
    ) -> Result<()> {
        let exact = PeriodSelector::Exact {
            fiscal_year: result.period.fiscal_year,
            fiscal_quarter: result.period.fiscal_quarter,
        };

        let mut trust: f64 = 1.0;
        let inputs = result.inputs.clone();
        for fact in &inputs {
            let alias = ConceptAlias::new(fact.concept.as_str(), &[fact.concept.as_str()]);
            let outcome = self.reconciler.reconcile(ticker, &alias, &exact).await?;
            trust = trust.min(outcome.trust_score);
            merge_flags(&mut result.quality_flags, outcome.flags);
        }

        result.trust_score = Some(trust);
        Ok(())
    }

    fn resolve_leaves(&self, leaves: &BTreeSet<String>) -> Result<Vec<(String, ConceptAlias)>> {
        leaves
            .iter()
            .map(|name| Ok((name.clone(), self.resolver.resolve(name)?.clone())))
            .collect()
    }
}

fn merge_flags(into: &mut Vec<QualityFlag>, from: Vec<QualityFlag>) {
    for flag in from {
        if !into.contains(&flag) {
            into.push(flag);
        }
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
    struct NamedAdapter {
        name: String,
        facts: Vec<Fact>,
    }

    #[async_trait]
    impl SourceAdapter for NamedAdapter {
        fn name(&self) -> &str {
            &self.name
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

    fn fact(concept: &str, value: f64, year: i32, quarter: u8, accn: &str, source: &str) -> Fact {
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
            source_adapter: source.to_string(),
        }
    }

    fn acme_filing(source: &str) -> Vec<Fact> {
        vec![
            fact("Revenues", 1_060_000_000.0, 2024, 3, "acc-2024", source),
            fact("CostOfRevenue", 445_000_000.0, 2024, 3, "acc-2024", source),
            fact("NetIncomeLoss", 120_000_000.0, 2024, 3, "acc-2024", source),
            fact("Assets", 5_000_000_000.0, 2024, 3, "acc-2024", source),
        ]
    }

    fn fast_config() -> StoreConfig {
        StoreConfig {
            backoff: fincalc_store::BackoffPolicy {
                initial_delay: std::time::Duration::from_millis(1),
                max_delay: std::time::Duration::from_millis(2),
                multiplier: 2.0,
                max_attempts: 1,
            },
            adapter_rate_per_second: 1000,
            ..StoreConfig::default()
        }
    }

    fn engine_with(adapters: Vec<Arc<dyn SourceAdapter>>) -> Engine {
        Engine::new(Arc::new(FactStore::new(fast_config(), adapters)))
    }

    fn single_source_engine() -> Engine {
        engine_with(vec![Arc::new(NamedAdapter {
            name: "edgar".to_string(),
            facts: acme_filing("edgar"),
        })])
    }

    #[tokio::test]
    async fn calculates_gross_profit_with_full_provenance() {
        let engine = single_source_engine();

        let result = engine
            .calculate(
                &Ticker::new("ACME"),
                "grossProfit",
                &PeriodSelector::Latest,
                false,
            )
            .await
            .unwrap();

        assert_eq!(result.value, 615_000_000.0);
        assert_eq!(result.unit, "USD");
        assert_eq!(result.filing_ref.as_str(), "acc-2024");
        assert_eq!(result.period.label(), "2024-Q3");
        assert_eq!(result.inputs.len(), 2);
        assert!(result.quality_flags.is_empty());
        assert!(result.trust_score.is_none());
    }

    #[tokio::test]
    async fn ratio_metric_has_dimensionless_unit() {
        let engine = single_source_engine();

        let result = engine
            .calculate(
                &Ticker::new("ACME"),
                "grossMargin",
                &PeriodSelector::Latest,
                false,
            )
            .await
            .unwrap();
        assert!((result.value - 0.580_188_679_245_283).abs() < 1e-12);
        assert_eq!(result.unit, "pure");
        assert!(result.currency.is_empty());
    }

    #[tokio::test]
    async fn raw_metric_yields_single_fact_result() {
        let engine = single_source_engine();

        let result = engine
            .calculate(
                &Ticker::new("ACME"),
                "revenue",
                &PeriodSelector::Latest,
                false,
            )
            .await
            .unwrap();
        assert_eq!(result.value, 1_060_000_000.0);
        assert_eq!(result.inputs.len(), 1);
        assert_eq!(result.inputs[0].concept.as_str(), "Revenues");
    }

    #[tokio::test]
    async fn unknown_metric_lists_everything_available() {
        let engine = single_source_engine();

        let err = engine
            .calculate(
                &Ticker::new("ACME"),
                "stockPrice",
                &PeriodSelector::Latest,
                false,
            )
            .await
            .unwrap_err();

        match err {
            EngineError::UnknownMetric { metric, available } => {
                assert_eq!(metric, "stockPrice");
                assert!(available.contains(&"grossProfit".to_string()));
                assert!(available.contains(&"revenue".to_string()));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn exact_period_request_resolves_from_matching_filing() {
        let engine = single_source_engine();
        let selector: PeriodSelector = "2024-Q3".parse().unwrap();

        let result = engine
            .calculate(&Ticker::new("ACME"), "grossProfit", &selector, false)
            .await
            .unwrap();
        assert_eq!(result.value, 615_000_000.0);
        assert!(result.quality_flags.is_empty());
        assert!(result
            .inputs
            .iter()
            .all(|f| f.filing_ref.as_str() == "acc-2024"));
    }

    #[tokio::test]
    async fn exact_period_miss_is_period_not_found() {
        let engine = single_source_engine();
        let selector: PeriodSelector = "2019-Q1".parse().unwrap();

        let err = engine
            .calculate(&Ticker::new("ACME"), "grossProfit", &selector, false)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::PeriodNotFound { .. }));
    }

    #[tokio::test]
    async fn reconciliation_attaches_full_trust_when_sources_agree() {
        let engine = engine_with(vec![
            Arc::new(NamedAdapter {
                name: "edgar".to_string(),
                facts: acme_filing("edgar"),
            }),
            Arc::new(NamedAdapter {
                name: "vendor".to_string(),
                facts: acme_filing("vendor"),
            }),
        ]);

        let result = engine
            .calculate(
                &Ticker::new("ACME"),
                "grossProfit",
                &PeriodSelector::Latest,
                true,
            )
            .await
            .unwrap();
        assert_eq!(result.trust_score, Some(1.0));
        assert!(result.quality_flags.is_empty());
    }

    #[tokio::test]
    async fn disagreeing_source_lowers_trust_and_flags() {
        let mut skewed = acme_filing("vendor");
        // Vendor reports double the revenue.
        skewed[0].value = 2_120_000_000.0;

        let engine = engine_with(vec![
            Arc::new(NamedAdapter {
                name: "edgar".to_string(),
                facts: acme_filing("edgar"),
            }),
            Arc::new(NamedAdapter {
                name: "vendor".to_string(),
                facts: skewed,
            }),
        ]);

        let result = engine
            .calculate(
                &Ticker::new("ACME"),
                "grossProfit",
                &PeriodSelector::Latest,
                true,
            )
            .await
            .unwrap();

        let trust = result.trust_score.unwrap();
        assert!(trust < 1.0, "trust should drop, got {trust}");
        assert!(result
            .quality_flags
            .iter()
            .any(|f| matches!(f, QualityFlag::Discrepancy { .. })));
    }

    #[tokio::test]
    async fn stale_data_is_flagged_by_the_validator() {
        let engine = engine_with(vec![Arc::new(NamedAdapter {
            name: "edgar".to_string(),
            facts: vec![
                fact("Revenues", 900_000_000.0, 2018, 3, "acc-2018", "edgar"),
                fact("CostOfRevenue", 400_000_000.0, 2018, 3, "acc-2018", "edgar"),
            ],
        })]);

        let result = engine
            .calculate(
                &Ticker::new("ACME"),
                "grossProfit",
                &PeriodSelector::Latest,
                false,
            )
            .await
            .unwrap();
        assert!(result
            .quality_flags
            .iter()
            .any(|f| matches!(f, QualityFlag::OldData { .. })));
    }

    #[tokio::test]
    async fn explains_ad_hoc_expressions() {
        let engine = single_source_engine();

        let explanation = engine
            .explain(
                &Ticker::new("ACME"),
                "revenue - costOfRevenue * 2",
                &PeriodSelector::Latest,
            )
            .await
            .unwrap();
        assert_eq!(explanation.value, 170_000_000.0);
        assert_eq!(explanation.filing_ref.as_str(), "acc-2024");
        assert_eq!(explanation.inputs.len(), 2);
    }

    #[tokio::test]
    async fn explain_binds_derived_metrics_too() {
        let engine = single_source_engine();

        let explanation = engine
            .explain(
                &Ticker::new("ACME"),
                "grossProfit / totalAssets",
                &PeriodSelector::Latest,
            )
            .await
            .unwrap();
        assert!((explanation.value - 0.123).abs() < 1e-12);
    }

    #[tokio::test]
    async fn explain_rejects_unknown_identifiers() {
        let engine = single_source_engine();

        let err = engine
            .explain(&Ticker::new("ACME"), "revenue - ebitda", &PeriodSelector::Latest)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            EngineError::UnboundIdentifier {
                name: "ebitda".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn explain_rejects_injection() {
        let engine = single_source_engine();

        let err = engine
            .explain(
                &Ticker::new("ACME"),
                "__import__('os').system('ls')",
                &PeriodSelector::Latest,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::UnsafeExpression { .. }));
    }

    #[test]
    fn available_metrics_merge_registry_and_resolver() {
        let engine = single_source_engine();
        let names = engine.available_metrics();
        assert!(names.contains(&"grossProfit".to_string()));
        assert!(names.contains(&"revenue".to_string()));
        let mut sorted = names.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(names, sorted);
    }
}
