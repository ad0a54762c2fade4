//! Assembly of auditable calculation results.
//!
//! Every number leaving the engine carries its full derivation: the exact
//! facts consumed, the filing they came from, and any quality flags raised
//! along the way. The builder is the last line of defense for the
//! same-filing rule: it re-checks that the cited inputs agree on one filing
//! reference before letting a result out.

use tracing::debug;

use fincalc_core::{CalculationResult, EngineError, QualityFlag, Result};

use crate::aligner::AlignedFactSet;
use crate::registry::{EvaluatedMetric, OutputUnit};

/// Unit string attached to dimensionless ratios.
pub const RATIO_UNIT: &str = "pure";

/// Assembles a [`CalculationResult`] from an evaluated metric and its
/// aligned inputs.
#[derive(Debug, Clone, Default)]
pub struct ProvenanceBuilder;

impl ProvenanceBuilder {
    /// Builds the final result, enforcing citation exhaustiveness and the
    /// same-filing rule.
    ///
    /// `allows_cross_period` relaxes the filing check for metrics that
    /// legitimately span filings (trailing sums); everything else must cite
    /// inputs from exactly the set's filing.
    pub fn build(
        &self,
        metric: &str,
        evaluated: EvaluatedMetric,
        set: &AlignedFactSet,
        allows_cross_period: bool,
    ) -> Result<CalculationResult> {
        if evaluated.leaf_inputs.is_empty() {
            return Err(EngineError::Internal(format!(
                "metric '{metric}' produced a value citing no inputs"
            )));
        }

        if !allows_cross_period {
            for fact in &evaluated.leaf_inputs {
                if fact.filing_ref != *set.filing_ref() {
                    return Err(EngineError::Internal(format!(
                        "metric '{metric}' cites fact '{}' from filing '{}', expected '{}'",
                        fact.concept,
                        fact.filing_ref,
                        set.filing_ref()
                    )));
                }
            }
        }

        let (unit, currency) = match evaluated.output_unit {
            OutputUnit::Ratio => (RATIO_UNIT.to_string(), String::new()),
            OutputUnit::SameAsInputs => {
                let first = &evaluated.leaf_inputs[0];
                (first.unit.clone(), first.currency.clone())
            }
        };

        // Alias-fallback flags from alignment, deduplicated; validator and
        // reconciler flags are appended by the engine afterwards.
        let mut quality_flags: Vec<QualityFlag> = Vec::new();
        for flag in set.flags() {
            if !quality_flags.contains(flag) {
                quality_flags.push(flag.clone());
            }
        }

        debug!(
            metric,
            filing = %set.filing_ref(),
            period = %set.period(),
            inputs = evaluated.leaf_inputs.len(),
            flags = quality_flags.len(),
            "Assembled calculation result"
        );

        Ok(CalculationResult {
            metric: metric.to_string(),
            value: evaluated.value,
            unit,
            currency,
            period: *set.period(),
            filing_ref: set.filing_ref().clone(),
            inputs: evaluated.leaf_inputs,
            quality_flags,
            trust_score: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use fincalc_core::{ConceptId, Fact, FilingRef, PeriodKey};
    use std::collections::HashMap;

    fn fact(concept: &str, value: f64, accn: &str) -> Fact {
        Fact {
            concept: ConceptId::new(concept),
            value,
            unit: "USD".to_string(),
            currency: "USD".to_string(),
            period: PeriodKey::quarterly(2024, 3, NaiveDate::from_ymd_opt(2024, 9, 28).unwrap()),
            filing_ref: FilingRef::new(accn),
            source_adapter: "test".to_string(),
        }
    }

    fn set_with(facts: Vec<(&str, Fact)>, flags: Vec<QualityFlag>) -> AlignedFactSet {
        AlignedFactSet {
            filing_ref: FilingRef::new("acc-2024"),
            period: PeriodKey::quarterly(2024, 3, NaiveDate::from_ymd_opt(2024, 9, 28).unwrap()),
            facts: facts
                .into_iter()
                .map(|(name, fact)| (name.to_string(), fact))
                .collect::<HashMap<_, _>>(),
            flags,
        }
    }

    #[test]
    fn amount_metric_inherits_input_unit() {
        let builder = ProvenanceBuilder;
        let set = set_with(
            vec![("revenue", fact("Revenues", 1_060.0, "acc-2024"))],
            Vec::new(),
        );
        let evaluated = EvaluatedMetric {
            value: 615.0,
            output_unit: OutputUnit::SameAsInputs,
            leaf_inputs: vec![
                fact("Revenues", 1_060.0, "acc-2024"),
                fact("CostOfRevenue", 445.0, "acc-2024"),
            ],
        };

        let result = builder.build("grossProfit", evaluated, &set, false).unwrap();
        assert_eq!(result.unit, "USD");
        assert_eq!(result.currency, "USD");
        assert_eq!(result.filing_ref.as_str(), "acc-2024");
        assert_eq!(result.inputs.len(), 2);
    }

    #[test]
    fn ratio_metric_is_dimensionless() {
        let builder = ProvenanceBuilder;
        let set = set_with(
            vec![("revenue", fact("Revenues", 1_000.0, "acc-2024"))],
            Vec::new(),
        );
        let evaluated = EvaluatedMetric {
            value: 0.58,
            output_unit: OutputUnit::Ratio,
            leaf_inputs: vec![fact("Revenues", 1_000.0, "acc-2024")],
        };

        let result = builder.build("grossMargin", evaluated, &set, false).unwrap();
        assert_eq!(result.unit, RATIO_UNIT);
        assert!(result.currency.is_empty());
    }

    #[test]
    fn cross_filing_citation_is_rejected() {
        let builder = ProvenanceBuilder;
        let set = set_with(
            vec![("revenue", fact("Revenues", 1_000.0, "acc-2024"))],
            Vec::new(),
        );
        let evaluated = EvaluatedMetric {
            value: 600.0,
            output_unit: OutputUnit::SameAsInputs,
            leaf_inputs: vec![
                fact("Revenues", 1_000.0, "acc-2024"),
                fact("CostOfRevenue", 400.0, "acc-2018"),
            ],
        };

        let err = builder
            .build("grossProfit", evaluated, &set, false)
            .unwrap_err();
        assert!(matches!(err, EngineError::Internal(_)));
    }

    #[test]
    fn cross_period_metric_may_span_filings() {
        let builder = ProvenanceBuilder;
        let set = set_with(
            vec![("revenue", fact("Revenues", 1_000.0, "acc-2024"))],
            Vec::new(),
        );
        let evaluated = EvaluatedMetric {
            value: 4_000.0,
            output_unit: OutputUnit::SameAsInputs,
            leaf_inputs: vec![
                fact("Revenues", 1_000.0, "acc-2024"),
                fact("Revenues", 3_000.0, "acc-2023"),
            ],
        };

        assert!(builder.build("trailingRevenue", evaluated, &set, true).is_ok());
    }

    #[test]
    fn alignment_flags_are_carried_and_deduplicated() {
        let builder = ProvenanceBuilder;
        let flag = QualityFlag::FallbackConcept(ConceptId::new("SalesRevenueNet"));
        let set = set_with(
            vec![("revenue", fact("SalesRevenueNet", 1_000.0, "acc-2024"))],
            vec![flag.clone(), flag.clone()],
        );
        let evaluated = EvaluatedMetric {
            value: 1_000.0,
            output_unit: OutputUnit::SameAsInputs,
            leaf_inputs: vec![fact("SalesRevenueNet", 1_000.0, "acc-2024")],
        };

        let result = builder.build("revenue", evaluated, &set, false).unwrap();
        assert_eq!(result.quality_flags, vec![flag]);
    }

    #[test]
    fn empty_citation_list_is_rejected() {
        let builder = ProvenanceBuilder;
        let set = set_with(
            vec![("revenue", fact("Revenues", 1_000.0, "acc-2024"))],
            Vec::new(),
        );
        let evaluated = EvaluatedMetric {
            value: 1.0,
            output_unit: OutputUnit::Ratio,
            leaf_inputs: Vec::new(),
        };

        assert!(builder.build("grossMargin", evaluated, &set, false).is_err());
    }
}
