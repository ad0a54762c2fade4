//! Post-computation sanity checks.
//!
//! Validation is advisory: rules attach quality flags to a result without
//! blocking it. The one exception is the hard-invalid class (non-finite
//! values from degenerate arithmetic), which converts the result into an
//! [`InvalidCalculation`] error.
//!
//! [`InvalidCalculation`]: EngineError::InvalidCalculation

use chrono::{Datelike, NaiveDate, Utc};

use fincalc_core::{CalculationResult, EngineError, QualityFlag, Result};

/// Concepts that can only plausibly be reported non-negative.
const NON_NEGATIVE_CONCEPTS: &[&str] = &[
    "Revenues",
    "RevenueFromContractWithCustomerExcludingAssessedTax",
    "SalesRevenueNet",
    "RevenueFromContractWithCustomerIncludingAssessedTax",
    "CostOfRevenue",
    "CostOfGoodsAndServicesSold",
    "CostOfGoodsSold",
    "Assets",
    "AssetsCurrent",
    "LiabilitiesCurrent",
    "InventoryNet",
    "Inventories",
];

/// Input names whose values represent revenue, used by the gross-profit rule.
const REVENUE_CONCEPTS: &[&str] = &[
    "Revenues",
    "RevenueFromContractWithCustomerExcludingAssessedTax",
    "SalesRevenueNet",
    "RevenueFromContractWithCustomerIncludingAssessedTax",
];

/// Declarative post-computation checks.
#[derive(Debug, Clone)]
pub struct SanityValidator {
    /// Inputs older than this many fiscal years are flagged stale.
    pub staleness_years: i32,
}

impl Default for SanityValidator {
    fn default() -> Self {
        Self { staleness_years: 2 }
    }
}

impl SanityValidator {
    /// Runs all rules against a result, as of today.
    pub fn validate(&self, result: &CalculationResult) -> Result<Vec<QualityFlag>> {
        self.validate_as_of(result, Utc::now().date_naive())
    }

    /// Runs all rules with an explicit reference date for staleness.
    pub fn validate_as_of(
        &self,
        result: &CalculationResult,
        as_of: NaiveDate,
    ) -> Result<Vec<QualityFlag>> {
        if !result.value.is_finite() {
            return Err(EngineError::InvalidCalculation(format!(
                "metric '{}' evaluated to a non-finite value",
                result.metric
            )));
        }

        let mut flags = Vec::new();

        for fact in &result.inputs {
            if fact.value < 0.0 && NON_NEGATIVE_CONCEPTS.contains(&fact.concept.as_str()) {
                flags.push(QualityFlag::ImplausibleNegative(fact.concept.clone()));
            }

            let cutoff_year = as_of.year() - self.staleness_years;
            if fact.period.end_date.year() < cutoff_year {
                flags.push(QualityFlag::OldData {
                    concept: fact.concept.clone(),
                    period: fact.period.label(),
                });
            }
        }

        if result.metric == "grossProfit" {
            let revenue = result
                .inputs
                .iter()
                .find(|f| REVENUE_CONCEPTS.contains(&f.concept.as_str()))
                .map(|f| f.value);
            let exceeds = revenue
                .is_some_and(|revenue| revenue >= 0.0 && result.value >= 0.0 && result.value > revenue);
            if exceeds {
                flags.push(QualityFlag::GrossProfitExceedsRevenue);
            }
        }

        Ok(flags)
    }
}
