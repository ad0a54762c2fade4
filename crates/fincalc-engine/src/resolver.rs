//! Abstract metric name to taxonomy concept resolution.
//!
//! Regulatory taxonomies report semantically identical values under different
//! concept tags across companies and years (revenue alone appears under four
//! distinct tags). The resolver is the single point of extension for that
//! churn: it maps each abstract metric name to an ordered [`ConceptAlias`],
//! and the rest of the pipeline stays taxonomy-agnostic.

use std::collections::HashMap;

use fincalc_core::{ConceptAlias, EngineError, Result};

/// Static registry mapping abstract metric names to ordered concept aliases.
///
/// Resolution is deterministic: the same name always yields the same alias
/// list in the same order, so fallback behavior is testable and auditable.
#[derive(Debug, Clone)]
pub struct ConceptResolver {
    aliases: HashMap<String, ConceptAlias>,
}

impl ConceptResolver {
    /// Creates a resolver with the standard US-GAAP alias sets.
    ///
    /// Order within each alias encodes preference, most standard tag first.
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut resolver = Self {
            aliases: HashMap::new(),
        };

        // Income statement
        resolver.insert(ConceptAlias::new(
            "revenue",
            &[
                "Revenues",
                "RevenueFromContractWithCustomerExcludingAssessedTax",
                "SalesRevenueNet",
                "RevenueFromContractWithCustomerIncludingAssessedTax",
            ],
        ));
        resolver.insert(ConceptAlias::new(
            "costOfRevenue",
            &["CostOfRevenue", "CostOfGoodsAndServicesSold", "CostOfGoodsSold"],
        ));
        resolver.insert(ConceptAlias::new(
            "operatingIncome",
            &["OperatingIncomeLoss"],
        ));
        resolver.insert(ConceptAlias::new(
            "netIncome",
            &[
                "NetIncomeLoss",
                "ProfitLoss",
                "NetIncomeLossAvailableToCommonStockholdersBasic",
            ],
        ));

        // Balance sheet
        resolver.insert(ConceptAlias::new("totalAssets", &["Assets"]));
        resolver.insert(ConceptAlias::new("currentAssets", &["AssetsCurrent"]));
        resolver.insert(ConceptAlias::new(
            "currentLiabilities",
            &["LiabilitiesCurrent"],
        ));
        resolver.insert(ConceptAlias::new(
            "inventory",
            &["InventoryNet", "Inventories"],
        ));
        resolver.insert(ConceptAlias::new(
            "stockholdersEquity",
            &[
                "StockholdersEquity",
                "StockholdersEquityIncludingPortionAttributableToNoncontrollingInterest",
            ],
        ));

        // Cash flow
        resolver.insert(ConceptAlias::new(
            "operatingCashFlow",
            &[
                "NetCashProvidedByUsedInOperatingActivities",
                "CashProvidedByUsedInOperatingActivities",
            ],
        ));
        resolver.insert(ConceptAlias::new(
            "capitalExpenditures",
            &[
                "PaymentsToAcquirePropertyPlantAndEquipment",
                "PaymentsForCapitalImprovements",
            ],
        ));

        // Shares
        resolver.insert(ConceptAlias::new(
            "sharesOutstanding",
            &[
                "CommonStockSharesOutstanding",
                "WeightedAverageNumberOfSharesOutstandingBasic",
            ],
        ));

        resolver
    }

    /// Registers (or replaces) an alias.
    pub fn insert(&mut self, alias: ConceptAlias) {
        self.aliases.insert(alias.metric.clone(), alias);
    }

    /// Looks up the alias for a metric name.
    #[must_use]
    pub fn get(&self, metric: &str) -> Option<&ConceptAlias> {
        self.aliases.get(metric)
    }

    /// Resolves a metric name, failing with [`UnknownMetric`] and the list of
    /// resolvable names.
    ///
    /// [`UnknownMetric`]: EngineError::UnknownMetric
    pub fn resolve(&self, metric: &str) -> Result<&ConceptAlias> {
        self.get(metric).ok_or_else(|| EngineError::UnknownMetric {
            metric: metric.to_string(),
            available: self.available(),
        })
    }

    /// All resolvable metric names, sorted.
    #[must_use]
    pub fn available(&self) -> Vec<String> {
        let mut names: Vec<String> = self.aliases.keys().cloned().collect();
        names.sort();
        names
    }
}
