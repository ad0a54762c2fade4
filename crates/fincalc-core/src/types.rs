//! Core data types for regulatory facts and calculation results.
//!
//! This module defines the fundamental data structures:
//!
//! - [`Ticker`] - Company identifier
//! - [`ConceptId`] - Regulatory taxonomy concept tag
//! - [`FilingRef`] - Unique reference to one filing, the unit of period alignment
//! - [`Fact`] - A single reported value with full provenance
//! - [`ConceptAlias`] - Ordered synonym list for one abstract metric name
//! - [`QualityFlag`] - Advisory annotations on a result
//! - [`CalculationResult`] - A derived value with exhaustive citations

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::period::PeriodKey;

/// A company ticker symbol.
///
/// Tickers are automatically uppercased on creation.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Ticker(String);

impl Ticker {
    /// Creates a new ticker from a string, converting to uppercase.
    #[must_use]
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into().to_uppercase())
    }

    /// Returns the ticker as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Ticker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Ticker {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(s))
    }
}

impl From<&str> for Ticker {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Ticker {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// A regulatory taxonomy concept identifier, e.g. `Revenues`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConceptId(String);

impl ConceptId {
    /// Creates a new concept identifier.
    #[must_use]
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Returns the concept identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConceptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ConceptId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// A unique reference to one regulatory filing.
///
/// All facts in a calculation must share a filing reference unless the metric
/// definition explicitly permits cross-period inputs.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FilingRef(String);

impl FilingRef {
    /// Creates a new filing reference.
    #[must_use]
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Returns the filing reference as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FilingRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for FilingRef {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// A single reported regulatory fact.
///
/// Immutable once created. Identity is (entity, concept, period, source).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fact {
    /// The taxonomy concept this value was reported under.
    pub concept: ConceptId,
    /// Reported value.
    pub value: f64,
    /// Unit of measure, e.g. `USD` or `shares`.
    pub unit: String,
    /// Reporting currency, e.g. `USD`.
    pub currency: String,
    /// Normalized reporting period.
    pub period: PeriodKey,
    /// The filing this value was disclosed in.
    pub filing_ref: FilingRef,
    /// Name of the adapter that produced this fact.
    pub source_adapter: String,
}

/// An ordered list of taxonomy concepts considered synonymous for one
/// abstract metric name.
///
/// Order encodes preference: the most standard tag comes first, and callers
/// try each concept in order until one resolves to reported data.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConceptAlias {
    /// The abstract metric name, e.g. `revenue`.
    pub metric: String,
    /// Candidate taxonomy concepts, most standard first. Never empty.
    pub concepts: Vec<ConceptId>,
}

impl ConceptAlias {
    /// Creates an alias from a metric name and ordered concept tags.
    #[must_use]
    pub fn new(metric: impl Into<String>, concepts: &[&str]) -> Self {
        Self {
            metric: metric.into(),
            concepts: concepts.iter().map(|c| ConceptId::new(*c)).collect(),
        }
    }

    /// The preferred (first) concept for this metric.
    #[must_use]
    pub fn primary(&self) -> &ConceptId {
        &self.concepts[0]
    }
}

/// An advisory annotation attached to a calculation result.
///
/// Flags never block a result; they surface data concerns the caller should
/// know about when citing the number.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum QualityFlag {
    /// A non-primary concept alias was used to resolve a metric.
    FallbackConcept(ConceptId),
    /// An input fact is older than the staleness threshold.
    OldData {
        /// Concept of the stale fact.
        concept: ConceptId,
        /// Fiscal label of the stale period.
        period: String,
    },
    /// A value that should be non-negative was reported negative.
    ImplausibleNegative(ConceptId),
    /// Gross profit exceeds revenue while both are non-negative.
    GrossProfitExceedsRevenue,
    /// A source deviated from the cross-source consensus.
    Discrepancy {
        /// Name of the deviating source adapter.
        source: String,
    },
}

impl fmt::Display for QualityFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FallbackConcept(c) => write!(f, "FALLBACK_CONCEPT_{c}"),
            Self::OldData { concept, period } => write!(f, "OLD_DATA_{concept}_{period}"),
            Self::ImplausibleNegative(c) => write!(f, "IMPLAUSIBLE_NEGATIVE_{c}"),
            Self::GrossProfitExceedsRevenue => write!(f, "GROSS_PROFIT_EXCEEDS_REVENUE"),
            Self::Discrepancy { source } => write!(f, "DISCREPANCY_{source}"),
        }
    }
}

impl Serialize for QualityFlag {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// A derived value with exhaustive source provenance.
///
/// Immutable once built: every leaf fact consumed by the formula, transitively
/// through intermediate metrics, appears in `inputs`.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CalculationResult {
    /// The metric that was evaluated.
    pub metric: String,
    /// Computed value.
    pub value: f64,
    /// Unit of the computed value.
    pub unit: String,
    /// Currency of the computed value (empty for ratios).
    pub currency: String,
    /// The reporting period all inputs came from.
    pub period: PeriodKey,
    /// The filing all inputs came from.
    pub filing_ref: FilingRef,
    /// Every leaf fact consumed by the formula.
    pub inputs: Vec<Fact>,
    /// Advisory data-quality annotations.
    pub quality_flags: Vec<QualityFlag>,
    /// Cross-source agreement score, present when reconciliation ran.
    pub trust_score: Option<f64>,
}
