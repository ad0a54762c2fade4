#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/fincalc/fincalc/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Core types and traits for the fact calculation engine.
//!
//! This crate provides the foundational abstractions shared by the engine:
//!
//! - [`Fact`](types::Fact) - A reported value with full filing provenance
//! - [`PeriodKey`](period::PeriodKey) / [`PeriodSelector`](period::PeriodSelector) - Reporting periods
//! - [`ConceptAlias`](types::ConceptAlias) - Ordered taxonomy synonyms per metric
//! - [`CalculationResult`](types::CalculationResult) - Derived values with citations
//! - [`SourceAdapter`](adapter::SourceAdapter) - Upstream data adapter seam
//! - [`EngineError`](error::EngineError) - The full error taxonomy

/// Adapter trait for upstream regulatory data sources.
pub mod adapter;
/// Error types for fact resolution and calculation.
pub mod error;
/// Reporting period types.
pub mod period;
/// Core data types (Ticker, Fact, flags, results).
pub mod types;

// Re-export commonly used items at crate root
pub use adapter::SourceAdapter;
pub use error::{EngineError, Result};
pub use period::{PeriodKey, PeriodSelector};
pub use types::{CalculationResult, ConceptAlias, ConceptId, Fact, FilingRef, QualityFlag, Ticker};
