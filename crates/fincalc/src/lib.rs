#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/fincalc/fincalc/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Umbrella crate re-exporting the public API.
//!
//! # Features
//!
//! - `edgar` - SEC EDGAR source adapter (enabled by default)

// Core types and traits
pub use fincalc_core::*;

// Store
pub use fincalc_store::{AdapterThrottle, BackoffPolicy, FactStore, StoreConfig};

// Engine pipeline
pub use fincalc_engine::{
    AlignedFactSet, CalculationRegistry, ConceptResolver, CrossSourceReconciler, Engine,
    EvaluatedMetric, Explanation, MetricDefinition, OutputUnit, ParsedExpression, PeriodAligner,
    ProvenanceBuilder, Reconciliation, ReconcilerConfig, SanityValidator, SourceReading,
};

// Adapters
#[cfg(feature = "edgar")]
pub use fincalc_edgar::EdgarAdapter;

mod builder;
pub use builder::EngineBuilder;
