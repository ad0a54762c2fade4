#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/fincalc/fincalc/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Fact resolution and metric calculation with provenance.
//!
//! The pipeline runs in fixed stages:
//!
//! 1. [`ConceptResolver`] maps abstract metric names to taxonomy concepts,
//! 2. [`PeriodAligner`] binds every required fact from a single filing,
//! 3. [`CalculationRegistry`] evaluates the (cycle-checked) formula DAG,
//! 4. [`ProvenanceBuilder`] assembles the result with full citations,
//! 5. [`SanityValidator`] attaches advisory quality flags,
//! 6. [`CrossSourceReconciler`] optionally cross-checks inputs and scores
//!    trust.
//!
//! [`Engine`] is the facade callers use; the stages stay public for callers
//! composing their own pipelines.

/// Same-filing fact selection.
pub mod aligner;
/// The pipeline facade.
pub mod engine;
/// Restricted expression parsing and evaluation.
pub mod expr;
/// Result assembly with citations.
pub mod provenance;
/// Cross-source agreement checks.
pub mod reconcile;
/// Derived metric definitions.
pub mod registry;
/// Metric name to concept mapping.
pub mod resolver;
/// Post-computation sanity rules.
pub mod validator;

pub use aligner::{AlignedFactSet, PeriodAligner};
pub use engine::{Engine, Explanation};
pub use expr::ParsedExpression;
pub use provenance::ProvenanceBuilder;
pub use reconcile::{CrossSourceReconciler, Reconciliation, ReconcilerConfig, SourceReading};
pub use registry::{CalculationRegistry, EvaluatedMetric, MetricDefinition, OutputUnit};
pub use resolver::ConceptResolver;
pub use validator::SanityValidator;
