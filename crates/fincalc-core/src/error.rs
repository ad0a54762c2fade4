//! Error types for fact resolution and calculation.
//!
//! This module defines [`EngineError`] which covers all error cases that can
//! occur when resolving concepts, fetching facts, aligning periods, and
//! evaluating metrics.

use thiserror::Error;

/// Errors that can occur during fact resolution and calculation.
///
/// The enum is `Clone` so that a single upstream fetch result can be shared
/// across every caller awaiting the same in-flight request.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    /// The requested metric is not registered and not a resolvable concept.
    #[error("Unknown metric: {metric}")]
    UnknownMetric {
        /// The metric name that failed to resolve.
        metric: String,
        /// Metrics the caller could have asked for instead.
        available: Vec<String>,
    },

    /// No single filing satisfies the requested period for all inputs.
    #[error("No filing found for {ticker} matching period {period}")]
    PeriodNotFound {
        /// The entity that was requested.
        ticker: String,
        /// The period that could not be satisfied.
        period: String,
    },

    /// A required input fact is absent from the aligned fact set.
    #[error("Missing input '{input}' for metric '{metric}'")]
    MissingInput {
        /// The metric being evaluated.
        metric: String,
        /// The input that was not supplied.
        input: String,
    },

    /// The requested entity was not found by any adapter.
    #[error("Entity not found: {0}")]
    EntityNotFound(String),

    /// Upstream adapters exhausted their retries.
    #[error("Data unavailable for {ticker}/{concept}: {detail}")]
    DataUnavailable {
        /// The entity that was requested.
        ticker: String,
        /// The concept that could not be fetched.
        concept: String,
        /// Last upstream failure, for logs.
        detail: String,
    },

    /// Registering the definition would create a cycle in the metric DAG.
    #[error("Metric '{0}' would create a cyclic dependency")]
    CyclicDependency(String),

    /// The expression contains a token outside the arithmetic grammar.
    #[error("Unsafe expression: unexpected token '{token}'")]
    UnsafeExpression {
        /// The offending token.
        token: String,
    },

    /// The expression references an identifier with no bound fact.
    #[error("Unbound identifier: {name}")]
    UnboundIdentifier {
        /// The identifier that has no bound fact.
        name: String,
    },

    /// Hard validation failure, e.g. division by a zero denominator.
    #[error("Invalid calculation: {0}")]
    InvalidCalculation(String),

    /// The period string could not be parsed.
    #[error("Invalid period '{0}': expected \"latest\", \"YYYY\" or \"YYYY-Qn\"")]
    InvalidPeriod(String),

    /// Network-level failure talking to an upstream adapter.
    #[error("Network error: {0}")]
    Network(String),

    /// Error parsing an upstream response.
    #[error("Parse error: {0}")]
    Parse(String),

    /// Any other internal error.
    #[error("{0}")]
    Internal(String),
}

impl EngineError {
    /// True if the error is caused by the caller's input rather than the
    /// system, and should map to a validation-style response.
    #[must_use]
    pub const fn is_user_error(&self) -> bool {
        matches!(
            self,
            Self::UnknownMetric { .. }
                | Self::MissingInput { .. }
                | Self::UnsafeExpression { .. }
                | Self::UnboundIdentifier { .. }
                | Self::InvalidCalculation(_)
                | Self::InvalidPeriod(_)
        )
    }
}

/// Result type alias using [`EngineError`].
pub type Result<T> = std::result::Result<T, EngineError>;
