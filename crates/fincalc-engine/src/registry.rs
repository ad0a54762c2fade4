//! Registry of derived metric definitions.
//!
//! Metric definitions form a DAG: a metric's required inputs may themselves
//! be derived metrics, but cycles are rejected at registration time, never
//! discovered at evaluation time. Evaluation is topological (a simple
//! memoized descent, safe because the graph is acyclic) and merges every
//! leaf fact consumed into the result so composite metrics cite every source
//! transitively.

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use petgraph::algo::is_cyclic_directed;
use petgraph::graph::{DiGraph, NodeIndex};

use fincalc_core::{EngineError, Fact, Result};

use crate::aligner::AlignedFactSet;

/// A pure formula over named input values.
pub type Formula = Box<dyn Fn(&HashMap<String, f64>) -> Result<f64> + Send + Sync>;

/// Unit of a derived metric's output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputUnit {
    /// Same unit/currency as the inputs (sums and differences of amounts).
    SameAsInputs,
    /// A dimensionless ratio.
    Ratio,
}

/// A named derived metric: required inputs plus a pure formula.
pub struct MetricDefinition {
    /// Metric name, e.g. `grossProfit`.
    pub name: String,
    /// Input names the formula consumes; may be other derived metrics.
    pub required_inputs: Vec<String>,
    /// The formula itself.
    pub formula: Formula,
    /// Output unit.
    pub output_unit: OutputUnit,
    /// Whether inputs may come from different filings (e.g. trailing sums).
    pub allows_cross_period: bool,
}

impl MetricDefinition {
    /// Creates a same-filing metric definition.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        required_inputs: &[&str],
        output_unit: OutputUnit,
        formula: Formula,
    ) -> Self {
        Self {
            name: name.into(),
            required_inputs: required_inputs.iter().map(|s| (*s).to_string()).collect(),
            formula,
            output_unit,
            allows_cross_period: false,
        }
    }
}

impl fmt::Debug for MetricDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetricDefinition")
            .field("name", &self.name)
            .field("required_inputs", &self.required_inputs)
            .field("output_unit", &self.output_unit)
            .field("allows_cross_period", &self.allows_cross_period)
            .finish_non_exhaustive()
    }
}

/// The value and provenance produced by evaluating one metric.
#[derive(Debug, Clone)]
pub struct EvaluatedMetric {
    /// Computed value.
    pub value: f64,
    /// Output unit of the evaluated definition.
    pub output_unit: OutputUnit,
    /// Every leaf fact consumed, transitively, deduplicated.
    pub leaf_inputs: Vec<Fact>,
}

/// Reads an input value the registry promised to supply.
fn input(metric: &str, values: &HashMap<String, f64>, name: &str) -> Result<f64> {
    values
        .get(name)
        .copied()
        .ok_or_else(|| EngineError::MissingInput {
            metric: metric.to_string(),
            input: name.to_string(),
        })
}

/// Divides, treating a zero denominator as a hard calculation failure.
fn ratio(numerator: f64, denominator: f64) -> Result<f64> {
    if denominator == 0.0 {
        return Err(EngineError::InvalidCalculation(
            "division by zero denominator".to_string(),
        ));
    }
    Ok(numerator / denominator)
}

/// Registry of derived metrics with cycle-checked dependencies.
pub struct CalculationRegistry {
    definitions: HashMap<String, MetricDefinition>,
    graph: DiGraph<String, ()>,
    nodes: HashMap<String, NodeIndex>,
}

impl fmt::Debug for CalculationRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CalculationRegistry")
            .field("metrics", &self.metric_names())
            .finish_non_exhaustive()
    }
}

impl Default for CalculationRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl CalculationRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            definitions: HashMap::new(),
            graph: DiGraph::new(),
            nodes: HashMap::new(),
        }
    }

    /// Creates a registry preloaded with the standard derived metrics.
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();

        let builtins = [
            MetricDefinition::new(
                "grossProfit",
                &["revenue", "costOfRevenue"],
                OutputUnit::SameAsInputs,
                Box::new(|v| {
                    Ok(input("grossProfit", v, "revenue")?
                        - input("grossProfit", v, "costOfRevenue")?)
                }),
            ),
            MetricDefinition::new(
                "workingCapital",
                &["currentAssets", "currentLiabilities"],
                OutputUnit::SameAsInputs,
                Box::new(|v| {
                    Ok(input("workingCapital", v, "currentAssets")?
                        - input("workingCapital", v, "currentLiabilities")?)
                }),
            ),
            MetricDefinition::new(
                "freeCashFlow",
                &["operatingCashFlow", "capitalExpenditures"],
                OutputUnit::SameAsInputs,
                Box::new(|v| {
                    // Capex is reported as a payment; sign conventions vary.
                    Ok(input("freeCashFlow", v, "operatingCashFlow")?
                        - input("freeCashFlow", v, "capitalExpenditures")?.abs())
                }),
            ),
            MetricDefinition::new(
                "grossMargin",
                &["grossProfit", "revenue"],
                OutputUnit::Ratio,
                Box::new(|v| {
                    ratio(
                        input("grossMargin", v, "grossProfit")?,
                        input("grossMargin", v, "revenue")?,
                    )
                }),
            ),
            MetricDefinition::new(
                "operatingMargin",
                &["operatingIncome", "revenue"],
                OutputUnit::Ratio,
                Box::new(|v| {
                    ratio(
                        input("operatingMargin", v, "operatingIncome")?,
                        input("operatingMargin", v, "revenue")?,
                    )
                }),
            ),
            MetricDefinition::new(
                "netMargin",
                &["netIncome", "revenue"],
                OutputUnit::Ratio,
                Box::new(|v| {
                    ratio(
                        input("netMargin", v, "netIncome")?,
                        input("netMargin", v, "revenue")?,
                    )
                }),
            ),
            MetricDefinition::new(
                "returnOnEquity",
                &["netIncome", "stockholdersEquity"],
                OutputUnit::Ratio,
                Box::new(|v| {
                    ratio(
                        input("returnOnEquity", v, "netIncome")?,
                        input("returnOnEquity", v, "stockholdersEquity")?,
                    )
                }),
            ),
            MetricDefinition::new(
                "returnOnAssets",
                &["netIncome", "totalAssets"],
                OutputUnit::Ratio,
                Box::new(|v| {
                    ratio(
                        input("returnOnAssets", v, "netIncome")?,
                        input("returnOnAssets", v, "totalAssets")?,
                    )
                }),
            ),
            MetricDefinition::new(
                "currentRatio",
                &["currentAssets", "currentLiabilities"],
                OutputUnit::Ratio,
                Box::new(|v| {
                    ratio(
                        input("currentRatio", v, "currentAssets")?,
                        input("currentRatio", v, "currentLiabilities")?,
                    )
                }),
            ),
        ];

        for definition in builtins {
            registry
                .register(definition)
                .unwrap_or_else(|e| unreachable!("builtin metrics are acyclic: {e}"));
        }
        registry
    }

    /// Registers a definition, rejecting anything that would create a cycle.
    pub fn register(&mut self, definition: MetricDefinition) -> Result<()> {
        // Validate on a scratch copy of the graph, commit only on success.
        let mut graph = self.graph.clone();
        let mut nodes = self.nodes.clone();

        let metric_node = Self::node(&mut graph, &mut nodes, &definition.name);
        for input_name in &definition.required_inputs {
            let input_node = Self::node(&mut graph, &mut nodes, input_name);
            graph.add_edge(metric_node, input_node, ());
        }

        if is_cyclic_directed(&graph) {
            return Err(EngineError::CyclicDependency(definition.name));
        }

        self.graph = graph;
        self.nodes = nodes;
        self.definitions.insert(definition.name.clone(), definition);
        Ok(())
    }

    fn node(
        graph: &mut DiGraph<String, ()>,
        nodes: &mut HashMap<String, NodeIndex>,
        name: &str,
    ) -> NodeIndex {
        *nodes
            .entry(name.to_string())
            .or_insert_with(|| graph.add_node(name.to_string()))
    }

    /// True when the name is a registered derived metric.
    #[must_use]
    pub fn contains(&self, metric: &str) -> bool {
        self.definitions.contains_key(metric)
    }

    /// The registered definition, if any.
    #[must_use]
    pub fn get(&self, metric: &str) -> Option<&MetricDefinition> {
        self.definitions.get(metric)
    }

    /// Names of all registered derived metrics, sorted.
    #[must_use]
    pub fn metric_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.definitions.keys().cloned().collect();
        names.sort();
        names
    }

    /// Transitive non-derived inputs of a metric, i.e. the raw fact names the
    /// aligner must satisfy before evaluation.
    #[must_use]
    pub fn leaf_inputs(&self, metric: &str) -> BTreeSet<String> {
        let mut leaves = BTreeSet::new();
        self.collect_leaves(metric, &mut leaves);
        leaves
    }

    fn collect_leaves(&self, name: &str, leaves: &mut BTreeSet<String>) {
        match self.definitions.get(name) {
            Some(def) => {
                for input_name in &def.required_inputs {
                    self.collect_leaves(input_name, leaves);
                }
            }
            None => {
                leaves.insert(name.to_string());
            }
        }
    }

    /// Evaluates a derived metric over an aligned fact set.
    ///
    /// Fails with [`MissingInput`] when a required fact is absent; a missing
    /// fact is never substituted with zero. Intermediate derived values feed
    /// their parents while leaf provenance accumulates into the result.
    ///
    /// [`MissingInput`]: EngineError::MissingInput
    pub fn evaluate(&self, metric: &str, set: &AlignedFactSet) -> Result<EvaluatedMetric> {
        let definition = self.definitions.get(metric).ok_or_else(|| {
            EngineError::UnknownMetric {
                metric: metric.to_string(),
                available: self.metric_names(),
            }
        })?;

        let mut values: HashMap<String, f64> = HashMap::new();
        let mut leaf_inputs: Vec<Fact> = Vec::new();
        let value = self.evaluate_inner(metric, metric, set, &mut values, &mut leaf_inputs)?;

        // A leaf shared by several parents is consumed once.
        leaf_inputs.dedup_by(|a, b| {
            a.concept == b.concept && a.period == b.period && a.filing_ref == b.filing_ref
        });

        Ok(EvaluatedMetric {
            value,
            output_unit: definition.output_unit,
            leaf_inputs,
        })
    }

    fn evaluate_inner(
        &self,
        root: &str,
        name: &str,
        set: &AlignedFactSet,
        values: &mut HashMap<String, f64>,
        leaf_inputs: &mut Vec<Fact>,
    ) -> Result<f64> {
        if let Some(value) = values.get(name) {
            return Ok(*value);
        }

        let value = match self.definitions.get(name) {
            Some(definition) => {
                let mut inputs = HashMap::new();
                for input_name in &definition.required_inputs {
                    let v = self.evaluate_inner(root, input_name, set, values, leaf_inputs)?;
                    inputs.insert(input_name.clone(), v);
                }
                (definition.formula)(&inputs)?
            }
            None => {
                let fact = set.get(name).ok_or_else(|| EngineError::MissingInput {
                    metric: root.to_string(),
                    input: name.to_string(),
                })?;
                leaf_inputs.push(fact.clone());
                fact.value
            }
        };

        values.insert(name.to_string(), value);
        Ok(value)
    }
}
