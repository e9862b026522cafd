//! Translation entry point
//!
//! ```text
//! model file/dir
//!     ↓  load_model            (op-graph + static shapes)
//!     ↓  DependencyResolver    (subgraph for the output)
//!     ↓  allocate              (variables, folded constants)
//!     ↓  ops::translate        (equations, PL constraints)
//! Network
//! ```
//!
//! A [`Network`] keeps the op-graph and allocation next to the model so it
//! can be evaluated both with a solver and with the reference evaluator.

use crate::allocator::{allocate, Allocation, Slot, VarGroup};
use crate::config::SolverOptions;
use crate::evaluator;
use crate::graph::{load_model, ModelFormat, OpGraph};
use crate::network::{NetworkModel, NetworkSummary, VariableId};
use crate::ops::{self, Operand};
use crate::resolver::DependencyResolver;
use crate::solver::{InputQuery, SolveStatus, Solver};
use crate::tensor::Tensor;
use crate::{Result, TranslateError};
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info};

/// Builder selecting the source format and the subgraph to translate
#[derive(Debug, Clone, Default)]
pub struct Translator {
    inputs: Option<Vec<String>>,
    output: Option<String>,
    format: ModelFormat,
}

impl Translator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare the input operations, in the order input groups are wanted
    pub fn with_inputs<I, S>(mut self, inputs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inputs = Some(inputs.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_output(mut self, output: impl Into<String>) -> Self {
        self.output = Some(output.into());
        self
    }

    pub fn with_format(mut self, format: ModelFormat) -> Self {
        self.format = format;
        self
    }

    /// Select the format by its tag (`frozenGraph`, `savedModel_v1`, `savedModel_v2`)
    pub fn with_format_tag(self, tag: &str) -> Result<Self> {
        let format = tag.parse()?;
        Ok(self.with_format(format))
    }

    /// Load a model from disk and translate it
    pub fn translate(&self, path: impl AsRef<Path>) -> Result<Network> {
        let graph = load_model(path, self.format)?;
        self.translate_graph(graph)
    }

    /// Translate an already loaded op-graph
    pub fn translate_graph(&self, graph: OpGraph) -> Result<Network> {
        let start = Instant::now();
        let resolution =
            DependencyResolver::new(&graph).resolve(self.inputs.as_deref(), self.output.as_deref())?;
        let allocation = allocate(&graph, &resolution)?;

        let mut model = NetworkModel::new(allocation.num_variables());
        for &id in allocation.order() {
            if allocation.is_input(id) {
                continue;
            }
            let Some(Slot::Vars(output)) = allocation.slot(id) else {
                continue;
            };
            let node = graph.node(id);
            let mut operands = Vec::with_capacity(node.inputs.len());
            for input in graph.input_ids(id)? {
                operands.push(match allocation.slot(input) {
                    Some(Slot::Vars(group)) => Operand::Vars(group),
                    Some(Slot::Const(value)) => Operand::Const(value),
                    None => {
                        return Err(TranslateError::Internal(format!(
                            "input {} of {} has no allocated value",
                            graph.node(input).name,
                            node.name
                        )))
                    }
                });
            }
            ops::translate(node, &operands, output, &mut model)?;
            debug!(op = %node.name, kind = %node.kind, vars = output.len(), "translated operation");
        }
        model.set_groups(
            allocation.input_groups().to_vec(),
            allocation.output_group().clone(),
        );

        info!(
            variables = model.num_variables(),
            equations = model.equations().len(),
            pl_constraints = model.pl_constraints().len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "translated network"
        );
        Ok(Network {
            graph,
            allocation,
            model,
        })
    }
}

/// Translated network with everything needed to evaluate it
#[derive(Debug, Clone)]
pub struct Network {
    graph: OpGraph,
    allocation: Allocation,
    model: NetworkModel,
}

impl Network {
    pub fn graph(&self) -> &OpGraph {
        &self.graph
    }

    pub fn allocation(&self) -> &Allocation {
        &self.allocation
    }

    pub fn model(&self) -> &NetworkModel {
        &self.model
    }

    /// Mutable model, for explicit bounding requests
    pub fn model_mut(&mut self) -> &mut NetworkModel {
        &mut self.model
    }

    pub fn input_groups(&self) -> &[VarGroup] {
        self.allocation.input_groups()
    }

    pub fn output_group(&self) -> &VarGroup {
        self.allocation.output_group()
    }

    pub fn participates_in_pl_constraint(&self, variable: VariableId) -> bool {
        self.model.participates_in_pl_constraint(variable)
    }

    pub fn lower_bound_exists(&self, variable: VariableId) -> bool {
        self.model.lower_bound_exists(variable)
    }

    pub fn upper_bound_exists(&self, variable: VariableId) -> bool {
        self.model.upper_bound_exists(variable)
    }

    pub fn summary(&self) -> NetworkSummary {
        self.model.summary()
    }

    /// Forward evaluation of the op-graph, no solver involved
    pub fn evaluate_without_solver(&self, inputs: &[Tensor]) -> Result<Tensor> {
        evaluator::evaluate(&self.graph, &self.allocation, inputs)
    }

    /// Fix the inputs in a query and read the output from the solver's assignment
    ///
    /// When `artifact` is given the query is written there as JSON first.
    pub fn evaluate_with_solver(
        &self,
        inputs: &[Tensor],
        solver: &dyn Solver,
        options: &SolverOptions,
        artifact: Option<&Path>,
    ) -> Result<Tensor> {
        let inputs = evaluator::prepare_inputs(self.input_groups(), inputs)?;
        let mut query = InputQuery::new(&self.model);
        for (group, value) in self.input_groups().iter().zip(&inputs) {
            query.fix_group(group, value)?;
        }
        if let Some(path) = artifact {
            query.write_json(path)?;
        }

        let outcome = solver.solve(&query, options)?;
        if outcome.status != SolveStatus::Sat {
            return Err(TranslateError::Solver(format!(
                "{} solver returned {:?} for fixed inputs",
                solver.name(),
                outcome.status
            )));
        }
        outcome.group_values(self.output_group())
    }

    /// Absolute difference between solver-backed and reference evaluation
    pub fn find_error(
        &self,
        inputs: &[Tensor],
        solver: &dyn Solver,
        options: &SolverOptions,
        artifact: Option<&Path>,
    ) -> Result<Tensor> {
        let with_solver = self.evaluate_with_solver(inputs, solver, options, artifact)?;
        let reference = self.evaluate_without_solver(inputs)?;
        Ok(with_solver.sub(&reference)?.map(f64::abs))
    }
}
