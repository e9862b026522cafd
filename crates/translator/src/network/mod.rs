//! Constraint network handed to the solver
//!
//! A [`NetworkModel`] owns the variable space, the equations and
//! piecewise-linear constraints emitted by translation, the bound table and
//! the input/output variable groups. Only explicit bounding requests write to
//! the bound table after translation.

mod constraint;

pub use constraint::{Addend, Equation, PlConstraint, VariableId};

use crate::allocator::VarGroup;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NetworkModel {
    num_variables: usize,
    equations: Vec<Equation>,
    pl_constraints: Vec<PlConstraint>,
    lower_bounds: BTreeMap<VariableId, f64>,
    upper_bounds: BTreeMap<VariableId, f64>,
    input_groups: Vec<VarGroup>,
    output_group: Option<VarGroup>,
}

impl NetworkModel {
    pub(crate) fn new(num_variables: usize) -> Self {
        Self {
            num_variables,
            ..Default::default()
        }
    }

    pub(crate) fn add_equation(&mut self, equation: Equation) {
        self.equations.push(equation);
    }

    pub(crate) fn add_pl_constraint(&mut self, constraint: PlConstraint) {
        self.pl_constraints.push(constraint);
    }

    pub(crate) fn set_groups(&mut self, inputs: Vec<VarGroup>, output: VarGroup) {
        self.input_groups = inputs;
        self.output_group = Some(output);
    }

    pub fn num_variables(&self) -> usize {
        self.num_variables
    }

    pub fn equations(&self) -> &[Equation] {
        &self.equations
    }

    pub fn pl_constraints(&self) -> &[PlConstraint] {
        &self.pl_constraints
    }

    pub fn input_groups(&self) -> &[VarGroup] {
        &self.input_groups
    }

    pub fn output_group(&self) -> Option<&VarGroup> {
        self.output_group.as_ref()
    }

    pub fn input_vars(&self) -> impl Iterator<Item = VariableId> + '_ {
        self.input_groups.iter().flat_map(|g| g.vars())
    }

    pub fn output_vars(&self) -> impl Iterator<Item = VariableId> + '_ {
        self.output_group.iter().flat_map(|g| g.vars())
    }

    pub fn participates_in_pl_constraint(&self, variable: VariableId) -> bool {
        self.pl_constraints.iter().any(|c| c.participates(variable))
    }

    pub fn lower_bound_exists(&self, variable: VariableId) -> bool {
        self.lower_bounds.contains_key(&variable)
    }

    pub fn upper_bound_exists(&self, variable: VariableId) -> bool {
        self.upper_bounds.contains_key(&variable)
    }

    pub fn lower_bound(&self, variable: VariableId) -> Option<f64> {
        self.lower_bounds.get(&variable).copied()
    }

    pub fn upper_bound(&self, variable: VariableId) -> Option<f64> {
        self.upper_bounds.get(&variable).copied()
    }

    /// Explicit bounding request, replaces any existing bound
    pub fn set_lower_bound(&mut self, variable: VariableId, value: f64) {
        self.lower_bounds.insert(variable, value);
    }

    pub fn set_upper_bound(&mut self, variable: VariableId, value: f64) {
        self.upper_bounds.insert(variable, value);
    }

    pub fn lower_bounds(&self) -> &BTreeMap<VariableId, f64> {
        &self.lower_bounds
    }

    pub fn upper_bounds(&self) -> &BTreeMap<VariableId, f64> {
        &self.upper_bounds
    }

    pub fn summary(&self) -> NetworkSummary {
        let mut relu = 0;
        let mut sign = 0;
        let mut max_pool = 0;
        for c in &self.pl_constraints {
            match c {
                PlConstraint::Relu { .. } => relu += 1,
                PlConstraint::Sign { .. } => sign += 1,
                PlConstraint::MaxPool { .. } => max_pool += 1,
            }
        }
        NetworkSummary {
            num_variables: self.num_variables,
            num_equations: self.equations.len(),
            num_relu: relu,
            num_sign: sign,
            num_max_pool: max_pool,
            inputs: self
                .input_groups
                .iter()
                .map(|g| format!("{} {}", g.name, g.shape))
                .collect(),
            output: self
                .output_group
                .as_ref()
                .map(|g| format!("{} {}", g.name, g.shape))
                .unwrap_or_default(),
        }
    }
}

/// Counts describing a translated network
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NetworkSummary {
    pub num_variables: usize,
    pub num_equations: usize,
    pub num_relu: usize,
    pub num_sign: usize,
    pub num_max_pool: usize,
    pub inputs: Vec<String>,
    pub output: String,
}

impl std::fmt::Display for NetworkSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Network:")?;
        writeln!(f, "  Variables: {}", self.num_variables)?;
        writeln!(f, "  Equations: {}", self.num_equations)?;
        writeln!(
            f,
            "  PL constraints: {} relu, {} sign, {} max-pool",
            self.num_relu, self.num_sign, self.num_max_pool
        )?;
        for input in &self.inputs {
            writeln!(f, "  Input: {}", input)?;
        }
        writeln!(f, "  Output: {}", self.output)
    }
}
