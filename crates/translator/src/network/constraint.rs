//! Linear equations and piecewise-linear constraints

use serde::{Deserialize, Serialize};

/// Dense variable identifier
pub type VariableId = usize;

/// One `coefficient * variable` term of an equation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Addend {
    pub coefficient: f64,
    pub variable: VariableId,
}

/// Affine relation `sum(coefficient * variable) = scalar`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Equation {
    pub addends: Vec<Addend>,
    pub scalar: f64,
}

impl Equation {
    pub fn new() -> Self {
        Self::default()
    }

    /// `output = sum(terms) + constant`, stored as `sum(terms) - output = -constant`
    pub fn defining(
        output: VariableId,
        terms: impl IntoIterator<Item = (f64, VariableId)>,
        constant: f64,
    ) -> Self {
        let mut eq = Self::new();
        for (coefficient, variable) in terms {
            eq.add_addend(coefficient, variable);
        }
        eq.add_addend(-1.0, output);
        eq.scalar = -constant;
        eq
    }

    /// Add a term, merging with an existing term on the same variable
    pub fn add_addend(&mut self, coefficient: f64, variable: VariableId) {
        if let Some(existing) = self.addends.iter_mut().find(|a| a.variable == variable) {
            existing.coefficient += coefficient;
        } else {
            self.addends.push(Addend {
                coefficient,
                variable,
            });
        }
        self.addends.retain(|a| a.coefficient != 0.0);
    }

    pub fn variables(&self) -> impl Iterator<Item = VariableId> + '_ {
        self.addends.iter().map(|a| a.variable)
    }

    /// Left-hand side under an assignment
    pub fn evaluate(&self, assignment: &[f64]) -> f64 {
        self.addends
            .iter()
            .map(|a| a.coefficient * assignment[a.variable])
            .sum()
    }
}

/// Piecewise-linear constraint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum PlConstraint {
    /// `output = max(0, input)`
    Relu { input: VariableId, output: VariableId },
    /// `output = 1` if `input >= 0`, else `-1`
    Sign { input: VariableId, output: VariableId },
    /// `output = max(inputs)`
    #[serde(rename = "maxpool")]
    MaxPool { inputs: Vec<VariableId>, output: VariableId },
}

impl PlConstraint {
    pub fn output(&self) -> VariableId {
        match self {
            Self::Relu { output, .. } | Self::Sign { output, .. } | Self::MaxPool { output, .. } => *output,
        }
    }

    pub fn inputs(&self) -> &[VariableId] {
        match self {
            Self::Relu { input, .. } | Self::Sign { input, .. } => std::slice::from_ref(input),
            Self::MaxPool { inputs, .. } => inputs,
        }
    }

    pub fn participates(&self, variable: VariableId) -> bool {
        self.output() == variable || self.inputs().contains(&variable)
    }

    /// Output value determined by the input values
    pub fn apply(&self, inputs: &[f64]) -> f64 {
        match self {
            Self::Relu { .. } => inputs[0].max(0.0),
            Self::Sign { .. } => {
                if inputs[0] >= 0.0 {
                    1.0
                } else {
                    -1.0
                }
            }
            Self::MaxPool { .. } => inputs.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        }
    }

    pub fn satisfied(&self, assignment: &[f64], tolerance: f64) -> bool {
        let inputs: Vec<f64> = self.inputs().iter().map(|&v| assignment[v]).collect();
        let expected = self.apply(&inputs);
        (assignment[self.output()] - expected).abs() <= tolerance * (1.0 + expected.abs())
    }
}
