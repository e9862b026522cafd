//! Operation translator registry
//!
//! Each supported [`OpKind`] maps to one translation rule that turns the
//! node's operands and its allocated output group into equations and
//! piecewise-linear constraints. Dispatch is an exhaustive match, so a new
//! operator kind cannot be added without deciding how it translates.
//!
//! ## Supported Operations
//!
//! - **Element-wise**: Identity, Add, Sub, Mul and RealDiv by a constant, BiasAdd
//! - **Piecewise-linear**: Relu, Sign, MaxPool
//! - **Linear algebra**: MatMul, Conv2D
//! - **Shape ops**: Reshape, Concat, ConcatV2

pub mod conv;
pub mod elementwise;
pub mod matmul;
pub mod shape_ops;

use crate::allocator::VarGroup;
use crate::graph::{OpKind, OpNode};
use crate::network::{Equation, NetworkModel, VariableId};
use crate::shape::TensorShape;
use crate::tensor::Tensor;
use crate::{Result, TranslateError};

/// Value feeding an operation: folded constant or allocated variables
#[derive(Debug, Clone, Copy)]
pub enum Operand<'a> {
    Const(&'a Tensor),
    Vars(&'a VarGroup),
}

impl<'a> Operand<'a> {
    pub fn shape(&self) -> &'a TensorShape {
        match self {
            Operand::Const(t) => t.shape(),
            Operand::Vars(g) => &g.shape,
        }
    }

    /// Scalar term at a row-major position
    pub fn term(&self, flat: usize) -> Term {
        match self {
            Operand::Const(t) => Term::Const(t.data()[flat]),
            Operand::Vars(g) => Term::Var(g.var(flat)),
        }
    }

    pub fn as_const(&self) -> Option<&'a Tensor> {
        match self {
            Operand::Const(t) => Some(t),
            Operand::Vars(_) => None,
        }
    }

    pub fn as_vars(&self) -> Option<&'a VarGroup> {
        match self {
            Operand::Vars(g) => Some(g),
            Operand::Const(_) => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Term {
    Const(f64),
    Var(VariableId),
}

/// Affine expression under construction
#[derive(Debug, Default)]
pub(crate) struct Linear {
    terms: Vec<(f64, VariableId)>,
    constant: f64,
}

impl Linear {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, coefficient: f64, term: Term) {
        match term {
            Term::Const(c) => self.constant += coefficient * c,
            Term::Var(v) => self.terms.push((coefficient, v)),
        }
    }

    /// Add `a * b` where at most one factor is a variable
    pub fn add_product(&mut self, a: Term, b: Term) -> Result<()> {
        match (a, b) {
            (Term::Const(x), t) | (t, Term::Const(x)) => {
                self.add(x, t);
                Ok(())
            }
            (Term::Var(x), Term::Var(y)) => Err(TranslateError::Internal(format!(
                "product of variables {} and {} is not linear",
                x, y
            ))),
        }
    }

    /// Equation `output = self`
    pub fn defining(self, output: VariableId) -> Equation {
        Equation::defining(output, self.terms, self.constant)
    }
}

/// Reject operator kinds without a translation rule
pub fn ensure_supported(node: &OpNode) -> Result<()> {
    match &node.kind {
        OpKind::Unsupported(op) => Err(TranslateError::UnsupportedOp(format!(
            "operation {} has unsupported type {}",
            node.name, op
        ))),
        _ => Ok(()),
    }
}

/// Emit the equations and constraints defining `output`
pub fn translate(
    node: &OpNode,
    inputs: &[Operand<'_>],
    output: &VarGroup,
    model: &mut NetworkModel,
) -> Result<()> {
    match &node.kind {
        OpKind::Identity => elementwise::identity(node, inputs, output, model),
        OpKind::Add => elementwise::add_sub(node, inputs, output, model, 1.0),
        OpKind::Sub => elementwise::add_sub(node, inputs, output, model, -1.0),
        OpKind::Mul => elementwise::mul(node, inputs, output, model),
        OpKind::RealDiv => elementwise::real_div(node, inputs, output, model),
        OpKind::BiasAdd => elementwise::bias_add(node, inputs, output, model),
        OpKind::Relu => elementwise::relu(node, inputs, output, model),
        OpKind::Sign => elementwise::sign(node, inputs, output, model),
        OpKind::MatMul => matmul::translate(node, inputs, output, model),
        OpKind::Conv2D => conv::conv2d(node, inputs, output, model),
        OpKind::MaxPool => conv::max_pool(node, inputs, output, model),
        OpKind::Reshape => shape_ops::reshape(node, inputs, output, model),
        OpKind::Concat | OpKind::ConcatV2 => shape_ops::concat(node, inputs, output, model),
        OpKind::Placeholder | OpKind::Const => Err(TranslateError::Internal(format!(
            "{} {} is supplied, not computed",
            node.kind, node.name
        ))),
        OpKind::Unsupported(_) => ensure_supported(node),
    }
}

pub(crate) fn expect_arity(node: &OpNode, actual: usize, expected: usize) -> Result<()> {
    if actual != expected {
        return Err(TranslateError::InvalidModel(format!(
            "{} {} expects {} inputs, got {}",
            node.kind, node.name, expected, actual
        )));
    }
    Ok(())
}

/// Variable operand of a node whose constant inputs were folded away
pub(crate) fn vars_operand<'a>(node: &OpNode, operand: Operand<'a>) -> Result<&'a VarGroup> {
    operand.as_vars().ok_or_else(|| {
        TranslateError::Internal(format!(
            "{} {} has a constant operand that should have been folded",
            node.kind, node.name
        ))
    })
}
