//! Matrix multiplication
//!
//! Row-major `[m, k] x [k, n]` products with TensorFlow's `transpose_a` and
//! `transpose_b` flags applied through index arithmetic.

use super::{expect_arity, Linear, Operand};
use crate::allocator::VarGroup;
use crate::graph::OpNode;
use crate::network::NetworkModel;
use crate::shape::TensorShape;
use crate::{Result, TranslateError};

/// Resolved MatMul dimensions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatMulDims {
    pub m: usize,
    pub k: usize,
    pub n: usize,
    pub transpose_a: bool,
    pub transpose_b: bool,
}

impl MatMulDims {
    pub fn from_node(node: &OpNode, a: &TensorShape, b: &TensorShape) -> Result<Self> {
        if a.rank() != 2 || b.rank() != 2 {
            return Err(TranslateError::UnsupportedOp(format!(
                "MatMul {} supports rank-2 operands only, got {} and {}",
                node.name, a, b
            )));
        }
        let transpose_a = node.attr_bool("transpose_a");
        let transpose_b = node.attr_bool("transpose_b");
        let (a0, a1) = (a.dims()[0], a.dims()[1]);
        let (b0, b1) = (b.dims()[0], b.dims()[1]);
        let (m, k) = if transpose_a { (a1, a0) } else { (a0, a1) };
        let (k2, n) = if transpose_b { (b1, b0) } else { (b0, b1) };

        if k != k2 {
            return Err(TranslateError::InvalidModel(format!(
                "MatMul {} inner dimensions differ: {} x {}",
                node.name, a, b
            )));
        }
        Ok(Self {
            m,
            k,
            n,
            transpose_a,
            transpose_b,
        })
    }

    pub fn output_shape(&self) -> TensorShape {
        TensorShape::new(vec![self.m, self.n])
    }

    /// Flat index of logical `A[i, l]`
    pub fn a_index(&self, i: usize, l: usize) -> usize {
        if self.transpose_a {
            l * self.m + i
        } else {
            i * self.k + l
        }
    }

    /// Flat index of logical `B[l, j]`
    pub fn b_index(&self, l: usize, j: usize) -> usize {
        if self.transpose_b {
            j * self.k + l
        } else {
            l * self.n + j
        }
    }
}

/// One dot-product equation per output element
pub(super) fn translate(
    node: &OpNode,
    inputs: &[Operand<'_>],
    output: &VarGroup,
    model: &mut NetworkModel,
) -> Result<()> {
    expect_arity(node, inputs.len(), 2)?;
    let (a, b) = (inputs[0], inputs[1]);
    if a.as_vars().is_some() && b.as_vars().is_some() {
        return Err(TranslateError::UnsupportedOp(format!(
            "MatMul {} multiplies two variable tensors",
            node.name
        )));
    }
    let dims = MatMulDims::from_node(node, a.shape(), b.shape())?;

    for i in 0..dims.m {
        for j in 0..dims.n {
            let mut lin = Linear::new();
            for l in 0..dims.k {
                lin.add_product(a.term(dims.a_index(i, l)), b.term(dims.b_index(l, j)))?;
            }
            model.add_equation(lin.defining(output.var(i * dims.n + j)));
        }
    }
    Ok(())
}
