//! Element-wise operations
//!
//! Binary operations broadcast their operands against the output shape with
//! the same rules as [`broadcast_shapes`](crate::shape::broadcast_shapes).

use super::{expect_arity, vars_operand, Linear, Operand};
use crate::allocator::VarGroup;
use crate::graph::OpNode;
use crate::layout::DataFormat;
use crate::network::{NetworkModel, PlConstraint};
use crate::shape::broadcast_source_index;
use crate::{Result, TranslateError};

/// `y = x`
pub(super) fn identity(
    node: &OpNode,
    inputs: &[Operand<'_>],
    output: &VarGroup,
    model: &mut NetworkModel,
) -> Result<()> {
    expect_arity(node, inputs.len(), 1)?;
    alias(inputs[0], output, model);
    Ok(())
}

/// Output element `i` equals input element `i` in row-major order
pub(super) fn alias(input: Operand<'_>, output: &VarGroup, model: &mut NetworkModel) {
    for i in 0..output.len() {
        let mut lin = Linear::new();
        lin.add(1.0, input.term(i));
        model.add_equation(lin.defining(output.var(i)));
    }
}

/// `y = a + sign * b`
pub(super) fn add_sub(
    node: &OpNode,
    inputs: &[Operand<'_>],
    output: &VarGroup,
    model: &mut NetworkModel,
    sign: f64,
) -> Result<()> {
    expect_arity(node, inputs.len(), 2)?;
    let (a, b) = (inputs[0], inputs[1]);
    for flat in 0..output.len() {
        let idx = output.shape.unravel(flat);
        let mut lin = Linear::new();
        lin.add(1.0, a.term(broadcast_source_index(&idx, a.shape())));
        lin.add(sign, b.term(broadcast_source_index(&idx, b.shape())));
        model.add_equation(lin.defining(output.var(flat)));
    }
    Ok(())
}

/// `y = a * b` with one constant factor
pub(super) fn mul(
    node: &OpNode,
    inputs: &[Operand<'_>],
    output: &VarGroup,
    model: &mut NetworkModel,
) -> Result<()> {
    expect_arity(node, inputs.len(), 2)?;
    let (a, b) = (inputs[0], inputs[1]);
    if a.as_vars().is_some() && b.as_vars().is_some() {
        return Err(TranslateError::UnsupportedOp(format!(
            "Mul {} multiplies two variable tensors",
            node.name
        )));
    }
    for flat in 0..output.len() {
        let idx = output.shape.unravel(flat);
        let mut lin = Linear::new();
        lin.add_product(
            a.term(broadcast_source_index(&idx, a.shape())),
            b.term(broadcast_source_index(&idx, b.shape())),
        )?;
        model.add_equation(lin.defining(output.var(flat)));
    }
    Ok(())
}

/// `y = a / b` with a constant, non-zero divisor
pub(super) fn real_div(
    node: &OpNode,
    inputs: &[Operand<'_>],
    output: &VarGroup,
    model: &mut NetworkModel,
) -> Result<()> {
    expect_arity(node, inputs.len(), 2)?;
    let (a, b) = (inputs[0], inputs[1]);
    let divisor = b.as_const().ok_or_else(|| {
        TranslateError::UnsupportedOp(format!(
            "RealDiv {} divides by a variable tensor",
            node.name
        ))
    })?;
    if divisor.data().iter().any(|&d| d == 0.0) {
        return Err(TranslateError::InvalidModel(format!(
            "RealDiv {} divides by zero",
            node.name
        )));
    }
    for flat in 0..output.len() {
        let idx = output.shape.unravel(flat);
        let d = divisor.data()[broadcast_source_index(&idx, divisor.shape())];
        let mut lin = Linear::new();
        lin.add(1.0 / d, a.term(broadcast_source_index(&idx, a.shape())));
        model.add_equation(lin.defining(output.var(flat)));
    }
    Ok(())
}

/// Channel axis of a BiasAdd value of the given rank
pub fn bias_axis(format: DataFormat, rank: usize) -> usize {
    match format {
        DataFormat::Nhwc => rank.saturating_sub(1),
        DataFormat::Nchw => 1,
    }
}

/// `y[..c..] = x[..c..] + bias[c]`
pub(super) fn bias_add(
    node: &OpNode,
    inputs: &[Operand<'_>],
    output: &VarGroup,
    model: &mut NetworkModel,
) -> Result<()> {
    expect_arity(node, inputs.len(), 2)?;
    let format = DataFormat::parse(node.attr_str("data_format"))?;
    let axis = bias_axis(format, output.shape.rank());
    let (value, bias) = (inputs[0], inputs[1]);
    for flat in 0..output.len() {
        let idx = output.shape.unravel(flat);
        let mut lin = Linear::new();
        lin.add(1.0, value.term(flat));
        lin.add(1.0, bias.term(idx[axis]));
        model.add_equation(lin.defining(output.var(flat)));
    }
    Ok(())
}

/// One Relu constraint per element, outputs bounded below by 0
pub(super) fn relu(
    node: &OpNode,
    inputs: &[Operand<'_>],
    output: &VarGroup,
    model: &mut NetworkModel,
) -> Result<()> {
    expect_arity(node, inputs.len(), 1)?;
    let input = vars_operand(node, inputs[0])?;
    for (x, y) in input.vars().zip(output.vars()) {
        model.add_pl_constraint(PlConstraint::Relu {
            input: x,
            output: y,
        });
        model.set_lower_bound(y, 0.0);
    }
    Ok(())
}

/// One Sign constraint per element, outputs bounded to `[-1, 1]`
pub(super) fn sign(
    node: &OpNode,
    inputs: &[Operand<'_>],
    output: &VarGroup,
    model: &mut NetworkModel,
) -> Result<()> {
    expect_arity(node, inputs.len(), 1)?;
    let input = vars_operand(node, inputs[0])?;
    for (x, y) in input.vars().zip(output.vars()) {
        model.add_pl_constraint(PlConstraint::Sign {
            input: x,
            output: y,
        });
        model.set_lower_bound(y, -1.0);
        model.set_upper_bound(y, 1.0);
    }
    Ok(())
}
