//! Reshape and concatenation
//!
//! Both only move elements: every output element is aliased to exactly one
//! input element.

use super::elementwise::alias;
use super::{expect_arity, Linear, Operand};
use crate::allocator::VarGroup;
use crate::graph::{OpKind, OpNode};
use crate::network::NetworkModel;
use crate::shape::TensorShape;
use crate::{Result, TranslateError};
use std::ops::Range;

/// Flattened-index aliasing, element counts must agree
pub(super) fn reshape(
    node: &OpNode,
    inputs: &[Operand<'_>],
    output: &VarGroup,
    model: &mut NetworkModel,
) -> Result<()> {
    expect_arity(node, inputs.len(), 2)?;
    let input = inputs[0];
    if input.shape().numel() != output.len() {
        return Err(TranslateError::InvalidModel(format!(
            "Reshape {} cannot map {} onto {}",
            node.name,
            input.shape(),
            output.shape
        )));
    }
    alias(input, output, model);
    Ok(())
}

/// Input slots holding the values and the axis of a concat node
pub fn concat_slots(node: &OpNode, num_inputs: usize) -> Result<(Range<usize>, usize)> {
    if num_inputs < 2 {
        return Err(TranslateError::InvalidModel(format!(
            "{} {} needs at least one value and an axis",
            node.kind, node.name
        )));
    }
    Ok(match node.kind {
        OpKind::Concat => (1..num_inputs, 0),
        _ => (0..num_inputs - 1, num_inputs - 1),
    })
}

/// Output shape and normalized axis of a concatenation
pub fn concat_shape(node: &OpNode, pieces: &[&TensorShape], axis: i64) -> Result<(TensorShape, usize)> {
    let first = pieces[0];
    let axis = first.axis(axis)?;
    let mut dims = first.dims().to_vec();
    dims[axis] = 0;

    for piece in pieces {
        let compatible = piece.rank() == first.rank()
            && piece
                .dims()
                .iter()
                .zip(first.dims())
                .enumerate()
                .all(|(i, (a, b))| i == axis || a == b);
        if !compatible {
            return Err(TranslateError::InvalidModel(format!(
                "{} {} cannot concatenate {} with {} along axis {}",
                node.kind, node.name, first, piece, axis
            )));
        }
        dims[axis] += piece.dims()[axis];
    }
    Ok((TensorShape::new(dims), axis))
}

/// Read the constant concat axis
pub fn concat_axis(node: &OpNode, operand: Operand<'_>) -> Result<i64> {
    let axis = operand.as_const().ok_or_else(|| {
        TranslateError::UnsupportedOp(format!(
            "{} {} has a non-constant axis",
            node.kind, node.name
        ))
    })?;
    match axis.data() {
        [a] => Ok(*a as i64),
        other => Err(TranslateError::InvalidModel(format!(
            "{} {} axis must be a scalar, got {} values",
            node.kind,
            node.name,
            other.len()
        ))),
    }
}

/// Alias each output element to its element in the owning input piece
pub(super) fn concat(
    node: &OpNode,
    inputs: &[Operand<'_>],
    output: &VarGroup,
    model: &mut NetworkModel,
) -> Result<()> {
    let (values, axis_slot) = concat_slots(node, inputs.len())?;
    let axis = concat_axis(node, inputs[axis_slot])?;
    let pieces = &inputs[values];
    let shapes: Vec<&TensorShape> = pieces.iter().map(|p| p.shape()).collect();
    let (_, axis) = concat_shape(node, &shapes, axis)?;

    for flat in 0..output.len() {
        let mut idx = output.shape.unravel(flat);
        let mut offset = idx[axis];
        let mut source = None;
        for piece in pieces {
            let extent = piece.shape().dims()[axis];
            if offset < extent {
                source = Some(piece);
                break;
            }
            offset -= extent;
        }
        let piece = source.ok_or_else(|| {
            TranslateError::Internal(format!(
                "{} {} output index {} lies outside its inputs",
                node.kind, node.name, flat
            ))
        })?;
        idx[axis] = offset;
        let mut lin = Linear::new();
        lin.add(1.0, piece.term(piece.shape().flat_index(&idx)));
        model.add_equation(lin.defining(output.var(flat)));
    }
    Ok(())
}
