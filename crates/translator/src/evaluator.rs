//! Reference evaluator
//!
//! Direct forward computation of each operation's defining function on
//! concrete tensors. It shares the shape helpers with translation but never
//! looks at equations or constraints, so comparing its results with a
//! solver's assignment checks the translation itself.

use crate::allocator::{Allocation, Slot, VarGroup};
use crate::graph::{OpGraph, OpKind, OpNode};
use crate::layout::DataFormat;
use crate::ops::conv::{ConvGeometry, PoolGeometry};
use crate::ops::elementwise::bias_axis;
use crate::ops::matmul::MatMulDims;
use crate::ops::shape_ops::{concat_shape, concat_slots};
use crate::ops::expect_arity;
use crate::shape::{broadcast_shapes, broadcast_source_index, reshape_target, TensorShape};
use crate::tensor::Tensor;
use crate::{Result, TranslateError};
use rustc_hash::FxHashMap;
use tracing::debug;

/// Check supplied tensors against the input groups, reshaping where the
/// element counts agree
pub fn prepare_inputs(groups: &[VarGroup], inputs: &[Tensor]) -> Result<Vec<Tensor>> {
    if inputs.len() != groups.len() {
        return Err(TranslateError::Shape(format!(
            "Bad input given: expected {} input tensors, received {}",
            groups.len(),
            inputs.len()
        )));
    }
    groups
        .iter()
        .zip(inputs)
        .enumerate()
        .map(|(i, (group, tensor))| {
            if tensor.shape() == &group.shape {
                return Ok(tensor.clone());
            }
            if tensor.numel() == group.len() {
                return tensor.reshape(group.shape.clone());
            }
            Err(TranslateError::Shape(format!(
                "Input {} ('{}') should have shape {}, but was given {}",
                i,
                group.name,
                group.shape,
                tensor.shape()
            )))
        })
        .collect()
}

/// Value of the output operation for one tensor per input group
pub fn evaluate(graph: &OpGraph, allocation: &Allocation, inputs: &[Tensor]) -> Result<Tensor> {
    let inputs = prepare_inputs(allocation.input_groups(), inputs)?;
    let mut values: FxHashMap<_, Tensor> = FxHashMap::default();
    for (&id, tensor) in allocation.inputs().iter().zip(inputs) {
        values.insert(id, tensor);
    }

    for &id in allocation.order() {
        if values.contains_key(&id) {
            continue;
        }
        let value = match allocation.slot(id) {
            Some(Slot::Const(t)) => t.clone(),
            Some(Slot::Vars(_)) => {
                let node = graph.node(id);
                let mut args = Vec::with_capacity(node.inputs.len());
                for input in graph.input_ids(id)? {
                    let value = values.get(&input).ok_or_else(|| {
                        TranslateError::Internal(format!(
                            "{} is evaluated before its input {}",
                            node.name,
                            graph.node(input).name
                        ))
                    })?;
                    args.push(value);
                }
                eval_op(node, &args)?
            }
            None => {
                return Err(TranslateError::Internal(format!(
                    "operation {} has no allocated value",
                    graph.node(id).name
                )))
            }
        };
        values.insert(id, value);
    }

    let output = allocation.output();
    debug!(output = %graph.node(output).name, "reference evaluation finished");
    values.remove(&output).ok_or_else(|| {
        TranslateError::Internal(format!(
            "output {} was not evaluated",
            graph.node(output).name
        ))
    })
}

/// Apply one operation to concrete operands
pub fn eval_op(node: &OpNode, inputs: &[&Tensor]) -> Result<Tensor> {
    match &node.kind {
        OpKind::Const => node.const_value(),
        OpKind::Placeholder => Err(TranslateError::Internal(format!(
            "placeholder {} has no supplied value",
            node.name
        ))),
        OpKind::Identity => {
            expect_arity(node, inputs.len(), 1)?;
            Ok(inputs[0].clone())
        }
        OpKind::Relu => {
            expect_arity(node, inputs.len(), 1)?;
            Ok(inputs[0].map(|x| x.max(0.0)))
        }
        OpKind::Sign => {
            expect_arity(node, inputs.len(), 1)?;
            Ok(inputs[0].map(|x| if x >= 0.0 { 1.0 } else { -1.0 }))
        }
        OpKind::Add => binary(node, inputs, |a, b| a + b),
        OpKind::Sub => binary(node, inputs, |a, b| a - b),
        OpKind::Mul => binary(node, inputs, |a, b| a * b),
        OpKind::RealDiv => binary(node, inputs, |a, b| a / b),
        OpKind::BiasAdd => bias_add(node, inputs),
        OpKind::MatMul => matmul(node, inputs),
        OpKind::Conv2D => conv2d(node, inputs),
        OpKind::MaxPool => max_pool(node, inputs),
        OpKind::Reshape => {
            expect_arity(node, inputs.len(), 2)?;
            let shape = reshape_target(inputs[0].shape(), &inputs[1].to_i64_vec())?;
            inputs[0].reshape(shape)
        }
        OpKind::Concat | OpKind::ConcatV2 => concat(node, inputs),
        OpKind::Unsupported(op) => Err(TranslateError::UnsupportedOp(format!(
            "operation {} has unsupported type {}",
            node.name, op
        ))),
    }
}

fn binary(node: &OpNode, inputs: &[&Tensor], f: impl Fn(f64, f64) -> f64) -> Result<Tensor> {
    expect_arity(node, inputs.len(), 2)?;
    let (a, b) = (inputs[0], inputs[1]);
    let shape = broadcast_shapes(a.shape(), b.shape())?;
    let data = (0..shape.numel())
        .map(|flat| {
            let idx = shape.unravel(flat);
            f(
                a.data()[broadcast_source_index(&idx, a.shape())],
                b.data()[broadcast_source_index(&idx, b.shape())],
            )
        })
        .collect();
    Tensor::new(shape, data)
}

fn bias_add(node: &OpNode, inputs: &[&Tensor]) -> Result<Tensor> {
    expect_arity(node, inputs.len(), 2)?;
    let format = DataFormat::parse(node.attr_str("data_format"))?;
    let (value, bias) = (inputs[0], inputs[1]);
    let axis = bias_axis(format, value.shape().rank());
    if value.shape().dim(axis) != Some(bias.numel()) {
        return Err(TranslateError::InvalidModel(format!(
            "BiasAdd {} cannot add bias {} to {}",
            node.name,
            bias.shape(),
            value.shape()
        )));
    }
    let mut out = value.clone();
    for (flat, x) in out.data_mut().iter_mut().enumerate() {
        let channel = value.shape().unravel(flat)[axis];
        *x += bias.data()[channel];
    }
    Ok(out)
}

fn matmul(node: &OpNode, inputs: &[&Tensor]) -> Result<Tensor> {
    expect_arity(node, inputs.len(), 2)?;
    let (a, b) = (inputs[0], inputs[1]);
    let dims = MatMulDims::from_node(node, a.shape(), b.shape())?;
    let mut out = Tensor::zeros(dims.output_shape());
    let data = out.data_mut();
    for i in 0..dims.m {
        for j in 0..dims.n {
            data[i * dims.n + j] = (0..dims.k)
                .map(|l| a.data()[dims.a_index(i, l)] * b.data()[dims.b_index(l, j)])
                .sum();
        }
    }
    Ok(out)
}

fn conv2d(node: &OpNode, inputs: &[&Tensor]) -> Result<Tensor> {
    expect_arity(node, inputs.len(), 2)?;
    let (input, filter) = (inputs[0], inputs[1]);
    let geo = ConvGeometry::from_node(node, input.shape(), filter.shape())?;
    let fmt = geo.format;
    let out_shape = geo.output_shape();
    let mut out = Tensor::zeros(out_shape.clone());

    for b in 0..geo.batch {
        for co in 0..geo.out_channels {
            for r in 0..geo.rows.output {
                for c in 0..geo.cols.output {
                    let mut acc = 0.0;
                    for kr in 0..geo.rows.size {
                        let Some(ir) = geo.rows.source(r, kr) else { continue };
                        for kc in 0..geo.cols.size {
                            let Some(ic) = geo.cols.source(c, kc) else { continue };
                            for ci in 0..geo.in_channels {
                                acc += input.get(&fmt.index(b, ci, ir, ic))
                                    * filter.data()[geo.filter_index(kr, kc, ci, co)];
                            }
                        }
                    }
                    out.data_mut()[out_shape.flat_index(&fmt.index(b, co, r, c))] = acc;
                }
            }
        }
    }
    Ok(out)
}

fn max_pool(node: &OpNode, inputs: &[&Tensor]) -> Result<Tensor> {
    expect_arity(node, inputs.len(), 1)?;
    let input = inputs[0];
    let geo = PoolGeometry::from_node(node, input.shape())?;
    let fmt = geo.format;
    let out_shape = geo.output_shape();
    let mut out = Tensor::zeros(out_shape.clone());

    for b in 0..geo.batch {
        for ch in 0..geo.channels {
            for r in 0..geo.rows.output {
                for c in 0..geo.cols.output {
                    let max = geo
                        .window(r, c)
                        .into_iter()
                        .map(|(ir, ic)| input.get(&fmt.index(b, ch, ir, ic)))
                        .fold(f64::NEG_INFINITY, f64::max);
                    out.data_mut()[out_shape.flat_index(&fmt.index(b, ch, r, c))] = max;
                }
            }
        }
    }
    Ok(out)
}

fn concat(node: &OpNode, inputs: &[&Tensor]) -> Result<Tensor> {
    let (values, axis_slot) = concat_slots(node, inputs.len())?;
    let axis = match inputs[axis_slot].data() {
        [a] => *a as i64,
        other => {
            return Err(TranslateError::InvalidModel(format!(
                "{} {} axis must be a scalar, got {} values",
                node.kind,
                node.name,
                other.len()
            )))
        }
    };
    let pieces = &inputs[values];
    let shapes: Vec<&TensorShape> = pieces.iter().map(|t| t.shape()).collect();
    let (shape, axis) = concat_shape(node, &shapes, axis)?;

    let mut data = Vec::with_capacity(shape.numel());
    for flat in 0..shape.numel() {
        let mut idx = shape.unravel(flat);
        for piece in pieces {
            let extent = piece.shape().dims()[axis];
            if idx[axis] < extent {
                data.push(piece.get(&idx));
                break;
            }
            idx[axis] -= extent;
        }
    }
    Tensor::new(shape, data)
}
