//! Static shape inference
//!
//! Propagates tensor shapes through the op-graph once, at load time.
//!
//! ## Algorithm
//!
//! 1. Order nodes by strongly connected components in reverse post-order
//! 2. Skip nodes on a cycle; they and their consumers stay shapeless
//! 3. For each node, derive the output shape from its input shapes using
//!    operator-specific rules, tracking constant values for shape operands
//! 4. Where no rule applies, or an input is shapeless, fall back to the
//!    shape the exporter recorded in `_output_shapes`
//!
//! Malformed shapes on supported operators fail the load. Operators or
//! attribute combinations that cannot be translated leave the node shapeless
//! with a note, so they only fail once they are actually used.

use super::ir::{NodeId, OpGraph, OpKind, OpNode};
use crate::ops::conv::{ConvGeometry, PoolGeometry};
use crate::ops::elementwise::bias_axis;
use crate::ops::matmul::MatMulDims;
use crate::ops::shape_ops::{concat_shape, concat_slots};
use crate::layout::DataFormat;
use crate::shape::{broadcast_shapes, reshape_target, TensorShape};
use crate::tensor::Tensor;
use crate::{Result, TranslateError};
use ahash::AHashMap;
use petgraph::algo::tarjan_scc;
use tracing::{debug, warn};

pub(crate) fn infer_shapes(graph: &mut OpGraph) -> Result<()> {
    let mut constants: AHashMap<NodeId, Tensor> = AHashMap::new();

    for (id, cyclic) in inference_order(graph) {
        if cyclic {
            let name = graph.node(id).name.clone();
            warn!(op = %name, "operation lies on a cycle");
            graph.note_shapeless(id, format!("operation {} lies on a cycle", name));
            continue;
        }

        // `None` reason: an input is shapeless, the node itself is fine
        let reason = match input_shapes(graph, id) {
            Some(inputs) => match infer_node(graph.node(id), &inputs, &mut constants, id) {
                Ok(shape) => {
                    graph.set_shape(id, shape);
                    continue;
                }
                Err(TranslateError::UnsupportedOp(reason)) => Some(reason),
                Err(e) => return Err(e),
            },
            None => None,
        };

        let node = graph.node(id);
        if let Some(shape) = node.recorded_shape() {
            debug!(op = %node.name, %shape, "using recorded output shape");
            graph.set_shape(id, Some(shape));
        } else if let Some(reason) = reason {
            debug!(op = %node.name, %reason, "left without shape");
            graph.note_shapeless(id, reason);
        }
    }
    Ok(())
}

/// Topological order with a cycle flag per node
fn inference_order(graph: &OpGraph) -> Vec<(NodeId, bool)> {
    let pg = graph.petgraph();
    let mut order = Vec::with_capacity(graph.len());
    // tarjan_scc yields components in post-order
    for scc in tarjan_scc(pg).into_iter().rev() {
        let cyclic = scc.len() > 1 || pg.find_edge(scc[0], scc[0]).is_some();
        order.extend(scc.into_iter().map(|id| (id, cyclic)));
    }
    order
}

/// Input ids and shapes, `None` if any input is missing or shapeless
fn input_shapes(graph: &OpGraph, id: NodeId) -> Option<Vec<(NodeId, TensorShape)>> {
    graph
        .node(id)
        .inputs
        .iter()
        .map(|name| {
            let input = graph.id_of(name)?;
            graph.node(input).shape.clone().map(|s| (input, s))
        })
        .collect()
}

fn infer_node(
    node: &OpNode,
    inputs: &[(NodeId, TensorShape)],
    constants: &mut AHashMap<NodeId, Tensor>,
    id: NodeId,
) -> Result<Option<TensorShape>> {
    let out = match &node.kind {
        OpKind::Placeholder => match node.attr_shape("shape") {
            Some(dims) => TensorShape::from_partial(dims).map_err(|_| {
                TranslateError::UnsupportedOp(format!(
                    "placeholder {} has unresolved dimensions {:?}",
                    node.name, dims
                ))
            })?,
            None => {
                return Err(TranslateError::UnsupportedOp(format!(
                    "placeholder {} has no static shape",
                    node.name
                )))
            }
        },
        OpKind::Const => match node.const_value() {
            Ok(value) => {
                let s = value.shape().clone();
                constants.insert(id, value);
                s
            }
            Err(e) => {
                warn!(op = %node.name, error = %e, "constant could not be decoded");
                return Err(TranslateError::UnsupportedOp(e.to_string()));
            }
        },
        OpKind::Identity => {
            arity(node, inputs, 1)?;
            if let Some(value) = constants.get(&inputs[0].0).cloned() {
                constants.insert(id, value);
            }
            inputs[0].1.clone()
        }
        OpKind::Relu | OpKind::Sign => {
            arity(node, inputs, 1)?;
            inputs[0].1.clone()
        }
        OpKind::Add | OpKind::Sub | OpKind::Mul | OpKind::RealDiv => {
            arity(node, inputs, 2)?;
            broadcast_shapes(&inputs[0].1, &inputs[1].1).map_err(|e| named(node, e))?
        }
        OpKind::BiasAdd => {
            arity(node, inputs, 2)?;
            let format = DataFormat::parse(node.attr_str("data_format"))?;
            let (value, bias) = (&inputs[0].1, &inputs[1].1);
            if value.rank() < 2 || bias.rank() != 1 || bias.dims()[0] != value.dims()[bias_axis(format, value.rank())] {
                return Err(TranslateError::InvalidModel(format!(
                    "BiasAdd {} cannot add bias {} to {}",
                    node.name, bias, value
                )));
            }
            value.clone()
        }
        OpKind::MatMul => {
            arity(node, inputs, 2)?;
            MatMulDims::from_node(node, &inputs[0].1, &inputs[1].1)?.output_shape()
        }
        OpKind::Conv2D => {
            arity(node, inputs, 2)?;
            ConvGeometry::from_node(node, &inputs[0].1, &inputs[1].1)?.output_shape()
        }
        OpKind::MaxPool => {
            arity(node, inputs, 1)?;
            PoolGeometry::from_node(node, &inputs[0].1)?.output_shape()
        }
        OpKind::Reshape => {
            arity(node, inputs, 2)?;
            let target = constants.get(&inputs[1].0).ok_or_else(|| {
                TranslateError::UnsupportedOp(format!(
                    "Reshape {} needs a constant shape operand",
                    node.name
                ))
            })?;
            reshape_target(&inputs[0].1, &target.to_i64_vec()).map_err(|e| named(node, e))?
        }
        OpKind::Concat | OpKind::ConcatV2 => {
            let (values, axis_slot) = concat_slots(node, inputs.len())?;
            let axis = constants.get(&inputs[axis_slot].0).ok_or_else(|| {
                TranslateError::UnsupportedOp(format!(
                    "{} {} needs a constant axis",
                    node.kind, node.name
                ))
            })?;
            let axis = axis.data().first().copied().unwrap_or_default() as i64;
            let pieces: Vec<&TensorShape> = inputs[values].iter().map(|(_, s)| s).collect();
            concat_shape(node, &pieces, axis)?.0
        }
        OpKind::Unsupported(op) => {
            return Err(TranslateError::UnsupportedOp(format!(
                "operation {} has unsupported type {}",
                node.name, op
            )))
        }
    };
    Ok(Some(out))
}

fn arity(node: &OpNode, inputs: &[(NodeId, TensorShape)], expected: usize) -> Result<()> {
    crate::ops::expect_arity(node, inputs.len(), expected)
}

fn named(node: &OpNode, err: TranslateError) -> TranslateError {
    match err {
        TranslateError::InvalidModel(msg) => {
            TranslateError::InvalidModel(format!("{} {}: {}", node.kind, node.name, msg))
        }
        other => other,
    }
}
