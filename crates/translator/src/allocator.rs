//! Variable allocation over a resolved subgraph
//!
//! Declared inputs receive the first variable ranges, in declaration order.
//! Every other reachable operation is then visited in topological order:
//! constants and operations fed only by constants are folded to tensors,
//! everything else receives a contiguous row-major range of fresh ids.

use crate::evaluator;
use crate::graph::{NodeId, OpGraph, OpKind};
use crate::network::VariableId;
use crate::ops;
use crate::resolver::Resolution;
use crate::shape::TensorShape;
use crate::tensor::Tensor;
use crate::{Result, TranslateError};
use petgraph::algo::toposort;
use petgraph::graph::DiGraph;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::ops::Range;
use tracing::debug;

/// Contiguous variables holding one tensor, row-major
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VarGroup {
    pub name: String,
    pub first: VariableId,
    pub shape: TensorShape,
}

impl VarGroup {
    pub fn new(name: impl Into<String>, first: VariableId, shape: TensorShape) -> Self {
        Self {
            name: name.into(),
            first,
            shape,
        }
    }

    pub fn len(&self) -> usize {
        self.shape.numel()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Variable of the element at a row-major position
    pub fn var(&self, flat: usize) -> VariableId {
        self.first + flat
    }

    pub fn vars(&self) -> Range<VariableId> {
        self.first..self.first + self.len()
    }

    pub fn contains(&self, variable: VariableId) -> bool {
        self.vars().contains(&variable)
    }
}

/// Value of a reachable operation
#[derive(Debug, Clone)]
pub enum Slot {
    Vars(VarGroup),
    /// Folded at translation time, no variables
    Const(Tensor),
}

#[derive(Debug, Clone)]
pub struct Allocation {
    order: Vec<NodeId>,
    slots: FxHashMap<NodeId, Slot>,
    inputs: Vec<NodeId>,
    input_groups: Vec<VarGroup>,
    output: NodeId,
    output_group: VarGroup,
    num_variables: usize,
}

impl Allocation {
    /// Reachable operations, producers before consumers
    pub fn order(&self) -> &[NodeId] {
        &self.order
    }

    pub fn slot(&self, id: NodeId) -> Option<&Slot> {
        self.slots.get(&id)
    }

    pub fn inputs(&self) -> &[NodeId] {
        &self.inputs
    }

    pub fn is_input(&self, id: NodeId) -> bool {
        self.inputs.contains(&id)
    }

    pub fn input_groups(&self) -> &[VarGroup] {
        &self.input_groups
    }

    pub fn output(&self) -> NodeId {
        self.output
    }

    pub fn output_group(&self) -> &VarGroup {
        &self.output_group
    }

    pub fn num_variables(&self) -> usize {
        self.num_variables
    }
}

/// Assign variables to every value-carrying operation of the resolution
pub fn allocate(graph: &OpGraph, resolution: &Resolution) -> Result<Allocation> {
    let order = topological_order(graph, resolution)?;

    let mut next: VariableId = 0;
    let mut slots: FxHashMap<NodeId, Slot> = FxHashMap::default();
    let mut input_groups = Vec::with_capacity(resolution.inputs.len());

    for &id in &resolution.inputs {
        let name = &graph.node(id).name;
        let shape = graph.require_shape(id).map_err(|e| {
            TranslateError::Shape(format!(
                "declared input {} has no statically known shape ({})",
                name, e
            ))
        })?;
        let group = VarGroup::new(name.clone(), next, shape.clone());
        next += group.len();
        debug!(input = %group.name, shape = %group.shape, first = group.first, "allocated input group");
        slots.insert(id, Slot::Vars(group.clone()));
        input_groups.push(group);
    }

    for &id in &order {
        if slots.contains_key(&id) {
            continue;
        }
        let node = graph.node(id);
        let slot = match node.kind {
            OpKind::Const => Slot::Const(node.const_value()?),
            OpKind::Placeholder => {
                return Err(TranslateError::Internal(format!(
                    "placeholder {} reached allocation without a declared value",
                    node.name
                )))
            }
            _ => {
                ops::ensure_supported(node)?;
                let mut constants = Vec::new();
                for input in graph.input_ids(id)? {
                    if let Slot::Const(t) = slot_of(&slots, input, graph)? {
                        constants.push(t);
                    }
                }
                if !node.inputs.is_empty() && constants.len() == node.inputs.len() {
                    debug!(op = %node.name, "folded constant operation");
                    Slot::Const(evaluator::eval_op(node, &constants)?)
                } else {
                    let group = VarGroup::new(node.name.clone(), next, graph.require_shape(id)?.clone());
                    next += group.len();
                    Slot::Vars(group)
                }
            }
        };
        slots.insert(id, slot);
    }

    let output_node = graph.node(resolution.output);
    let output_group = match slot_of(&slots, resolution.output, graph)? {
        Slot::Vars(group) => group.clone(),
        Slot::Const(_) => {
            return Err(TranslateError::Topology(format!(
                "output {} does not depend on any input",
                output_node.name
            )))
        }
    };

    debug!(variables = next, operations = order.len(), "allocation complete");
    Ok(Allocation {
        order,
        slots,
        inputs: resolution.inputs.clone(),
        input_groups,
        output: resolution.output,
        output_group,
        num_variables: next,
    })
}

fn slot_of<'a>(slots: &'a FxHashMap<NodeId, Slot>, id: NodeId, graph: &OpGraph) -> Result<&'a Slot> {
    slots.get(&id).ok_or_else(|| {
        TranslateError::Internal(format!(
            "operation {} is used before it has a value",
            graph.node(id).name
        ))
    })
}

/// Producers-first order of the reachable subgraph
///
/// Declared inputs are sources: their own inputs are not part of the subgraph.
fn topological_order(graph: &OpGraph, resolution: &Resolution) -> Result<Vec<NodeId>> {
    let mut sub: DiGraph<NodeId, ()> = DiGraph::with_capacity(resolution.reachable.len(), 0);
    let mut local = FxHashMap::default();
    for &id in &resolution.reachable {
        local.insert(id, sub.add_node(id));
    }

    for &id in &resolution.reachable {
        if resolution.inputs.contains(&id) {
            continue;
        }
        for input in graph.input_ids(id)? {
            let source = local.get(&input).ok_or_else(|| {
                TranslateError::Internal(format!(
                    "input {} of {} is outside the resolved subgraph",
                    graph.node(input).name,
                    graph.node(id).name
                ))
            })?;
            sub.add_edge(*source, local[&id], ());
        }
    }

    let order = toposort(&sub, None).map_err(|cycle| {
        TranslateError::Internal(format!(
            "cycle detected through operation {}",
            graph.node(sub[cycle.node_id()]).name
        ))
    })?;
    Ok(order.into_iter().map(|ix| sub[ix]).collect())
}
