// Op-graph intermediate representation
//
// Uniform view of TensorFlow graphs using petgraph. Every source format is
// normalized into named operation nodes with a closed operator kind, ordered
// input references, a static output shape and typed attributes.

use crate::proto::{attr_value, GraphDef, NodeDef, TensorProto};
use crate::shape::TensorShape;
use crate::tensor::{partial_shape_from_proto, Tensor};
use crate::{Result, TranslateError};
use petgraph::stable_graph::{NodeIndex, StableGraph};
use petgraph::visit::{EdgeRef, IntoEdgeReferences};
use petgraph::Direction;
use rustc_hash::FxHashMap;
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Node identifier in the graph (petgraph NodeIndex)
pub type NodeId = NodeIndex;

/// Operator kinds understood by the translator
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum OpKind {
    Placeholder,
    Const,
    Identity,
    MatMul,
    Add,
    Sub,
    Mul,
    RealDiv,
    BiasAdd,
    Conv2D,
    MaxPool,
    Relu,
    Sign,
    Reshape,
    /// Values first, axis last
    ConcatV2,
    /// Axis first, values after
    Concat,
    /// Any other TensorFlow op; a hard failure once reachable
    Unsupported(String),
}

impl OpKind {
    pub fn from_tf(op: &str) -> Self {
        match op {
            "Placeholder" => Self::Placeholder,
            "Const" => Self::Const,
            "Identity" => Self::Identity,
            "MatMul" => Self::MatMul,
            "Add" | "AddV2" => Self::Add,
            "Sub" => Self::Sub,
            "Mul" => Self::Mul,
            "RealDiv" => Self::RealDiv,
            "BiasAdd" => Self::BiasAdd,
            "Conv2D" => Self::Conv2D,
            "MaxPool" => Self::MaxPool,
            "Relu" => Self::Relu,
            "Sign" => Self::Sign,
            "Reshape" => Self::Reshape,
            "ConcatV2" => Self::ConcatV2,
            "Concat" => Self::Concat,
            other => Self::Unsupported(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Placeholder => "Placeholder",
            Self::Const => "Const",
            Self::Identity => "Identity",
            Self::MatMul => "MatMul",
            Self::Add => "Add",
            Self::Sub => "Sub",
            Self::Mul => "Mul",
            Self::RealDiv => "RealDiv",
            Self::BiasAdd => "BiasAdd",
            Self::Conv2D => "Conv2D",
            Self::MaxPool => "MaxPool",
            Self::Relu => "Relu",
            Self::Sign => "Sign",
            Self::Reshape => "Reshape",
            Self::ConcatV2 => "ConcatV2",
            Self::Concat => "Concat",
            Self::Unsupported(op) => op,
        }
    }
}

impl std::fmt::Display for OpKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Static operation attribute
#[derive(Debug, Clone, PartialEq)]
pub enum Attr {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Ints(Vec<i64>),
    Strs(Vec<String>),
    Floats(Vec<f64>),
    Bools(Vec<bool>),
    DTypes(Vec<i32>),
    /// Partially known shape, `None` for unknown rank
    Shape(Option<Vec<Option<usize>>>),
    /// One partial shape per list entry, e.g. `_output_shapes`
    Shapes(Vec<Option<Vec<Option<usize>>>>),
    /// Kept encoded; decoded on demand by [`OpNode::const_value`]
    Tensor(TensorProto),
    DType(i32),
}

impl Attr {
    fn from_proto(value: &attr_value::Value) -> Self {
        use attr_value::Value;
        match value {
            Value::S(bytes) => Attr::Str(String::from_utf8_lossy(bytes).into_owned()),
            Value::I(i) => Attr::Int(*i),
            Value::F(f) => Attr::Float(*f as f64),
            Value::B(b) => Attr::Bool(*b),
            Value::Type(t) => Attr::DType(*t),
            Value::Shape(s) => Attr::Shape(partial_shape_from_proto(s)),
            Value::Tensor(t) => Attr::Tensor(t.clone()),
            Value::List(list) => {
                if !list.shape.is_empty() {
                    Attr::Shapes(list.shape.iter().map(partial_shape_from_proto).collect())
                } else if !list.s.is_empty() {
                    Attr::Strs(
                        list.s
                            .iter()
                            .map(|b| String::from_utf8_lossy(b).into_owned())
                            .collect(),
                    )
                } else if !list.f.is_empty() {
                    Attr::Floats(list.f.iter().map(|&f| f as f64).collect())
                } else if !list.b.is_empty() {
                    Attr::Bools(list.b.clone())
                } else if !list.r#type.is_empty() {
                    Attr::DTypes(list.r#type.clone())
                } else {
                    Attr::Ints(list.i.clone())
                }
            }
        }
    }
}

/// Dependency edge: the source's output feeds `input_slot` of the target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dependency {
    pub input_slot: usize,
}

/// A named operation of the graph
#[derive(Debug, Clone)]
pub struct OpNode {
    pub name: String,
    /// TensorFlow op tag as written in the model
    pub op_type: String,
    pub kind: OpKind,
    /// Producer names, in input slot order
    pub inputs: Vec<String>,
    pub attrs: FxHashMap<String, Attr>,
    /// Static output shape, `None` when it cannot be inferred
    pub shape: Option<TensorShape>,
}

impl OpNode {
    pub fn new(name: impl Into<String>, op_type: impl Into<String>) -> Self {
        let op_type = op_type.into();
        Self {
            name: name.into(),
            kind: OpKind::from_tf(&op_type),
            op_type,
            inputs: Vec::new(),
            attrs: FxHashMap::default(),
            shape: None,
        }
    }

    pub fn with_inputs<I, S>(mut self, inputs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inputs = inputs.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_attr(mut self, key: impl Into<String>, value: Attr) -> Self {
        self.attrs.insert(key.into(), value);
        self
    }

    /// Create from a TensorFlow NodeDef, normalizing input references
    pub fn from_node_def(def: &NodeDef) -> Self {
        let mut node = Self::new(def.name.clone(), def.op.clone());
        node.inputs = def.input.iter().filter_map(|i| normalize_input(i)).collect();
        for (key, value) in &def.attr {
            if let Some(attr) = value.value.as_ref().map(Attr::from_proto) {
                node.attrs.insert(key.clone(), attr);
            }
        }
        node
    }

    pub fn attr(&self, name: &str) -> Option<&Attr> {
        self.attrs.get(name)
    }

    pub fn attr_str(&self, name: &str) -> Option<&str> {
        match self.attrs.get(name) {
            Some(Attr::Str(s)) => Some(s),
            _ => None,
        }
    }

    pub fn attr_bool(&self, name: &str) -> bool {
        matches!(self.attrs.get(name), Some(Attr::Bool(true)))
    }

    pub fn attr_ints(&self, name: &str) -> Option<&[i64]> {
        match self.attrs.get(name) {
            Some(Attr::Ints(v)) => Some(v),
            _ => None,
        }
    }

    /// Declared placeholder shape
    pub fn attr_shape(&self, name: &str) -> Option<&[Option<usize>]> {
        match self.attrs.get(name) {
            Some(Attr::Shape(Some(dims))) => Some(dims),
            _ => None,
        }
    }

    /// Shape recorded by the exporter in `_output_shapes`, if fully known
    ///
    /// An unknown leading dimension resolves to 1, as for placeholders.
    pub fn recorded_shape(&self) -> Option<TensorShape> {
        match self.attrs.get("_output_shapes") {
            Some(Attr::Shapes(shapes)) => match shapes.first() {
                Some(Some(dims)) => TensorShape::from_partial(dims).ok(),
                _ => None,
            },
            _ => None,
        }
    }

    /// Decoded `value` tensor of a Const node
    pub fn const_value(&self) -> Result<Tensor> {
        match self.attrs.get("value") {
            Some(Attr::Tensor(proto)) => Tensor::from_proto(proto).map_err(|e| {
                TranslateError::InvalidModel(format!("constant {}: {}", self.name, e))
            }),
            _ => Err(TranslateError::InvalidModel(format!(
                "constant {} has no tensor value",
                self.name
            ))),
        }
    }
}

/// Strip control inputs and the default output slot suffix
fn normalize_input(input: &str) -> Option<String> {
    if input.starts_with('^') {
        return None;
    }
    Some(input.strip_suffix(":0").unwrap_or(input).to_string())
}

/// Op-graph backed by petgraph with a name index
#[derive(Debug, Clone)]
pub struct OpGraph {
    graph: StableGraph<OpNode, Dependency>,
    name_to_id: FxHashMap<String, NodeId>,
    /// Nodes in source order
    order: Vec<NodeId>,
    /// Why shape inference gave up on a node
    shape_notes: FxHashMap<NodeId, String>,
}

impl OpGraph {
    /// Convert from a TensorFlow GraphDef and infer static shapes
    pub fn from_graph_def(graph_def: &GraphDef) -> Result<Self> {
        let nodes = graph_def.node.iter().map(OpNode::from_node_def).collect();
        Self::from_nodes(nodes)
    }

    /// Build from already normalized nodes and infer static shapes
    pub fn from_nodes(nodes: Vec<OpNode>) -> Result<Self> {
        let mut graph = StableGraph::with_capacity(nodes.len(), nodes.len());
        let mut name_to_id = FxHashMap::default();
        let mut order = Vec::with_capacity(nodes.len());

        for node in nodes {
            let name = node.name.clone();
            let id = graph.add_node(node);
            if name_to_id.insert(name.clone(), id).is_some() {
                return Err(TranslateError::InvalidModel(format!(
                    "duplicate operation name {}",
                    name
                )));
            }
            order.push(id);
        }

        // Collect edge information first to avoid borrowing the graph twice
        let edges: Vec<_> = order
            .iter()
            .flat_map(|&target| {
                graph[target]
                    .inputs
                    .iter()
                    .enumerate()
                    .filter_map(|(input_slot, input)| {
                        name_to_id
                            .get(input)
                            .map(|&source| (source, target, input_slot))
                    })
                    .collect::<Vec<_>>()
            })
            .collect();
        for (source, target, input_slot) in edges {
            graph.add_edge(source, target, Dependency { input_slot });
        }

        let mut op_graph = Self {
            graph,
            name_to_id,
            order,
            shape_notes: FxHashMap::default(),
        };
        super::shape_inference::infer_shapes(&mut op_graph)?;

        info!(
            nodes = op_graph.len(),
            edges = op_graph.graph.edge_count(),
            "loaded op-graph"
        );
        Ok(op_graph)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn node(&self, id: NodeId) -> &OpNode {
        &self.graph[id]
    }

    pub(crate) fn set_shape(&mut self, id: NodeId, shape: Option<TensorShape>) {
        self.graph[id].shape = shape;
    }

    pub(crate) fn note_shapeless(&mut self, id: NodeId, reason: String) {
        self.shape_notes.insert(id, reason);
    }

    /// Output shape, required once the node takes part in translation
    pub fn require_shape(&self, id: NodeId) -> Result<&TensorShape> {
        let node = &self.graph[id];
        node.shape.as_ref().ok_or_else(|| match self.shape_notes.get(&id) {
            Some(reason) => TranslateError::UnsupportedOp(reason.clone()),
            None => TranslateError::UnsupportedOp(format!(
                "operation {} ({}) has no statically known output shape",
                node.name, node.op_type
            )),
        })
    }

    pub fn node_by_name(&self, name: &str) -> Option<&OpNode> {
        self.id_of(name).map(|id| &self.graph[id])
    }

    pub fn id_of(&self, name: &str) -> Option<NodeId> {
        self.name_to_id.get(name).copied()
    }

    /// Nodes in source order
    pub fn nodes(&self) -> impl Iterator<Item = &OpNode> + '_ {
        self.order.iter().map(move |&id| &self.graph[id])
    }

    /// Producers of a node's inputs, in slot order
    ///
    /// A reference to a name that is not in the graph is an internal error.
    pub fn input_ids(&self, id: NodeId) -> Result<Vec<NodeId>> {
        let node = &self.graph[id];
        node.inputs
            .iter()
            .map(|input| {
                self.id_of(input).ok_or_else(|| {
                    TranslateError::Internal(format!(
                        "operation {} references unknown input {}",
                        node.name, input
                    ))
                })
            })
            .collect()
    }

    /// Placeholder nodes in source order
    pub fn placeholders(&self) -> Vec<NodeId> {
        self.order
            .iter()
            .copied()
            .filter(|&id| self.graph[id].kind == OpKind::Placeholder)
            .collect()
    }

    /// Computed nodes without consumers, in source order
    pub fn terminal_nodes(&self) -> Vec<NodeId> {
        self.order
            .iter()
            .copied()
            .filter(|&id| {
                !matches!(self.graph[id].kind, OpKind::Const | OpKind::Placeholder)
                    && self
                        .graph
                        .neighbors_directed(id, Direction::Outgoing)
                        .next()
                        .is_none()
            })
            .collect()
    }

    pub fn petgraph(&self) -> &StableGraph<OpNode, Dependency> {
        &self.graph
    }

    /// Export to Graphviz DOT format
    pub fn visualize_dot(&self) -> String {
        use std::fmt::Write;
        let mut dot = String::new();
        let _ = writeln!(dot, "digraph OpGraph {{");
        let _ = writeln!(dot, "  rankdir=TB;");
        let _ = writeln!(dot, "  node [shape=box, style=rounded];");

        for &id in &self.order {
            let node = &self.graph[id];
            let shape = node
                .shape
                .as_ref()
                .map_or_else(|| "?".to_string(), |s| s.to_string());
            let color = match node.kind {
                OpKind::Placeholder => "lightpink",
                OpKind::Const => "lightgray",
                OpKind::Add | OpKind::Sub | OpKind::Mul | OpKind::RealDiv | OpKind::BiasAdd => "lightblue",
                OpKind::MatMul | OpKind::Conv2D => "lightgreen",
                OpKind::Relu | OpKind::Sign | OpKind::MaxPool => "lightyellow",
                OpKind::Unsupported(_) => "tomato",
                _ => "white",
            };
            let _ = writeln!(
                dot,
                "  node{} [label=\"{}\\n{}\\n{}\", fillcolor={}, style=filled];",
                id.index(),
                node.op_type,
                node.name,
                shape,
                color
            );
        }

        for edge in self.graph.edge_references() {
            let _ = writeln!(
                dot,
                "  node{} -> node{} [label=\"in{}\"];",
                edge.source().index(),
                edge.target().index(),
                edge.weight().input_slot
            );
        }

        let _ = writeln!(dot, "}}");
        dot
    }

    /// Get graph statistics
    pub fn statistics(&self) -> GraphStatistics {
        let mut op_type_counts = BTreeMap::new();
        for node in self.nodes() {
            *op_type_counts.entry(node.op_type.clone()).or_insert(0) += 1;
        }
        let unsupported = self
            .nodes()
            .filter(|n| matches!(n.kind, OpKind::Unsupported(_)))
            .count();
        let shapeless = self.nodes().filter(|n| n.shape.is_none()).count();
        debug!(unsupported, shapeless, "computed graph statistics");

        GraphStatistics {
            total_nodes: self.graph.node_count(),
            total_edges: self.graph.edge_count(),
            num_placeholders: self.placeholders().len(),
            num_terminals: self.terminal_nodes().len(),
            num_unsupported: unsupported,
            num_shapeless: shapeless,
            op_type_counts,
        }
    }
}

/// Graph statistics
#[derive(Debug, Clone)]
pub struct GraphStatistics {
    pub total_nodes: usize,
    pub total_edges: usize,
    pub num_placeholders: usize,
    pub num_terminals: usize,
    pub num_unsupported: usize,
    pub num_shapeless: usize,
    pub op_type_counts: BTreeMap<String, usize>,
}

impl std::fmt::Display for GraphStatistics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Graph Statistics:")?;
        writeln!(f, "  Total nodes: {}", self.total_nodes)?;
        writeln!(f, "  Total edges: {}", self.total_edges)?;
        writeln!(f, "  Placeholders: {}", self.num_placeholders)?;
        writeln!(f, "  Terminal operations: {}", self.num_terminals)?;
        writeln!(f, "  Unsupported operations: {}", self.num_unsupported)?;
        writeln!(f, "  Without static shape: {}", self.num_shapeless)?;
        writeln!(f, "  Operation types:")?;

        let mut sorted_ops: Vec<_> = self.op_type_counts.iter().collect();
        sorted_ops.sort_by(|a, b| b.1.cmp(a.1));

        for (op_type, count) in sorted_ops {
            writeln!(f, "    {}: {}", op_type, count)?;
        }

        Ok(())
    }
}
