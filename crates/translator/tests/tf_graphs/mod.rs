//! TensorFlow graph test infrastructure
//!
//! Builds `GraphDef` protobufs in memory, writes them to disk in the
//! supported container formats and cross-checks solver-backed evaluation
//! against the reference evaluator on seeded random inputs.

#![allow(dead_code)]

use netcon_translator::proto::{
    attr_value, tensor_shape_proto, AttrValue, BundleEntryProto, BundleHeaderProto, DataType,
    GraphDef, MetaGraphDef, MetaInfoDef, NodeDef, SavedModel, TensorProto, TensorShapeProto,
};
use netcon_translator::{Network, PropagationSolver, SolverOptions, Tensor, TensorShape};
use prost::encoding::encode_varint;
use prost::Message;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use std::path::Path;

/// Tolerance for comparing solver and reference evaluations
pub const TOL: f64 = 1e-4;

/// Random points per network
pub const NUM_RAND: usize = 5;

pub fn rng() -> SmallRng {
    SmallRng::seed_from_u64(123)
}

// ============================================================================
// Graph construction
// ============================================================================

pub fn attr_s(value: &str) -> AttrValue {
    AttrValue {
        value: Some(attr_value::Value::S(value.as_bytes().to_vec())),
    }
}

pub fn attr_b(value: bool) -> AttrValue {
    AttrValue {
        value: Some(attr_value::Value::B(value)),
    }
}

pub fn attr_ints(values: &[i64]) -> AttrValue {
    AttrValue {
        value: Some(attr_value::Value::List(attr_value::ListValue {
            i: values.to_vec(),
            ..Default::default()
        })),
    }
}

/// `_output_shapes` as TensorFlow records it, `-1` for unknown dimensions
pub fn attr_shapes(shapes: &[&[i64]]) -> AttrValue {
    AttrValue {
        value: Some(attr_value::Value::List(attr_value::ListValue {
            shape: shapes.iter().map(|dims| shape_proto(dims)).collect(),
            ..Default::default()
        })),
    }
}

fn shape_proto(dims: &[i64]) -> TensorShapeProto {
    TensorShapeProto {
        dim: dims
            .iter()
            .map(|&size| tensor_shape_proto::Dim {
                size,
                name: String::new(),
            })
            .collect(),
        unknown_rank: false,
    }
}

/// Deterministic weights in `[-1, 1)`
pub fn weights(rng: &mut SmallRng, len: usize) -> Vec<f32> {
    (0..len).map(|_| rng.gen_range(-1.0..1.0)).collect()
}

/// Incrementally built `GraphDef`
#[derive(Default)]
pub struct GraphDefBuilder {
    nodes: Vec<NodeDef>,
}

impl GraphDefBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Placeholder with `-1` for unknown dimensions
    pub fn placeholder(self, name: &str, dims: &[i64]) -> Self {
        let shape = AttrValue {
            value: Some(attr_value::Value::Shape(shape_proto(dims))),
        };
        let dtype = AttrValue {
            value: Some(attr_value::Value::Type(DataType::DtFloat as i32)),
        };
        self.op_with(name, "Placeholder", &[], vec![("shape", shape), ("dtype", dtype)])
    }

    /// Float constant stored as packed little-endian content
    pub fn constant(self, name: &str, dims: &[i64], data: &[f32]) -> Self {
        let content = data.iter().flat_map(|v| v.to_le_bytes()).collect();
        self.tensor(
            name,
            TensorProto {
                dtype: DataType::DtFloat as i32,
                tensor_shape: Some(shape_proto(dims)),
                tensor_content: content,
                ..Default::default()
            },
        )
    }

    /// Int32 constant stored in `int_val`, as TensorFlow writes shapes and axes
    pub fn int_constant(self, name: &str, dims: &[i64], data: &[i32]) -> Self {
        self.tensor(
            name,
            TensorProto {
                dtype: DataType::DtInt32 as i32,
                tensor_shape: Some(shape_proto(dims)),
                int_val: data.to_vec(),
                ..Default::default()
            },
        )
    }

    /// Constant read through an `Identity`, the way frozen variables appear
    pub fn frozen_variable(self, name: &str, dims: &[i64], data: &[f32]) -> Self {
        let raw = format!("{}/value", name);
        self.constant(&raw, dims, data).op(name, "Identity", &[&raw])
    }

    fn tensor(self, name: &str, tensor: TensorProto) -> Self {
        let value = AttrValue {
            value: Some(attr_value::Value::Tensor(tensor)),
        };
        self.op_with(name, "Const", &[], vec![("value", value)])
    }

    pub fn op(self, name: &str, op: &str, inputs: &[&str]) -> Self {
        self.op_with(name, op, inputs, Vec::new())
    }

    pub fn op_with(mut self, name: &str, op: &str, inputs: &[&str], attrs: Vec<(&str, AttrValue)>) -> Self {
        self.nodes.push(NodeDef {
            name: name.into(),
            op: op.into(),
            input: inputs.iter().map(|s| s.to_string()).collect(),
            attr: attrs.into_iter().map(|(k, v)| (k.to_string(), v)).collect(),
            ..Default::default()
        });
        self
    }

    pub fn build(self) -> GraphDef {
        GraphDef { node: self.nodes }
    }
}

// ============================================================================
// Containers on disk
// ============================================================================

pub fn write_frozen_graph(path: &Path, graph: &GraphDef) {
    std::fs::write(path, graph.encode_to_vec()).unwrap();
}

pub fn write_saved_model(dir: &Path, graph: &GraphDef, tags: &[&str]) {
    std::fs::create_dir_all(dir).unwrap();
    let saved = SavedModel {
        saved_model_schema_version: 1,
        meta_graphs: vec![MetaGraphDef {
            meta_info_def: Some(MetaInfoDef {
                tags: tags.iter().map(|t| t.to_string()).collect(),
                ..Default::default()
            }),
            graph_def: Some(graph.clone()),
        }],
    };
    std::fs::write(dir.join("saved_model.pb"), saved.encode_to_vec()).unwrap();
}

/// Tensor bundle under `dir/variables/`, one float entry per variable
pub fn write_checkpoint(dir: &Path, variables: &[(&str, &[i64], &[f32])]) {
    let var_dir = dir.join("variables");
    std::fs::create_dir_all(&var_dir).unwrap();

    let mut sorted = variables.to_vec();
    sorted.sort_by_key(|(name, _, _)| *name);

    let header = BundleHeaderProto {
        num_shards: 1,
        endianness: 0,
    };
    let mut entries = vec![(Vec::new(), header.encode_to_vec())];
    let mut data = Vec::new();
    for (name, dims, values) in sorted {
        let bytes: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        let entry = BundleEntryProto {
            dtype: DataType::DtFloat as i32,
            shape: Some(shape_proto(dims)),
            offset: data.len() as i64,
            size: bytes.len() as i64,
            ..Default::default()
        };
        data.extend(bytes);
        entries.push((name.as_bytes().to_vec(), entry.encode_to_vec()));
    }
    std::fs::write(var_dir.join("variables.data-00000-of-00001"), data).unwrap();

    let mut table = Vec::new();
    let data_block = write_block(&mut table, &entries);
    let meta_block = write_block(&mut table, &[]);
    let last_key = entries.last().map(|(k, _)| k.clone()).unwrap_or_default();
    let mut handle = Vec::new();
    encode_varint(data_block.0, &mut handle);
    encode_varint(data_block.1, &mut handle);
    let index_block = write_block(&mut table, &[(last_key, handle)]);

    let mut footer = Vec::new();
    for (offset, size) in [meta_block, index_block] {
        encode_varint(offset, &mut footer);
        encode_varint(size, &mut footer);
    }
    footer.resize(40, 0);
    footer.extend_from_slice(&0xdb47_7524_8b80_fb57u64.to_le_bytes());
    table.extend(footer);
    std::fs::write(var_dir.join("variables.index"), table).unwrap();
}

/// Uncompressed table block with a single restart point, returns its handle
fn write_block(out: &mut Vec<u8>, entries: &[(Vec<u8>, Vec<u8>)]) -> (u64, u64) {
    let offset = out.len();
    for (key, value) in entries {
        encode_varint(0, out);
        encode_varint(key.len() as u64, out);
        encode_varint(value.len() as u64, out);
        out.extend_from_slice(key);
        out.extend_from_slice(value);
    }
    out.extend_from_slice(&0u32.to_le_bytes());
    out.extend_from_slice(&1u32.to_le_bytes());
    let size = out.len() - offset;
    // compression type and checksum
    out.extend_from_slice(&[0u8; 5]);
    (offset as u64, size as u64)
}

// ============================================================================
// Evaluation helpers
// ============================================================================

pub fn random_tensor(rng: &mut SmallRng, shape: &TensorShape) -> Tensor {
    let data = (0..shape.numel()).map(|_| rng.gen::<f64>()).collect();
    Tensor::new(shape.clone(), data).unwrap()
}

/// One random tensor per input group
pub fn random_inputs(rng: &mut SmallRng, network: &Network) -> Vec<Tensor> {
    network
        .input_groups()
        .iter()
        .map(|g| random_tensor(rng, &g.shape))
        .collect()
}

/// Check solver-backed and reference evaluation agree on random points
pub fn evaluate_network(network: &Network, rng: &mut SmallRng) {
    let options = SolverOptions::default();
    for _ in 0..NUM_RAND {
        let inputs = random_inputs(rng, network);
        let error = network
            .find_error(&inputs, &PropagationSolver, &options, None)
            .unwrap();
        assert!(
            error.max_abs() < TOL,
            "solver and reference differ by {}",
            error.max_abs()
        );
    }
}

pub fn assert_tensors_equal(actual: &Tensor, expected: &Tensor, tolerance: f64) {
    assert_eq!(actual.shape(), expected.shape(), "shape mismatch");
    for (i, (a, e)) in actual.data().iter().zip(expected.data()).enumerate() {
        assert!(
            (a - e).abs() <= tolerance,
            "element {} differs: {} vs {} (tolerance {})",
            i,
            a,
            e,
            tolerance
        );
    }
}

/// Permute a rank-4 tensor, `perm[i]` is the source axis of output axis `i`
pub fn transpose4(tensor: &Tensor, perm: [usize; 4]) -> Tensor {
    let src = tensor.shape().dims();
    let dims: Vec<usize> = perm.iter().map(|&p| src[p]).collect();
    let shape = TensorShape::new(dims);
    let data = (0..shape.numel())
        .map(|flat| {
            let out = shape.unravel(flat);
            let mut idx = [0usize; 4];
            for (axis, &p) in perm.iter().enumerate() {
                idx[p] = out[axis];
            }
            tensor.get(&idx)
        })
        .collect();
    Tensor::new(shape, data).unwrap()
}

// ============================================================================
// Test networks
// ============================================================================

/// Two dense Relu layers and a linear output layer, unknown batch
pub fn fc1() -> GraphDef {
    let mut rng = rng();
    GraphDefBuilder::new()
        .placeholder("x", &[-1, 4])
        .frozen_variable("w0", &[4, 6], &weights(&mut rng, 24))
        .frozen_variable("b0", &[6], &weights(&mut rng, 6))
        .frozen_variable("w1", &[6, 5], &weights(&mut rng, 30))
        .frozen_variable("b1", &[5], &weights(&mut rng, 5))
        .frozen_variable("w2", &[5, 2], &weights(&mut rng, 10))
        .frozen_variable("b2", &[2], &weights(&mut rng, 2))
        .op("MatMul", "MatMul", &["x", "w0"])
        .op("add", "Add", &["MatMul", "b0"])
        .op("Relu", "Relu", &["add"])
        .op("MatMul_1", "MatMul", &["Relu", "w1"])
        .op("add_1", "AddV2", &["MatMul_1", "b1"])
        .op("Relu_1", "Relu", &["add_1"])
        .op("MatMul_2", "MatMul", &["Relu_1", "w2"])
        .op("y", "Add", &["MatMul_2", "b2"])
        .build()
}

/// Mul and RealDiv by constants on either side, plus a constant-only branch
pub fn fc2() -> GraphDef {
    let mut rng = rng();
    GraphDefBuilder::new()
        .placeholder("x", &[-1, 3])
        .frozen_variable("w", &[3, 3], &weights(&mut rng, 9))
        .constant("scale", &[3], &[2.0, -0.5, 4.0])
        .constant("two", &[], &[2.0])
        .constant("half", &[], &[0.5])
        .op("scale2", "Mul", &["scale", "two"])
        .op("MatMul", "MatMul", &["x", "w"])
        .op("mul", "Mul", &["MatMul", "scale2"])
        .op("mul_1", "Mul", &["half", "mul"])
        .op("div", "RealDiv", &["mul_1", "scale"])
        .op("Relu", "Relu", &["div"])
        .op("sub", "Sub", &["Relu", "x"])
        .op("y", "RealDiv", &["sub", "two"])
        .build()
}

/// Two inputs that meet in a concatenation and are reused on the output path
///
/// ```text
/// X0 -> MatMul -> add -> Relu -> MatMul_2 -> Relu_2 --\
///                                                      concat -> MatMul_3 -> add_1 -> Y
/// X1 -> MatMul_1 -> sub -> Relu_1 --------------------/             X0_proj -/      /
///                                                                     X1_proj -----/
/// ```
pub fn sub_concat() -> GraphDef {
    let mut rng = rng();
    GraphDefBuilder::new()
        .placeholder("X0", &[5, 10])
        .placeholder("X1", &[5, 10])
        .frozen_variable("W0", &[10, 20], &weights(&mut rng, 200))
        .frozen_variable("B0", &[20], &weights(&mut rng, 20))
        .frozen_variable("W1", &[10, 20], &weights(&mut rng, 200))
        .frozen_variable("B1", &[20], &weights(&mut rng, 20))
        .frozen_variable("W2", &[20, 20], &weights(&mut rng, 400))
        .frozen_variable("W3", &[40, 2], &weights(&mut rng, 80))
        .frozen_variable("W4", &[10, 2], &weights(&mut rng, 20))
        .frozen_variable("W5", &[10, 2], &weights(&mut rng, 20))
        .int_constant("concat/axis", &[], &[1])
        .op("MatMul", "MatMul", &["X0", "W0"])
        .op("add", "Add", &["MatMul", "B0"])
        .op("Relu", "Relu", &["add"])
        .op("MatMul_1", "MatMul", &["X1", "W1"])
        .op("sub", "Sub", &["MatMul_1", "B1"])
        .op("Relu_1", "Relu", &["sub"])
        .op("MatMul_2", "MatMul", &["Relu", "W2"])
        .op("Relu_2", "Relu", &["MatMul_2"])
        .op("concat", "ConcatV2", &["Relu_2", "Relu_1", "concat/axis"])
        .op("MatMul_3", "MatMul", &["concat", "W3"])
        .op("X0_proj", "MatMul", &["X0", "W4"])
        .op("X1_proj", "MatMul", &["X1", "W5"])
        .op("add_1", "Add", &["MatMul_3", "X0_proj"])
        .op("Y", "Sub", &["add_1", "X1_proj"])
        .build()
}

/// Convolution, bias, Relu and max pooling in the given data layout
///
/// The input is `[1, 6, 6, 2]` logically; filters are shared between layouts.
pub fn conv_pool(format: &str) -> GraphDef {
    let mut rng = rng();
    let nhwc = format == "NHWC";
    let input: &[i64] = if nhwc { &[-1, 6, 6, 2] } else { &[-1, 2, 6, 6] };
    let spatial = |h: i64, w: i64| -> Vec<i64> {
        if nhwc {
            vec![1, h, w, 1]
        } else {
            vec![1, 1, h, w]
        }
    };

    GraphDefBuilder::new()
        .placeholder("x", input)
        .frozen_variable("filter", &[3, 3, 2, 3], &weights(&mut rng, 54))
        .frozen_variable("bias", &[3], &weights(&mut rng, 3))
        .frozen_variable("filter_1", &[2, 2, 3, 2], &weights(&mut rng, 24))
        .op_with(
            "Conv2D",
            "Conv2D",
            &["x", "filter"],
            vec![
                ("padding", attr_s("SAME")),
                ("strides", attr_ints(&spatial(1, 1))),
                ("data_format", attr_s(format)),
            ],
        )
        .op_with("BiasAdd", "BiasAdd", &["Conv2D", "bias"], vec![("data_format", attr_s(format))])
        .op("Relu", "Relu", &["BiasAdd"])
        .op_with(
            "MaxPool",
            "MaxPool",
            &["Relu"],
            vec![
                ("padding", attr_s("VALID")),
                ("ksize", attr_ints(&spatial(2, 2))),
                ("strides", attr_ints(&spatial(2, 2))),
                ("data_format", attr_s(format)),
            ],
        )
        .op_with(
            "Conv2D_1",
            "Conv2D",
            &["MaxPool", "filter_1"],
            vec![
                ("padding", attr_s("VALID")),
                ("strides", attr_ints(&spatial(1, 1))),
                ("data_format", attr_s(format)),
            ],
        )
        .op_with(
            "MaxPool_1",
            "MaxPool",
            &["Conv2D_1"],
            vec![
                ("padding", attr_s("SAME")),
                ("ksize", attr_ints(&spatial(2, 2))),
                ("strides", attr_ints(&spatial(2, 2))),
                ("data_format", attr_s(format)),
            ],
        )
        .build()
}

/// Strided convolution flattened into a dense layer
pub fn conv_dense() -> GraphDef {
    let mut rng = rng();
    GraphDefBuilder::new()
        .placeholder("x", &[1, 5, 5, 1])
        .frozen_variable("filter", &[3, 3, 1, 2], &weights(&mut rng, 18))
        .frozen_variable("bias", &[2], &weights(&mut rng, 2))
        .frozen_variable("w", &[8, 3], &weights(&mut rng, 24))
        .int_constant("shape", &[2], &[-1, 8])
        .op_with(
            "Conv2D",
            "Conv2D",
            &["x", "filter"],
            vec![("padding", attr_s("VALID")), ("strides", attr_ints(&[1, 2, 2, 1]))],
        )
        .op("BiasAdd", "BiasAdd", &["Conv2D", "bias"])
        .op("Relu", "Relu", &["BiasAdd"])
        .op("Reshape", "Reshape", &["Relu", "shape"])
        .op("MatMul", "MatMul", &["Reshape", "w"])
        .op_with("y", "MatMul", &["MatMul", "w_t"], vec![("transpose_b", attr_b(true))])
        .frozen_variable("w_t", &[2, 3], &weights(&mut rng, 6))
        .build()
}

/// Dense layer with sign activations
pub fn sign_network() -> GraphDef {
    let mut rng = rng();
    GraphDefBuilder::new()
        .placeholder("x", &[-1, 3])
        .frozen_variable("w0", &[3, 4], &weights(&mut rng, 12))
        .frozen_variable("w1", &[4, 2], &weights(&mut rng, 8))
        .op("MatMul", "MatMul", &["x", "w0"])
        .op("Sign", "Sign", &["MatMul"])
        .op("MatMul_1", "MatMul", &["Sign", "w1"])
        .op("y", "Identity", &["MatMul_1"])
        .build()
}
