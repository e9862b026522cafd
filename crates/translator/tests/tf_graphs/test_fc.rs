//! Fully-connected networks
//!
//! - fc1: Const, Identity, Placeholder, MatMul, Add and Relu
//! - fc2: Mul and RealDiv by constants on both sides
//! - sign: Sign activations

use crate::tf_graphs::*;
use netcon_translator::{OpGraph, Tensor, TensorShape, Translator};

fn translate(graph: &netcon_translator::proto::GraphDef, output: Option<&str>) -> netcon_translator::Network {
    let mut translator = Translator::new();
    if let Some(output) = output {
        translator = translator.with_output(output);
    }
    translator
        .translate_graph(OpGraph::from_graph_def(graph).unwrap())
        .unwrap()
}

#[test]
fn test_fc1() {
    let network = translate(&fc1(), None);
    assert_eq!(network.input_groups().len(), 1);
    assert_eq!(network.input_groups()[0].shape, TensorShape::new(vec![1, 4]));
    assert_eq!(network.output_group().shape, TensorShape::new(vec![1, 2]));
    evaluate_network(&network, &mut rng());
}

#[test]
fn test_fc1_constants_take_no_variables() {
    let network = translate(&fc1(), None);
    // x: 4, MatMul/add/Relu: 6 each, MatMul_1/add_1/Relu_1: 5 each, MatMul_2/y: 2 each
    assert_eq!(network.model().num_variables(), 4 + 6 * 3 + 5 * 3 + 2 * 2);
}

#[test]
fn test_fc2() {
    let network = translate(&fc2(), Some("y"));
    evaluate_network(&network, &mut rng());
}

#[test]
fn test_fc2_matches_hand_computation() {
    let network = translate(&fc2(), Some("y"));
    let x = Tensor::new(vec![1, 3], vec![0.0, 0.0, 0.0]).unwrap();
    // Relu(0) - 0 = 0 everywhere
    let y = network.evaluate_without_solver(&[x]).unwrap();
    assert_tensors_equal(&y, &Tensor::zeros(vec![1, 3]), 1e-12);
}

#[test]
fn test_sign_network() {
    let network = translate(&sign_network(), None);
    let sign_outputs = network
        .model()
        .pl_constraints()
        .iter()
        .filter(|c| matches!(c, netcon_translator::PlConstraint::Sign { .. }))
        .count();
    assert_eq!(sign_outputs, 4);
    evaluate_network(&network, &mut rng());
}

#[test]
fn test_linear_network_matches_matrix_algebra() {
    let graph = GraphDefBuilder::new()
        .placeholder("x", &[-1, 2])
        .constant("w", &[2, 2], &[1.0, 2.0, 3.0, 4.0])
        .constant("b", &[2], &[0.5, -0.5])
        .op("MatMul", "MatMul", &["x", "w"])
        .op("y", "Add", &["MatMul", "b"])
        .build();
    let network = translate(&graph, None);
    let x = Tensor::new(vec![1, 2], vec![1.0, -1.0]).unwrap();
    let expected = Tensor::new(vec![1, 2], vec![1.0 - 3.0 + 0.5, 2.0 - 4.0 - 0.5]).unwrap();
    assert_tensors_equal(&network.evaluate_without_solver(&[x]).unwrap(), &expected, TOL);
}
