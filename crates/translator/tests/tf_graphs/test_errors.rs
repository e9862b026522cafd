//! User errors are caught with messages naming the offending value

use crate::tf_graphs::*;
use netcon_translator::{read_tf, OpGraph, Tensor, TensorShape, TranslateError, Translator};

fn translate(inputs: &[&str], output: &str) -> netcon_translator::Result<netcon_translator::Network> {
    Translator::new()
        .with_inputs(inputs.iter().copied())
        .with_output(output)
        .translate_graph(OpGraph::from_graph_def(&sub_concat()).unwrap())
}

fn message(result: netcon_translator::Result<netcon_translator::Network>) -> (TranslateError, String) {
    let err = result.unwrap_err();
    let text = err.to_string();
    (err, text)
}

#[test]
fn test_bad_model_type() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sub_concat.pb");
    write_frozen_graph(&path, &sub_concat());
    let err = read_tf(&path, None, None, "badModelType").unwrap_err();
    assert!(matches!(err, TranslateError::Config(_)));
    assert!(err.to_string().contains("Unknown input to modelType: badModelType"));
}

#[test]
fn test_unknown_input_name() {
    let (err, text) = message(translate(&["X123"], "MatMul_2"));
    assert!(matches!(err, TranslateError::NameResolution(_)));
    assert!(text.contains("input X123 is not an operation"));
}

#[test]
fn test_unknown_output_name() {
    let (err, text) = message(translate(&["X0"], "MatMul_123"));
    assert!(matches!(err, TranslateError::NameResolution(_)));
    assert!(text.contains("output MatMul_123 is not an operation"));
}

#[test]
fn test_output_used_as_input() {
    let (err, text) = message(translate(&["Relu"], "Relu"));
    assert!(matches!(err, TranslateError::Topology(_)));
    assert!(text.contains("cannot be used as both input and output"));
}

#[test]
fn test_redundant_input() {
    let (err, text) = message(translate(&["X0", "X1"], "MatMul_2"));
    assert!(matches!(err, TranslateError::Topology(_)));
    assert!(text.contains("not all inputs contributed to the output"));
    assert!(text.contains("X1"));
}

#[test]
fn test_missing_placeholder() {
    let (err, text) = message(translate(&["concat"], "Relu"));
    assert!(matches!(err, TranslateError::Topology(_)));
    assert!(text.contains("output Relu depends on placeholder X0"));
}

#[test]
fn test_too_few_input_tensors() {
    let network = translate(&["X0", "X1"], "Y").unwrap();
    let mut inputs = random_inputs(&mut rng(), &network);
    inputs.remove(0);
    let err = network.evaluate_without_solver(&inputs).unwrap_err();
    assert!(matches!(err, TranslateError::Shape(_)));
    assert!(err.to_string().contains("Bad input given"));
}

#[test]
fn test_input_with_extra_leading_dimension() {
    let network = translate(&["X0", "X1"], "Y").unwrap();
    let mut rng = rng();
    let inputs: Vec<Tensor> = network
        .input_groups()
        .iter()
        .map(|g| {
            let mut dims = vec![2];
            dims.extend_from_slice(g.shape.dims());
            random_tensor(&mut rng, &TensorShape::new(dims))
        })
        .collect();
    let err = network.evaluate_without_solver(&inputs).unwrap_err();
    assert!(matches!(err, TranslateError::Shape(_)));
    assert!(err.to_string().contains("Input 0 ('X0') should have shape [5, 10]"));
}

#[test]
fn test_input_reshaped_when_counts_match() {
    let network = translate(&["X0", "X1"], "Y").unwrap();
    let mut rng = rng();
    let flat: Vec<Tensor> = network
        .input_groups()
        .iter()
        .map(|g| random_tensor(&mut rng, &TensorShape::new(vec![g.len()])))
        .collect();
    let shaped: Vec<Tensor> = flat
        .iter()
        .zip(network.input_groups())
        .map(|(t, g)| t.reshape(g.shape.clone()).unwrap())
        .collect();
    assert_tensors_equal(
        &network.evaluate_without_solver(&flat).unwrap(),
        &network.evaluate_without_solver(&shaped).unwrap(),
        0.0,
    );
}

#[test]
fn test_unsupported_operation_on_path() {
    let graph = GraphDefBuilder::new()
        .placeholder("x", &[-1, 2])
        .op("t", "Tanh", &["x"])
        .op("y", "Relu", &["t"])
        .build();
    let err = Translator::new()
        .translate_graph(OpGraph::from_graph_def(&graph).unwrap())
        .unwrap_err();
    assert!(matches!(err, TranslateError::UnsupportedOp(_)));
    assert!(err.to_string().contains("Tanh"));
}

#[test]
fn test_unsupported_operation_off_path_is_ignored() {
    let graph = GraphDefBuilder::new()
        .placeholder("x", &[-1, 2])
        .op("y", "Relu", &["x"])
        .op("t", "Tanh", &["x"])
        .build();
    let network = Translator::new()
        .with_output("y")
        .translate_graph(OpGraph::from_graph_def(&graph).unwrap())
        .unwrap();
    evaluate_network(&network, &mut rng());
}

#[test]
fn test_variable_product_is_rejected() {
    let graph = GraphDefBuilder::new()
        .placeholder("a", &[-1, 2])
        .placeholder("b", &[-1, 2])
        .op("y", "Mul", &["a", "b"])
        .build();
    let err = Translator::new()
        .translate_graph(OpGraph::from_graph_def(&graph).unwrap())
        .unwrap_err();
    assert!(matches!(err, TranslateError::UnsupportedOp(_)));
}
