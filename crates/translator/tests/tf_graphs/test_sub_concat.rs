//! Input and output selection on a two-input network
//!
//! X0 and X1 go through independent layers, meet in `concat` and are used
//! again by the projections that produce `Y`.

use crate::tf_graphs::*;
use netcon_translator::{Network, OpGraph, TensorShape, Translator};

fn translate(inputs: Option<&[&str]>, output: Option<&str>) -> Network {
    let mut translator = Translator::new();
    if let Some(inputs) = inputs {
        translator = translator.with_inputs(inputs.iter().copied());
    }
    if let Some(output) = output {
        translator = translator.with_output(output);
    }
    translator
        .translate_graph(OpGraph::from_graph_def(&sub_concat()).unwrap())
        .unwrap()
}

#[test]
fn test_default_inputs_and_output() {
    let network = translate(None, None);
    let names: Vec<&str> = network.input_groups().iter().map(|g| g.name.as_str()).collect();
    assert_eq!(names, vec!["X0", "X1"]);
    assert_eq!(network.output_group().name, "Y");
    assert_eq!(network.output_group().shape, TensorShape::new(vec![5, 2]));
    evaluate_network(&network, &mut rng());
}

#[test]
fn test_intermediate_output_uses_only_its_inputs() {
    let network = translate(None, Some("Relu_2"));
    assert_eq!(network.input_groups().len(), 1);
    assert_eq!(network.input_groups()[0].name, "X0");

    for v in network.output_group().vars() {
        assert!(network.participates_in_pl_constraint(v));
        assert!(network.lower_bound_exists(v));
    }
    evaluate_network(&network, &mut rng());

    // evaluation leaves no bounds behind
    for group in network.input_groups() {
        for v in group.vars() {
            assert!(!network.lower_bound_exists(v));
            assert!(!network.upper_bound_exists(v));
        }
    }
}

#[test]
fn test_matmul_as_output() {
    let network = translate(Some(&["X0"]), Some("MatMul_2"));
    assert_eq!(network.output_group().shape.dims()[1], 20);
    evaluate_network(&network, &mut rng());
}

#[test]
fn test_concat_as_output() {
    let network = translate(Some(&["X0", "X1"]), Some("concat"));
    assert_eq!(network.output_group().shape.dims()[1], 40);
    evaluate_network(&network, &mut rng());
}

#[test]
fn test_intermediate_input_replaces_its_producers() {
    let network = translate(Some(&["X0", "X1", "concat"]), Some("Y"));
    let names: Vec<&str> = network.input_groups().iter().map(|g| g.name.as_str()).collect();
    assert_eq!(names, vec!["X0", "X1", "concat"]);
    assert_eq!(network.input_groups()[2].shape, TensorShape::new(vec![5, 40]));

    // the layers feeding concat are not translated
    let relu = network.model().summary().num_relu;
    assert_eq!(relu, 0);
    evaluate_network(&network, &mut rng());
}

#[test]
fn test_evaluation_with_solver_artifact() {
    let network = translate(None, Some("Relu_2"));
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("query.json");
    let inputs = random_inputs(&mut rng(), &network);

    let with_solver = network
        .evaluate_with_solver(
            &inputs,
            &netcon_translator::PropagationSolver,
            &netcon_translator::SolverOptions::default(),
            Some(&path),
        )
        .unwrap();
    assert_tensors_equal(&with_solver, &network.evaluate_without_solver(&inputs).unwrap(), TOL);

    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(
        json["model"]["num_variables"].as_u64().unwrap() as usize,
        network.model().num_variables()
    );
    for v in network.input_groups()[0].vars() {
        assert!(!network.lower_bound_exists(v));
    }
}

/// `x -> Tanh -> h -> MatMul -> y`, cut at `h`
fn cut_below_unsupported(record_shape: bool) -> netcon_translator::proto::GraphDef {
    let mut rng = rng();
    let h_attrs = if record_shape {
        vec![("_output_shapes", attr_shapes(&[&[-1, 4]]))]
    } else {
        Vec::new()
    };
    GraphDefBuilder::new()
        .placeholder("x", &[-1, 4])
        .frozen_variable("w", &[4, 3], &weights(&mut rng, 12))
        .op("t", "Tanh", &["x"])
        .op_with("h", "Relu", &["t"], h_attrs)
        .op("MatMul", "MatMul", &["h", "w"])
        .op("y", "Relu", &["MatMul"])
        .build()
}

#[test]
fn test_intermediate_input_below_unsupported_op() {
    let network = Translator::new()
        .with_inputs(["h"])
        .with_output("y")
        .translate_graph(OpGraph::from_graph_def(&cut_below_unsupported(true)).unwrap())
        .unwrap();
    assert_eq!(network.input_groups()[0].shape, TensorShape::new(vec![1, 4]));
    assert_eq!(network.output_group().shape, TensorShape::new(vec![1, 3]));
    evaluate_network(&network, &mut rng());
}

#[test]
fn test_intermediate_input_without_recorded_shape() {
    let err = Translator::new()
        .with_inputs(["h"])
        .with_output("y")
        .translate_graph(OpGraph::from_graph_def(&cut_below_unsupported(false)).unwrap())
        .unwrap_err();
    assert!(matches!(err, netcon_translator::TranslateError::Shape(_)));
    assert!(err.to_string().contains("declared input h"));
}
