//! Reading models from disk in every supported container format

use crate::tf_graphs::*;
use netcon_translator::proto::GraphDef;
use netcon_translator::{load_model, read_tf, ModelFormat, TranslateError};

#[test]
fn test_frozen_graph() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("fc1.pb");
    write_frozen_graph(&path, &fc1());

    let network = read_tf(&path, None, None, "frozenGraph").unwrap();
    evaluate_network(&network, &mut rng());
}

#[test]
fn test_saved_model_v1_with_output() {
    let dir = tempfile::tempdir().unwrap();
    let model_dir = dir.path().join("fc1");
    write_saved_model(&model_dir, &fc1(), &["serve"]);

    let network = read_tf(&model_dir, None, Some("add_1"), "savedModel_v1").unwrap();
    assert_eq!(network.output_group().name, "add_1");
    evaluate_network(&network, &mut rng());
}

#[test]
fn test_saved_model_v2_sign() {
    let dir = tempfile::tempdir().unwrap();
    let model_dir = dir.path().join("signNetwork");
    write_saved_model(&model_dir, &sign_network(), &["serve"]);

    let network = read_tf(&model_dir, None, None, "savedModel_v2").unwrap();
    evaluate_network(&network, &mut rng());
}

#[test]
fn test_saved_model_without_serving_tag_uses_first() {
    let dir = tempfile::tempdir().unwrap();
    write_saved_model(dir.path(), &fc2(), &["train"]);
    let graph = load_model(dir.path(), ModelFormat::SavedModelV2).unwrap();
    assert!(graph.node_by_name("y").is_some());
}

#[test]
fn test_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let err = load_model(dir.path().join("absent.pb"), ModelFormat::FrozenGraph).unwrap_err();
    assert!(matches!(err, TranslateError::IoError(_)));
}

#[test]
fn test_corrupt_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("corrupt.pb");
    std::fs::write(&path, [0xff, 0xff, 0xff]).unwrap();
    let err = load_model(&path, ModelFormat::FrozenGraph).unwrap_err();
    assert!(matches!(err, TranslateError::DecodeError(_)));
}

#[test]
fn test_statistics_and_dot() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sub_concat.pb");
    write_frozen_graph(&path, &sub_concat());
    let graph = load_model(&path, ModelFormat::FrozenGraph).unwrap();

    let stats = graph.statistics();
    assert_eq!(stats.num_placeholders, 2);
    assert_eq!(stats.num_terminals, 1);
    assert_eq!(stats.op_type_counts["ConcatV2"], 1);
    assert!(graph.visualize_dot().contains("ConcatV2\\nconcat\\n[5, 40]"));
}

/// `x[-1,3] -> MatMul(w) -> Add(b) -> Relu`, weights held in variables
fn variable_graph(resource: bool) -> GraphDef {
    let (var_op, read_op) = if resource {
        ("VarHandleOp", "ReadVariableOp")
    } else {
        ("VariableV2", "Identity")
    };
    GraphDefBuilder::new()
        .placeholder("x", &[-1, 3])
        .op_with("w", var_op, &[], vec![("shared_name", attr_s("dense/kernel"))])
        .op("w/read", read_op, &["w"])
        .op_with("b", var_op, &[], vec![("shared_name", attr_s("dense/bias"))])
        .op("b/read", read_op, &["b"])
        .op("mm", "MatMul", &["x", "w/read"])
        .op("add", "Add", &["mm", "b/read"])
        .op("y", "Relu", &["add"])
        .build()
}

const KERNEL: [f32; 6] = [0.5, -1.0, 0.25, 2.0, -0.75, 1.5];
const BIAS: [f32; 2] = [0.1, -0.2];

fn frozen_equivalent() -> GraphDef {
    GraphDefBuilder::new()
        .placeholder("x", &[-1, 3])
        .frozen_variable("w/read", &[3, 2], &KERNEL)
        .frozen_variable("b/read", &[2], &BIAS)
        .op("mm", "MatMul", &["x", "w/read"])
        .op("add", "Add", &["mm", "b/read"])
        .op("y", "Relu", &["add"])
        .build()
}

#[test]
fn test_saved_model_variables_from_checkpoint() {
    let dir = tempfile::tempdir().unwrap();
    let frozen_path = dir.path().join("frozen.pb");
    write_frozen_graph(&frozen_path, &frozen_equivalent());
    let frozen = read_tf(&frozen_path, None, None, "frozenGraph").unwrap();

    for (resource, tag) in [(false, "savedModel_v1"), (true, "savedModel_v2")] {
        let model_dir = dir.path().join(tag);
        write_saved_model(&model_dir, &variable_graph(resource), &["serve"]);
        // TensorFlow keys resource variables by their shared name
        write_checkpoint(
            &model_dir,
            &[("dense/kernel", &[3, 2], &KERNEL), ("dense/bias", &[2], &BIAS)],
        );

        let network = read_tf(&model_dir, None, Some("y"), tag).unwrap();
        assert_eq!(network.graph().node_by_name("w").unwrap().op_type, "Const");
        evaluate_network(&network, &mut rng());

        let mut rng = rng();
        for _ in 0..NUM_RAND {
            let inputs = random_inputs(&mut rng, &network);
            let expected = frozen.evaluate_without_solver(&inputs).unwrap();
            let actual = network.evaluate_without_solver(&inputs).unwrap();
            assert_tensors_equal(&actual, &expected, 1e-12);
        }
    }
}

#[test]
fn test_saved_model_variables_without_checkpoint() {
    let dir = tempfile::tempdir().unwrap();
    write_saved_model(dir.path(), &variable_graph(false), &["serve"]);
    let err = read_tf(dir.path(), None, None, "savedModel_v1").unwrap_err();
    assert!(matches!(err, TranslateError::UnsupportedOp(_)), "{}", err);
    assert!(err.to_string().contains("VariableV2"), "{}", err);
}
