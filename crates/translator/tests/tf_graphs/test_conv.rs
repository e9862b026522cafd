//! Convolution and pooling networks
//!
//! The NCHW network is the NHWC network with every layout-dependent
//! attribute switched, so transposed inputs must give transposed outputs.

use crate::tf_graphs::*;
use netcon_translator::{OpGraph, TensorShape, Translator};

fn translate(graph: &netcon_translator::proto::GraphDef) -> netcon_translator::Network {
    Translator::new()
        .translate_graph(OpGraph::from_graph_def(graph).unwrap())
        .unwrap()
}

#[test]
fn test_conv_pool_nhwc() {
    let network = translate(&conv_pool("NHWC"));
    assert_eq!(network.output_group().shape, TensorShape::new(vec![1, 1, 1, 2]));
    assert!(network.model().summary().num_max_pool > 0);
    evaluate_network(&network, &mut rng());
}

#[test]
fn test_conv_pool_nchw() {
    let network = translate(&conv_pool("NCHW"));
    assert_eq!(network.input_groups()[0].shape, TensorShape::new(vec![1, 2, 6, 6]));
    assert_eq!(network.output_group().shape, TensorShape::new(vec![1, 2, 1, 1]));
    evaluate_network(&network, &mut rng());
}

#[test]
fn test_data_formats_agree() {
    let nhwc = translate(&conv_pool("NHWC"));
    let nchw = translate(&conv_pool("NCHW"));
    let options = netcon_translator::SolverOptions::default();
    let solver = netcon_translator::PropagationSolver;
    let mut rng = rng();

    for _ in 0..NUM_RAND {
        let x = random_inputs(&mut rng, &nhwc);
        let x_nchw = vec![transpose4(&x[0], [0, 3, 1, 2])];

        let reference = nhwc.evaluate_without_solver(&x).unwrap();
        let from_nchw = transpose4(&nchw.evaluate_without_solver(&x_nchw).unwrap(), [0, 2, 3, 1]);
        assert_tensors_equal(&from_nchw, &reference, TOL);

        let solved = nchw.evaluate_with_solver(&x_nchw, &solver, &options, None).unwrap();
        assert_tensors_equal(&transpose4(&solved, [0, 2, 3, 1]), &reference, TOL);
    }
}

#[test]
fn test_conv_reshape_dense() {
    let network = translate(&conv_dense());
    assert_eq!(network.output_group().shape, TensorShape::new(vec![1, 2]));
    evaluate_network(&network, &mut rng());
}
