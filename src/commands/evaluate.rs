use crate::cli::{ModelArgs, SolverArgs, SubgraphArgs};
use anyhow::{Context, Result};
use netcon::{PropagationSolver, Tensor};
use serde_json::Value;
use std::path::Path;

pub fn run(
    model: &ModelArgs,
    subgraph: &SubgraphArgs,
    solver: &SolverArgs,
    input_json: &Path,
    query_json: Option<&Path>,
) -> Result<()> {
    let network = super::translate_model(model, subgraph)?;
    let options = super::solver_options(solver)?;
    let inputs = read_inputs(input_json)?;

    let reference = network.evaluate_without_solver(&inputs)?;
    let with_solver =
        network.evaluate_with_solver(&inputs, &PropagationSolver, &options, query_json)?;
    let error = with_solver.sub(&reference)?.max_abs();

    println!("Output {} {}", network.output_group().name, reference.shape());
    println!("  Reference: {:?}", reference.data());
    println!("  Solver:    {:?}", with_solver.data());
    println!("  Max error: {:e}", error);
    Ok(())
}

/// Input tensors from a JSON list; nested arrays are flattened and later
/// reshaped to the input group's shape
fn read_inputs(path: &Path) -> Result<Vec<Tensor>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let value: Value = serde_json::from_str(&text)
        .with_context(|| format!("{} is not valid JSON", path.display()))?;
    let Value::Array(items) = value else {
        anyhow::bail!("{} must hold a JSON list of input tensors", path.display());
    };

    items
        .iter()
        .enumerate()
        .map(|(i, item)| -> Result<Tensor> {
            let mut data = Vec::new();
            flatten(item, &mut data).with_context(|| format!("input {} in {}", i, path.display()))?;
            let len = data.len();
            Ok(Tensor::new(vec![len], data)?)
        })
        .collect()
}

fn flatten(value: &Value, out: &mut Vec<f64>) -> Result<()> {
    match value {
        Value::Number(n) => {
            out.push(n.as_f64().context("number out of range")?);
            Ok(())
        }
        Value::Array(items) => items.iter().try_for_each(|item| flatten(item, out)),
        other => anyhow::bail!("expected a number or an array, found {}", other),
    }
}
