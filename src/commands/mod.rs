pub mod check;
pub mod evaluate;
pub mod inspect;
pub mod translate;

use crate::cli::{ModelArgs, SolverArgs, SubgraphArgs};
use anyhow::{Context, Result};
use netcon::{Network, SolverOptions, Translator};

/// Translate the model named on the command line
pub fn translate_model(model: &ModelArgs, subgraph: &SubgraphArgs) -> Result<Network> {
    let mut translator = Translator::new().with_format_tag(&model.format)?;
    if !subgraph.inputs.is_empty() {
        translator = translator.with_inputs(subgraph.inputs.iter().cloned());
    }
    if let Some(output) = &subgraph.output {
        translator = translator.with_output(output.clone());
    }
    translator
        .translate(&model.model)
        .with_context(|| format!("failed to translate {}", model.model.display()))
}

pub fn solver_options(args: &SolverArgs) -> Result<SolverOptions> {
    let mut options = SolverOptions::default();
    options.apply_pairs(args.options.iter().map(String::as_str))?;
    Ok(options)
}
