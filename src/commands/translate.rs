use crate::cli::{ModelArgs, SubgraphArgs};
use anyhow::{Context, Result};
use netcon::InputQuery;
use std::path::Path;

pub fn run(model: &ModelArgs, subgraph: &SubgraphArgs, query_json: Option<&Path>) -> Result<()> {
    let network = super::translate_model(model, subgraph)?;
    print!("{}", network.summary());

    if let Some(path) = query_json {
        InputQuery::new(network.model())
            .write_json(path)
            .with_context(|| format!("failed to write {}", path.display()))?;
        println!("Query written to {}", path.display());
    }
    Ok(())
}
