use crate::cli::ModelArgs;
use anyhow::{Context, Result};
use netcon::{load_model, ModelFormat};

pub fn run(model: &ModelArgs, dot: bool) -> Result<()> {
    let format: ModelFormat = model.format.parse()?;
    let graph = load_model(&model.model, format)
        .with_context(|| format!("failed to load {}", model.model.display()))?;

    println!("Model: {} ({})", model.model.display(), format);
    print!("{}", graph.statistics());
    if dot {
        println!();
        print!("{}", graph.visualize_dot());
    }
    Ok(())
}
