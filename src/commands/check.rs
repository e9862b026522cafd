use crate::cli::{ModelArgs, SolverArgs, SubgraphArgs};
use anyhow::Result;
use netcon::{PropagationSolver, Tensor};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

pub fn run(
    model: &ModelArgs,
    subgraph: &SubgraphArgs,
    solver: &SolverArgs,
    points: usize,
    seed: u64,
    tolerance: f64,
) -> Result<()> {
    let network = super::translate_model(model, subgraph)?;
    let options = super::solver_options(solver)?;
    let mut rng = SmallRng::seed_from_u64(seed);

    let mut worst: f64 = 0.0;
    for point in 0..points {
        let inputs: Vec<Tensor> = network
            .input_groups()
            .iter()
            .map(|g| {
                let data = (0..g.len()).map(|_| rng.gen::<f64>()).collect();
                Tensor::new(g.shape.clone(), data)
            })
            .collect::<netcon::Result<_>>()?;
        let error = network
            .find_error(&inputs, &PropagationSolver, &options, None)?
            .max_abs();
        debug!(point, error, "checked random point");
        if error > tolerance {
            anyhow::bail!(
                "point {}: solver and reference differ by {:e} (tolerance {:e})",
                point,
                error,
                tolerance
            );
        }
        worst = worst.max(error);
    }

    println!(
        "OK: {} points, max error {:e} (tolerance {:e})",
        points, worst, tolerance
    );
    Ok(())
}
