//! netcon command-line tool
//!
//! ```bash
//! # Graph statistics, optionally as DOT
//! netcon inspect --model model.pb --dot
//!
//! # Translate a subgraph and dump the query
//! netcon translate --model model.pb --inputs x --output y --query-json query.json
//!
//! # Evaluate given inputs with the reference evaluator and the solver
//! netcon evaluate --model saved_model/ --format savedModel_v2 --input-json inputs.json
//!
//! # Cross-check on random inputs
//! netcon check --model model.pb --points 10 --seed 7
//! ```

use clap::Parser;
use tracing::Level;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod cli;
mod commands;

use cli::{Cli, Commands};

fn main() {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        _ => Level::DEBUG,
    };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    let result = match &cli.command {
        Commands::Inspect { model, dot } => commands::inspect::run(model, *dot),
        Commands::Translate {
            model,
            subgraph,
            query_json,
        } => commands::translate::run(model, subgraph, query_json.as_deref()),
        Commands::Evaluate {
            model,
            subgraph,
            solver,
            input_json,
            query_json,
        } => commands::evaluate::run(model, subgraph, solver, input_json, query_json.as_deref()),
        Commands::Check {
            model,
            subgraph,
            solver,
            points,
            seed,
            tolerance,
        } => commands::check::run(model, subgraph, solver, *points, *seed, *tolerance),
    };

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
