use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "netcon")]
#[command(author, version, about = "Translate TensorFlow graphs into constraint networks")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase log output (-v info, -vv debug)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Load a model and print graph statistics
    Inspect {
        #[command(flatten)]
        model: ModelArgs,

        /// Also print the graph in Graphviz DOT format
        #[arg(long)]
        dot: bool,
    },

    /// Translate a model and print the network summary
    Translate {
        #[command(flatten)]
        model: ModelArgs,

        #[command(flatten)]
        subgraph: SubgraphArgs,

        /// Write the unconstrained query as JSON
        #[arg(long)]
        query_json: Option<PathBuf>,
    },

    /// Evaluate on given inputs with and without the solver
    Evaluate {
        #[command(flatten)]
        model: ModelArgs,

        #[command(flatten)]
        subgraph: SubgraphArgs,

        #[command(flatten)]
        solver: SolverArgs,

        /// JSON list of input tensors, one flat or nested array per input
        #[arg(long)]
        input_json: PathBuf,

        /// Write the query with fixed inputs as JSON before solving
        #[arg(long)]
        query_json: Option<PathBuf>,
    },

    /// Compare solver and reference evaluation on random inputs
    Check {
        #[command(flatten)]
        model: ModelArgs,

        #[command(flatten)]
        subgraph: SubgraphArgs,

        #[command(flatten)]
        solver: SolverArgs,

        /// Number of random input points
        #[arg(long, default_value = "5")]
        points: usize,

        /// Seed for the input generator
        #[arg(long, default_value = "123")]
        seed: u64,

        /// Largest acceptable absolute error
        #[arg(long, default_value = "1e-4")]
        tolerance: f64,
    },
}

#[derive(Args)]
pub struct ModelArgs {
    /// Path to a frozen graph file or saved model directory
    #[arg(short, long)]
    pub model: PathBuf,

    /// Model format: frozenGraph, savedModel_v1 or savedModel_v2
    #[arg(short, long, default_value = "frozenGraph")]
    pub format: String,
}

#[derive(Args)]
pub struct SubgraphArgs {
    /// Input operations, comma separated or repeated
    #[arg(short, long, value_delimiter = ',')]
    pub inputs: Vec<String>,

    /// Output operation, defaults to the graph's single terminal operation
    #[arg(short, long)]
    pub output: Option<String>,
}

#[derive(Args)]
pub struct SolverArgs {
    /// Solver option as key=value (verbosity, timeout_secs, tolerance)
    #[arg(long = "option", value_name = "KEY=VALUE")]
    pub options: Vec<String>,
}
