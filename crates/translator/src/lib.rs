//! # netcon-translator
//!
//! Translates TensorFlow graphs into constraint networks for neural network
//! verification, and evaluates the same graphs numerically so the two can be
//! cross-checked.
//!
//! ## Pipeline
//!
//! ```text
//! frozen graph / saved model
//!     ↓
//! 1. Load → OpGraph (petgraph, static shapes)
//!     ↓
//! 2. Resolve → subgraph between declared inputs and one output
//!     ↓
//! 3. Allocate → one variable per tensor element, constants folded
//!     ↓
//! 4. Translate → equations and piecewise-linear constraints
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use netcon_translator::{PropagationSolver, SolverOptions, Tensor, Translator};
//!
//! let network = Translator::new()
//!     .with_format_tag("frozenGraph")?
//!     .with_output("y")
//!     .translate("model.pb")?;
//!
//! let inputs: Vec<Tensor> = network
//!     .input_groups()
//!     .iter()
//!     .map(|g| Tensor::zeros(g.shape.clone()))
//!     .collect();
//! let error = network.find_error(&inputs, &PropagationSolver, &SolverOptions::default(), None)?;
//! assert!(error.max_abs() < 1e-4);
//! # Ok::<(), netcon_translator::TranslateError>(())
//! ```

pub mod allocator;
pub mod config;
pub mod error;
pub mod evaluator;
pub mod graph;
pub mod layout;
pub mod network;
pub mod ops;
pub mod proto;
pub mod resolver;
pub mod shape;
pub mod solver;
pub mod tensor;
pub mod translate;

pub use allocator::{Allocation, VarGroup};
pub use config::SolverOptions;
pub use error::{Result, TranslateError};
pub use graph::{load_model, GraphStatistics, ModelFormat, OpGraph, OpKind, OpNode};
pub use network::{Equation, NetworkModel, NetworkSummary, PlConstraint, VariableId};
pub use shape::TensorShape;
pub use solver::{InputQuery, PropagationSolver, SolveOutcome, SolveStatus, Solver};
pub use tensor::Tensor;
pub use translate::{Network, Translator};

/// Translate a model with optional inputs and output, format given by its tag
pub fn read_tf(
    path: impl AsRef<std::path::Path>,
    inputs: Option<&[&str]>,
    output: Option<&str>,
    format: &str,
) -> Result<Network> {
    let mut translator = Translator::new().with_format_tag(format)?;
    if let Some(inputs) = inputs {
        translator = translator.with_inputs(inputs.iter().copied());
    }
    if let Some(output) = output {
        translator = translator.with_output(output);
    }
    translator.translate(path)
}
