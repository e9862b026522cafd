//! # netcon
//!
//! TensorFlow graph to constraint-network translation for neural network
//! verification. The translation itself lives in [`netcon_translator`]; this
//! crate re-exports it and ships the `netcon` command-line tool.

pub use netcon_translator::*;

/// Crate version, as reported by `netcon --version`
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
