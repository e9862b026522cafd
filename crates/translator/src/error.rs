//! Error types for the translator

use std::io;
use thiserror::Error;

/// Result type for translator operations
pub type Result<T> = std::result::Result<T, TranslateError>;

/// Errors that can occur while loading, translating or evaluating a network
///
/// Every error is raised at the point of detection and names the offending
/// operation, option or value. No partially built network is ever returned.
#[derive(Debug, Error)]
pub enum TranslateError {
    /// Invalid model format tag or solver option key
    #[error("Configuration error: {0}")]
    Config(String),

    /// A declared input or output name is not an operation of the graph
    #[error("Name resolution error: {0}")]
    NameResolution(String),

    /// The declared inputs and output do not describe a valid subgraph
    #[error("Topology error: {0}")]
    Topology(String),

    #[error("Unsupported operation: {0}")]
    UnsupportedOp(String),

    /// Evaluation tensors do not match the network's input groups
    #[error("Shape error: {0}")]
    Shape(String),

    /// Cycles or dangling references on the resolved subgraph
    #[error("Internal consistency error: {0}")]
    Internal(String),

    #[error("Invalid model structure: {0}")]
    InvalidModel(String),

    #[error("Solver error: {0}")]
    Solver(String),

    #[error("IO error: {0}")]
    IoError(#[from] io::Error),

    #[error("Protobuf decode error: {0}")]
    DecodeError(#[from] prost::DecodeError),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<serde_json::Error> for TranslateError {
    fn from(err: serde_json::Error) -> Self {
        TranslateError::SerializationError(err.to_string())
    }
}
