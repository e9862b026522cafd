//! Op-graph representation, shape inference and model loading
//!
//! - `ir`: petgraph-based op-graph with a name index
//! - `shape_inference`: static shapes, computed once at load time
//! - `loader`: frozen-graph and saved-model containers
//! - `checkpoint`: saved-model variable bundles

mod checkpoint;
pub mod ir;
pub mod loader;
mod shape_inference;

pub use ir::{Attr, Dependency, GraphStatistics, NodeId, OpGraph, OpKind, OpNode};
pub use loader::{load_model, ModelFormat};
