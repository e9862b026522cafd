//! Model containers
//!
//! `frozenGraph` is a single serialized `GraphDef`. Both saved-model
//! generations are a directory holding `saved_model.pb`; the meta-graph
//! tagged `serve` is used, or the first one when no meta-graph carries it.
//! Weights kept in the directory's `variables/` checkpoint are bound into the
//! graph as constants.

use super::checkpoint::{bind_variables, read_checkpoint};
use super::ir::OpGraph;
use crate::proto::{GraphDef, SavedModel};
use crate::{Result, TranslateError};
use prost::Message;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info, warn};

const SAVED_MODEL_FILE: &str = "saved_model.pb";
const SERVING_TAG: &str = "serve";
const VARIABLES_DIR: &str = "variables";
const VARIABLES_PREFIX: &str = "variables";

/// Recognized source formats, tags are case-exact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ModelFormat {
    #[default]
    FrozenGraph,
    SavedModelV1,
    SavedModelV2,
}

impl ModelFormat {
    pub fn tag(self) -> &'static str {
        match self {
            Self::FrozenGraph => "frozenGraph",
            Self::SavedModelV1 => "savedModel_v1",
            Self::SavedModelV2 => "savedModel_v2",
        }
    }
}

impl FromStr for ModelFormat {
    type Err = TranslateError;

    fn from_str(tag: &str) -> Result<Self> {
        match tag {
            "frozenGraph" => Ok(Self::FrozenGraph),
            "savedModel_v1" => Ok(Self::SavedModelV1),
            "savedModel_v2" => Ok(Self::SavedModelV2),
            other => Err(TranslateError::Config(format!(
                "Unknown input to modelType: {}",
                other
            ))),
        }
    }
}

impl fmt::Display for ModelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Read a model from disk into an op-graph
pub fn load_model(path: impl AsRef<Path>, format: ModelFormat) -> Result<OpGraph> {
    let path = path.as_ref();
    info!(path = %path.display(), %format, "loading model");
    let graph_def = match format {
        ModelFormat::FrozenGraph => read_frozen_graph(path)?,
        ModelFormat::SavedModelV1 | ModelFormat::SavedModelV2 => read_saved_model(path)?,
    };
    OpGraph::from_graph_def(&graph_def)
}

fn read_frozen_graph(path: &Path) -> Result<GraphDef> {
    let bytes = std::fs::read(path)?;
    Ok(GraphDef::decode(&bytes[..])?)
}

fn read_saved_model(dir: &Path) -> Result<GraphDef> {
    let file = dir.join(SAVED_MODEL_FILE);
    if !file.is_file() {
        return Err(TranslateError::InvalidModel(format!(
            "{} does not contain {}",
            dir.display(),
            SAVED_MODEL_FILE
        )));
    }
    let bytes = std::fs::read(&file)?;
    let saved = SavedModel::decode(&bytes[..])?;
    debug!(meta_graphs = saved.meta_graphs.len(), "decoded saved model");

    let serving = saved.meta_graphs.iter().position(|mg| {
        mg.meta_info_def
            .as_ref()
            .map_or(false, |info| info.tags.iter().any(|t| t == SERVING_TAG))
    });
    let index = match serving {
        Some(i) => i,
        None => {
            if saved.meta_graphs.len() > 1 {
                warn!("no meta-graph tagged {}, using the first", SERVING_TAG);
            }
            0
        }
    };

    let mut graph_def = saved
        .meta_graphs
        .into_iter()
        .nth(index)
        .and_then(|mg| mg.graph_def)
        .ok_or_else(|| {
            TranslateError::InvalidModel(format!("{} holds no graph", file.display()))
        })?;

    let variables = dir.join(VARIABLES_DIR).join(VARIABLES_PREFIX);
    if variables.with_extension("index").is_file() {
        let checkpoint = read_checkpoint(&variables)?;
        let bound = bind_variables(&mut graph_def, &checkpoint);
        info!(bound, "bound saved-model variables");
    }
    Ok(graph_def)
}
