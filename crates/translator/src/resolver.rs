//! Dependency resolution
//!
//! Selects the subgraph needed to compute one output from a set of declared
//! inputs. Traversal walks input references backward from the output and
//! stops at declared inputs, whose values are supplied externally.
//!
//! ## Checks
//!
//! 1. The output and every declared input name an operation of the graph
//! 2. The output is not also declared as an input
//! 3. Every placeholder the output depends on is a declared input
//! 4. Every declared input is reached from the output

use crate::graph::{NodeId, OpGraph, OpKind};
use crate::{Result, TranslateError};
use rustc_hash::FxHashSet;
use tracing::{debug, info};

/// Subgraph selected for translation
#[derive(Debug, Clone)]
pub struct Resolution {
    /// Declared (or detected) inputs, in declaration order
    pub inputs: Vec<NodeId>,
    pub output: NodeId,
    /// Operations needed for the output, in discovery order
    pub reachable: Vec<NodeId>,
}

impl Resolution {
    /// Inputs at which traversal halted
    pub fn frontier(&self) -> &[NodeId] {
        &self.inputs
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.reachable.contains(&id)
    }
}

pub struct DependencyResolver<'a> {
    graph: &'a OpGraph,
}

impl<'a> DependencyResolver<'a> {
    pub fn new(graph: &'a OpGraph) -> Self {
        Self { graph }
    }

    /// Resolve the subgraph for `output` given `inputs`
    ///
    /// Without declared inputs, the placeholders the output depends on are
    /// used in graph order. Without an output, the graph's single terminal
    /// operation is used.
    pub fn resolve(&self, inputs: Option<&[String]>, output: Option<&str>) -> Result<Resolution> {
        let output_id = match output {
            Some(name) => self.graph.id_of(name).ok_or_else(|| {
                TranslateError::NameResolution(format!(
                    "output {} is not an operation in the graph",
                    name
                ))
            })?,
            None => self.default_output()?,
        };
        let output_name = &self.graph.node(output_id).name;

        let declared = match inputs {
            Some(names) => Some(self.declared_inputs(names)?),
            None => None,
        };

        if let Some(declared) = &declared {
            if declared.contains(&output_id) {
                return Err(TranslateError::Topology(format!(
                    "{} cannot be used as both input and output",
                    output_name
                )));
            }
        }

        let halt: FxHashSet<NodeId> = declared.iter().flatten().copied().collect();
        let reachable = self.traverse(output_id, &halt)?;
        let visited: FxHashSet<NodeId> = reachable.iter().copied().collect();

        let inputs = match declared {
            Some(declared) => {
                if let Some(&missing) = reachable
                    .iter()
                    .find(|id| self.graph.node(**id).kind == OpKind::Placeholder && !halt.contains(*id))
                {
                    return Err(TranslateError::Topology(format!(
                        "output {} depends on placeholder {}, which is not supplied as an input",
                        output_name,
                        self.graph.node(missing).name
                    )));
                }

                let unused: Vec<&str> = declared
                    .iter()
                    .filter(|id| !visited.contains(*id))
                    .map(|id| self.graph.node(*id).name.as_str())
                    .collect();
                if !unused.is_empty() {
                    return Err(TranslateError::Topology(format!(
                        "not all inputs contributed to the output {}: unused {}",
                        output_name,
                        unused.join(", ")
                    )));
                }
                declared
            }
            None => self
                .graph
                .placeholders()
                .into_iter()
                .filter(|id| visited.contains(id))
                .collect(),
        };

        info!(
            output = %output_name,
            inputs = inputs.len(),
            operations = reachable.len(),
            "resolved subgraph"
        );
        Ok(Resolution {
            inputs,
            output: output_id,
            reachable,
        })
    }

    fn declared_inputs(&self, names: &[String]) -> Result<Vec<NodeId>> {
        let mut ids = Vec::with_capacity(names.len());
        for name in names {
            let id = self.graph.id_of(name).ok_or_else(|| {
                TranslateError::NameResolution(format!(
                    "input {} is not an operation in the graph",
                    name
                ))
            })?;
            if ids.contains(&id) {
                return Err(TranslateError::Topology(format!(
                    "input {} is declared more than once",
                    name
                )));
            }
            ids.push(id);
        }
        Ok(ids)
    }

    /// Sole computed operation without consumers
    fn default_output(&self) -> Result<NodeId> {
        let terminals = self.graph.terminal_nodes();
        match terminals.as_slice() {
            [only] => Ok(*only),
            [] => Err(TranslateError::Topology(
                "graph has no terminal operation to use as output".into(),
            )),
            many => {
                let names: Vec<&str> = many
                    .iter()
                    .map(|id| self.graph.node(*id).name.as_str())
                    .collect();
                Err(TranslateError::Topology(format!(
                    "graph has {} terminal operations ({}); an output name is required",
                    many.len(),
                    names.join(", ")
                )))
            }
        }
    }

    /// Backward depth-first walk from `output`, not expanding halting nodes
    fn traverse(&self, output: NodeId, halt: &FxHashSet<NodeId>) -> Result<Vec<NodeId>> {
        let mut visited = FxHashSet::default();
        let mut order = Vec::new();
        let mut stack = vec![output];

        while let Some(id) = stack.pop() {
            if !visited.insert(id) {
                continue;
            }
            order.push(id);
            if halt.contains(&id) {
                continue;
            }
            for input in self.graph.input_ids(id)?.into_iter().rev() {
                if !visited.contains(&input) {
                    stack.push(input);
                }
            }
        }
        debug!(visited = order.len(), "backward traversal finished");
        Ok(order)
    }
}
