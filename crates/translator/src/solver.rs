//! Solver seam
//!
//! A [`Solver`] answers an [`InputQuery`]: a read-only view of a translated
//! [`NetworkModel`] together with a private bound table. Fixing inputs for a
//! query therefore never writes to the model's own bounds.
//!
//! [`PropagationSolver`] is the bundled engine. It handles queries whose
//! inputs are fixed, which is what evaluation needs: values flow forward
//! through equations with a single unknown and through piecewise-linear
//! constraints with known inputs, and the completed assignment is checked
//! against every equation, constraint and bound.

use crate::allocator::VarGroup;
use crate::config::SolverOptions;
use crate::network::{NetworkModel, VariableId};
use crate::tensor::Tensor;
use crate::{Result, TranslateError};
use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Query over a model with its own bound table
#[derive(Debug, Clone, Serialize)]
pub struct InputQuery<'a> {
    model: &'a NetworkModel,
    lower_bounds: BTreeMap<VariableId, f64>,
    upper_bounds: BTreeMap<VariableId, f64>,
}

impl<'a> InputQuery<'a> {
    /// Start from a copy of the model's bounds
    pub fn new(model: &'a NetworkModel) -> Self {
        Self {
            model,
            lower_bounds: model.lower_bounds().clone(),
            upper_bounds: model.upper_bounds().clone(),
        }
    }

    pub fn model(&self) -> &'a NetworkModel {
        self.model
    }

    pub fn lower_bound(&self, variable: VariableId) -> Option<f64> {
        self.lower_bounds.get(&variable).copied()
    }

    pub fn upper_bound(&self, variable: VariableId) -> Option<f64> {
        self.upper_bounds.get(&variable).copied()
    }

    pub fn set_lower_bound(&mut self, variable: VariableId, value: f64) {
        self.lower_bounds.insert(variable, value);
    }

    pub fn set_upper_bound(&mut self, variable: VariableId, value: f64) {
        self.upper_bounds.insert(variable, value);
    }

    /// Pin a variable to one value
    pub fn fix(&mut self, variable: VariableId, value: f64) {
        self.set_lower_bound(variable, value);
        self.set_upper_bound(variable, value);
    }

    /// Pin every variable of a group to the matching tensor element
    pub fn fix_group(&mut self, group: &VarGroup, value: &Tensor) -> Result<()> {
        if value.numel() != group.len() {
            return Err(TranslateError::Shape(format!(
                "{} has {} variables, got {} values",
                group.name,
                group.len(),
                value.numel()
            )));
        }
        for (variable, &x) in group.vars().zip(value.data()) {
            self.fix(variable, x);
        }
        Ok(())
    }

    /// Value of a variable pinned by equal bounds
    pub fn fixed_value(&self, variable: VariableId) -> Option<f64> {
        match (self.lower_bound(variable), self.upper_bound(variable)) {
            (Some(lo), Some(hi)) if lo == hi => Some(lo),
            _ => None,
        }
    }

    /// Write the query as JSON for inspection or an external engine
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = std::io::BufWriter::new(std::fs::File::create(path)?);
        serde_json::to_writer_pretty(file, self)?;
        debug!(path = %path.display(), "wrote input query");
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SolveStatus {
    Sat,
    Unsat,
    /// Under-determined query or time limit reached
    Unknown,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SolveStats {
    pub assigned: usize,
    pub propagation_steps: usize,
    pub elapsed: Duration,
}

#[derive(Debug, Clone, Serialize)]
pub struct SolveOutcome {
    pub status: SolveStatus,
    /// One value per variable, present when `status` is `Sat`
    pub assignment: Option<Vec<f64>>,
    pub stats: SolveStats,
}

impl SolveOutcome {
    /// Values of a group under the satisfying assignment
    pub fn group_values(&self, group: &VarGroup) -> Result<Tensor> {
        let assignment = self.assignment.as_ref().ok_or_else(|| {
            TranslateError::Solver(format!("query is {:?}, no assignment available", self.status))
        })?;
        let data = group
            .vars()
            .map(|v| {
                assignment.get(v).copied().ok_or_else(|| {
                    TranslateError::Internal(format!("variable {} outside the assignment", v))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Tensor::new(group.shape.clone(), data)
    }
}

/// Engine answering input queries
pub trait Solver {
    fn name(&self) -> &str;

    fn solve(&self, query: &InputQuery<'_>, options: &SolverOptions) -> Result<SolveOutcome>;
}

/// Forward propagation with a final consistency check
#[derive(Debug, Clone, Copy, Default)]
pub struct PropagationSolver;

impl PropagationSolver {
    pub fn new() -> Self {
        Self
    }
}

/// Constraint touched by a newly assigned variable
#[derive(Debug, Clone, Copy)]
enum Pending {
    Equation(usize),
    Pl(usize),
}

impl Solver for PropagationSolver {
    fn name(&self) -> &str {
        "propagation"
    }

    fn solve(&self, query: &InputQuery<'_>, options: &SolverOptions) -> Result<SolveOutcome> {
        let start = Instant::now();
        let deadline = (options.timeout_secs > 0)
            .then(|| start + Duration::from_secs(options.timeout_secs));
        let model = query.model();
        let n = model.num_variables();

        let mut stats = SolveStats::default();
        let mut values: Vec<Option<f64>> = (0..n).map(|v| query.fixed_value(v)).collect();

        if let Some(&v) = query
            .lower_bounds
            .keys()
            .chain(query.upper_bounds.keys())
            .find(|&&v| v >= n)
        {
            return Err(out_of_range(v, n));
        }
        for (&v, &lo) in &query.lower_bounds {
            if query.upper_bound(v).map_or(false, |hi| lo > hi) {
                debug!(variable = v, "empty bound interval");
                return Ok(finish(SolveStatus::Unsat, None, stats, start, options));
            }
        }

        // occurrence lists
        let mut watchers: Vec<Vec<Pending>> = vec![Vec::new(); n];
        for (i, eq) in model.equations().iter().enumerate() {
            for v in eq.variables() {
                let slot = watchers.get_mut(v).ok_or_else(|| out_of_range(v, n))?;
                slot.push(Pending::Equation(i));
            }
        }
        for (i, c) in model.pl_constraints().iter().enumerate() {
            for &v in c.inputs() {
                let slot = watchers.get_mut(v).ok_or_else(|| out_of_range(v, n))?;
                slot.push(Pending::Pl(i));
            }
            if c.output() >= n {
                return Err(out_of_range(c.output(), n));
            }
        }

        let mut queue: VecDeque<Pending> = (0..model.equations().len())
            .map(Pending::Equation)
            .chain((0..model.pl_constraints().len()).map(Pending::Pl))
            .collect();

        while let Some(item) = queue.pop_front() {
            stats.propagation_steps += 1;
            if stats.propagation_steps % 1024 == 0 && deadline.map_or(false, |d| Instant::now() >= d) {
                info!(steps = stats.propagation_steps, "solver timed out");
                return Ok(finish(SolveStatus::Unknown, None, stats, start, options));
            }

            let solved = match item {
                Pending::Equation(i) => {
                    let eq = &model.equations()[i];
                    let mut unknown = None;
                    let mut known_sum = 0.0;
                    let mut count = 0;
                    for a in &eq.addends {
                        match values[a.variable] {
                            Some(x) => known_sum += a.coefficient * x,
                            None => {
                                count += 1;
                                unknown = Some(*a);
                            }
                        }
                    }
                    match (count, unknown) {
                        (1, Some(a)) if a.coefficient != 0.0 => {
                            Some((a.variable, (eq.scalar - known_sum) / a.coefficient))
                        }
                        _ => None,
                    }
                }
                Pending::Pl(i) => {
                    let c = &model.pl_constraints()[i];
                    if values[c.output()].is_some() {
                        None
                    } else {
                        let inputs: Option<Vec<f64>> = c.inputs().iter().map(|&v| values[v]).collect();
                        inputs.map(|xs| (c.output(), c.apply(&xs)))
                    }
                }
            };

            if let Some((v, x)) = solved {
                values[v] = Some(x);
                stats.assigned += 1;
                queue.extend(watchers[v].iter().copied());
            }
        }

        let Some(assignment) = values.into_iter().collect::<Option<Vec<f64>>>() else {
            debug!(assigned = stats.assigned, "propagation left variables unassigned");
            return Ok(finish(SolveStatus::Unknown, None, stats, start, options));
        };

        let status = if consistent(query, &assignment, options.tolerance) {
            SolveStatus::Sat
        } else {
            SolveStatus::Unsat
        };
        let assignment = (status == SolveStatus::Sat).then_some(assignment);
        Ok(finish(status, assignment, stats, start, options))
    }
}

fn finish(
    status: SolveStatus,
    assignment: Option<Vec<f64>>,
    mut stats: SolveStats,
    start: Instant,
    options: &SolverOptions,
) -> SolveOutcome {
    stats.elapsed = start.elapsed();
    if options.verbosity > 0 {
        info!(
            ?status,
            assigned = stats.assigned,
            steps = stats.propagation_steps,
            elapsed_ms = stats.elapsed.as_millis() as u64,
            "query solved"
        );
    }
    SolveOutcome {
        status,
        assignment,
        stats,
    }
}

fn out_of_range(variable: VariableId, n: usize) -> TranslateError {
    TranslateError::Internal(format!(
        "variable {} is outside the model's {} variables",
        variable, n
    ))
}

/// Check equations, constraints and bounds with a relative tolerance
fn consistent(query: &InputQuery<'_>, assignment: &[f64], tolerance: f64) -> bool {
    let model = query.model();
    let equations_hold = model.equations().iter().all(|eq| {
        let scale = eq
            .addends
            .iter()
            .map(|a| (a.coefficient * assignment[a.variable]).abs())
            .fold(eq.scalar.abs(), f64::max);
        (eq.evaluate(assignment) - eq.scalar).abs() <= tolerance * (1.0 + scale)
    });
    let constraints_hold = model
        .pl_constraints()
        .iter()
        .all(|c| c.satisfied(assignment, tolerance));
    let bounds_hold = query
        .lower_bounds
        .iter()
        .all(|(&v, &lo)| assignment[v] >= lo - tolerance * (1.0 + lo.abs()))
        && query
            .upper_bounds
            .iter()
            .all(|(&v, &hi)| assignment[v] <= hi + tolerance * (1.0 + hi.abs()));
    equations_hold && constraints_hold && bounds_hold
}
