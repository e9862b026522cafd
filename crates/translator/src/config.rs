//! Solver options
//!
//! A closed set of tunable options. Unknown keys are rejected whether the
//! options come from JSON or from individual `key=value` settings.

use crate::{Result, TranslateError};
use serde::{Deserialize, Serialize};

/// Options passed to a [`Solver`](crate::solver::Solver)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct SolverOptions {
    /// Logging level of the solver, 0 is silent
    pub verbosity: u32,

    /// Wall-clock limit in seconds, 0 disables it
    pub timeout_secs: u64,

    /// Relative tolerance used when checking equations and constraints
    pub tolerance: f64,
}

impl Default for SolverOptions {
    fn default() -> Self {
        Self {
            verbosity: 0,
            timeout_secs: 0,
            tolerance: 1e-6,
        }
    }
}

impl SolverOptions {
    pub const KEYS: [&'static str; 3] = ["verbosity", "timeout_secs", "tolerance"];

    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_verbosity(mut self, verbosity: u32) -> Self {
        self.verbosity = verbosity;
        self
    }

    pub fn with_timeout_secs(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Parse options from a JSON object, missing keys take their defaults
    pub fn from_json(json: &str) -> Result<Self> {
        let options: Self = serde_json::from_str(json)
            .map_err(|e| TranslateError::Config(format!("invalid solver options: {}", e)))?;
        options.validate()?;
        Ok(options)
    }

    /// Set one option from its textual value
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let bad_value = |e: &dyn std::fmt::Display| {
            TranslateError::Config(format!("invalid value {:?} for option {}: {}", value, key, e))
        };
        match key {
            "verbosity" => self.verbosity = value.parse().map_err(|e| bad_value(&e))?,
            "timeout_secs" => self.timeout_secs = value.parse().map_err(|e| bad_value(&e))?,
            "tolerance" => self.tolerance = value.parse().map_err(|e| bad_value(&e))?,
            other => {
                return Err(TranslateError::Config(format!(
                    "unknown solver option {} (expected one of {})",
                    other,
                    Self::KEYS.join(", ")
                )))
            }
        }
        self.validate()
    }

    /// Apply `key=value` pairs in order
    pub fn apply_pairs<'a>(&mut self, pairs: impl IntoIterator<Item = &'a str>) -> Result<()> {
        for pair in pairs {
            let (key, value) = pair.split_once('=').ok_or_else(|| {
                TranslateError::Config(format!("option {:?} is not of the form key=value", pair))
            })?;
            self.set(key.trim(), value.trim())?;
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if !(self.tolerance.is_finite() && self.tolerance > 0.0) {
            return Err(TranslateError::Config(format!(
                "tolerance must be positive, got {}",
                self.tolerance
            )));
        }
        Ok(())
    }
}
