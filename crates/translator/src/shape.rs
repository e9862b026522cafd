//! Static tensor shapes and broadcasting

use crate::{Result, TranslateError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Fully known static shape, row-major
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct TensorShape(Vec<usize>);

impl TensorShape {
    pub fn new(dims: Vec<usize>) -> Self {
        Self(dims)
    }

    pub fn scalar() -> Self {
        Self(Vec::new())
    }

    /// Resolve a partially known shape
    ///
    /// An unknown leading (batch) dimension is taken as 1. Unknown dimensions
    /// anywhere else cannot be resolved statically.
    pub fn from_partial(dims: &[Option<usize>]) -> Result<Self> {
        let mut resolved = Vec::with_capacity(dims.len());
        for (axis, dim) in dims.iter().enumerate() {
            match (axis, dim) {
                (_, Some(d)) => resolved.push(*d),
                (0, None) => resolved.push(1),
                (_, None) => {
                    return Err(TranslateError::InvalidModel(format!(
                        "dimension {} of shape {} is unknown",
                        axis,
                        format_partial(dims)
                    )))
                }
            }
        }
        Ok(Self(resolved))
    }

    pub fn dims(&self) -> &[usize] {
        &self.0
    }

    pub fn rank(&self) -> usize {
        self.0.len()
    }

    pub fn dim(&self, axis: usize) -> Option<usize> {
        self.0.get(axis).copied()
    }

    /// Number of scalar elements
    pub fn numel(&self) -> usize {
        self.0.iter().product()
    }

    pub fn strides(&self) -> Vec<usize> {
        let mut strides = vec![1; self.0.len()];
        for axis in (0..self.0.len().saturating_sub(1)).rev() {
            strides[axis] = strides[axis + 1] * self.0[axis + 1];
        }
        strides
    }

    /// Row-major flat position of a multi-index
    pub fn flat_index(&self, index: &[usize]) -> usize {
        index
            .iter()
            .zip(self.strides())
            .map(|(i, stride)| i * stride)
            .sum()
    }

    /// Multi-index of a row-major flat position
    pub fn unravel(&self, mut flat: usize) -> Vec<usize> {
        let mut index = vec![0; self.0.len()];
        for axis in (0..self.0.len()).rev() {
            let dim = self.0[axis].max(1);
            index[axis] = flat % dim;
            flat /= dim;
        }
        index
    }

    /// Normalize a possibly negative axis
    pub fn axis(&self, axis: i64) -> Result<usize> {
        let rank = self.rank() as i64;
        let normalized = if axis < 0 { axis + rank } else { axis };
        if normalized < 0 || normalized >= rank {
            return Err(TranslateError::InvalidModel(format!(
                "axis {} out of range for shape {}",
                axis, self
            )));
        }
        Ok(normalized as usize)
    }
}

impl From<Vec<usize>> for TensorShape {
    fn from(dims: Vec<usize>) -> Self {
        Self(dims)
    }
}

impl From<&[usize]> for TensorShape {
    fn from(dims: &[usize]) -> Self {
        Self(dims.to_vec())
    }
}

impl fmt::Display for TensorShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, d) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", d)?;
        }
        write!(f, "]")
    }
}

fn format_partial(dims: &[Option<usize>]) -> String {
    let parts: Vec<String> = dims
        .iter()
        .map(|d| d.map_or_else(|| "?".to_string(), |d| d.to_string()))
        .collect();
    format!("[{}]", parts.join(", "))
}

/// Broadcast two shapes according to NumPy broadcasting rules
pub fn broadcast_shapes(a: &TensorShape, b: &TensorShape) -> Result<TensorShape> {
    let (a, b) = (a.dims(), b.dims());
    let max_len = a.len().max(b.len());
    let mut out = Vec::with_capacity(max_len);

    for i in 0..max_len {
        let da = if i < a.len() { a[a.len() - 1 - i] } else { 1 };
        let db = if i < b.len() { b[b.len() - 1 - i] } else { 1 };

        if da == db || da == 1 || db == 1 {
            out.push(da.max(db));
        } else {
            return Err(TranslateError::InvalidModel(format!(
                "Incompatible broadcast dimensions: {} and {}",
                da, db
            )));
        }
    }

    out.reverse();
    Ok(TensorShape(out))
}

/// Flat index into `source` feeding output position `out_index` under broadcasting
pub fn broadcast_source_index(out_index: &[usize], source: &TensorShape) -> usize {
    let offset = out_index.len() - source.rank();
    let mut flat = 0;
    let strides = source.strides();
    for (axis, (&dim, stride)) in source.dims().iter().zip(strides).enumerate() {
        let i = if dim == 1 { 0 } else { out_index[offset + axis] };
        flat += i * stride;
    }
    flat
}

/// Resolve a Reshape target, filling in a single `-1`
pub fn reshape_target(input: &TensorShape, target: &[i64]) -> Result<TensorShape> {
    let mut dims = Vec::with_capacity(target.len());
    let mut inferred = None;
    let mut known = 1usize;

    for (axis, &d) in target.iter().enumerate() {
        match d {
            -1 => {
                if inferred.replace(axis).is_some() {
                    return Err(TranslateError::InvalidModel(format!(
                        "reshape target {:?} has more than one -1",
                        target
                    )));
                }
                dims.push(1);
            }
            d if d >= 0 => {
                let d = d as usize;
                known = known.checked_mul(d).ok_or_else(|| {
                    TranslateError::InvalidModel(format!(
                        "reshape target {:?} has more elements than can be addressed",
                        target
                    ))
                })?;
                dims.push(d);
            }
            d => {
                return Err(TranslateError::InvalidModel(format!(
                    "reshape target has negative dimension {}",
                    d
                )))
            }
        }
    }

    let numel = input.numel();
    if let Some(axis) = inferred {
        if known == 0 || numel % known != 0 {
            return Err(TranslateError::InvalidModel(format!(
                "cannot reshape {} into {:?}",
                input, target
            )));
        }
        dims[axis] = numel / known;
    }

    let out = TensorShape(dims);
    if out.numel() != numel {
        return Err(TranslateError::InvalidModel(format!(
            "cannot reshape {} ({} elements) into {}",
            input,
            numel,
            out
        )));
    }
    Ok(out)
}
