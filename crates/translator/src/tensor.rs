//! Dense numeric tensors
//!
//! Constants of the op-graph and evaluation values share one representation:
//! a static shape and row-major `f64` data.

use crate::proto::{tensor_shape_proto, DataType, TensorProto, TensorShapeProto};
use crate::shape::TensorShape;
use crate::{Result, TranslateError};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tensor {
    shape: TensorShape,
    data: Vec<f64>,
}

impl Tensor {
    pub fn new(shape: impl Into<TensorShape>, data: Vec<f64>) -> Result<Self> {
        let shape = shape.into();
        if shape.numel() != data.len() {
            return Err(TranslateError::Shape(format!(
                "shape {} needs {} values, got {}",
                shape,
                shape.numel(),
                data.len()
            )));
        }
        Ok(Self { shape, data })
    }

    pub fn zeros(shape: impl Into<TensorShape>) -> Self {
        let shape = shape.into();
        let data = vec![0.0; shape.numel()];
        Self { shape, data }
    }

    pub fn scalar(value: f64) -> Self {
        Self {
            shape: TensorShape::scalar(),
            data: vec![value],
        }
    }

    pub fn shape(&self) -> &TensorShape {
        &self.shape
    }

    pub fn data(&self) -> &[f64] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [f64] {
        &mut self.data
    }

    pub fn into_data(self) -> Vec<f64> {
        self.data
    }

    pub fn numel(&self) -> usize {
        self.data.len()
    }

    /// Value at a multi-index
    pub fn get(&self, index: &[usize]) -> f64 {
        self.data[self.shape.flat_index(index)]
    }

    /// Same data under a new shape with an equal element count
    pub fn reshape(&self, shape: impl Into<TensorShape>) -> Result<Self> {
        Self::new(shape, self.data.clone())
    }

    pub fn map(&self, f: impl Fn(f64) -> f64) -> Self {
        Self {
            shape: self.shape.clone(),
            data: self.data.iter().map(|&v| f(v)).collect(),
        }
    }

    /// Element-wise difference, shapes must match exactly
    pub fn sub(&self, other: &Tensor) -> Result<Self> {
        if self.shape != other.shape {
            return Err(TranslateError::Shape(format!(
                "cannot subtract {} from {}",
                other.shape, self.shape
            )));
        }
        Ok(Self {
            shape: self.shape.clone(),
            data: self.data.iter().zip(&other.data).map(|(a, b)| a - b).collect(),
        })
    }

    pub fn max_abs(&self) -> f64 {
        self.data.iter().fold(0.0, |m, v| m.max(v.abs()))
    }

    /// Values as integers, for shape and axis operands
    pub fn to_i64_vec(&self) -> Vec<i64> {
        self.data.iter().map(|&v| v as i64).collect()
    }

    /// Decode a `TensorProto` constant
    pub fn from_proto(proto: &TensorProto) -> Result<Self> {
        let shape = match &proto.tensor_shape {
            Some(s) => shape_from_proto(s)?,
            None => TensorShape::scalar(),
        };
        let numel = shape.numel();
        let dtype = DataType::try_from(proto.dtype).unwrap_or(DataType::DtInvalid);

        let mut values: Vec<f64> = if !proto.tensor_content.is_empty() {
            decode_content(dtype, &proto.tensor_content)?
        } else {
            match dtype {
                DataType::DtFloat => proto.float_val.iter().map(|&v| v as f64).collect(),
                DataType::DtDouble => proto.double_val.clone(),
                DataType::DtInt32 => proto.int_val.iter().map(|&v| v as f64).collect(),
                DataType::DtInt64 => proto.int64_val.iter().map(|&v| v as f64).collect(),
                other => {
                    return Err(TranslateError::InvalidModel(format!(
                        "unsupported tensor dtype {:?}",
                        other
                    )))
                }
            }
        };

        // A single stored value fills the whole tensor
        if values.len() == 1 && numel > 1 {
            values = vec![values[0]; numel];
        } else if values.is_empty() {
            values = vec![0.0; numel];
        }

        if values.len() != numel {
            return Err(TranslateError::InvalidModel(format!(
                "tensor constant has {} values for shape {}",
                values.len(),
                shape
            )));
        }
        Self::new(shape, values)
    }

    /// Encode as a `DT_FLOAT` `TensorProto` with packed content
    pub fn to_proto(&self) -> TensorProto {
        let mut content = Vec::with_capacity(self.data.len() * 4);
        for &v in &self.data {
            content.extend_from_slice(&(v as f32).to_le_bytes());
        }
        TensorProto {
            dtype: DataType::DtFloat as i32,
            tensor_shape: Some(shape_to_proto(&self.shape)),
            tensor_content: content,
            ..Default::default()
        }
    }
}

fn decode_content(dtype: DataType, bytes: &[u8]) -> Result<Vec<f64>> {
    let width = match dtype {
        DataType::DtFloat | DataType::DtInt32 => 4,
        DataType::DtDouble | DataType::DtInt64 => 8,
        other => {
            return Err(TranslateError::InvalidModel(format!(
                "unsupported tensor dtype {:?}",
                other
            )))
        }
    };
    if bytes.len() % width != 0 {
        return Err(TranslateError::InvalidModel(format!(
            "tensor content of {} bytes is not a multiple of {}",
            bytes.len(),
            width
        )));
    }

    Ok(bytes
        .chunks_exact(width)
        .map(|c| match dtype {
            DataType::DtFloat => f32::from_le_bytes([c[0], c[1], c[2], c[3]]) as f64,
            DataType::DtInt32 => i32::from_le_bytes([c[0], c[1], c[2], c[3]]) as f64,
            DataType::DtDouble => {
                f64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]])
            }
            _ => i64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]) as f64,
        })
        .collect())
}

/// Partially known dimensions of a `TensorShapeProto`, `None` for unknown rank
pub fn partial_shape_from_proto(proto: &TensorShapeProto) -> Option<Vec<Option<usize>>> {
    if proto.unknown_rank {
        return None;
    }
    Some(
        proto
            .dim
            .iter()
            .map(|d| if d.size < 0 { None } else { Some(d.size as usize) })
            .collect(),
    )
}

fn shape_from_proto(proto: &TensorShapeProto) -> Result<TensorShape> {
    let dims = partial_shape_from_proto(proto)
        .ok_or_else(|| TranslateError::InvalidModel("tensor constant has unknown rank".into()))?;
    let mut out = Vec::with_capacity(dims.len());
    for d in dims {
        out.push(d.ok_or_else(|| {
            TranslateError::InvalidModel("tensor constant has an unknown dimension".into())
        })?);
    }
    Ok(TensorShape::new(out))
}

pub fn shape_to_proto(shape: &TensorShape) -> TensorShapeProto {
    TensorShapeProto {
        dim: shape
            .dims()
            .iter()
            .map(|&d| tensor_shape_proto::Dim {
                size: d as i64,
                name: String::new(),
            })
            .collect(),
        unknown_rank: false,
    }
}
