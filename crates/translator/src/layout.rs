//! Spatial layout helpers for convolution and pooling
//!
//! TensorFlow passes `strides` and `ksize` as four-element lists indexed by
//! the tensor layout, so the spatial entries sit at different positions for
//! `NHWC` and `NCHW`. [`DataFormat`] hides that difference; [`Window`] holds
//! the per-axis output extent and padding for one spatial axis.

use crate::shape::TensorShape;
use crate::{Result, TranslateError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DataFormat {
    #[default]
    Nhwc,
    Nchw,
}

impl DataFormat {
    pub fn parse(tag: Option<&str>) -> Result<Self> {
        match tag {
            None | Some("NHWC") => Ok(Self::Nhwc),
            Some("NCHW") => Ok(Self::Nchw),
            Some(other) => Err(TranslateError::UnsupportedOp(format!(
                "data_format {} is not supported",
                other
            ))),
        }
    }

    /// Axis holding channels in a rank-4 tensor
    pub fn channel_axis(self) -> usize {
        match self {
            Self::Nhwc => 3,
            Self::Nchw => 1,
        }
    }

    /// Height and width axes in a rank-4 tensor
    pub fn spatial_axes(self) -> [usize; 2] {
        match self {
            Self::Nhwc => [1, 2],
            Self::Nchw => [2, 3],
        }
    }

    /// Height and width entries of a four-element attribute list
    pub fn spatial_params(self, values: &[i64], what: &str) -> Result<[usize; 2]> {
        if values.len() != 4 {
            return Err(TranslateError::InvalidModel(format!(
                "{} must have 4 entries, got {:?}",
                what, values
            )));
        }
        let [h, w] = self.spatial_axes();
        let (n, c) = (values[0], values[self.channel_axis()]);
        if n != 1 || c != 1 {
            return Err(TranslateError::UnsupportedOp(format!(
                "{} {:?} must be 1 on the batch and channel axes",
                what, values
            )));
        }
        if values[h] < 1 || values[w] < 1 {
            return Err(TranslateError::InvalidModel(format!(
                "{} {:?} must be positive",
                what, values
            )));
        }
        Ok([values[h] as usize, values[w] as usize])
    }

    /// Build a rank-4 shape from batch, channel and spatial extents
    pub fn make_shape(self, batch: usize, channels: usize, height: usize, width: usize) -> TensorShape {
        match self {
            Self::Nhwc => TensorShape::new(vec![batch, height, width, channels]),
            Self::Nchw => TensorShape::new(vec![batch, channels, height, width]),
        }
    }

    /// Multi-index for (batch, channel, row, col)
    pub fn index(self, batch: usize, channel: usize, row: usize, col: usize) -> [usize; 4] {
        match self {
            Self::Nhwc => [batch, row, col, channel],
            Self::Nchw => [batch, channel, row, col],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Padding {
    Valid,
    Same,
}

impl Padding {
    pub fn parse(tag: Option<&str>) -> Result<Self> {
        match tag {
            Some("VALID") => Ok(Self::Valid),
            Some("SAME") => Ok(Self::Same),
            Some(other) => Err(TranslateError::UnsupportedOp(format!(
                "padding {} is not supported",
                other
            ))),
            None => Err(TranslateError::InvalidModel("missing padding attribute".into())),
        }
    }
}

/// Sliding-window geometry along one spatial axis
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub input: usize,
    pub size: usize,
    pub stride: usize,
    pub pad_before: usize,
    pub output: usize,
}

impl Window {
    pub fn new(input: usize, size: usize, stride: usize, padding: Padding) -> Result<Self> {
        if stride == 0 || size == 0 {
            return Err(TranslateError::InvalidModel(
                "window size and stride must be positive".into(),
            ));
        }
        let (output, pad_before) = match padding {
            Padding::Valid => {
                if size > input {
                    return Err(TranslateError::InvalidModel(format!(
                        "window of size {} does not fit input extent {}",
                        size, input
                    )));
                }
                ((input - size) / stride + 1, 0)
            }
            Padding::Same => {
                let output = input.div_ceil(stride);
                let needed = (output.saturating_sub(1)) * stride + size;
                let pad_total = needed.saturating_sub(input);
                (output, pad_total / 2)
            }
        };
        Ok(Self {
            input,
            size,
            stride,
            pad_before,
            output,
        })
    }

    /// Input position read by window offset `k` at output position `out`, `None` inside padding
    pub fn source(&self, out: usize, k: usize) -> Option<usize> {
        let pos = (out * self.stride + k).checked_sub(self.pad_before)?;
        (pos < self.input).then_some(pos)
    }
}
