//! Convolution and max pooling
//!
//! Both honor `padding` (VALID/SAME), `strides` and `data_format`. The layout
//! is handled by permuting index arithmetic; data is never transposed.
//! Filters are `[kh, kw, in_channels, out_channels]` in either layout.

use super::{expect_arity, vars_operand, Linear, Operand, Term};
use crate::allocator::VarGroup;
use crate::graph::OpNode;
use crate::layout::{DataFormat, Padding, Window};
use crate::network::{NetworkModel, PlConstraint};
use crate::shape::TensorShape;
use crate::{Result, TranslateError};

/// Resolved Conv2D geometry
#[derive(Debug, Clone, Copy)]
pub struct ConvGeometry {
    pub format: DataFormat,
    pub batch: usize,
    pub in_channels: usize,
    pub out_channels: usize,
    pub rows: Window,
    pub cols: Window,
}

impl ConvGeometry {
    pub fn from_node(node: &OpNode, input: &TensorShape, filter: &TensorShape) -> Result<Self> {
        let format = DataFormat::parse(node.attr_str("data_format"))?;
        if input.rank() != 4 || filter.rank() != 4 {
            return Err(TranslateError::InvalidModel(format!(
                "Conv2D {} needs rank-4 input and filter, got {} and {}",
                node.name, input, filter
            )));
        }
        if let Some(dilations) = node.attr_ints("dilations") {
            if dilations.iter().any(|&d| d != 1) {
                return Err(TranslateError::UnsupportedOp(format!(
                    "Conv2D {} uses dilations {:?}",
                    node.name, dilations
                )));
            }
        }

        let dims = input.dims();
        let [h_axis, w_axis] = format.spatial_axes();
        let in_channels = dims[format.channel_axis()];
        let f = filter.dims();
        if f[2] != in_channels {
            return Err(TranslateError::InvalidModel(format!(
                "Conv2D {} filter {} expects {} input channels, input {} has {}",
                node.name, filter, f[2], input, in_channels
            )));
        }

        let strides = node.attr_ints("strides").unwrap_or(&[1, 1, 1, 1]);
        let [sh, sw] = format.spatial_params(strides, "strides")?;
        let padding = Padding::parse(node.attr_str("padding"))?;

        Ok(Self {
            format,
            batch: dims[0],
            in_channels,
            out_channels: f[3],
            rows: Window::new(dims[h_axis], f[0], sh, padding)?,
            cols: Window::new(dims[w_axis], f[1], sw, padding)?,
        })
    }

    pub fn output_shape(&self) -> TensorShape {
        self.format
            .make_shape(self.batch, self.out_channels, self.rows.output, self.cols.output)
    }

    /// Flat index into the `[kh, kw, cin, cout]` filter
    pub fn filter_index(&self, kr: usize, kc: usize, ci: usize, co: usize) -> usize {
        ((kr * self.cols.size + kc) * self.in_channels + ci) * self.out_channels + co
    }
}

/// Resolved MaxPool geometry
#[derive(Debug, Clone, Copy)]
pub struct PoolGeometry {
    pub format: DataFormat,
    pub batch: usize,
    pub channels: usize,
    pub rows: Window,
    pub cols: Window,
}

impl PoolGeometry {
    pub fn from_node(node: &OpNode, input: &TensorShape) -> Result<Self> {
        let format = DataFormat::parse(node.attr_str("data_format"))?;
        if input.rank() != 4 {
            return Err(TranslateError::InvalidModel(format!(
                "MaxPool {} needs a rank-4 input, got {}",
                node.name, input
            )));
        }
        let ksize = node.attr_ints("ksize").ok_or_else(|| {
            TranslateError::InvalidModel(format!("MaxPool {} has no ksize", node.name))
        })?;
        let [kh, kw] = format.spatial_params(ksize, "ksize")?;
        let strides = node.attr_ints("strides").unwrap_or(&[1, 1, 1, 1]);
        let [sh, sw] = format.spatial_params(strides, "strides")?;
        let padding = Padding::parse(node.attr_str("padding"))?;

        let dims = input.dims();
        let [h_axis, w_axis] = format.spatial_axes();
        Ok(Self {
            format,
            batch: dims[0],
            channels: dims[format.channel_axis()],
            rows: Window::new(dims[h_axis], kh, sh, padding)?,
            cols: Window::new(dims[w_axis], kw, sw, padding)?,
        })
    }

    pub fn output_shape(&self) -> TensorShape {
        self.format
            .make_shape(self.batch, self.channels, self.rows.output, self.cols.output)
    }

    /// Input positions `(row, col)` covered by one output position, padding excluded
    pub fn window(&self, r: usize, c: usize) -> Vec<(usize, usize)> {
        let mut cells = Vec::with_capacity(self.rows.size * self.cols.size);
        for kr in 0..self.rows.size {
            let Some(ir) = self.rows.source(r, kr) else { continue };
            for kc in 0..self.cols.size {
                if let Some(ic) = self.cols.source(c, kc) {
                    cells.push((ir, ic));
                }
            }
        }
        cells
    }
}

/// Weighted sum over the receptive field of every output element
pub(super) fn conv2d(
    node: &OpNode,
    inputs: &[Operand<'_>],
    output: &VarGroup,
    model: &mut NetworkModel,
) -> Result<()> {
    expect_arity(node, inputs.len(), 2)?;
    let (input, filter) = (inputs[0], inputs[1]);
    let filter = filter.as_const().ok_or_else(|| {
        TranslateError::UnsupportedOp(format!("Conv2D {} has a variable filter", node.name))
    })?;
    let geo = ConvGeometry::from_node(node, input.shape(), filter.shape())?;
    let in_shape = input.shape();
    let fmt = geo.format;

    for b in 0..geo.batch {
        for co in 0..geo.out_channels {
            for r in 0..geo.rows.output {
                for c in 0..geo.cols.output {
                    let mut lin = Linear::new();
                    for kr in 0..geo.rows.size {
                        let Some(ir) = geo.rows.source(r, kr) else { continue };
                        for kc in 0..geo.cols.size {
                            let Some(ic) = geo.cols.source(c, kc) else { continue };
                            for ci in 0..geo.in_channels {
                                let w = filter.data()[geo.filter_index(kr, kc, ci, co)];
                                let x = input.term(in_shape.flat_index(&fmt.index(b, ci, ir, ic)));
                                lin.add_product(Term::Const(w), x)?;
                            }
                        }
                    }
                    let out = output.shape.flat_index(&fmt.index(b, co, r, c));
                    model.add_equation(lin.defining(output.var(out)));
                }
            }
        }
    }
    Ok(())
}

/// One MaxPool constraint per output element over its window
pub(super) fn max_pool(
    node: &OpNode,
    inputs: &[Operand<'_>],
    output: &VarGroup,
    model: &mut NetworkModel,
) -> Result<()> {
    expect_arity(node, inputs.len(), 1)?;
    let input = vars_operand(node, inputs[0])?;
    let geo = PoolGeometry::from_node(node, &input.shape)?;
    let fmt = geo.format;

    for b in 0..geo.batch {
        for ch in 0..geo.channels {
            for r in 0..geo.rows.output {
                for c in 0..geo.cols.output {
                    let window: Vec<_> = geo
                        .window(r, c)
                        .into_iter()
                        .map(|(ir, ic)| input.var(input.shape.flat_index(&fmt.index(b, ch, ir, ic))))
                        .collect();
                    if window.is_empty() {
                        return Err(TranslateError::InvalidModel(format!(
                            "MaxPool {} has an empty window at ({}, {})",
                            node.name, r, c
                        )));
                    }
                    let out = output.shape.flat_index(&fmt.index(b, ch, r, c));
                    model.add_pl_constraint(PlConstraint::MaxPool {
                        inputs: window,
                        output: output.var(out),
                    });
                }
            }
        }
    }
    Ok(())
}
