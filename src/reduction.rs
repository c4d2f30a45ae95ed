//! Sliding-window reductions over small 2-D grids: weighted sum (convolution),
//! average pooling and max pooling.
//!
//! Windows are unrolled into rows first (im2col), so every mode becomes a
//! reduction along the second axis of one matrix:
//! - <https://leonardoaraujosantos.gitbook.io/artificial-inteligence/machine_learning/deep_learning/convolution_layer/making_faster>

use std::{fmt, str::FromStr};

use ndarray::*;
use num_traits::Float;

use crate::error::{FigureError, FigureResult};

/// Reduction applied to every input window of a numerical figure.
#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum Mode {
    /// Elementwise product with the kernel, summed.
    Convolution,
    /// Arithmetic mean of the window; the kernel is ignored.
    Average,
    /// Maximum of the window; the kernel is ignored.
    Max,
}

impl Mode {
    pub const ALL: [Mode; 3] = [Mode::Convolution, Mode::Average, Mode::Max];

    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Convolution => "convolution",
            Mode::Average => "average",
            Mode::Max => "max",
        }
    }

    /// Whether the kernel values take part in the reduction (and are drawn in the figure).
    pub fn uses_kernel(&self) -> bool {
        matches!(self, Mode::Convolution)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = FigureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Mode::ALL
            .iter()
            .copied()
            .find(|mode| mode.as_str() == s)
            .ok_or_else(|| {
                FigureError::invalid_argument(format!(
                    "mode must be one of 'convolution', 'average' or 'max', got '{}'",
                    s
                ))
            })
    }
}

/// Unrolls every `ker_size x ker_size` window into one row.
///
/// Returns a `(out_size * out_size, ker_size * ker_size)` matrix; row `r` holds
/// the window whose top-left corner is `(stride * (r / out_size), stride * (r % out_size))`.
pub(crate) fn im2col_ref<'a, T, F: 'a + Float>(
    im_arr: T,
    ker_size: usize,
    out_size: usize,
    stride: usize,
) -> Array2<F>
where
    T: AsArray<'a, F, Ix2>,
{
    let im2d_arr: ArrayView2<F> = im_arr.into();
    let mut cols_img: Array2<F> = Array::zeros((out_size * out_size, ker_size * ker_size));
    let mut cont = 0_usize;
    for i in 0..out_size {
        for j in 0..out_size {
            let patch = im2d_arr.slice(s![
                i * stride..(i * stride + ker_size),
                j * stride..(j * stride + ker_size),
            ]);
            cols_img.row_mut(cont).assign(&Array::from_iter(patch.iter().copied()));
            cont += 1;
        }
    }
    cols_img
}

fn cast<F: Float>(value: i32) -> F {
    F::from(value).unwrap_or_else(F::nan)
}

/// Reduces every window of `input` to one output cell.
///
/// Window `(x, y)` starts at `(stride * x, stride * y)` and spans `kernel` in
/// both directions. The output grid has side `output_size`; a grid whose
/// windows would run past the input is rejected.
pub fn reduce_windows<F: 'static + Float>(
    input: ArrayView2<i32>,
    kernel: ArrayView2<i32>,
    stride: usize,
    output_size: usize,
    mode: Mode,
) -> FigureResult<Array2<F>> {
    let kernel_size = kernel.len_of(Axis(0));
    if kernel_size == 0 || kernel.len_of(Axis(1)) != kernel_size {
        return Err(FigureError::invalid_argument(format!(
            "kernel must be a non-empty square grid, got {:?}",
            kernel.shape()
        )));
    }
    if output_size == 0 {
        return Ok(Array::zeros((0, 0)));
    }
    let reach = stride
        .checked_mul(output_size - 1)
        .and_then(|r| r.checked_add(kernel_size))
        .unwrap_or(usize::MAX);
    if reach > input.len_of(Axis(0)) || reach > input.len_of(Axis(1)) {
        return Err(FigureError::invalid_argument(format!(
            "{} output cells with stride {} and kernel {} need an input of side {}, got {:?}",
            output_size,
            stride,
            kernel_size,
            reach,
            input.shape()
        )));
    }

    let input_f: Array2<F> = input.mapv(cast);
    let im_col = im2col_ref(&input_f, kernel_size, output_size, stride);

    let flat: Array1<F> = match mode {
        Mode::Convolution => {
            let kernel_col: Array1<F> = kernel.iter().map(|&v| cast(v)).collect();
            im_col.dot(&kernel_col)
        }
        Mode::Average => {
            let count: F = cast(kernel_size as i32 * kernel_size as i32);
            im_col.sum_axis(Axis(1)).mapv(|sum| sum / count)
        }
        Mode::Max => im_col.fold_axis(Axis(1), F::neg_infinity(), |&acc, &v| acc.max(v)),
    };

    let output = flat
        .into_shape((output_size, output_size))
        .map_err(anyhow::Error::from)?;
    Ok(output)
}
