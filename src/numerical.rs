//! Numerical figures: random input and kernel values, the reduced output grid
//! and the TikZ markup showing one window of the reduction.

use std::collections::BTreeMap;

use ndarray::*;
use rand::Rng;

use crate::{
    error::{FigureError, FigureResult},
    geometry::{frame_offset, vertical_alignment, FrameOffset, Geometry},
    reduction::{reduce_windows, Mode},
    template::Templates,
};

/// Upper bound (exclusive) of the random input values.
pub const INPUT_VALUE_BOUND: i32 = 4;
/// Upper bound (exclusive) of the random kernel values.
pub const KERNEL_VALUE_BOUND: i32 = 3;

/// Everything computed for one numerical frame.
#[derive(Debug, Clone)]
pub struct NumericalFrame {
    pub step: usize,
    pub offset: FrameOffset,
    /// Zero-padded input, side `input_size + 2 * padding`.
    pub input: Array2<i32>,
    pub kernel: Array2<i32>,
    pub output: Array2<f32>,
    pub markup: String,
}

/// Draws the padded input grid and the kernel, in that order, row-major.
///
/// The kernel is drawn for every mode so that the random sequence advances
/// the same way whether or not the kernel is used.
pub fn draw_grids<R: Rng + ?Sized>(geometry: &Geometry, rng: &mut R) -> (Array2<i32>, Array2<i32>) {
    let total = geometry.padded_input_size();
    let (pad, size) = (geometry.padding, geometry.input_size);

    let mut input: Array2<i32> = Array::zeros((total, total));
    let interior: Array2<i32> =
        Array::from_shape_simple_fn((size, size), || rng.gen_range(0..INPUT_VALUE_BOUND));
    input
        .slice_mut(s![pad..pad + size, pad..pad + size])
        .assign(&interior);

    let kernel_size = geometry.kernel_size;
    let kernel: Array2<i32> = Array::from_shape_simple_fn((kernel_size, kernel_size), || {
        rng.gen_range(0..KERNEL_VALUE_BOUND)
    });

    (input, kernel)
}

fn point(x: impl std::fmt::Display, y: impl std::fmt::Display) -> String {
    format!("{},{}", x, y)
}

/// Renders frame `step` of a numerical animation.
///
/// Arguments are validated before anything is drawn from `rng`: dilation must
/// be 1 and `step` must be below `output_size²`.
pub fn render_numerical_frame<R: Rng + ?Sized>(
    step: usize,
    geometry: &Geometry,
    mode: Mode,
    templates: &Templates,
    rng: &mut R,
) -> FigureResult<NumericalFrame> {
    geometry.validate()?;
    if geometry.dilation != 1 {
        return Err(FigureError::invalid_argument(format!(
            "only a dilation of 1 is supported for numerical figures, got {}",
            geometry.dilation
        )));
    }
    let offset = frame_offset(step, geometry.output_size)?;
    geometry.warn_if_inconsistent();

    let (input, kernel) = draw_grids(geometry, rng);
    let output: Array2<f32> = reduce_windows(
        input.view(),
        kernel.view(),
        geometry.stride,
        geometry.output_size,
        mode,
    )?;

    let total = geometry.padded_input_size();
    let output_size = geometry.output_size;
    let kernel_size = geometry.kernel_size;
    let stride = geometry.stride;
    let y_adjustment = vertical_alignment(total, kernel_size, stride);
    let window_x = stride * offset.x;
    let window_y = stride * offset.y + y_adjustment;

    // Rendered cell (i, j) counts j upward from the bottom, storage rows count down.
    let input_values: String = (0..total)
        .flat_map(|i| (0..total).map(move |j| (i, j)))
        .map(|(i, j)| {
            format!(
                "    \\node (node) at ({}) {{\\footnotesize {}}};\n",
                point(i as f64 + 0.5, j as f64 + 0.5),
                input[[total - 1 - j, i]]
            )
        })
        .collect();

    let kernel_values: String = if mode.uses_kernel() {
        (0..kernel_size)
            .flat_map(|i| (0..kernel_size).map(move |j| (i, j)))
            .map(|(i, j)| {
                format!(
                    "    \\node (node) at ({}) {{\\tiny {}}};\n",
                    point(
                        (i + window_x) as f64 + 0.8,
                        (j + window_y) as f64 + 0.2
                    ),
                    kernel[[kernel_size - 1 - j, i]]
                )
            })
            .collect()
    } else {
        String::new()
    };

    let output_values: String = (0..output_size)
        .flat_map(|i| (0..output_size).map(move |j| (i, j)))
        .map(|(i, j)| {
            format!(
                "        \\node (node) at ({}) {{\\tiny {:.1}}};\n",
                point(i as f64 + 0.5, j as f64 + 0.5),
                output[[output_size - 1 - j, i]]
            )
        })
        .collect();

    let values = BTreeMap::from([
        ("PADDING_TO", point(total, total)),
        ("INPUT_FROM", point(geometry.padding, geometry.padding)),
        (
            "INPUT_TO",
            point(
                geometry.padding + geometry.input_size,
                geometry.padding + geometry.input_size,
            ),
        ),
        ("INPUT_VALUES", input_values),
        ("INPUT_GRID_FROM", point(window_x, window_y)),
        (
            "INPUT_GRID_TO",
            point(window_x + kernel_size, window_y + kernel_size),
        ),
        ("KERNEL_VALUES", kernel_values),
        ("OUTPUT_TO", point(output_size, output_size)),
        ("OUTPUT_GRID_FROM", point(offset.x, offset.y)),
        ("OUTPUT_GRID_TO", point(offset.x + 1, offset.y + 1)),
        ("OUTPUT_VALUES", output_values),
        ("XSHIFT", format!("{}cm", total + 1)),
        (
            "YSHIFT",
            format!("{}cm", (total as f64 - output_size as f64) / 2.0),
        ),
    ]);
    let markup = templates.numerical_figure.render(&values)?;

    tracing::debug!(step, %mode, x = offset.x, y = offset.y, "rendered numerical frame");

    Ok(NumericalFrame {
        step,
        offset,
        input,
        kernel,
        output,
        markup,
    })
}
