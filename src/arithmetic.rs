//! Arithmetic figures: unit placement for the input plane, the sliding window
//! and the highlighted output cell. No values are drawn, only geometry.
//!
//! A transposed convolution is drawn as the direct convolution it is
//! equivalent to: input units spread `stride` apart (zeros inserted between
//! them), padding `k - 1 - p`, and a window moving with stride 1.
//!
//! More can be read here:
//! - <https://arxiv.org/abs/1603.07285>
//! - <https://github.com/akutzer/numpy_cnn/blob/master/CNN/Layer/TransposedConv.py>

use std::collections::BTreeMap;

use crate::{
    error::{FigureError, FigureResult},
    geometry::{frame_offset, vertical_alignment, FrameOffset, Geometry},
    template::Templates,
};

/// Placement of everything drawn on the input plane of an arithmetic figure.
#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub struct ArithmeticLayout {
    /// Number of input units per side.
    pub input_size: usize,
    pub output_size: usize,
    pub padding: usize,
    /// Kernel taps per side, before dilation.
    pub kernel_size: usize,
    /// Extent of the dilated kernel.
    pub kernel_extent: usize,
    pub dilation: usize,
    /// Distance the window moves between neighbouring output cells.
    pub stride: usize,
    /// Distance between neighbouring input units.
    pub spacing: usize,
    /// Extra zero rows below (and columns right of) the input units.
    pub bottom_pad: usize,
    pub y_adjustment: usize,
    pub total_input_size: usize,
}

impl ArithmeticLayout {
    pub fn new(geometry: &Geometry, transposed: bool) -> FigureResult<Self> {
        if transposed {
            ArithmeticLayout::transposed(geometry)
        } else {
            geometry.validate()?;
            Ok(ArithmeticLayout::direct(geometry))
        }
    }

    /// Layout of the convolution described by `geometry` itself.
    pub fn direct(geometry: &Geometry) -> Self {
        let kernel_extent = geometry.effective_kernel_size();
        let total_input_size = geometry.padded_input_size();
        ArithmeticLayout {
            input_size: geometry.input_size,
            output_size: geometry.output_size,
            padding: geometry.padding,
            kernel_size: geometry.kernel_size,
            kernel_extent,
            dilation: geometry.dilation,
            stride: geometry.stride,
            spacing: 1,
            bottom_pad: 0,
            y_adjustment: vertical_alignment(total_input_size, kernel_extent, geometry.stride),
            total_input_size,
        }
    }

    /// Layout of the transpose of the convolution described by `geometry`:
    /// input and output sizes swap roles.
    pub fn transposed(geometry: &Geometry) -> FigureResult<Self> {
        geometry.validate()?;
        let kernel_extent = geometry.effective_kernel_size();
        let padding = (kernel_extent - 1)
            .checked_sub(geometry.padding)
            .ok_or_else(|| {
                FigureError::invalid_argument(format!(
                    "padding {} exceeds kernel extent {} minus one; the transpose has no direct equivalent",
                    geometry.padding, kernel_extent
                ))
            })?;
        let bottom_pad = geometry.padded_input_size().saturating_sub(kernel_extent) % geometry.stride;

        let input_size = geometry.output_size;
        let spacing = geometry.stride;
        let total_input_size = input_size
            .saturating_sub(1)
            .checked_mul(spacing)
            .and_then(|units| units.checked_add(padding))
            .and_then(|size| size.checked_add(padding))
            .and_then(|size| size.checked_add(1 + bottom_pad))
            .ok_or_else(|| {
                FigureError::invalid_argument(format!(
                    "transpose of {:?} does not fit in a usize",
                    geometry
                ))
            })?;

        Ok(ArithmeticLayout {
            input_size,
            output_size: geometry.input_size,
            padding,
            kernel_size: geometry.kernel_size,
            kernel_extent,
            dilation: geometry.dilation,
            stride: 1,
            spacing,
            bottom_pad,
            y_adjustment: 0,
            total_input_size,
        })
    }

    /// Bottom-left corners of every input unit, column by column.
    pub fn input_units(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        (0..self.input_size).flat_map(move |a| {
            (0..self.input_size).map(move |b| {
                (
                    self.padding + a * self.spacing,
                    self.padding + self.bottom_pad + b * self.spacing,
                )
            })
        })
    }

    /// Corners `(from, to)` of the window feeding output cell `offset`.
    pub fn window(&self, offset: FrameOffset) -> ((usize, usize), (usize, usize)) {
        let from = (
            self.stride * offset.x,
            self.stride * offset.y + self.y_adjustment,
        );
        let to = (from.0 + self.kernel_extent, from.1 + self.kernel_extent);
        (from, to)
    }

    /// Bottom-left corners of the kernel taps inside the window for `offset`.
    pub fn kernel_taps(&self, offset: FrameOffset) -> impl Iterator<Item = (usize, usize)> + '_ {
        let (from, _) = self.window(offset);
        (0..self.kernel_size).flat_map(move |a| {
            (0..self.kernel_size)
                .map(move |b| (from.0 + a * self.dilation, from.1 + b * self.dilation))
        })
    }
}

/// One rendered arithmetic frame.
#[derive(Debug, Clone)]
pub struct ArithmeticFrame {
    pub step: usize,
    pub offset: FrameOffset,
    pub layout: ArithmeticLayout,
    pub markup: String,
}

fn point(x: usize, y: usize) -> String {
    format!("{},{}", x, y)
}

/// Renders frame `step` of an arithmetic animation. Pure: the same arguments
/// always give the same markup.
pub fn render_arithmetic_frame(
    step: usize,
    geometry: &Geometry,
    transposed: bool,
    templates: &Templates,
) -> FigureResult<ArithmeticFrame> {
    let layout = ArithmeticLayout::new(geometry, transposed)?;
    let offset = frame_offset(step, layout.output_size)?;
    geometry.warn_if_inconsistent();

    let input_units = layout
        .input_units()
        .map(|(x, y)| {
            let unit = BTreeMap::from([("FROM", point(x, y)), ("TO", point(x + 1, y + 1))]);
            templates.unit.render(&unit)
        })
        .collect::<FigureResult<String>>()?;

    let kernel_units: String = layout
        .kernel_taps(offset)
        .map(|(x, y)| {
            format!(
                "        \\draw[draw=base03, fill=cyan, opacity=0.5] ({}) rectangle ({});\n",
                point(x, y),
                point(x + 1, y + 1)
            )
        })
        .collect();

    let ((from_x, from_y), (to_x, to_y)) = layout.window(offset);
    let total = layout.total_input_size;
    let output_size = layout.output_size;

    let values = BTreeMap::from([
        ("PADDING_TO", point(total, total)),
        ("INPUT_UNITS", input_units),
        ("KERNEL_UNITS", kernel_units),
        ("INPUT_GRID_FROM_X", from_x.to_string()),
        ("INPUT_GRID_FROM_Y", from_y.to_string()),
        ("INPUT_GRID_TO_X", to_x.to_string()),
        ("INPUT_GRID_TO_Y", to_y.to_string()),
        ("OUTPUT_TO", point(output_size, output_size)),
        ("OUTPUT_GRID_FROM", point(offset.x, offset.y)),
        ("OUTPUT_GRID_TO", point(offset.x + 1, offset.y + 1)),
        ("OUTPUT_BOTTOM_LEFT", point(offset.x, offset.y)),
        ("OUTPUT_BOTTOM_RIGHT", point(offset.x + 1, offset.y)),
        ("OUTPUT_TOP_LEFT", point(offset.x, offset.y + 1)),
        ("OUTPUT_TOP_RIGHT", point(offset.x + 1, offset.y + 1)),
        ("OUTPUT_ELEVATION", format!("{}cm", total + 1)),
        (
            "OUTPUT_SHIFT",
            format!("{}cm", (total as f64 - output_size as f64) / 2.0),
        ),
    ]);
    let markup = templates.arithmetic_figure.render(&values)?;

    tracing::debug!(step, transposed, x = offset.x, y = offset.y, "rendered arithmetic frame");

    Ok(ArithmeticFrame {
        step,
        offset,
        layout,
        markup,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strided() -> Geometry {
        Geometry {
            input_size: 5,
            output_size: 2,
            stride: 2,
            ..Geometry::default()
        }
    }

    #[test]
    fn same_arguments_same_markup() {
        let t = Templates::embedded();
        for transposed in [false, true] {
            let a = render_arithmetic_frame(3, &strided(), transposed, &t).unwrap();
            let b = render_arithmetic_frame(3, &strided(), transposed, &t).unwrap();
            assert_eq!(a.markup, b.markup);
        }
    }

    #[test]
    fn distinct_steps_distinct_highlights() {
        let t = Templates::embedded();
        let g = Geometry::default();
        let frames: Vec<ArithmeticFrame> = (0..g.num_steps())
            .map(|step| render_arithmetic_frame(step, &g, false, &t).unwrap())
            .collect();
        for a in &frames {
            for b in &frames {
                if a.step != b.step {
                    assert_ne!(a.offset, b.offset);
                    assert_ne!(a.markup, b.markup);
                }
            }
        }
    }

    #[test]
    fn direct_layout_places_units_inside_padding() {
        let g = Geometry {
            padding: 1,
            output_size: 5,
            ..Geometry::default()
        };
        let layout = ArithmeticLayout::direct(&g);
        assert_eq!(layout.total_input_size, 7);
        let units: Vec<_> = layout.input_units().collect();
        assert_eq!(units.len(), 25);
        assert_eq!(units[0], (1, 1));
        assert_eq!(units[24], (5, 5));
    }

    #[test]
    fn direct_window_is_top_aligned_for_odd_strides() {
        let g = Geometry {
            input_size: 6,
            output_size: 3,
            padding: 1,
            stride: 2,
            ..Geometry::default()
        };
        let layout = ArithmeticLayout::direct(&g);
        assert_eq!(layout.y_adjustment, 1);
        let top_row = frame_offset(0, 3).unwrap();
        let (_, to) = layout.window(top_row);
        assert_eq!(to.1, layout.total_input_size);
    }

    #[test]
    fn dilated_taps_are_spread() {
        let g = Geometry {
            input_size: 7,
            dilation: 2,
            ..Geometry::default()
        };
        let layout = ArithmeticLayout::direct(&g);
        assert_eq!(layout.kernel_extent, 5);
        let taps: Vec<_> = layout.kernel_taps(FrameOffset { x: 1, y: 0 }).collect();
        assert_eq!(taps.len(), 9);
        assert_eq!(taps[0], (1, 0));
        assert_eq!(taps[8], (5, 4));
    }

    #[test]
    fn transposed_swaps_sizes_and_inserts_zeros() {
        let layout = ArithmeticLayout::transposed(&strided()).unwrap();
        assert_eq!(layout.input_size, 2);
        assert_eq!(layout.output_size, 5);
        assert_eq!(layout.padding, 2);
        assert_eq!(layout.spacing, 2);
        assert_eq!(layout.stride, 1);
        assert_eq!(layout.total_input_size, 7);
        let units: Vec<_> = layout.input_units().collect();
        assert_eq!(units, vec![(2, 2), (2, 4), (4, 2), (4, 4)]);
    }

    #[test]
    fn transposed_bottom_pad_covers_odd_shapes() {
        let g = Geometry {
            input_size: 6,
            output_size: 3,
            padding: 1,
            stride: 2,
            ..Geometry::default()
        };
        let layout = ArithmeticLayout::transposed(&g).unwrap();
        assert_eq!(layout.bottom_pad, 1);
        assert_eq!(layout.total_input_size, 8);
        assert_eq!(layout.input_units().next(), Some((1, 2)));
    }

    #[test]
    fn transposed_matches_direct_convolution_over_swapped_geometry() {
        for g in [
            strided(),
            Geometry::default(),
            Geometry {
                input_size: 6,
                output_size: 3,
                padding: 1,
                stride: 2,
                ..Geometry::default()
            },
        ] {
            let transposed = ArithmeticLayout::transposed(&g).unwrap();
            let equivalent = Geometry {
                input_size: transposed.total_input_size,
                output_size: transposed.output_size,
                padding: 0,
                kernel_size: g.kernel_size,
                stride: 1,
                dilation: g.dilation,
            };
            assert_eq!(equivalent.expected_output_size(), Some(transposed.output_size));
            let direct = ArithmeticLayout::direct(&equivalent);
            for step in 0..transposed.output_size * transposed.output_size {
                let offset = frame_offset(step, transposed.output_size).unwrap();
                assert_eq!(transposed.window(offset), direct.window(offset));
            }
        }
    }

    #[test]
    fn unit_stride_transpose_is_a_padded_direct_convolution() {
        let g = Geometry::default();
        let transposed = ArithmeticLayout::transposed(&g).unwrap();
        let swapped = Geometry {
            input_size: g.output_size,
            output_size: g.input_size,
            padding: g.kernel_size - 1 - g.padding,
            ..g
        };
        assert_eq!(transposed, ArithmeticLayout::direct(&swapped));
    }

    #[test]
    fn excessive_padding_cannot_be_transposed() {
        let g = Geometry {
            padding: 3,
            output_size: 9,
            ..Geometry::default()
        };
        assert!(matches!(
            ArithmeticLayout::transposed(&g),
            Err(FigureError::InvalidArgument(_))
        ));
    }

    #[test]
    fn overflowing_geometry_is_rejected_before_rendering() {
        let t = Templates::embedded();
        let huge = Geometry {
            output_size: 1 << (usize::BITS / 2 + 1),
            ..Geometry::default()
        };
        for transposed in [false, true] {
            assert!(matches!(
                render_arithmetic_frame(0, &huge, transposed, &t),
                Err(FigureError::InvalidArgument(_))
            ));
        }
    }

    #[test]
    fn overflowing_transpose_is_rejected() {
        // The direct windows just fit; the transpose adds k - 1 zeros on each side.
        let g = Geometry {
            input_size: 5,
            output_size: 2,
            kernel_size: 5,
            stride: usize::MAX - 5,
            ..Geometry::default()
        };
        assert!(g.validate().is_ok());
        assert!(matches!(
            ArithmeticLayout::transposed(&g),
            Err(FigureError::InvalidArgument(_))
        ));
    }

    #[test]
    fn step_range_uses_swapped_output_size() {
        let t = Templates::embedded();
        // 2x2 direct output, 5x5 transposed output
        assert!(render_arithmetic_frame(4, &strided(), false, &t).is_err());
        assert!(render_arithmetic_frame(24, &strided(), true, &t).is_ok());
        assert!(matches!(
            render_arithmetic_frame(25, &strided(), true, &t),
            Err(FigureError::InvalidArgument(_))
        ));
    }

    #[test]
    fn output_corners_are_emitted() {
        let t = Templates::embedded();
        let frame = render_arithmetic_frame(0, &Geometry::default(), false, &t).unwrap();
        assert!(frame.markup.contains("(out top right) at (1,3)"));
        assert!(frame.markup.contains("(out bottom left) at (0,2)"));
        assert_eq!(frame.markup.matches("fill=blue, thick] (").count(), 25);
    }
}
