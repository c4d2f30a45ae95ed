//! Geometry of a single convolution figure and the mapping from frame index to
//! the highlighted output cell.
//!
//! Output size follows the usual arithmetic:
//! - <https://github.com/vdumoulin/conv_arithmetic>
//!
//! ```text
//! o = floor((i + 2p - ((k - 1) * d + 1)) / s) + 1
//! ```

use crate::error::{FigureError, FigureResult};

/// Sizes describing one figure. All grids are square, so one number per axis pair.
#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub struct Geometry {
    pub input_size: usize,
    pub output_size: usize,
    pub padding: usize,
    pub kernel_size: usize,
    pub stride: usize,
    pub dilation: usize,
}

impl Default for Geometry {
    fn default() -> Self {
        Geometry {
            input_size: 5,
            output_size: 3,
            padding: 0,
            kernel_size: 3,
            stride: 1,
            dilation: 1,
        }
    }
}

impl Geometry {
    /// Rejects geometries for which the window arithmetic is undefined.
    pub fn validate(&self) -> FigureResult<()> {
        if self.kernel_size == 0 {
            return Err(FigureError::invalid_argument("kernel size must be non-zero"));
        }
        if self.stride == 0 {
            return Err(FigureError::invalid_argument("stride must be non-zero"));
        }
        if self.dilation == 0 {
            return Err(FigureError::invalid_argument("dilation must be non-zero"));
        }
        let overflow = |what: &str| {
            FigureError::invalid_argument(format!("{} does not fit in a usize", what))
        };
        self.padding
            .checked_mul(2)
            .and_then(|pad| pad.checked_add(self.input_size))
            .ok_or_else(|| overflow("input size plus padding"))?;
        let extent = (self.kernel_size - 1)
            .checked_mul(self.dilation)
            .and_then(|k| k.checked_add(1))
            .ok_or_else(|| overflow("dilated kernel size"))?;
        self.output_size
            .checked_mul(self.output_size)
            .ok_or_else(|| overflow("number of frames"))?;
        self.output_size
            .saturating_sub(1)
            .checked_mul(self.stride)
            .and_then(|reach| reach.checked_add(extent))
            .ok_or_else(|| overflow("window reach"))?;
        Ok(())
    }

    /// Kernel extent once dilation spreads its taps apart.
    pub fn effective_kernel_size(&self) -> usize {
        self.kernel_size
            .saturating_sub(1)
            .saturating_mul(self.dilation)
            .saturating_add(1)
    }

    /// Side of the zero-padded input grid.
    pub fn padded_input_size(&self) -> usize {
        self.padding
            .saturating_mul(2)
            .saturating_add(self.input_size)
    }

    /// Output size implied by the other fields, `None` when the kernel does not fit.
    pub fn expected_output_size(&self) -> Option<usize> {
        let padded = self.padded_input_size();
        let kernel = self.effective_kernel_size();
        if self.stride == 0 || kernel > padded {
            return None;
        }
        Some((padded - kernel) / self.stride + 1)
    }

    /// Number of frames in the animation, one per output cell.
    pub fn num_steps(&self) -> usize {
        self.output_size.saturating_mul(self.output_size)
    }

    /// Logs a warning when `output_size` disagrees with the output-size formula.
    /// The caller owns consistency, so this never fails.
    pub(crate) fn warn_if_inconsistent(&self) {
        match self.expected_output_size() {
            Some(expected) if expected == self.output_size => {}
            expected => tracing::warn!(
                ?expected,
                output_size = self.output_size,
                "output size does not match input/padding/kernel/stride/dilation"
            ),
        }
    }
}

/// Vertical offset that lines the rendered windows up with the top of the
/// input grid when `stride` does not divide the space left by the kernel.
///
/// Storage rows run top-down while figures are drawn bottom-up, so the
/// remainder of the stride division ends up under the lowest window.
pub fn vertical_alignment(total_input_size: usize, kernel_size: usize, stride: usize) -> usize {
    if stride == 0 {
        return 0;
    }
    (total_input_size + stride).saturating_sub(kernel_size) % stride
}

/// Output cell highlighted by a frame, in rendered coordinates (y grows upward).
#[derive(PartialEq, Eq, Debug, Clone, Copy, Hash)]
pub struct FrameOffset {
    pub x: usize,
    pub y: usize,
}

/// Maps a frame index to the output cell it highlights.
///
/// Rows are enumerated from the last (topmost when rendered) to the first,
/// columns left to right, so frame 0 is the top-left cell.
pub fn frame_offset(step: usize, output_size: usize) -> FigureResult<FrameOffset> {
    let max_steps = output_size.checked_mul(output_size).ok_or_else(|| {
        FigureError::invalid_argument(format!(
            "output size {} gives more frames than fit in a usize",
            output_size
        ))
    })?;
    if step >= max_steps {
        return Err(FigureError::invalid_argument(format!(
            "step {} out of bounds (there are {} steps)",
            step, max_steps
        )));
    }
    Ok(FrameOffset {
        x: step % output_size,
        y: output_size - 1 - step / output_size,
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn defaults_are_consistent() {
        let g = Geometry::default();
        assert_eq!(g.expected_output_size(), Some(g.output_size));
        assert_eq!(g.num_steps(), 9);
    }

    #[test]
    fn dilation_widens_kernel() {
        let g = Geometry {
            input_size: 7,
            kernel_size: 3,
            dilation: 2,
            ..Geometry::default()
        };
        assert_eq!(g.effective_kernel_size(), 5);
        assert_eq!(g.expected_output_size(), Some(3));
    }

    #[test]
    fn strided_padded_output_size() {
        let g = Geometry {
            input_size: 6,
            padding: 1,
            stride: 2,
            ..Geometry::default()
        };
        assert_eq!(g.expected_output_size(), Some(3));
    }

    #[test]
    fn kernel_larger_than_input_has_no_output() {
        let g = Geometry {
            input_size: 2,
            kernel_size: 4,
            ..Geometry::default()
        };
        assert_eq!(g.expected_output_size(), None);
    }

    #[test]
    fn zero_stride_is_rejected() {
        let g = Geometry {
            stride: 0,
            ..Geometry::default()
        };
        assert!(matches!(g.validate(), Err(FigureError::InvalidArgument(_))));
    }

    #[test]
    fn overflowing_padding_is_rejected() {
        let g = Geometry {
            padding: usize::MAX / 2 + 1,
            ..Geometry::default()
        };
        assert!(matches!(g.validate(), Err(FigureError::InvalidArgument(_))));
        assert_eq!(g.padded_input_size(), usize::MAX);
    }

    #[test]
    fn overflowing_dilation_is_rejected() {
        let g = Geometry {
            kernel_size: 3,
            dilation: usize::MAX / 2 + 1,
            ..Geometry::default()
        };
        assert!(matches!(g.validate(), Err(FigureError::InvalidArgument(_))));
        assert_eq!(g.effective_kernel_size(), usize::MAX);
    }

    #[test]
    fn overflowing_frame_count_is_rejected() {
        let g = Geometry {
            output_size: 1 << (usize::BITS / 2 + 1),
            ..Geometry::default()
        };
        assert!(matches!(g.validate(), Err(FigureError::InvalidArgument(_))));
        assert!(matches!(
            frame_offset(0, g.output_size),
            Err(FigureError::InvalidArgument(_))
        ));
    }

    #[test]
    fn overflowing_window_reach_is_rejected() {
        let g = Geometry {
            output_size: 3,
            stride: usize::MAX / 2,
            ..Geometry::default()
        };
        assert!(matches!(g.validate(), Err(FigureError::InvalidArgument(_))));
    }

    #[test]
    fn alignment_is_zero_when_stride_divides() {
        assert_eq!(vertical_alignment(5, 3, 1), 0);
        assert_eq!(vertical_alignment(7, 3, 2), 0);
    }

    #[test]
    fn alignment_absorbs_stride_remainder() {
        // 8 rows, kernel 3, stride 2: windows start at rows 0, 2, 4 and leave one row below.
        assert_eq!(vertical_alignment(8, 3, 2), 1);
        assert_eq!(vertical_alignment(6, 3, 2), 1);
    }

    #[test]
    fn first_frame_is_top_left() {
        assert_eq!(frame_offset(0, 3).unwrap(), FrameOffset { x: 0, y: 2 });
        assert_eq!(frame_offset(2, 3).unwrap(), FrameOffset { x: 2, y: 2 });
        assert_eq!(frame_offset(3, 3).unwrap(), FrameOffset { x: 0, y: 1 });
        assert_eq!(frame_offset(8, 3).unwrap(), FrameOffset { x: 2, y: 0 });
    }

    #[test]
    fn offset_mapping_is_a_bijection() {
        for size in 1..6 {
            let seen: HashSet<FrameOffset> = (0..size * size)
                .map(|step| frame_offset(step, size).unwrap())
                .collect();
            assert_eq!(seen.len(), size * size);
            assert!(seen.iter().all(|o| o.x < size && o.y < size));
        }
    }

    #[test]
    fn one_past_last_step_is_rejected() {
        assert!(matches!(
            frame_offset(9, 3),
            Err(FigureError::InvalidArgument(_))
        ));
    }
}
