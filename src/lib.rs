//! This package produces the frames of convolution arithmetic animations.
//! Each frame is a TikZ document showing one position of a sliding window:
//! either numerically (random input and kernel values with the reduced output)
//! or geometrically (unit placement for direct, strided, padded, dilated and
//! transposed convolutions).
//!
//! Frames are rendered as markup by [`render_frame`] and turned into documents
//! by [`compile_frame`], which pipes the markup to a LaTeX compiler.
//!
//! The arithmetic follows:
//! - <https://arxiv.org/abs/1603.07285>
//!
//! Example:
//! ```
//! use conv_figures::*;
//! use rand::{rngs::StdRng, SeedableRng};
//!
//! let geometry = Geometry::default(); // 5x5 input, 3x3 kernel, 3x3 output
//! let templates = Templates::embedded();
//! let mut rng = StdRng::seed_from_u64(1234);
//!
//! let frame = render_numerical_frame(0, &geometry, Mode::Average, &templates, &mut rng).unwrap();
//! assert_eq!(frame.output.dim(), (3, 3));
//!
//! let kind = FigureKind::Arithmetic { transposed: true };
//! let frame = render_frame(&kind, 24, &geometry, &templates, &mut rng).unwrap();
//! println!("{}", frame.markup());
//! ```

pub mod arithmetic;
pub mod compile;
pub mod error;
pub mod geometry;
pub mod numerical;
pub mod reduction;
pub mod template;

pub use arithmetic::{render_arithmetic_frame, ArithmeticFrame, ArithmeticLayout};
pub use compile::{
    compile_frame, compile_sequence, job_name, render_frame, CompileOptions, CompileOutcome,
    FigureKind, Frame, SequenceReport,
};
pub use error::{FigureError, FigureResult};
pub use geometry::{frame_offset, FrameOffset, Geometry};
pub use numerical::{render_numerical_frame, NumericalFrame};
pub use reduction::Mode;
pub use template::{Template, Templates};
