//! Real-time bird's-eye rectification of a chessboard plane.
//!
//! This crate ties the workspace together:
//! - re-exports of [`birdseye_core`] (homographies, warping) and
//!   [`birdseye_pipeline`] (per-frame rectifier, frame loop)
//! - (feature `image`) conversion to and from `image::RgbImage`, a directory
//!   of still frames as a [`FrameSource`](pipeline::FrameSource), and marker
//!   rendering with `imageproc`
//! - [`RecordedCorners`], a replaying corner detector for headless runs
//! - (feature `chess`) [`detect::ChessboardCornerDetector`] on top of
//!   `calib-targets`
//!
//! ## Quickstart
//!
//! ```no_run
//! use birdseye::pipeline::{FrameLoop, NeverStop, Presentation, Rectifier, RectifyParams, SinkError};
//! use birdseye::{ImageSequenceSource, RecordedCorners};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let source = ImageSequenceSource::new("frames/");
//! let detector = RecordedCorners::load("corners.json")?;
//! let rectifier = Rectifier::new(RectifyParams::default())?;
//! let sink = |p: &Presentation| -> Result<(), SinkError> {
//!     println!("frame {}: {:?}", p.index, p.status);
//!     Ok(())
//! };
//!
//! let summary = FrameLoop::new(source, detector, sink, rectifier).run(&NeverStop)?;
//! println!("{summary:?}");
//! # Ok(())
//! # }
//! ```
//!
//! ## API map
//! - `birdseye::core`: images, homography estimation, projection, warping.
//! - `birdseye::pipeline`: parameters, correspondence selection,
//!   composition, rectification, the frame loop.
//! - `birdseye::detect` (feature `chess`): ChESS-based chessboard corners.

pub use birdseye_core as core;
pub use birdseye_pipeline as pipeline;

pub use birdseye_core::{Homography, Image, ImageView};
pub use birdseye_pipeline::{
    CornerSet, FrameLoop, FrameStatus, LoopSummary, PatternSize, Presentation, RectifiedOutput,
    Rectifier, RectifyParams,
};

mod replay;
pub use replay::{RecordedCorners, RecordedCornersFile, ReplayError};

#[cfg(feature = "image")]
mod image_io;
#[cfg(feature = "image")]
pub use image_io::{
    frame_from_dynamic, frame_from_rgb, frame_to_rgb, render_markers, render_presentation,
    ImageSequenceSource, RenderedPresentation, FRAME_EXTENSIONS,
};

#[cfg(feature = "chess")]
pub mod detect;
