//! Per-frame chessboard rectification.
//!
//! Given a frame and the interior corners of a chessboard seen in it, the
//! [`Rectifier`] picks four anchor correspondences, estimates the
//! plane-to-image homography `H`, composes it with a fixed auxiliary matrix
//! `K` and resamples the frame into a frontal view of the board plane.
//!
//! [`FrameLoop`] drives a [`FrameSource`], a [`CornerDetector`] and a
//! [`FrameSink`] through that pipeline one frame at a time.
//!
//! ## Quickstart
//!
//! ```no_run
//! use birdseye_pipeline::{CornerSet, Rectifier, RectifyParams};
//! use birdseye_core::Image;
//!
//! let frame = Image::new(640, 480, 3);
//! let corners = CornerSet::default(); // from a detector
//! let rectifier = Rectifier::new(RectifyParams::default())?;
//! match rectifier.rectify(&frame.view(), &corners) {
//!     Ok(out) => println!("{} markers", out.markers.len()),
//!     Err(err) => println!("passing frame through: {err}"),
//! }
//! # Ok::<(), birdseye_pipeline::ConfigError>(())
//! ```

mod annotate;
mod compose;
pub mod frame_loop;
mod params;
mod rectify;
mod select;

pub use annotate::{markers_for, Marker};
pub use compose::{compose, ComposedTransform};
pub use frame_loop::{
    CornerDetector, FrameBudget, FrameLoop, FrameSink, FrameSource, FrameStatus, IterSource,
    LoopError, LoopState, LoopStats, LoopSummary, NeverStop, Presentation, SinkError, SourceError,
    StopReason, StopSignal,
};
pub use params::{
    Anchor, AnnotationParams, ConfigError, CorrespondenceLayout, GridPosition, OutputSize,
    PatternSize, RectifyParams,
};
pub use rectify::{rectify_frame, FrameError, RectifiedOutput, Rectifier};
pub use select::{select_correspondences, CornerSet, Correspondence, SelectError};
