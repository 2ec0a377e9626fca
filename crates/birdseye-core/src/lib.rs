//! Geometric primitives for planar rectification.
//!
//! This crate is intentionally small and purely geometric. It does *not*
//! depend on any corner detector, video source or image library: frames are
//! plain interleaved `u8` buffers ([`Image`] / [`ImageView`]).
//!
//! - [`homography`]: normalized DLT and exact four-point solves with
//!   degeneracy checks.
//! - [`robust`]: estimation strategies ([`DirectSolve`], [`Ransac`]).
//! - [`project`]: point projection that flags points at infinity.
//! - [`warp_perspective`]: inverse-warp resampling with bilinear sampling.

mod error;
pub mod homography;
mod image;
mod logger;
pub mod project;
pub mod robust;
mod warp;

pub use error::{GeometryError, ProjectionError};
pub use homography::{
    check_general_position, check_invertible, estimate_homography_dlt, homography_from_4pt,
    reprojection_error, Homography,
};
pub use image::{sample_bilinear, Image, ImageView, EDGE_TOLERANCE};
pub use project::{project_point, project_points};
pub use robust::{
    DirectSolve, EstimatorMethod, EstimatorParams, HomographyFit, HomographyStrategy, Ransac,
    RansacParams,
};
pub use warp::warp_perspective;

#[cfg(feature = "tracing")]
pub use logger::init_tracing;

pub use logger::init_with_level;

pub use nalgebra::{Matrix3, Point2};
