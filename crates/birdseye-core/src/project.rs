//! Point projection through 3x3 transforms.

use crate::{Homography, ProjectionError};
use nalgebra::Point2;

/// Apply `h` to a single point; `index` is reported back on failure.
pub fn project_point(
    h: &Homography,
    index: usize,
    p: Point2<f32>,
) -> Result<Point2<f32>, ProjectionError> {
    h.try_apply(p).ok_or(ProjectionError::AtInfinity { index })
}

/// Apply `h` to every point, preserving order.
///
/// Points at infinity come back as [`ProjectionError::AtInfinity`] in their
/// slot rather than being divided through.
pub fn project_points(
    h: &Homography,
    pts: &[Point2<f32>],
) -> Vec<Result<Point2<f32>, ProjectionError>> {
    pts.iter()
        .enumerate()
        .map(|(i, &p)| project_point(h, i, p))
        .collect()
}
