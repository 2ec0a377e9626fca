use crate::params::{CorrespondenceLayout, GridPosition, PatternSize};
use nalgebra::Point2;
use serde::{Deserialize, Serialize};

/// Corners reported by a detector, row-major over the pattern.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CornerSet {
    pub points: Vec<Point2<f32>>,
}

impl CornerSet {
    pub fn new(points: Vec<Point2<f32>>) -> Self {
        Self { points }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

impl From<Vec<Point2<f32>>> for CornerSet {
    fn from(points: Vec<Point2<f32>>) -> Self {
        Self::new(points)
    }
}

/// A plane point and the image point that shows it.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Correspondence {
    pub grid: GridPosition,
    pub plane: Point2<f32>,
    pub image: Point2<f32>,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum SelectError {
    #[error("expected {expected} corners, detector returned {got}")]
    CornerCountMismatch { expected: usize, got: usize },
    #[error("grid position (row {}, col {}) is outside the pattern", .0.row, .0.col)]
    AnchorOutOfRange(GridPosition),
}

/// Pair each anchor of `layout` with its detected corner.
pub fn select_correspondences(
    pattern: PatternSize,
    layout: &CorrespondenceLayout,
    corners: &CornerSet,
) -> Result<[Correspondence; 4], SelectError> {
    let expected = pattern.point_count();
    if corners.len() != expected {
        return Err(SelectError::CornerCountMismatch {
            expected,
            got: corners.len(),
        });
    }

    let mut out = [Correspondence {
        grid: GridPosition::new(0, 0),
        plane: Point2::origin(),
        image: Point2::origin(),
    }; 4];
    for (slot, anchor) in out.iter_mut().zip(&layout.anchors) {
        let idx = pattern
            .index_of(anchor.grid)
            .ok_or(SelectError::AnchorOutOfRange(anchor.grid))?;
        *slot = Correspondence {
            grid: anchor.grid,
            plane: anchor.plane_point(),
            image: corners.points[idx],
        };
    }
    Ok(out)
}
