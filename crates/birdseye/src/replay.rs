//! Corner lists recorded ahead of time, replayed one per frame.
//!
//! File format:
//!
//! ```json
//! { "frames": [ [[x, y], [x, y], ...], null, ... ] }
//! ```
//!
//! Entry `n` is used for the `n`-th frame handed to the detector; `null`
//! and frames past the end of the list count as "pattern not found".

use birdseye_core::ImageView;
use birdseye_pipeline::{CornerDetector, CornerSet, PatternSize};
use nalgebra::Point2;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(thiserror::Error, Debug)]
pub enum ReplayError {
    #[error("failed to read corners file: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid corners file: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordedCornersFile {
    pub frames: Vec<Option<Vec<[f32; 2]>>>,
}

/// [`CornerDetector`] that ignores pixel data and returns recorded corners.
#[derive(Clone, Debug)]
pub struct RecordedCorners {
    frames: Vec<Option<CornerSet>>,
    cursor: usize,
}

impl RecordedCorners {
    pub fn new(frames: Vec<Option<CornerSet>>) -> Self {
        Self { frames, cursor: 0 }
    }

    pub fn from_json_str(s: &str) -> Result<Self, ReplayError> {
        let file: RecordedCornersFile = serde_json::from_str(s)?;
        Ok(file.into())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ReplayError> {
        let s = std::fs::read_to_string(path)?;
        Self::from_json_str(&s)
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

impl From<RecordedCornersFile> for RecordedCorners {
    fn from(file: RecordedCornersFile) -> Self {
        let frames = file
            .frames
            .into_iter()
            .map(|f| {
                f.map(|pts| {
                    CornerSet::new(pts.into_iter().map(|[x, y]| Point2::new(x, y)).collect())
                })
            })
            .collect();
        Self::new(frames)
    }
}

impl CornerDetector for RecordedCorners {
    fn detect(&mut self, _frame: &ImageView<'_>, pattern: PatternSize) -> Option<CornerSet> {
        let index = self.cursor;
        self.cursor += 1;
        let corners = self.frames.get(index).cloned().flatten();
        if corners.is_none() {
            log::debug!(
                "no recorded {}x{} corners for frame {index}",
                pattern.cols,
                pattern.rows
            );
        }
        corners
    }
}
