use birdseye_core::ImageView;
use birdseye_pipeline::{CornerDetector, CornerSet, PatternSize};
use calib_targets::detect::{default_chess_config, detect_chessboard};
use calib_targets::{ChessboardParams, LabeledCorner};
use chess_corners::ChessConfig;
use image::GrayImage;
use nalgebra::Point2;

#[cfg(feature = "tracing")]
use tracing::instrument;

/// [`CornerDetector`] backed by the `calib-targets` ChESS chessboard detector.
pub struct ChessboardCornerDetector {
    chess: ChessConfig,
    params: ChessboardParams,
}

impl ChessboardCornerDetector {
    pub fn new(chess: ChessConfig, params: ChessboardParams) -> Self {
        Self { chess, params }
    }

    /// Detector expecting exactly `pattern` interior corners.
    pub fn for_pattern(pattern: PatternSize) -> Self {
        let params = ChessboardParams {
            expected_rows: pattern.rows.try_into().ok(),
            expected_cols: pattern.cols.try_into().ok(),
            ..ChessboardParams::default()
        };
        Self::new(default_chess_config(), params)
    }
}

impl Default for ChessboardCornerDetector {
    fn default() -> Self {
        Self::for_pattern(PatternSize::default())
    }
}

/// Luma of an interleaved frame (first channel for 2/4-channel data).
fn to_gray(frame: &ImageView<'_>) -> Option<GrayImage> {
    let w = u32::try_from(frame.width).ok()?;
    let h = u32::try_from(frame.height).ok()?;
    let n = frame.width.checked_mul(frame.height)?;
    let data = match frame.channels {
        1 => frame.data.to_vec(),
        3 => frame
            .data
            .chunks_exact(3)
            .map(|p| (0.299 * p[0] as f32 + 0.587 * p[1] as f32 + 0.114 * p[2] as f32).round() as u8)
            .collect(),
        c if c > 0 => frame.data.iter().step_by(c).copied().collect(),
        _ => return None,
    };
    if data.len() != n {
        return None;
    }
    GrayImage::from_raw(w, h, data)
}

/// Arrange labelled corners row-major over `pattern`.
///
/// Grid coordinates are `(i, j)` = (column, row) up to an offset; a grid
/// whose extent is transposed relative to `pattern` is read column-major.
/// Returns `None` unless every position is filled exactly once.
pub fn order_row_major(corners: &[LabeledCorner], pattern: PatternSize) -> Option<CornerSet> {
    let labelled: Vec<(i32, i32, Point2<f32>)> = corners
        .iter()
        .filter_map(|c| c.grid.map(|g| (g.i, g.j, c.position)))
        .collect();
    let min_i = labelled.iter().map(|c| c.0).min()?;
    let max_i = labelled.iter().map(|c| c.0).max()?;
    let min_j = labelled.iter().map(|c| c.1).min()?;
    let max_j = labelled.iter().map(|c| c.1).max()?;
    let span_i = (max_i - min_i + 1) as usize;
    let span_j = (max_j - min_j + 1) as usize;

    let transposed = if (span_i, span_j) == (pattern.cols, pattern.rows) {
        false
    } else if (span_i, span_j) == (pattern.rows, pattern.cols) {
        true
    } else {
        log::debug!(
            "chessboard grid {span_i}x{span_j} does not match pattern {}x{}",
            pattern.cols,
            pattern.rows
        );
        return None;
    };

    let mut slots: Vec<Option<Point2<f32>>> = vec![None; pattern.point_count()];
    for (i, j, p) in labelled {
        let (col, row) = if transposed {
            ((j - min_j) as usize, (i - min_i) as usize)
        } else {
            ((i - min_i) as usize, (j - min_j) as usize)
        };
        let slot = slots.get_mut(row * pattern.cols + col)?;
        if slot.replace(p).is_some() {
            return None;
        }
    }
    let points: Option<Vec<Point2<f32>>> = slots.into_iter().collect();
    points.map(CornerSet::new)
}

impl CornerDetector for ChessboardCornerDetector {
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "info", skip(self, frame), fields(width = frame.width, height = frame.height))
    )]
    fn detect(&mut self, frame: &ImageView<'_>, pattern: PatternSize) -> Option<CornerSet> {
        let gray = to_gray(frame)?;
        let result = detect_chessboard(&gray, &self.chess, self.params.clone())?;
        order_row_major(&result.detection.corners, pattern)
    }
}
