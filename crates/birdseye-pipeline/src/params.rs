use birdseye_core::{check_general_position, check_invertible, EstimatorParams, Matrix3, Point2};
use serde::{Deserialize, Serialize};

/// Number of *interior* corners of the chessboard.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternSize {
    pub cols: usize,
    pub rows: usize,
}

impl PatternSize {
    pub const fn new(cols: usize, rows: usize) -> Self {
        Self { cols, rows }
    }

    pub fn point_count(&self) -> usize {
        self.cols * self.rows
    }

    /// Row-major index of `pos`, or `None` outside the pattern.
    pub fn index_of(&self, pos: GridPosition) -> Option<usize> {
        (pos.row < self.rows && pos.col < self.cols).then(|| pos.row * self.cols + pos.col)
    }
}

impl Default for PatternSize {
    fn default() -> Self {
        Self::new(9, 6)
    }
}

/// Interior corner addressed by row and column.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GridPosition {
    pub row: usize,
    pub col: usize,
}

impl GridPosition {
    pub const fn new(row: usize, col: usize) -> Self {
        Self { row, col }
    }
}

/// A grid position tied to its coordinate on the flattened plane.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Anchor {
    pub grid: GridPosition,
    pub plane: [f32; 2],
}

impl Anchor {
    pub fn plane_point(&self) -> Point2<f32> {
        Point2::new(self.plane[0], self.plane[1])
    }
}

/// The four correspondences used for every frame.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CorrespondenceLayout {
    pub anchors: [Anchor; 4],
}

impl CorrespondenceLayout {
    /// Anchor the four extreme corners of `pattern` to an axis-aligned
    /// rectangle.
    ///
    /// The first row of the pattern lands on the bottom edge of the
    /// rectangle and the first column on its right edge, so a board seen
    /// head-on comes out rotated by 180 degrees.
    pub fn extreme_corners(pattern: PatternSize, min: [f32; 2], max: [f32; 2]) -> Self {
        let last_row = pattern.rows.saturating_sub(1);
        let last_col = pattern.cols.saturating_sub(1);
        Self {
            anchors: [
                Anchor {
                    grid: GridPosition::new(0, 0),
                    plane: [max[0], max[1]],
                },
                Anchor {
                    grid: GridPosition::new(0, last_col),
                    plane: [min[0], max[1]],
                },
                Anchor {
                    grid: GridPosition::new(last_row, 0),
                    plane: [max[0], min[1]],
                },
                Anchor {
                    grid: GridPosition::new(last_row, last_col),
                    plane: [min[0], min[1]],
                },
            ],
        }
    }

    pub fn plane_points(&self) -> [Point2<f32>; 4] {
        self.anchors.map(|a| a.plane_point())
    }
}

impl Default for CorrespondenceLayout {
    fn default() -> Self {
        Self::extreme_corners(PatternSize::default(), [50.0, 50.0], [450.0, 300.0])
    }
}

/// Size of the rectified image.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OutputSize {
    /// Same width and height as the incoming frame.
    #[default]
    MatchSource,
    Fixed {
        width: usize,
        height: usize,
    },
}

impl OutputSize {
    pub fn resolve(&self, src_w: usize, src_h: usize) -> (usize, usize) {
        match *self {
            OutputSize::MatchSource => (src_w, src_h),
            OutputSize::Fixed { width, height } => (width, height),
        }
    }
}

/// How correspondences are drawn on presented frames.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnnotationParams {
    pub radius: f32,
    pub color: [u8; 3],
}

impl Default for AnnotationParams {
    fn default() -> Self {
        Self {
            radius: 10.0,
            color: [0, 255, 0],
        }
    }
}

/// Everything the per-frame pipeline needs; all fields are plain data so the
/// whole thing round-trips through JSON.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RectifyParams {
    pub pattern: PatternSize,
    pub layout: CorrespondenceLayout,
    /// Constant right-hand factor of the composed transform `C = H * K`.
    pub auxiliary: [[f64; 3]; 3],
    pub output: OutputSize,
    pub estimator: EstimatorParams,
    pub annotation: AnnotationParams,
}

impl Default for RectifyParams {
    fn default() -> Self {
        Self {
            pattern: PatternSize::default(),
            layout: CorrespondenceLayout::default(),
            auxiliary: [[1.0, 0.0, -100.0], [0.0, 1.0, -100.0], [0.0, 0.0, 1.0]],
            output: OutputSize::default(),
            estimator: EstimatorParams::default(),
            annotation: AnnotationParams::default(),
        }
    }
}

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("pattern must have at least 2x2 interior corners (got {cols}x{rows})")]
    PatternTooSmall { cols: usize, rows: usize },
    #[error("anchor {anchor} at row {row}, col {col} lies outside the {cols}x{rows} pattern")]
    AnchorOutOfRange {
        anchor: usize,
        row: usize,
        col: usize,
        cols: usize,
        rows: usize,
    },
    #[error("anchors {first} and {second} use the same grid position")]
    DuplicateAnchor { first: usize, second: usize },
    #[error("plane anchors are degenerate: {0}")]
    DegeneratePlane(birdseye_core::GeometryError),
    #[error("auxiliary matrix is singular: {0}")]
    SingularAuxiliary(birdseye_core::GeometryError),
    #[error("output size must be non-zero (got {width}x{height})")]
    EmptyOutput { width: usize, height: usize },
    #[error("inlier threshold must be positive and finite (got {0})")]
    InvalidThreshold(f64),
}

impl RectifyParams {
    pub fn auxiliary_matrix(&self) -> Matrix3<f64> {
        let k = &self.auxiliary;
        Matrix3::new(
            k[0][0], k[0][1], k[0][2], //
            k[1][0], k[1][1], k[1][2], //
            k[2][0], k[2][1], k[2][2],
        )
    }

    /// Reject configurations that could never produce a rectified frame.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let PatternSize { cols, rows } = self.pattern;
        if cols < 2 || rows < 2 {
            return Err(ConfigError::PatternTooSmall { cols, rows });
        }

        let anchors = &self.layout.anchors;
        for (i, a) in anchors.iter().enumerate() {
            if self.pattern.index_of(a.grid).is_none() {
                return Err(ConfigError::AnchorOutOfRange {
                    anchor: i,
                    row: a.grid.row,
                    col: a.grid.col,
                    cols,
                    rows,
                });
            }
            if let Some(first) = anchors[..i].iter().position(|b| b.grid == a.grid) {
                return Err(ConfigError::DuplicateAnchor { first, second: i });
            }
        }
        check_general_position(&self.layout.plane_points()).map_err(ConfigError::DegeneratePlane)?;
        check_invertible(&self.auxiliary_matrix()).map_err(ConfigError::SingularAuxiliary)?;

        if let OutputSize::Fixed { width, height } = self.output {
            if width == 0 || height == 0 {
                return Err(ConfigError::EmptyOutput { width, height });
            }
        }

        let thr = self.estimator.ransac.inlier_threshold_px;
        if !(thr.is_finite() && thr > 0.0) {
            return Err(ConfigError::InvalidThreshold(thr));
        }
        Ok(())
    }
}
