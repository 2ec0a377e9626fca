use crate::annotate::{markers_for, Marker};
use crate::compose::{compose, ComposedTransform};
use crate::params::{ConfigError, RectifyParams};
use crate::select::{select_correspondences, CornerSet, Correspondence, SelectError};
use birdseye_core::{
    project_points, warp_perspective, GeometryError, Homography, HomographyStrategy, Image,
    ImageView, Matrix3, ProjectionError,
};
use nalgebra::Point2;

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Why a frame was passed through without rectification.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum FrameError {
    #[error("pattern not detected")]
    PatternNotDetected,
    #[error(transparent)]
    Selection(#[from] SelectError),
    #[error("degenerate geometry: {0}")]
    DegenerateGeometry(#[from] GeometryError),
}

impl FrameError {
    /// Detection-side failures, as opposed to geometric ones.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            FrameError::PatternNotDetected
                | FrameError::Selection(SelectError::CornerCountMismatch { .. })
        )
    }
}

/// Everything produced for a frame whose pattern was rectified.
#[derive(Clone, Debug)]
pub struct RectifiedOutput {
    /// The frontal view of the plane.
    pub image: Image,
    /// Selected corners projected into `image`.
    pub markers: Vec<Marker>,
    /// The same corners at their detected positions in the source frame.
    pub source_markers: Vec<Marker>,
    /// The same projections, including points that fell at infinity.
    pub projected: Vec<Result<Point2<f32>, ProjectionError>>,
    pub correspondences: [Correspondence; 4],
    /// Plane-to-image homography before the auxiliary adjustment.
    pub homography: Homography,
    pub transform: ComposedTransform,
    pub inliers: Vec<bool>,
    /// Largest distance between `H * plane` and the detected image point.
    pub forward_residual_px: f64,
}

/// Turns one frame plus its detected corners into a rectified view.
///
/// Holds no per-frame state: every call is independent.
pub struct Rectifier {
    params: RectifyParams,
    auxiliary: Matrix3<f64>,
    strategy: Box<dyn HomographyStrategy>,
}

impl Rectifier {
    /// Validate `params` and build the configured estimation strategy.
    pub fn new(params: RectifyParams) -> Result<Self, ConfigError> {
        params.validate()?;
        let strategy = params.estimator.strategy();
        let auxiliary = params.auxiliary_matrix();
        Ok(Self {
            params,
            auxiliary,
            strategy,
        })
    }

    /// Replace the estimation strategy chosen by the configuration.
    pub fn with_strategy(mut self, strategy: impl HomographyStrategy + 'static) -> Self {
        self.strategy = Box::new(strategy);
        self
    }

    pub fn params(&self) -> &RectifyParams {
        &self.params
    }

    /// Select correspondences, estimate, compose, warp and annotate.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "info", skip(self, frame, corners), fields(width = frame.width, height = frame.height))
    )]
    pub fn rectify(
        &self,
        frame: &ImageView<'_>,
        corners: &CornerSet,
    ) -> Result<RectifiedOutput, FrameError> {
        let correspondences =
            select_correspondences(self.params.pattern, &self.params.layout, corners)?;
        let plane: Vec<Point2<f32>> = correspondences.iter().map(|c| c.plane).collect();
        let image: Vec<Point2<f32>> = correspondences.iter().map(|c| c.image).collect();

        // H: plane -> image
        let fit = self.strategy.estimate(&plane, &image)?;
        let forward_residual_px = forward_residual(&fit.homography, &plane, &image);
        log::debug!(
            "homography estimated: inliers={}/{} rms={:.3}px forward_residual={:.3}px",
            fit.num_inliers(),
            plane.len(),
            fit.rms_error_px,
            forward_residual_px
        );

        let transform = compose(&fit.homography, &self.auxiliary)?;

        let (out_w, out_h) = self.params.output.resolve(frame.width, frame.height);
        let rectified = rectify_frame(frame, &transform, out_w, out_h);

        let projected = project_points(&transform.inverse, &image);
        let markers = markers_for(&projected, &self.params.annotation);
        let detected: Vec<Result<Point2<f32>, ProjectionError>> =
            image.iter().copied().map(Ok).collect();
        let source_markers = markers_for(&detected, &self.params.annotation);

        Ok(RectifiedOutput {
            image: rectified,
            markers,
            source_markers,
            projected,
            correspondences,
            homography: fit.homography,
            transform,
            inliers: fit.inliers,
            forward_residual_px,
        })
    }
}

/// Resample `frame` into the rectified view.
///
/// Each output pixel `p` samples the source at `C * p`, so a source point
/// `q` lands at `C^-1 * q`, the same place its annotation is drawn.
pub fn rectify_frame(
    frame: &ImageView<'_>,
    transform: &ComposedTransform,
    out_w: usize,
    out_h: usize,
) -> Image {
    warp_perspective(frame, &transform.forward, out_w, out_h)
}

fn forward_residual(h: &Homography, plane: &[Point2<f32>], image: &[Point2<f32>]) -> f64 {
    project_points(h, plane)
        .iter()
        .zip(image)
        .map(|(p, q)| match p {
            Ok(p) => (p - q).norm() as f64,
            Err(err) => {
                log::warn!("forward check: {err}");
                f64::INFINITY
            }
        })
        .fold(0.0, f64::max)
}
