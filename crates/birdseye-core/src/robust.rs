//! Robust homography estimation strategies.
//!
//! The DLT solvers in [`crate::homography`] assume every correspondence is
//! correct. A [`HomographyStrategy`] decides which correspondences take part
//! in the final solve; every strategy returns the same [`HomographyFit`].

use crate::homography::{check_general_position, reprojection_error};
use crate::{estimate_homography_dlt, GeometryError, Homography};
use nalgebra::Point2;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

const MIN_SAMPLES: usize = 4;

/// Estimated homography plus the correspondences that support it.
#[derive(Clone, Debug, PartialEq)]
pub struct HomographyFit {
    /// Maps source (plane) points to destination (image) points.
    pub homography: Homography,
    /// `inliers[i]` is true when correspondence `i` was used in the final solve.
    pub inliers: Vec<bool>,
    /// RMS reprojection error over the inliers, in destination units.
    pub rms_error_px: f64,
}

impl HomographyFit {
    pub fn num_inliers(&self) -> usize {
        self.inliers.iter().filter(|&&b| b).count()
    }
}

/// A way of turning correspondences into a homography.
pub trait HomographyStrategy {
    /// Estimate H with `dst ~ H * src`.
    fn estimate(
        &self,
        src: &[Point2<f32>],
        dst: &[Point2<f32>],
    ) -> Result<HomographyFit, GeometryError>;
}

impl<T: HomographyStrategy + ?Sized> HomographyStrategy for Box<T> {
    fn estimate(
        &self,
        src: &[Point2<f32>],
        dst: &[Point2<f32>],
    ) -> Result<HomographyFit, GeometryError> {
        (**self).estimate(src, dst)
    }
}

/// Least-squares solve over all correspondences.
#[derive(Clone, Copy, Debug, Default)]
pub struct DirectSolve;

impl HomographyStrategy for DirectSolve {
    fn estimate(
        &self,
        src: &[Point2<f32>],
        dst: &[Point2<f32>],
    ) -> Result<HomographyFit, GeometryError> {
        let homography = estimate_homography_dlt(src, dst)?;
        let inliers = vec![true; src.len()];
        let rms_error_px = rms_error(&homography, src, dst, &inliers);
        Ok(HomographyFit {
            homography,
            inliers,
            rms_error_px,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RansacParams {
    /// Reprojection distance (pixels) under which a correspondence is an inlier.
    pub inlier_threshold_px: f64,
    /// Upper bound on sampled hypotheses.
    pub max_iters: usize,
    /// Desired probability of drawing at least one all-inlier sample.
    pub confidence: f64,
    /// Minimum consensus size accepted.
    pub min_inliers: usize,
    pub seed: u64,
}

impl Default for RansacParams {
    fn default() -> Self {
        Self {
            inlier_threshold_px: 3.0,
            max_iters: 2000,
            confidence: 0.995,
            min_inliers: 4,
            seed: 0,
        }
    }
}

/// Random sample consensus over minimal four-point subsets, followed by a
/// refit on the consensus set.
///
/// With exactly four correspondences there is nothing to vote on and the
/// estimate is the direct solve.
#[derive(Clone, Debug, Default)]
pub struct Ransac {
    pub params: RansacParams,
}

impl Ransac {
    pub fn new(params: RansacParams) -> Self {
        Self { params }
    }

    fn consensus(
        &self,
        h: &Homography,
        src: &[Point2<f32>],
        dst: &[Point2<f32>],
    ) -> (Vec<bool>, usize) {
        let thr = self.params.inlier_threshold_px;
        let mask: Vec<bool> = src
            .iter()
            .zip(dst)
            .map(|(&s, &d)| reprojection_error(h, s, d) < thr)
            .collect();
        let count = mask.iter().filter(|&&b| b).count();
        (mask, count)
    }
}

impl HomographyStrategy for Ransac {
    #[cfg_attr(feature = "tracing", instrument(level = "debug", skip_all, fields(n = src.len())))]
    fn estimate(
        &self,
        src: &[Point2<f32>],
        dst: &[Point2<f32>],
    ) -> Result<HomographyFit, GeometryError> {
        if src.len() != dst.len() {
            return Err(GeometryError::LengthMismatch {
                src: src.len(),
                dst: dst.len(),
            });
        }
        let n = src.len();
        if n <= MIN_SAMPLES {
            return DirectSolve.estimate(src, dst);
        }

        let needed = self.params.min_inliers.max(MIN_SAMPLES);
        let mut rng = StdRng::seed_from_u64(self.params.seed);
        let mut best: Option<(Homography, Vec<bool>, usize)> = None;
        let mut max_iters = self.params.max_iters.max(1);
        let mut iter = 0;

        while iter < max_iters {
            iter += 1;
            let idx = rand::seq::index::sample(&mut rng, n, MIN_SAMPLES).into_vec();
            let s: Vec<Point2<f32>> = idx.iter().map(|&i| src[i]).collect();
            let d: Vec<Point2<f32>> = idx.iter().map(|&i| dst[i]).collect();
            if check_general_position(&s).is_err() || check_general_position(&d).is_err() {
                continue;
            }
            let Ok(h) = estimate_homography_dlt(&s, &d) else {
                continue;
            };

            let (mask, count) = self.consensus(&h, src, dst);
            if best.as_ref().is_none_or(|(_, _, c)| count > *c) {
                max_iters = max_iters.min(adaptive_iters(
                    count as f64 / n as f64,
                    self.params.confidence,
                    self.params.max_iters,
                ));
                best = Some((h, mask, count));
                if count == n {
                    break;
                }
            }
        }

        let Some((best_h, best_mask, best_count)) = best else {
            return Err(GeometryError::NoConsensus { needed, found: 0 });
        };
        log::debug!(
            "ransac: {} iterations, consensus {}/{}",
            iter,
            best_count,
            n
        );
        if best_count < needed {
            return Err(GeometryError::NoConsensus {
                needed,
                found: best_count,
            });
        }

        // Refit on the consensus set, then re-score so the mask matches the model.
        let (inl_src, inl_dst): (Vec<_>, Vec<_>) = src
            .iter()
            .zip(dst)
            .zip(&best_mask)
            .filter(|(_, &keep)| keep)
            .map(|((&s, &d), _)| (s, d))
            .unzip();
        let (homography, inliers) = match estimate_homography_dlt(&inl_src, &inl_dst) {
            Ok(h) => {
                let (mask, count) = self.consensus(&h, src, dst);
                if count >= best_count {
                    (h, mask)
                } else {
                    (best_h, best_mask)
                }
            }
            Err(err) => {
                log::debug!("ransac refit failed ({err}), keeping minimal model");
                (best_h, best_mask)
            }
        };

        let rms_error_px = rms_error(&homography, src, dst, &inliers);
        Ok(HomographyFit {
            homography,
            inliers,
            rms_error_px,
        })
    }
}

/// Iterations needed to hit `confidence` at the given inlier ratio.
fn adaptive_iters(inlier_ratio: f64, confidence: f64, cap: usize) -> usize {
    let p_good = inlier_ratio.powi(MIN_SAMPLES as i32);
    if p_good >= 1.0 - f64::EPSILON {
        return 1;
    }
    if p_good <= f64::EPSILON {
        return cap;
    }
    let k = (1.0 - confidence.clamp(0.0, 1.0 - 1e-12)).ln() / (1.0 - p_good).ln();
    (k.ceil().max(1.0) as usize).min(cap)
}

fn rms_error(h: &Homography, src: &[Point2<f32>], dst: &[Point2<f32>], mask: &[bool]) -> f64 {
    let (sum, count) = src
        .iter()
        .zip(dst)
        .zip(mask)
        .filter(|(_, &keep)| keep)
        .fold((0.0, 0usize), |(sum, count), ((&s, &d), _)| {
            let e = reprojection_error(h, s, d);
            (sum + e * e, count + 1)
        });
    if count == 0 {
        0.0
    } else {
        (sum / count as f64).sqrt()
    }
}

/// Which strategy [`EstimatorParams::strategy`] builds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EstimatorMethod {
    Direct,
    #[default]
    Ransac,
}

/// Serializable choice of estimation strategy.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct EstimatorParams {
    pub method: EstimatorMethod,
    pub ransac: RansacParams,
}

impl EstimatorParams {
    pub fn strategy(&self) -> Box<dyn HomographyStrategy> {
        match self.method {
            EstimatorMethod::Direct => Box::new(DirectSolve),
            EstimatorMethod::Ransac => Box::new(Ransac::new(self.ransac.clone())),
        }
    }
}
