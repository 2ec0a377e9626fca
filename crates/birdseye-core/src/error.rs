/// Failures of homography estimation and transform algebra.
///
/// Every variant describes a degenerate or ill-posed geometric
/// configuration; callers treat them uniformly as "no usable transform for
/// this frame".
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum GeometryError {
    #[error("need at least {needed} correspondences, got {got}")]
    TooFewCorrespondences { needed: usize, got: usize },

    #[error("point sets differ in length ({src} source vs {dst} destination)")]
    LengthMismatch { src: usize, dst: usize },

    #[error("points {indices:?} are collinear")]
    Collinear { indices: [usize; 3] },

    #[error("matrix is singular or near-singular (rcond={rcond:.3e})")]
    Singular { rcond: f64 },

    #[error("no consensus model (best support {found}, need {needed})")]
    NoConsensus { needed: usize, found: usize },

    #[error("numerical failure: {0}")]
    NumericalFailure(&'static str),
}

/// A point whose homogeneous scale vanishes under a transform.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectionError {
    #[error("point {index} maps to infinity")]
    AtInfinity { index: usize },
}
