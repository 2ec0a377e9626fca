use birdseye_core::{check_invertible, GeometryError, Homography, Matrix3};

/// `C = H * K` and its inverse.
///
/// `forward` maps rectified-output coordinates to image pixels and drives the
/// warp; `inverse` maps image pixels into the rectified output.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ComposedTransform {
    pub forward: Homography,
    pub inverse: Homography,
}

/// Compose the estimated homography with the auxiliary matrix.
///
/// The order is fixed: `K` acts first on plane coordinates, then `H`.
pub fn compose(h: &Homography, k: &Matrix3<f64>) -> Result<ComposedTransform, GeometryError> {
    check_invertible(k)?;
    let forward = Homography::new(h.h * k);
    let inverse = forward.inverse()?;
    Ok(ComposedTransform { forward, inverse })
}
