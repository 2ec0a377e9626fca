use crate::GeometryError;
use nalgebra::{DMatrix, Matrix3, Point2, SMatrix, SVector, Vector3};
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Reciprocal condition number below which a 3x3 transform is rejected.
pub const SINGULAR_RCOND: f64 = 1e-10;

/// Relative tolerance for the collinearity test on point triples.
///
/// A triple is collinear when twice its triangle area is below
/// `COLLINEAR_EPS` times the squared length of its longest side.
pub const COLLINEAR_EPS: f64 = 1e-4;

/// Homogeneous scale magnitude treated as a point at infinity.
pub const PROJECTION_EPS: f64 = 1e-12;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Homography {
    pub h: Matrix3<f64>,
}

impl Homography {
    pub fn new(h: Matrix3<f64>) -> Self {
        Self { h }
    }

    pub fn identity() -> Self {
        Self::new(Matrix3::identity())
    }

    pub fn from_array(rows: [[f64; 3]; 3]) -> Self {
        Self::new(Matrix3::from_row_slice(&[
            rows[0][0], rows[0][1], rows[0][2], rows[1][0], rows[1][1], rows[1][2], rows[2][0],
            rows[2][1], rows[2][2],
        ]))
    }

    pub fn to_array(&self) -> [[f64; 3]; 3] {
        [
            [self.h[(0, 0)], self.h[(0, 1)], self.h[(0, 2)]],
            [self.h[(1, 0)], self.h[(1, 1)], self.h[(1, 2)]],
            [self.h[(2, 0)], self.h[(2, 1)], self.h[(2, 2)]],
        ]
    }

    /// Map `p` through the transform, or `None` when it lands at infinity.
    #[inline]
    pub fn try_apply(&self, p: Point2<f32>) -> Option<Point2<f32>> {
        self.try_apply_f64(p.x as f64, p.y as f64)
            .map(|(x, y)| Point2::new(x as f32, y as f32))
    }

    #[inline]
    pub(crate) fn try_apply_f64(&self, x: f64, y: f64) -> Option<(f64, f64)> {
        let v = self.h * Vector3::new(x, y, 1.0);
        let w = v[2];
        if !w.is_finite() || w.abs() < PROJECTION_EPS {
            return None;
        }
        Some((v[0] / w, v[1] / w))
    }

    /// Checked inverse: fails on singular and near-singular matrices.
    pub fn inverse(&self) -> Result<Self, GeometryError> {
        check_invertible(&self.h)?;
        let inv = self
            .h
            .try_inverse()
            .ok_or(GeometryError::Singular { rcond: 0.0 })?;
        Ok(Self::new(normalize_homography(inv).unwrap_or(inv)))
    }

    /// Reciprocal condition number (smallest / largest singular value).
    pub fn rcond(&self) -> f64 {
        rcond(&self.h)
    }
}

fn rcond(m: &Matrix3<f64>) -> f64 {
    if m.iter().any(|v| !v.is_finite()) {
        return 0.0;
    }
    let sv = m.singular_values();
    let max = sv.max();
    if max <= 0.0 {
        return 0.0;
    }
    sv.min() / max
}

/// Reject matrices whose reciprocal condition number is below [`SINGULAR_RCOND`].
pub fn check_invertible(m: &Matrix3<f64>) -> Result<(), GeometryError> {
    let rcond = rcond(m);
    if rcond < SINGULAR_RCOND {
        return Err(GeometryError::Singular { rcond });
    }
    Ok(())
}

/// Fail when any three of `pts` are collinear (or coincident).
///
/// Cubic in the number of points; meant for minimal samples.
pub fn check_general_position(pts: &[Point2<f32>]) -> Result<(), GeometryError> {
    let n = pts.len();
    for a in 0..n {
        for b in (a + 1)..n {
            for c in (b + 1)..n {
                if is_collinear(pts[a], pts[b], pts[c]) {
                    return Err(GeometryError::Collinear { indices: [a, b, c] });
                }
            }
        }
    }
    Ok(())
}

fn is_collinear(a: Point2<f32>, b: Point2<f32>, c: Point2<f32>) -> bool {
    let (ax, ay) = (a.x as f64, a.y as f64);
    let (abx, aby) = (b.x as f64 - ax, b.y as f64 - ay);
    let (acx, acy) = (c.x as f64 - ax, c.y as f64 - ay);
    let (bcx, bcy) = (c.x as f64 - b.x as f64, c.y as f64 - b.y as f64);

    let longest = (abx * abx + aby * aby)
        .max(acx * acx + acy * acy)
        .max(bcx * bcx + bcy * bcy);
    if longest <= f64::EPSILON {
        return true;
    }
    let cross = abx * acy - aby * acx;
    cross.abs() <= COLLINEAR_EPS * longest
}

/// Euclidean distance between `H * src` and `dst`; infinite at infinity.
pub fn reprojection_error(h: &Homography, src: Point2<f32>, dst: Point2<f32>) -> f64 {
    match h.try_apply_f64(src.x as f64, src.y as f64) {
        Some((x, y)) => {
            let dx = x - dst.x as f64;
            let dy = y - dst.y as f64;
            (dx * dx + dy * dy).sqrt()
        }
        None => f64::INFINITY,
    }
}

fn hartley_normalization(cx: f64, cy: f64, mean_dist: f64) -> Matrix3<f64> {
    let s = if mean_dist > 1e-12 {
        std::f64::consts::SQRT_2 / mean_dist
    } else {
        1.0
    };

    Matrix3::<f64>::new(s, 0.0, -s * cx, 0.0, s, -s * cy, 0.0, 0.0, 1.0)
}

fn normalize_points(pts: &[Point2<f32>]) -> (Vec<Point2<f64>>, Matrix3<f64>) {
    // Hartley normalization: translate to centroid, scale so mean distance = sqrt(2)
    let n = pts.len() as f64;
    let (sx, sy) = pts
        .iter()
        .fold((0.0, 0.0), |(sx, sy), p| (sx + p.x as f64, sy + p.y as f64));
    let (cx, cy) = (sx / n, sy / n);

    let mean_dist = pts
        .iter()
        .map(|p| {
            let dx = p.x as f64 - cx;
            let dy = p.y as f64 - cy;
            (dx * dx + dy * dy).sqrt()
        })
        .sum::<f64>()
        / n;

    let t = hartley_normalization(cx, cy, mean_dist);
    let out = pts
        .iter()
        .map(|p| {
            let v = t * Vector3::new(p.x as f64, p.y as f64, 1.0);
            Point2::new(v[0], v[1])
        })
        .collect();
    (out, t)
}

fn normalize_homography(h: Matrix3<f64>) -> Option<Matrix3<f64>> {
    let s = h[(2, 2)];
    if s.abs() < 1e-12 {
        return None;
    }
    Some(h / s)
}

fn denormalize_homography(
    hn: Matrix3<f64>,
    t_src: Matrix3<f64>,
    t_dst: Matrix3<f64>,
) -> Result<Matrix3<f64>, GeometryError> {
    let t_dst_inv = t_dst
        .try_inverse()
        .ok_or(GeometryError::NumericalFailure("normalizing transform not invertible"))?;
    Ok(t_dst_inv * hn * t_src)
}

fn finish(h: Matrix3<f64>) -> Result<Homography, GeometryError> {
    let h = normalize_homography(h).unwrap_or(h);
    check_invertible(&h)?;
    Ok(Homography::new(h))
}

fn check_lengths(src: &[Point2<f32>], dst: &[Point2<f32>]) -> Result<(), GeometryError> {
    if src.len() != dst.len() {
        return Err(GeometryError::LengthMismatch {
            src: src.len(),
            dst: dst.len(),
        });
    }
    if src.len() < 4 {
        return Err(GeometryError::TooFewCorrespondences {
            needed: 4,
            got: src.len(),
        });
    }
    Ok(())
}

/// Estimate H such that `dst ~ H * src` from N >= 4 correspondences.
///
/// Four correspondences are solved exactly with [`homography_from_4pt`]; more
/// are solved in the least-squares sense by the normalized DLT (smallest
/// right singular vector of the 2N x 9 design matrix).
#[cfg_attr(feature = "tracing", instrument(level = "debug", skip_all, fields(n = src.len())))]
pub fn estimate_homography_dlt(
    src: &[Point2<f32>],
    dst: &[Point2<f32>],
) -> Result<Homography, GeometryError> {
    check_lengths(src, dst)?;

    if src.len() == 4 {
        let s: &[Point2<f32>; 4] = src
            .try_into()
            .map_err(|_| GeometryError::NumericalFailure("expected four points"))?;
        let d: &[Point2<f32>; 4] = dst
            .try_into()
            .map_err(|_| GeometryError::NumericalFailure("expected four points"))?;
        return homography_from_4pt(s, d);
    }

    let (s, ts) = normalize_points(src);
    let (d, td) = normalize_points(dst);

    let n = src.len();
    let mut a = DMatrix::<f64>::zeros(2 * n, 9);

    for k in 0..n {
        let x = s[k].x;
        let y = s[k].y;
        let u = d[k].x;
        let v = d[k].y;

        // [ -x -y -1   0  0  0   u*x u*y u ]
        a[(2 * k, 0)] = -x;
        a[(2 * k, 1)] = -y;
        a[(2 * k, 2)] = -1.0;
        a[(2 * k, 6)] = u * x;
        a[(2 * k, 7)] = u * y;
        a[(2 * k, 8)] = u;

        // [ 0  0  0  -x -y -1   v*x v*y v ]
        a[(2 * k + 1, 3)] = -x;
        a[(2 * k + 1, 4)] = -y;
        a[(2 * k + 1, 5)] = -1.0;
        a[(2 * k + 1, 6)] = v * x;
        a[(2 * k + 1, 7)] = v * y;
        a[(2 * k + 1, 8)] = v;
    }

    let svd = a.svd(false, true);
    let vt = svd
        .v_t
        .ok_or(GeometryError::NumericalFailure("SVD did not converge"))?;

    // Singular values are not guaranteed to be sorted.
    let (min_idx, _) = svd
        .singular_values
        .iter()
        .enumerate()
        .fold((0, f64::INFINITY), |best, (i, &s)| {
            if s < best.1 {
                (i, s)
            } else {
                best
            }
        });
    let h = vt.row(min_idx);

    let hn =
        Matrix3::<f64>::from_row_slice(&[h[0], h[1], h[2], h[3], h[4], h[5], h[6], h[7], h[8]]);

    finish(denormalize_homography(hn, ts, td)?)
}

/// Compute H such that `dst ~ H * src` from exactly four correspondences.
///
/// Corner order must be consistent between `src` and `dst`. Fails with
/// [`GeometryError::Collinear`] when three points of either set are
/// collinear.
pub fn homography_from_4pt(
    src: &[Point2<f32>; 4],
    dst: &[Point2<f32>; 4],
) -> Result<Homography, GeometryError> {
    check_general_position(src)?;
    check_general_position(dst)?;

    // Unknowns: [h11 h12 h13 h21 h22 h23 h31 h32], with h33 = 1
    // h11 x + h12 y + h13 - u h31 x - u h32 y = u
    // h21 x + h22 y + h23 - v h31 x - v h32 y = v
    let (src_n, t_src) = normalize_points(src);
    let (dst_n, t_dst) = normalize_points(dst);

    let mut a = SMatrix::<f64, 8, 8>::zeros();
    let mut b = SVector::<f64, 8>::zeros();

    for k in 0..4 {
        let x = src_n[k].x;
        let y = src_n[k].y;
        let u = dst_n[k].x;
        let v = dst_n[k].y;

        let r0 = 2 * k;
        a[(r0, 0)] = x;
        a[(r0, 1)] = y;
        a[(r0, 2)] = 1.0;
        a[(r0, 6)] = -u * x;
        a[(r0, 7)] = -u * y;
        b[r0] = u;

        let r1 = 2 * k + 1;
        a[(r1, 3)] = x;
        a[(r1, 4)] = y;
        a[(r1, 5)] = 1.0;
        a[(r1, 6)] = -v * x;
        a[(r1, 7)] = -v * y;
        b[r1] = v;
    }

    let x = a
        .lu()
        .solve(&b)
        .ok_or(GeometryError::NumericalFailure("4-point system is singular"))?;

    let hn = Matrix3::<f64>::new(
        x[0], x[1], x[2], //
        x[3], x[4], x[5], //
        x[6], x[7], 1.0,
    );

    finish(denormalize_homography(hn, t_src, t_dst)?)
}
