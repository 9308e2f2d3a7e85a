//! Two-view epipolar geometry in normalized camera coordinates.
//!
//! All functions here expect **calibrated** points (pixel coordinates
//! already multiplied by `K^{-1}`), so the fitted 3x3 model is an
//! essential matrix satisfying `x2^T E x1 = 0`. Pose recovery follows the
//! classic SVD decomposition into four `(R, t)` candidates, disambiguated
//! by cheirality checks on triangulated correspondences.

use nalgebra::{DMatrix, Matrix3, Matrix4, Point2, Vector3};

/// Skew-symmetric matrix `[v]x` such that `[v]x u = v x u`.
#[inline]
pub fn skew(v: &Vector3<f64>) -> Matrix3<f64> {
    Matrix3::new(0.0, -v.z, v.y, v.z, 0.0, -v.x, -v.y, v.x, 0.0)
}

/// Fit an essential matrix to eight or more normalized correspondences.
///
/// Linear 8-point solve via SVD nullspace extraction, followed by
/// projection onto the essential manifold (singular values forced to
/// `(s, s, 0)`). Returns `None` when there are too few points or the SVD
/// produces no usable nullspace vector.
pub fn essential_8point(pts1: &[Point2<f64>], pts2: &[Point2<f64>]) -> Option<Matrix3<f64>> {
    let n = pts1.len();
    if n < 8 || pts2.len() != n {
        return None;
    }

    // Design matrix rows encode x2^T E x1 = 0. Zero-padding to at least
    // 9 rows keeps the nullspace vector inside the thin SVD's V^T.
    let mut a = DMatrix::<f64>::zeros(n.max(9), 9);
    for (i, (p1, p2)) in pts1.iter().zip(pts2.iter()).enumerate() {
        let (x, y) = (p1.x, p1.y);
        let (xp, yp) = (p2.x, p2.y);

        a[(i, 0)] = xp * x;
        a[(i, 1)] = xp * y;
        a[(i, 2)] = xp;
        a[(i, 3)] = yp * x;
        a[(i, 4)] = yp * y;
        a[(i, 5)] = yp;
        a[(i, 6)] = x;
        a[(i, 7)] = y;
        a[(i, 8)] = 1.0;
    }

    let svd = a.svd(true, true);
    let v_t = svd.v_t?;
    let e_vec = v_t.row(v_t.nrows() - 1);

    let mut e = Matrix3::zeros();
    for r in 0..3 {
        for c in 0..3 {
            e[(r, c)] = e_vec[3 * r + c];
        }
    }

    enforce_essential_constraints(&e)
}

/// Project a 3x3 matrix onto the essential manifold.
///
/// Forces the singular values to `(s, s, 0)` where `s` is the mean of the
/// two largest.
fn enforce_essential_constraints(e: &Matrix3<f64>) -> Option<Matrix3<f64>> {
    let svd = e.svd(true, true);
    let u = svd.u?;
    let v_t = svd.v_t?;
    let s = 0.5 * (svd.singular_values[0] + svd.singular_values[1]);
    let s_mat = Matrix3::from_diagonal(&Vector3::new(s, s, 0.0));
    Some(u * s_mat * v_t)
}

/// First-order (Sampson) epipolar distance of one normalized
/// correspondence under an essential matrix.
pub fn sampson_distance(e: &Matrix3<f64>, p1: &Point2<f64>, p2: &Point2<f64>) -> f64 {
    let x1 = Vector3::new(p1.x, p1.y, 1.0);
    let x2 = Vector3::new(p2.x, p2.y, 1.0);

    let ex1 = e * x1;
    let etx2 = e.transpose() * x2;
    let denom = (ex1.x * ex1.x + ex1.y * ex1.y + etx2.x * etx2.x + etx2.y * etx2.y).max(1e-12);
    let val = x2.dot(&ex1);
    (val * val / denom).sqrt()
}

/// Decompose an essential matrix into its four candidate `(R, t)` pairs.
///
/// The translation is unit length (direction only); the physically valid
/// candidate must be selected by cheirality, see [`recover_pose`].
pub fn decompose_essential(e: &Matrix3<f64>) -> Option<[(Matrix3<f64>, Vector3<f64>); 4]> {
    let svd = e.svd(true, true);
    let mut u = svd.u?;
    let mut v_t = svd.v_t?;

    if u.determinant() < 0.0 {
        u.column_mut(2).neg_mut();
    }
    if v_t.determinant() < 0.0 {
        v_t.row_mut(2).neg_mut();
    }

    let w = Matrix3::new(0.0, -1.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0);
    let r1 = u * w * v_t;
    let r2 = u * w.transpose() * v_t;
    let t: Vector3<f64> = u.column(2).normalize();

    Some([(r1, t), (r1, -t), (r2, t), (r2, -t)])
}

/// Recover the relative pose from an essential matrix.
///
/// Among the four decomposition candidates, picks the `(R, t)` pair that
/// places the most triangulated correspondences in front of both cameras.
/// The convention is `p2 = R p1 + t` with `t` unit length. Returns `None`
/// when no candidate puts a single point in front of both cameras.
pub fn recover_pose(
    e: &Matrix3<f64>,
    pts1: &[Point2<f64>],
    pts2: &[Point2<f64>],
) -> Option<(Matrix3<f64>, Vector3<f64>)> {
    let candidates = decompose_essential(e)?;

    let mut best: Option<(Matrix3<f64>, Vector3<f64>)> = None;
    let mut best_support = 0usize;

    for (r, t) in candidates {
        let support = pts1
            .iter()
            .zip(pts2.iter())
            .filter(|(p1, p2)| {
                triangulate_point(&r, &t, p1, p2)
                    .map(|x| x.z > 0.0 && (r * x + t).z > 0.0)
                    .unwrap_or(false)
            })
            .count();

        if support > best_support {
            best_support = support;
            best = Some((r, t));
        }
    }

    best
}

/// Linear (DLT) triangulation of one normalized correspondence with
/// cameras `P1 = [I|0]` and `P2 = [R|t]`.
///
/// Returns the point in the first camera's frame, or `None` when the
/// homogeneous solution lies at infinity.
pub fn triangulate_point(
    r: &Matrix3<f64>,
    t: &Vector3<f64>,
    p1: &Point2<f64>,
    p2: &Point2<f64>,
) -> Option<Vector3<f64>> {
    // Rows of P1 = [I|0].
    let p1_rows = [
        nalgebra::RowVector4::new(1.0, 0.0, 0.0, 0.0),
        nalgebra::RowVector4::new(0.0, 1.0, 0.0, 0.0),
        nalgebra::RowVector4::new(0.0, 0.0, 1.0, 0.0),
    ];
    // Rows of P2 = [R|t].
    let p2_rows = [
        nalgebra::RowVector4::new(r[(0, 0)], r[(0, 1)], r[(0, 2)], t.x),
        nalgebra::RowVector4::new(r[(1, 0)], r[(1, 1)], r[(1, 2)], t.y),
        nalgebra::RowVector4::new(r[(2, 0)], r[(2, 1)], r[(2, 2)], t.z),
    ];

    let mut a = Matrix4::zeros();
    a.set_row(0, &(p1.x * p1_rows[2] - p1_rows[0]));
    a.set_row(1, &(p1.y * p1_rows[2] - p1_rows[1]));
    a.set_row(2, &(p2.x * p2_rows[2] - p2_rows[0]));
    a.set_row(3, &(p2.y * p2_rows[2] - p2_rows[1]));

    let svd = a.svd(true, true);
    let v_t = svd.v_t?;
    let x_h = v_t.row(3);

    let w = x_h[3];
    if w.abs() <= f64::EPSILON {
        return None;
    }
    Some(Vector3::new(x_h[0] / w, x_h[1] / w, x_h[2] / w))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::Rotation3;

    fn ground_truth() -> (Matrix3<f64>, Vector3<f64>) {
        let r = Rotation3::from_euler_angles(0.05, -0.1, 0.08).into_inner();
        let t = Vector3::new(0.4, -0.1, 0.15).normalize();
        (r, t)
    }

    /// Project a cloud of points in front of both cameras.
    fn correspondences(
        r: &Matrix3<f64>,
        t: &Vector3<f64>,
    ) -> (Vec<Point2<f64>>, Vec<Point2<f64>>) {
        let mut pts1 = Vec::new();
        let mut pts2 = Vec::new();
        for i in 0..4 {
            for j in 0..4 {
                let p = Vector3::new(
                    -0.6 + 0.4 * i as f64,
                    -0.45 + 0.3 * j as f64,
                    4.0 + 0.5 * ((i + j) % 3) as f64,
                );
                let q = r * p + t;
                pts1.push(Point2::new(p.x / p.z, p.y / p.z));
                pts2.push(Point2::new(q.x / q.z, q.y / q.z));
            }
        }
        (pts1, pts2)
    }

    #[test]
    fn eight_point_fit_has_tiny_residuals() {
        let (r, t) = ground_truth();
        let (pts1, pts2) = correspondences(&r, &t);

        let e = essential_8point(&pts1, &pts2).unwrap();
        for (p1, p2) in pts1.iter().zip(pts2.iter()) {
            assert!(sampson_distance(&e, p1, p2) < 1e-9);
        }
    }

    #[test]
    fn decomposition_contains_the_true_pose() {
        let (r, t) = ground_truth();
        let e = skew(&t) * r;

        let candidates = decompose_essential(&e).unwrap();
        let found = candidates.iter().any(|(r_est, t_est)| {
            let r_diff = r_est.transpose() * r;
            let cos_theta = ((r_diff.trace() - 1.0) * 0.5).clamp(-1.0, 1.0);
            cos_theta.acos() < 1e-9 && (t_est - t).norm() < 1e-9
        });
        assert!(found, "true pose missing from decomposition candidates");
    }

    #[test]
    fn cheirality_selects_the_true_pose() {
        let (r, t) = ground_truth();
        let (pts1, pts2) = correspondences(&r, &t);

        let e = essential_8point(&pts1, &pts2).unwrap();
        let (r_est, t_est) = recover_pose(&e, &pts1, &pts2).unwrap();

        let r_diff = r_est.transpose() * r;
        let cos_theta = ((r_diff.trace() - 1.0) * 0.5).clamp(-1.0, 1.0);
        assert!(cos_theta.acos() < 1e-6, "rotation off by {}", cos_theta.acos());
        // Translation direction (sign fixed by cheirality).
        assert!(t_est.dot(&t) > 1.0 - 1e-9, "translation direction wrong");
    }

    #[test]
    fn triangulation_recovers_depth() {
        let (r, t) = ground_truth();
        let p = Vector3::new(0.2, -0.1, 5.0);
        let q = r * p + t;

        let x = triangulate_point(
            &r,
            &t,
            &Point2::new(p.x / p.z, p.y / p.z),
            &Point2::new(q.x / q.z, q.y / q.z),
        )
        .unwrap();
        assert_relative_eq!(x, p, epsilon = 1e-9);
    }
}
