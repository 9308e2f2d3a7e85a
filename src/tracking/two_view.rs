//! Robust two-view geometry from candidate correspondences.
//!
//! Wraps the generic RANSAC engine around the 8-point essential solver,
//! then recovers the relative pose from the winning model by cheirality.
//! All inputs are taken in camera-normalized coordinates from the two
//! Frames' cached views.

use nalgebra::{Matrix3, Point2, Vector3};

use crate::geometry::epipolar::{essential_8point, recover_pose, sampson_distance};
use crate::geometry::{ransac, Estimator, RansacOptions};

use super::frame::Frame;
use super::matching::CandidateMatches;
use super::MatchError;

/// Minimal sample size of the 8-point solver.
pub const MIN_SAMPLES: usize = 8;
/// Inlier acceptance threshold on the Sampson distance, in normalized
/// coordinate units.
pub const RESIDUAL_THRESHOLD: f64 = 0.001;
/// Maximum RANSAC sampling trials per frame pair.
pub const MAX_TRIALS: usize = 100;

/// Fixed sampler seed: repeated calls on unchanged Frames must produce
/// identical inlier sets and poses.
const RANSAC_SEED: u64 = 0x5eed_0d0e;

/// A fitted two-view model with its consensus set and decomposed pose.
#[derive(Debug, Clone)]
pub struct TwoViewGeometry {
    /// Essential matrix, defined up to scale.
    pub essential: Matrix3<f64>,
    /// Inlier flags, index-aligned with the candidate pairs.
    pub inlier_mask: Vec<bool>,
    /// Relative rotation: `p_b = R * p_a + t`.
    pub rotation: Matrix3<f64>,
    /// Relative translation direction, unit length (monocular scale is
    /// unobservable).
    pub translation: Vector3<f64>,
}

struct EssentialEstimator;

impl Estimator for EssentialEstimator {
    type Datum = (Point2<f64>, Point2<f64>);
    type Model = Matrix3<f64>;

    const MIN_SAMPLES: usize = MIN_SAMPLES;

    fn fit(data: &[Self::Datum], sample: &[usize]) -> Option<Self::Model> {
        let mut p1 = Vec::with_capacity(sample.len());
        let mut p2 = Vec::with_capacity(sample.len());
        for &idx in sample {
            p1.push(data[idx].0);
            p2.push(data[idx].1);
        }
        essential_8point(&p1, &p2)
    }

    fn residual(model: &Self::Model, datum: &Self::Datum) -> f64 {
        sampson_distance(model, &datum.0, &datum.1)
    }

    fn refit(data: &[Self::Datum], inliers: &[usize]) -> Option<Self::Model> {
        let mut p1 = Vec::with_capacity(inliers.len());
        let mut p2 = Vec::with_capacity(inliers.len());
        for &idx in inliers {
            p1.push(data[idx].0);
            p2.push(data[idx].1);
        }
        essential_8point(&p1, &p2)
    }
}

/// Fit a two-view model to the candidate pairs and decompose it.
///
/// Fails with [`MatchError::DegenerateGeometry`] when no sampling trial
/// reaches a consensus of [`MIN_SAMPLES`] inliers within the budget, or
/// when no decomposition candidate places any triangulated inlier in
/// front of both cameras.
pub fn estimate_two_view(
    candidates: &CandidateMatches,
    frame_a: &Frame,
    frame_b: &Frame,
) -> Result<TwoViewGeometry, MatchError> {
    let norm_a = frame_a.normalized_keypoints();
    let norm_b = frame_b.normalized_keypoints();

    let data: Vec<(Point2<f64>, Point2<f64>)> = candidates
        .idx1
        .iter()
        .zip(candidates.idx2.iter())
        .map(|(&i, &j)| (norm_a[i], norm_b[j]))
        .collect();

    let opts = RansacOptions {
        max_trials: MAX_TRIALS,
        residual_threshold: RESIDUAL_THRESHOLD,
        min_inliers: MIN_SAMPLES,
        seed: RANSAC_SEED,
    };
    let result = ransac::<EssentialEstimator>(&data, &opts);
    let Some(essential) = result.model else {
        return Err(MatchError::DegenerateGeometry);
    };

    // Decompose on the inlier correspondences only; outliers would vote
    // nonsense in the cheirality count.
    let mut in1 = Vec::with_capacity(result.n_inliers);
    let mut in2 = Vec::with_capacity(result.n_inliers);
    for (datum, &keep) in data.iter().zip(result.inlier_mask.iter()) {
        if keep {
            in1.push(datum.0);
            in2.push(datum.1);
        }
    }
    let Some((rotation, translation)) = recover_pose(&essential, &in1, &in2) else {
        return Err(MatchError::DegenerateGeometry);
    };

    Ok(TwoViewGeometry {
        essential,
        inlier_mask: result.inlier_mask,
        rotation,
        translation,
    })
}
