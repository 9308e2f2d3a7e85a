//! Frame-to-frame correspondence tracking.
//!
//! This module implements the correspondence front end for one frame
//! pair:
//! - Frame entity with lazily derived views (normalization, spatial grid)
//! - descriptor matching with ratio/absolute gating and mutual exclusivity
//! - robust two-view epipolar fitting and relative pose recovery
//!
//! The pipeline is pure per pair: [`match_frames`] retains no state
//! between calls and mutates neither Frame.

pub mod frame;
pub mod matching;
pub mod two_view;

pub use frame::{FeatureGrid, Frame, FrameSnapshot};
pub use matching::{match_descriptors, CandidateMatches};
pub use two_view::{estimate_two_view, TwoViewGeometry};

use thiserror::Error;
use tracing::debug;

use crate::geometry::SE3;

/// Why correspondence matching failed for a frame pair.
///
/// Both kinds are fatal to the pair: no partial correspondence set is
/// ever returned, and nothing is retried internally. Re-running with
/// relaxed thresholds is a caller-level policy.
#[derive(Debug, Error)]
pub enum MatchError {
    /// Fewer candidate pairs survived gating than the two-view solver's
    /// minimal sample needs.
    #[error("insufficient matches: {found} candidates survived gating, need at least 8")]
    InsufficientMatches { found: usize },
    /// Robust fitting found no model meeting the residual threshold
    /// within the trial budget, or no decomposition placed the inliers
    /// in front of both cameras.
    #[error("degenerate geometry: no two-view model reached consensus")]
    DegenerateGeometry,
}

/// Validated correspondences and relative motion for one frame pair.
#[derive(Debug, Clone)]
pub struct FrameMatch {
    /// Inlier keypoint indices into frame A.
    pub idx1: Vec<usize>,
    /// Inlier keypoint indices into frame B, aligned with `idx1`.
    pub idx2: Vec<usize>,
    /// Relative motion `p_b = R * p_a + t`, with `t` unit length.
    pub relative_pose: SE3,
    /// Candidate pairs that entered robust fitting.
    pub n_candidates: usize,
    /// Pairs surviving as geometric inliers.
    pub n_inliers: usize,
}

/// Match two Frames and recover their relative motion.
///
/// Runs descriptor matching, fits a two-view model to the candidates by
/// RANSAC, and restricts the index pairs to the geometric inliers.
/// Deterministic for unchanged inputs: the trial sampler runs from a
/// fixed seed. Updating `frame_b`'s pose from the result is the caller's
/// decision.
pub fn match_frames(frame_a: &Frame, frame_b: &Frame) -> Result<FrameMatch, MatchError> {
    let candidates = match_descriptors(frame_a, frame_b)?;
    let geometry = estimate_two_view(&candidates, frame_a, frame_b)?;

    let mut idx1 = Vec::new();
    let mut idx2 = Vec::new();
    for (k, &keep) in geometry.inlier_mask.iter().enumerate() {
        if keep {
            idx1.push(candidates.idx1[k]);
            idx2.push(candidates.idx2[k]);
        }
    }

    debug!(
        "matches: {} descriptors -> {} neighbor pairs -> {} candidates -> {} inliers",
        frame_a.num_features(),
        candidates.n_neighbor_pairs,
        candidates.len(),
        idx1.len()
    );

    Ok(FrameMatch {
        n_candidates: candidates.len(),
        n_inliers: idx1.len(),
        idx1,
        idx2,
        relative_pose: SE3::from_rt(geometry.rotation, geometry.translation),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::{Descriptor, FeatureSet};
    use crate::map::FrameId;
    use crate::synthetic::{inject_mismatches, synthetic_frame, two_view_scene};
    use nalgebra::{Matrix3, Point2, UnitQuaternion, Vector3};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::collections::HashSet;

    fn motion() -> SE3 {
        SE3 {
            rotation: UnitQuaternion::from_euler_angles(0.03, -0.05, 0.02),
            translation: Vector3::new(0.25, -0.1, 0.05),
        }
    }

    fn rotation_error_rad(estimated: &SE3, truth: &SE3) -> f64 {
        estimated.rotation_angle_to(truth)
    }

    fn translation_error_rad(estimated: &SE3, truth: &SE3) -> f64 {
        let cos = estimated
            .translation
            .dot(&truth.translation.normalize())
            .clamp(-1.0, 1.0);
        cos.acos()
    }

    #[test]
    fn clean_scene_recovers_the_ground_truth_motion() {
        let truth = motion();
        let scene = two_view_scene(120, &truth, 42);
        let frame_a = synthetic_frame(0, &scene.features_a, &scene);
        let frame_b = synthetic_frame(1, &scene.features_b, &scene);

        let result = match_frames(&frame_a, &frame_b).unwrap();

        assert!(
            result.n_inliers as f64 >= 0.9 * 120.0,
            "only {} of 120 true correspondences kept",
            result.n_inliers
        );
        assert!(
            rotation_error_rad(&result.relative_pose, &truth) < 1e-3,
            "rotation error {} rad",
            rotation_error_rad(&result.relative_pose, &truth)
        );
        assert!(
            translation_error_rad(&result.relative_pose, &truth) < 1e-3,
            "translation direction error {} rad",
            translation_error_rad(&result.relative_pose, &truth)
        );
    }

    #[test]
    fn inlier_mask_rejects_injected_mismatches() {
        let truth = motion();
        let mut scene = two_view_scene(120, &truth, 5);
        let corrupted = inject_mismatches(&mut scene, 0.3, 17);
        assert_eq!(corrupted.len(), 36);

        let frame_a = synthetic_frame(0, &scene.features_a, &scene);
        let frame_b = synthetic_frame(1, &scene.features_b, &scene);
        let result = match_frames(&frame_a, &frame_b).unwrap();

        // Descriptor identity survives corruption, so candidate index
        // pairs still line up with scene indices.
        let accepted: HashSet<usize> = result.idx1.iter().copied().collect();
        let outliers_kept = corrupted.iter().filter(|&i| accepted.contains(i)).count();
        let true_kept = accepted.len() - outliers_kept;

        assert!(
            outliers_kept as f64 <= 0.05 * corrupted.len() as f64,
            "{outliers_kept} of {} injected outliers slipped through",
            corrupted.len()
        );
        assert!(
            true_kept as f64 >= 0.9 * (120 - corrupted.len()) as f64,
            "only {true_kept} of {} true correspondences kept",
            120 - corrupted.len()
        );
    }

    #[test]
    fn pure_noise_candidates_do_not_yield_a_pose() {
        // Identical descriptors paired with geometrically unrelated
        // keypoints: every candidate passes matching, none satisfy a
        // common epipolar model.
        let mut rng = StdRng::seed_from_u64(23);
        let descriptors: Vec<Descriptor> = (0..40)
            .map(|_| Descriptor([rng.random(), rng.random(), rng.random(), rng.random()]))
            .collect();
        let random_points = |rng: &mut StdRng| -> Vec<Point2<f64>> {
            (0..40)
                .map(|_| {
                    Point2::new(rng.random_range(0.0..640.0), rng.random_range(0.0..480.0))
                })
                .collect()
        };
        let k = Matrix3::new(500.0, 0.0, 320.0, 0.0, 500.0, 240.0, 0.0, 0.0, 1.0);
        let frame_a = Frame::from_features(
            FrameId::new(0),
            FeatureSet::new(random_points(&mut rng), descriptors.clone()).unwrap(),
            640,
            480,
            k,
            SE3::identity(),
        )
        .unwrap();
        let frame_b = Frame::from_features(
            FrameId::new(1),
            FeatureSet::new(random_points(&mut rng), descriptors).unwrap(),
            640,
            480,
            k,
            SE3::identity(),
        )
        .unwrap();

        match match_frames(&frame_a, &frame_b) {
            Err(MatchError::DegenerateGeometry) => {}
            // A minimal sample can interpolate itself; anything beyond a
            // sliver of the 40 candidates would mean a real consensus.
            Ok(result) => assert!(
                result.n_inliers <= 10,
                "random geometry produced {} inliers",
                result.n_inliers
            ),
            Err(e) => panic!("unexpected error: {e}"),
        }
    }

    #[test]
    fn repeated_calls_are_identical() {
        let scene = two_view_scene(60, &motion(), 9);
        let frame_a = synthetic_frame(0, &scene.features_a, &scene);
        let frame_b = synthetic_frame(1, &scene.features_b, &scene);

        let first = match_frames(&frame_a, &frame_b).unwrap();
        let second = match_frames(&frame_a, &frame_b).unwrap();

        assert_eq!(first.idx1, second.idx1);
        assert_eq!(first.idx2, second.idx2);
        assert_eq!(first.relative_pose, second.relative_pose);
    }

    #[test]
    fn accepted_indices_stay_unique_end_to_end() {
        let scene = two_view_scene(60, &motion(), 31);
        let frame_a = synthetic_frame(0, &scene.features_a, &scene);
        let frame_b = synthetic_frame(1, &scene.features_b, &scene);

        let result = match_frames(&frame_a, &frame_b).unwrap();
        assert_eq!(result.idx1.len(), result.idx2.len());
        assert_eq!(
            result.idx1.iter().collect::<HashSet<_>>().len(),
            result.idx1.len()
        );
        assert_eq!(
            result.idx2.iter().collect::<HashSet<_>>().len(),
            result.idx2.len()
        );
    }

    #[test]
    fn matching_failure_propagates() {
        let scene = two_view_scene(7, &motion(), 2);
        let frame_a = synthetic_frame(0, &scene.features_a, &scene);
        let frame_b = synthetic_frame(1, &scene.features_b, &scene);

        let err = match_frames(&frame_a, &frame_b).unwrap_err();
        assert!(matches!(err, MatchError::InsufficientMatches { found: 7 }));
    }
}
