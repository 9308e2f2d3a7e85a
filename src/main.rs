use anyhow::{Context, Result};
use nalgebra::{UnitQuaternion, Vector3};

use rust_vo::geometry::SE3;
use rust_vo::map::Map;
use rust_vo::synthetic::{inject_mismatches, two_view_scene};
use rust_vo::tracking::{match_frames, Frame};

/// Demo: generate a synthetic two-view scene, contaminate a fraction of
/// the correspondences, and recover the relative motion.
fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let n_points: usize = std::env::args()
        .nth(1)
        .and_then(|arg| arg.parse().ok())
        .unwrap_or(200);
    let outlier_fraction: f64 = std::env::args()
        .nth(2)
        .and_then(|arg| arg.parse().ok())
        .unwrap_or(0.3);

    let truth = SE3 {
        rotation: UnitQuaternion::from_euler_angles(0.03, -0.05, 0.02),
        translation: Vector3::new(0.25, -0.1, 0.05),
    };

    let mut scene = two_view_scene(n_points, &truth, 42);
    let corrupted = inject_mismatches(&mut scene, outlier_fraction, 17);
    println!(
        "Generated {} correspondences, corrupted {} into geometric outliers",
        n_points,
        corrupted.len()
    );

    let mut map = Map::new();
    let id_a = map.register_frame(|id| {
        Frame::from_features(
            id,
            scene.features_a.clone(),
            scene.width,
            scene.height,
            scene.intrinsics,
            SE3::identity(),
        )
    })?;
    let id_b = map.register_frame(|id| {
        Frame::from_features(
            id,
            scene.features_b.clone(),
            scene.width,
            scene.height,
            scene.intrinsics,
            SE3::identity(),
        )
    })?;

    let frame_a = map.get_frame(id_a).context("frame A missing from map")?;
    let frame_b = map.get_frame(id_b).context("frame B missing from map")?;

    let result = match_frames(frame_a, frame_b)?;
    println!(
        "Matched {} -> {}: {} candidates, {} inliers",
        frame_a.id(),
        frame_b.id(),
        result.n_candidates,
        result.n_inliers
    );

    let rotation_error_deg = result
        .relative_pose
        .rotation_angle_to(&truth)
        .to_degrees();
    let translation_error_deg = result
        .relative_pose
        .translation
        .dot(&truth.translation.normalize())
        .clamp(-1.0, 1.0)
        .acos()
        .to_degrees();
    println!(
        "Rotation error: {:.4} deg, translation direction error: {:.4} deg",
        rotation_error_deg, translation_error_deg
    );

    let outliers_excluded = corrupted
        .iter()
        .filter(|&i| !result.idx1.contains(i))
        .count();
    println!(
        "Injected outliers excluded: {}/{}",
        outliers_excluded,
        corrupted.len()
    );

    // World pose of B from A's pose and the recovered relative motion.
    let pose_b = frame_a.pose().compose(&result.relative_pose.inverse());
    map.get_frame_mut(id_b)
        .context("frame B missing from map")?
        .set_pose(pose_b);
    println!("Updated {} pose from the estimated motion", id_b);

    Ok(())
}
