//! Synthetic two-view scenes for the demo binary and end-to-end tests.
//!
//! Generates a random 3D point cloud visible from two cameras related by
//! a known rigid motion, projects it through a fixed pinhole model, and
//! attaches random binary descriptors shared between the views (with a
//! few bits of noise on the second view). Mismatch injection re-aims a
//! fraction of the second view's keypoints at random image locations
//! while keeping descriptor identity, which turns them into geometric
//! outliers that still pass descriptor matching.

use nalgebra::{Matrix3, Point2, Vector3};
use rand::prelude::IndexedRandom;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::CameraConfig;
use crate::features::{Descriptor, FeatureSet};
use crate::geometry::SE3;
use crate::map::FrameId;
use crate::tracking::frame::Frame;

/// Bits flipped on each second-view descriptor.
const DESCRIPTOR_NOISE_BITS: usize = 2;

/// A generated scene: one point cloud seen from two cameras.
#[derive(Debug, Clone)]
pub struct TwoViewScene {
    pub intrinsics: Matrix3<f64>,
    pub width: u32,
    pub height: u32,
    /// Ground-truth motion: `p_b = R * p_a + t`.
    pub relative_pose: SE3,
    /// Cloud points in camera A's frame.
    pub points: Vec<Vector3<f64>>,
    pub features_a: FeatureSet,
    pub features_b: FeatureSet,
}

/// The fixed pinhole model all synthetic scenes share.
pub fn camera() -> CameraConfig {
    CameraConfig {
        fx: 500.0,
        fy: 500.0,
        cx: 320.0,
        cy: 240.0,
        width: 640,
        height: 480,
    }
}

/// Intrinsics matrix of the shared synthetic camera.
pub fn intrinsics() -> Matrix3<f64> {
    camera().k()
}

fn project(k: &Matrix3<f64>, p: &Vector3<f64>) -> Point2<f64> {
    let h = k * p;
    Point2::new(h.x / h.z, h.y / h.z)
}

fn in_image(p: &Point2<f64>, width: u32, height: u32) -> bool {
    p.x >= 0.0 && p.x < width as f64 && p.y >= 0.0 && p.y < height as f64
}

fn random_descriptor(rng: &mut StdRng) -> Descriptor {
    Descriptor([rng.random(), rng.random(), rng.random(), rng.random()])
}

fn with_bit_noise(d: &Descriptor, n_bits: usize, rng: &mut StdRng) -> Descriptor {
    let bits: Vec<usize> = (0..Descriptor::BITS as usize).collect();
    let mut out = *d;
    for &bit in bits.choose_multiple(rng, n_bits) {
        out.0[bit / 64] ^= 1 << (bit % 64);
    }
    out
}

/// Generate a scene of `n_points` correspondences under `relative_pose`.
///
/// Every point projects inside both images; descriptors match index to
/// index across the two views. Deterministic for a fixed seed.
pub fn two_view_scene(n_points: usize, relative_pose: &SE3, seed: u64) -> TwoViewScene {
    let cam = camera();
    let k = cam.k();
    let (width, height) = (cam.width, cam.height);
    let mut rng = StdRng::seed_from_u64(seed);

    let mut points = Vec::with_capacity(n_points);
    let mut features_a = FeatureSet::default();
    let mut features_b = FeatureSet::default();

    while points.len() < n_points {
        let p = Vector3::new(
            rng.random_range(-1.0..1.0),
            rng.random_range(-0.75..0.75),
            rng.random_range(4.0..8.0),
        );
        let q = relative_pose.transform_point(&p);
        if q.z <= 0.0 {
            continue;
        }

        let uv_a = project(&k, &p);
        let uv_b = project(&k, &q);
        if !in_image(&uv_a, width, height) || !in_image(&uv_b, width, height) {
            continue;
        }

        let d = random_descriptor(&mut rng);
        points.push(p);
        features_a.keypoints.push(uv_a);
        features_a.descriptors.push(d);
        features_b.keypoints.push(uv_b);
        features_b
            .descriptors
            .push(with_bit_noise(&d, DESCRIPTOR_NOISE_BITS, &mut rng));
    }

    TwoViewScene {
        intrinsics: k,
        width,
        height,
        relative_pose: *relative_pose,
        points,
        features_a,
        features_b,
    }
}

/// Replace a fraction of the second view's keypoints with random image
/// locations, keeping descriptor identity.
///
/// Returns the corrupted correspondence indices, ascending.
pub fn inject_mismatches(scene: &mut TwoViewScene, fraction: f64, seed: u64) -> Vec<usize> {
    let n = scene.features_b.len();
    let n_corrupt = (fraction * n as f64).floor() as usize;
    let mut rng = StdRng::seed_from_u64(seed);

    let indices: Vec<usize> = (0..n).collect();
    let mut corrupted: Vec<usize> = indices
        .choose_multiple(&mut rng, n_corrupt)
        .copied()
        .collect();
    corrupted.sort_unstable();

    for &i in &corrupted {
        scene.features_b.keypoints[i] = Point2::new(
            rng.random_range(0.0..scene.width as f64),
            rng.random_range(0.0..scene.height as f64),
        );
    }
    corrupted
}

/// Wrap one view's features in a Frame at the identity pose.
pub fn synthetic_frame(id: u64, features: &FeatureSet, scene: &TwoViewScene) -> Frame {
    Frame::from_features(
        FrameId::new(id),
        features.clone(),
        scene.width,
        scene.height,
        scene.intrinsics,
        SE3::identity(),
    )
    .expect("generator output is always a valid feature set")
}
