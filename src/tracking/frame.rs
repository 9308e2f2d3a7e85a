//! Per-image `Frame` entity.
//!
//! A Frame wraps one image's keypoints and descriptors together with the
//! camera intrinsics and the (mutable) camera pose. Derived views - the
//! intrinsics inverse, camera-normalized keypoints, and a spatial index
//! over pixel keypoints - are computed on first access and memoized for
//! the Frame's lifetime. The raw arrays are write-once at construction,
//! so the caches never need invalidation; `OnceLock` makes a first-access
//! race across threads safe.

use std::sync::OnceLock;

use anyhow::{ensure, Result};
use nalgebra::{Matrix3, Point2, Vector3};
use serde::{Deserialize, Serialize};

use crate::features::{Descriptor, FeatureSet};
use crate::geometry::SE3;
use crate::map::{FrameId, MapPointId};

/// Spatial grid for fast keypoint lookup around an image location.
///
/// The grid divides the image into `GRID_COLS` x `GRID_ROWS` cells, each
/// holding the indices of the keypoints that fall inside it. Radius and
/// k-nearest queries then only touch nearby cells instead of every
/// keypoint.
#[derive(Debug, Clone)]
pub struct FeatureGrid {
    /// Row-major cells: `cells[row * cols + col]`.
    cells: Vec<Vec<usize>>,
    /// The indexed keypoints, for exact distance filtering.
    points: Vec<Point2<f64>>,
    cell_width_inv: f64,
    cell_height_inv: f64,
    width: f64,
    height: f64,
    cols: usize,
    rows: usize,
}

impl FeatureGrid {
    pub const GRID_COLS: usize = 64;
    pub const GRID_ROWS: usize = 48;

    /// Build a grid over `points` for an image of `width` x `height`
    /// pixels. Zero dimensions or an empty point set produce an empty
    /// grid whose queries return nothing.
    pub fn new(points: &[Point2<f64>], width: f64, height: f64) -> Self {
        if points.is_empty() || width <= 0.0 || height <= 0.0 {
            return Self {
                cells: Vec::new(),
                points: Vec::new(),
                cell_width_inv: 0.0,
                cell_height_inv: 0.0,
                width: 0.0,
                height: 0.0,
                cols: 0,
                rows: 0,
            };
        }

        let cols = Self::GRID_COLS;
        let rows = Self::GRID_ROWS;
        let cell_width_inv = cols as f64 / width;
        let cell_height_inv = rows as f64 / height;

        let mut cells: Vec<Vec<usize>> = vec![Vec::new(); cols * rows];
        for (idx, p) in points.iter().enumerate() {
            let cx = ((p.x * cell_width_inv) as usize).min(cols - 1);
            let cy = ((p.y * cell_height_inv) as usize).min(rows - 1);
            cells[cy * cols + cx].push(idx);
        }

        Self {
            cells,
            points: points.to_vec(),
            cell_width_inv,
            cell_height_inv,
            width,
            height,
            cols,
            rows,
        }
    }

    /// Candidate indices from the cells overlapping a circle. The caller
    /// still needs an exact distance check; see [`Self::in_radius`].
    fn candidates(&self, x: f64, y: f64, r: f64) -> Vec<usize> {
        if self.cols == 0 {
            return Vec::new();
        }

        let min_cx = (((x - r) * self.cell_width_inv).floor() as i64).max(0) as usize;
        let max_cx = ((((x + r) * self.cell_width_inv).ceil() as i64).max(0) as usize)
            .min(self.cols - 1);
        let min_cy = (((y - r) * self.cell_height_inv).floor() as i64).max(0) as usize;
        let max_cy = ((((y + r) * self.cell_height_inv).ceil() as i64).max(0) as usize)
            .min(self.rows - 1);

        let mut out = Vec::new();
        for cy in min_cy..=max_cy {
            for cx in min_cx..=max_cx {
                out.extend(&self.cells[cy * self.cols + cx]);
            }
        }
        out
    }

    /// Indices of keypoints within `r` pixels of `(x, y)`, ascending.
    pub fn in_radius(&self, x: f64, y: f64, r: f64) -> Vec<usize> {
        let center = Point2::new(x, y);
        let mut out: Vec<usize> = self
            .candidates(x, y, r)
            .into_iter()
            .filter(|&i| (self.points[i] - center).norm() <= r)
            .collect();
        out.sort_unstable();
        out
    }

    /// Indices of the `k` keypoints closest to `(x, y)`, nearest first.
    ///
    /// Searches an expanding radius so dense regions stay cheap; falls
    /// back to the full extent when fewer than `k` candidates are nearby.
    pub fn k_nearest(&self, x: f64, y: f64, k: usize) -> Vec<usize> {
        if self.cols == 0 || k == 0 {
            return Vec::new();
        }

        let center = Point2::new(x, y);
        let max_r = self.width.hypot(self.height);
        let mut r = (1.0 / self.cell_width_inv).max(1.0 / self.cell_height_inv);
        loop {
            let mut by_dist: Vec<(f64, usize)> = self
                .candidates(x, y, r)
                .into_iter()
                .map(|i| ((self.points[i] - center).norm(), i))
                .collect();
            by_dist.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

            // The search square only guarantees completeness up to r: a
            // candidate farther than r could still be beaten by a point in
            // an unvisited cell, so grow until the k-th hit fits inside r.
            let complete = by_dist.len() >= k && by_dist[k - 1].0 <= r;
            if complete || r >= max_r {
                by_dist.truncate(k);
                return by_dist.into_iter().map(|(_, i)| i).collect();
            }
            r *= 2.0;
        }
    }

    /// Number of indexed keypoints.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// True when the grid indexes nothing.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Dehydrated Frame for persistence.
///
/// Holds everything the front end owns; map-point slots are not
/// persisted because they belong to downstream triangulation state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameSnapshot {
    pub id: FrameId,
    pub intrinsics: Matrix3<f64>,
    pub pose: SE3,
    pub width: u32,
    pub height: u32,
    pub keypoints: Vec<Point2<f64>>,
    pub descriptors: Vec<Descriptor>,
}

/// One image's worth of front-end state.
#[derive(Debug)]
pub struct Frame {
    id: FrameId,
    intrinsics: Matrix3<f64>,
    pose: SE3,
    width: u32,
    height: u32,
    keypoints: Vec<Point2<f64>>,
    descriptors: Vec<Descriptor>,
    point_refs: Vec<Option<MapPointId>>,

    intrinsics_inv: OnceLock<Matrix3<f64>>,
    normalized: OnceLock<Vec<Point2<f64>>>,
    grid: OnceLock<FeatureGrid>,
}

impl Frame {
    /// Build a Frame from detected features.
    pub fn from_features(
        id: FrameId,
        features: FeatureSet,
        width: u32,
        height: u32,
        intrinsics: Matrix3<f64>,
        pose: SE3,
    ) -> Result<Self> {
        ensure!(
            features.keypoints.len() == features.descriptors.len(),
            "keypoint/descriptor length mismatch: {} vs {}",
            features.keypoints.len(),
            features.descriptors.len()
        );
        ensure!(
            intrinsics.try_inverse().is_some(),
            "camera intrinsics matrix is singular"
        );

        let n = features.keypoints.len();
        Ok(Self {
            id,
            intrinsics,
            pose,
            width,
            height,
            keypoints: features.keypoints,
            descriptors: features.descriptors,
            point_refs: vec![None; n],
            intrinsics_inv: OnceLock::new(),
            normalized: OnceLock::new(),
            grid: OnceLock::new(),
        })
    }

    /// Build a featureless placeholder Frame (zero dimensions), to be
    /// filled by rehydration rather than an image.
    pub fn placeholder(id: FrameId, intrinsics: Matrix3<f64>, pose: SE3) -> Result<Self> {
        Self::from_features(id, FeatureSet::default(), 0, 0, intrinsics, pose)
    }

    /// Rebuild a Frame from a snapshot. Map-point slots start empty.
    pub fn from_snapshot(snap: FrameSnapshot) -> Result<Self> {
        Self::from_features(
            snap.id,
            FeatureSet::new(snap.keypoints, snap.descriptors)?,
            snap.width,
            snap.height,
            snap.intrinsics,
            snap.pose,
        )
    }

    /// Dehydrate this Frame for persistence.
    pub fn snapshot(&self) -> FrameSnapshot {
        FrameSnapshot {
            id: self.id,
            intrinsics: self.intrinsics,
            pose: self.pose,
            width: self.width,
            height: self.height,
            keypoints: self.keypoints.clone(),
            descriptors: self.descriptors.clone(),
        }
    }

    pub fn id(&self) -> FrameId {
        self.id
    }

    pub fn intrinsics(&self) -> &Matrix3<f64> {
        &self.intrinsics
    }

    /// Camera pose (T_wc).
    pub fn pose(&self) -> &SE3 {
        &self.pose
    }

    /// Update the pose once motion has been estimated.
    pub fn set_pose(&mut self, pose: SE3) {
        self.pose = pose;
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Keypoints in pixel coordinates.
    pub fn keypoints(&self) -> &[Point2<f64>] {
        &self.keypoints
    }

    pub fn descriptors(&self) -> &[Descriptor] {
        &self.descriptors
    }

    pub fn num_features(&self) -> usize {
        self.keypoints.len()
    }

    /// Per-keypoint map-point slots.
    pub fn point_refs(&self) -> &[Option<MapPointId>] {
        &self.point_refs
    }

    /// Associate keypoint `idx` with a triangulated map point.
    pub fn set_point_ref(&mut self, idx: usize, point: MapPointId) {
        self.point_refs[idx] = Some(point);
    }

    /// Inverse of the intrinsics matrix, computed once.
    pub fn intrinsics_inv(&self) -> &Matrix3<f64> {
        self.intrinsics_inv.get_or_init(|| {
            self.intrinsics
                .try_inverse()
                .expect("intrinsics verified invertible at construction")
        })
    }

    /// Keypoints in camera-normalized coordinates, computed once.
    ///
    /// Each pixel keypoint is stacked with a trailing 1 and
    /// left-multiplied by `K^{-1}`; the resulting (x, y) is kept.
    pub fn normalized_keypoints(&self) -> &[Point2<f64>] {
        self.normalized.get_or_init(|| {
            let k_inv = self.intrinsics_inv();
            self.keypoints
                .iter()
                .map(|p| {
                    let h = k_inv * Vector3::new(p.x, p.y, 1.0);
                    Point2::new(h.x, h.y)
                })
                .collect()
        })
    }

    /// Spatial index over the pixel keypoints, computed once.
    pub fn spatial_index(&self) -> &FeatureGrid {
        self.grid.get_or_init(|| {
            FeatureGrid::new(&self.keypoints, self.width as f64, self.height as f64)
        })
    }
}
