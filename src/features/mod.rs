//! Feature primitives: pixel keypoints, binary descriptors, and the
//! detector seam.
//!
//! The front end does not detect features itself. A [`FeatureSource`]
//! implementation (ORB, FAST+BRIEF, ...) produces one [`FeatureSet`] per
//! image; everything downstream only relies on the index alignment of the
//! keypoint and descriptor sequences.

use anyhow::{ensure, Result};
use image::GrayImage;
use nalgebra::Point2;
use serde::{Deserialize, Serialize};

/// A 256-bit binary feature descriptor stored as 4 x u64.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Descriptor(pub [u64; 4]);

impl Descriptor {
    /// Number of bits in a descriptor.
    pub const BITS: u32 = 256;

    /// The all-zero descriptor.
    pub fn zeros() -> Self {
        Self([0; 4])
    }

    /// Hamming distance to another descriptor.
    ///
    /// Returns the number of differing bits (0-256).
    #[inline]
    pub fn distance(&self, other: &Self) -> u32 {
        (self.0[0] ^ other.0[0]).count_ones()
            + (self.0[1] ^ other.0[1]).count_ones()
            + (self.0[2] ^ other.0[2]).count_ones()
            + (self.0[3] ^ other.0[3]).count_ones()
    }
}

/// Keypoints and descriptors extracted from one image.
///
/// The two sequences are index-aligned: `descriptors[i]` describes the
/// image patch around `keypoints[i]`.
#[derive(Debug, Clone, Default)]
pub struct FeatureSet {
    /// Keypoint locations in pixel coordinates.
    pub keypoints: Vec<Point2<f64>>,
    /// One descriptor per keypoint.
    pub descriptors: Vec<Descriptor>,
}

impl FeatureSet {
    /// Build a feature set, checking the index alignment.
    pub fn new(keypoints: Vec<Point2<f64>>, descriptors: Vec<Descriptor>) -> Result<Self> {
        ensure!(
            keypoints.len() == descriptors.len(),
            "keypoint/descriptor length mismatch: {} vs {}",
            keypoints.len(),
            descriptors.len()
        );
        Ok(Self {
            keypoints,
            descriptors,
        })
    }

    /// Number of features.
    pub fn len(&self) -> usize {
        self.keypoints.len()
    }

    /// True when no features were extracted.
    pub fn is_empty(&self) -> bool {
        self.keypoints.is_empty()
    }
}

/// Source of salient image points and their identity descriptors.
///
/// Detection and description are external concerns; this trait is the
/// seam through which they enter the pipeline.
pub trait FeatureSource {
    /// Detect keypoints in `image` and compute one descriptor per keypoint.
    fn detect(&mut self, image: &GrayImage) -> Result<FeatureSet>;
}
