//! Map - the owning collection of Frames.
//!
//! The Map issues frame identities (a monotone counter), stores Frames,
//! and hands out MapPointIds for downstream triangulation. It is the only
//! holder of id-issuing state; Frames themselves never own global
//! counters.
//!
//! The Map is single-owner (`&mut self` for all mutation). Callers that
//! create Frames from several threads wrap the Map in an `RwLock`, which
//! makes the increment-and-register step atomic.

mod types;

pub use types::{FrameId, MapPointId};

use std::collections::HashMap;

use anyhow::Result;
use image::GrayImage;
use nalgebra::Matrix3;

use crate::features::FeatureSource;
use crate::geometry::SE3;
use crate::tracking::frame::Frame;

/// Owning collection of Frames.
pub struct Map {
    frames: HashMap<FrameId, Frame>,
    next_frame_id: u64,
    next_point_id: u64,
}

impl Map {
    /// Create a new empty Map.
    pub fn new() -> Self {
        Self {
            frames: HashMap::new(),
            next_frame_id: 0,
            next_point_id: 0,
        }
    }

    /// Generate a new unique Frame ID.
    pub fn next_frame_id(&mut self) -> FrameId {
        let id = FrameId::new(self.next_frame_id);
        self.next_frame_id += 1;
        id
    }

    /// Generate a new unique MapPoint ID.
    pub fn next_map_point_id(&mut self) -> MapPointId {
        let id = MapPointId::new(self.next_point_id);
        self.next_point_id += 1;
        id
    }

    /// Create and register a Frame.
    ///
    /// When `image` is present, `source` detects its features; when it is
    /// `None` the Frame is a placeholder with zero dimensions and no
    /// features, to be filled by rehydration. The Map issues the id.
    pub fn create_frame(
        &mut self,
        image: Option<&GrayImage>,
        source: &mut dyn FeatureSource,
        intrinsics: Matrix3<f64>,
        pose: SE3,
    ) -> Result<FrameId> {
        let id = self.next_frame_id();
        let frame = match image {
            Some(img) => {
                let features = source.detect(img)?;
                Frame::from_features(id, features, img.width(), img.height(), intrinsics, pose)?
            }
            None => Frame::placeholder(id, intrinsics, pose)?,
        };
        self.frames.insert(id, frame);
        Ok(id)
    }

    /// Register a Frame built outside the Map (synthetic data or a
    /// rehydrated snapshot). The Map issues the id.
    pub fn register_frame(
        &mut self,
        build: impl FnOnce(FrameId) -> Result<Frame>,
    ) -> Result<FrameId> {
        let id = self.next_frame_id();
        let frame = build(id)?;
        self.frames.insert(id, frame);
        Ok(id)
    }

    /// Add a Frame that already carries an explicit id (rehydration).
    ///
    /// Bumps the id counter past the inserted id so later registrations
    /// stay unique.
    pub fn add_frame(&mut self, frame: Frame) {
        if frame.id().0 >= self.next_frame_id {
            self.next_frame_id = frame.id().0 + 1;
        }
        self.frames.insert(frame.id(), frame);
    }

    /// Get a Frame by ID.
    pub fn get_frame(&self, id: FrameId) -> Option<&Frame> {
        self.frames.get(&id)
    }

    /// Get a mutable reference to a Frame by ID.
    pub fn get_frame_mut(&mut self, id: FrameId) -> Option<&mut Frame> {
        self.frames.get_mut(&id)
    }

    /// All Frames, in no particular order.
    pub fn frames(&self) -> impl Iterator<Item = &Frame> {
        self.frames.values()
    }

    /// Number of Frames.
    pub fn num_frames(&self) -> usize {
        self.frames.len()
    }

    /// Clear the collection and reset the counters.
    pub fn clear(&mut self) {
        self.frames.clear();
        self.next_frame_id = 0;
        self.next_point_id = 0;
    }
}

impl Default for Map {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Map {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Map")
            .field("num_frames", &self.frames.len())
            .finish()
    }
}
