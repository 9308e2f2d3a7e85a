//! Descriptor matching between two Frames.
//!
//! For every descriptor in frame A the matcher finds its two nearest
//! neighbors among frame B's descriptors, applies Lowe's ratio test and
//! an absolute distance gate, and enforces a global mutual-exclusivity
//! constraint so that no keypoint on either side participates in more
//! than one accepted pair.

use std::collections::HashSet;

use super::frame::Frame;
use super::MatchError;

/// Ratio test threshold (best / second best).
pub const NN_RATIO: f32 = 0.75;
/// Max descriptor distance for acceptance (Hamming bits).
pub const TH_DIST: u32 = 32;
/// Minimum surviving pairs; the minimal sample size of the downstream
/// two-view solver.
pub const MIN_MATCHES: usize = 8;

/// Deduplicated candidate correspondences between two Frames.
///
/// `idx1[k]` and `idx2[k]` index the k-th pair's keypoints in frame A and
/// frame B respectively. Both sequences are duplicate-free.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateMatches {
    pub idx1: Vec<usize>,
    pub idx2: Vec<usize>,
    /// Number of frame-A descriptors that had two neighbors to compare,
    /// before any gating. Diagnostic only.
    pub n_neighbor_pairs: usize,
}

impl CandidateMatches {
    /// Number of accepted pairs.
    pub fn len(&self) -> usize {
        self.idx1.len()
    }

    /// True when no pair was accepted.
    pub fn is_empty(&self) -> bool {
        self.idx1.is_empty()
    }
}

/// Match frame A's descriptors against frame B's.
///
/// Fails with [`MatchError::InsufficientMatches`] when fewer than
/// [`MIN_MATCHES`] pairs survive gating. Neither Frame is mutated.
pub fn match_descriptors(
    frame_a: &Frame,
    frame_b: &Frame,
) -> Result<CandidateMatches, MatchError> {
    let des_a = frame_a.descriptors();
    let des_b = frame_b.descriptors();

    let mut idx1 = Vec::new();
    let mut idx2 = Vec::new();
    let mut used1: HashSet<usize> = HashSet::new();
    let mut used2: HashSet<usize> = HashSet::new();
    let mut n_neighbor_pairs = 0usize;

    for (i, da) in des_a.iter().enumerate() {
        // Two nearest neighbors of da among frame B, by brute force.
        let mut best = u32::MAX;
        let mut second = u32::MAX;
        let mut best_j = None;
        for (j, db) in des_b.iter().enumerate() {
            let d = da.distance(db);
            if d < best {
                second = best;
                best = d;
                best_j = Some(j);
            } else if d < second {
                second = d;
            }
        }

        // The ratio test needs a genuine second neighbor; a frame with a
        // single descriptor never yields a candidate.
        let Some(j) = best_j else { continue };
        if second == u32::MAX {
            continue;
        }
        n_neighbor_pairs += 1;

        if (best as f32) < NN_RATIO * (second as f32) && best < TH_DIST {
            // Keep each index on each side at most once. Survivors are
            // taken in frame-A iteration order, not best-distance order;
            // sorting by distance first would prefer the best mutual
            // match, but the counts involved don't warrant it.
            if !used1.contains(&i) && !used2.contains(&j) {
                used1.insert(i);
                used2.insert(j);
                idx1.push(i);
                idx2.push(j);
            }
        }
    }

    // A duplicate here means the exclusivity bookkeeping is broken.
    assert_eq!(
        idx1.iter().collect::<HashSet<_>>().len(),
        idx1.len(),
        "duplicate frame-A index in accepted matches"
    );
    assert_eq!(
        idx2.iter().collect::<HashSet<_>>().len(),
        idx2.len(),
        "duplicate frame-B index in accepted matches"
    );

    if idx1.len() < MIN_MATCHES {
        return Err(MatchError::InsufficientMatches { found: idx1.len() });
    }

    Ok(CandidateMatches {
        idx1,
        idx2,
        n_neighbor_pairs,
    })
}
