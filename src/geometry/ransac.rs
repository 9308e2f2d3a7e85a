//! Generic, model-agnostic robust fitting.
//!
//! Implement [`Estimator`] for a geometric model and call [`ransac`] with
//! the data and some [`RansacOptions`]. The engine never panics: when no
//! consensus is found it returns a [`RansacResult`] with `model == None`.
//!
//! Sampling is driven by a seeded RNG, so a fixed seed makes the whole
//! fit deterministic for unchanged inputs.

use rand::prelude::IndexedRandom;
use rand::rngs::StdRng;
use rand::SeedableRng;

/// Configuration for the RANSAC engine.
#[derive(Debug, Clone)]
pub struct RansacOptions {
    /// Maximum number of sampling trials.
    pub max_trials: usize,
    /// Residual below which a datum counts as an inlier.
    pub residual_threshold: f64,
    /// Minimum consensus size required to accept a model.
    pub min_inliers: usize,
    /// Seed for the trial sampler.
    pub seed: u64,
}

/// Output of a RANSAC run.
///
/// `model` is `None` when no trial reached the required consensus; the
/// mask is all-false in that case.
#[derive(Debug, Clone)]
pub struct RansacResult<M> {
    /// Best model found, refitted on its consensus set when the estimator
    /// supports refitting.
    pub model: Option<M>,
    /// Inlier flags, index-aligned with the input data.
    pub inlier_mask: Vec<bool>,
    /// Number of `true` entries in the mask.
    pub n_inliers: usize,
}

/// Minimal-sample estimator for a geometric model.
pub trait Estimator {
    type Datum;
    type Model;

    /// Number of data points needed for a minimal fit.
    const MIN_SAMPLES: usize;

    /// Fit a model from the data at `sample`. Returns `None` when the
    /// sample is degenerate or the solve fails.
    fn fit(data: &[Self::Datum], sample: &[usize]) -> Option<Self::Model>;

    /// Non-negative residual of one datum under a model, in the same
    /// units as [`RansacOptions::residual_threshold`].
    fn residual(model: &Self::Model, datum: &Self::Datum) -> f64;

    /// Optional least-squares refit on a consensus set.
    ///
    /// Default: keep the minimal-sample model.
    fn refit(_data: &[Self::Datum], _inliers: &[usize]) -> Option<Self::Model> {
        None
    }
}

/// Run the RANSAC loop for an [`Estimator`].
pub fn ransac<E: Estimator>(data: &[E::Datum], opts: &RansacOptions) -> RansacResult<E::Model> {
    let empty = RansacResult {
        model: None,
        inlier_mask: vec![false; data.len()],
        n_inliers: 0,
    };
    if data.len() < E::MIN_SAMPLES {
        return empty;
    }

    let indices: Vec<usize> = (0..data.len()).collect();
    let mut rng = StdRng::seed_from_u64(opts.seed);

    let mut best_model: Option<E::Model> = None;
    let mut best_inliers: Vec<usize> = Vec::new();
    let mut best_score = f64::INFINITY;

    let mut sample = vec![0usize; E::MIN_SAMPLES];
    for _ in 0..opts.max_trials {
        indices
            .choose_multiple(&mut rng, E::MIN_SAMPLES)
            .enumerate()
            .for_each(|(k, &idx)| sample[k] = idx);

        let Some(model) = E::fit(data, &sample) else {
            continue;
        };

        let mut inliers = Vec::with_capacity(data.len());
        let mut residual_sum = 0.0;
        for (i, datum) in data.iter().enumerate() {
            let r = E::residual(&model, datum);
            if r <= opts.residual_threshold {
                inliers.push(i);
                residual_sum += r * r;
            }
        }

        if inliers.len() < opts.min_inliers {
            continue;
        }

        // Larger consensus wins; ties break on inlier RMS.
        let rms = (residual_sum / inliers.len() as f64).sqrt();
        let better = inliers.len() > best_inliers.len()
            || (inliers.len() == best_inliers.len() && rms < best_score);
        if better {
            best_model = Some(model);
            best_inliers = inliers;
            best_score = rms;
        }
    }

    let Some(mut model) = best_model else {
        return empty;
    };

    // One refit on the winning consensus set, re-evaluating membership so
    // the mask matches the returned model.
    if let Some(refitted) = E::refit(data, &best_inliers) {
        let inliers: Vec<usize> = data
            .iter()
            .enumerate()
            .filter(|(_, d)| E::residual(&refitted, d) <= opts.residual_threshold)
            .map(|(i, _)| i)
            .collect();
        if inliers.len() >= best_inliers.len() {
            model = refitted;
            best_inliers = inliers;
        }
    }

    let mut inlier_mask = vec![false; data.len()];
    for &i in &best_inliers {
        inlier_mask[i] = true;
    }
    RansacResult {
        model: Some(model),
        n_inliers: best_inliers.len(),
        inlier_mask,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // y = a*x + b fitted from two points, refitted by least squares.
    struct TwoPointLine;

    impl Estimator for TwoPointLine {
        type Datum = (f64, f64);
        type Model = (f64, f64);

        const MIN_SAMPLES: usize = 2;

        fn fit(data: &[Self::Datum], sample: &[usize]) -> Option<Self::Model> {
            let (x0, y0) = data[sample[0]];
            let (x1, y1) = data[sample[1]];
            let dx = x1 - x0;
            if dx.abs() < 1e-9 {
                return None;
            }
            let a = (y1 - y0) / dx;
            Some((a, y0 - a * x0))
        }

        fn residual(model: &Self::Model, datum: &Self::Datum) -> f64 {
            let (a, b) = *model;
            (a * datum.0 + b - datum.1).abs() / (a * a + 1.0).sqrt()
        }

        fn refit(data: &[Self::Datum], inliers: &[usize]) -> Option<Self::Model> {
            let n = inliers.len() as f64;
            let (mut sx, mut sy, mut sxx, mut sxy) = (0.0, 0.0, 0.0, 0.0);
            for &i in inliers {
                let (x, y) = data[i];
                sx += x;
                sy += y;
                sxx += x * x;
                sxy += x * y;
            }
            let denom = n * sxx - sx * sx;
            if denom.abs() < 1e-12 {
                return None;
            }
            let a = (n * sxy - sx * sy) / denom;
            Some((a, (sy - a * sx) / n))
        }
    }

    fn opts() -> RansacOptions {
        RansacOptions {
            max_trials: 200,
            residual_threshold: 0.05,
            min_inliers: 5,
            seed: 7,
        }
    }

    #[test]
    fn too_little_data_yields_no_model() {
        let res = ransac::<TwoPointLine>(&[(0.0, 0.0)], &opts());
        assert!(res.model.is_none());
        assert_eq!(res.n_inliers, 0);
    }

    #[test]
    fn recovers_line_despite_gross_outliers() {
        let mut data: Vec<(f64, f64)> = (0..12)
            .map(|i| {
                let x = i as f64 * 0.4;
                (x, 1.5 * x - 0.5)
            })
            .collect();
        data.push((1.0, 9.0));
        data.push((2.0, -7.0));
        data.push((3.5, 20.0));

        let res = ransac::<TwoPointLine>(&data, &opts());
        let (a, b) = res.model.expect("consensus expected");

        assert!((a - 1.5).abs() < 1e-6, "slope {a}");
        assert!((b + 0.5).abs() < 1e-6, "intercept {b}");
        assert_eq!(res.n_inliers, 12);
        assert!(!res.inlier_mask[12] && !res.inlier_mask[13] && !res.inlier_mask[14]);
    }

    #[test]
    fn mask_is_aligned_with_input() {
        let data: Vec<(f64, f64)> = (0..10).map(|i| (i as f64, i as f64)).collect();
        let res = ransac::<TwoPointLine>(&data, &opts());
        assert_eq!(res.inlier_mask.len(), data.len());
        assert_eq!(
            res.inlier_mask.iter().filter(|&&m| m).count(),
            res.n_inliers
        );
    }
}
