//! Cyclic K-Means over amount phases.
//!
//! Each epoch's literal amounts are mapped onto the phase circle and
//! clustered into at most [`MAX_PEAKS`] peaks. The procedure is heuristic:
//! random initialisation from the population, a fixed [`ITERATIONS`]
//! assignment/update rounds with no convergence check, repeated
//! [`RESTARTS`] times keeping the run with the lowest badness.
//!
//! The harmonic variant treats the 2× and 5× images of a centroid as the
//! same peak. A point matched against an image is rotated back onto the 1×
//! base before it contributes to the centroid update.

use std::sync::atomic::{AtomicUsize, Ordering};

use rand::{rngs::StdRng, Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;
use crate::phase::{
    cyclic_distance, decompose, harmonic_distance, normalize_to_fundamental, phase_of, Harmonic,
    PhaseAccumulator,
};
use crate::progress::ProgressReporter;

/// Assignment/update rounds per run.
pub const ITERATIONS: usize = 10;

/// Independent runs per epoch; the lowest-badness run wins.
pub const RESTARTS: usize = 5;

/// Epochs with fewer usable samples than this get no peak set.
pub const MIN_EPOCH_SAMPLES: usize = 7;

/// Upper bound on peaks per epoch. The simulator spends 3 bits per peak index.
pub const MAX_PEAKS: usize = 7;

/// Distance model used for assignment.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClusterVariant {
    /// Plain cyclic distance.
    #[default]
    Plain,
    /// 1-2-5 harmonic-aware distance with normalisation.
    Harmonic,
}

/// Parameters for clustering one epoch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClusteringParams {
    /// Target number of peaks (K).
    pub peaks: usize,
    pub variant: ClusterVariant,
    /// Degenerate-population threshold.
    pub min_samples: usize,
}

impl Default for ClusteringParams {
    fn default() -> Self {
        Self {
            peaks: MAX_PEAKS,
            variant: ClusterVariant::Plain,
            min_samples: MIN_EPOCH_SAMPLES,
        }
    }
}

/// Result of one K-Means run.
#[derive(Clone, Debug, PartialEq)]
pub struct KMeansRun {
    pub centroids: Vec<f64>,
    /// Sum of minimum distances in the last assignment pass. Lags the final
    /// centroid update by one step.
    pub badness: f64,
}

/// Peaks found for one epoch, in the variant they were built with.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PeakSet {
    variant: ClusterVariant,
    phases: Vec<f64>,
}

/// Decomposition of an amount against its nearest peak.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PeakResidual {
    pub exponent: i32,
    pub peak: usize,
    /// `None` for the plain variant.
    pub harmonic: Option<Harmonic>,
    pub residual: i64,
}

impl PeakResidual {
    /// The amount implied by the peak, exponent and harmonic.
    pub fn implied_amount(&self, amount: i64) -> i64 {
        amount - self.residual
    }
}

impl PeakSet {
    pub fn new(variant: ClusterVariant, phases: Vec<f64>) -> Self {
        Self { variant, phases }
    }

    pub fn variant(&self) -> ClusterVariant {
        self.variant
    }

    pub fn phases(&self) -> &[f64] {
        &self.phases
    }

    pub fn len(&self) -> usize {
        self.phases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.phases.is_empty()
    }

    /// Nearest peak to `phase`, with the matching harmonic for the
    /// harmonic variant. Ties go to the lower peak index.
    pub fn nearest(&self, phase: f64) -> Option<(usize, Option<Harmonic>, f64)> {
        let mut best: Option<(usize, Option<Harmonic>, f64)> = None;
        for (idx, &peak) in self.phases.iter().enumerate() {
            let (dist, harmonic) = match self.variant {
                ClusterVariant::Plain => (cyclic_distance(phase, peak), None),
                ClusterVariant::Harmonic => {
                    let (d, h) = harmonic_distance(phase, peak);
                    (d, Some(h))
                }
            };
            if best.map_or(true, |(_, _, d)| dist < d) {
                best = Some((idx, harmonic, dist));
            }
        }
        best
    }

    /// Express `amount` as `round(10^(peak + exponent) · harmonic) + residual`.
    ///
    /// Returns `None` for non-positive amounts and empty peak sets.
    pub fn residual(&self, amount: i64) -> Option<PeakResidual> {
        let (exponent, phase) = decompose(amount)?;
        let (peak, harmonic, _) = self.nearest(phase)?;

        let multiplier = harmonic.map_or(1, Harmonic::multiplier) as f64;
        let base = 10f64.powf(self.phases[peak] + exponent as f64);
        // Float-to-int casts saturate, so the implied amount stays within 0..=i64::MAX
        let implied = (base * multiplier).round() as i64;

        Some(PeakResidual {
            exponent,
            peak,
            harmonic,
            residual: amount - implied,
        })
    }
}

/// Pick `k` centroids uniformly at random from the population.
fn initialize_centroids<R: Rng + ?Sized>(phases: &[f64], k: usize, rng: &mut R) -> Vec<f64> {
    (0..k).map(|_| phases[rng.gen_range(0..phases.len())]).collect()
}

/// A single K-Means run of [`ITERATIONS`] rounds.
///
/// `phases` must be non-empty.
pub fn run_once<R: Rng + ?Sized>(
    phases: &[f64],
    k: usize,
    variant: ClusterVariant,
    rng: &mut R,
) -> KMeansRun {
    let mut centroids = initialize_centroids(phases, k, rng);
    let mut badness = 0.0;
    let mut clusters = vec![PhaseAccumulator::default(); k];

    for _ in 0..ITERATIONS {
        clusters.iter_mut().for_each(|c| *c = PhaseAccumulator::default());
        badness = 0.0;

        for &phase in phases {
            let (best, min_dist) = match variant {
                ClusterVariant::Plain => nearest_plain(phase, &centroids),
                ClusterVariant::Harmonic => nearest_harmonic(phase, &centroids),
            };
            let member = match variant {
                ClusterVariant::Plain => phase,
                ClusterVariant::Harmonic => normalize_to_fundamental(phase, centroids[best]),
            };
            clusters[best].push(member);
            badness += min_dist;
        }

        for (centroid, cluster) in centroids.iter_mut().zip(&clusters) {
            if let Some(mean) = cluster.mean() {
                *centroid = mean;
            }
        }
    }

    if variant == ClusterVariant::Harmonic {
        // A centroid that captured nothing in the final pass is not a peak
        centroids = centroids
            .into_iter()
            .zip(&clusters)
            .filter(|(_, cluster)| !cluster.is_empty())
            .map(|(centroid, _)| centroid)
            .collect();
    }

    KMeansRun { centroids, badness }
}

fn nearest_plain(phase: f64, centroids: &[f64]) -> (usize, f64) {
    let mut best = 0;
    let mut min_dist = cyclic_distance(phase, centroids[0]);
    for (j, &c) in centroids.iter().enumerate().skip(1) {
        let d = cyclic_distance(phase, c);
        if d < min_dist {
            min_dist = d;
            best = j;
        }
    }
    (best, min_dist)
}

fn nearest_harmonic(phase: f64, centroids: &[f64]) -> (usize, f64) {
    let mut best = 0;
    let mut min_dist = f64::INFINITY;
    for (j, &c) in centroids.iter().enumerate() {
        let (d, _) = harmonic_distance(phase, c);
        if d < min_dist {
            min_dist = d;
            best = j;
        }
    }
    (best, min_dist)
}

/// Best of [`RESTARTS`] runs over a population of phases.
///
/// Returns an empty peak set for an empty population or `k == 0`; callers
/// are expected to screen out degenerate populations beforehand.
pub fn find_peaks<R: Rng + ?Sized>(
    phases: &[f64],
    k: usize,
    variant: ClusterVariant,
    rng: &mut R,
) -> PeakSet {
    if phases.is_empty() || k == 0 {
        return PeakSet::new(variant, Vec::new());
    }

    let mut best: Option<KMeansRun> = None;
    for _ in 0..RESTARTS {
        let run = run_once(phases, k, variant, rng);
        if best.as_ref().map_or(true, |b| run.badness < b.badness) {
            best = Some(run);
        }
    }

    let centroids = best.map(|b| b.centroids).unwrap_or_default();
    PeakSet::new(variant, centroids)
}

/// Phases of the positive amounts in a sample pool.
pub fn sample_phases(amounts: &[i64]) -> Vec<f64> {
    amounts.iter().filter_map(|&a| phase_of(a)).collect()
}

/// Cluster one epoch's sampled amounts, or `None` if the population is
/// degenerate.
pub fn find_epoch_peaks<R: Rng + ?Sized>(
    amounts: &[i64],
    params: &ClusteringParams,
    rng: &mut R,
) -> Option<PeakSet> {
    let phases = sample_phases(amounts);
    if phases.len() < params.min_samples.max(1) {
        return None;
    }
    Some(find_peaks(&phases, params.peaks, params.variant, rng))
}

/// Cluster every epoch in parallel.
///
/// One seed per epoch is drawn from `rng` up front, in epoch order, so the
/// result does not depend on how epochs are scheduled across threads.
/// Concurrency is capped at the machine's available parallelism.
pub fn parallel_epoch_peaks<R: Rng + ?Sized>(
    samples: &[Vec<i64>],
    params: &ClusteringParams,
    rng: &mut R,
    progress: &dyn ProgressReporter,
) -> Result<Vec<Option<PeakSet>>> {
    let seeds: Vec<u64> = samples.iter().map(|_| rng.gen()).collect();
    let total = samples.len();
    let completed = AtomicUsize::new(0);

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(num_cpus::get().max(1))
        .thread_name(|i| format!("kmeans-{i}"))
        .build()?;

    let peaks = pool.install(|| {
        samples
            .par_iter()
            .zip(seeds.par_iter())
            .enumerate()
            .map(|(epoch, (pool_amounts, &seed))| {
                let mut epoch_rng = StdRng::seed_from_u64(seed);
                let peaks = find_epoch_peaks(pool_amounts, params, &mut epoch_rng);
                if peaks.is_none() {
                    debug!(epoch, samples = pool_amounts.len(), "Too few samples, no peaks");
                }

                let done = completed.fetch_add(1, Ordering::Relaxed) + 1;
                progress.epochs_clustered(done, total);
                peaks
            })
            .collect()
    });

    Ok(peaks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phase::LOG10_5;
    use crate::progress::NoProgress;
    use rand::rngs::StdRng;

    fn round_amounts() -> Vec<i64> {
        let mut amounts = Vec::new();
        for exp in 2..8 {
            let scale = 10i64.pow(exp);
            for _ in 0..20 {
                amounts.push(scale);
                amounts.push(3 * scale);
            }
        }
        amounts
    }

    #[test]
    fn test_plain_kmeans_finds_two_peaks() {
        let phases = sample_phases(&round_amounts());
        let mut rng = StdRng::seed_from_u64(1);
        let peaks = find_peaks(&phases, 2, ClusterVariant::Plain, &mut rng);

        assert_eq!(peaks.len(), 2);
        let log3 = 3f64.log10();
        for target in [0.0, log3] {
            let closest = peaks
                .phases()
                .iter()
                .map(|&p| cyclic_distance(p, target))
                .fold(f64::INFINITY, f64::min);
            assert!(closest < 1e-6, "no peak near {target}: {:?}", peaks.phases());
        }
    }

    #[test]
    fn test_run_once_converges_from_duplicate_start() {
        // Even when both centroids start on the same point, the second
        // assignment pass splits the population and badness reaches zero.
        let phases = vec![0.1, 0.1, 0.1, 0.4, 0.4, 0.4];
        for seed in 0..8 {
            let run = run_once(&phases, 2, ClusterVariant::Plain, &mut StdRng::seed_from_u64(seed));
            assert!(run.badness < 1e-9, "seed {seed}: {run:?}");
        }
    }

    #[test]
    fn test_harmonic_variant_merges_images() {
        // Points at a base phase and at its 2x image form a single peak,
        // whichever of the two the run was initialised from.
        let base = 0.05;
        let mut phases = vec![base; 10];
        phases.extend(vec![base + std::f64::consts::LOG10_2; 10]);

        for seed in 0..4 {
            let mut rng = StdRng::seed_from_u64(seed);
            let peaks = find_peaks(&phases, 1, ClusterVariant::Harmonic, &mut rng);
            assert_eq!(peaks.len(), 1);
            for &p in &phases {
                let (_, _, dist) = peaks.nearest(p).unwrap();
                assert!(dist < 1e-9, "seed {seed}: {p} is {dist} from {:?}", peaks.phases());
            }
        }
    }

    #[test]
    fn test_harmonic_drops_empty_clusters() {
        // Every point sits on the same phase, so duplicates of it are never chosen
        let phases = vec![0.25; 20];
        let mut rng = StdRng::seed_from_u64(5);
        let peaks = find_peaks(&phases, 4, ClusterVariant::Harmonic, &mut rng);
        assert_eq!(peaks.len(), 1);
        assert!((peaks.phases()[0] - 0.25).abs() < 1e-9);
    }

    #[test]
    fn test_residual_reconstructs_amount() {
        let peaks = PeakSet::new(ClusterVariant::Plain, vec![0.0, 3f64.log10()]);
        let r = peaks.residual(3_050).unwrap();
        assert_eq!(r.exponent, 3);
        assert_eq!(r.peak, 1);
        assert_eq!(r.harmonic, None);
        assert_eq!(r.implied_amount(3_050), 3_000);
        assert_eq!(r.residual, 50);
    }

    #[test]
    fn test_residual_harmonic_multiplier() {
        let peaks = PeakSet::new(ClusterVariant::Harmonic, vec![0.0]);
        let r = peaks.residual(499).unwrap();
        assert_eq!(r.harmonic, Some(Harmonic::Five));
        assert_eq!(r.exponent, 2);
        assert_eq!(r.residual, -1);

        // The 5x image sits at log10(5) from the base
        assert!((Harmonic::Five.offset() - LOG10_5).abs() < 1e-12);
    }

    #[test]
    fn test_residual_rejects_non_positive() {
        let peaks = PeakSet::new(ClusterVariant::Plain, vec![0.0]);
        assert_eq!(peaks.residual(0), None);
        assert_eq!(peaks.residual(-10), None);
        assert_eq!(PeakSet::new(ClusterVariant::Plain, vec![]).residual(10), None);
    }

    #[test]
    fn test_residual_extreme_amount_does_not_overflow() {
        let peaks = PeakSet::new(ClusterVariant::Harmonic, vec![0.99]);
        let r = peaks.residual(i64::MAX).unwrap();
        assert_eq!(r.implied_amount(i64::MAX) + r.residual, i64::MAX);
    }

    #[test]
    fn test_degenerate_epoch_gets_no_peaks() {
        let params = ClusteringParams::default();
        let mut rng = StdRng::seed_from_u64(0);
        assert!(find_epoch_peaks(&[1, 2, 3, 4, 5, 6], &params, &mut rng).is_none());
        // Zeros and negatives do not count towards the population
        assert!(find_epoch_peaks(&[0, 0, -1, 1, 2, 3, 4, 5, 6], &params, &mut rng).is_none());
        assert!(find_epoch_peaks(&[1, 2, 3, 4, 5, 6, 7], &params, &mut rng).is_some());
    }

    #[test]
    fn test_parallel_epoch_peaks_is_reproducible() {
        let samples = vec![round_amounts(), vec![1, 2], round_amounts(), Vec::new()];
        let params = ClusteringParams::default();

        let a = parallel_epoch_peaks(&samples, &params, &mut StdRng::seed_from_u64(42), &NoProgress)
            .unwrap();
        let b = parallel_epoch_peaks(&samples, &params, &mut StdRng::seed_from_u64(42), &NoProgress)
            .unwrap();

        assert_eq!(a, b);
        assert!(a[0].is_some());
        assert!(a[1].is_none());
        assert!(a[3].is_none());
    }
}
