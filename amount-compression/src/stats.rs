//! Pass accumulators.

use serde::{Deserialize, Serialize};

use crate::kmeans::MAX_PEAKS;

/// Per-epoch count of how often each peak index was used.
pub type PeakStrength = [u64; MAX_PEAKS];

/// Bit and hit tallies for one pass.
///
/// Every amount increments exactly one of the three hit counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompressionStats {
    pub total_bits: u64,
    pub celebrity_hits: u64,
    pub cluster_hits: u64,
    pub literal_hits: u64,
}

impl CompressionStats {
    /// Fold another worker's tallies into this one.
    pub fn merge(&mut self, other: &CompressionStats) {
        self.total_bits += other.total_bits;
        self.celebrity_hits += other.celebrity_hits;
        self.cluster_hits += other.cluster_hits;
        self.literal_hits += other.literal_hits;
    }

    /// Number of amounts that went through the pass.
    pub fn amounts(&self) -> u64 {
        self.celebrity_hits + self.cluster_hits + self.literal_hits
    }

    /// Average cost per amount, or 0 for an empty pass.
    pub fn bits_per_amount(&self) -> f64 {
        match self.amounts() {
            0 => 0.0,
            n => self.total_bits as f64 / n as f64,
        }
    }
}

/// Element-wise sum of per-epoch peak strengths.
pub fn merge_peak_strengths(into: &mut [PeakStrength], from: &[PeakStrength]) {
    for (dst, src) in into.iter_mut().zip(from) {
        for (d, s) in dst.iter_mut().zip(src) {
            *d += s;
        }
    }
}
