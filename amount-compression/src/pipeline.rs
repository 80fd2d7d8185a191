//! End-to-end run: histogram, tables, sampling, clustering, simulation.

use std::time::Instant;

use rand::Rng;
use serde::Serialize;
use tracing::info;

use crate::chain::{AmountSource, BlockIndex};
use crate::codes::{
    celebrity_table, exponent_table, magnitude_table, residual_table, CodeLengthBuilder,
    CodeTables, HuffmanCodeBuilder, ResidualCoverage,
};
use crate::config::SimConfig;
use crate::error::Result;
use crate::histogram::frequency_histogram;
use crate::kmeans::{parallel_epoch_peaks, ClusterVariant};
use crate::layout::BlockLayout;
use crate::progress::{LogProgress, ProgressReporter};
use crate::sampler::sample_amounts;
use crate::simulator::simulate;
use crate::stats::{CompressionStats, PeakStrength};
use crate::worker::worker_count;

/// Bits per amount when stored uncompressed.
pub const RAW_AMOUNT_BITS: u64 = 64;

/// Summary of one pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompressionReport {
    pub amounts: u64,
    pub blocks: usize,
    pub epochs: usize,
    pub epochs_with_peaks: usize,
    pub variant: ClusterVariant,
    pub stats: CompressionStats,
    pub training_samples: usize,
    pub residual_coverage: ResidualCoverage,
    pub celebrity_codes: usize,
    pub residual_codes: usize,
    pub celebrity_escape_length: u32,
    pub exponent_escape_length: u32,
    pub bits_per_amount: f64,
    /// Uncompressed size over simulated size.
    pub compression_ratio: f64,
    pub peak_strengths: Vec<PeakStrength>,
}

impl CompressionReport {
    /// Percentage of amounts that landed in a tier with `hits` hits.
    pub fn share(&self, hits: u64) -> f64 {
        if self.amounts == 0 {
            0.0
        } else {
            hits as f64 / self.amounts as f64 * 100.0
        }
    }

    pub fn raw_bits(&self) -> u64 {
        self.amounts * RAW_AMOUNT_BITS
    }
}

/// Pipeline driver. Defaults to Huffman code lengths, `tracing` progress
/// and the standard worker count.
pub struct Pipeline<'a> {
    config: &'a SimConfig,
    builder: &'a dyn CodeLengthBuilder,
    progress: &'a dyn ProgressReporter,
    workers: usize,
}

impl<'a> Pipeline<'a> {
    pub fn new(config: &'a SimConfig) -> Self {
        Self {
            config,
            builder: &HuffmanCodeBuilder,
            progress: &LogProgress,
            workers: worker_count(),
        }
    }

    pub fn with_builder(mut self, builder: &'a dyn CodeLengthBuilder) -> Self {
        self.builder = builder;
        self
    }

    pub fn with_progress(mut self, progress: &'a dyn ProgressReporter) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Load everything from the chain collaborators, then run.
    pub fn run_chain<C, R>(&self, chain: &C, rng: &mut R) -> Result<CompressionReport>
    where
        C: AmountSource + BlockIndex,
        R: Rng + ?Sized,
    {
        let amounts = chain.load_amounts()?;
        let layout = BlockLayout::from_index(chain, amounts.len(), self.config.blocks_per_epoch)?;
        self.run_layout(&amounts, &layout, rng)
    }

    /// Run over an amount array and its block offsets.
    pub fn run<R: Rng + ?Sized>(
        &self,
        amounts: &[i64],
        block_offsets: &[i64],
        rng: &mut R,
    ) -> Result<CompressionReport> {
        let layout =
            BlockLayout::from_offsets(block_offsets, amounts.len(), self.config.blocks_per_epoch)?;
        self.run_layout(amounts, &layout, rng)
    }

    fn run_layout<R: Rng + ?Sized>(
        &self,
        amounts: &[i64],
        layout: &BlockLayout,
        rng: &mut R,
    ) -> Result<CompressionReport> {
        self.config.validate()?;
        let started = Instant::now();
        info!(
            amounts = amounts.len(),
            blocks = layout.block_count(),
            epochs = layout.epoch_count(),
            workers = self.workers,
            "Starting compression simulation"
        );

        self.progress.stage("histogram");
        let entries = frequency_histogram(amounts, self.workers);
        let (celebrity, celebrity_escape_length) =
            celebrity_table(&entries, self.config.celebrity_count, self.builder);
        drop(entries);

        self.progress.stage("sampling");
        let sample = sample_amounts(
            amounts,
            layout,
            &celebrity,
            self.config.max_base10_exponent,
            self.workers,
        );

        self.progress.stage("clustering");
        let params = self.config.clustering_params();
        let peaks = parallel_epoch_peaks(&sample.epoch_samples, &params, rng, self.progress)?;
        let epochs_with_peaks = peaks.iter().filter(|p| p.is_some()).count();
        info!(epochs_with_peaks, epochs = peaks.len(), "Clustering complete");

        self.progress.stage("tables");
        let (residual, residual_coverage) = residual_table(
            &sample.epoch_samples,
            &peaks,
            self.config.residual_count,
            self.builder,
        );
        let (exponent, exponent_escape_length) = exponent_table(
            &sample.exponents,
            sample.stats.literal_hits,
            residual_coverage,
            self.builder,
        );
        let tables = CodeTables {
            magnitude: magnitude_table(&sample.magnitudes, self.builder),
            celebrity,
            exponent,
            residual,
            celebrity_escape_length,
            exponent_escape_length,
        };

        self.progress.stage("simulation");
        let outcome = simulate(amounts, layout, &tables, &peaks, self.workers)?;

        let stats = outcome.stats;
        let amounts_total = stats.amounts();
        let compression_ratio = match stats.total_bits {
            0 => 0.0,
            bits => (amounts_total * RAW_AMOUNT_BITS) as f64 / bits as f64,
        };
        let report = CompressionReport {
            amounts: amounts_total,
            blocks: layout.block_count(),
            epochs: layout.epoch_count(),
            epochs_with_peaks,
            variant: params.variant,
            stats,
            training_samples: sample.sample_count(),
            residual_coverage,
            celebrity_codes: tables.celebrity.len(),
            residual_codes: tables.residual.len(),
            celebrity_escape_length,
            exponent_escape_length,
            bits_per_amount: stats.bits_per_amount(),
            compression_ratio,
            peak_strengths: outcome.peak_strengths,
        };

        info!(
            bits_per_amount = report.bits_per_amount,
            ratio = report.compression_ratio,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Compression simulation finished"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::InMemoryChain;
    use crate::progress::NoProgress;
    use rand::{rngs::StdRng, SeedableRng};

    fn small_config() -> SimConfig {
        SimConfig {
            blocks_per_epoch: 2,
            celebrity_count: 1,
            residual_count: 16,
            seed: Some(1),
            ..SimConfig::default()
        }
    }

    #[test]
    fn test_small_chain_tiers() {
        let chain = InMemoryChain::from_blocks([vec![0, 0, 0], vec![5, 5, 100]]);
        let config = small_config();
        let report = Pipeline::new(&config)
            .with_progress(&NoProgress)
            .with_workers(2)
            .run(&chain.amounts, &chain.block_offsets, &mut StdRng::seed_from_u64(1))
            .unwrap();

        assert_eq!(report.amounts, 6);
        assert_eq!(report.stats.celebrity_hits, 3);
        assert_eq!(report.stats.cluster_hits + report.stats.literal_hits, 3);
        // Three literals are below the degenerate-population threshold
        assert_eq!(report.epochs_with_peaks, 0);
        assert_eq!(report.stats.literal_hits, 3);
        assert_eq!(report.peak_strengths.len(), 2);
    }

    #[test]
    fn test_rejects_invalid_config() {
        let config = SimConfig {
            peaks_per_epoch: 9,
            ..SimConfig::default()
        };
        let result = Pipeline::new(&config).run(&[1], &[0], &mut StdRng::seed_from_u64(0));
        assert!(matches!(result, Err(crate::error::Error::Config(_))));
    }

    #[test]
    fn test_report_share() {
        let chain = InMemoryChain::from_blocks([vec![0, 0, 0, 9]]);
        let config = small_config();
        let report = Pipeline::new(&config)
            .with_progress(&NoProgress)
            .run_chain(&chain, &mut StdRng::seed_from_u64(0))
            .unwrap();
        assert_eq!(report.raw_bits(), 4 * 64);
        assert!((report.share(report.stats.celebrity_hits) - 75.0).abs() < 1e-9);
    }
}
