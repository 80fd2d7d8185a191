//! First pass: celebrity/literal classification and training samples.
//!
//! Every amount is either a celebrity (exact hit in the celebrity table)
//! or a literal. Literals feed the magnitude and exponent histograms, and a
//! thinned subset of them becomes the epoch's K-Means training pool.

use std::convert::Infallible;

use tracing::{debug, info};

use crate::codes::CodeTable;
use crate::layout::BlockLayout;
use crate::phase::decompose;
use crate::stats::CompressionStats;
use crate::worker::for_each_block;

/// Every literal of a block up to this ordinal is sampled.
pub const SAMPLE_HEAD: usize = 100;

/// Past the head, every this-many'th literal of a block is sampled.
pub const SAMPLE_STRIDE: usize = 20;

/// Initial capacity of each worker's per-epoch sample slab.
pub const SLAB_CAPACITY: usize = 5_000;

/// Bit lengths 0 through 64.
pub const MAGNITUDE_BUCKETS: usize = 65;

/// Number of significant bits of `amount` read as an unsigned word.
///
/// Zero has bit length 0 and every negative amount has bit length 64.
pub fn bit_length(amount: i64) -> u32 {
    u64::BITS - (amount as u64).leading_zeros()
}

/// Whether the `ordinal`-th literal of a block joins the training pool.
pub fn is_sampled(ordinal: usize) -> bool {
    ordinal < SAMPLE_HEAD || ordinal % SAMPLE_STRIDE == 0
}

/// Output of the sampling pass.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AmountSample {
    /// Celebrity and literal hit counts. No bits are tallied here.
    pub stats: CompressionStats,
    /// Training pool per epoch, sorted ascending.
    pub epoch_samples: Vec<Vec<i64>>,
    /// Positive literals by bit length.
    pub magnitudes: [u64; MAGNITUDE_BUCKETS],
    /// Positive literals by decimal exponent, `0..max_base10_exponent`.
    pub exponents: Vec<u64>,
}

impl AmountSample {
    fn empty(epochs: usize, max_base10_exponent: usize, slab_capacity: usize) -> Self {
        Self {
            stats: CompressionStats::default(),
            epoch_samples: (0..epochs).map(|_| Vec::with_capacity(slab_capacity)).collect(),
            magnitudes: [0; MAGNITUDE_BUCKETS],
            exponents: vec![0; max_base10_exponent],
        }
    }

    pub fn sample_count(&self) -> usize {
        self.epoch_samples.iter().map(Vec::len).sum()
    }

    fn observe_literal(&mut self, amount: i64) {
        self.stats.literal_hits += 1;
        if let Some((exponent, _)) = decompose(amount) {
            self.magnitudes[bit_length(amount) as usize] += 1;
            if let Some(slot) = usize::try_from(exponent)
                .ok()
                .and_then(|e| self.exponents.get_mut(e))
            {
                *slot += 1;
            }
        }
    }

    fn absorb(&mut self, other: AmountSample) {
        self.stats.merge(&other.stats);
        for (dst, src) in self.magnitudes.iter_mut().zip(other.magnitudes) {
            *dst += src;
        }
        for (dst, src) in self.exponents.iter_mut().zip(other.exponents) {
            *dst += src;
        }
        for (dst, mut src) in self.epoch_samples.iter_mut().zip(other.epoch_samples) {
            dst.append(&mut src);
        }
    }
}

/// Classify every amount and collect training samples.
///
/// `layout` must have been built for `amounts`. Each epoch's pool is sorted
/// after the reduction so its contents do not depend on which worker
/// handled which block.
pub fn sample_amounts(
    amounts: &[i64],
    layout: &BlockLayout,
    celebrities: &CodeTable,
    max_base10_exponent: usize,
    workers: usize,
) -> AmountSample {
    debug_assert_eq!(layout.amount_count(), amounts.len());
    let epochs = layout.epoch_count();

    let states = for_each_block(
        layout.block_count(),
        workers,
        || AmountSample::empty(epochs, max_base10_exponent, SLAB_CAPACITY),
        |local, height| -> Result<(), Infallible> {
            let epoch = layout.epoch_of(height);
            let mut ordinal = 0;
            for &amount in &amounts[layout.amount_range(height)] {
                if celebrities.contains(amount) {
                    local.stats.celebrity_hits += 1;
                    continue;
                }
                local.observe_literal(amount);
                if is_sampled(ordinal) {
                    local.epoch_samples[epoch].push(amount);
                }
                ordinal += 1;
            }
            Ok(())
        },
    );
    let states = match states {
        Ok(states) => states,
        Err(never) => match never {},
    };

    let mut total = AmountSample::empty(epochs, max_base10_exponent, 0);
    for state in states {
        total.absorb(state);
    }
    for pool in &mut total.epoch_samples {
        pool.sort_unstable();
    }

    info!(
        celebrity_hits = total.stats.celebrity_hits,
        literal_hits = total.stats.literal_hits,
        samples = total.sample_count(),
        "Sampling pass complete"
    );
    debug!(epochs, "Epoch pools reduced");
    total
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::InMemoryChain;

    fn layout_for(chain: &InMemoryChain, blocks_per_epoch: usize) -> BlockLayout {
        BlockLayout::from_offsets(&chain.block_offsets, chain.amounts.len(), blocks_per_epoch)
            .unwrap()
    }

    #[test]
    fn test_bit_length() {
        assert_eq!(bit_length(0), 0);
        assert_eq!(bit_length(1), 1);
        assert_eq!(bit_length(5), 3);
        assert_eq!(bit_length(255), 8);
        assert_eq!(bit_length(256), 9);
        assert_eq!(bit_length(i64::MAX), 63);
        assert_eq!(bit_length(-1), 64);
        assert_eq!(bit_length(i64::MIN), 64);
    }

    #[test]
    fn test_sampling_policy() {
        assert!((0..100).all(is_sampled));
        assert!(!is_sampled(101));
        assert!(is_sampled(120));
        assert!(!is_sampled(139));
        assert!(is_sampled(140));
    }

    #[test]
    fn test_celebrities_and_literals_are_counted() {
        let chain = InMemoryChain::from_blocks([vec![0, 0, 5, -3], vec![0, 100, 1_000]]);
        let layout = layout_for(&chain, 1);
        let celebrities: CodeTable = [(0, 2)].into_iter().collect();

        let sample = sample_amounts(&chain.amounts, &layout, &celebrities, 19, 2);
        assert_eq!(sample.stats.celebrity_hits, 3);
        assert_eq!(sample.stats.literal_hits, 4);
        assert_eq!(sample.stats.total_bits, 0);

        // Negative literals are pooled but absent from both histograms
        assert_eq!(sample.epoch_samples[0], vec![-3, 5]);
        assert_eq!(sample.epoch_samples[1], vec![100, 1_000]);
        assert_eq!(sample.magnitudes.iter().sum::<u64>(), 3);
        assert_eq!(sample.magnitudes[3], 1);
        assert_eq!(sample.exponents[0], 1);
        assert_eq!(sample.exponents[2], 1);
        assert_eq!(sample.exponents[3], 1);
    }

    #[test]
    fn test_large_block_is_thinned() {
        let block: Vec<i64> = (1..=1_000).collect();
        let chain = InMemoryChain::from_blocks([block]);
        let layout = layout_for(&chain, 10);

        let sample = sample_amounts(&chain.amounts, &layout, &CodeTable::new(), 19, 3);
        // Ordinals 0..100 plus 100, 120, ..., 980
        assert_eq!(sample.epoch_samples[0].len(), 100 + 45);
        assert_eq!(sample.stats.literal_hits, 1_000);
    }

    #[test]
    fn test_exponent_cap_only_affects_histogram() {
        let chain = InMemoryChain::from_blocks([vec![5, 50_000, 7_000_000]]);
        let layout = layout_for(&chain, 1);
        let sample = sample_amounts(&chain.amounts, &layout, &CodeTable::new(), 3, 1);
        assert_eq!(sample.exponents, vec![1, 0, 0]);
        assert_eq!(sample.stats.literal_hits, 3);
        assert_eq!(sample.sample_count(), 3);
    }

    #[test]
    fn test_result_independent_of_worker_count() {
        let blocks: Vec<Vec<i64>> = (0..57)
            .map(|b| (0..(b * 13 % 250)).map(|i| (i * 7 + b) as i64).collect())
            .collect();
        let chain = InMemoryChain::from_blocks(&blocks);
        let layout = layout_for(&chain, 10);
        let celebrities: CodeTable = [(7, 1), (14, 2)].into_iter().collect();

        let one = sample_amounts(&chain.amounts, &layout, &celebrities, 19, 1);
        let many = sample_amounts(&chain.amounts, &layout, &celebrities, 19, 6);
        assert_eq!(one, many);
        assert_eq!(one.epoch_samples.len(), 57 / 10 + 1);
    }
}
