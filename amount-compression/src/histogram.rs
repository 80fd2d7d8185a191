//! Exact frequency histogram over the whole amount array.
//!
//! Keys are sharded by their low byte into [`SHARDS`] maps, each behind its
//! own lock, so parallel producers only ever contend on one shard at a time.

use std::collections::HashMap;
use std::thread;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Number of independently locked shards.
pub const SHARDS: usize = 256;

/// One distinct amount and how often it occurs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FrequencyEntry {
    pub amount: i64,
    pub count: u64,
}

/// Concurrent exact-count histogram.
pub struct ShardedHistogram {
    shards: Vec<Mutex<HashMap<i64, u64>>>,
}

impl Default for ShardedHistogram {
    fn default() -> Self {
        Self::new()
    }
}

impl ShardedHistogram {
    pub fn new() -> Self {
        Self {
            shards: (0..SHARDS).map(|_| Mutex::new(HashMap::new())).collect(),
        }
    }

    fn shard_of(amount: i64) -> usize {
        (amount & 0xFF) as usize
    }

    /// Count one occurrence of `amount`.
    pub fn add(&self, amount: i64) {
        *self.shards[Self::shard_of(amount)]
            .lock()
            .entry(amount)
            .or_insert(0) += 1;
    }

    /// Count a run of amounts, taking each shard lock once per amount.
    pub fn add_all(&self, amounts: &[i64]) {
        for &amount in amounts {
            self.add(amount);
        }
    }

    /// Number of distinct amounts seen so far.
    pub fn distinct(&self) -> usize {
        self.shards.iter().map(|s| s.lock().len()).sum()
    }

    /// Flatten every shard into one list, most frequent first.
    ///
    /// Equal counts are ordered by ascending amount.
    pub fn merge_and_sort(self) -> Vec<FrequencyEntry> {
        let mut entries: Vec<FrequencyEntry> = self
            .shards
            .into_iter()
            .flat_map(|shard| shard.into_inner())
            .map(|(amount, count)| FrequencyEntry { amount, count })
            .collect();
        entries.sort_unstable_by(|a, b| b.count.cmp(&a.count).then(a.amount.cmp(&b.amount)));
        entries
    }
}

/// Histogram `amounts` across `workers` threads, each taking a contiguous
/// slice of the array.
pub fn frequency_histogram(amounts: &[i64], workers: usize) -> Vec<FrequencyEntry> {
    let histogram = ShardedHistogram::new();
    let workers = workers.max(1);
    let chunk = amounts.len().div_ceil(workers).max(1);

    thread::scope(|scope| {
        for slice in amounts.chunks(chunk) {
            let histogram = &histogram;
            scope.spawn(move || histogram.add_all(slice));
        }
    });

    debug!(
        amounts = amounts.len(),
        distinct = histogram.distinct(),
        "Histogram complete"
    );
    histogram.merge_and_sort()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    fn reference(amounts: &[i64]) -> Vec<FrequencyEntry> {
        let mut counts: HashMap<i64, u64> = HashMap::new();
        for &a in amounts {
            *counts.entry(a).or_default() += 1;
        }
        let mut entries: Vec<_> = counts
            .into_iter()
            .map(|(amount, count)| FrequencyEntry { amount, count })
            .collect();
        entries.sort_unstable_by(|a, b| b.count.cmp(&a.count).then(a.amount.cmp(&b.amount)));
        entries
    }

    #[test]
    fn test_matches_single_threaded_reference() {
        let mut rng = StdRng::seed_from_u64(9);
        let amounts: Vec<i64> = (0..50_000)
            .map(|_| match rng.gen_range(0..4) {
                0 => 0,
                1 => 100_000_000,
                2 => -rng.gen_range(1..300i64),
                _ => rng.gen_range(0..5_000i64) << 4,
            })
            .collect();

        for workers in [1, 3, 8] {
            let entries = frequency_histogram(&amounts, workers);
            assert_eq!(entries, reference(&amounts), "workers = {workers}");
            let total: u64 = entries.iter().map(|e| e.count).sum();
            assert_eq!(total, amounts.len() as u64);
        }
    }

    #[test]
    fn test_sorted_descending_with_ties_by_amount() {
        let amounts = [7, 5, 5, 9, 9, 9, 6, 7];
        let entries = frequency_histogram(&amounts, 2);
        let pairs: Vec<(i64, u64)> = entries.iter().map(|e| (e.amount, e.count)).collect();
        assert_eq!(pairs, vec![(9, 3), (5, 2), (7, 2), (6, 1)]);
    }

    #[test]
    fn test_negative_amounts_share_low_byte_shards() {
        // -1 and 255 have the same low byte but are distinct keys
        let histogram = ShardedHistogram::new();
        histogram.add(-1);
        histogram.add(255);
        histogram.add(255);
        assert_eq!(histogram.distinct(), 2);
        let entries = histogram.merge_and_sort();
        assert_eq!(entries[0], FrequencyEntry { amount: 255, count: 2 });
        assert_eq!(entries[1], FrequencyEntry { amount: -1, count: 1 });
    }

    #[test]
    fn test_empty_input() {
        assert!(frequency_histogram(&[], 4).is_empty());
    }
}
