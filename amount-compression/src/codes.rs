//! Code tables and their construction.
//!
//! Only code lengths matter to the simulator, so a [`CodeTable`] is a map
//! from key to bit length. Lengths come from a [`CodeLengthBuilder`];
//! [`HuffmanCodeBuilder`] is the stock implementation.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info};

use crate::histogram::FrequencyEntry;
use crate::kmeans::PeakSet;
use crate::sampler::MAGNITUDE_BUCKETS;

/// Decimal exponents of positive `i64` values: `0..=18`.
pub const EXPONENT_CODES: usize = 19;

/// Key → code length in bits.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CodeTable {
    lengths: HashMap<i64, u32>,
}

impl CodeTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: i64, length: u32) {
        self.lengths.insert(key, length);
    }

    pub fn length(&self, key: i64) -> Option<u32> {
        self.lengths.get(&key).copied()
    }

    pub fn contains(&self, key: i64) -> bool {
        self.lengths.contains_key(&key)
    }

    pub fn len(&self) -> usize {
        self.lengths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lengths.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (i64, u32)> + '_ {
        self.lengths.iter().map(|(&k, &v)| (k, v))
    }
}

impl FromIterator<(i64, u32)> for CodeTable {
    fn from_iter<I: IntoIterator<Item = (i64, u32)>>(iter: I) -> Self {
        Self {
            lengths: iter.into_iter().collect(),
        }
    }
}

/// A symbol in a frequency table: a real key, or the table's escape code.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Symbol {
    Value(i64),
    Escape,
}

/// Turns a frequency table into code lengths.
pub trait CodeLengthBuilder {
    /// One length per input symbol. Symbols must be distinct.
    fn code_lengths(&self, frequencies: &[(Symbol, u64)]) -> HashMap<Symbol, u32>;
}

/// Classic Huffman code lengths.
///
/// Merges always take the two lightest nodes, ties broken by insertion
/// order, so equal inputs always give equal lengths. A table with a single
/// symbol gives it a 1-bit code.
#[derive(Clone, Copy, Debug, Default)]
pub struct HuffmanCodeBuilder;

impl CodeLengthBuilder for HuffmanCodeBuilder {
    fn code_lengths(&self, frequencies: &[(Symbol, u64)]) -> HashMap<Symbol, u32> {
        let leaves = frequencies.len();
        match leaves {
            0 => return HashMap::new(),
            1 => return HashMap::from([(frequencies[0].0, 1)]),
            _ => {}
        }

        // parent[i] for every node; leaves first, then internal nodes in
        // creation order, so a parent always has a larger index than its children
        let mut parent = vec![0usize; 2 * leaves - 1];
        let mut heap: BinaryHeap<Reverse<(u64, usize)>> = frequencies
            .iter()
            .enumerate()
            .map(|(i, &(_, weight))| Reverse((weight, i)))
            .collect();

        let mut next = leaves;
        while heap.len() > 1 {
            let (Some(Reverse((wa, a))), Some(Reverse((wb, b)))) = (heap.pop(), heap.pop()) else {
                break;
            };
            parent[a] = next;
            parent[b] = next;
            heap.push(Reverse((wa.saturating_add(wb), next)));
            next += 1;
        }

        let root = next - 1;
        let mut depth = vec![0u32; next];
        for node in (0..root).rev() {
            depth[node] = depth[parent[node]] + 1;
        }

        frequencies
            .iter()
            .enumerate()
            .map(|(i, &(symbol, _))| (symbol, depth[i]))
            .collect()
    }
}

/// Split builder output into a keyed table and the escape length.
fn split_escape(lengths: HashMap<Symbol, u32>) -> (CodeTable, Option<u32>) {
    let mut table = CodeTable::new();
    let mut escape = None;
    for (symbol, length) in lengths {
        match symbol {
            Symbol::Value(key) => table.insert(key, length),
            Symbol::Escape => escape = Some(length),
        }
    }
    (table, escape)
}

/// The four finalised tables plus the two escape lengths.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CodeTables {
    pub celebrity: CodeTable,
    pub exponent: CodeTable,
    pub residual: CodeTable,
    pub magnitude: CodeTable,
    /// Cost of signalling "not a celebrity".
    pub celebrity_escape_length: u32,
    /// Cost of signalling "not a cluster hit".
    pub exponent_escape_length: u32,
}

/// Celebrity table from the frequency histogram.
///
/// Takes the `count` most frequent amounts. Zero is always included when
/// it occurs at all, since literal coding relies on it never reaching the
/// literal tier. The escape symbol is weighted by every other occurrence.
pub fn celebrity_table(
    entries: &[FrequencyEntry],
    count: usize,
    builder: &dyn CodeLengthBuilder,
) -> (CodeTable, u32) {
    let mut chosen: Vec<(Symbol, u64)> = entries
        .iter()
        .take(count)
        .map(|e| (Symbol::Value(e.amount), e.count))
        .collect();
    if let Some(zero) = entries.iter().skip(count).find(|e| e.amount == 0) {
        chosen.push((Symbol::Value(0), zero.count));
    }

    let covered: u64 = chosen.iter().map(|&(_, c)| c).sum();
    let total: u64 = entries.iter().map(|e| e.count).sum();
    chosen.push((Symbol::Escape, total.saturating_sub(covered).max(1)));

    let (table, escape) = split_escape(builder.code_lengths(&chosen));
    let escape = escape.unwrap_or(0);
    info!(
        celebrities = table.len(),
        escape_bits = escape,
        "Built celebrity table"
    );
    (table, escape)
}

/// Magnitude table over all bit lengths `0..=64`, add-one smoothed so that
/// every bucket gets a code.
pub fn magnitude_table(
    magnitudes: &[u64; MAGNITUDE_BUCKETS],
    builder: &dyn CodeLengthBuilder,
) -> CodeTable {
    let frequencies: Vec<(Symbol, u64)> = magnitudes
        .iter()
        .enumerate()
        .map(|(bits, &count)| (Symbol::Value(bits as i64), count.saturating_add(1)))
        .collect();
    let (table, _) = split_escape(builder.code_lengths(&frequencies));
    table
}

/// How many training samples the residual table would have caught.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ResidualCoverage {
    pub hits: u64,
    pub misses: u64,
}

impl ResidualCoverage {
    pub fn samples(&self) -> u64 {
        self.hits + self.misses
    }
}

/// Residual table from each epoch's training pool against its own peaks.
///
/// Keeps the `count` most frequent residuals (ties towards smaller values).
/// Samples in epochs without peaks, and non-positive samples, are misses.
pub fn residual_table(
    samples: &[Vec<i64>],
    peaks: &[Option<PeakSet>],
    count: usize,
    builder: &dyn CodeLengthBuilder,
) -> (CodeTable, ResidualCoverage) {
    let (frequencies, unmatched) = samples
        .par_iter()
        .zip(peaks.par_iter())
        .map(|(pool, peaks)| {
            let mut local: HashMap<i64, u64> = HashMap::new();
            let mut unmatched = 0u64;
            for &amount in pool {
                match peaks.as_ref().and_then(|p| p.residual(amount)) {
                    Some(r) => *local.entry(r.residual).or_default() += 1,
                    None => unmatched += 1,
                }
            }
            (local, unmatched)
        })
        .reduce(
            || (HashMap::new(), 0),
            |(mut a, ua), (b, ub)| {
                for (residual, n) in b {
                    *a.entry(residual).or_default() += n;
                }
                (a, ua + ub)
            },
        );

    let mut ranked: Vec<(i64, u64)> = frequencies.into_iter().collect();
    let residual_samples: u64 = ranked.iter().map(|&(_, n)| n).sum();
    ranked.sort_unstable_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    ranked.truncate(count);

    let hits: u64 = ranked.iter().map(|&(_, n)| n).sum();
    let coverage = ResidualCoverage {
        hits,
        misses: unmatched + residual_samples - hits,
    };

    let frequencies: Vec<(Symbol, u64)> = ranked
        .into_iter()
        .map(|(residual, n)| (Symbol::Value(residual), n))
        .collect();
    let (table, _) = split_escape(builder.code_lengths(&frequencies));
    debug!(residuals = table.len(), hits, misses = coverage.misses, "Built residual table");
    (table, coverage)
}

/// Exponent table over every positive exponent `0..EXPONENT_CODES` plus the
/// "not a cluster hit" escape.
///
/// Each exponent is weighted by its literal count scaled by the expected
/// cluster hit ratio, and the escape by the literal count scaled by the
/// miss ratio. Exponents past the end of `exponents` count as zero. Every
/// exponent keeps a weight of at least 1 so that any cluster hit has a code.
pub fn exponent_table(
    exponents: &[u64],
    literal_hits: u64,
    coverage: ResidualCoverage,
    builder: &dyn CodeLengthBuilder,
) -> (CodeTable, u32) {
    let scale = |count: u64, part: u64| -> u64 {
        match coverage.samples() {
            0 => 0,
            samples => ((count as u128 * part as u128) / samples as u128) as u64,
        }
    };

    let mut frequencies: Vec<(Symbol, u64)> = (0..EXPONENT_CODES.max(exponents.len()))
        .map(|exp| {
            let count = exponents.get(exp).copied().unwrap_or(0);
            (Symbol::Value(exp as i64), scale(count, coverage.hits).max(1))
        })
        .collect();
    let escape_weight = if coverage.samples() == 0 {
        literal_hits
    } else {
        scale(literal_hits, coverage.misses)
    };
    frequencies.push((Symbol::Escape, escape_weight.max(1)));

    let (table, escape) = split_escape(builder.code_lengths(&frequencies));
    (table, escape.unwrap_or(0))
}
