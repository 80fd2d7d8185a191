//! Second pass: route every amount through the three-tier scheme.
//!
//! Tiers are tried in order and the first match wins:
//! 1. celebrity: exact hit in the celebrity table;
//! 2. cluster: the amount's residual against its epoch's nearest peak has
//!    a residual code;
//! 3. literal: magnitude code plus the amount's bits below the leading one.

use tracing::info;

use crate::codes::CodeTables;
use crate::error::SimulationError;
use crate::kmeans::{PeakSet, MAX_PEAKS};
use crate::layout::BlockLayout;
use crate::sampler::bit_length;
use crate::stats::{merge_peak_strengths, CompressionStats, PeakStrength};
use crate::worker::for_each_block;

/// Fixed cost of a peak index, whatever the epoch's actual peak count.
pub const PEAK_INDEX_BITS: u64 = 3;

/// Which tier an amount was coded in, and what it cost.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Tier {
    Celebrity { bits: u64 },
    Cluster { bits: u64, peak: usize },
    Literal { bits: u64 },
}

impl Tier {
    pub fn bits(&self) -> u64 {
        match *self {
            Tier::Celebrity { bits } | Tier::Cluster { bits, .. } | Tier::Literal { bits } => bits,
        }
    }
}

/// Cost of one amount.
///
/// `peaks` is the amount's epoch peak set, if it has one. `epoch` is only
/// used for error reporting.
pub fn classify(
    amount: i64,
    peaks: Option<&PeakSet>,
    tables: &CodeTables,
    epoch: usize,
) -> Result<Tier, SimulationError> {
    if let Some(bits) = tables.celebrity.length(amount) {
        return Ok(Tier::Celebrity { bits: bits.into() });
    }

    let mut bits = u64::from(tables.celebrity_escape_length);

    if let Some(r) = peaks.and_then(|p| p.residual(amount)) {
        if let Some(residual_bits) = tables.residual.length(r.residual) {
            // Peak indices past the fixed-width range cannot be signalled
            if r.peak < MAX_PEAKS {
                let exponent_bits = tables.exponent.length(r.exponent.into()).ok_or(
                    SimulationError::MissingExponentCode {
                        exponent: r.exponent,
                        epoch,
                    },
                )?;
                bits += PEAK_INDEX_BITS + u64::from(exponent_bits) + u64::from(residual_bits);
                return Ok(Tier::Cluster { bits, peak: r.peak });
            }
        }
    }

    let magnitude = bit_length(amount);
    let magnitude_bits = tables
        .magnitude
        .length(magnitude.into())
        .ok_or(SimulationError::MissingMagnitudeCode { magnitude })?;
    // The leading one bit of a non-zero amount is implied
    bits += u64::from(tables.exponent_escape_length)
        + u64::from(magnitude_bits)
        + u64::from(magnitude.saturating_sub(1));
    Ok(Tier::Literal { bits })
}

/// Totals of a simulation pass.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SimulationOutcome {
    pub stats: CompressionStats,
    /// Peak usage per epoch.
    pub peak_strengths: Vec<PeakStrength>,
}

struct WorkerTally {
    stats: CompressionStats,
    peak_strengths: Vec<PeakStrength>,
}

/// Simulate coding every amount.
///
/// `peaks` holds one entry per epoch of `layout`. The first inconsistency
/// in the tables aborts the whole pass.
pub fn simulate(
    amounts: &[i64],
    layout: &BlockLayout,
    tables: &CodeTables,
    peaks: &[Option<PeakSet>],
    workers: usize,
) -> Result<SimulationOutcome, SimulationError> {
    debug_assert_eq!(layout.amount_count(), amounts.len());
    let epochs = layout.epoch_count();

    let tallies = for_each_block(
        layout.block_count(),
        workers,
        || WorkerTally {
            stats: CompressionStats::default(),
            peak_strengths: vec![[0; MAX_PEAKS]; epochs],
        },
        |local: &mut WorkerTally, height| -> Result<(), SimulationError> {
            let epoch = layout.epoch_of(height);
            let epoch_peaks = peaks.get(epoch).and_then(Option::as_ref);
            for &amount in &amounts[layout.amount_range(height)] {
                let tier = classify(amount, epoch_peaks, tables, epoch)?;
                local.stats.total_bits += tier.bits();
                match tier {
                    Tier::Celebrity { .. } => local.stats.celebrity_hits += 1,
                    Tier::Cluster { peak, .. } => {
                        local.stats.cluster_hits += 1;
                        local.peak_strengths[epoch][peak] += 1;
                    }
                    Tier::Literal { .. } => local.stats.literal_hits += 1,
                }
            }
            Ok(())
        },
    )?;

    let mut outcome = SimulationOutcome {
        stats: CompressionStats::default(),
        peak_strengths: vec![[0; MAX_PEAKS]; epochs],
    };
    for tally in tallies {
        outcome.stats.merge(&tally.stats);
        merge_peak_strengths(&mut outcome.peak_strengths, &tally.peak_strengths);
    }

    info!(
        total_bits = outcome.stats.total_bits,
        celebrity_hits = outcome.stats.celebrity_hits,
        cluster_hits = outcome.stats.cluster_hits,
        literal_hits = outcome.stats.literal_hits,
        "Simulation pass complete"
    );
    Ok(outcome)
}
