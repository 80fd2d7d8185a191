//! Synthetic chains for exercising the pipeline without real chain data.
//!
//! Output amounts are a mix of:
//! - zeros;
//! - a handful of very popular exact values;
//! - round 1-2-5 denominations, sometimes shaved by a small fee;
//! - free-form log-normal amounts.
//!
//! Outputs per block follow a Poisson distribution.

use rand::Rng;
use rand_distr::{Distribution, LogNormal, Poisson};

use crate::chain::InMemoryChain;
use crate::error::ConfigError;

/// Values that dominate the celebrity table of a typical chain.
pub const POPULAR_AMOUNTS: [i64; 6] =
    [100_000_000, 50_000_000, 10_000_000, 1_000_000, 100_000, 546];

/// Largest fee shaved off a round amount.
const MAX_FEE: i64 = 250;

/// Configuration for synthetic chain generation.
#[derive(Debug, Clone)]
pub struct SyntheticConfig {
    pub blocks: usize,
    /// Mean outputs per block.
    pub outputs_per_block: f64,
    /// Fraction of outputs that are exactly zero.
    pub zero_fraction: f64,
    /// Fraction drawn from [`POPULAR_AMOUNTS`].
    pub popular_fraction: f64,
    /// Fraction that are 1-2-5 round denominations.
    pub round_fraction: f64,
    /// Fraction of round outputs with a fee taken off.
    pub fee_fraction: f64,
    /// Mean of `ln(amount)`.
    pub log_mean: f64,
    /// Standard deviation of `ln(amount)`.
    pub log_sigma: f64,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            blocks: 10_000,
            outputs_per_block: 50.0,
            zero_fraction: 0.05,
            popular_fraction: 0.15,
            round_fraction: 0.40,
            fee_fraction: 0.30,
            log_mean: 14.0, // ~1.2M base units
            log_sigma: 3.0,
        }
    }
}

/// Generator for synthetic chains.
pub struct SyntheticChain {
    config: SyntheticConfig,
    outputs: Poisson<f64>,
    magnitude: LogNormal<f64>,
}

impl SyntheticChain {
    pub fn new(config: SyntheticConfig) -> Result<Self, ConfigError> {
        let mix = config.zero_fraction + config.popular_fraction + config.round_fraction;
        if !(0.0..=1.0).contains(&mix) || !(0.0..=1.0).contains(&config.fee_fraction) {
            return Err(ConfigError::Invalid(format!(
                "output fractions must lie in 0..=1, got mix {mix} and fee {}",
                config.fee_fraction
            )));
        }
        let outputs = Poisson::new(config.outputs_per_block)
            .map_err(|e| ConfigError::Invalid(format!("outputs_per_block: {e}")))?;
        let magnitude = LogNormal::new(config.log_mean, config.log_sigma)
            .map_err(|e| ConfigError::Invalid(format!("log-normal amounts: {e}")))?;
        Ok(Self {
            config,
            outputs,
            magnitude,
        })
    }

    pub fn config(&self) -> &SyntheticConfig {
        &self.config
    }

    /// Generate a whole chain.
    pub fn generate<R: Rng>(&self, rng: &mut R) -> InMemoryChain {
        let mut chain = InMemoryChain::default();
        for _ in 0..self.config.blocks {
            chain.block_offsets.push(chain.amounts.len() as i64);
            // Poisson samples are non-negative whole numbers
            let outputs: f64 = self.outputs.sample(rng);
            for _ in 0..outputs as usize {
                chain.amounts.push(self.generate_amount(rng));
            }
        }
        chain
    }

    fn generate_amount<R: Rng>(&self, rng: &mut R) -> i64 {
        let c = &self.config;
        let r: f64 = rng.gen();
        if r < c.zero_fraction {
            0
        } else if r < c.zero_fraction + c.popular_fraction {
            POPULAR_AMOUNTS[rng.gen_range(0..POPULAR_AMOUNTS.len())]
        } else if r < c.zero_fraction + c.popular_fraction + c.round_fraction {
            let round = round_denomination(self.free_amount(rng));
            if rng.gen_bool(c.fee_fraction) {
                (round - rng.gen_range(1..=MAX_FEE)).max(1)
            } else {
                round
            }
        } else {
            self.free_amount(rng)
        }
    }

    fn free_amount<R: Rng>(&self, rng: &mut R) -> i64 {
        // Saturating cast keeps extreme tail draws inside i64
        (self.magnitude.sample(rng) as i64).max(1)
    }
}

/// Nearest 1-2-5 denomination at or below `amount` (minimum 1).
pub fn round_denomination(amount: i64) -> i64 {
    let mut best = 1i64;
    let mut decade = 1i64;
    loop {
        for step in [1, 2, 5] {
            match decade.checked_mul(step) {
                Some(d) if d <= amount => best = d,
                _ => return best,
            }
        }
        match decade.checked_mul(10) {
            Some(next) => decade = next,
            None => return best,
        }
    }
}
