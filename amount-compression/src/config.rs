use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::codes::EXPONENT_CODES;
use crate::error::ConfigError;
use crate::kmeans::{ClusterVariant, ClusteringParams, MAX_PEAKS, MIN_EPOCH_SAMPLES};

/// Simulation parameters, loadable from TOML.
///
/// Every field is optional in the file; missing fields take their default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimConfig {
    /// Epoch width in blocks
    #[serde(default = "default_blocks_per_epoch")]
    pub blocks_per_epoch: usize,

    /// Exponent histogram covers `0..max_base10_exponent`.
    /// The exponent code table covers every positive `i64` regardless.
    #[serde(default = "default_max_base10_exponent")]
    pub max_base10_exponent: usize,

    /// Most frequent amounts given a dedicated code
    #[serde(default = "default_celebrity_count")]
    pub celebrity_count: usize,

    /// Most frequent residuals given a code
    #[serde(default = "default_residual_count")]
    pub residual_count: usize,

    /// Peaks per epoch (K)
    #[serde(default = "default_peaks_per_epoch")]
    pub peaks_per_epoch: usize,

    /// Epochs with fewer training samples get no peaks
    #[serde(default = "default_min_epoch_samples")]
    pub min_epoch_samples: usize,

    /// Use the 1-2-5 harmonic clustering variant
    #[serde(default)]
    pub harmonic: bool,

    /// Fixed seed for centroid initialisation. Unset means entropy-seeded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

fn default_blocks_per_epoch() -> usize {
    1000
}

fn default_max_base10_exponent() -> usize {
    EXPONENT_CODES
}

fn default_celebrity_count() -> usize {
    1000
}

fn default_residual_count() -> usize {
    4096
}

fn default_peaks_per_epoch() -> usize {
    MAX_PEAKS
}

fn default_min_epoch_samples() -> usize {
    MIN_EPOCH_SAMPLES
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            blocks_per_epoch: default_blocks_per_epoch(),
            max_base10_exponent: default_max_base10_exponent(),
            celebrity_count: default_celebrity_count(),
            residual_count: default_residual_count(),
            peaks_per_epoch: default_peaks_per_epoch(),
            min_epoch_samples: default_min_epoch_samples(),
            harmonic: false,
            seed: None,
        }
    }
}

impl SimConfig {
    /// Load and validate a config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: SimConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.blocks_per_epoch == 0 {
            return Err(ConfigError::Invalid(
                "blocks_per_epoch must be positive".into(),
            ));
        }
        if !(1..=MAX_PEAKS).contains(&self.peaks_per_epoch) {
            return Err(ConfigError::Invalid(format!(
                "peaks_per_epoch must be between 1 and {MAX_PEAKS}, got {}",
                self.peaks_per_epoch
            )));
        }
        if self.max_base10_exponent == 0 {
            return Err(ConfigError::Invalid(
                "max_base10_exponent must be positive".into(),
            ));
        }
        if self.min_epoch_samples == 0 {
            return Err(ConfigError::Invalid(
                "min_epoch_samples must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn variant(&self) -> ClusterVariant {
        if self.harmonic {
            ClusterVariant::Harmonic
        } else {
            ClusterVariant::Plain
        }
    }

    pub fn clustering_params(&self) -> ClusteringParams {
        ClusteringParams {
            peaks: self.peaks_per_epoch,
            variant: self.variant(),
            min_samples: self.min_epoch_samples,
        }
    }
}
