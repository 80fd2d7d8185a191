//! Error types for the amount compression pipeline.

use std::path::PathBuf;

use thiserror::Error;

/// Failures of the chain collaborators (amount store and block index).
#[derive(Debug, Error)]
pub enum ChainError {
    #[error("I/O error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path} has {len} bytes, which is not a whole number of 8-byte records")]
    Truncated { path: PathBuf, len: u64 },

    #[error("Chain has no blocks")]
    Empty,

    #[error("Block offset decreases at height {height}: {previous} -> {offset}")]
    NonMonotonicOffset {
        height: usize,
        previous: i64,
        offset: i64,
    },

    #[error("Block offset {offset} at height {height} is outside 0..={amounts}")]
    OffsetOutOfRange {
        height: usize,
        offset: i64,
        amounts: usize,
    },
}

/// Inconsistencies between the code tables and the amounts being simulated.
///
/// These indicate the tables were built incorrectly relative to the
/// clustering that consumes them, so the whole pass is aborted.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SimulationError {
    #[error("No exponent code for exponent {exponent} (epoch {epoch})")]
    MissingExponentCode { exponent: i32, epoch: usize },

    #[error("No magnitude code for bit length {magnitude}")]
    MissingMagnitudeCode { magnitude: u32 },
}

/// Configuration loading and validation failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Top-level error for a pipeline run.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Chain(#[from] ChainError),

    #[error(transparent)]
    Simulation(#[from] SimulationError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Failed to build thread pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
