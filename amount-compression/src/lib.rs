//! Amount compression simulator.
//!
//! Estimates, without producing a bitstream, how many bits a three-tier
//! scheme would spend encoding every output amount of a chain:
//!
//! | Tier      | Fires when                                    | Cost                                        |
//! |-----------|-----------------------------------------------|---------------------------------------------|
//! | Celebrity | amount has a dedicated Huffman code           | celebrity code                              |
//! | Cluster   | residual to the epoch's nearest peak is coded | escape + 3-bit peak + exponent + residual   |
//! | Literal   | anything else                                 | escapes + magnitude code + `bitlen − 1` raw |
//!
//! ## Pipeline
//!
//! 1. [`histogram`]: exact frequency histogram; the top entries become
//!    celebrities.
//! 2. [`sampler`]: celebrity/literal split, magnitude and exponent
//!    histograms, per-epoch training pools.
//! 3. [`kmeans`]: cyclic K-Means over [`phase`]s, one peak set per epoch.
//! 4. [`codes`]: residual, exponent and magnitude tables.
//! 5. [`simulator`]: every amount routed through the tiers.
//!
//! [`pipeline::Pipeline`] runs all of it over any chain that implements
//! [`BlockIndex`] and [`AmountSource`].
//!
//! ## Phases
//!
//! The phase of an amount is `frac(log10(amount))`. Round numbers pile up
//! at a few phases (1, 2.5, 5, ...) regardless of magnitude, which is what
//! the cluster tier exploits.

pub mod chain;
pub mod codes;
pub mod config;
pub mod error;
pub mod histogram;
pub mod kmeans;
pub mod layout;
pub mod phase;
pub mod pipeline;
pub mod progress;
pub mod sampler;
pub mod simulator;
pub mod stats;
pub mod synthetic;

mod worker;

pub use chain::{AmountSource, BlockIndex, FlatFileChain, InMemoryChain};
pub use codes::{CodeLengthBuilder, CodeTable, CodeTables, HuffmanCodeBuilder, Symbol};
pub use config::SimConfig;
pub use error::{ChainError, ConfigError, Error, Result, SimulationError};
pub use histogram::{frequency_histogram, FrequencyEntry, ShardedHistogram};
pub use kmeans::{ClusterVariant, ClusteringParams, PeakResidual, PeakSet};
pub use layout::BlockLayout;
pub use phase::{circular_mean, cyclic_distance, phase_of, Harmonic};
pub use pipeline::{CompressionReport, Pipeline};
pub use progress::{LogProgress, NoProgress, ProgressReporter};
pub use sampler::{sample_amounts, AmountSample};
pub use simulator::{simulate, SimulationOutcome, Tier};
pub use stats::{CompressionStats, PeakStrength};
pub use worker::worker_count;
