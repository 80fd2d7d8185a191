//! Amount compression simulation CLI.
//!
//! Estimate the cost of the tiered amount code over a chain on disk or a
//! synthetic one.

#[cfg(feature = "cli")]
mod cli {
    use std::path::PathBuf;

    use anyhow::{Context, Result};
    use bth_amount_compression::{
        frequency_histogram,
        synthetic::{SyntheticChain, SyntheticConfig},
        worker_count, AmountSource, CompressionReport, FlatFileChain, Pipeline, ProgressReporter,
        SimConfig,
    };
    use clap::{Parser, Subcommand};
    use indicatif::{ProgressBar, ProgressStyle};
    use rand::{rngs::StdRng, SeedableRng};
    use tracing::info;

    #[derive(Parser)]
    #[command(name = "amount-compression-sim")]
    #[command(about = "Simulate tiered Huffman / phase-cluster compression of output amounts")]
    pub struct Cli {
        /// Path to a TOML config file
        #[arg(short, long, global = true)]
        config: Option<PathBuf>,

        /// Seed for centroid initialisation (overrides the config file)
        #[arg(long, global = true)]
        seed: Option<u64>,

        /// Use the 1-2-5 harmonic clustering variant
        #[arg(long, global = true)]
        harmonic: bool,

        /// Print the report as JSON
        #[arg(long, global = true)]
        json: bool,

        /// Enable verbose logging
        #[arg(short, long, global = true)]
        verbose: bool,

        #[command(subcommand)]
        command: Command,
    }

    #[derive(Subcommand)]
    enum Command {
        /// Run the full simulation over a flat-file chain
        Simulate {
            /// Directory holding amounts.bin and block_offsets.bin
            #[arg(short, long)]
            dir: PathBuf,
        },

        /// Generate a synthetic chain and simulate it
        Synthetic {
            /// Number of blocks
            #[arg(short, long, default_value = "10000")]
            blocks: usize,

            /// Mean outputs per block
            #[arg(short, long, default_value = "50")]
            outputs_per_block: f64,

            /// Also write the chain to this directory
            #[arg(long)]
            save: Option<PathBuf>,
        },

        /// Print the most frequent amounts of a flat-file chain
        Histogram {
            /// Directory holding amounts.bin and block_offsets.bin
            #[arg(short, long)]
            dir: PathBuf,

            /// Number of entries to print
            #[arg(short = 'n', long, default_value = "100")]
            top: usize,
        },
    }

    /// Epoch progress on a terminal bar.
    struct BarProgress {
        bar: ProgressBar,
    }

    impl BarProgress {
        fn new() -> Result<Self> {
            let bar = ProgressBar::new(0);
            bar.set_style(
                ProgressStyle::with_template("{msg:>10} [{bar:40}] {pos}/{len} epochs ({eta})")?
                    .progress_chars("=> "),
            );
            Ok(Self { bar })
        }
    }

    impl ProgressReporter for BarProgress {
        fn stage(&self, name: &str) {
            self.bar.set_message(name.to_string());
        }

        // Completion counts can arrive out of order
        fn epochs_clustered(&self, done: usize, total: usize) {
            if self.bar.is_finished() {
                return;
            }
            self.bar.set_length(total as u64);
            self.bar.set_position(self.bar.position().max(done as u64));
            if done == total {
                self.bar.finish_with_message("clustered");
            }
        }
    }

    pub fn run(cli: Cli) -> Result<()> {
        let level = if cli.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        };
        tracing_subscriber::fmt()
            .with_max_level(level)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();

        let mut config = match &cli.config {
            Some(path) => SimConfig::load(path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?,
            None => SimConfig::default(),
        };
        if cli.seed.is_some() {
            config.seed = cli.seed;
        }
        config.harmonic |= cli.harmonic;

        let mut rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        match cli.command {
            Command::Simulate { dir } => {
                let chain = FlatFileChain::open(&dir)
                    .with_context(|| format!("Failed to open chain in {}", dir.display()))?;
                let progress = BarProgress::new()?;
                let report = Pipeline::new(&config)
                    .with_progress(&progress)
                    .run_chain(&chain, &mut rng)
                    .context("Simulation failed")?;
                print_report(&report, cli.json)
            }
            Command::Synthetic {
                blocks,
                outputs_per_block,
                save,
            } => {
                let generator = SyntheticChain::new(SyntheticConfig {
                    blocks,
                    outputs_per_block,
                    ..Default::default()
                })?;
                let chain = generator.generate(&mut rng);
                info!(
                    blocks,
                    amounts = chain.amounts.len(),
                    "Generated synthetic chain"
                );
                if let Some(dir) = save {
                    FlatFileChain::write(&dir, &chain)
                        .with_context(|| format!("Failed to write chain to {}", dir.display()))?;
                }
                let progress = BarProgress::new()?;
                let report = Pipeline::new(&config)
                    .with_progress(&progress)
                    .run_chain(&chain, &mut rng)
                    .context("Simulation failed")?;
                print_report(&report, cli.json)
            }
            Command::Histogram { dir, top } => {
                let chain = FlatFileChain::open(&dir)
                    .with_context(|| format!("Failed to open chain in {}", dir.display()))?;
                let amounts = chain.load_amounts()?;
                let entries = frequency_histogram(&amounts, worker_count());

                if cli.json {
                    let shown = &entries[..top.min(entries.len())];
                    println!("{}", serde_json::to_string_pretty(shown)?);
                    return Ok(());
                }

                println!("Most Frequent Amounts");
                println!("=====================");
                println!(
                    "{} amounts, {} distinct\n",
                    amounts.len(),
                    entries.len()
                );
                println!("{:>6} {:>22} {:>14} {:>8}", "Rank", "Amount", "Count", "Share");
                println!("{:-<6} {:-<22} {:-<14} {:-<8}", "", "", "", "");
                for (rank, entry) in entries.iter().take(top).enumerate() {
                    println!(
                        "{:>6} {:>22} {:>14} {:>7.2}%",
                        rank + 1,
                        entry.amount,
                        entry.count,
                        entry.count as f64 / amounts.len().max(1) as f64 * 100.0
                    );
                }
                Ok(())
            }
        }
    }

    fn print_report(report: &CompressionReport, json: bool) -> Result<()> {
        if json {
            println!("{}", serde_json::to_string_pretty(report)?);
            return Ok(());
        }

        let stats = &report.stats;
        println!("Amount Compression Simulation");
        println!("=============================");
        println!(
            "{} amounts in {} blocks, {} epochs ({} with peaks, {:?} clustering)\n",
            report.amounts, report.blocks, report.epochs, report.epochs_with_peaks, report.variant
        );

        println!("{:<12} {:>14} {:>9}", "Tier", "Hits", "Share");
        println!("{:-<12} {:-<14} {:-<9}", "", "", "");
        for (tier, hits) in [
            ("Celebrity", stats.celebrity_hits),
            ("Cluster", stats.cluster_hits),
            ("Literal", stats.literal_hits),
        ] {
            println!("{:<12} {:>14} {:>8.2}%", tier, hits, report.share(hits));
        }

        println!();
        println!(
            "Celebrity codes:   {} (escape {} bits)",
            report.celebrity_codes, report.celebrity_escape_length
        );
        println!(
            "Residual codes:    {} (escape {} bits)",
            report.residual_codes, report.exponent_escape_length
        );
        println!(
            "Training samples:  {} ({} residual hits, {} misses)",
            report.training_samples, report.residual_coverage.hits, report.residual_coverage.misses
        );
        println!();
        println!("Total bits:        {}", stats.total_bits);
        println!("Raw bits:          {}", report.raw_bits());
        println!("Bits per amount:   {:.3}", report.bits_per_amount);
        println!("Compression ratio: {:.3}x", report.compression_ratio);

        let mut usage = [0u64; bth_amount_compression::kmeans::MAX_PEAKS];
        for strength in &report.peak_strengths {
            for (total, n) in usage.iter_mut().zip(strength) {
                *total += n;
            }
        }
        if stats.cluster_hits > 0 {
            println!();
            println!("{:>6} {:>14}", "Peak", "Hits");
            println!("{:-<6} {:-<14}", "", "");
            for (peak, hits) in usage.iter().enumerate() {
                println!("{:>6} {:>14}", peak, hits);
            }
        }
        Ok(())
    }

}

#[cfg(feature = "cli")]
fn main() -> anyhow::Result<()> {
    use clap::Parser;
    let cli = cli::Cli::parse();
    cli::run(cli)
}

#[cfg(not(feature = "cli"))]
fn main() {
    eprintln!("This binary requires the 'cli' feature. Build with:");
    eprintln!("  cargo build -p bth-amount-compression --features cli --bin amount-compression-sim");
}
