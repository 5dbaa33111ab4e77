// main.rs

// --- External Crate Imports ---
use anyhow::{Context, Error, Result};
use bma_qtl::pipeline;
use clap::Parser;
use log::{error, info};
use std::{fs, path::Path, time::Instant};

// --- Main Function ---
fn main() -> Result<(), Error> {
    let total_time_start = Instant::now();
    let cli_args = cli::CliArgs::parse();

    // Initialize logger
    let log_level = cli_args
        .log_level
        .parse::<log::LevelFilter>()
        .unwrap_or_else(|_| {
            eprintln!(
                "Warning: Invalid log level '{}' provided. Defaulting to Info.",
                cli_args.log_level
            );
            log::LevelFilter::Info
        });
    env_logger::Builder::new()
        .filter_level(log_level)
        .format_timestamp_micros()
        .init();

    info!(
        "Starting bma_qtl ({} build) with args: {:?}",
        env!("BMA_QTL_BUILD_PROFILE"),
        cli_args
    );

    // Configure Rayon thread pool
    let num_threads = cli_args.threads.unwrap_or_else(num_cpus::get);
    info!("Using {} threads for parallel operations.", num_threads);
    rayon::ThreadPoolBuilder::new()
        .num_threads(num_threads)
        .build_global()?;

    // --- 1. Validate options before touching the inputs ---
    let config = cli_args.analysis_config()?;
    if cli_args.seed.is_none() && config.step.needs_perms() {
        info!("No seed provided, using seed {} derived from the clock.", config.seed);
    }
    // pipeline::run validates again for library callers
    config.validate(cli_args.grid.is_some())?;

    if let Some(parent) = Path::new(&cli_args.output_prefix).parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create output directory {}", parent.display())
            })?;
            info!("Created output directory: {}", parent.display());
        }
    }

    // --- 2. Load, analyze, write ---
    let paths = cli_args.input_paths();
    let summary = match pipeline::run(&paths, &config, &cli_args.output_prefix) {
        Ok(summary) => summary,
        Err(e) => {
            error!("{}", e);
            return Err(Error::new(e).context("bma_qtl failed"));
        }
    };

    info!(
        "bma_qtl finished successfully in {:.2?}: {} features, {} with SNPs in cis, {} feature-SNP pairs.",
        total_time_start.elapsed(),
        summary.nb_features,
        summary.nb_features_with_cis,
        summary.nb_pairs
    );
    Ok(())
}

// --- Module Implementations ---

mod cli {
    use anyhow::Result;
    use bma_qtl::config::{AnalysisConfig, AnalysisStep};
    use bma_qtl::pipeline::InputPaths;
    use clap::Parser; // For the derive macro to find Parser
    use std::path::PathBuf;
    use std::time::{SystemTime, UNIX_EPOCH};

    #[derive(Parser, Debug)]
    #[command(author, version, about = "cis-QTL mapping in several subgroups with Bayesian meta-analysis.", long_about = None, propagate_version = true)]
    pub(crate) struct CliArgs {
        /// Two-column file `subgroup path` pointing to the IMPUTE genotype file.
        #[arg(short, long, required = true)]
        pub(crate) geno: PathBuf,

        /// Two-column file `subgroup path` pointing to the phenotype matrices.
        #[arg(short, long, required = true)]
        pub(crate) pheno: PathBuf,

        /// BED file with the feature coordinates.
        #[arg(long, required = true)]
        pub(crate) fcoord: PathBuf,

        /// Prefix of the output files.
        #[arg(short, long = "out", required = true)]
        pub(crate) output_prefix: String,

        /// FSS or FSS+FES.
        #[arg(long, default_value = "FSS")]
        pub(crate) anchor: String,

        /// Half-length of the cis window.
        #[arg(long, default_value_t = 100_000)]
        pub(crate) cis: u64,

        /// 1: separate analysis, 2: + separate permutations, 3: separate and
        /// joint analyses, 4: + joint permutations, 5: + both permutations.
        #[arg(long, required = true)]
        pub(crate) step: u8,

        /// Quantile-normalize the phenotypes.
        #[arg(long)]
        pub(crate) qnorm: bool,

        /// Two-column file `phi2 oma2` of the prior grid.
        #[arg(long)]
        pub(crate) grid: Option<PathBuf>,

        /// Bayes factors to compute: const, subset or all.
        #[arg(long, default_value = "const")]
        pub(crate) bfs: String,

        #[arg(long, default_value_t = 0)]
        pub(crate) nperm: usize,

        #[arg(long)]
        pub(crate) seed: Option<u64>,

        /// 0: all permutations, 1: stop after 10 exceedances, 2: keep
        /// shuffling without testing after 10 exceedances.
        #[arg(long, default_value = "0")]
        pub(crate) trick: String,

        /// Bayes factor calibrated by the joint permutations: const, subset or all.
        #[arg(long, default_value = "const")]
        pub(crate) pbf: String,

        /// Features to keep, one per line.
        #[arg(short = 'f', long = "ftr")]
        pub(crate) ftr: Option<PathBuf>,

        /// SNPs to keep, one per line.
        #[arg(short = 's', long = "snp")]
        pub(crate) snp: Option<PathBuf>,

        #[arg(short = 't', long)]
        pub(crate) threads: Option<usize>,

        #[arg(long, default_value = "Info")]
        pub(crate) log_level: String,
    }

    impl CliArgs {
        pub(crate) fn analysis_config(&self) -> Result<AnalysisConfig> {
            let seed = match self.seed {
                Some(seed) => seed,
                None => SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .map(|d| d.as_nanos() as u64)
                    .unwrap_or_default(),
            };
            Ok(AnalysisConfig {
                anchor: self.anchor.parse()?,
                cis_half_window: self.cis,
                step: AnalysisStep::new(self.step)?,
                need_qnorm: self.qnorm,
                bf_family: self.bfs.parse()?,
                perm_bf_family: self.pbf.parse()?,
                nb_perms: self.nperm,
                seed,
                trick: self.trick.parse()?,
            })
        }

        pub(crate) fn input_paths(&self) -> InputPaths {
            InputPaths {
                geno_list: self.geno.clone(),
                pheno_list: self.pheno.clone(),
                feature_coords: self.fcoord.clone(),
                grid: self.grid.clone(),
                feature_keep: self.ftr.clone(),
                snp_keep: self.snp.clone(),
            }
        }
    }
}
