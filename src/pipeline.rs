// pipeline.rs

use std::path::PathBuf;
use std::time::Instant;

use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info};
use rayon::prelude::*;

use crate::association::{infer_associations, JointSettings};
use crate::cis::find_cis_markers;
use crate::config::AnalysisConfig;
use crate::error::{BmaError, Result};
use crate::grid::HyperGrid;
use crate::input;
use crate::model::{Feature, MarkerCatalog, SampleIndex};
use crate::output;
use crate::permutation::{permute_joint, permute_separate, PermSettings, PermStreams};

/// Locations of every input file.
#[derive(Clone, Debug)]
pub struct InputPaths {
    pub geno_list: PathBuf,
    pub pheno_list: PathBuf,
    pub feature_coords: PathBuf,
    pub grid: Option<PathBuf>,
    pub feature_keep: Option<PathBuf>,
    pub snp_keep: Option<PathBuf>,
}

/// Everything the analysis reads, loaded and cross-referenced.
#[derive(Debug)]
pub struct Dataset {
    pub subgroups: Vec<String>,
    pub samples: SampleIndex,
    /// Sorted by name.
    pub features: Vec<Feature>,
    pub catalog: MarkerCatalog,
    /// Empty when no grid file was given.
    pub grid: HyperGrid,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub nb_features: usize,
    pub nb_features_with_cis: usize,
    pub nb_pairs: usize,
}

pub fn load_dataset(paths: &InputPaths) -> Result<Dataset> {
    let feature_keep = paths.feature_keep.as_deref().map(input::load_keep_list).transpose()?;
    let snp_keep = paths.snp_keep.as_deref().map(input::load_keep_list).transpose()?;
    let grid = match &paths.grid {
        Some(path) => input::load_grid(path)?,
        None => HyperGrid::uniform(Vec::new()),
    };

    let pheno_list = input::load_path_list(&paths.pheno_list)?;
    let geno_list = input::load_path_list(&paths.geno_list)?;
    if geno_list.len() > 1 {
        return Err(BmaError::config(
            "several genotype files are not supported, give a single panel shared by all subgroups",
        ));
    }
    let geno_path = &geno_list[0].1;
    let subgroups: Vec<String> = pheno_list.iter().map(|(s, _)| s.clone()).collect();
    let pheno_paths: Vec<PathBuf> = pheno_list.into_iter().map(|(_, p)| p).collect();
    info!("nb of subgroups: {}", subgroups.len());

    info!("Loading samples...");
    let pheno_samples = pheno_paths
        .iter()
        .map(|p| input::read_pheno_samples(p))
        .collect::<Result<Vec<_>>>()?;
    for (s, names) in pheno_samples.iter().enumerate() {
        info!("s{} ({}): {} samples", s + 1, subgroups[s], names.len());
    }
    let geno_samples = input::read_geno_samples(geno_path)?;
    info!("nb of samples (genotypes): {}", geno_samples.len());
    let samples = input::reconcile_samples(&pheno_samples, &geno_samples);
    info!("total nb of samples: {}", samples.nb_samples());

    info!("Loading phenotypes...");
    let mut features = input::load_phenotypes(&pheno_paths, feature_keep.as_ref())?;
    info!("Loading feature coordinates from {}", paths.feature_coords.display());
    input::load_feature_coords(&paths.feature_coords, &mut features)?;
    info!("Loading genotypes from {}", geno_path.display());
    let catalog = input::load_genotypes(geno_path, snp_keep.as_ref())?;

    Ok(Dataset {
        subgroups,
        samples,
        features,
        catalog,
        grid,
    })
}

/// Cis scan, association statistics and permutations of one feature.
///
/// `ordinal` is the feature's rank in the name-sorted catalog and selects its
/// random streams.
pub fn analyze_feature(
    feature: &mut Feature,
    ordinal: usize,
    catalog: &MarkerCatalog,
    samples: &SampleIndex,
    grid: &HyperGrid,
    config: &AnalysisConfig,
) -> Result<()> {
    feature.cis_markers = find_cis_markers(feature, catalog, config.anchor, config.cis_half_window);
    if feature.cis_markers.is_empty() {
        debug!("{}: no SNP in cis, skipped", feature.name);
        return Ok(());
    }
    debug!("{}: {} SNPs in cis", feature.name, feature.cis_markers.len());

    let joint = config.step.has_joint().then_some(JointSettings {
        family: config.bf_family,
        grid,
    });
    infer_associations(feature, catalog, samples, config.need_qnorm, joint);

    let settings = PermSettings::from(config);
    if config.step.has_separate_perms() {
        for s in 0..feature.nb_subgroups() {
            if !feature.has_phenotypes(s) {
                continue;
            }
            let mut streams = PermStreams::for_feature(config.seed, ordinal);
            let outcome = permute_separate(feature, catalog, samples, s, settings, &mut streams)?;
            feature.separate_perms[s] = Some(outcome);
        }
    }
    if config.step.has_joint_perms() {
        let mut streams = PermStreams::for_feature(config.seed, ordinal);
        let outcome = permute_joint(
            feature,
            catalog,
            samples,
            config.perm_bf_family,
            grid,
            settings,
            &mut streams,
        )?;
        feature.joint_perm = Some(outcome);
    }
    Ok(())
}

/// Analyzes every feature in parallel.
pub fn analyze(dataset: &mut Dataset, config: &AnalysisConfig) -> Result<RunSummary> {
    let Dataset {
        features,
        catalog,
        samples,
        grid,
        ..
    } = dataset;
    let (catalog, samples, grid) = (&*catalog, &*samples, &*grid);
    info!(
        "Looking for associations: anchor={} cis={} step={}",
        config.anchor, config.cis_half_window, config.step
    );
    if config.step.needs_perms() {
        info!(
            "Permutations: nperm={} seed={} trick={} pbf={}",
            config.nb_perms, config.seed, config.trick, config.perm_bf_family
        );
    }

    let style = ProgressStyle::default_bar()
        .template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} features ({percent}%) ETA: {eta}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> ");
    let pb = ProgressBar::new(features.len() as u64).with_style(style);

    let start = Instant::now();
    features
        .par_iter_mut()
        .enumerate()
        .try_for_each(|(ordinal, feature)| {
            let result = analyze_feature(feature, ordinal, catalog, samples, grid, config);
            pb.inc(1);
            result
        })?;
    pb.finish_with_message("Features analyzed.");

    let summary = RunSummary {
        nb_features: features.len(),
        nb_features_with_cis: features.iter().filter(|f| !f.cis_markers.is_empty()).count(),
        nb_pairs: features.iter().map(|f| f.records.len()).sum(),
    };
    info!(
        "nb of analyzed feature-SNP pairs: {} ({} features with SNPs in cis) in {:.2?}",
        summary.nb_pairs,
        summary.nb_features_with_cis,
        start.elapsed()
    );
    Ok(summary)
}

/// Loads, analyzes and writes every table under `out_prefix`.
pub fn run(paths: &InputPaths, config: &AnalysisConfig, out_prefix: &str) -> Result<RunSummary> {
    config.validate(paths.grid.is_some())?;
    let mut dataset = load_dataset(paths)?;
    let summary = analyze(&mut dataset, config)?;
    output::write_results(
        out_prefix,
        &dataset.subgroups,
        &dataset.features,
        &dataset.catalog,
        config,
        dataset.grid.len(),
    )?;
    Ok(summary)
}
