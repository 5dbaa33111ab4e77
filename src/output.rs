// output.rs
//
// Gzip-compressed, space-separated result tables.

use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Write};

use flate2::write::GzEncoder;
use flate2::Compression;
use log::info;

use crate::abf::{BfFamily, LABEL_CONST, LABEL_CONST_FIX, LABEL_CONST_MAXH};
use crate::config::AnalysisConfig;
use crate::error::{BmaError, Result};
use crate::model::{Feature, MarkerCatalog};

type TableWriter = BufWriter<GzEncoder<File>>;

/// Number formatting of the tables: `NA` for NaN, scientific notation for
/// very small or very large magnitudes.
pub struct Num(pub f64);

impl fmt::Display for Num {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let x = self.0;
        if x.is_nan() {
            f.write_str("NA")
        } else if x == 0.0 || x.is_infinite() || (1e-4..1e6).contains(&x.abs()) {
            write!(f, "{}", x)
        } else {
            write!(f, "{:e}", x)
        }
    }
}

fn create_output_file(prefix: &str, suffix: &str) -> Result<(TableWriter, String)> {
    let filename = format!("{}_{}.txt.gz", prefix, suffix);
    let file = File::create(&filename).map_err(|e| {
        BmaError::config(format!("can't create output file {}: {}", filename, e))
    })?;
    Ok((
        BufWriter::new(GzEncoder::new(file, Compression::default())),
        filename,
    ))
}

fn finish(writer: TableWriter) -> Result<()> {
    writer.into_inner().map_err(|e| e.into_error())?.finish()?;
    Ok(())
}

/// Labels of the subset configurations written for `family`.
fn config_labels(family: BfFamily, nb_subgroups: usize) -> Vec<String> {
    family
        .configurations(nb_subgroups)
        .into_iter()
        .map(|c| c.label)
        .collect()
}

/// `<prefix>_sumstats_<subgroup>.txt.gz`, one per subgroup.
pub fn write_sumstats(
    prefix: &str,
    subgroups: &[String],
    features: &[Feature],
    catalog: &MarkerCatalog,
) -> Result<()> {
    for (s, subgroup) in subgroups.iter().enumerate() {
        let (mut writer, filename) = create_output_file(prefix, &format!("sumstats_{}", subgroup))?;
        info!("Writing summary statistics of subgroup {} to {}", subgroup, filename);
        writeln!(writer, "ftr snp maf n betahat sebetahat sigmahat betaPval pve")?;
        for feature in features {
            for rec in &feature.records {
                let marker = catalog.get(rec.marker);
                let fit = &rec.fits[s];
                writeln!(
                    writer,
                    "{} {} {} {} {} {} {} {} {}",
                    feature.name,
                    marker.name,
                    Num(marker.maf),
                    rec.ns[s],
                    Num(fit.betahat),
                    Num(fit.sebetahat),
                    Num(fit.sigmahat),
                    Num(fit.pval),
                    Num(fit.r2)
                )?;
            }
        }
        finish(writer)?;
    }
    Ok(())
}

/// `<prefix>_permPval_<subgroup>.txt.gz`, features with cis markers only.
pub fn write_separate_perms(prefix: &str, subgroups: &[String], features: &[Feature]) -> Result<()> {
    for (s, subgroup) in subgroups.iter().enumerate() {
        let (mut writer, filename) = create_output_file(prefix, &format!("permPval_{}", subgroup))?;
        info!("Writing permutation p-values of subgroup {} to {}", subgroup, filename);
        writeln!(writer, "ftr nbSnps permPval nbPerms")?;
        for feature in features.iter().filter(|f| !f.cis_markers.is_empty()) {
            let (pval, nb_perms) = feature.separate_perms[s]
                .map_or((f64::NAN, 0), |o| (o.pval, o.nb_perms));
            writeln!(
                writer,
                "{} {} {} {}",
                feature.name,
                feature.cis_markers.len(),
                Num(pval),
                nb_perms
            )?;
        }
        finish(writer)?;
    }
    Ok(())
}

/// `<prefix>_abfs_unweighted.txt.gz`: one row per configuration, one column
/// per grid point.
pub fn write_abfs_unweighted(
    prefix: &str,
    features: &[Feature],
    catalog: &MarkerCatalog,
    family: BfFamily,
    nb_subgroups: usize,
    grid_len: usize,
) -> Result<()> {
    let (mut writer, filename) = create_output_file(prefix, "abfs_unweighted")?;
    info!("Writing unweighted Bayes factors to {}", filename);
    write!(writer, "ftr snp config")?;
    for i in 1..=grid_len {
        write!(writer, " ABFgrid{}", i)?;
    }
    writeln!(writer)?;

    let mut labels: Vec<String> = [LABEL_CONST, LABEL_CONST_FIX, LABEL_CONST_MAXH]
        .iter()
        .map(|l| l.to_string())
        .collect();
    labels.extend(config_labels(family, nb_subgroups));

    for feature in features {
        for rec in &feature.records {
            let snp = &catalog.get(rec.marker).name;
            for label in &labels {
                let Some(values) = rec.abfs.unweighted.get(label) else {
                    continue;
                };
                write!(writer, "{} {} {}", feature.name, snp, label)?;
                for &v in values {
                    write!(writer, " {}", Num(v))?;
                }
                writeln!(writer)?;
            }
        }
    }
    finish(writer)
}

/// `<prefix>_abfs_weighted.txt.gz`: grid-averaged Bayes factors, one row per
/// feature-marker pair.
pub fn write_abfs_weighted(
    prefix: &str,
    features: &[Feature],
    catalog: &MarkerCatalog,
    family: BfFamily,
    nb_subgroups: usize,
) -> Result<()> {
    let (mut writer, filename) = create_output_file(prefix, "abfs_weighted")?;
    info!("Writing weighted Bayes factors to {}", filename);

    let mut labels: Vec<String> = vec![
        LABEL_CONST.to_string(),
        LABEL_CONST_FIX.to_string(),
        LABEL_CONST_MAXH.to_string(),
    ];
    if family != BfFamily::Const {
        labels.extend(config_labels(family, nb_subgroups));
        labels.push(family.statistic_label().to_string());
    }

    write!(writer, "ftr snp nb.subgroups nb.samples abf.const abf.const.fix abf.const.maxh")?;
    for label in &labels[3..] {
        write!(writer, " abf.{}", label)?;
    }
    writeln!(writer)?;

    for feature in features {
        for rec in &feature.records {
            write!(
                writer,
                "{} {} {} {}",
                feature.name,
                catalog.get(rec.marker).name,
                rec.nb_subgroups_with_samples(),
                rec.total_samples()
            )?;
            for label in &labels {
                write!(writer, " {}", Num(rec.abfs.weighted_abf(label)))?;
            }
            writeln!(writer)?;
        }
    }
    finish(writer)
}

/// `<prefix>_jointPermPvals.txt.gz`, features with cis markers only.
pub fn write_joint_perms(prefix: &str, features: &[Feature]) -> Result<()> {
    let (mut writer, filename) = create_output_file(prefix, "jointPermPvals")?;
    info!("Writing joint permutation p-values to {}", filename);
    writeln!(writer, "ftr nbSnps jointPermPval nbPerms maxL10TrueAbf")?;
    for feature in features.iter().filter(|f| !f.cis_markers.is_empty()) {
        let (pval, nb_perms, max_abf) = feature
            .joint_perm
            .map_or((f64::NAN, 0, f64::NAN), |o| (o.pval, o.nb_perms, o.max_l10_true_abf));
        writeln!(
            writer,
            "{} {} {} {} {}",
            feature.name,
            feature.cis_markers.len(),
            Num(pval),
            nb_perms,
            Num(max_abf)
        )?;
    }
    finish(writer)
}

/// Writes every table the analysis step produced.
pub fn write_results(
    prefix: &str,
    subgroups: &[String],
    features: &[Feature],
    catalog: &MarkerCatalog,
    config: &AnalysisConfig,
    grid_len: usize,
) -> Result<()> {
    write_sumstats(prefix, subgroups, features, catalog)?;
    if config.step.has_separate_perms() {
        write_separate_perms(prefix, subgroups, features)?;
    }
    if config.step.has_joint() {
        write_abfs_unweighted(prefix, features, catalog, config.bf_family, subgroups.len(), grid_len)?;
        write_abfs_weighted(prefix, features, catalog, config.bf_family, subgroups.len())?;
    }
    if config.step.has_joint_perms() {
        write_joint_perms(prefix, features)?;
    }
    Ok(())
}
