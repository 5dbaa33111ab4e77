// association.rs
//
// Per feature-marker statistics: pairing of observations across the sample
// index, per-subgroup regressions and, for the joint analysis, the
// standardized triples and Bayes factors.

use crate::abf::{AbfTables, BfFamily};
use crate::grid::HyperGrid;
use crate::model::{AssociationRecord, Feature, Marker, MarkerCatalog, SampleIndex};
use crate::qnorm::quantile_normalize;
use crate::regression::{ols, OlsFit};
use crate::standardize::standardize_all;

/// Reusable genotype/phenotype pair buffers.
#[derive(Debug, Default)]
pub struct PairBuffer {
    pub g: Vec<f64>,
    pub y: Vec<f64>,
}

impl PairBuffer {
    pub fn len(&self) -> usize {
        self.y.len()
    }

    pub fn is_empty(&self) -> bool {
        self.y.is_empty()
    }
}

/// Collects the non-missing (genotype, phenotype) pairs of subgroup `s`.
///
/// With `perm`, global sample `i` is paired with the phenotype of sample
/// `perm[i]` while keeping its own genotype.
pub fn gather_pairs(
    feature: &Feature,
    marker: &Marker,
    s: usize,
    samples: &SampleIndex,
    perm: Option<&[usize]>,
    buf: &mut PairBuffer,
) {
    buf.g.clear();
    buf.y.clear();
    if !feature.has_phenotypes(s) {
        return;
    }
    let phenos = &feature.phenotypes[s];
    let pheno_na = &feature.is_na[s];
    let pheno_cols = &samples.pheno_cols[s];

    for (i, geno_col) in samples.geno_cols.iter().enumerate() {
        let p = perm.map_or(i, |perm| perm[i]);
        let (Some(ip), Some(ig)) = (pheno_cols[p], *geno_col) else {
            continue;
        };
        if pheno_na[ip] || marker.is_na[ig] {
            continue;
        }
        buf.g.push(marker.genotypes[ig]);
        buf.y.push(phenos[ip]);
    }
}

/// Regression of subgroup `s`; the fit is missing when `n <= 1`.
pub fn fit_subgroup(
    feature: &Feature,
    marker: &Marker,
    s: usize,
    samples: &SampleIndex,
    perm: Option<&[usize]>,
    need_qnorm: bool,
    buf: &mut PairBuffer,
) -> (usize, OlsFit) {
    gather_pairs(feature, marker, s, samples, perm, buf);
    if need_qnorm {
        quantile_normalize(&mut buf.y);
    }
    let n = buf.len();
    if n > 1 {
        (n, ols(&buf.g, &buf.y))
    } else {
        (n, OlsFit::MISSING)
    }
}

/// Regressions of every subgroup into `ns` / `fits`.
#[allow(clippy::too_many_arguments)]
pub fn fit_marker(
    feature: &Feature,
    marker: &Marker,
    samples: &SampleIndex,
    perm: Option<&[usize]>,
    need_qnorm: bool,
    buf: &mut PairBuffer,
    ns: &mut Vec<usize>,
    fits: &mut Vec<OlsFit>,
) {
    ns.clear();
    fits.clear();
    for s in 0..feature.nb_subgroups() {
        let (n, fit) = fit_subgroup(feature, marker, s, samples, perm, need_qnorm, buf);
        ns.push(n);
        fits.push(fit);
    }
}

/// Settings of the joint analysis, when it runs.
#[derive(Clone, Copy, Debug)]
pub struct JointSettings<'a> {
    pub family: BfFamily,
    pub grid: &'a HyperGrid,
}

/// Fills `feature.records` with one record per cis marker, in cis order.
pub fn infer_associations(
    feature: &mut Feature,
    catalog: &MarkerCatalog,
    samples: &SampleIndex,
    need_qnorm: bool,
    joint: Option<JointSettings<'_>>,
) {
    let mut buf = PairBuffer::default();
    let mut records = Vec::with_capacity(feature.cis_markers.len());

    for &id in &feature.cis_markers {
        let marker = catalog.get(id);
        let mut ns = Vec::with_capacity(feature.nb_subgroups());
        let mut fits = Vec::with_capacity(feature.nb_subgroups());
        fit_marker(feature, marker, samples, None, need_qnorm, &mut buf, &mut ns, &mut fits);

        let mut std_stats = Vec::new();
        let mut abfs = AbfTables::default();
        if let Some(JointSettings { family, grid }) = joint {
            standardize_all(&ns, &fits, &mut std_stats);
            abfs = AbfTables::compute(&ns, &std_stats, family, grid);
        }
        records.push(AssociationRecord {
            marker: id,
            ns,
            fits,
            std_stats,
            abfs,
        });
    }

    feature.records = records;
}
