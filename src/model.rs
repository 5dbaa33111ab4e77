// model.rs

use std::collections::HashMap;
use std::ops::Range;

use crate::abf::{AbfTables, BfFamily};
use crate::permutation::{JointPermOutcome, PermOutcome};
use crate::regression::OlsFit;
use crate::standardize::StdSumStats;

/// Index of a marker in the [`MarkerCatalog`] arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MarkerId(pub usize);

/// One genetic variant of the shared genotype panel.
#[derive(Clone, Debug)]
pub struct Marker {
    pub name: String,
    pub chr: String,
    /// 1-based position.
    pub coord: u64,
    /// Allele dosage per panel sample, in [0, 2].
    pub genotypes: Vec<f64>,
    pub is_na: Vec<bool>,
    pub maf: f64,
}

/// All markers, sorted by (chromosome, position), never mutated during the
/// analysis.
#[derive(Debug, Default)]
pub struct MarkerCatalog {
    markers: Vec<Marker>,
    by_chr: HashMap<String, Range<usize>>,
}

impl MarkerCatalog {
    pub fn new(mut markers: Vec<Marker>) -> Self {
        markers.sort_by(|a, b| a.chr.cmp(&b.chr).then(a.coord.cmp(&b.coord)));
        let mut by_chr: HashMap<String, Range<usize>> = HashMap::new();
        for (idx, marker) in markers.iter().enumerate() {
            by_chr
                .entry(marker.chr.clone())
                .and_modify(|r| r.end = idx + 1)
                .or_insert(idx..idx + 1);
        }
        Self { markers, by_chr }
    }

    pub fn get(&self, id: MarkerId) -> &Marker {
        &self.markers[id.0]
    }

    /// Markers of one chromosome, by increasing position.
    pub fn on_chromosome<'a>(&'a self, chr: &str) -> impl Iterator<Item = (MarkerId, &'a Marker)> + 'a {
        let range = self.by_chr.get(chr).cloned().unwrap_or(0..0);
        range.map(move |idx| (MarkerId(idx), &self.markers[idx]))
    }

    pub fn len(&self) -> usize {
        self.markers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }
}

/// Alignment of the global sample ordering with each input's columns.
///
/// `pheno_cols[s][i]` is the column of global sample `i` in subgroup `s`'s
/// phenotype matrix, `geno_cols[i]` its column in the genotype panel; `None`
/// when the sample is absent from that input.
#[derive(Clone, Debug, Default)]
pub struct SampleIndex {
    pub samples: Vec<String>,
    pub pheno_cols: Vec<Vec<Option<usize>>>,
    pub geno_cols: Vec<Option<usize>>,
}

impl SampleIndex {
    pub fn nb_samples(&self) -> usize {
        self.samples.len()
    }

    pub fn nb_subgroups(&self) -> usize {
        self.pheno_cols.len()
    }
}

/// Association statistics of one feature-marker pair.
#[derive(Clone, Debug)]
pub struct AssociationRecord {
    pub marker: MarkerId,
    /// Paired non-missing observations per subgroup.
    pub ns: Vec<usize>,
    pub fits: Vec<OlsFit>,
    /// Empty unless the joint analysis ran.
    pub std_stats: Vec<StdSumStats>,
    pub abfs: AbfTables,
}

impl AssociationRecord {
    pub fn nb_subgroups_with_samples(&self) -> usize {
        self.ns.iter().filter(|&&n| n != 0).count()
    }

    pub fn total_samples(&self) -> usize {
        self.ns.iter().sum()
    }
}

/// A molecular trait measured in some of the subgroups.
#[derive(Clone, Debug)]
pub struct Feature {
    pub name: String,
    pub chr: String,
    /// 1-based, inclusive.
    pub start: u64,
    pub end: u64,
    /// Per subgroup; empty when the feature was not measured there.
    pub phenotypes: Vec<Vec<f64>>,
    pub is_na: Vec<Vec<bool>>,
    pub cis_markers: Vec<MarkerId>,
    pub records: Vec<AssociationRecord>,
    /// Per subgroup; `None` until permuted or when the subgroup has no data.
    pub separate_perms: Vec<Option<PermOutcome>>,
    pub joint_perm: Option<JointPermOutcome>,
}

impl Feature {
    pub fn new(name: impl Into<String>, nb_subgroups: usize) -> Self {
        Self {
            name: name.into(),
            chr: String::new(),
            start: 0,
            end: 0,
            phenotypes: vec![Vec::new(); nb_subgroups],
            is_na: vec![Vec::new(); nb_subgroups],
            cis_markers: Vec::new(),
            records: Vec::new(),
            separate_perms: vec![None; nb_subgroups],
            joint_perm: None,
        }
    }

    pub fn nb_subgroups(&self) -> usize {
        self.phenotypes.len()
    }

    pub fn has_phenotypes(&self, s: usize) -> bool {
        !self.phenotypes[s].is_empty()
    }

    /// Smallest regression p-value of subgroup `s` over the cis markers.
    pub fn min_true_pval(&self, s: usize) -> f64 {
        self.records
            .iter()
            .filter(|r| r.ns[s] > 1 && r.fits[s].pval < 1.0)
            .map(|r| r.fits[s].pval)
            .fold(1.0, f64::min)
    }

    /// Largest weighted log10 ABF of `family`'s statistic over the cis
    /// markers, floored at 0.
    pub fn max_true_abf(&self, family: BfFamily) -> f64 {
        let label = family.statistic_label();
        self.records
            .iter()
            .map(|r| r.abfs.weighted_abf(label))
            .fold(0.0, |acc, v| if v > acc { v } else { acc })
    }
}
