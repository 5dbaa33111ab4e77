// permutation.rs
//
// Empirical p-values by permuting sample labels, with the adaptive early
// stop ("trick") once enough permuted statistics beat the observed one.

use std::fmt;
use std::str::FromStr;

use log::debug;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Uniform};

use crate::abf::{family_statistic, AbfScratch, BfFamily};
use crate::association::{fit_marker, fit_subgroup, PairBuffer};
use crate::config::AnalysisConfig;
use crate::error::{BmaError, Result};
use crate::grid::HyperGrid;
use crate::model::{Feature, MarkerCatalog, SampleIndex};
use crate::regression::OlsFit;
use crate::standardize::{standardize_all, StdSumStats};

/// Exceedance count at which the trick kicks in.
pub const TRICK_THRESHOLD: usize = 11;

/// Early-stopping behaviour of a permutation loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrickMode {
    /// Run every permutation.
    Off,
    /// Stop at the threshold.
    Stop,
    /// Keep shuffling to the end without evaluating, so the shuffle stream
    /// advances as if every permutation ran.
    ShuffleOnly,
}

impl fmt::Display for TrickMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code = match self {
            TrickMode::Off => 0,
            TrickMode::Stop => 1,
            TrickMode::ShuffleOnly => 2,
        };
        write!(f, "{}", code)
    }
}

impl FromStr for TrickMode {
    type Err = BmaError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "0" => Ok(TrickMode::Off),
            "1" => Ok(TrickMode::Stop),
            "2" => Ok(TrickMode::ShuffleOnly),
            other => Err(BmaError::config(format!(
                "trick should be 0, 1 or 2, got '{}'",
                other
            ))),
        }
    }
}

/// Result of a separate (per-subgroup) permutation loop.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PermOutcome {
    pub pval: f64,
    /// Permutations actually evaluated.
    pub nb_perms: usize,
}

/// Result of the joint permutation loop.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct JointPermOutcome {
    pub pval: f64,
    pub nb_perms: usize,
    /// Observed statistic, floored at 0.
    pub max_l10_true_abf: f64,
}

/// Knobs shared by both permutation schemes.
#[derive(Clone, Copy, Debug)]
pub struct PermSettings {
    pub nb_perms: usize,
    pub trick: TrickMode,
    pub need_qnorm: bool,
}

impl From<&AnalysisConfig> for PermSettings {
    fn from(config: &AnalysisConfig) -> Self {
        Self {
            nb_perms: config.nb_perms,
            trick: config.trick,
            need_qnorm: config.need_qnorm,
        }
    }
}

/// The two random streams of one feature.
#[derive(Clone, Debug)]
pub struct PermStreams {
    pub shuffle: ChaCha8Rng,
    pub trick: ChaCha8Rng,
}

impl PermStreams {
    /// Streams of the feature at position `ordinal` in the name-sorted
    /// catalog; identical for a given seed whatever the thread layout.
    pub fn for_feature(seed: u64, ordinal: usize) -> Self {
        let mut shuffle = ChaCha8Rng::seed_from_u64(seed);
        shuffle.set_stream(2 * ordinal as u64);
        let mut trick = ChaCha8Rng::seed_from_u64(seed);
        trick.set_stream(2 * ordinal as u64 + 1);
        Self { shuffle, trick }
    }
}

/// Runs up to `nb_perms` cumulative shuffles of `0..nb_samples`, asking
/// `exceeds` whether each permuted statistic is at least as extreme as the
/// observed one.
///
/// The observed labelling counts as one exceedance, so a complete loop gives
/// `count / (nb_perms + 1)`. A loop stopped by the trick after `k`
/// evaluations draws its p-value uniformly from `[11/(k+2), 11/(k+1))`.
pub fn run_permutations<F>(
    nb_samples: usize,
    nb_perms: usize,
    trick: TrickMode,
    streams: &mut PermStreams,
    mut exceeds: F,
) -> Result<PermOutcome>
where
    F: FnMut(&[usize]) -> bool,
{
    let mut perm: Vec<usize> = (0..nb_samples).collect();
    let mut count = 1usize;
    let mut evaluated = 0usize;
    let mut shuffle_only = false;

    for _ in 0..nb_perms {
        perm.shuffle(&mut streams.shuffle);
        if shuffle_only {
            continue;
        }
        evaluated += 1;
        if exceeds(&perm) {
            count += 1;
        }
        if count == TRICK_THRESHOLD {
            match trick {
                TrickMode::Off => {}
                TrickMode::Stop => break,
                TrickMode::ShuffleOnly => shuffle_only = true,
            }
        }
    }

    let pval = if evaluated == nb_perms {
        count as f64 / (nb_perms + 1) as f64
    } else {
        let k = evaluated as f64;
        let threshold = TRICK_THRESHOLD as f64;
        let bounds = Uniform::new(threshold / (k + 2.0), threshold / (k + 1.0))
            .map_err(|e| BmaError::distribution(e.to_string()))?;
        bounds.sample(&mut streams.trick)
    };
    Ok(PermOutcome {
        pval,
        nb_perms: evaluated,
    })
}

/// Separate permutations of subgroup `s`: the statistic is the smallest
/// regression p-value over the cis markers.
pub fn permute_separate(
    feature: &Feature,
    catalog: &MarkerCatalog,
    samples: &SampleIndex,
    s: usize,
    settings: PermSettings,
    streams: &mut PermStreams,
) -> Result<PermOutcome> {
    let PermSettings {
        nb_perms,
        trick,
        need_qnorm,
    } = settings;
    let min_true = feature.min_true_pval(s);
    let mut buf = PairBuffer::default();

    let outcome = run_permutations(samples.nb_samples(), nb_perms, trick, streams, |perm| {
        let mut min_perm = 1.0;
        for &id in &feature.cis_markers {
            let marker = catalog.get(id);
            let (n, fit) = fit_subgroup(feature, marker, s, samples, Some(perm), need_qnorm, &mut buf);
            if n > 1 && fit.pval < min_perm {
                min_perm = fit.pval;
            }
        }
        min_perm <= min_true
    })?;
    debug!(
        "{} subgroup {}: perm p-value {:e} after {} permutations",
        feature.name,
        s + 1,
        outcome.pval,
        outcome.nb_perms
    );
    Ok(outcome)
}

/// Scratch space of the joint permutations, reused across cis markers and
/// permutations.
#[derive(Debug, Default)]
struct JointScratch {
    pairs: PairBuffer,
    ns: Vec<usize>,
    fits: Vec<OlsFit>,
    stats: Vec<StdSumStats>,
    abf: AbfScratch,
}

/// Joint permutations: the statistic is the largest `family` statistic over
/// the cis markers, observed values floored at 0.
pub fn permute_joint(
    feature: &Feature,
    catalog: &MarkerCatalog,
    samples: &SampleIndex,
    family: BfFamily,
    grid: &HyperGrid,
    settings: PermSettings,
    streams: &mut PermStreams,
) -> Result<JointPermOutcome> {
    let PermSettings {
        nb_perms,
        trick,
        need_qnorm,
    } = settings;
    let max_true = feature.max_true_abf(family);
    let mut scratch = JointScratch::default();

    let outcome = run_permutations(samples.nb_samples(), nb_perms, trick, streams, |perm| {
        let mut max_perm = 0.0;
        for &id in &feature.cis_markers {
            let JointScratch {
                pairs,
                ns,
                fits,
                stats,
                abf,
            } = &mut scratch;
            fit_marker(feature, catalog.get(id), samples, Some(perm), need_qnorm, pairs, ns, fits);
            standardize_all(ns, fits, stats);
            let l10 = family_statistic(ns, stats, family, grid, abf);
            if l10 > max_perm {
                max_perm = l10;
            }
        }
        max_perm >= max_true
    })?;
    debug!(
        "{}: joint perm p-value {:e} after {} permutations (max log10 ABF {:.3})",
        feature.name, outcome.pval, outcome.nb_perms, max_true
    );
    Ok(JointPermOutcome {
        pval: outcome.pval,
        nb_perms: outcome.nb_perms,
        max_l10_true_abf: max_true,
    })
}
