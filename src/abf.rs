// abf.rs
//
// Approximate Bayes factors of the hierarchical effect-size model, on the
// log10 scale, for the consistent configuration and for subsets of subgroups.

use std::collections::BTreeMap;
use std::f64::consts::LN_10;
use std::fmt;
use std::str::FromStr;

use crate::configs::{self, Configuration};
use crate::error::BmaError;
use crate::grid::{GridPoint, HyperGrid};
use crate::standardize::StdSumStats;

pub const LABEL_CONST: &str = "const";
pub const LABEL_CONST_FIX: &str = "const-fix";
pub const LABEL_CONST_MAXH: &str = "const-maxh";
pub const LABEL_SUBSET_SUMMARY: &str = "subset-summary";
pub const LABEL_ALL_SUMMARY: &str = "all-summary";

/// Which configurations get a Bayes factor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum BfFamily {
    /// The consistent configuration and its fixed-effect / max-heterogeneity variants.
    Const,
    /// `Const` plus one configuration per subgroup.
    Subset,
    /// `Const` plus every non-empty proper subset of subgroups.
    All,
}

impl BfFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            BfFamily::Const => "const",
            BfFamily::Subset => "subset",
            BfFamily::All => "all",
        }
    }

    /// Label of the statistic the permutations of this family calibrate.
    pub fn statistic_label(&self) -> &'static str {
        match self {
            BfFamily::Const => LABEL_CONST,
            BfFamily::Subset => LABEL_SUBSET_SUMMARY,
            BfFamily::All => LABEL_ALL_SUMMARY,
        }
    }

    /// Subset configurations of this family, in output order.
    pub fn configurations(&self, nb_subgroups: usize) -> Vec<Configuration> {
        match self {
            BfFamily::Const => Vec::new(),
            BfFamily::Subset => configs::singletons(nb_subgroups).collect(),
            BfFamily::All => configs::proper_subsets(nb_subgroups).collect(),
        }
    }
}

impl fmt::Display for BfFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BfFamily {
    type Err = BmaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "const" => Ok(BfFamily::Const),
            "subset" => Ok(BfFamily::Subset),
            "all" => Ok(BfFamily::All),
            other => Err(BmaError::config(format!(
                "Bayes factor family should be 'const', 'subset' or 'all', got '{}'",
                other
            ))),
        }
    }
}

/// log10 ABF of one grid point.
///
/// Subgroups with `n <= 1`, outside `mask`, or whose statistic carries no
/// evidence contribute nothing. With no evidence anywhere the result is 0
/// (Bayes factor 1).
pub fn log10_abf(
    ns: &[usize],
    stats: &[StdSumStats],
    mask: Option<&[bool]>,
    point: GridPoint,
) -> f64 {
    let GridPoint { phi2, oma2 } = point;
    let mut bbar_num = 0.0;
    let mut bbar_denom = 0.0;
    let mut l10_singles = 0.0;

    for (s, (&n, st)) in ns.iter().zip(stats.iter()).enumerate() {
        if n <= 1 || !mask.map_or(true, |m| m[s]) || !st.has_evidence() {
            continue;
        }
        let varbhat = st.sebhat * st.sebhat;
        let w = 1.0 / (varbhat + phi2);
        bbar_num += st.bhat * w;
        bbar_denom += w;
        l10_singles += 0.5 * varbhat.log10() - 0.5 * (varbhat + phi2).log10()
            + (0.5 * st.t * st.t * phi2 / (varbhat + phi2)) / LN_10;
    }

    let (bbarhat, varbbarhat) = if bbar_denom != 0.0 {
        (bbar_num / bbar_denom, 1.0 / bbar_denom)
    } else {
        (0.0, f64::INFINITY)
    };
    let t2 = bbarhat * bbarhat / varbbarhat;
    let l10_bbar = if t2 != 0.0 {
        0.5 * varbbarhat.log10() - 0.5 * (varbbarhat + oma2).log10()
            + (0.5 * t2 * oma2 / (varbbarhat + oma2)) / LN_10
    } else {
        0.0
    };

    l10_bbar + l10_singles
}

/// log10(sum_i w_i * 10^x_i), computed around the maximum.
///
/// NaN inputs propagate; summaries drop untestable configurations before calling it.
pub fn log10_weighted_sum(values: &[f64], weights: &[f64]) -> f64 {
    debug_assert_eq!(values.len(), weights.len());
    log10_sum_by(values, |i| weights[i])
}

/// Equally weighted version of [`log10_weighted_sum`].
pub fn log10_mean(values: &[f64]) -> f64 {
    let w = 1.0 / values.len().max(1) as f64;
    log10_sum_by(values, |_| w)
}

fn log10_sum_by(values: &[f64], weight: impl Fn(usize) -> f64) -> f64 {
    if values.iter().any(|v| v.is_nan()) {
        return f64::NAN;
    }
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if max.is_infinite() {
        return max;
    }
    let sum: f64 = values
        .iter()
        .enumerate()
        .map(|(i, v)| weight(i) * 10f64.powf(v - max))
        .sum();
    max + sum.log10()
}

/// Number of samples a configuration can use.
fn contributing_samples(ns: &[usize], mask: &[bool]) -> usize {
    ns.iter()
        .zip(mask.iter())
        .filter(|&(&n, &inside)| inside && n > 1)
        .map(|(&n, _)| n)
        .sum()
}

/// Per-grid-point log10 ABFs of one configuration into `out`.
///
/// Returns false (and fills `out` with NaN) when the configuration has no
/// contributing sample.
fn grid_abfs(
    ns: &[usize],
    stats: &[StdSumStats],
    mask: Option<&[bool]>,
    grid: &HyperGrid,
    transform: fn(&GridPoint) -> GridPoint,
    out: &mut Vec<f64>,
) -> bool {
    out.clear();
    if let Some(m) = mask {
        if contributing_samples(ns, m) == 0 {
            out.resize(grid.len(), f64::NAN);
            return false;
        }
    }
    out.extend(
        grid.points()
            .iter()
            .map(|p| log10_abf(ns, stats, mask, transform(p))),
    );
    true
}

fn as_is(p: &GridPoint) -> GridPoint {
    *p
}

/// Unweighted (per grid point) and weighted log10 ABFs keyed by
/// configuration label.
#[derive(Clone, Debug, Default)]
pub struct AbfTables {
    pub unweighted: BTreeMap<String, Vec<f64>>,
    pub weighted: BTreeMap<String, f64>,
}

impl AbfTables {
    pub fn is_empty(&self) -> bool {
        self.weighted.is_empty()
    }

    pub fn weighted_abf(&self, label: &str) -> f64 {
        self.weighted.get(label).copied().unwrap_or(f64::NAN)
    }

    fn insert(&mut self, label: &str, values: Vec<f64>, grid: &HyperGrid) -> f64 {
        let w = log10_weighted_sum(&values, grid.weights());
        self.unweighted.insert(label.to_string(), values);
        self.weighted.insert(label.to_string(), w);
        w
    }

    /// Computes every Bayes factor of `family` for one feature-marker pair.
    pub fn compute(
        ns: &[usize],
        stats: &[StdSumStats],
        family: BfFamily,
        grid: &HyperGrid,
    ) -> AbfTables {
        let mut tables = AbfTables::default();
        let mut buf = Vec::with_capacity(grid.len());

        grid_abfs(ns, stats, None, grid, as_is, &mut buf);
        let l10_const = tables.insert(LABEL_CONST, buf.clone(), grid);
        grid_abfs(ns, stats, None, grid, GridPoint::fixed_effect, &mut buf);
        tables.insert(LABEL_CONST_FIX, buf.clone(), grid);
        grid_abfs(ns, stats, None, grid, GridPoint::max_heterogeneity, &mut buf);
        tables.insert(LABEL_CONST_MAXH, buf.clone(), grid);

        if family == BfFamily::Const {
            return tables;
        }

        let mut summarized = vec![l10_const];
        for config in family.configurations(ns.len()) {
            grid_abfs(ns, stats, Some(&config.members), grid, as_is, &mut buf);
            let l10 = tables.insert(&config.label, buf.clone(), grid);
            // untestable configurations stay in the tables but not in the summary
            if !l10.is_nan() {
                summarized.push(l10);
            }
        }
        tables
            .weighted
            .insert(family.statistic_label().to_string(), log10_mean(&summarized));
        tables
    }
}

/// Reusable buffers for [`family_statistic`].
#[derive(Debug, Default)]
pub struct AbfScratch {
    grid_values: Vec<f64>,
    config_values: Vec<f64>,
}

/// The statistic a joint permutation compares: the weighted `const` ABF for
/// `Const`, and the equally weighted average of `const` and every testable
/// subset ABF of the family otherwise. Equals the matching entry of
/// [`AbfTables::compute`].
pub fn family_statistic(
    ns: &[usize],
    stats: &[StdSumStats],
    family: BfFamily,
    grid: &HyperGrid,
    scratch: &mut AbfScratch,
) -> f64 {
    grid_abfs(ns, stats, None, grid, as_is, &mut scratch.grid_values);
    let l10_const = log10_weighted_sum(&scratch.grid_values, grid.weights());
    if family == BfFamily::Const {
        return l10_const;
    }

    scratch.config_values.clear();
    scratch.config_values.push(l10_const);
    let push_config = |config: Configuration, scratch: &mut AbfScratch| {
        if grid_abfs(ns, stats, Some(&config.members), grid, as_is, &mut scratch.grid_values) {
            let value = log10_weighted_sum(&scratch.grid_values, grid.weights());
            if !value.is_nan() {
                scratch.config_values.push(value);
            }
        }
    };
    match family {
        BfFamily::Subset => configs::singletons(ns.len()).for_each(|c| push_config(c, scratch)),
        BfFamily::All => configs::proper_subsets(ns.len()).for_each(|c| push_config(c, scratch)),
        BfFamily::Const => unreachable!("handled above"),
    }
    log10_mean(&scratch.config_values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn grid1() -> HyperGrid {
        HyperGrid::uniform(vec![GridPoint::new(0.01, 0.1)])
    }

    fn grid3() -> HyperGrid {
        HyperGrid::uniform(vec![
            GridPoint::new(0.0, 0.04),
            GridPoint::new(0.01, 0.1),
            GridPoint::new(0.1, 0.4),
        ])
    }

    fn evidence(t: f64, sebhat: f64) -> StdSumStats {
        StdSumStats {
            bhat: t * sebhat,
            sebhat,
            t,
        }
    }

    #[test]
    fn no_evidence_gives_zero() {
        let ns = [10, 20, 30];
        let stats = [
            StdSumStats::NO_EVIDENCE,
            StdSumStats::NO_EVIDENCE,
            StdSumStats::NEUTRAL,
        ];
        for p in grid3().points() {
            assert_eq!(log10_abf(&ns, &stats, None, *p), 0.0);
        }
    }

    #[test]
    fn single_subgroup_matches_closed_form() {
        let ns = [25];
        let st = evidence(3.0, 0.2);
        let (phi2, oma2) = (0.01, 0.1);
        let v = 0.04_f64;
        let single = 0.5 * v.log10() - 0.5 * (v + phi2).log10() + 0.5 * 9.0 * phi2 / (v + phi2) / LN_10;
        let vbar = v + phi2;
        let t2 = 0.6_f64.powi(2) / vbar;
        let pooled = 0.5 * vbar.log10() - 0.5 * (vbar + oma2).log10() + 0.5 * t2 * oma2 / (vbar + oma2) / LN_10;
        assert_relative_eq!(
            log10_abf(&ns, &[st], None, GridPoint::new(phi2, oma2)),
            single + pooled,
            max_relative = 1e-12
        );
    }

    #[test]
    fn weighted_equals_unweighted_on_single_point_grid() {
        let ns = [12, 15];
        let stats = [evidence(2.1, 0.3), evidence(-0.7, 0.25)];
        let tables = AbfTables::compute(&ns, &stats, BfFamily::All, &grid1());
        for (label, values) in &tables.unweighted {
            assert_eq!(values.len(), 1);
            assert_relative_eq!(tables.weighted[label], values[0], max_relative = 1e-14);
        }
    }

    #[test]
    fn log10_sum_is_stable_for_huge_values() {
        let v = [800.0, 800.0];
        assert_relative_eq!(log10_weighted_sum(&v, &[0.5, 0.5]), 800.0, max_relative = 1e-14);
        assert_relative_eq!(log10_mean(&[-900.0, -900.0 + 2f64.log10()]), -900.0 + 1.5f64.log10(), max_relative = 1e-12);
        assert!(log10_mean(&[1.0, f64::NAN]).is_nan());
    }

    #[test]
    fn const_variants_bound_the_heterogeneity_spectrum() {
        let ns = [30, 30];
        let stats = [evidence(4.0, 0.18), evidence(4.2, 0.18)];
        let tables = AbfTables::compute(&ns, &stats, BfFamily::Const, &grid3());
        assert!(tables.weighted.contains_key(LABEL_CONST));
        assert!(tables.weighted.contains_key(LABEL_CONST_FIX));
        assert!(tables.weighted.contains_key(LABEL_CONST_MAXH));
        for label in [LABEL_CONST, LABEL_CONST_FIX, LABEL_CONST_MAXH] {
            assert!(tables.weighted[label] > 0.0, "{} should favour an effect", label);
            assert_eq!(tables.unweighted[label].len(), 3);
        }
        assert_eq!(tables.weighted.len(), 3);
    }

    #[test]
    fn subset_family_has_one_config_per_subgroup_and_summary() {
        let ns = [20, 1, 20];
        let stats = [evidence(3.0, 0.2), StdSumStats::NEUTRAL, evidence(0.5, 0.2)];
        let tables = AbfTables::compute(&ns, &stats, BfFamily::Subset, &grid3());
        for label in ["1", "2", "3", LABEL_SUBSET_SUMMARY] {
            assert!(tables.weighted.contains_key(label), "missing {}", label);
        }
        // subgroup 2 has a single sample: untestable
        assert!(tables.weighted["2"].is_nan());
        assert!(tables.unweighted["2"].iter().all(|v| v.is_nan()));
        assert!(tables.weighted["1"] > tables.weighted["3"]);
    }

    #[test]
    fn all_family_enumerates_proper_subsets() {
        let ns = [20, 20, 20];
        let stats = [evidence(3.0, 0.2), evidence(2.0, 0.2), evidence(0.1, 0.2)];
        let tables = AbfTables::compute(&ns, &stats, BfFamily::All, &grid3());
        let subset_labels: Vec<&String> = tables
            .unweighted
            .keys()
            .filter(|k| !k.starts_with("const"))
            .collect();
        assert_eq!(subset_labels.len(), 6);
        assert!(tables.weighted.contains_key(LABEL_ALL_SUMMARY));
        assert!(!tables.unweighted.contains_key(LABEL_ALL_SUMMARY));
    }

    #[test]
    fn family_statistic_matches_tables() {
        let ns = [15, 18, 22];
        let stats = [evidence(2.5, 0.3), evidence(-1.0, 0.28), evidence(3.3, 0.2)];
        let grid = grid3();
        let mut scratch = AbfScratch::default();
        for family in [BfFamily::Const, BfFamily::Subset, BfFamily::All] {
            let tables = AbfTables::compute(&ns, &stats, family, &grid);
            let direct = family_statistic(&ns, &stats, family, &grid, &mut scratch);
            assert_relative_eq!(tables.weighted_abf(family.statistic_label()), direct, max_relative = 1e-14);
        }
    }

    #[test]
    fn summary_averages_testable_configurations_only() {
        // second subgroup not measured
        let ns = [25, 0];
        let stats = [evidence(4.0, 0.2), StdSumStats::NEUTRAL];
        let grid = grid3();
        let mut scratch = AbfScratch::default();

        let subset = AbfTables::compute(&ns, &stats, BfFamily::Subset, &grid);
        assert!(subset.weighted["2"].is_nan());
        let expected = log10_mean(&[subset.weighted[LABEL_CONST], subset.weighted["1"]]);
        let summary = subset.weighted_abf(LABEL_SUBSET_SUMMARY);
        assert!(summary > 0.0);
        assert_relative_eq!(summary, expected, max_relative = 1e-14);

        for family in [BfFamily::Subset, BfFamily::All] {
            let tables = AbfTables::compute(&ns, &stats, family, &grid);
            let direct = family_statistic(&ns, &stats, family, &grid, &mut scratch);
            assert!(direct.is_finite());
            assert_relative_eq!(tables.weighted_abf(family.statistic_label()), direct, max_relative = 1e-14);
        }
    }

    #[test]
    fn family_parses_from_cli_strings() {
        assert_eq!("subset".parse::<BfFamily>().unwrap(), BfFamily::Subset);
        assert!("some".parse::<BfFamily>().is_err());
        assert!(BfFamily::Const < BfFamily::Subset && BfFamily::Subset < BfFamily::All);
    }
}
