use approx::assert_relative_eq;
use bma_qtl::abf::{BfFamily, LABEL_CONST, LABEL_SUBSET_SUMMARY};
use bma_qtl::config::{AnalysisConfig, AnalysisStep};
use bma_qtl::grid::{GridPoint, HyperGrid};
use bma_qtl::model::{Feature, Marker, MarkerCatalog, SampleIndex};
use bma_qtl::permutation::{JointPermOutcome, TrickMode};
use bma_qtl::pipeline::{analyze, Dataset};

const GENOS: [f64; 10] = [0.0, 1.0, 2.0, 0.0, 1.0, 2.0, 0.0, 1.0, 2.0, 1.0];
const NOISE: [f64; 10] = [0.3, -0.4, 0.1, -0.2, 0.5, -0.3, 0.4, -0.5, 0.2, 0.0];

fn phenotype(slope: f64) -> Vec<f64> {
    GENOS
        .iter()
        .zip(NOISE.iter())
        .map(|(g, e)| slope * g + e)
        .collect()
}

fn marker(name: &str, coord: u64, genotypes: Vec<f64>) -> Marker {
    let n = genotypes.len();
    Marker {
        name: name.to_string(),
        chr: "chr1".to_string(),
        coord,
        genotypes,
        is_na: vec![false; n],
        maf: 0.45,
    }
}

fn feature(name: &str, start: u64, y: Vec<f64>) -> Feature {
    let mut f = Feature::new(name, 2);
    f.chr = "chr1".to_string();
    f.start = start;
    f.end = start + 1_000;
    f.is_na = vec![vec![false; y.len()]; 2];
    f.phenotypes = vec![y.clone(), y];
    f
}

/// Two subgroups sharing the same ten samples and identical measurements.
fn twin_subgroups(features: Vec<Feature>) -> Dataset {
    let samples: Vec<String> = (0..10).map(|i| format!("ind{}", i)).collect();
    let identity: Vec<Option<usize>> = (0..10).map(Some).collect();
    Dataset {
        subgroups: vec!["s1".to_string(), "s2".to_string()],
        samples: SampleIndex {
            samples,
            pheno_cols: vec![identity.clone(), identity.clone()],
            geno_cols: identity,
        },
        features,
        catalog: MarkerCatalog::new(vec![
            marker("rs1", 1_500, GENOS.to_vec()),
            marker("rs2", 900_000, GENOS.iter().rev().copied().collect()),
            marker("rs3", 21_200, vec![1.0, 0.0, 1.0, 2.0, 2.0, 0.0, 1.0, 1.0, 0.0, 2.0]),
        ]),
        grid: HyperGrid::uniform(vec![GridPoint::new(0.01, 0.1)]),
    }
}

fn config(step: u8) -> AnalysisConfig {
    AnalysisConfig {
        cis_half_window: 1_000,
        step: AnalysisStep::new(step).unwrap(),
        bf_family: BfFamily::Subset,
        perm_bf_family: BfFamily::Subset,
        nb_perms: 40,
        seed: 20121017,
        trick: TrickMode::ShuffleOnly,
        ..AnalysisConfig::default()
    }
}

#[test]
fn identical_subgroups_give_identical_evidence() {
    let mut dataset = twin_subgroups(vec![feature("gene1", 1_000, phenotype(0.8))]);
    let summary = analyze(&mut dataset, &config(3)).unwrap();
    assert_eq!(summary.nb_features_with_cis, 1);
    assert_eq!(summary.nb_pairs, 1);

    let rec = &dataset.features[0].records[0];
    assert_eq!(dataset.catalog.get(rec.marker).name, "rs1");
    assert_eq!(rec.ns, vec![10, 10]);
    assert_eq!(rec.std_stats[0], rec.std_stats[1]);
    assert_relative_eq!(
        rec.std_stats[0].bhat / rec.std_stats[0].sebhat,
        rec.std_stats[0].t,
        max_relative = 1e-12
    );

    let one = rec.abfs.weighted_abf("1");
    let two = rec.abfs.weighted_abf("2");
    let both = rec.abfs.weighted_abf(LABEL_CONST);
    assert_eq!(one, two);
    assert!(both > one, "const {} should exceed single-subgroup {}", both, one);
    assert!(rec.abfs.weighted_abf(LABEL_SUBSET_SUMMARY).is_finite());

    // single grid point: the weighted value is the grid value
    assert_relative_eq!(rec.abfs.unweighted[LABEL_CONST][0], both, max_relative = 1e-12);
}

#[test]
fn features_without_cis_markers_are_skipped() {
    let mut dataset = twin_subgroups(vec![
        feature("gene1", 1_000, phenotype(0.8)),
        feature("lonely", 400_000, phenotype(0.1)),
    ]);
    let summary = analyze(&mut dataset, &config(5)).unwrap();
    assert_eq!(summary.nb_features, 2);
    assert_eq!(summary.nb_features_with_cis, 1);
    let lonely = &dataset.features[1];
    assert!(lonely.records.is_empty());
    assert!(lonely.joint_perm.is_none());
    assert!(lonely.separate_perms.iter().all(Option::is_none));
}

#[test]
fn permutation_pvalues_are_reproducible_across_thread_counts() {
    let build = || {
        twin_subgroups(vec![
            feature("gene1", 1_000, phenotype(0.8)),
            feature("gene2", 20_500, phenotype(0.0)),
            feature("gene3", 1_200, phenotype(-0.3)),
        ])
    };
    let run = |threads: usize| {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build()
            .unwrap();
        let mut dataset = build();
        pool.install(|| analyze(&mut dataset, &config(5))).unwrap();
        dataset.features
    };

    let serial = run(1);
    let parallel = run(3);
    for (a, b) in serial.iter().zip(parallel.iter()) {
        assert_eq!(a.name, b.name);
        assert_eq!(a.separate_perms, b.separate_perms);
        assert_eq!(a.joint_perm, b.joint_perm);
    }

    for f in &serial {
        // streams restart for every subgroup, and both subgroups hold the same data
        assert_eq!(f.separate_perms[0], f.separate_perms[1]);
        let joint = f.joint_perm.unwrap();
        assert!(joint.pval > 0.0 && joint.pval <= 1.0);
        assert!(joint.max_l10_true_abf >= 0.0);
        assert!(joint.nb_perms <= 40);
    }

    // a strong signal is rarely beaten by permuted labels
    let strong = serial[0].separate_perms[0].unwrap();
    let null = serial[1].separate_perms[0].unwrap();
    assert!(strong.pval < null.pval);
}

fn joint_outcome_measured_in_first_subgroup_only(family: BfFamily) -> (JointPermOutcome, f64) {
    let mut lone = feature("gene1", 1_000, phenotype(0.8));
    lone.phenotypes[1].clear();
    lone.is_na[1].clear();
    let mut dataset = twin_subgroups(vec![lone]);
    let config = AnalysisConfig {
        bf_family: family,
        perm_bf_family: family,
        nb_perms: 30,
        trick: TrickMode::Off,
        ..config(4)
    };
    analyze(&mut dataset, &config).unwrap();
    let feature = &dataset.features[0];
    let summary = feature.records[0].abfs.weighted_abf(family.statistic_label());
    (feature.joint_perm.unwrap(), summary)
}

#[test]
fn joint_permutations_ignore_unmeasured_subgroups() {
    for family in [BfFamily::Subset, BfFamily::All] {
        let (joint, summary) = joint_outcome_measured_in_first_subgroup_only(family);
        assert!(summary.is_finite() && summary > 0.0, "{}: summary {}", family, summary);
        assert_eq!(joint.max_l10_true_abf, summary);
        assert_eq!(joint.nb_perms, 30);
        assert!(joint.pval < 0.2, "{}: joint p-value {}", family, joint.pval);
    }
}
