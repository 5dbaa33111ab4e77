// input.rs
//
// Loaders for the text inputs. Every file may be gzip-compressed; a blank
// line ends a table.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use flate2::read::MultiGzDecoder;
use log::{debug, info, warn};

use crate::error::{BmaError, Result};
use crate::grid::{GridPoint, HyperGrid};
use crate::model::{Feature, Marker, MarkerCatalog, SampleIndex};

/// Columns before the per-sample probabilities of an IMPUTE row.
const IMPUTE_LEADING_COLS: usize = 5;

/// Opens a text file, decompressing it when its name ends in `.gz`.
pub fn open_text(path: &Path) -> Result<Box<dyn BufRead>> {
    let file = File::open(path).map_err(|e| {
        BmaError::config(format!("can't open file {}: {}", path.display(), e))
    })?;
    if path.extension().map_or(false, |ext| ext == "gz") {
        Ok(Box::new(BufReader::new(MultiGzDecoder::new(file))))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}

/// Non-blank lines up to the first blank one, with their 1-based numbers.
fn table_lines(path: &Path) -> Result<Vec<(usize, String)>> {
    let mut lines = Vec::new();
    for (idx, line) in open_text(path)?.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            break;
        }
        lines.push((idx + 1, line));
    }
    Ok(lines)
}

fn parse_f64(path: &Path, line: usize, token: &str) -> Result<f64> {
    token
        .parse::<f64>()
        .map_err(|_| BmaError::parse(path, line, format!("invalid number '{}'", token)))
}

fn parse_u64(path: &Path, line: usize, token: &str) -> Result<u64> {
    token
        .parse::<u64>()
        .map_err(|_| BmaError::parse(path, line, format!("invalid coordinate '{}'", token)))
}

/// `subgroup path` pairs, in file order. `#` starts a comment line.
pub fn load_path_list(path: &Path) -> Result<Vec<(String, PathBuf)>> {
    let mut entries: Vec<(String, PathBuf)> = Vec::new();
    for (line_no, line) in table_lines(path)? {
        if line.starts_with('#') {
            continue;
        }
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.len() != 2 {
            return Err(BmaError::parse(path, line_no, "expected two columns: subgroup and path"));
        }
        if entries.iter().any(|(s, _)| s == tokens[0]) {
            return Err(BmaError::parse(
                path,
                line_no,
                format!("subgroup '{}' is listed twice", tokens[0]),
            ));
        }
        entries.push((tokens[0].to_string(), PathBuf::from(tokens[1])));
    }
    if entries.is_empty() {
        return Err(BmaError::config(format!("no entry in {}", path.display())));
    }
    Ok(entries)
}

/// One identifier per line.
pub fn load_keep_list(path: &Path) -> Result<HashSet<String>> {
    let ids: HashSet<String> = table_lines(path)?
        .into_iter()
        .filter_map(|(_, line)| line.split_whitespace().next().map(str::to_string))
        .collect();
    info!("{} identifiers to keep from {}", ids.len(), path.display());
    Ok(ids)
}

/// `phi2 oma2` per line, equally weighted.
pub fn load_grid(path: &Path) -> Result<HyperGrid> {
    let mut points = Vec::new();
    for (line_no, line) in table_lines(path)? {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.len() != 2 {
            return Err(BmaError::parse(path, line_no, "expected two columns: phi2 and oma2"));
        }
        points.push(GridPoint::new(
            parse_f64(path, line_no, tokens[0])?,
            parse_f64(path, line_no, tokens[1])?,
        ));
    }
    if points.is_empty() {
        return Err(BmaError::config(format!("grid {} is empty", path.display())));
    }
    info!("grid size: {}", points.len());
    Ok(HyperGrid::uniform(points))
}

fn first_line(path: &Path) -> Result<String> {
    let mut header = String::new();
    open_text(path)?.read_line(&mut header)?;
    Ok(header)
}

/// Sample names of a phenotype matrix header, without the optional `Id`.
pub fn read_pheno_samples(path: &Path) -> Result<Vec<String>> {
    let header = first_line(path)?;
    let mut tokens: Vec<String> = header.split_whitespace().map(str::to_string).collect();
    if tokens.first().map_or(false, |t| t == "Id") {
        tokens.remove(0);
    }
    if tokens.is_empty() {
        return Err(BmaError::parse(path, 1, "no sample in header"));
    }
    Ok(tokens)
}

/// Sample names of an IMPUTE header (`ind_a1a1 ind_a1a2 ind_a2a2` triplets).
pub fn read_geno_samples(path: &Path) -> Result<Vec<String>> {
    let header = first_line(path)?;
    let tokens: Vec<&str> = header.split_whitespace().collect();
    if tokens.len() < IMPUTE_LEADING_COLS || (tokens.len() - IMPUTE_LEADING_COLS) % 3 != 0 {
        return Err(BmaError::parse(path, 1, "badly formatted IMPUTE header"));
    }
    Ok(tokens[IMPUTE_LEADING_COLS..]
        .iter()
        .step_by(3)
        .map(|t| match t.find("_a") {
            Some(pos) => t[..pos].to_string(),
            None => t.to_string(),
        })
        .collect())
}

/// Global sample ordering: phenotype samples by subgroup order of first
/// appearance, then genotype-only samples.
pub fn reconcile_samples(pheno_samples: &[Vec<String>], geno_samples: &[String]) -> SampleIndex {
    let mut samples: Vec<String> = Vec::new();
    let mut seen: HashSet<&str> = HashSet::new();
    for name in pheno_samples.iter().flatten().chain(geno_samples.iter()) {
        if seen.insert(name.as_str()) {
            samples.push(name.clone());
        }
    }

    let columns = |names: &[String]| -> Vec<Option<usize>> {
        let mut pos: HashMap<&str, usize> = HashMap::new();
        for (idx, name) in names.iter().enumerate() {
            pos.entry(name.as_str()).or_insert(idx);
        }
        samples.iter().map(|s| pos.get(s.as_str()).copied()).collect()
    };
    let pheno_cols = pheno_samples.iter().map(|names| columns(names)).collect();
    let geno_cols = columns(geno_samples);

    SampleIndex {
        samples,
        pheno_cols,
        geno_cols,
    }
}

/// Phenotype matrices of every subgroup, merged per feature and sorted by
/// feature name.
pub fn load_phenotypes(paths: &[PathBuf], keep: Option<&HashSet<String>>) -> Result<Vec<Feature>> {
    let nb_subgroups = paths.len();
    let mut features: BTreeMap<String, Feature> = BTreeMap::new();

    for (s, path) in paths.iter().enumerate() {
        let nb_samples = read_pheno_samples(path)?.len();
        let mut nb_rows = 0usize;
        for (line_no, line) in table_lines(path)?.into_iter().skip(1) {
            let tokens: Vec<&str> = line.split_whitespace().collect();
            let name = tokens[0];
            if keep.map_or(false, |k| !k.contains(name)) {
                continue;
            }
            if tokens.len() != nb_samples + 1 {
                return Err(BmaError::parse(
                    path,
                    line_no,
                    format!("expected {} columns, found {}", nb_samples + 1, tokens.len()),
                ));
            }
            let mut values = Vec::with_capacity(nb_samples);
            let mut is_na = Vec::with_capacity(nb_samples);
            for token in &tokens[1..] {
                if *token == "NA" {
                    values.push(f64::NAN);
                    is_na.push(true);
                } else {
                    values.push(parse_f64(path, line_no, token)?);
                    is_na.push(false);
                }
            }
            let feature = features
                .entry(name.to_string())
                .or_insert_with(|| Feature::new(name, nb_subgroups));
            feature.phenotypes[s] = values;
            feature.is_na[s] = is_na;
            nb_rows += 1;
        }
        debug!("{}: {} features", path.display(), nb_rows);
    }

    if features.is_empty() {
        return Err(BmaError::invalid_data("no feature to analyze"));
    }
    info!("nb of features: {}", features.len());
    Ok(features.into_values().collect())
}

/// Fills chromosome and 1-based coordinates from a BED file.
pub fn load_feature_coords(path: &Path, features: &mut [Feature]) -> Result<()> {
    let by_name: HashMap<String, usize> = features
        .iter()
        .enumerate()
        .map(|(idx, f)| (f.name.clone(), idx))
        .collect();

    for (line_no, line) in table_lines(path)? {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.len() < 4 {
            return Err(BmaError::parse(path, line_no, "expected at least 4 BED columns"));
        }
        let Some(&idx) = by_name.get(tokens[3]) else {
            continue;
        };
        let feature = &mut features[idx];
        feature.chr = tokens[0].to_string();
        feature.start = parse_u64(path, line_no, tokens[1])? + 1;
        feature.end = parse_u64(path, line_no, tokens[2])?;
    }

    if let Some(missing) = features.iter().find(|f| f.chr.is_empty()) {
        return Err(BmaError::invalid_data(format!(
            "some features have no coordinate, eg. {}",
            missing.name
        )));
    }
    Ok(())
}

/// Markers of an IMPUTE file: dosage `AB + 2 BB`, missing when the three
/// probabilities are 0, folded minor allele frequency.
pub fn load_genotypes(path: &Path, keep: Option<&HashSet<String>>) -> Result<MarkerCatalog> {
    let nb_samples = read_geno_samples(path)?.len();
    let expected = IMPUTE_LEADING_COLS + 3 * nb_samples;
    let mut seen: HashSet<String> = HashSet::new();
    let mut markers = Vec::new();

    for (line_no, line) in table_lines(path)?.into_iter().skip(1) {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.len() < 2 {
            return Err(BmaError::parse(path, line_no, "truncated line"));
        }
        let name = tokens[1];
        if keep.map_or(false, |k| !k.contains(name)) {
            continue;
        }
        if tokens.len() != expected {
            return Err(BmaError::parse(
                path,
                line_no,
                format!("expected {} columns, found {}", expected, tokens.len()),
            ));
        }
        if !seen.insert(name.to_string()) {
            warn!("marker {} appears more than once, keeping the first", name);
            continue;
        }

        let mut genotypes = vec![0.0; nb_samples];
        let mut is_na = vec![false; nb_samples];
        let mut dosage_sum = 0.0;
        for i in 0..nb_samples {
            let base = IMPUTE_LEADING_COLS + 3 * i;
            let aa = parse_f64(path, line_no, tokens[base])?;
            let ab = parse_f64(path, line_no, tokens[base + 1])?;
            let bb = parse_f64(path, line_no, tokens[base + 2])?;
            if aa == 0.0 && ab == 0.0 && bb == 0.0 {
                is_na[i] = true;
            } else {
                genotypes[i] = ab + 2.0 * bb;
                dosage_sum += genotypes[i];
            }
        }
        let nb_called = is_na.iter().filter(|&&na| !na).count();
        let maf = if nb_called == 0 {
            debug!("marker {} has no genotype call", name);
            f64::NAN
        } else {
            let freq = dosage_sum / (2 * nb_called) as f64;
            if freq <= 0.5 { freq } else { 1.0 - freq }
        };

        markers.push(Marker {
            name: name.to_string(),
            chr: tokens[0].to_string(),
            coord: parse_u64(path, line_no, tokens[2])?,
            genotypes,
            is_na,
            maf,
        });
    }

    info!("nb of SNPs: {}", markers.len());
    Ok(MarkerCatalog::new(markers))
}
