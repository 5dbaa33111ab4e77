// configs.rs
//
// Enumeration of the configurations "the effect is present in exactly this
// subset of subgroups".

use std::ops::Range;

use itertools::Itertools;

/// One configuration: its label (sorted 1-based subgroup indices joined by
/// `-`) and the membership mask over all subgroups.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Configuration {
    pub label: String,
    pub members: Vec<bool>,
}

impl Configuration {
    fn from_indices(nb_subgroups: usize, indices: &[usize]) -> Self {
        let mut members = vec![false; nb_subgroups];
        let mut label = String::new();
        for (pos, &idx) in indices.iter().enumerate() {
            if pos > 0 {
                label.push('-');
            }
            label.push_str(&(idx + 1).to_string());
            members[idx] = true;
        }
        Self { label, members }
    }
}

/// All k-subsets of `0..n` in lexicographic order.
///
/// The iterator is finite and owns its whole state, so cloning it (or building
/// a new one) restarts the enumeration. The empty subset is never produced.
#[derive(Clone, Debug)]
pub struct Combinations {
    n: usize,
    inner: Option<itertools::structs::Combinations<Range<usize>>>,
}

impl Combinations {
    pub fn new(n: usize, k: usize) -> Self {
        Self {
            n,
            inner: (k > 0).then(|| (0..n).combinations(k)),
        }
    }
}

impl Iterator for Combinations {
    type Item = Configuration;

    fn next(&mut self) -> Option<Configuration> {
        let indices = self.inner.as_mut()?.next()?;
        Some(Configuration::from_indices(self.n, &indices))
    }
}

/// The S configurations with the effect in a single subgroup.
pub fn singletons(nb_subgroups: usize) -> Combinations {
    Combinations::new(nb_subgroups, 1)
}

/// Every non-empty proper subset of the subgroups, by increasing size.
///
/// The full set is the `const` configuration and is not part of it.
pub fn proper_subsets(nb_subgroups: usize) -> impl Iterator<Item = Configuration> + Clone {
    (1..nb_subgroups).flat_map(move |k| Combinations::new(nb_subgroups, k))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn lexicographic_labels() {
        let labels: Vec<String> = Combinations::new(4, 2).map(|c| c.label).collect();
        assert_eq!(labels, vec!["1-2", "1-3", "1-4", "2-3", "2-4", "3-4"]);
    }

    #[test]
    fn masks_follow_labels() {
        let c = Combinations::new(3, 2).nth(1).unwrap();
        assert_eq!(c.label, "1-3");
        assert_eq!(c.members, vec![true, false, true]);
    }

    #[test]
    fn proper_subset_count_is_two_to_the_s_minus_two() {
        for s in 1..=7usize {
            let labels: Vec<String> = proper_subsets(s).map(|c| c.label).collect();
            assert_eq!(labels.len(), (1usize << s) - 2);
            let unique: HashSet<&String> = labels.iter().collect();
            assert_eq!(unique.len(), labels.len());
            for label in &labels {
                let idx: Vec<usize> = label.split('-').map(|x| x.parse().unwrap()).collect();
                assert!(idx.windows(2).all(|w| w[0] < w[1]));
                assert!(idx.len() < s);
            }
        }
    }

    #[test]
    fn restarting_yields_the_same_sequence() {
        let it = proper_subsets(4);
        let first: Vec<_> = it.clone().collect();
        let second: Vec<_> = it.collect();
        assert_eq!(first, second);
    }

    #[test]
    fn degenerate_sizes_are_empty() {
        assert_eq!(Combinations::new(3, 0).count(), 0);
        assert_eq!(Combinations::new(2, 3).count(), 0);
        assert_eq!(Combinations::new(3, 3).count(), 1);
        assert_eq!(singletons(3).map(|c| c.label).collect::<Vec<_>>(), vec!["1", "2", "3"]);
    }
}
