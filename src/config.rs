// config.rs

use std::fmt;

use crate::abf::BfFamily;
use crate::cis::CisAnchor;
use crate::error::{BmaError, Result};
use crate::permutation::TrickMode;

/// How far the analysis goes, from 1 (separate regressions only) to 5
/// (separate and joint analyses, both permutation schemes).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct AnalysisStep(u8);

impl AnalysisStep {
    pub fn new(step: u8) -> Result<Self> {
        if (1..=5).contains(&step) {
            Ok(Self(step))
        } else {
            Err(BmaError::config(format!(
                "step should be between 1 and 5, got {}",
                step
            )))
        }
    }

    pub fn value(&self) -> u8 {
        self.0
    }

    pub fn has_joint(&self) -> bool {
        self.0 >= 3
    }

    pub fn has_separate_perms(&self) -> bool {
        self.0 == 2 || self.0 == 5
    }

    pub fn has_joint_perms(&self) -> bool {
        self.0 >= 4
    }

    pub fn needs_perms(&self) -> bool {
        self.has_separate_perms() || self.has_joint_perms()
    }
}

impl fmt::Display for AnalysisStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Analysis parameters, validated once before any input is read.
#[derive(Clone, Debug)]
pub struct AnalysisConfig {
    pub anchor: CisAnchor,
    pub cis_half_window: u64,
    pub step: AnalysisStep,
    pub need_qnorm: bool,
    pub bf_family: BfFamily,
    pub perm_bf_family: BfFamily,
    pub nb_perms: usize,
    pub seed: u64,
    pub trick: TrickMode,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            anchor: CisAnchor::Fss,
            cis_half_window: 100_000,
            step: AnalysisStep(1),
            need_qnorm: false,
            bf_family: BfFamily::Const,
            perm_bf_family: BfFamily::Const,
            nb_perms: 0,
            seed: 0,
            trick: TrickMode::Off,
        }
    }
}

impl AnalysisConfig {
    /// Checks the combinations of options; `has_grid` tells whether a grid
    /// file was supplied.
    pub fn validate(&self, has_grid: bool) -> Result<()> {
        if self.step.has_joint() && !has_grid {
            return Err(BmaError::config(format!(
                "a grid file is required for step {}",
                self.step
            )));
        }
        if self.step.needs_perms() && self.nb_perms == 0 {
            return Err(BmaError::config(format!(
                "step {} requires a number of permutations above 0",
                self.step
            )));
        }
        if self.perm_bf_family > self.bf_family {
            return Err(BmaError::config(format!(
                "permutations on '{}' Bayes factors need --bfs '{}' or larger, got '{}'",
                self.perm_bf_family, self.perm_bf_family, self.bf_family
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(step: u8) -> AnalysisConfig {
        AnalysisConfig {
            step: AnalysisStep::new(step).unwrap(),
            ..AnalysisConfig::default()
        }
    }

    #[test]
    fn steps_enable_the_expected_stages() {
        let flags = |s: u8| {
            let st = AnalysisStep::new(s).unwrap();
            (st.has_separate_perms(), st.has_joint(), st.has_joint_perms())
        };
        assert_eq!(flags(1), (false, false, false));
        assert_eq!(flags(2), (true, false, false));
        assert_eq!(flags(3), (false, true, false));
        assert_eq!(flags(4), (false, true, true));
        assert_eq!(flags(5), (true, true, true));
        assert!(AnalysisStep::new(0).is_err());
        assert!(AnalysisStep::new(6).is_err());
    }

    #[test]
    fn joint_steps_need_a_grid() {
        assert!(config(1).validate(false).is_ok());
        assert!(config(3).validate(false).is_err());
        assert!(config(3).validate(true).is_ok());
    }

    #[test]
    fn permutation_steps_need_permutations() {
        let mut c = config(2);
        assert!(c.validate(false).is_err());
        c.nb_perms = 100;
        assert!(c.validate(false).is_ok());
    }

    #[test]
    fn perm_family_cannot_exceed_computed_family() {
        let mut c = config(4);
        c.nb_perms = 10;
        c.perm_bf_family = BfFamily::Subset;
        assert!(c.validate(true).is_err());
        c.bf_family = BfFamily::Subset;
        assert!(c.validate(true).is_ok());
        c.perm_bf_family = BfFamily::All;
        assert!(c.validate(true).is_err());
        c.bf_family = BfFamily::All;
        c.perm_bf_family = BfFamily::Const;
        assert!(c.validate(true).is_ok());
    }
}
