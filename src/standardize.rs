// standardize.rs

use statrs::distribution::{ContinuousCDF, Normal, StudentsT};

use crate::regression::{OlsFit, VARIANCE_EPS};

/// Scale-free summary statistics of one subgroup, after the small-sample
/// correction: `bhat / sebhat == t`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StdSumStats {
    pub bhat: f64,
    pub sebhat: f64,
    pub t: f64,
}

impl StdSumStats {
    /// Triple of a subgroup with at most one observation.
    pub const NEUTRAL: StdSumStats = StdSumStats {
        bhat: 0.0,
        sebhat: 0.0,
        t: 0.0,
    };

    /// Triple carrying no evidence for an effect.
    pub const NO_EVIDENCE: StdSumStats = StdSumStats {
        bhat: 0.0,
        sebhat: f64::INFINITY,
        t: 0.0,
    };

    /// Standardizes one subgroup's OLS output fitted on `n` samples.
    ///
    /// `|bhat / sebhat|` is pushed through the Student-t(n-2) tail and mapped
    /// back to the standard normal quantile with the same tail mass, then the
    /// effect and its standard error are rescaled to agree with that quantile.
    pub fn from_ols(n: usize, fit: &OlsFit) -> StdSumStats {
        if n <= 1 {
            return StdSumStats::NEUTRAL;
        }
        let bhat = fit.betahat / fit.sigmahat;
        let sebhat = fit.sebetahat / fit.sigmahat;
        let z = (bhat / sebhat).abs();
        if !z.is_finite() || n <= 2 {
            return StdSumStats::NO_EVIDENCE;
        }

        let t = match normal_equivalent(z, (n - 2) as f64) {
            Some(t) => t.copysign(fit.betahat),
            None => return StdSumStats::NO_EVIDENCE,
        };
        if t.abs() <= VARIANCE_EPS {
            return StdSumStats::NO_EVIDENCE;
        }

        let sigmahat = fit.betahat.abs() / (t.abs() * sebhat);
        let bhat = fit.betahat / sigmahat;
        StdSumStats {
            bhat,
            sebhat: bhat / t,
            t,
        }
    }

    pub fn has_evidence(&self) -> bool {
        self.t.abs() >= VARIANCE_EPS
    }
}

/// |Phi^-1(P(T_df < -z))|, the normal quantile with the Student-t tail mass.
fn normal_equivalent(z: f64, df: f64) -> Option<f64> {
    let student = StudentsT::new(0.0, 1.0, df).ok()?;
    let normal = Normal::new(0.0, 1.0).ok()?;
    let tail = student.cdf(-z).clamp(f64::MIN_POSITIVE, 0.5);
    Some(normal.inverse_cdf(tail).abs())
}

/// Applies the correction to every subgroup of a record.
pub fn standardize_all(ns: &[usize], fits: &[OlsFit], out: &mut Vec<StdSumStats>) {
    out.clear();
    out.extend(
        ns.iter()
            .zip(fits.iter())
            .map(|(&n, fit)| StdSumStats::from_ols(n, fit)),
    );
}
