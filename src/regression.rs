// regression.rs

use statrs::distribution::{ContinuousCDF, FisherSnedecor};

/// Genotype variance (and effect size) below which a fit is treated as flat.
pub const VARIANCE_EPS: f64 = 1e-8;

/// Summary statistics of `y = mu + g * beta + e`, `e ~ N(0, sigma^2)`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OlsFit {
    pub betahat: f64,
    pub sebetahat: f64,
    pub sigmahat: f64,
    pub pval: f64,
    pub r2: f64,
}

impl OlsFit {
    /// Placeholder for a subgroup that was never fitted.
    pub const MISSING: OlsFit = OlsFit {
        betahat: f64::NAN,
        sebetahat: f64::NAN,
        sigmahat: f64::NAN,
        pval: f64::NAN,
        r2: f64::NAN,
    };
}

/// Closed-form simple linear regression of `y` on `g`.
///
/// Missing values must already be filtered out and both slices must have the
/// same length `n >= 2`. A genotype without variation is not an error: it
/// yields `betahat = 0`, `sebetahat = +inf`, `pval = 1`, `r2 = 0`.
pub fn ols(g: &[f64], y: &[f64]) -> OlsFit {
    debug_assert_eq!(g.len(), y.len());
    let n = g.len() as f64;

    let (mut ym, mut gm, mut yty, mut gtg, mut gty) = (0.0, 0.0, 0.0, 0.0, 0.0);
    for (&gi, &yi) in g.iter().zip(y.iter()) {
        ym += yi;
        gm += gi;
        yty += yi * yi;
        gtg += gi * gi;
        gty += gi * yi;
    }
    ym /= n;
    gm /= n;

    let vg = gtg - n * gm * gm;
    let rss0 = (yty - n * ym * ym).max(0.0);
    let df = n - 2.0;

    if vg <= VARIANCE_EPS {
        return OlsFit {
            betahat: 0.0,
            sebetahat: f64::INFINITY,
            sigmahat: (rss0 / df).sqrt(),
            pval: 1.0,
            r2: 0.0,
        };
    }

    let betahat = (gty - n * gm * ym) / vg;
    // RSS of the full model; rounding can push it below zero on exact fits.
    let rss1 = (yty - (n * ym * (gtg * ym - gm * gty) - gty * (n * gm * ym - gty)) / vg).max(0.0);
    let sigmahat = if betahat.abs() > VARIANCE_EPS {
        (rss1 / df).sqrt()
    } else {
        (rss0 / df).sqrt()
    };
    let sebetahat = sigmahat / vg.sqrt();

    let mss = betahat * betahat * vg;
    let pval = f_test_upper_tail(mss / (sigmahat * sigmahat), df);
    let r2 = mss / (mss + rss1);

    OlsFit {
        betahat,
        sebetahat,
        sigmahat,
        pval,
        r2,
    }
}

/// P(F(1, df) > fstat); NaN when the test is undefined (no residual df).
fn f_test_upper_tail(fstat: f64, df: f64) -> f64 {
    if fstat.is_nan() {
        return f64::NAN;
    }
    if fstat == f64::INFINITY {
        return 0.0;
    }
    match FisherSnedecor::new(1.0, df) {
        Ok(f_dist) => f_dist.sf(fstat).clamp(0.0, 1.0),
        Err(_) => f64::NAN,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::{assert_abs_diff_eq, assert_relative_eq};

    #[test]
    fn flat_genotype_is_degenerate_for_any_n() {
        for n in 2..12 {
            let g = vec![1.0; n];
            let y: Vec<f64> = (0..n).map(|i| (i as f64).sin()).collect();
            let fit = ols(&g, &y);
            assert_eq!(fit.betahat, 0.0);
            assert!(fit.sebetahat.is_infinite());
            assert_eq!(fit.pval, 1.0);
            assert_eq!(fit.r2, 0.0);
        }
    }

    #[test]
    fn noiseless_line_is_recovered() {
        let g = [0.0, 1.0, 2.0, 1.0, 0.0, 2.0, 1.0];
        let y: Vec<f64> = g.iter().map(|x| 0.5 + 1.75 * x).collect();
        let fit = ols(&g, &y);
        assert_relative_eq!(fit.betahat, 1.75, epsilon = 1e-10);
        assert_abs_diff_eq!(fit.sigmahat, 0.0, epsilon = 1e-6);
        assert_abs_diff_eq!(fit.r2, 1.0, epsilon = 1e-10);
        assert!(fit.pval < 1e-10);
    }

    #[test]
    fn matches_hand_computed_fit() {
        // y = 1 + 2g + e with residuals (0.1, -0.2, 0.1, 0.0, 0.0)
        let g = [0.0, 1.0, 2.0, 0.0, 1.0];
        let y = [1.1, 2.8, 5.1, 1.0, 3.0];
        let fit = ols(&g, &y);

        // gm = 0.8, vg = 6 - 5 * 0.64 = 2.8, sxy = 16.0 - 5 * 0.8 * 2.6 = 5.6
        assert_relative_eq!(fit.betahat, 2.0, epsilon = 1e-12);
        let intercept = 2.6 - fit.betahat * 0.8;
        let rss: f64 = g
            .iter()
            .zip(y.iter())
            .map(|(gi, yi)| (yi - intercept - fit.betahat * gi).powi(2))
            .sum();
        assert_relative_eq!(fit.sigmahat, (rss / 3.0).sqrt(), epsilon = 1e-10);
        assert_relative_eq!(fit.sebetahat, fit.sigmahat / 2.8_f64.sqrt(), epsilon = 1e-12);
        let mss = fit.betahat * fit.betahat * 2.8;
        assert_relative_eq!(fit.r2, mss / (mss + rss), epsilon = 1e-10);
        assert!(fit.pval > 0.0 && fit.pval < 0.01);
    }

    #[test]
    fn two_samples_leave_no_residual_df() {
        let fit = ols(&[0.0, 1.0], &[1.0, 3.0]);
        assert_relative_eq!(fit.betahat, 2.0, epsilon = 1e-12);
        assert!(fit.sigmahat.is_nan());
        assert!(fit.pval.is_nan());
    }
}
