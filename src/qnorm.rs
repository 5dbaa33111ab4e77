// qnorm.rs

use statrs::distribution::{ContinuousCDF, Normal};

/// Replaces each value by the standard normal quantile of its rank.
///
/// Ranks use the plotting positions `(r - a) / (n + 1 - 2a)` with `a = 3/8`
/// for `n <= 10` and `a = 1/2` above; ties keep their input order.
pub fn quantile_normalize(values: &mut [f64]) {
    let n = values.len();
    if n == 0 {
        return;
    }
    let Ok(normal) = Normal::new(0.0, 1.0) else {
        return;
    };
    let a = if n <= 10 { 3.0 / 8.0 } else { 0.5 };
    let denom = n as f64 + 1.0 - 2.0 * a;

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&i, &j| values[i].total_cmp(&values[j]));
    let mut quantiles = vec![0.0; n];
    for (rank, &idx) in order.iter().enumerate() {
        quantiles[idx] = normal.inverse_cdf((rank as f64 + 1.0 - a) / denom);
    }
    values.copy_from_slice(&quantiles);
}
