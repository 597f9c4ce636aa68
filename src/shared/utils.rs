//! Numerical helpers shared by the network and the estimator
use ndarray::{Array2, Array3, ArrayView1, ArrayView2, Axis};

/// log(sum(exp(x))), stable for large |x|. An empty or all `-inf` input
/// returns `-inf`.
/// ```
/// use tcrvae::shared::utils::log_sum_exp;
/// let x = [1000., 1000.];
/// assert!((log_sum_exp(&x) - (1000. + 2f64.ln())).abs() < 1e-10);
/// assert_eq!(log_sum_exp(&[f64::NEG_INFINITY]), f64::NEG_INFINITY);
/// ```
pub fn log_sum_exp(x: &[f64]) -> f64 {
    let max = x.iter().cloned().fold(f64::NEG_INFINITY, max_f64);
    if max == f64::NEG_INFINITY {
        return f64::NEG_INFINITY;
    }
    if max.is_infinite() || max.is_nan() {
        return max;
    }
    max + x.iter().map(|&xi| (xi - max).exp()).sum::<f64>().ln()
}

/// Log of the arithmetic mean of numbers given in log space. The mean of
/// nothing is taken as 0, so an empty input returns `-inf`.
pub fn log_mean_exp(x: &[f64]) -> f64 {
    if x.is_empty() {
        return f64::NEG_INFINITY;
    }
    log_sum_exp(x) - (x.len() as f64).ln()
}

pub fn max_f64(a: f64, b: f64) -> f64 {
    match (a, b) {
        // If either is NaN, return NaN
        (a, b) if a.is_nan() || b.is_nan() => f64::NAN,
        _ => a.max(b),
    }
}

/// Exponential linear unit
pub fn elu(x: f64) -> f64 {
    if x > 0. {
        x
    } else {
        x.exp_m1()
    }
}

/// Derivative of the elu, expressed with its output `y = elu(x)`
pub fn elu_derivative_from_output(y: f64) -> f64 {
    if y > 0. {
        1.
    } else {
        y + 1.
    }
}

/// Log-softmax of every row
pub fn log_softmax_rows(logits: &Array2<f64>) -> Array2<f64> {
    let mut out = logits.clone();
    for mut row in out.axis_iter_mut(Axis(0)) {
        let lse = log_sum_exp(&row.to_vec());
        row.mapv_inplace(|x| x - lse);
    }
    out
}

pub fn softmax_rows(logits: &Array2<f64>) -> Array2<f64> {
    log_softmax_rows(logits).mapv_into(f64::exp)
}

/// Log-softmax along the last axis (position-wise for a (n, len, vocab) tensor)
pub fn log_softmax_last_axis(logits: &Array3<f64>) -> Array3<f64> {
    let mut out = logits.clone();
    for mut seq in out.axis_iter_mut(Axis(0)) {
        for mut row in seq.axis_iter_mut(Axis(0)) {
            let lse = log_sum_exp(&row.to_vec());
            row.mapv_inplace(|x| x - lse);
        }
    }
    out
}

pub fn softmax_last_axis(logits: &Array3<f64>) -> Array3<f64> {
    log_softmax_last_axis(logits).mapv_into(f64::exp)
}

/// Log-probability of a series of observations: every row of `probs` is a
/// distribution, every row of `obs` one-hot encodes what was observed.
/// An all-zero observation row gives `-inf`.
pub fn logprob_of_obs_vect(probs: ArrayView2<f64>, obs: ArrayView2<f64>) -> f64 {
    probs
        .outer_iter()
        .zip(obs.outer_iter())
        .map(|(p, o)| logprob_of_obs(p, o))
        .sum()
}

/// Log-probability of a single one-hot encoded observation
pub fn logprob_of_obs(probs: ArrayView1<f64>, obs: ArrayView1<f64>) -> f64 {
    probs.dot(&obs).ln()
}
