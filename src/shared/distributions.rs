//! Random distributions used by the sampler, the estimator and the generation
use anyhow::{anyhow, Result};
use ndarray::{Array2, ArrayView1, Zip};
use rand::Rng;
use rand_distr::{Distribution, StandardNormal, Uniform, WeightedAliasIndex};
use std::f64::consts::PI;

/// Generate an integer with a given probability
#[derive(Clone, Debug)]
pub struct DiscreteDistribution {
    distribution: WeightedAliasIndex<f64>,
}

impl DiscreteDistribution {
    pub fn new(weights: Vec<f64>) -> Result<Self> {
        if !weights.iter().all(|&x| x >= 0.) {
            return Err(anyhow!(
                "Error when creating distribution: negative weights"
            ))?;
        }

        let distribution = match weights.iter().sum::<f64>().abs() < 1e-10 {
            // when all the value are 0, all the values are equiprobable.
            true => WeightedAliasIndex::new(vec![1.; weights.len()])
                .map_err(|e| anyhow!(format!("Error when creating distribution: {}", e)))?,
            false => WeightedAliasIndex::new(weights)
                .map_err(|e| anyhow!(format!("Error when creating distribution: {}", e)))?,
        };
        Ok(DiscreteDistribution { distribution })
    }

    pub fn generate<R: Rng>(&self, rng: &mut R) -> usize {
        self.distribution.sample(rng)
    }
}

/// (rows, cols) matrix of independent N(0, 1) draws
pub fn standard_normal<R: Rng>(rows: usize, cols: usize, rng: &mut R) -> Array2<f64> {
    Array2::from_shape_fn((rows, cols), |_| StandardNormal.sample(rng))
}

/// Independent draws from N(mean, sd), component-wise
pub fn normal<R: Rng>(mean: &Array2<f64>, sd: &Array2<f64>, rng: &mut R) -> Array2<f64> {
    let mut z = standard_normal(mean.nrows(), mean.ncols(), rng);
    Zip::from(&mut z)
        .and(mean)
        .and(sd)
        .for_each(|z, &m, &s| *z = m + s * *z);
    z
}

/// (rows, cols) matrix of draws from U(low, high)
pub fn uniform<R: Rng>(rows: usize, cols: usize, low: f64, high: f64, rng: &mut R) -> Array2<f64> {
    let dist = Uniform::new(low, high);
    Array2::from_shape_fn((rows, cols), |_| dist.sample(rng))
}

/// Log of the density of N(mean, sd) at x
pub fn normal_log_pdf(x: f64, mean: f64, sd: f64) -> f64 {
    let u = (x - mean) / sd;
    -0.5 * u * u - sd.ln() - 0.5 * (2. * PI).ln()
}

/// Log density of a diagonal gaussian, the sum of the log densities
/// of its components
pub fn diagonal_normal_log_pdf(
    x: ArrayView1<f64>,
    mean: ArrayView1<f64>,
    sd: ArrayView1<f64>,
) -> f64 {
    Zip::from(&x)
        .and(&mean)
        .and(&sd)
        .fold(0., |acc, &x, &m, &s| acc + normal_log_pdf(x, m, s))
}

/// Log density of the standard normal prior N(0, I)
pub fn standard_normal_log_pdf(x: ArrayView1<f64>) -> f64 {
    x.iter().map(|&xi| normal_log_pdf(xi, 0., 1.)).sum()
}
