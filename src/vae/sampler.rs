//! Reparameterization trick: z = z_mean + exp(z_log_var / 2) * eps
//!
//! The randomness is isolated in `eps` so that z is a differentiable
//! function of the posterior parameters. The noise has one row per input
//! row, whatever the configured batch size.
use crate::shared::distributions::standard_normal;
use anyhow::{anyhow, Result};
use ndarray::{Array2, Zip};
use rand::Rng;

/// One row of N(0, 1) noise per input row
pub fn draw_noise<R: Rng>(n_rows: usize, latent_dim: usize, rng: &mut R) -> Array2<f64> {
    standard_normal(n_rows, latent_dim, rng)
}

/// Posterior standard deviation, exp(z_log_var / 2)
pub fn standard_deviation(z_log_var: &Array2<f64>) -> Array2<f64> {
    z_log_var.mapv(|lv| (lv / 2.).exp())
}

pub fn reparameterize(
    z_mean: &Array2<f64>,
    z_log_var: &Array2<f64>,
    noise: &Array2<f64>,
) -> Result<Array2<f64>> {
    if z_mean.dim() != z_log_var.dim() || z_mean.dim() != noise.dim() {
        return Err(anyhow!(
            "Shape mismatch in the sampler: mean {:?}, log variance {:?}, noise {:?}",
            z_mean.dim(),
            z_log_var.dim(),
            noise.dim()
        ));
    }
    let mut z = z_mean.clone();
    Zip::from(&mut z)
        .and(z_log_var)
        .and(noise)
        .for_each(|z, &lv, &eps| *z += (lv / 2.).exp() * eps);
    Ok(z)
}

/// Gradients with respect to (z_mean, z_log_var) given the gradient
/// with respect to z
pub fn backward(
    z_log_var: &Array2<f64>,
    noise: &Array2<f64>,
    grad_z: &Array2<f64>,
) -> (Array2<f64>, Array2<f64>) {
    let mut grad_z_log_var = grad_z.clone();
    Zip::from(&mut grad_z_log_var)
        .and(z_log_var)
        .and(noise)
        .for_each(|g, &lv, &eps| *g *= 0.5 * (lv / 2.).exp() * eps);
    (grad_z.clone(), grad_z_log_var)
}
