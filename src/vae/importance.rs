//! Importance-sampling estimate of log p(x), the probability that the
//! model generates a given (CDR3, V, J) triple.
//!
//! With z drawn from the posterior q(z|x), every draw gives the unbiased
//! estimate p(x|z) p(z) / q(z|x) of p(x). Averaging N such draws (in log
//! space) gives the final estimate.
use crate::shared::distributions::{diagonal_normal_log_pdf, normal, standard_normal_log_pdf};
use crate::shared::onehot::TcrTensors;
use crate::shared::utils::{log_mean_exp, logprob_of_obs, logprob_of_obs_vect};
use crate::vae::network::Network;
use crate::vae::sampler;
use anyhow::{anyhow, Result};
use ndarray::{Array1, Array2, Axis};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;

#[cfg(feature = "kdam")]
use kdam::TqdmParallelIterator;

/// Result of the estimation for a set of sequences
#[derive(Clone, Debug)]
pub struct ImportanceEstimate {
    /// (n_samples, n_sequences) single-sample estimates
    pub samples: Array2<f64>,
    /// Aggregated log p(x), one per sequence
    pub log_p_x: Vec<f64>,
}

/// log p(x|z) of every record, given the decoded distributions
pub fn log_p_x_given_z(probs: &TcrTensors, obs: &TcrTensors) -> Vec<f64> {
    (0..obs.len())
        .map(|i| {
            logprob_of_obs_vect(
                probs.cdr3.index_axis(Axis(0), i),
                obs.cdr3.index_axis(Axis(0), i),
            ) + logprob_of_obs(probs.v_gene.row(i), obs.v_gene.row(i))
                + logprob_of_obs(probs.j_gene.row(i), obs.j_gene.row(i))
        })
        .collect()
}

/// One importance sample for every record of `x`, the posterior being
/// already known.
fn sample_with_posterior<R: Rng>(
    network: &Network,
    x: &TcrTensors,
    z_mean: &Array2<f64>,
    z_sd: &Array2<f64>,
    rng: &mut R,
) -> Result<Vec<f64>> {
    let z = normal(z_mean, z_sd, rng);
    let probs = network.decoder.decode(&z)?;
    let log_p_x_z = log_p_x_given_z(&probs, x);

    Ok((0..x.len())
        .map(|i| {
            let log_p_z = standard_normal_log_pdf(z.row(i));
            let log_q_z_x = diagonal_normal_log_pdf(z.row(i), z_mean.row(i), z_sd.row(i));
            log_p_x_z[i] + log_p_z - log_q_z_x
        })
        .collect())
}

/// Encode `x`, return the posterior (mean, standard deviation)
fn posterior(network: &Network, x: &TcrTensors) -> Result<(Array2<f64>, Array2<f64>)> {
    let (z_mean, z_log_var, _) = network.encoder.forward(x)?;
    Ok((z_mean, sampler::standard_deviation(&z_log_var)))
}

/// A single-sample estimate of log p(x) for every record of `x`:
/// log p(x|z) + log p(z) - log q(z|x), with z ~ q(z|x)
pub fn log_p_of_x_importance_sample<R: Rng>(
    network: &Network,
    x: &TcrTensors,
    rng: &mut R,
) -> Result<Vec<f64>> {
    let (z_mean, z_sd) = posterior(network, x)?;
    sample_with_posterior(network, x, &z_mean, &z_sd, rng)
}

/// Combine N single-sample estimates of one sequence:
/// log(mean(exp(samples))). Only `-inf` estimates, or no estimate at all,
/// give `-inf`.
pub fn importance_weighted_log_estimate(samples: &[f64]) -> f64 {
    log_mean_exp(samples)
}

/// Run `n_samples` importance samples (in parallel) and aggregate them.
/// Every sample uses its own generator, seeded from `rng`, so the result
/// only depends on the state of `rng`.
pub fn importance_sample<R: Rng>(
    network: &Network,
    x: &TcrTensors,
    n_samples: usize,
    rng: &mut R,
) -> Result<ImportanceEstimate> {
    if n_samples == 0 {
        return Err(anyhow!("At least one importance sample is needed"));
    }
    let (z_mean, z_sd) = posterior(network, x)?;
    let seeds: Vec<u64> = (0..n_samples).map(|_| rng.gen()).collect();

    let iter = seeds.into_par_iter();
    #[cfg(feature = "kdam")]
    let iter = iter.tqdm();
    let rows = iter
        .map(|seed| {
            let mut sample_rng = SmallRng::seed_from_u64(seed);
            sample_with_posterior(network, x, &z_mean, &z_sd, &mut sample_rng)
        })
        .collect::<Result<Vec<_>>>()?;

    let mut samples = Array2::zeros((n_samples, x.len()));
    for (mut row, values) in samples.outer_iter_mut().zip(rows) {
        row.assign(&Array1::from(values));
    }
    let log_p_x = samples
        .axis_iter(Axis(1))
        .map(|column| importance_weighted_log_estimate(&column.to_vec()))
        .collect();
    Ok(ImportanceEstimate { samples, log_p_x })
}
