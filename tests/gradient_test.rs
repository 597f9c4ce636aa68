use anyhow::Result;
use rand::rngs::SmallRng;
use rand::SeedableRng;
use tcrvae::shared::distributions::standard_normal;
use tcrvae::vae::sampler::reparameterize;
use tcrvae::vae::{Network, Parametrized};
mod common;

fn perturbed(network: &Network, param: usize, element: usize, delta: f64) -> Network {
    let mut copy = network.clone();
    if let Some((_, mut p)) = copy.params_mut().into_iter().nth(param) {
        if let Some(x) = p.iter_mut().nth(element) {
            *x += delta;
        }
    }
    copy
}

#[test]
fn loss_matches_the_formula_by_hand() -> Result<()> {
    let params = common::tiny_params();
    let mut rng = SmallRng::seed_from_u64(21);
    let network = Network::new(&params, &mut rng);
    let batch = common::tiny_data()?;
    let noise = standard_normal(batch.len(), params.latent_dim, &mut rng);
    let n = batch.len() as f64;
    let (max_len, n_aas) = (params.max_cdr3_len, params.n_aas);

    let (z_mean, z_log_var, _) = network.encoder.forward(&batch)?;
    let z = reparameterize(&z_mean, &z_log_var, &noise)?;
    let probs = network.decoder.decode(&z)?;

    let mut xent_cdr3 = 0.;
    let mut xent_v = 0.;
    let mut xent_j = 0.;
    let mut kl = 0.;
    for i in 0..batch.len() {
        for pos in 0..max_len {
            for a in 0..n_aas {
                if batch.cdr3[[i, pos, a]] == 1. {
                    xent_cdr3 -= probs.cdr3[[i, pos, a]].ln();
                }
            }
        }
        for g in 0..params.n_v_genes {
            if batch.v_gene[[i, g]] == 1. {
                xent_v -= probs.v_gene[[i, g]].ln();
            }
        }
        for g in 0..params.n_j_genes {
            if batch.j_gene[[i, g]] == 1. {
                xent_j -= probs.j_gene[[i, g]].ln();
            }
        }
        for d in 0..params.latent_dim {
            let (m, lv) = (z_mean[[i, d]], z_log_var[[i, d]]);
            kl -= 0.5 * (1. + lv - m * m - lv.exp());
        }
    }
    // every output: (elements per record) * mean cross-entropy + batch_size / 3 * mean KL
    let kl_part = params.batch_size as f64 / 3. * kl / n;
    let cdr3 = (max_len * n_aas) as f64 * xent_cdr3 / (n * max_len as f64) + kl_part;
    let v_gene = params.n_v_genes as f64 * xent_v / n + kl_part;
    let j_gene = params.n_j_genes as f64 * xent_j / n + kl_part;

    let loss = network.loss(&batch, &noise, params.batch_size as f64)?;
    let [c, v, j] = loss.per_output();
    assert!((c - cdr3).abs() < 1e-9);
    assert!((v - v_gene).abs() < 1e-9);
    assert!((j - j_gene).abs() < 1e-9);
    assert!((loss.total() - (cdr3 + v_gene + j_gene)).abs() < 1e-9);
    Ok(())
}

#[test]
fn gradients_match_finite_differences() -> Result<()> {
    let params = common::tiny_params();
    let mut rng = SmallRng::seed_from_u64(42);
    let network = Network::new(&params, &mut rng);
    let batch = common::tiny_data()?;
    let noise = standard_normal(batch.len(), params.latent_dim, &mut rng);
    let kl_weight = params.batch_size as f64;

    let (loss, gradient) = network.loss_and_gradients(&batch, &noise, kl_weight)?;
    let direct = network.loss(&batch, &noise, kl_weight)?;
    assert!((loss.total() - direct.total()).abs() < 1e-12);

    let h = 1e-6;
    for (ip, (name, grad)) in gradient.params().iter().enumerate() {
        for (ie, &g) in grad.iter().enumerate() {
            let plus = perturbed(&network, ip, ie, h)
                .loss(&batch, &noise, kl_weight)?
                .total();
            let minus = perturbed(&network, ip, ie, -h)
                .loss(&batch, &noise, kl_weight)?
                .total();
            let numeric = (plus - minus) / (2. * h);
            assert!(
                (numeric - g).abs() < 1e-4 * (1. + g.abs()),
                "{}[{}]: analytic {} vs numeric {}",
                name,
                ie,
                g,
                numeric
            );
        }
    }
    Ok(())
}

#[test]
fn gradient_has_the_network_topology() -> Result<()> {
    let params = common::tiny_params();
    let mut rng = SmallRng::seed_from_u64(1);
    let network = Network::new(&params, &mut rng);
    let batch = common::tiny_data()?;
    let noise = standard_normal(batch.len(), params.latent_dim, &mut rng);
    let (_, gradient) = network.loss_and_gradients(&batch, &noise, 2.)?;

    let names: Vec<String> = network.params().into_iter().map(|(n, _)| n).collect();
    let grad_names: Vec<String> = gradient.params().into_iter().map(|(n, _)| n).collect();
    assert_eq!(names, grad_names);
    assert_eq!(network.nb_params(), gradient.nb_params());
    assert!(names.contains(&"CDR3_embedding/kernel".to_string()));
    assert!(names.contains(&"Jgene_prob_out/bias".to_string()));
    Ok(())
}
