use anyhow::Result;
use ndarray::{Array2, Axis};
use rand::rngs::SmallRng;
use rand::SeedableRng;
use tcrvae::shared::distributions::standard_normal;
use tcrvae::shared::{unpadded_sequences_to_onehot, TrainingParameters};
use tcrvae::vae::LOSS_NAMES;
use tcrvae::Model;
mod common;

#[test]
fn decoded_distributions_are_normalized() -> Result<()> {
    let model = common::tiny_model(1)?;
    let mut rng = SmallRng::seed_from_u64(2);
    let z = standard_normal(7, 2, &mut rng) * 3.;
    let decoded = model.decode(&z)?;

    assert_eq!(decoded.cdr3.dim(), (7, 3, 4));
    assert_eq!(decoded.v_gene.dim(), (7, 2));
    assert_eq!(decoded.j_gene.dim(), (7, 2));
    for s in decoded.cdr3.sum_axis(Axis(2)).iter() {
        assert!((s - 1.).abs() < 1e-10);
    }
    for s in decoded.v_gene.sum_axis(Axis(1)).iter() {
        assert!((s - 1.).abs() < 1e-10);
    }
    for s in decoded.j_gene.sum_axis(Axis(1)).iter() {
        assert!((s - 1.).abs() < 1e-10);
    }
    Ok(())
}

#[test]
fn decode_rejects_wrong_latent_dimension() -> Result<()> {
    let model = common::tiny_model(1)?;
    assert!(model.decode(&Array2::zeros((2, 3))).is_err());
    Ok(())
}

#[test]
fn evaluate_small_scenario() -> Result<()> {
    let model = common::tiny_model(3)?;
    let data = common::tiny_data()?.slice_rows(0, 2);

    let loss = model.evaluate(&data, &mut SmallRng::seed_from_u64(11))?;
    assert!(loss.total().is_finite());
    assert!(loss.cdr3 >= 0.);
    assert!(loss.v_gene >= 0.);
    assert!(loss.j_gene >= 0.);

    // same seed, same weights: same value
    let again = model.evaluate(&data, &mut SmallRng::seed_from_u64(11))?;
    assert_eq!(loss, again);

    let values = loss.values();
    assert_eq!(values.len(), LOSS_NAMES.len());
    assert!((values[0] - values[1..].iter().sum::<f64>()).abs() < 1e-9);
    Ok(())
}

#[test]
fn evaluate_rejects_partial_batches() -> Result<()> {
    let model = common::tiny_model(3)?;
    let data = common::tiny_data()?.slice_rows(0, 3);
    assert!(model
        .evaluate(&data, &mut SmallRng::seed_from_u64(0))
        .is_err());
    Ok(())
}

#[test]
fn inputs_of_another_shape_are_errors() -> Result<()> {
    let mut model = common::tiny_model(3)?;
    // CDR3 of length 4 where the network expects 3
    let longer =
        unpadded_sequences_to_onehot(&common::tiny_records(), 4, &common::tiny_vocabulary())?;
    assert_eq!(model.params().max_cdr3_len, 3);
    let mut rng = SmallRng::seed_from_u64(0);
    assert!(model.evaluate(&longer, &mut rng).is_err());
    assert!(model.encode(&longer).is_err());
    assert!(model.importance_sample(&longer, 2, &mut rng).is_err());
    assert!(model
        .fit(&longer, 0., &TrainingParameters::default(), &mut rng)
        .is_err());
    Ok(())
}

#[test]
fn large_log_variances_keep_finite_deviations() -> Result<()> {
    let mut model = common::tiny_model(4)?;
    let encoder = &mut model.network.encoder;
    encoder.z_log_var.kernel.fill(0.);
    encoder.z_log_var.bias.fill(800.);

    let (_, z_sd) = model.encode(&common::tiny_data()?)?;
    assert!(z_sd.iter().all(|&x| x.is_finite() && x == 400f64.exp()));
    Ok(())
}

#[test]
fn encode_returns_positive_deviations() -> Result<()> {
    let model = common::tiny_model(4)?;
    let data = common::tiny_data()?;
    let (z_mean, z_sd) = model.encode(&data)?;
    assert_eq!(z_mean.dim(), (4, 2));
    assert_eq!(z_sd.dim(), (4, 2));
    assert!(z_sd.iter().all(|&x| x > 0.));
    Ok(())
}

#[test]
fn weights_round_trip() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let model = common::tiny_model(5)?;
    let data = common::tiny_data()?;
    model.save_directory(dir.path())?;

    let reloaded = Model::of_directory(dir.path())?;
    assert_eq!(reloaded.params(), model.params());
    let before = model.evaluate(&data, &mut SmallRng::seed_from_u64(8))?;
    let after = reloaded.evaluate(&data, &mut SmallRng::seed_from_u64(8))?;
    assert!((before.total() - after.total()).abs() < 1e-12);
    Ok(())
}

#[test]
fn weights_of_another_topology_are_rejected() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("weights.json");
    common::tiny_model(5)?.save_weights(&path)?;

    let mut params = common::tiny_params();
    params.latent_dim = 3;
    let mut other = Model::new(&params, &mut SmallRng::seed_from_u64(0))?;
    let untouched = other.network.decoder.dense_1.kernel.clone();
    assert!(other.load_weights(&path).is_err());
    assert_eq!(other.network.decoder.dense_1.kernel, untouched);
    Ok(())
}

#[test]
fn generate_returns_exactly_n() -> Result<()> {
    let model = common::tiny_model(6)?;
    let vocabulary = common::tiny_vocabulary();
    let mut rng = SmallRng::seed_from_u64(0);
    for n in [1, 2, 3, 5] {
        assert_eq!(model.generate(n, &vocabulary, &mut rng)?.len(), n);
        assert_eq!(model.generate_sampled(n, &vocabulary, &mut rng)?.len(), n);
    }
    let records = model.generate(5, &vocabulary, &mut rng)?;
    for record in records {
        assert!(record.amino_acid.len() <= 3);
        assert!(!record.amino_acid.contains('-'));
    }
    Ok(())
}

#[test]
fn fit_rejects_partial_batches() -> Result<()> {
    let mut model = common::tiny_model(7)?;
    let data = common::tiny_data()?.slice_rows(0, 3);
    let result = model.fit(
        &data,
        0.,
        &TrainingParameters::default(),
        &mut SmallRng::seed_from_u64(0),
    );
    assert!(result.is_err());
    Ok(())
}

#[test]
fn fit_reduces_the_loss() -> Result<()> {
    let mut params = common::tiny_params();
    params.epochs = 300;
    params.patience = 300;
    let mut rng = SmallRng::seed_from_u64(9);
    let mut model = Model::new(&params, &mut rng)?;

    let data = common::tiny_data()?;
    let indices: Vec<usize> = (0..16).map(|i| i % 4).collect();
    let data = data.select_rows(&indices);

    let history = model.fit(&data, 0.25, &TrainingParameters::new(1e-2), &mut rng)?;
    assert_eq!(history.loss.len(), 300);
    assert_eq!(history.val_loss.len(), 300);
    assert!(history.stopped_epoch.is_none());
    let first = history.loss[0];
    let last: f64 = history.loss[290..].iter().sum::<f64>() / 10.;
    assert!(last < first);
    Ok(())
}

#[test]
fn fit_honours_patience() -> Result<()> {
    let mut params = common::tiny_params();
    params.epochs = 100;
    params.patience = 2;
    let mut rng = SmallRng::seed_from_u64(10);
    let mut model = Model::new(&params, &mut rng)?;
    let data = common::tiny_data()?;

    // no learning: only the sampling noise moves the loss
    let history = model.fit(&data, 0., &TrainingParameters::new(0.), &mut rng)?;
    let stopped = history.stopped_epoch.expect("early stopping should trigger");
    assert_eq!(history.loss.len(), stopped + 1);
    assert!(history.val_loss.is_empty());
    let best_before = history.loss[..=stopped - 2]
        .iter()
        .cloned()
        .fold(f64::INFINITY, f64::min);
    for &l in &history.loss[stopped - 1..] {
        assert!(l >= best_before);
    }
    Ok(())
}
