//! The model facade: a network together with its hyperparameters.
//!
//! A freshly built model has random weights; `fit` or `load_weights` make it
//! useful, but every operation is available in both states.
use crate::shared::distributions::standard_normal;
use crate::shared::gene::TcrVocabulary;
use crate::shared::onehot::{onehot_to_sequences, sample_sequences, TcrTensors};
use crate::shared::parameters::{Hyperparameters, TrainingParameters};
use crate::shared::sequence::TcrRecord;
use crate::vae::importance::{self, ImportanceEstimate};
use crate::vae::layers::Parametrized;
use crate::vae::loss::VaeLoss;
use crate::vae::network::Network;
use crate::vae::optimizer::Adam;
use crate::vae::sampler;
use crate::vae::weights;
use anyhow::{anyhow, Result};
use log::{debug, info, warn};
use ndarray::Array2;
use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::path::Path;

pub const PARAMS_FILENAME: &str = "model_params.json";
pub const WEIGHTS_FILENAME: &str = "best_weights.json";

#[derive(Clone, Debug)]
pub struct Model {
    // fixed at construction, the network topology depends on it
    params: Hyperparameters,
    pub network: Network,
}

/// Per-epoch record of a training run
#[derive(Clone, Debug, Default)]
pub struct FitHistory {
    pub loss: Vec<f64>,
    // empty when there is no validation set
    pub val_loss: Vec<f64>,
    // epoch (0-based) at which early stopping triggered
    pub stopped_epoch: Option<usize>,
}

impl Model {
    pub fn new<R: Rng>(params: &Hyperparameters, rng: &mut R) -> Result<Model> {
        params.validate()?;
        Ok(Model {
            params: params.clone(),
            network: Network::new(params, rng),
        })
    }

    /// Build a model (random weights) from a hyperparameter file
    pub fn of_json_file<R: Rng>(path: &Path, rng: &mut R) -> Result<Model> {
        Model::new(&Hyperparameters::load_json(path)?, rng)
    }

    /// Load a model saved with `save_directory`
    pub fn of_directory(path: &Path) -> Result<Model> {
        // the initial weights are overwritten right away
        let mut rng = SmallRng::seed_from_u64(0);
        let mut model = Model::of_json_file(&path.join(PARAMS_FILENAME), &mut rng)?;
        model.load_weights(&path.join(WEIGHTS_FILENAME))?;
        Ok(model)
    }

    pub fn params(&self) -> &Hyperparameters {
        &self.params
    }

    pub fn save_directory(&self, path: &Path) -> Result<()> {
        std::fs::create_dir_all(path)?;
        self.save_params(&path.join(PARAMS_FILENAME))?;
        self.save_weights(&path.join(WEIGHTS_FILENAME))
    }

    pub fn save_params(&self, path: &Path) -> Result<()> {
        self.params.save_json(path)
    }

    pub fn save_weights(&self, path: &Path) -> Result<()> {
        weights::save_weights(path, &self.network)
    }

    /// Fails if the stored weights do not match the architecture
    pub fn load_weights(&mut self, path: &Path) -> Result<()> {
        weights::load_weights(path, &mut self.network)
    }

    pub fn nb_params(&self) -> usize {
        self.network.nb_params()
    }

    fn check_batches(&self, data: &TcrTensors) -> Result<()> {
        data.check_shape(&self.params)?;
        if data.is_empty() || data.len() % self.params.batch_size != 0 {
            return Err(anyhow!(
                "The number of sequences ({}) should be a non-zero multiple of the batch size ({})",
                data.len(),
                self.params.batch_size
            ));
        }
        Ok(())
    }

    /// Average loss over `data`, batch by batch, without updating the weights
    fn mean_loss<R: Rng>(&self, data: &TcrTensors, rng: &mut R) -> Result<VaeLoss> {
        let batch_size = self.params.batch_size;
        let mut total = VaeLoss::default();
        for start in (0..data.len()).step_by(batch_size) {
            let end = (start + batch_size).min(data.len());
            let batch = data.slice_rows(start, end);
            let noise = sampler::draw_noise(batch.len(), self.params.latent_dim, rng);
            let loss = self.network.loss(&batch, &noise, batch_size as f64)?;
            total += loss.scale(batch.len() as f64);
        }
        Ok(total.scale(1. / (data.len().max(1) as f64)))
    }

    /// Train with Adam and early stopping on the training loss.
    /// The last `validation_split` fraction of `data` is held out (before
    /// shuffling) and only used to report a validation loss.
    pub fn fit<R: Rng>(
        &mut self,
        data: &TcrTensors,
        validation_split: f64,
        training: &TrainingParameters,
        rng: &mut R,
    ) -> Result<FitHistory> {
        self.check_batches(data)?;
        if !(0. ..1.).contains(&validation_split) {
            return Err(anyhow!(
                "The validation split should be in [0, 1), got {}",
                validation_split
            ));
        }
        let n_train = ((data.len() as f64) * (1. - validation_split)).floor() as usize;
        if n_train == 0 {
            return Err(anyhow!("No training data left after the validation split"));
        }
        let train = data.slice_rows(0, n_train);
        let validation = data.slice_rows(n_train, data.len());
        info!(
            "Training on {} sequences, validating on {} ({} parameters)",
            train.len(),
            validation.len(),
            self.nb_params()
        );

        let batch_size = self.params.batch_size;
        let kl_weight = batch_size as f64;
        let mut optimizer = Adam::new(&self.network, training);
        let mut history = FitHistory::default();
        let mut best = f64::INFINITY;
        let mut wait = 0;
        let mut order: Vec<usize> = (0..n_train).collect();

        for epoch in 0..self.params.epochs {
            if training.shuffle {
                order.shuffle(rng);
            }
            let mut epoch_loss = 0.;
            for indices in order.chunks(batch_size) {
                let batch = train.select_rows(indices);
                let noise = sampler::draw_noise(batch.len(), self.params.latent_dim, rng);
                let (loss, gradient) = self.network.loss_and_gradients(&batch, &noise, kl_weight)?;
                optimizer.step(&mut self.network, &gradient)?;
                debug!("Epoch {} batch loss {:.4}", epoch + 1, loss.total());
                epoch_loss += loss.total() * indices.len() as f64;
            }
            epoch_loss /= n_train as f64;
            history.loss.push(epoch_loss);

            if validation.is_empty() {
                info!("Epoch {}/{}: loss {:.4}", epoch + 1, self.params.epochs, epoch_loss);
            } else {
                let val_loss = self.mean_loss(&validation, rng)?.total();
                history.val_loss.push(val_loss);
                info!(
                    "Epoch {}/{}: loss {:.4}, val_loss {:.4}",
                    epoch + 1,
                    self.params.epochs,
                    epoch_loss,
                    val_loss
                );
            }

            if !epoch_loss.is_finite() {
                return Err(anyhow!("The loss diverged at epoch {}", epoch + 1));
            }
            if epoch_loss < best {
                best = epoch_loss;
                wait = 0;
            } else {
                wait += 1;
                if wait >= self.params.patience {
                    warn!("Early stopping at epoch {}", epoch + 1);
                    history.stopped_epoch = Some(epoch);
                    break;
                }
            }
        }
        Ok(history)
    }

    /// Loss on `data` with the current weights. The sampler is part of the
    /// graph so the value depends on `rng`.
    pub fn evaluate<R: Rng>(&self, data: &TcrTensors, rng: &mut R) -> Result<VaeLoss> {
        self.check_batches(data)?;
        self.mean_loss(data, rng)
    }

    /// Posterior mean and standard deviation of every record
    pub fn encode(&self, data: &TcrTensors) -> Result<(Array2<f64>, Array2<f64>)> {
        data.check_shape(&self.params)?;
        let (z_mean, z_log_var, _) = self.network.encoder.forward(data)?;
        Ok((z_mean, sampler::standard_deviation(&z_log_var)))
    }

    /// Distributions over CDR3 (position-wise), V and J genes
    pub fn decode(&self, z: &Array2<f64>) -> Result<TcrTensors> {
        self.network.decoder.decode(z)
    }

    /// Decode `n` draws from the prior
    pub fn generate_tensors<R: Rng>(&self, n: usize, rng: &mut R) -> Result<TcrTensors> {
        let batch_size = self.params.batch_size;
        let n_actual = batch_size * n.div_ceil(batch_size);
        let z = standard_normal(n_actual, self.params.latent_dim, rng);
        Ok(self.decode(&z)?.slice_rows(0, n))
    }

    /// `n` new sequences, keeping the most likely amino acid and genes
    pub fn generate<R: Rng>(
        &self,
        n: usize,
        vocabulary: &TcrVocabulary,
        rng: &mut R,
    ) -> Result<Vec<TcrRecord>> {
        let probabilities = self.generate_tensors(n, rng)?;
        onehot_to_sequences(&probabilities, vocabulary)
    }

    /// `n` new sequences, drawn from the decoded distributions
    pub fn generate_sampled<R: Rng>(
        &self,
        n: usize,
        vocabulary: &TcrVocabulary,
        rng: &mut R,
    ) -> Result<Vec<TcrRecord>> {
        let probabilities = self.generate_tensors(n, rng)?;
        sample_sequences(&probabilities, vocabulary, rng)
    }

    /// One importance sample per record, see `importance::log_p_of_x_importance_sample`
    pub fn log_p_of_x_importance_sample<R: Rng>(
        &self,
        data: &TcrTensors,
        rng: &mut R,
    ) -> Result<Vec<f64>> {
        data.check_shape(&self.params)?;
        importance::log_p_of_x_importance_sample(&self.network, data, rng)
    }

    /// Estimate log p(x) of every record with `n_samples` importance samples
    pub fn importance_sample<R: Rng>(
        &self,
        data: &TcrTensors,
        n_samples: usize,
        rng: &mut R,
    ) -> Result<ImportanceEstimate> {
        data.check_shape(&self.params)?;
        info!(
            "Estimating p(x) of {} sequences with {} importance samples",
            data.len(),
            n_samples
        );
        importance::importance_sample(&self.network, data, n_samples, rng)
    }
}
