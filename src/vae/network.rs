//! Full training graph: encoder -> sampler -> decoder -> composite loss
use crate::shared::onehot::TcrTensors;
use crate::shared::parameters::Hyperparameters;
use crate::vae::decoder::Decoder;
use crate::vae::encoder::Encoder;
use crate::vae::layers::Parametrized;
use crate::vae::loss::{composite_loss, composite_loss_gradients, VaeLoss};
use crate::vae::sampler;
use anyhow::Result;
use ndarray::{Array2, ArrayViewD, ArrayViewMutD};
use rand::Rng;

#[derive(Clone, Debug)]
pub struct Network {
    pub encoder: Encoder,
    pub decoder: Decoder,
}

impl Network {
    pub fn new<R: Rng>(params: &Hyperparameters, rng: &mut R) -> Network {
        Network {
            encoder: Encoder::new(params, rng),
            decoder: Decoder::new(params, rng),
        }
    }

    /// Loss of a batch for a given noise draw (one row of noise per record)
    pub fn loss(&self, batch: &TcrTensors, noise: &Array2<f64>, kl_weight: f64) -> Result<VaeLoss> {
        let (z_mean, z_log_var, _) = self.encoder.forward(batch)?;
        let z = sampler::reparameterize(&z_mean, &z_log_var, noise)?;
        let (logits, _) = self.decoder.forward(&z)?;
        Ok(composite_loss(batch, &logits, &z_mean, &z_log_var, kl_weight))
    }

    /// Loss of a batch and its gradient with respect to every parameter.
    /// The gradient is returned as a `Network` with the same topology.
    pub fn loss_and_gradients(
        &self,
        batch: &TcrTensors,
        noise: &Array2<f64>,
        kl_weight: f64,
    ) -> Result<(VaeLoss, Network)> {
        let (z_mean, z_log_var, encoder_cache) = self.encoder.forward(batch)?;
        let z = sampler::reparameterize(&z_mean, &z_log_var, noise)?;
        let (logits, decoder_cache) = self.decoder.forward(&z)?;
        let loss = composite_loss(batch, &logits, &z_mean, &z_log_var, kl_weight);
        let grads = composite_loss_gradients(batch, &logits, &z_mean, &z_log_var, kl_weight);

        let mut gradient = self.zeroed();
        let grad_z = self
            .decoder
            .backward(&decoder_cache, grads.logits, &mut gradient.decoder)?;
        let (grad_z_mean, grad_z_log_var) = sampler::backward(&z_log_var, noise, &grad_z);
        self.encoder.backward(
            batch,
            &encoder_cache,
            grad_z_mean + &grads.z_mean,
            grad_z_log_var + &grads.z_log_var,
            &mut gradient.encoder,
        )?;
        Ok((loss, gradient))
    }
}

impl Parametrized for Network {
    fn params(&self) -> Vec<(String, ArrayViewD<'_, f64>)> {
        let mut p = self.encoder.params();
        p.extend(self.decoder.params());
        p
    }
    fn params_mut(&mut self) -> Vec<(String, ArrayViewMutD<'_, f64>)> {
        let mut p = self.encoder.params_mut();
        p.extend(self.decoder.params_mut());
        p
    }
}
