//! Adam, with the bias correction folded into the learning rate:
//! `lr_t = lr * sqrt(1 - beta_2^t) / (1 - beta_1^t)`
use crate::shared::parameters::TrainingParameters;
use crate::vae::layers::Parametrized;
use crate::vae::network::Network;
use anyhow::{anyhow, Result};
use itertools::izip;
use ndarray::Zip;

#[derive(Clone, Debug)]
pub struct Adam {
    learning_rate: f64,
    beta_1: f64,
    beta_2: f64,
    epsilon: f64,
    iterations: i32,
    // first and second moment estimates, same topology as the network
    m: Network,
    v: Network,
}

impl Adam {
    pub fn new(network: &Network, params: &TrainingParameters) -> Adam {
        Adam {
            learning_rate: params.learning_rate,
            beta_1: params.beta_1,
            beta_2: params.beta_2,
            epsilon: params.epsilon,
            iterations: 0,
            m: network.zeroed(),
            v: network.zeroed(),
        }
    }

    /// Update `network` in place given the gradient of the loss
    pub fn step(&mut self, network: &mut Network, gradient: &Network) -> Result<()> {
        self.iterations += 1;
        let t = self.iterations;
        let lr_t = self.learning_rate * (1. - self.beta_2.powi(t)).sqrt()
            / (1. - self.beta_1.powi(t));
        let (b1, b2, eps) = (self.beta_1, self.beta_2, self.epsilon);

        for ((name, mut w), (_, mut m), (_, mut v), (grad_name, g)) in izip!(
            network.params_mut(),
            self.m.params_mut(),
            self.v.params_mut(),
            gradient.params()
        ) {
            if name != grad_name || w.shape() != g.shape() {
                return Err(anyhow!(
                    "Gradient does not match the network ({} vs {})",
                    name,
                    grad_name
                ));
            }
            Zip::from(&mut w)
                .and(&mut m)
                .and(&mut v)
                .and(&g)
                .for_each(|w, m, v, &g| {
                    *m = b1 * *m + (1. - b1) * g;
                    *v = b2 * *v + (1. - b2) * g * g;
                    *w -= lr_t * *m / (v.sqrt() + eps);
                });
        }
        Ok(())
    }
}
