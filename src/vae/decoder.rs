//! Generative model: latent vector -> distributions over CDR3, V gene, J gene
//!
//! A single decoder is used both inside the training graph (fed by the
//! sampler) and on its own (fed by given latent vectors), so the two share
//! their weights by construction.
use crate::shared::onehot::TcrTensors;
use crate::shared::parameters::Hyperparameters;
use crate::shared::utils::{softmax_last_axis, softmax_rows};
use crate::vae::layers::{Activation, Dense, Parametrized};
use anyhow::{anyhow, Result};
use ndarray::{Array2, Array3, ArrayViewD, ArrayViewMutD};
use rand::Rng;

#[derive(Clone, Debug)]
pub struct Decoder {
    pub dense_1: Dense,
    pub dense_2: Dense,
    pub cdr3_out: Dense,
    pub v_gene_out: Dense,
    pub j_gene_out: Dense,
    max_cdr3_len: usize,
    n_aas: usize,
}

/// Pre-softmax outputs of the three heads
pub struct Logits {
    pub cdr3: Array3<f64>,
    pub v_gene: Array2<f64>,
    pub j_gene: Array2<f64>,
}

pub struct DecoderCache {
    pub z: Array2<f64>,
    pub hidden_1: Array2<f64>,
    pub hidden_2: Array2<f64>,
    pub cdr3_flat: Array2<f64>,
    pub v_gene: Array2<f64>,
    pub j_gene: Array2<f64>,
}

impl Decoder {
    pub fn new<R: Rng>(params: &Hyperparameters, rng: &mut R) -> Decoder {
        Decoder {
            dense_1: Dense::new(
                "decoder_dense_1",
                params.latent_dim,
                params.dense_nodes,
                Activation::Elu,
                rng,
            ),
            dense_2: Dense::new(
                "decoder_dense_2",
                params.dense_nodes,
                params.dense_nodes,
                Activation::Elu,
                rng,
            ),
            cdr3_out: Dense::new(
                "flat_CDR_out",
                params.dense_nodes,
                params.max_cdr3_len * params.n_aas,
                Activation::Linear,
                rng,
            ),
            v_gene_out: Dense::new(
                "Vgene_prob_out",
                params.dense_nodes,
                params.n_v_genes,
                Activation::Linear,
                rng,
            ),
            j_gene_out: Dense::new(
                "Jgene_prob_out",
                params.dense_nodes,
                params.n_j_genes,
                Activation::Linear,
                rng,
            ),
            max_cdr3_len: params.max_cdr3_len,
            n_aas: params.n_aas,
        }
    }

    pub fn latent_dim(&self) -> usize {
        self.dense_1.kernel.nrows()
    }

    /// The shared hidden representation is computed once and fed to the
    /// three heads.
    pub fn forward(&self, z: &Array2<f64>) -> Result<(Logits, DecoderCache)> {
        if z.ncols() != self.latent_dim() {
            return Err(anyhow!(
                "Latent vectors of dimension {} expected, got {}",
                self.latent_dim(),
                z.ncols()
            ));
        }
        let hidden_1 = self.dense_1.forward(z.view());
        let hidden_2 = self.dense_2.forward(hidden_1.view());
        let cdr3_flat = self.cdr3_out.forward(hidden_2.view());
        let cdr3 = cdr3_flat
            .clone()
            .into_shape_with_order((z.nrows(), self.max_cdr3_len, self.n_aas))?;
        let v_gene = self.v_gene_out.forward(hidden_2.view());
        let j_gene = self.j_gene_out.forward(hidden_2.view());
        let logits = Logits {
            cdr3,
            v_gene: v_gene.clone(),
            j_gene: j_gene.clone(),
        };
        let cache = DecoderCache {
            z: z.clone(),
            hidden_1,
            hidden_2,
            cdr3_flat,
            v_gene,
            j_gene,
        };
        Ok((logits, cache))
    }

    /// Position-wise softmax for the CDR3, softmax for the genes.
    pub fn decode(&self, z: &Array2<f64>) -> Result<TcrTensors> {
        let (logits, _) = self.forward(z)?;
        TcrTensors::new(
            softmax_last_axis(&logits.cdr3),
            softmax_rows(&logits.v_gene),
            softmax_rows(&logits.j_gene),
        )
    }

    /// Accumulate the gradients in `grad`, return the gradient with respect to z.
    pub fn backward(
        &self,
        cache: &DecoderCache,
        grad_logits: Logits,
        grad: &mut Decoder,
    ) -> Result<Array2<f64>> {
        let n = cache.z.nrows();
        let grad_cdr3_flat = grad_logits
            .cdr3
            .into_shape_with_order((n, self.max_cdr3_len * self.n_aas))?;
        let grad_hidden_2 = self.cdr3_out.backward(
            cache.hidden_2.view(),
            cache.cdr3_flat.view(),
            grad_cdr3_flat,
            &mut grad.cdr3_out,
        ) + self.v_gene_out.backward(
            cache.hidden_2.view(),
            cache.v_gene.view(),
            grad_logits.v_gene,
            &mut grad.v_gene_out,
        ) + self.j_gene_out.backward(
            cache.hidden_2.view(),
            cache.j_gene.view(),
            grad_logits.j_gene,
            &mut grad.j_gene_out,
        );
        let grad_hidden_1 = self.dense_2.backward(
            cache.hidden_1.view(),
            cache.hidden_2.view(),
            grad_hidden_2,
            &mut grad.dense_2,
        );
        Ok(self.dense_1.backward(
            cache.z.view(),
            cache.hidden_1.view(),
            grad_hidden_1,
            &mut grad.dense_1,
        ))
    }
}

impl Parametrized for Decoder {
    fn params(&self) -> Vec<(String, ArrayViewD<'_, f64>)> {
        let mut p = self.dense_1.params();
        p.extend(self.dense_2.params());
        p.extend(self.cdr3_out.params());
        p.extend(self.v_gene_out.params());
        p.extend(self.j_gene_out.params());
        p
    }
    fn params_mut(&mut self) -> Vec<(String, ArrayViewMutD<'_, f64>)> {
        let mut p = self.dense_1.params_mut();
        p.extend(self.dense_2.params_mut());
        p.extend(self.cdr3_out.params_mut());
        p.extend(self.v_gene_out.params_mut());
        p.extend(self.j_gene_out.params_mut());
        p
    }
}
