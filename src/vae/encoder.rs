//! Recognition model: (CDR3, V gene, J gene) -> (z_mean, z_log_var)
use crate::shared::onehot::TcrTensors;
use crate::shared::parameters::Hyperparameters;
use crate::vae::layers::{Activation, Dense, Embedding, Parametrized};
use anyhow::Result;
use ndarray::{concatenate, s, Array2, Array3, ArrayViewD, ArrayViewMutD, Axis};
use rand::Rng;

#[derive(Clone, Debug)]
pub struct Encoder {
    pub cdr3_embedding: Embedding,
    pub v_gene_embedding: Dense,
    pub j_gene_embedding: Dense,
    pub dense_1: Dense,
    pub dense_2: Dense,
    pub z_mean: Dense,
    pub z_log_var: Dense,
}

/// Intermediate values of the forward pass, needed for the backward pass
pub struct EncoderCache {
    pub cdr3_embedded: Array3<f64>,
    pub v_embedded: Array2<f64>,
    pub j_embedded: Array2<f64>,
    pub merged: Array2<f64>,
    pub hidden_1: Array2<f64>,
    pub hidden_2: Array2<f64>,
    pub z_mean: Array2<f64>,
    pub z_log_var: Array2<f64>,
}

impl Encoder {
    pub fn new<R: Rng>(params: &Hyperparameters, rng: &mut R) -> Encoder {
        Encoder {
            cdr3_embedding: Embedding::new("CDR3_embedding", params.n_aas, params.aa_embedding_dim, rng),
            v_gene_embedding: Dense::new(
                "Vgene_embedding",
                params.n_v_genes,
                params.v_gene_embedding_dim,
                Activation::Linear,
                rng,
            ),
            j_gene_embedding: Dense::new(
                "Jgene_embedding",
                params.n_j_genes,
                params.j_gene_embedding_dim,
                Activation::Linear,
                rng,
            ),
            dense_1: Dense::new(
                "encoder_dense_1",
                params.merged_embedding_dim(),
                params.dense_nodes,
                Activation::Elu,
                rng,
            ),
            dense_2: Dense::new(
                "encoder_dense_2",
                params.dense_nodes,
                params.dense_nodes,
                Activation::Elu,
                rng,
            ),
            z_mean: Dense::new("z_mean", params.dense_nodes, params.latent_dim, Activation::Linear, rng),
            z_log_var: Dense::new(
                "z_log_var",
                params.dense_nodes,
                params.latent_dim,
                Activation::Linear,
                rng,
            ),
        }
    }

    /// Return (z_mean, z_log_var) and the cached activations
    pub fn forward(&self, x: &TcrTensors) -> Result<(Array2<f64>, Array2<f64>, EncoderCache)> {
        let cdr3_embedded = self.cdr3_embedding.forward(x.cdr3.view())?;
        let (n, length, embedding_dim) = cdr3_embedded.dim();
        let cdr3_flat = cdr3_embedded.to_shape((n, length * embedding_dim))?;
        let v_embedded = self.v_gene_embedding.forward(x.v_gene.view());
        let j_embedded = self.j_gene_embedding.forward(x.j_gene.view());

        let merged = concatenate(
            Axis(1),
            &[cdr3_flat.view(), v_embedded.view(), j_embedded.view()],
        )?;
        let hidden_1 = self.dense_1.forward(merged.view());
        let hidden_2 = self.dense_2.forward(hidden_1.view());
        let z_mean = self.z_mean.forward(hidden_2.view());
        let z_log_var = self.z_log_var.forward(hidden_2.view());
        let cache = EncoderCache {
            cdr3_embedded,
            v_embedded,
            j_embedded,
            merged,
            hidden_1,
            hidden_2,
            z_mean: z_mean.clone(),
            z_log_var: z_log_var.clone(),
        };
        Ok((z_mean, z_log_var, cache))
    }

    /// Accumulate the gradients in `grad` given the gradients of the loss
    /// with respect to z_mean and z_log_var
    pub fn backward(
        &self,
        x: &TcrTensors,
        cache: &EncoderCache,
        grad_z_mean: Array2<f64>,
        grad_z_log_var: Array2<f64>,
        grad: &mut Encoder,
    ) -> Result<()> {
        let grad_hidden_2 = self.z_mean.backward(
            cache.hidden_2.view(),
            cache.z_mean.view(),
            grad_z_mean,
            &mut grad.z_mean,
        ) + self.z_log_var.backward(
            cache.hidden_2.view(),
            cache.z_log_var.view(),
            grad_z_log_var,
            &mut grad.z_log_var,
        );
        let grad_hidden_1 = self.dense_2.backward(
            cache.hidden_1.view(),
            cache.hidden_2.view(),
            grad_hidden_2,
            &mut grad.dense_2,
        );
        let grad_merged = self.dense_1.backward(
            cache.merged.view(),
            cache.hidden_1.view(),
            grad_hidden_1,
            &mut grad.dense_1,
        );

        // split the merged gradient back into the three embeddings
        let cdr3_width = cache.merged.ncols() - self.v_gene_embedding.n_out() - self.j_gene_embedding.n_out();
        let v_end = cdr3_width + self.v_gene_embedding.n_out();
        let grad_cdr3 = grad_merged
            .slice(s![.., ..cdr3_width])
            .to_owned()
            .into_shape_with_order(cache.cdr3_embedded.raw_dim())?;
        let grad_v = grad_merged.slice(s![.., cdr3_width..v_end]).to_owned();
        let grad_j = grad_merged.slice(s![.., v_end..]).to_owned();

        self.cdr3_embedding
            .backward(x.cdr3.view(), grad_cdr3.view(), &mut grad.cdr3_embedding)?;
        self.v_gene_embedding.backward(
            x.v_gene.view(),
            cache.v_embedded.view(),
            grad_v,
            &mut grad.v_gene_embedding,
        );
        self.j_gene_embedding.backward(
            x.j_gene.view(),
            cache.j_embedded.view(),
            grad_j,
            &mut grad.j_gene_embedding,
        );
        Ok(())
    }
}

impl Parametrized for Encoder {
    fn params(&self) -> Vec<(String, ArrayViewD<'_, f64>)> {
        let mut p = self.cdr3_embedding.params();
        p.extend(self.v_gene_embedding.params());
        p.extend(self.j_gene_embedding.params());
        p.extend(self.dense_1.params());
        p.extend(self.dense_2.params());
        p.extend(self.z_mean.params());
        p.extend(self.z_log_var.params());
        p
    }
    fn params_mut(&mut self) -> Vec<(String, ArrayViewMutD<'_, f64>)> {
        let mut p = self.cdr3_embedding.params_mut();
        p.extend(self.v_gene_embedding.params_mut());
        p.extend(self.j_gene_embedding.params_mut());
        p.extend(self.dense_1.params_mut());
        p.extend(self.dense_2.params_mut());
        p.extend(self.z_mean.params_mut());
        p.extend(self.z_log_var.params_mut());
        p
    }
}
