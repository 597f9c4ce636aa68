//! The structs used for specifying the parameters of the model
use crate::shared::gene::{TCRB_J_GENES, TCRB_V_GENES};
use crate::shared::sequence::AMINO_ACIDS;
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Architecture and training budget of a model. Fixed at construction:
/// a different set of hyperparameters means a different model.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hyperparameters {
    // Model parameters
    pub latent_dim: usize,
    pub dense_nodes: usize,
    pub aa_embedding_dim: usize,
    pub v_gene_embedding_dim: usize,
    pub j_gene_embedding_dim: usize,
    // Input data parameters
    pub max_cdr3_len: usize,
    pub n_aas: usize,
    pub n_v_genes: usize,
    pub n_j_genes: usize,
    // Training parameters
    pub batch_size: usize,
    pub epochs: usize,
    pub patience: usize,
}

impl Default for Hyperparameters {
    fn default() -> Hyperparameters {
        Hyperparameters {
            latent_dim: 35,
            dense_nodes: 75,
            aa_embedding_dim: 21,
            v_gene_embedding_dim: 30,
            j_gene_embedding_dim: 13,
            max_cdr3_len: 30,
            n_aas: AMINO_ACIDS.len(),
            n_v_genes: TCRB_V_GENES.len(),
            n_j_genes: TCRB_J_GENES.len(),
            batch_size: 100,
            epochs: 500,
            patience: 20,
        }
    }
}

impl Hyperparameters {
    /// Parse a json record, every field is mandatory.
    pub fn from_json_str(s: &str) -> Result<Hyperparameters> {
        let params: Hyperparameters = serde_json::from_str(s)
            .map_err(|e| anyhow!("Invalid hyperparameter record: {}", e))?;
        params.validate()?;
        Ok(params)
    }

    pub fn load_json(path: &Path) -> Result<Hyperparameters> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Error opening the parameter file {}", path.display()))?;
        Self::from_json_str(&content)
            .with_context(|| format!("Error in the parameter file {}", path.display()))
    }

    pub fn save_json(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)
            .with_context(|| format!("Error writing the parameter file {}", path.display()))
    }

    /// All the dimensions must be strictly positive
    pub fn validate(&self) -> Result<()> {
        let fields = [
            ("latent_dim", self.latent_dim),
            ("dense_nodes", self.dense_nodes),
            ("aa_embedding_dim", self.aa_embedding_dim),
            ("v_gene_embedding_dim", self.v_gene_embedding_dim),
            ("j_gene_embedding_dim", self.j_gene_embedding_dim),
            ("max_cdr3_len", self.max_cdr3_len),
            ("n_aas", self.n_aas),
            ("n_v_genes", self.n_v_genes),
            ("n_j_genes", self.n_j_genes),
            ("batch_size", self.batch_size),
        ];
        for (name, value) in fields {
            if value == 0 {
                return Err(anyhow!(
                    "Invalid hyperparameters: `{}` must be strictly positive",
                    name
                ));
            }
        }
        Ok(())
    }

    /// Size of the flattened CDR3 embedding fed to the encoder
    pub fn merged_embedding_dim(&self) -> usize {
        self.max_cdr3_len * self.aa_embedding_dim
            + self.v_gene_embedding_dim
            + self.j_gene_embedding_dim
    }
}

/// Optimizer settings, independent of the model architecture.
#[derive(Clone, Debug)]
pub struct TrainingParameters {
    pub learning_rate: f64,
    pub beta_1: f64,
    pub beta_2: f64,
    pub epsilon: f64,
    // reshuffle the training rows at every epoch
    pub shuffle: bool,
}

impl Default for TrainingParameters {
    fn default() -> TrainingParameters {
        TrainingParameters {
            learning_rate: 1e-3,
            beta_1: 0.9,
            beta_2: 0.999,
            epsilon: 1e-7,
            shuffle: true,
        }
    }
}

impl TrainingParameters {
    pub fn new(learning_rate: f64) -> Self {
        Self {
            learning_rate,
            ..Default::default()
        }
    }
}
