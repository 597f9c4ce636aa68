use anyhow::Result;
use rand::rngs::SmallRng;
use rand::SeedableRng;
use tcrvae::shared::{
    unpadded_sequences_to_onehot, Hyperparameters, TcrRecord, TcrTensors, TcrVocabulary,
};
use tcrvae::Model;

/// Tiny architecture: latent 2, 4 nodes, CDR3 of length 3 over 4 symbols,
/// 2 V genes, 2 J genes, batches of 2
#[cfg(test)]
#[allow(dead_code)]
pub fn tiny_params() -> Hyperparameters {
    Hyperparameters {
        latent_dim: 2,
        dense_nodes: 4,
        aa_embedding_dim: 3,
        v_gene_embedding_dim: 2,
        j_gene_embedding_dim: 2,
        max_cdr3_len: 3,
        n_aas: 4,
        n_v_genes: 2,
        n_j_genes: 2,
        batch_size: 2,
        epochs: 20,
        patience: 5,
    }
}

#[cfg(test)]
#[allow(dead_code)]
pub fn tiny_vocabulary() -> TcrVocabulary {
    TcrVocabulary::new(
        b"CAS-".to_vec(),
        vec!["TCRBV01-01".to_string(), "TCRBV02-01".to_string()],
        vec!["TCRBJ01-01".to_string(), "TCRBJ01-02".to_string()],
    )
    .unwrap()
}

#[cfg(test)]
#[allow(dead_code)]
pub fn tiny_records() -> Vec<TcrRecord> {
    vec![
        TcrRecord::new("CAS", "TCRBV01-01", "TCRBJ01-01"),
        TcrRecord::new("CS", "TCRBV02-01", "TCRBJ01-02"),
        TcrRecord::new("CAA", "TCRBV01-01", "TCRBJ01-02"),
        TcrRecord::new("S", "TCRBV02-01", "TCRBJ01-01"),
    ]
}

#[cfg(test)]
#[allow(dead_code)]
pub fn tiny_data() -> Result<TcrTensors> {
    unpadded_sequences_to_onehot(&tiny_records(), 3, &tiny_vocabulary())
}

#[cfg(test)]
#[allow(dead_code)]
pub fn tiny_model(seed: u64) -> Result<Model> {
    let mut rng = SmallRng::seed_from_u64(seed);
    Model::new(&tiny_params(), &mut rng)
}
