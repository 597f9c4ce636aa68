//! Shared functionalities (not related to the network itself)
pub mod distributions;
pub mod gene;
pub mod onehot;
pub mod parameters;
pub mod parser;
pub mod sequence;
pub mod utils;

pub use distributions::DiscreteDistribution;
pub use gene::{canonical_gene_name, GeneList, TcrVocabulary};
pub use onehot::{onehot_to_sequences, sample_sequences, unpadded_sequences_to_onehot, TcrTensors};
pub use parameters::{Hyperparameters, TrainingParameters};
pub use sequence::TcrRecord;
