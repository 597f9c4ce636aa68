//! Variational autoencoder over (CDR3, V gene, J gene) triples

pub mod decoder;
pub mod encoder;
pub mod importance;
pub mod layers;
pub mod loss;
pub mod model;
pub mod network;
pub mod optimizer;
pub mod sampler;
pub mod weights;

// Re-exporting for public API
pub use self::decoder::{Decoder, Logits};
pub use self::encoder::Encoder;
pub use self::importance::{importance_weighted_log_estimate, ImportanceEstimate};
pub use self::layers::Parametrized;
pub use self::loss::{VaeLoss, LOSS_NAMES};
pub use self::model::{FitHistory, Model};
pub use self::network::Network;
pub use self::optimizer::Adam;
