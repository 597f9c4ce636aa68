#![warn(clippy::large_types_passed_by_value)]

pub mod shared;
pub mod vae;

pub use crate::shared::{
    onehot_to_sequences, unpadded_sequences_to_onehot, Hyperparameters, TcrRecord, TcrTensors,
    TcrVocabulary, TrainingParameters,
};
pub use crate::vae::{FitHistory, ImportanceEstimate, Model, VaeLoss};
