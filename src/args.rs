use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(
    name = "tcrvae",
    version,
    about = "Variational autoencoder for TCR beta sequences (CDR3, V gene, J gene)"
)]
pub struct CommandParse {
    /// subcommands for the specific actions
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Train the model described in PARAMS_JSON on TRAIN_CSV, save the
    /// weights and a loss diagnostic (before/after reloading the weights)
    TrainTcr {
        params_json: PathBuf,
        train_csv: PathBuf,
        best_weights: PathBuf,
        diagnostics_csv: PathBuf,
        /// seed of the random generator (random if absent)
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Record the losses on the training set and on a held-out test set
    Loss {
        params_json: PathBuf,
        model_weights: PathBuf,
        train_csv: PathBuf,
        test_csv: PathBuf,
        out_csv: PathBuf,
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Estimate the log generation probability of the sequences in TEST_CSV
    Importance {
        /// only use the first N input sequences
        #[arg(long)]
        limit_input_to: Option<usize>,
        /// number of importance samples
        #[arg(long, default_value_t = 500)]
        nsamples: usize,
        #[arg(long)]
        seed: Option<u64>,
        params_json: PathBuf,
        model_weights: PathBuf,
        test_csv: PathBuf,
        out_csv: PathBuf,
    },
    /// Generate sequences from the prior
    Generate {
        /// number of sequences to generate
        #[arg(short, long, default_value_t = 100)]
        nseqs: usize,
        /// draw every position from the decoded distribution instead of
        /// keeping the most likely one
        #[arg(long)]
        sample: bool,
        #[arg(long)]
        seed: Option<u64>,
        params_json: PathBuf,
        model_weights: PathBuf,
        out_csv: PathBuf,
    },
    /// Write the default hyperparameters
    DefaultParams { out_json: PathBuf },
}
