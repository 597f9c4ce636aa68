mod args;
use crate::args::{CommandParse, Commands};
use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use std::fs::File;
use std::path::Path;
use tcrvae::shared::parser::{
    read_records_file, truncate_to_multiple, write_log_p, write_records_file, write_table,
};
use tcrvae::vae::LOSS_NAMES;
use tcrvae::{
    unpadded_sequences_to_onehot, Hyperparameters, Model, TcrTensors, TcrVocabulary,
    TrainingParameters,
};

const VALIDATION_SPLIT: f64 = 0.1;
const VALIDATION_SPLIT_MULTIPLIER: usize = 10;

fn make_rng(seed: Option<u64>) -> SmallRng {
    match seed {
        Some(s) => SmallRng::seed_from_u64(s),
        None => SmallRng::from_entropy(),
    }
}

/// Read a sequence table, keep a multiple of `chunk` rows (all if 0) and
/// one-hot encode it
fn get_data(
    path: &Path,
    chunk: usize,
    params: &Hyperparameters,
    vocabulary: &TcrVocabulary,
) -> Result<TcrTensors> {
    let records = truncate_to_multiple(&read_records_file(path)?, chunk)?;
    let data = unpadded_sequences_to_onehot(&records, params.max_cdr3_len, vocabulary)?;
    data.check_shape(params)
        .context("The hyperparameters do not match the TCR beta vocabulary")?;
    Ok(data)
}

fn load_trained(params_json: &Path, model_weights: &Path, rng: &mut SmallRng) -> Result<Model> {
    let mut model = Model::of_json_file(params_json, rng)?;
    model.load_weights(model_weights)?;
    Ok(model)
}

fn train_tcr(
    params_json: &Path,
    train_csv: &Path,
    best_weights: &Path,
    diagnostics_csv: &Path,
    rng: &mut SmallRng,
) -> Result<()> {
    let vocabulary = TcrVocabulary::default();
    let mut model = Model::of_json_file(params_json, rng)?;
    let min_data_size = VALIDATION_SPLIT_MULTIPLIER * model.params().batch_size;
    let train_data = get_data(train_csv, min_data_size, model.params(), &vocabulary)?;

    model.fit(
        &train_data,
        VALIDATION_SPLIT,
        &TrainingParameters::default(),
        rng,
    )?;
    model.save_weights(best_weights)?;

    // check that the weights reload
    let reloaded = load_trained(params_json, best_weights, rng)?;
    let eval_seed: u64 = rng.gen();
    let train_loss = model.evaluate(&train_data, &mut SmallRng::seed_from_u64(eval_seed))?;
    let reloaded_loss = reloaded.evaluate(&train_data, &mut SmallRng::seed_from_u64(eval_seed))?;
    write_table(
        File::create(diagnostics_csv)?,
        &LOSS_NAMES,
        &[
            ("train", train_loss.values()),
            ("vp_train", reloaded_loss.values()),
        ],
    )
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let argparse = CommandParse::parse();
    match argparse.command {
        Commands::TrainTcr {
            params_json,
            train_csv,
            best_weights,
            diagnostics_csv,
            seed,
        } => {
            let mut rng = make_rng(seed);
            train_tcr(
                &params_json,
                &train_csv,
                &best_weights,
                &diagnostics_csv,
                &mut rng,
            )?;
        }
        Commands::Loss {
            params_json,
            model_weights,
            train_csv,
            test_csv,
            out_csv,
            seed,
        } => {
            let mut rng = make_rng(seed);
            let vocabulary = TcrVocabulary::default();
            let model = load_trained(&params_json, &model_weights, &mut rng)?;
            let batch_size = model.params().batch_size;
            let train = get_data(&train_csv, batch_size, model.params(), &vocabulary)?;
            let test = get_data(&test_csv, batch_size, model.params(), &vocabulary)?;
            let train_loss = model.evaluate(&train, &mut rng)?;
            let test_loss = model.evaluate(&test, &mut rng)?;
            write_table(
                File::create(&out_csv)?,
                &LOSS_NAMES,
                &[("train", train_loss.values()), ("test", test_loss.values())],
            )?;
        }
        Commands::Importance {
            limit_input_to,
            nsamples,
            seed,
            params_json,
            model_weights,
            test_csv,
            out_csv,
        } => {
            let mut rng = make_rng(seed);
            let vocabulary = TcrVocabulary::default();
            let model = load_trained(&params_json, &model_weights, &mut rng)?;
            let mut data = get_data(&test_csv, 0, model.params(), &vocabulary)?;
            if let Some(limit) = limit_input_to {
                data = data.slice_rows(0, limit.min(data.len()));
            }
            info!(
                "Calculating p(x) for {} via importance sampling",
                test_csv.display()
            );
            let estimate = model.importance_sample(&data, nsamples, &mut rng)?;
            write_log_p(File::create(&out_csv)?, &estimate.log_p_x)?;
        }
        Commands::Generate {
            nseqs,
            sample,
            seed,
            params_json,
            model_weights,
            out_csv,
        } => {
            let mut rng = make_rng(seed);
            let vocabulary = TcrVocabulary::default();
            let model = load_trained(&params_json, &model_weights, &mut rng)?;
            let records = if sample {
                model.generate_sampled(nseqs, &vocabulary, &mut rng)?
            } else {
                model.generate(nseqs, &vocabulary, &mut rng)?
            };
            write_records_file(&out_csv, &records)?;
        }
        Commands::DefaultParams { out_json } => {
            Hyperparameters::default().save_json(&out_json)?;
        }
    }
    Ok(())
}
