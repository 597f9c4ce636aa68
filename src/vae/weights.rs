//! Weight persistence. The weights are stored as a JSON object mapping the
//! name of every trainable tensor to its value. Loading checks that the
//! stored tensors match the topology of the receiving network exactly.
use crate::vae::layers::Parametrized;
use anyhow::{anyhow, Context, Result};
use ndarray::ArrayD;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

pub type WeightMap = BTreeMap<String, ArrayD<f64>>;

pub fn to_weight_map<P: Parametrized>(model: &P) -> WeightMap {
    model
        .params()
        .into_iter()
        .map(|(name, value)| (name, value.to_owned()))
        .collect()
}

/// Copy the values of `weights` into `model`. Fails, leaving `model`
/// untouched, if a tensor is missing, unexpected, or of the wrong shape.
pub fn apply_weight_map<P: Parametrized>(model: &mut P, weights: &WeightMap) -> Result<()> {
    let expected = model.params();
    if expected.len() != weights.len() {
        return Err(anyhow!(
            "Incompatible weights: {} tensors expected, {} found",
            expected.len(),
            weights.len()
        ));
    }
    for (name, value) in &expected {
        match weights.get(name) {
            None => return Err(anyhow!("Incompatible weights: missing tensor {}", name)),
            Some(w) if w.shape() != value.shape() => {
                return Err(anyhow!(
                    "Incompatible weights: {} has shape {:?}, expected {:?}",
                    name,
                    w.shape(),
                    value.shape()
                ))
            }
            Some(_) => {}
        }
    }
    drop(expected);

    for (name, mut value) in model.params_mut() {
        if let Some(w) = weights.get(&name) {
            value.assign(w);
        }
    }
    Ok(())
}

pub fn write_weights<W: Write, P: Parametrized>(wtr: W, model: &P) -> Result<()> {
    serde_json::to_writer(wtr, &to_weight_map(model))?;
    Ok(())
}

pub fn read_weights<R: Read, P: Parametrized>(rdr: R, model: &mut P) -> Result<()> {
    let weights: WeightMap = serde_json::from_reader(rdr)?;
    apply_weight_map(model, &weights)
}

pub fn save_weights<P: Parametrized>(path: &Path, model: &P) -> Result<()> {
    let file = File::create(path).with_context(|| format!("Cannot create {}", path.display()))?;
    let mut wtr = BufWriter::new(file);
    write_weights(&mut wtr, model)?;
    wtr.flush()?;
    Ok(())
}

pub fn load_weights<P: Parametrized>(path: &Path, model: &mut P) -> Result<()> {
    let file = File::open(path).with_context(|| format!("Cannot open {}", path.display()))?;
    read_weights(BufReader::new(file), model)
        .with_context(|| format!("Cannot load the weights from {}", path.display()))
}
