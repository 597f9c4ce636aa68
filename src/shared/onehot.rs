//! Conversion between records and the three one-hot channels
use crate::shared::distributions::DiscreteDistribution;
use crate::shared::gene::TcrVocabulary;
use crate::shared::parameters::Hyperparameters;
use crate::shared::sequence::{pad_middle, unpad, TcrRecord, GAP};
use anyhow::{anyhow, Result};
use ndarray::{s, Array2, Array3, ArrayView1, Axis};
use rand::Rng;

/// Three aligned tensors describing `n` sequences:
/// - `cdr3`: (n, max_cdr3_len, n_aas)
/// - `v_gene`: (n, n_v_genes)
/// - `j_gene`: (n, n_j_genes)
///
/// The same structure carries one-hot observations and decoded probabilities.
#[derive(Clone, Debug, PartialEq)]
pub struct TcrTensors {
    pub cdr3: Array3<f64>,
    pub v_gene: Array2<f64>,
    pub j_gene: Array2<f64>,
}

impl TcrTensors {
    pub fn new(cdr3: Array3<f64>, v_gene: Array2<f64>, j_gene: Array2<f64>) -> Result<Self> {
        let n = cdr3.dim().0;
        if v_gene.nrows() != n || j_gene.nrows() != n {
            return Err(anyhow!(
                "Inconsistent number of sequences between channels ({}, {}, {})",
                n,
                v_gene.nrows(),
                j_gene.nrows()
            ));
        }
        Ok(TcrTensors {
            cdr3,
            v_gene,
            j_gene,
        })
    }

    pub fn len(&self) -> usize {
        self.cdr3.dim().0
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Check that the tensors fit the model dimensions
    pub fn check_shape(&self, params: &Hyperparameters) -> Result<()> {
        let n = self.len();
        let expected = (
            (n, params.max_cdr3_len, params.n_aas),
            (n, params.n_v_genes),
            (n, params.n_j_genes),
        );
        let found = (self.cdr3.dim(), self.v_gene.dim(), self.j_gene.dim());
        if found != expected {
            return Err(anyhow!(
                "Shape mismatch: expected {:?}, found {:?}",
                expected,
                found
            ));
        }
        Ok(())
    }

    /// Rows `start..end` of every channel
    pub fn slice_rows(&self, start: usize, end: usize) -> TcrTensors {
        TcrTensors {
            cdr3: self.cdr3.slice(s![start..end, .., ..]).to_owned(),
            v_gene: self.v_gene.slice(s![start..end, ..]).to_owned(),
            j_gene: self.j_gene.slice(s![start..end, ..]).to_owned(),
        }
    }

    /// Rows in the order given by `indices`
    pub fn select_rows(&self, indices: &[usize]) -> TcrTensors {
        TcrTensors {
            cdr3: self.cdr3.select(Axis(0), indices),
            v_gene: self.v_gene.select(Axis(0), indices),
            j_gene: self.j_gene.select(Axis(0), indices),
        }
    }
}

/// Pad every CDR3 to `max_len` and one-hot encode the three channels.
pub fn unpadded_sequences_to_onehot(
    records: &[TcrRecord],
    max_len: usize,
    vocabulary: &TcrVocabulary,
) -> Result<TcrTensors> {
    let n = records.len();
    let mut cdr3 = Array3::<f64>::zeros((n, max_len, vocabulary.n_aas()));
    let mut v_gene = Array2::<f64>::zeros((n, vocabulary.v_genes.len()));
    let mut j_gene = Array2::<f64>::zeros((n, vocabulary.j_genes.len()));
    // the gap must exist to pad
    vocabulary.aa_position(GAP)?;

    for (ii, record) in records.iter().enumerate() {
        let padded = pad_middle(&record.amino_acid, max_len)?;
        for (pos, &aa) in padded.as_bytes().iter().enumerate() {
            let idx = vocabulary
                .aa_position(aa)
                .map_err(|e| anyhow!("{} in sequence {}", e, record.amino_acid))?;
            cdr3[[ii, pos, idx]] = 1.;
        }
        v_gene[[ii, vocabulary.v_genes.position(&record.v_gene)?]] = 1.;
        j_gene[[ii, vocabulary.j_genes.position(&record.j_gene)?]] = 1.;
    }
    TcrTensors::new(cdr3, v_gene, j_gene)
}

fn argmax(row: ArrayView1<f64>) -> usize {
    let mut best = 0;
    for (ii, &x) in row.iter().enumerate() {
        if x > row[best] {
            best = ii;
        }
    }
    best
}

fn check_vocabulary(tensors: &TcrTensors, vocabulary: &TcrVocabulary) -> Result<()> {
    if tensors.cdr3.dim().2 != vocabulary.n_aas()
        || tensors.v_gene.ncols() != vocabulary.v_genes.len()
        || tensors.j_gene.ncols() != vocabulary.j_genes.len()
    {
        return Err(anyhow!(
            "The tensors do not match the vocabulary sizes ({}, {}, {})",
            vocabulary.n_aas(),
            vocabulary.v_genes.len(),
            vocabulary.j_genes.len()
        ));
    }
    Ok(())
}

fn build_record(
    vocabulary: &TcrVocabulary,
    aas: Vec<usize>,
    v_idx: usize,
    j_idx: usize,
) -> Result<TcrRecord> {
    let padded: String = aas
        .into_iter()
        .map(|idx| vocabulary.amino_acids[idx] as char)
        .collect();
    Ok(TcrRecord {
        amino_acid: unpad(&padded),
        v_gene: vocabulary
            .v_genes
            .name(v_idx)
            .ok_or(anyhow!("Invalid V gene index {}", v_idx))?
            .to_string(),
        j_gene: vocabulary
            .j_genes
            .name(j_idx)
            .ok_or(anyhow!("Invalid J gene index {}", j_idx))?
            .to_string(),
    })
}

/// Inverse of `unpadded_sequences_to_onehot`: pick the most likely
/// entry in each position (works on one-hot or probability tensors).
pub fn onehot_to_sequences(
    tensors: &TcrTensors,
    vocabulary: &TcrVocabulary,
) -> Result<Vec<TcrRecord>> {
    check_vocabulary(tensors, vocabulary)?;
    (0..tensors.len())
        .map(|ii| {
            let aas = tensors
                .cdr3
                .index_axis(Axis(0), ii)
                .outer_iter()
                .map(argmax)
                .collect();
            build_record(
                vocabulary,
                aas,
                argmax(tensors.v_gene.row(ii)),
                argmax(tensors.j_gene.row(ii)),
            )
        })
        .collect()
}

/// Draw one sequence per row, each position and gene being sampled
/// from its categorical distribution.
pub fn sample_sequences<R: Rng>(
    probabilities: &TcrTensors,
    vocabulary: &TcrVocabulary,
    rng: &mut R,
) -> Result<Vec<TcrRecord>> {
    check_vocabulary(probabilities, vocabulary)?;
    let mut records = Vec::with_capacity(probabilities.len());
    for ii in 0..probabilities.len() {
        let mut aas = Vec::with_capacity(probabilities.cdr3.dim().1);
        for position in probabilities.cdr3.index_axis(Axis(0), ii).outer_iter() {
            aas.push(DiscreteDistribution::new(position.to_vec())?.generate(rng));
        }
        let v_idx = DiscreteDistribution::new(probabilities.v_gene.row(ii).to_vec())?.generate(rng);
        let j_idx = DiscreteDistribution::new(probabilities.j_gene.row(ii).to_vec())?.generate(rng);
        records.push(build_record(vocabulary, aas, v_idx, j_idx)?);
    }
    Ok(records)
}
