//! Amino-acid alphabet and the (CDR3, V gene, J gene) record
use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

/// Gap symbol, used to pad the CDR3 to a fixed length
pub const GAP: u8 = b'-';

pub const AMINO_ACIDS: [u8; 21] = [
    b'A', b'C', b'D', b'E', b'F', b'G', b'H', b'I', b'K', b'L', b'M', b'N', b'P', b'Q', b'R',
    b'S', b'T', b'V', b'W', b'Y', GAP,
];

/// One TCR beta chain, as found in the csv tables.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct TcrRecord {
    pub amino_acid: String,
    pub v_gene: String,
    pub j_gene: String,
}

impl TcrRecord {
    pub fn new(amino_acid: &str, v_gene: &str, j_gene: &str) -> TcrRecord {
        TcrRecord {
            amino_acid: amino_acid.to_string(),
            v_gene: v_gene.to_string(),
            j_gene: j_gene.to_string(),
        }
    }
}

/// Pad the sequence in its middle with gaps so that it reaches `desired_length`.
/// ```
/// use tcrvae::shared::sequence::pad_middle;
/// assert_eq!(pad_middle("CASSF", 8).unwrap(), "CA---SSF");
/// assert_eq!(pad_middle("CASF", 4).unwrap(), "CASF");
/// ```
pub fn pad_middle(seq: &str, desired_length: usize) -> Result<String> {
    if !seq.is_ascii() {
        return Err(anyhow!("Sequence {} contains non-ascii characters", seq));
    }
    let seq_len = seq.len();
    if seq_len > desired_length {
        return Err(anyhow!(
            "Sequence {} is longer than the maximum CDR3 length ({})",
            seq,
            desired_length
        ));
    }
    let pad_start = seq_len / 2;
    let mut padded = String::with_capacity(desired_length);
    padded.push_str(&seq[..pad_start]);
    padded.extend(std::iter::repeat(GAP as char).take(desired_length - seq_len));
    padded.push_str(&seq[pad_start..]);
    Ok(padded)
}

/// Remove every gap from a padded sequence
pub fn unpad(seq: &str) -> String {
    seq.chars().filter(|&c| c != GAP as char).collect()
}
