//! Deal with V/J gene names and the fixed gene vocabularies
use crate::shared::sequence::AMINO_ACIDS;
use anyhow::{anyhow, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

/// Human TCR beta V genes, Adaptive notation. The order defines the
/// one-hot encoding and must never change for a trained model.
pub const TCRB_V_GENES: [&str; 65] = [
    "TCRBV01-01",
    "TCRBV02-01",
    "TCRBV03-01",
    "TCRBV03-02",
    "TCRBV04-01",
    "TCRBV04-02",
    "TCRBV04-03",
    "TCRBV05-01",
    "TCRBV05-02",
    "TCRBV05-03",
    "TCRBV05-04",
    "TCRBV05-05",
    "TCRBV05-06",
    "TCRBV05-07",
    "TCRBV05-08",
    "TCRBV06-01",
    "TCRBV06-02",
    "TCRBV06-03",
    "TCRBV06-04",
    "TCRBV06-05",
    "TCRBV06-06",
    "TCRBV06-07",
    "TCRBV06-08",
    "TCRBV06-09",
    "TCRBV07-01",
    "TCRBV07-02",
    "TCRBV07-03",
    "TCRBV07-04",
    "TCRBV07-05",
    "TCRBV07-06",
    "TCRBV07-07",
    "TCRBV07-08",
    "TCRBV07-09",
    "TCRBV08-01",
    "TCRBV08-02",
    "TCRBV09-01",
    "TCRBV10-01",
    "TCRBV10-02",
    "TCRBV10-03",
    "TCRBV11-01",
    "TCRBV11-02",
    "TCRBV11-03",
    "TCRBV12-01",
    "TCRBV12-02",
    "TCRBV12-03",
    "TCRBV12-04",
    "TCRBV12-05",
    "TCRBV13-01",
    "TCRBV14-01",
    "TCRBV15-01",
    "TCRBV16-01",
    "TCRBV17-01",
    "TCRBV18-01",
    "TCRBV19-01",
    "TCRBV20-01",
    "TCRBV21-01",
    "TCRBV22-01",
    "TCRBV23-01",
    "TCRBV24-01",
    "TCRBV25-01",
    "TCRBV26-01",
    "TCRBV27-01",
    "TCRBV28-01",
    "TCRBV29-01",
    "TCRBV30-01",
];

pub const TCRB_J_GENES: [&str; 13] = [
    "TCRBJ01-01",
    "TCRBJ01-02",
    "TCRBJ01-03",
    "TCRBJ01-04",
    "TCRBJ01-05",
    "TCRBJ01-06",
    "TCRBJ02-01",
    "TCRBJ02-02",
    "TCRBJ02-03",
    "TCRBJ02-04",
    "TCRBJ02-05",
    "TCRBJ02-06",
    "TCRBJ02-07",
];

// Accept both IMGT (TRBV5-1*01, TRBV9) and Adaptive (TCRBV05-01) names
static GENE_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:TRB|TCRB)(?P<type>[VJ])0*(?P<family>\d+)(?:-0*(?P<member>\d+))?(?:\*\d+)?$")
        .unwrap()
});

/// Return the canonical (Adaptive) representation of a V or J gene name.
/// ```
/// use tcrvae::shared::gene::canonical_gene_name;
/// assert_eq!(canonical_gene_name("TRBV5-1*01").unwrap(), "TCRBV05-01");
/// assert_eq!(canonical_gene_name("TRBV9").unwrap(), "TCRBV09-01");
/// assert_eq!(canonical_gene_name("TCRBJ02-07").unwrap(), "TCRBJ02-07");
/// assert!(canonical_gene_name("IGHV1-2").is_err());
/// ```
pub fn canonical_gene_name(name: &str) -> Result<String> {
    let caps = GENE_NAME
        .captures(name.trim())
        .ok_or(anyhow!("Gene names must follow IMGT or Adaptive conventions, e.g. TRBV5-1*01 or TCRBV05-01 (error coming from the name {})", name))?;
    let family: usize = caps["family"].parse()?;
    let member: usize = match caps.name("member") {
        Some(m) => m.as_str().parse()?,
        None => 1,
    };
    Ok(format!("TCRB{}{:02}-{:02}", &caps["type"], family, member))
}

/// Ordered list of names, with the inverse lookup.
#[derive(Clone, Debug)]
pub struct GeneList {
    names: Vec<String>,
    index: HashMap<String, usize>,
}

impl GeneList {
    pub fn new(names: Vec<String>) -> Result<GeneList> {
        let mut index = HashMap::with_capacity(names.len());
        for (ii, name) in names.iter().enumerate() {
            if index.insert(name.clone(), ii).is_some() {
                return Err(anyhow!("Duplicated gene {} in the vocabulary", name));
            }
        }
        Ok(GeneList { names, index })
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn name(&self, idx: usize) -> Option<&str> {
        self.names.get(idx).map(|x| x.as_str())
    }

    /// Position of a gene in the list. Exact names are looked up first,
    /// then the canonical version of the name.
    pub fn position(&self, name: &str) -> Result<usize> {
        if let Some(&idx) = self.index.get(name) {
            return Ok(idx);
        }
        let canonical = canonical_gene_name(name)?;
        self.index
            .get(&canonical)
            .copied()
            .ok_or(anyhow!("Unknown gene {} (read as {})", name, canonical))
    }
}

/// The three vocabularies needed to go from records to one-hot tensors.
#[derive(Clone, Debug)]
pub struct TcrVocabulary {
    pub amino_acids: Vec<u8>,
    aa_index: HashMap<u8, usize>,
    pub v_genes: GeneList,
    pub j_genes: GeneList,
}

impl Default for TcrVocabulary {
    fn default() -> TcrVocabulary {
        TcrVocabulary::tcrb()
    }
}

impl TcrVocabulary {
    /// Human TCR beta vocabularies.
    pub fn tcrb() -> TcrVocabulary {
        TcrVocabulary::new(
            AMINO_ACIDS.to_vec(),
            TCRB_V_GENES.iter().map(|x| x.to_string()).collect(),
            TCRB_J_GENES.iter().map(|x| x.to_string()).collect(),
        )
        .unwrap()
    }

    pub fn new(
        amino_acids: Vec<u8>,
        v_genes: Vec<String>,
        j_genes: Vec<String>,
    ) -> Result<TcrVocabulary> {
        let mut aa_index = HashMap::with_capacity(amino_acids.len());
        for (ii, &aa) in amino_acids.iter().enumerate() {
            if aa_index.insert(aa, ii).is_some() {
                return Err(anyhow!(
                    "Duplicated amino-acid {} in the vocabulary",
                    aa as char
                ));
            }
        }
        Ok(TcrVocabulary {
            amino_acids,
            aa_index,
            v_genes: GeneList::new(v_genes)?,
            j_genes: GeneList::new(j_genes)?,
        })
    }

    pub fn n_aas(&self) -> usize {
        self.amino_acids.len()
    }

    pub fn aa_position(&self, aa: u8) -> Result<usize> {
        self.aa_index
            .get(&aa)
            .copied()
            .ok_or(anyhow!("Invalid amino-acid `{}`", aa as char))
    }
}
