use anyhow::Result;
use rand::rngs::SmallRng;
use rand::SeedableRng;
use tcrvae::shared::gene::{TCRB_J_GENES, TCRB_V_GENES};
use tcrvae::shared::parser::{read_records, truncate_to_multiple, write_log_p, write_records};
use tcrvae::shared::sequence::{pad_middle, unpad};
use tcrvae::shared::{
    canonical_gene_name, onehot_to_sequences, sample_sequences, unpadded_sequences_to_onehot,
    Hyperparameters, TcrRecord, TcrVocabulary,
};
mod common;

#[test]
fn padding_in_the_middle() -> Result<()> {
    assert_eq!(pad_middle("CASSLGF", 10)?, "CAS---SLGF");
    assert_eq!(pad_middle("", 3)?, "---");
    assert_eq!(unpad("CAS---SLGF"), "CASSLGF");
    assert!(pad_middle("CASSLGF", 6).is_err());
    Ok(())
}

#[test]
fn gene_names_are_normalized() -> Result<()> {
    assert_eq!(canonical_gene_name("TRBV12-3*01")?, "TCRBV12-03");
    assert_eq!(canonical_gene_name("TCRBV12-03")?, "TCRBV12-03");
    assert_eq!(canonical_gene_name("TRBJ2-7")?, "TCRBJ02-07");
    assert!(canonical_gene_name("not a gene").is_err());

    let vocabulary = TcrVocabulary::default();
    assert_eq!(vocabulary.v_genes.len(), TCRB_V_GENES.len());
    assert_eq!(vocabulary.j_genes.len(), TCRB_J_GENES.len());
    assert_eq!(
        vocabulary.v_genes.position("TRBV5-1*01")?,
        vocabulary.v_genes.position("TCRBV05-01")?
    );
    assert!(vocabulary.j_genes.position("TRBJ9-9").is_err());
    Ok(())
}

#[test]
fn default_vocabulary_matches_default_parameters() {
    let params = Hyperparameters::default();
    let vocabulary = TcrVocabulary::default();
    assert_eq!(params.n_aas, vocabulary.n_aas());
    assert_eq!(params.n_v_genes, vocabulary.v_genes.len());
    assert_eq!(params.n_j_genes, vocabulary.j_genes.len());
}

#[test]
fn onehot_round_trip() -> Result<()> {
    let vocabulary = TcrVocabulary::default();
    let records = vec![
        TcrRecord::new("CASSLAPGATNEKLFF", "TCRBV05-01", "TCRBJ01-04"),
        TcrRecord::new("CASRGQGNTIYF", "TRBV7-9*01", "TRBJ1-3"),
    ];
    let data = unpadded_sequences_to_onehot(&records, 30, &vocabulary)?;
    data.check_shape(&Hyperparameters::default())?;
    assert_eq!(data.cdr3.sum(), 60.);
    assert_eq!(data.v_gene.sum(), 2.);

    let back = onehot_to_sequences(&data, &vocabulary)?;
    assert_eq!(back[0], records[0]);
    assert_eq!(back[1].amino_acid, "CASRGQGNTIYF");
    assert_eq!(back[1].v_gene, "TCRBV07-09");
    assert_eq!(back[1].j_gene, "TCRBJ01-03");

    // sampling a one-hot distribution gives back the observation
    let sampled = sample_sequences(&data, &vocabulary, &mut SmallRng::seed_from_u64(0))?;
    assert_eq!(sampled, back);
    Ok(())
}

#[test]
fn invalid_records_are_rejected() {
    let vocabulary = common::tiny_vocabulary();
    let bad_aa = [TcrRecord::new("CXS", "TCRBV01-01", "TCRBJ01-01")];
    let bad_gene = [TcrRecord::new("CAS", "TCRBV03-01", "TCRBJ01-01")];
    let too_long = [TcrRecord::new("CASS", "TCRBV01-01", "TCRBJ01-01")];
    assert!(unpadded_sequences_to_onehot(&bad_aa, 3, &vocabulary).is_err());
    assert!(unpadded_sequences_to_onehot(&bad_gene, 3, &vocabulary).is_err());
    assert!(unpadded_sequences_to_onehot(&too_long, 3, &vocabulary).is_err());
}

#[test]
fn truncation_to_batches() -> Result<()> {
    let records = common::tiny_records();
    assert_eq!(truncate_to_multiple(&records, 3)?.len(), 3);
    assert_eq!(truncate_to_multiple(&records, 2)?.len(), 4);
    assert_eq!(truncate_to_multiple(&records, 0)?.len(), 4);
    assert!(truncate_to_multiple(&records, 5).is_err());
    Ok(())
}

#[test]
fn csv_tables() -> Result<()> {
    let input = "amino_acid,v_gene,j_gene,count\nCAS,TCRBV01-01,TCRBJ01-01,3\nCS,TCRBV02-01,TCRBJ01-02,1\n";
    let records = read_records(input.as_bytes())?;
    assert_eq!(records, common::tiny_records()[..2].to_vec());

    let mut buffer = Vec::new();
    write_records(&mut buffer, &records)?;
    assert_eq!(read_records(buffer.as_slice())?, records);

    let mut buffer = Vec::new();
    write_log_p(&mut buffer, &[-1.5, f64::NEG_INFINITY])?;
    assert_eq!(String::from_utf8(buffer)?, "log_p_x\n-1.5\n-inf\n");

    assert!(read_records("amino_acid,v_gene\nCAS,TCRBV01-01\n".as_bytes()).is_err());
    Ok(())
}

#[test]
fn hyperparameter_records() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("model_params.json");
    let params = common::tiny_params();
    params.save_json(&path)?;
    assert_eq!(Hyperparameters::load_json(&path)?, params);

    let mut json: serde_json::Value = serde_json::to_value(&params)?;
    json["comment"] = serde_json::Value::from("ignored");
    assert_eq!(Hyperparameters::from_json_str(&json.to_string())?, params);

    let mut missing = json.clone();
    if let Some(map) = missing.as_object_mut() {
        map.remove("latent_dim");
    }
    assert!(Hyperparameters::from_json_str(&missing.to_string()).is_err());

    let mut wrong_type = json.clone();
    wrong_type["batch_size"] = serde_json::Value::from("two");
    assert!(Hyperparameters::from_json_str(&wrong_type.to_string()).is_err());

    let mut zero = json.clone();
    zero["dense_nodes"] = serde_json::Value::from(0);
    assert!(Hyperparameters::from_json_str(&zero.to_string()).is_err());
    Ok(())
}
