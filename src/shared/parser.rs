// Reading and writing the csv tables (sequences, estimates, diagnostics)

use crate::shared::sequence::TcrRecord;
use anyhow::{anyhow, Context, Result};
use csv::{Reader, Writer};
use std::io::{Read, Write};
use std::path::Path;

/// Read the `amino_acid`, `v_gene`, `j_gene` columns (other columns are ignored)
pub fn read_records<R: Read>(rdr: R) -> Result<Vec<TcrRecord>> {
    let mut reader = Reader::from_reader(rdr);
    reader
        .deserialize()
        .enumerate()
        .map(|(ii, row)| row.map_err(|e| anyhow!("Invalid row {} in the sequence table: {}", ii + 1, e)))
        .collect()
}

pub fn read_records_file(path: &Path) -> Result<Vec<TcrRecord>> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("Error opening the sequence file {}", path.display()))?;
    read_records(file).with_context(|| format!("Error reading {}", path.display()))
}

pub fn write_records<W: Write>(wtr: W, records: &[TcrRecord]) -> Result<()> {
    let mut writer = Writer::from_writer(wtr);
    for record in records {
        writer.serialize(record)?;
    }
    writer.flush()?;
    Ok(())
}

pub fn write_records_file(path: &Path, records: &[TcrRecord]) -> Result<()> {
    let file = std::fs::File::create(path)
        .with_context(|| format!("Error creating {}", path.display()))?;
    write_records(file, records)
}

/// One column `log_p_x`, one estimate per line
pub fn write_log_p<W: Write>(wtr: W, log_p_x: &[f64]) -> Result<()> {
    let mut writer = Writer::from_writer(wtr);
    writer.write_record(["log_p_x"])?;
    for x in log_p_x {
        writer.write_record([x.to_string()])?;
    }
    writer.flush()?;
    Ok(())
}

/// A table with named rows (first column) and named numeric columns
pub fn write_table<W: Write>(
    wtr: W,
    row_names: &[&str],
    columns: &[(&str, Vec<f64>)],
) -> Result<()> {
    if columns.iter().any(|(_, c)| c.len() != row_names.len()) {
        return Err(anyhow!("All the columns should have one value per row"));
    }
    let mut writer = Writer::from_writer(wtr);
    let header: Vec<&str> = std::iter::once("")
        .chain(columns.iter().map(|(name, _)| *name))
        .collect();
    writer.write_record(&header)?;
    for (ii, name) in row_names.iter().enumerate() {
        let row: Vec<String> = std::iter::once(name.to_string())
            .chain(columns.iter().map(|(_, c)| c[ii].to_string()))
            .collect();
        writer.write_record(&row)?;
    }
    writer.flush()?;
    Ok(())
}

/// Keep the largest prefix whose length is a multiple of `chunk`.
pub fn truncate_to_multiple<T: Clone>(records: &[T], chunk: usize) -> Result<Vec<T>> {
    if chunk == 0 {
        return Ok(records.to_vec());
    }
    if records.len() < chunk {
        return Err(anyhow!(
            "Not enough sequences: {} found, at least {} needed",
            records.len(),
            chunk
        ));
    }
    let n_to_take = records.len() - records.len() % chunk;
    Ok(records[..n_to_take].to_vec())
}
