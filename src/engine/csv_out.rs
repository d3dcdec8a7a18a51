use super::batch::BatchError;
use crate::api::{CrmRecord, PropertyDefinition};
use crate::error::Result;
use crate::objects::RECORD_ID_COLUMN;
use chrono::Local;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::info;

/// Columns for a set of records: the identifier column, then every property
/// seen in any of them, sorted
fn columns_for(records: &[CrmRecord]) -> Vec<String> {
    let names: BTreeSet<&str> = records
        .iter()
        .flat_map(|r| r.properties.keys().map(String::as_str))
        .collect();
    names.into_iter().map(str::to_string).collect()
}

fn write_records(path: &Path, records: &[CrmRecord]) -> Result<()> {
    let columns = columns_for(records);
    let mut writer = csv::Writer::from_path(path)?;

    let mut header = Vec::with_capacity(columns.len() + 1);
    header.push(RECORD_ID_COLUMN.to_string());
    header.extend(columns.iter().cloned());
    writer.write_record(&header)?;

    for record in records {
        let mut row = Vec::with_capacity(columns.len() + 1);
        row.push(record.id.clone());
        row.extend(columns.iter().map(|c| record.property_text(c)));
        writer.write_record(&row)?;
    }
    writer.flush()?;
    Ok(())
}

/// Writes every record to one file whose columns are the union over all of them
///
/// # Errors
///
/// Returns an error if the file cannot be created or written.
pub fn write_records_csv(path: &Path, records: &[CrmRecord]) -> Result<()> {
    write_records(path, records)?;
    info!(path = %path.display(), records = records.len(), "Wrote records");
    Ok(())
}

/// Writes a property listing as `API Name, Field Name, Data Type, Field Type`
///
/// # Errors
///
/// Returns an error if the file cannot be created or written.
pub fn write_field_metadata(path: &Path, properties: &[PropertyDefinition]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(["API Name", "Field Name", "Data Type", "Field Type"])?;
    for property in properties {
        writer.write_record([
            property.name.as_str(),
            property.label.as_str(),
            property.data_type.as_str(),
            property.field_type.as_str(),
        ])?;
    }
    writer.flush()?;
    info!(path = %path.display(), fields = properties.len(), "Wrote field metadata");
    Ok(())
}

/// Persists failed batches to `deletion_errors_<object>_<timestamp>.csv`.
///
/// Nothing is written for an empty ledger.
///
/// # Errors
///
/// Returns an error if the file cannot be created or written.
pub fn write_error_ledger(
    dir: &Path,
    object: &str,
    errors: &[BatchError],
) -> Result<Option<PathBuf>> {
    if errors.is_empty() {
        return Ok(None);
    }
    let timestamp = Local::now().format("%Y%m%d_%H%M%S");
    let path = dir.join(format!("deletion_errors_{object}_{timestamp}.csv"));

    let mut writer = csv::Writer::from_path(&path)?;
    writer.write_record(["Batch", "Status Code", "Error Message"])?;
    for error in errors {
        let status = error.status.map(|s| s.to_string()).unwrap_or_default();
        writer.write_record([error.range().as_str(), status.as_str(), error.message.as_str()])?;
    }
    writer.flush()?;
    info!(path = %path.display(), failed_batches = errors.len(), "Wrote error ledger");
    Ok(Some(path))
}

/// Streams records into numbered files of at most `chunk_size` rows.
///
/// Each file's columns are the union of the properties present in that
/// file's records only, so files from one run may differ in columns.
#[derive(Debug)]
pub struct ChunkedCsvWriter {
    dir: PathBuf,
    prefix: String,
    chunk_size: usize,
    chunk: Vec<CrmRecord>,
    next_index: usize,
    written: Vec<PathBuf>,
    records_written: usize,
}

impl ChunkedCsvWriter {
    /// Files are named `<prefix>_<n>.csv` inside `dir`, `n` counting from 1
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>, prefix: impl Into<String>, chunk_size: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            dir: dir.into(),
            prefix: prefix.into(),
            chunk_size,
            chunk: Vec::with_capacity(chunk_size),
            next_index: 1,
            written: Vec::new(),
            records_written: 0,
        }
    }

    /// Adds one record, flushing when the chunk is full
    ///
    /// # Errors
    ///
    /// Returns an error if a flush fails; the chunk is kept for another attempt.
    pub fn ingest(&mut self, record: CrmRecord) -> Result<Option<PathBuf>> {
        self.chunk.push(record);
        if self.chunk.len() >= self.chunk_size {
            return self.flush().map(Some);
        }
        Ok(None)
    }

    /// Records buffered but not yet written
    #[must_use]
    pub fn pending(&self) -> usize {
        self.chunk.len()
    }

    #[must_use]
    pub fn files(&self) -> &[PathBuf] {
        &self.written
    }

    #[must_use]
    pub const fn records_written(&self) -> usize {
        self.records_written
    }

    fn flush(&mut self) -> Result<PathBuf> {
        let path = self
            .dir
            .join(format!("{}_{}.csv", self.prefix, self.next_index));
        write_records(&path, &self.chunk)?;
        info!(path = %path.display(), records = self.chunk.len(), "Flushed chunk");

        self.records_written += self.chunk.len();
        self.next_index += 1;
        self.chunk.clear();
        self.written.push(path.clone());
        Ok(path)
    }

    /// Writes any partial chunk and returns every file produced
    ///
    /// # Errors
    ///
    /// Returns an error if the final flush fails.
    pub fn finalize(mut self) -> Result<Vec<PathBuf>> {
        if !self.chunk.is_empty() {
            self.flush()?;
        }
        Ok(self.written)
    }
}
