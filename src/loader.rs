//! Streaming batch loader.
//!
//! Rows are read one at a time from a forward-only reader, prepared for the
//! destination's [`SchemaStyle`], and buffered into a [`Batch`]. A full batch
//! is handed to [`Destination::write_batch`], which commits it atomically; the
//! final partial batch is committed once the stream ends. Batches committed
//! before a failure stay committed. The in-flight batch is either rolled back
//! by the destination or, for stream errors, never issued at all.

use std::io::Read;

use anyhow::anyhow;
use csv::ByteRecord;
use encoding_rs::Encoding;
use log::{info, warn};
use serde::Serialize;

use crate::{
    data::{FieldValue, coerce_date, is_date_field},
    destination::Destination,
    error::PipelineError,
    io_utils,
    schema::{ColumnSpec, SchemaStyle},
};

pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// One source record after preparation; `None` marks a field missing from a short row.
pub type PreparedRow = Vec<Option<FieldValue>>;

#[derive(Debug, Clone)]
pub struct Batch {
    rows: Vec<PreparedRow>,
    capacity: usize,
}

impl Batch {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            rows: Vec::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, row: PreparedRow) {
        self.rows.push(row);
    }

    pub fn is_full(&self) -> bool {
        self.rows.len() >= self.capacity
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn rows(&self) -> &[PreparedRow] {
        &self.rows
    }

    pub fn clear(&mut self) {
        self.rows.clear();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LoadResult {
    pub total_rows_loaded: u64,
}

#[derive(Debug, Clone, Copy)]
pub struct BatchLoader {
    batch_size: usize,
    encoding: &'static Encoding,
}

impl BatchLoader {
    pub fn new(batch_size: usize, encoding: &'static Encoding) -> Self {
        Self {
            batch_size: batch_size.max(1),
            encoding,
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Loads every record after the header from `reader` into `destination`.
    ///
    /// `reader` must be positioned at the header record; it is skipped here.
    pub fn load<R: Read>(
        &self,
        reader: &mut csv::Reader<R>,
        columns: &[ColumnSpec],
        style: SchemaStyle,
        destination: &mut dyn Destination,
    ) -> Result<LoadResult, PipelineError> {
        let date_columns = columns
            .iter()
            .map(|column| style.coerces_dates() && is_date_field(&column.storage_name))
            .collect::<Vec<_>>();
        let mut committed = 0u64;
        let mut batch = Batch::with_capacity(self.batch_size);
        let mut record = ByteRecord::new();
        let mut line = 0usize;

        let abort = |committed: u64, cause: anyhow::Error| {
            if committed > 0 {
                warn!(
                    "Load aborted; {committed} row(s) from earlier batches remain in the destination"
                );
            }
            PipelineError::load_failed(committed, cause)
        };

        loop {
            let has_record = reader
                .read_byte_record(&mut record)
                .map_err(|err| abort(committed, anyhow::Error::new(err).context("Reading source record")))?;
            if !has_record {
                break;
            }
            line += 1;
            if line == 1 {
                continue;
            }

            let mut values = io_utils::decode_record(&record, self.encoding)
                .map_err(|err| abort(committed, err.context(format!("Decoding row {line}"))))?;
            if values.len() > columns.len() && matches!(style, SchemaStyle::Document) {
                warn!(
                    "Row {line} has {} field(s) but the header declares {}; extra values dropped",
                    values.len(),
                    columns.len()
                );
                values.truncate(columns.len());
            } else if values.len() > columns.len() {
                return Err(abort(
                    committed,
                    anyhow!(
                        "Row {line} has {} field(s) but the header declares {}",
                        values.len(),
                        columns.len()
                    ),
                ));
            }
            batch.push(prepare_row(values, columns.len(), &date_columns));

            if batch.is_full() {
                committed += self.commit(&mut batch, destination, committed, line)?;
                info!("Loaded {committed} row(s)...");
            }
        }

        if !batch.is_empty() {
            committed += self.commit(&mut batch, destination, committed, line)?;
        }
        info!("Load complete: {committed} row(s) inserted");
        Ok(LoadResult {
            total_rows_loaded: committed,
        })
    }

    fn commit(
        &self,
        batch: &mut Batch,
        destination: &mut dyn Destination,
        committed: u64,
        line: usize,
    ) -> Result<u64, PipelineError> {
        let size = batch.len() as u64;
        destination.write_batch(batch).map_err(|err| {
            warn!(
                "Batch ending at line {line} rolled back; {committed} row(s) were committed before it"
            );
            PipelineError::load_failed(committed, err.context(format!("Writing batch ending at line {line}")))
        })?;
        batch.clear();
        Ok(size)
    }
}

/// Aligns raw values with the header; only date-like columns are coerced.
fn prepare_row(values: Vec<String>, width: usize, date_columns: &[bool]) -> PreparedRow {
    let mut row: PreparedRow = Vec::with_capacity(width);
    for (idx, value) in values.into_iter().enumerate() {
        let prepared = if date_columns.get(idx).copied().unwrap_or(false) {
            coerce_date(&value)
        } else {
            FieldValue::Text(value)
        };
        row.push(Some(prepared));
    }
    row.resize(width, None);
    row
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn prepare_row_marks_missing_trailing_fields_absent() {
        let row = prepare_row(vec!["a".into()], 3, &[false, false, false]);
        assert_eq!(row, vec![Some(FieldValue::Text("a".into())), None, None]);
    }

    #[test]
    fn prepare_row_coerces_only_date_columns() {
        let row = prepare_row(
            vec!["2020-06-15".into(), "2020-06-15".into(), "".into()],
            3,
            &[true, false, true],
        );
        assert_eq!(
            row,
            vec![
                Some(FieldValue::Date(NaiveDate::from_ymd_opt(2020, 6, 15).unwrap())),
                Some(FieldValue::Text("2020-06-15".into())),
                Some(FieldValue::Null),
            ]
        );
    }

    #[test]
    fn batch_reports_full_at_capacity() {
        let mut batch = Batch::with_capacity(2);
        batch.push(vec![]);
        assert!(!batch.is_full());
        batch.push(vec![]);
        assert!(batch.is_full());
        batch.clear();
        assert!(batch.is_empty());
    }

    #[test]
    fn zero_capacity_is_clamped() {
        assert_eq!(Batch::with_capacity(0).capacity, 1);
        assert_eq!(BatchLoader::new(0, encoding_rs::UTF_8).batch_size(), 1);
    }
}
