use std::collections::BTreeMap;

use anyhow::{Result, bail};
use log::debug;

use crate::{
    aggregate::Predicate,
    data::FieldValue,
    destination::Destination,
    loader::Batch,
    schema::{ColumnSpec, SchemaDeclaration, SchemaStyle},
};

/// Field/value pairs in header order; absent fields are simply not present.
pub type Document = Vec<(String, FieldValue)>;

/// In-process document store with the same contract as the MongoDB adapter.
///
/// Useful for embedding the pipeline without a server and for exercising the
/// document code path in tests.
#[derive(Debug, Default)]
pub struct MemoryDestination {
    collections: BTreeMap<String, Vec<Document>>,
    columns: Vec<ColumnSpec>,
    target: Option<String>,
    batches_written: usize,
    fail_on_batch: Option<usize>,
}

impl MemoryDestination {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the `n`-th write (1-based) fail without storing anything.
    pub fn fail_on_batch(mut self, n: usize) -> Self {
        self.fail_on_batch = Some(n);
        self
    }

    pub fn documents(&self, target: &str) -> &[Document] {
        self.collections
            .get(target)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    fn field<'a>(document: &'a Document, name: &str) -> Option<&'a FieldValue> {
        document
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value)
    }
}

impl Destination for MemoryDestination {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    fn schema_style(&self) -> SchemaStyle {
        SchemaStyle::Document
    }

    fn drop_existing(&mut self, target: &str) -> Result<()> {
        if self.collections.remove(target).is_some() {
            debug!("Dropped collection '{target}'");
        }
        Ok(())
    }

    fn create_schema(&mut self, schema: &SchemaDeclaration) -> Result<()> {
        let SchemaDeclaration::Implicit { target, columns } = schema else {
            bail!("Memory store only accepts implicit schemas");
        };
        self.columns = columns.clone();
        self.target = Some(target.clone());
        self.collections.entry(target.clone()).or_default();
        Ok(())
    }

    fn write_batch(&mut self, batch: &Batch) -> Result<()> {
        let Some(target) = self.target.clone() else {
            bail!("Collection must be declared before documents are written");
        };
        self.batches_written += 1;
        if self.fail_on_batch == Some(self.batches_written) {
            bail!("Injected failure on batch {}", self.batches_written);
        }
        let documents = batch
            .rows()
            .iter()
            .map(|row| {
                self.columns
                    .iter()
                    .zip(row)
                    .filter_map(|(column, value)| {
                        value
                            .clone()
                            .map(|value| (column.storage_name.clone(), value))
                    })
                    .collect::<Document>()
            })
            .collect::<Vec<_>>();
        self.collections.entry(target).or_default().extend(documents);
        Ok(())
    }

    fn list_fields(&mut self, target: &str) -> Result<Vec<String>> {
        Ok(self
            .documents(target)
            .first()
            .map(|document| document.iter().map(|(key, _)| key.clone()).collect())
            .unwrap_or_default())
    }

    fn count_matching(&mut self, target: &str, field: &str, predicate: &Predicate) -> Result<u64> {
        let count = self
            .documents(target)
            .iter()
            .filter_map(|document| Self::field(document, field))
            .filter(|value| predicate.matches_value(value))
            .count();
        Ok(count as u64)
    }

    fn row_count(&mut self, target: &str) -> Result<u64> {
        Ok(self.documents(target).len() as u64)
    }
}
