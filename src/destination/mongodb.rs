use anyhow::{Context, Result, bail};
use chrono::{NaiveDate, NaiveTime};
use log::{debug, info};
use ::mongodb::{
    bson::{Bson, DateTime, Document, doc},
    sync::{Client, Collection, Database},
};

use crate::{
    aggregate::Predicate,
    data::FieldValue,
    destination::Destination,
    loader::Batch,
    schema::{ColumnSpec, SchemaDeclaration, SchemaStyle},
};

const DOCUMENT_ID: &str = "_id";

/// Document store. Collections are created implicitly by the first insert.
pub struct MongoDestination {
    database: Database,
    columns: Vec<ColumnSpec>,
    target: Option<String>,
}

impl MongoDestination {
    pub fn connect(uri: &str, database: &str) -> Result<Self> {
        info!("Connecting to MongoDB database '{database}'...");
        let client = Client::with_uri_str(uri).context("Parsing MongoDB connection string")?;
        let database = client.database(database);
        database
            .run_command(doc! { "ping": 1 }, None)
            .context("Pinging MongoDB server")?;
        info!("Connection established");
        Ok(Self {
            database,
            columns: Vec::new(),
            target: None,
        })
    }

    fn collection(&self, target: &str) -> Collection<Document> {
        self.database.collection::<Document>(target)
    }
}

fn to_bson(value: &FieldValue) -> Bson {
    match value {
        FieldValue::Text(text) => Bson::String(text.clone()),
        FieldValue::Date(date) => Bson::DateTime(midnight_utc(*date)),
        FieldValue::Null => Bson::Null,
    }
}

fn midnight_utc(date: NaiveDate) -> DateTime {
    DateTime::from_millis(date.and_time(NaiveTime::MIN).and_utc().timestamp_millis())
}

/// Server-side filter equivalent to the predicate's relational `WHERE` condition.
pub fn predicate_filter(field: &str, predicate: &Predicate) -> Document {
    let condition = match predicate {
        Predicate::Suffix { suffix, or_path } => {
            let escaped = regex::escape(suffix);
            let pattern = if *or_path {
                format!("{escaped}(/|$)")
            } else {
                format!("{escaped}$")
            };
            doc! { "$regex": pattern }
        }
        Predicate::Prefix(prefix) => doc! { "$regex": format!("^{}", regex::escape(prefix)) },
        Predicate::DateRange { start, end } => doc! {
            "$gte": midnight_utc(*start),
            "$lt": midnight_utc(Predicate::date_upper_bound(*end)),
        },
    };
    let mut filter = Document::new();
    filter.insert(field, condition);
    filter
}

impl Destination for MongoDestination {
    fn backend_name(&self) -> &'static str {
        "mongodb"
    }

    fn schema_style(&self) -> SchemaStyle {
        SchemaStyle::Document
    }

    fn drop_existing(&mut self, target: &str) -> Result<()> {
        let existing = self
            .database
            .list_collection_names(doc! { "name": target })
            .context("Listing collections")?;
        if !existing.is_empty() {
            self.collection(target)
                .drop(None)
                .with_context(|| format!("Dropping collection '{target}'"))?;
            info!("Existing collection '{target}' dropped");
        }
        Ok(())
    }

    fn create_schema(&mut self, schema: &SchemaDeclaration) -> Result<()> {
        let SchemaDeclaration::Implicit { target, columns } = schema else {
            bail!("MongoDB only accepts implicit schemas");
        };
        debug!("Collection '{target}' will hold {} field(s)", columns.len());
        self.columns = columns.clone();
        self.target = Some(target.clone());
        Ok(())
    }

    fn write_batch(&mut self, batch: &Batch) -> Result<()> {
        let Some(target) = self.target.as_deref() else {
            bail!("Collection must be declared before documents are written");
        };
        let documents = batch
            .rows()
            .iter()
            .map(|row| {
                let mut document = Document::new();
                for (column, value) in self.columns.iter().zip(row) {
                    if let Some(value) = value {
                        document.insert(column.storage_name.clone(), to_bson(value));
                    }
                }
                document
            })
            .collect::<Vec<_>>();
        self.collection(target)
            .insert_many(documents, None)
            .with_context(|| format!("Inserting {} document(s) into '{target}'", batch.len()))?;
        Ok(())
    }

    fn list_fields(&mut self, target: &str) -> Result<Vec<String>> {
        let first = self
            .collection(target)
            .find_one(None, None)
            .with_context(|| format!("Sampling a document of '{target}'"))?;
        Ok(first
            .map(|document| {
                document
                    .keys()
                    .filter(|key| key.as_str() != DOCUMENT_ID)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn count_matching(&mut self, target: &str, field: &str, predicate: &Predicate) -> Result<u64> {
        let filter = predicate_filter(field, predicate);
        debug!("Aggregate filter: {filter}");
        self.collection(target)
            .count_documents(filter, None)
            .with_context(|| format!("Counting documents of '{target}'"))
    }

    fn row_count(&mut self, target: &str) -> Result<u64> {
        self.collection(target)
            .count_documents(None, None)
            .with_context(|| format!("Counting documents of '{target}'"))
    }
}

impl Drop for MongoDestination {
    fn drop(&mut self) {
        info!("MongoDB connection closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suffix_filter_anchors_escaped_pattern() {
        let predicate = Predicate::Suffix {
            suffix: ".com".into(),
            or_path: false,
        };
        assert_eq!(
            predicate_filter("email", &predicate),
            doc! { "email": { "$regex": "\\.com$" } }
        );
    }

    #[test]
    fn date_range_filter_uses_exclusive_upper_bound() {
        let predicate = Predicate::DateRange {
            start: NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
            end: NaiveDate::from_ymd_opt(2020, 12, 31).unwrap(),
        };
        let filter = predicate_filter("subscription_date", &predicate);
        let range = filter.get_document("subscription_date").unwrap();
        assert_eq!(
            range.get_datetime("$lt").unwrap().timestamp_millis(),
            1_609_459_200_000
        );
    }

    #[test]
    fn dates_become_native_datetimes() {
        let date = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
        assert_eq!(
            to_bson(&FieldValue::Date(date)),
            Bson::DateTime(DateTime::from_millis(1_577_836_800_000))
        );
        assert_eq!(to_bson(&FieldValue::Null), Bson::Null);
    }
}
