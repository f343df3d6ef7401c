use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use log::{debug, info, warn};
use rusqlite::{Connection, params_from_iter};

use crate::{
    aggregate::Predicate,
    destination::Destination,
    loader::Batch,
    schema::{
        RelationalSchema, SchemaDeclaration, SchemaStyle, SqlDialect, count_statement,
        drop_table_statement, quote_ident,
    },
};

/// Embedded relational file. Each batch runs inside its own transaction.
pub struct SqliteDestination {
    conn: Connection,
    location: PathBuf,
    schema: Option<RelationalSchema>,
}

impl SqliteDestination {
    pub fn open(path: &Path) -> Result<Self> {
        info!("Connecting to SQLite database {:?}...", path);
        let conn =
            Connection::open(path).with_context(|| format!("Opening SQLite database {path:?}"))?;
        info!("Connection established");
        Ok(Self {
            conn,
            location: path.to_path_buf(),
            schema: None,
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Opening in-memory SQLite database")?;
        Ok(Self {
            conn,
            location: PathBuf::from(":memory:"),
            schema: None,
        })
    }
}

impl Destination for SqliteDestination {
    fn backend_name(&self) -> &'static str {
        "sqlite"
    }

    fn schema_style(&self) -> SchemaStyle {
        SchemaStyle::Relational(SqlDialect::Sqlite)
    }

    fn drop_existing(&mut self, target: &str) -> Result<()> {
        self.conn
            .execute_batch(&drop_table_statement(target))
            .with_context(|| format!("Dropping table '{target}'"))?;
        self.schema = None;
        Ok(())
    }

    fn create_schema(&mut self, schema: &SchemaDeclaration) -> Result<()> {
        let SchemaDeclaration::Relational(relational) = schema else {
            bail!("SQLite needs a relational schema for '{}'", schema.target());
        };
        let statement = relational.create_statement();
        debug!("Create statement: {statement}");
        self.conn
            .execute_batch(&statement)
            .with_context(|| format!("Creating table '{}'", relational.target))?;
        info!(
            "Table '{}' created with {} column(s)",
            relational.target,
            relational.columns.len()
        );
        self.schema = Some(relational.clone());
        Ok(())
    }

    fn write_batch(&mut self, batch: &Batch) -> Result<()> {
        let schema = self
            .schema
            .as_ref()
            .context("Table must be created before rows are written")?;
        let width = schema.columns.len();
        let insert = schema.insert_statement();

        let tx = self.conn.transaction().context("Beginning transaction")?;
        {
            let mut statement = tx.prepare_cached(&insert).context("Preparing insert")?;
            for row in batch.rows() {
                let values = (0..width)
                    .map(|idx| row.get(idx).and_then(|cell| cell.as_ref()?.as_text()))
                    .collect::<Vec<_>>();
                statement
                    .execute(params_from_iter(values.iter()))
                    .context("Inserting row")?;
            }
        }
        tx.commit().context("Committing batch")
    }

    fn list_fields(&mut self, target: &str) -> Result<Vec<String>> {
        let mut statement = self
            .conn
            .prepare("SELECT name FROM pragma_table_info(?1) ORDER BY cid")?;
        let names = statement
            .query_map([target], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .with_context(|| format!("Reading columns of '{target}'"))?;
        Ok(names)
    }

    fn count_matching(&mut self, target: &str, field: &str, predicate: &Predicate) -> Result<u64> {
        let (condition, params) = predicate.sql_condition(SqlDialect::Sqlite, field);
        let query = format!("SELECT COUNT(*) FROM {} WHERE {condition}", quote_ident(target));
        debug!("Aggregate query: {query} {params:?}");
        let count: i64 = self
            .conn
            .query_row(&query, params_from_iter(params.iter()), |row| row.get(0))
            .with_context(|| format!("Counting rows of '{target}'"))?;
        Ok(count as u64)
    }

    fn row_count(&mut self, target: &str) -> Result<u64> {
        let count: i64 = self
            .conn
            .query_row(&count_statement(target), [], |row| row.get(0))
            .with_context(|| format!("Counting rows of '{target}'"))?;
        Ok(count as u64)
    }
}

impl Drop for SqliteDestination {
    fn drop(&mut self) {
        if !self.conn.is_autocommit() {
            warn!("Closing SQLite connection with an open transaction");
        }
        info!("SQLite connection to {:?} closed", self.location);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{data::FieldValue, schema};

    fn destination_with(header: &[&str]) -> SqliteDestination {
        let mut dest = SqliteDestination::open_in_memory().expect("in-memory db");
        let header = header.iter().map(|h| h.to_string()).collect::<Vec<_>>();
        let declaration = schema::build("utenti", &header, dest.schema_style());
        dest.drop_existing("utenti").unwrap();
        dest.create_schema(&declaration).unwrap();
        dest
    }

    fn text(value: &str) -> Option<FieldValue> {
        Some(FieldValue::Text(value.to_string()))
    }

    #[test]
    fn reserved_column_is_created_and_listed() {
        let mut dest = destination_with(&["Select", "Website"]);
        assert_eq!(
            dest.list_fields("utenti").unwrap(),
            vec!["id", "select_col", "website"]
        );
    }

    #[test]
    fn short_rows_store_nulls() {
        let mut dest = destination_with(&["Name", "Website"]);
        let mut batch = Batch::with_capacity(4);
        batch.push(vec![text("Ada"), None]);
        dest.write_batch(&batch).unwrap();

        let nulls: i64 = dest
            .conn
            .query_row("SELECT COUNT(*) FROM utenti WHERE website IS NULL", [], |r| r.get(0))
            .unwrap();
        assert_eq!(nulls, 1);
    }

    #[test]
    fn prefix_count_uses_like() {
        let mut dest = destination_with(&["Website"]);
        let mut batch = Batch::with_capacity(4);
        for url in ["https://a.it", "http://b.it", "https://c.info"] {
            batch.push(vec![text(url)]);
        }
        dest.write_batch(&batch).unwrap();

        let count = dest
            .count_matching("utenti", "website", &Predicate::Prefix("https://".into()))
            .unwrap();
        assert_eq!(count, 2);
        assert_eq!(dest.row_count("utenti").unwrap(), 3);
    }

    #[test]
    fn failed_row_rolls_back_whole_batch() {
        let mut dest = destination_with(&["Name"]);
        dest.conn
            .execute_batch(
                "CREATE TRIGGER reject_bad BEFORE INSERT ON utenti WHEN NEW.name = 'bad' \
                 BEGIN SELECT RAISE(ABORT, 'rejected'); END;",
            )
            .unwrap();
        let mut batch = Batch::with_capacity(4);
        batch.push(vec![text("good")]);
        batch.push(vec![text("bad")]);

        assert!(dest.write_batch(&batch).is_err());
        assert_eq!(dest.row_count("utenti").unwrap(), 0);
        assert!(dest.conn.is_autocommit());
    }

    #[test]
    fn writing_before_schema_is_an_error() {
        let mut dest = SqliteDestination::open_in_memory().unwrap();
        assert!(dest.write_batch(&Batch::with_capacity(1)).is_err());
    }
}
