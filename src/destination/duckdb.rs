use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use ::duckdb::{Connection, params_from_iter};
use log::{debug, info};

use crate::{
    aggregate::Predicate,
    destination::Destination,
    io_utils::printable_delimiter,
    loader::Batch,
    schema::{SchemaDeclaration, SchemaStyle, SqlDialect, count_statement, drop_table_statement, quote_ident},
};

/// Embedded analytical file. The engine reads the CSV itself, so rows never
/// pass through the batch loader and column types are whatever it infers.
pub struct DuckDbDestination {
    conn: Connection,
    location: PathBuf,
}

impl DuckDbDestination {
    pub fn open(path: &Path) -> Result<Self> {
        info!("Connecting to DuckDB database {:?}...", path);
        let conn =
            Connection::open(path).with_context(|| format!("Opening DuckDB database {path:?}"))?;
        info!("Connection established");
        Ok(Self {
            conn,
            location: path.to_path_buf(),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Opening in-memory DuckDB database")?;
        Ok(Self {
            conn,
            location: PathBuf::from(":memory:"),
        })
    }
}

fn string_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// `CREATE TABLE .. AS SELECT` over the engine's CSV reader with header detection forced on.
pub fn materialize_statement(target: &str, source: &Path, delimiter: u8) -> String {
    format!(
        "CREATE TABLE {} AS SELECT * FROM read_csv_auto({}, header = true, delim = {})",
        quote_ident(target),
        string_literal(&source.to_string_lossy()),
        string_literal(&(delimiter as char).to_string())
    )
}

impl Destination for DuckDbDestination {
    fn backend_name(&self) -> &'static str {
        "duckdb"
    }

    fn schema_style(&self) -> SchemaStyle {
        SchemaStyle::Materialized
    }

    fn drop_existing(&mut self, target: &str) -> Result<()> {
        self.conn
            .execute_batch(&drop_table_statement(target))
            .with_context(|| format!("Dropping table '{target}'"))
    }

    fn create_schema(&mut self, schema: &SchemaDeclaration) -> Result<()> {
        match schema {
            SchemaDeclaration::Materialized { target } => {
                debug!("Table '{target}' will be created from the source file");
                Ok(())
            }
            other => bail!("DuckDB materializes '{}' from the file itself", other.target()),
        }
    }

    fn write_batch(&mut self, _batch: &Batch) -> Result<()> {
        bail!("DuckDB loads rows through materialize, not in batches")
    }

    fn materialize(&mut self, target: &str, source: &Path, delimiter: u8) -> Result<u64> {
        info!(
            "Materializing '{target}' from {:?} (delimiter '{}')",
            source,
            printable_delimiter(delimiter)
        );
        let statement = materialize_statement(target, source, delimiter);
        debug!("Materialize statement: {statement}");
        self.conn
            .execute_batch(&statement)
            .with_context(|| format!("Materializing '{target}' from {source:?}"))?;
        self.row_count(target)
    }

    fn list_fields(&mut self, target: &str) -> Result<Vec<String>> {
        let mut statement = self.conn.prepare(
            "SELECT column_name FROM information_schema.columns \
             WHERE table_name = ? ORDER BY ordinal_position",
        )?;
        let names = statement
            .query_map([target], |row| row.get::<_, String>(0))?
            .collect::<::duckdb::Result<Vec<_>>>()
            .with_context(|| format!("Reading columns of '{target}'"))?;
        Ok(names)
    }

    fn count_matching(&mut self, target: &str, field: &str, predicate: &Predicate) -> Result<u64> {
        let (condition, params) = predicate.sql_condition(SqlDialect::DuckDb, field);
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

impl Drop for DuckDbDestination {
    fn drop(&mut self) {
        info!("DuckDB connection to {:?} closed", self.location);
    }
}
