use std::time::Duration;

use anyhow::{Context, Result, bail};
use log::{debug, info};
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use tokio::runtime::{Builder, Runtime};

use crate::{
    aggregate::Predicate,
    destination::{Destination, PostgresParams},
    loader::Batch,
    schema::{
        RelationalSchema, SchemaDeclaration, SchemaStyle, SqlDialect, count_statement,
        drop_table_statement, quote_ident,
    },
};

/// Client/server relational store driven through a private single-threaded runtime.
///
/// The pool is capped at one connection so every statement of a run, and every
/// batch transaction, goes over the same session.
pub struct PostgresDestination {
    runtime: Runtime,
    pool: PgPool,
    label: String,
    schema: Option<RelationalSchema>,
}

impl PostgresDestination {
    pub fn connect(params: &PostgresParams) -> Result<Self> {
        let label = format!("{}@{}:{}/{}", params.user, params.host, params.port, params.dbname);
        info!("Connecting to PostgreSQL {label}...");
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .context("Starting async runtime")?;
        let options = PgConnectOptions::new()
            .host(&params.host)
            .port(params.port)
            .username(&params.user)
            .password(&params.password)
            .database(&params.dbname);
        let pool = runtime
            .block_on(
                PgPoolOptions::new()
                    .max_connections(1)
                    .acquire_timeout(Duration::from_secs(30))
                    .connect_with(options),
            )
            .with_context(|| format!("Connecting to {label}"))?;
        info!("Connection established");
        Ok(Self {
            runtime,
            pool,
            label,
            schema: None,
        })
    }

    fn execute(&self, statement: &str) -> Result<()> {
        self.runtime
            .block_on(sqlx::query(statement).execute(&self.pool))
            .with_context(|| format!("Executing `{statement}`"))?;
        Ok(())
    }
}

impl Destination for PostgresDestination {
    fn backend_name(&self) -> &'static str {
        "postgres"
    }

    fn schema_style(&self) -> SchemaStyle {
        SchemaStyle::Relational(SqlDialect::Postgres)
    }

    fn drop_existing(&mut self, target: &str) -> Result<()> {
        self.execute(&drop_table_statement(target))?;
        self.schema = None;
        Ok(())
    }

    fn create_schema(&mut self, schema: &SchemaDeclaration) -> Result<()> {
        let SchemaDeclaration::Relational(relational) = schema else {
            bail!("PostgreSQL needs a relational schema for '{}'", schema.target());
        };
        let statement = relational.create_statement();
        debug!("Create statement: {statement}");
        self.execute(&statement)?;
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
        let pool = &self.pool;

        self.runtime
            .block_on(async {
                let mut tx = pool.begin().await?;
                for row in batch.rows() {
                    let mut query = sqlx::query(&insert);
                    for idx in 0..width {
                        query = query.bind(row.get(idx).and_then(|cell| cell.as_ref()?.as_text()));
                    }
                    query.execute(&mut *tx).await?;
                }
                tx.commit().await
            })
            .context("Writing batch")
    }

    fn list_fields(&mut self, target: &str) -> Result<Vec<String>> {
        self.runtime
            .block_on(
                sqlx::query_scalar::<_, String>(
                    "SELECT column_name::text FROM information_schema.columns \
                     WHERE table_schema = 'public' AND table_name = $1 \
                     ORDER BY ordinal_position",
                )
                .bind(target)
                .fetch_all(&self.pool),
            )
            .with_context(|| format!("Reading columns of '{target}'"))
    }

    fn count_matching(&mut self, target: &str, field: &str, predicate: &Predicate) -> Result<u64> {
        let (condition, params) = predicate.sql_condition(SqlDialect::Postgres, field);
        let query = format!("SELECT COUNT(*) FROM {} WHERE {condition}", quote_ident(target));
        debug!("Aggregate query: {query} {params:?}");
        let mut statement = sqlx::query_scalar::<_, i64>(&query);
        for param in &params {
            statement = statement.bind(param.as_str());
        }
        let count = self
            .runtime
            .block_on(statement.fetch_one(&self.pool))
            .with_context(|| format!("Counting rows of '{target}'"))?;
        Ok(count as u64)
    }

    fn row_count(&mut self, target: &str) -> Result<u64> {
        let query = count_statement(target);
        let count = self
            .runtime
            .block_on(sqlx::query_scalar::<_, i64>(&query).fetch_one(&self.pool))
            .with_context(|| format!("Counting rows of '{target}'"))?;
        Ok(count as u64)
    }
}

impl Drop for PostgresDestination {
    fn drop(&mut self) {
        self.runtime.block_on(self.pool.close());
        info!("PostgreSQL connection to {} closed", self.label);
    }
}
