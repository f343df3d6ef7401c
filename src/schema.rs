//! Schema model shared by every destination.
//!
//! The header becomes a list of [`ColumnSpec`]s; [`build`] turns that list into
//! a [`SchemaDeclaration`] shaped for the destination's [`SchemaStyle`]. For
//! relational targets the declaration also renders every statement the run
//! needs. Identifiers are always quoted after sanitization and values are
//! always bound through placeholders, never spliced into statement text.

use itertools::Itertools;
use serde::Serialize;

use crate::sanitize::{self, ReservedWords};

/// Surrogate primary key prepended to every relational table.
pub const SURROGATE_KEY: &str = "id";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnSpec {
    pub raw_name: String,
    pub storage_name: String,
    pub is_reserved_collision: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlDialect {
    Sqlite,
    Postgres,
    DuckDb,
}

impl SqlDialect {
    pub fn reserved_words(self) -> ReservedWords {
        match self {
            SqlDialect::Sqlite => ReservedWords::SQLITE,
            SqlDialect::Postgres | SqlDialect::DuckDb => ReservedWords::NONE,
        }
    }

    /// Placeholder for the 1-based bind position `index`.
    pub fn placeholder(self, index: usize) -> String {
        match self {
            SqlDialect::Postgres => format!("${index}"),
            SqlDialect::Sqlite | SqlDialect::DuckDb => "?".to_string(),
        }
    }

    fn surrogate_key_definition(self) -> String {
        let key = quote_ident(SURROGATE_KEY);
        match self {
            SqlDialect::Sqlite => format!("{key} INTEGER PRIMARY KEY AUTOINCREMENT"),
            SqlDialect::Postgres => format!("{key} SERIAL PRIMARY KEY"),
            SqlDialect::DuckDb => format!("{key} BIGINT PRIMARY KEY"),
        }
    }

    fn text_type(self) -> &'static str {
        match self {
            SqlDialect::Postgres => "VARCHAR(255)",
            SqlDialect::Sqlite | SqlDialect::DuckDb => "TEXT",
        }
    }
}

/// How a destination expects its target object to be declared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaStyle {
    /// Explicit table with text columns, filled row by row.
    Relational(SqlDialect),
    /// The engine reads the source file itself and infers column types.
    Materialized,
    /// Free-form documents keyed by storage names.
    Document,
}

impl SchemaStyle {
    pub fn reserved_words(self) -> ReservedWords {
        match self {
            SchemaStyle::Relational(dialect) => dialect.reserved_words(),
            SchemaStyle::Materialized | SchemaStyle::Document => ReservedWords::NONE,
        }
    }

    /// Names the schema owns before any header column is placed.
    pub fn taken_names(self) -> &'static [&'static str] {
        match self {
            SchemaStyle::Relational(_) => &[SURROGATE_KEY],
            SchemaStyle::Materialized | SchemaStyle::Document => &[],
        }
    }

    /// Date-like document fields are coerced to calendar dates; relational columns stay text.
    pub fn coerces_dates(self) -> bool {
        matches!(self, SchemaStyle::Document)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaDeclaration {
    Relational(RelationalSchema),
    Materialized { target: String },
    Implicit { target: String, columns: Vec<ColumnSpec> },
}

impl SchemaDeclaration {
    pub fn target(&self) -> &str {
        match self {
            SchemaDeclaration::Relational(schema) => &schema.target,
            SchemaDeclaration::Materialized { target } => target,
            SchemaDeclaration::Implicit { target, .. } => target,
        }
    }

    pub fn columns(&self) -> &[ColumnSpec] {
        match self {
            SchemaDeclaration::Relational(schema) => &schema.columns,
            SchemaDeclaration::Materialized { .. } => &[],
            SchemaDeclaration::Implicit { columns, .. } => columns,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationalSchema {
    pub dialect: SqlDialect,
    pub target: String,
    pub columns: Vec<ColumnSpec>,
}

impl RelationalSchema {
    pub fn drop_statement(&self) -> String {
        drop_table_statement(&self.target)
    }

    pub fn create_statement(&self) -> String {
        let definitions = std::iter::once(self.dialect.surrogate_key_definition())
            .chain(self.columns.iter().map(|column| {
                format!(
                    "{} {}",
                    quote_ident(&column.storage_name),
                    self.dialect.text_type()
                )
            }))
            .join(", ");
        format!("CREATE TABLE {} ({definitions})", quote_ident(&self.target))
    }

    /// The single parameterized insert reused for every row of the load.
    pub fn insert_statement(&self) -> String {
        let names = self
            .columns
            .iter()
            .map(|column| quote_ident(&column.storage_name))
            .join(", ");
        let placeholders = (1..=self.columns.len())
            .map(|idx| self.dialect.placeholder(idx))
            .join(", ");
        format!(
            "INSERT INTO {} ({names}) VALUES ({placeholders})",
            quote_ident(&self.target)
        )
    }
}

pub fn drop_table_statement(target: &str) -> String {
    format!("DROP TABLE IF EXISTS {}", quote_ident(target))
}

pub fn count_statement(target: &str) -> String {
    format!("SELECT COUNT(*) FROM {}", quote_ident(target))
}

/// Double-quotes an identifier, doubling any embedded quote.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Builds the declaration for `style` and sanitizes the header into column specs on the way.
pub fn build(target: &str, raw_header: &[String], style: SchemaStyle) -> SchemaDeclaration {
    let columns =
        sanitize::sanitize_header(raw_header, style.reserved_words(), style.taken_names());
    build_from_specs(target, columns, style)
}

pub fn build_from_specs(target: &str, columns: Vec<ColumnSpec>, style: SchemaStyle) -> SchemaDeclaration {
    match style {
        SchemaStyle::Relational(dialect) => SchemaDeclaration::Relational(RelationalSchema {
            dialect,
            target: target.to_string(),
            columns,
        }),
        SchemaStyle::Materialized => SchemaDeclaration::Materialized {
            target: target.to_string(),
        },
        SchemaStyle::Document => SchemaDeclaration::Implicit {
            target: target.to_string(),
            columns,
        },
    }
}
