//! One ingestion run, start to finish.
//!
//! The pipeline is backend-agnostic: it only talks to a [`Destination`]. The
//! header is read with its own reader and the load phase opens a fresh one,
//! so the source is traversed exactly twice (header, then rows).

use std::path::PathBuf;

use anyhow::anyhow;
use encoding_rs::{Encoding, UTF_8};
use log::{info, warn};
use serde::Serialize;

use crate::{
    aggregate::{self, AggregateResult, Question},
    config::Config,
    destination::Destination,
    error::PipelineError,
    header, io_utils,
    loader::{BatchLoader, DEFAULT_BATCH_SIZE, LoadResult},
    matcher::{self, FieldMatch},
    schema::{self, ColumnSpec, SchemaStyle},
};

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub source: PathBuf,
    pub target: String,
    pub batch_size: usize,
    pub delimiter: u8,
    pub encoding: &'static Encoding,
    pub question: Question,
}

impl PipelineOptions {
    /// Comma-delimited UTF-8 source with the default batch size.
    pub fn new(source: impl Into<PathBuf>, target: impl Into<String>, question: Question) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            batch_size: DEFAULT_BATCH_SIZE,
            delimiter: b',',
            encoding: UTF_8,
            question,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self {
            source: config.source.clone(),
            target: config.target.clone(),
            batch_size: config.batch_size,
            delimiter: config.delimiter,
            encoding: config.encoding,
            question: Question::for_backend(config.backend),
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub backend: &'static str,
    pub target: String,
    pub columns: Vec<ColumnSpec>,
    pub load: LoadResult,
    pub question: &'static str,
    pub field: FieldMatch,
    pub aggregate: AggregateResult,
}

impl RunReport {
    pub fn rows_loaded(&self) -> u64 {
        self.load.total_rows_loaded
    }

    pub fn count(&self) -> u64 {
        self.aggregate.count
    }
}

pub fn run_pipeline(
    destination: &mut dyn Destination,
    options: &PipelineOptions,
) -> Result<RunReport, PipelineError> {
    let source = options.source.as_path();
    let target = options.target.as_str();
    let unreadable = |cause: anyhow::Error| PipelineError::SourceUnreadable {
        path: source.to_path_buf(),
        source: cause.into(),
    };
    if !source.is_file() {
        return Err(unreadable(anyhow!("No such file")));
    }

    info!("Reading header of {:?}", source);
    let raw_header = header::read_header(source, options.delimiter, options.encoding)?;
    info!("Found {} column(s)", raw_header.len());

    let style = destination.schema_style();
    let declaration = schema::build(target, &raw_header, style);
    for column in declaration.columns() {
        if column.is_reserved_collision {
            info!(
                "Column '{}' collides with a reserved keyword; stored as '{}'",
                column.raw_name, column.storage_name
            );
        }
    }

    let schema_failed = |cause: anyhow::Error| PipelineError::SchemaCreationFailed {
        target: target.to_string(),
        source: cause.into(),
    };
    destination.drop_existing(target).map_err(schema_failed)?;
    destination.create_schema(&declaration).map_err(schema_failed)?;

    info!("Loading {:?} into '{target}' ({})", source, destination.backend_name());
    let load = match style {
        SchemaStyle::Materialized => {
            let total_rows_loaded = destination
                .materialize(target, source, options.delimiter)
                .map_err(|err| PipelineError::load_failed(0, err))?;
            LoadResult { total_rows_loaded }
        }
        SchemaStyle::Relational(_) | SchemaStyle::Document => {
            let mut reader =
                io_utils::open_source_reader(source, options.delimiter).map_err(unreadable)?;
            BatchLoader::new(options.batch_size, options.encoding).load(
                &mut reader,
                declaration.columns(),
                style,
                destination,
            )?
        }
    };
    info!("Total rows loaded: {}", load.total_rows_loaded);

    match destination.row_count(target) {
        Ok(stored) if stored != load.total_rows_loaded => warn!(
            "'{target}' holds {stored} row(s) but {} were loaded",
            load.total_rows_loaded
        ),
        Ok(_) => {}
        Err(err) => warn!("Could not verify the row count of '{target}': {err:#}"),
    }

    let fields = destination
        .list_fields(target)
        .map_err(|cause| PipelineError::FieldDiscoveryFailed {
            target: target.to_string(),
            source: cause.into(),
        })?;
    let field = matcher::match_field(&fields, &options.question.keywords);
    info!("Field for '{}': {field}", options.question.column_hint);

    let aggregate = aggregate::aggregate(destination, target, &field, &options.question)?;

    Ok(RunReport {
        backend: destination.backend_name(),
        target: target.to_string(),
        columns: declaration.columns().to_vec(),
        load,
        question: options.question.description,
        field,
        aggregate,
    })
}
