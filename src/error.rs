//! Error taxonomy for a single ingestion run.
//!
//! Setup failures (`SourceUnreadable`, `EmptySource`, `DestinationUnreachable`,
//! `SchemaCreationFailed`) abort before any row is written. `LoadFailed` keeps
//! the number of rows already committed so the caller can report how far the
//! load got. A missing aggregate column is not an error at all; it surfaces as
//! [`crate::matcher::FieldMatch::NotFound`].

use std::path::PathBuf;

use thiserror::Error;

/// Boxed cause carried by every variant that wraps a lower-level failure.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// The source file could not be opened, parsed, or decoded
    #[error("Source {path:?} could not be read")]
    SourceUnreadable {
        path: PathBuf,
        #[source]
        source: BoxError,
    },

    /// The source has no record at all, not even a header
    #[error("Source {path:?} is empty (no header record)")]
    EmptySource { path: PathBuf },

    /// Connecting to the destination failed
    #[error("Destination '{backend}' is unreachable")]
    DestinationUnreachable {
        backend: String,
        #[source]
        source: BoxError,
    },

    /// Dropping or creating the target table/collection failed
    #[error("Creating schema for '{target}' failed")]
    SchemaCreationFailed {
        target: String,
        #[source]
        source: BoxError,
    },

    /// A batch or stream error aborted the load
    #[error("Load failed after {rows_loaded_so_far} committed row(s)")]
    LoadFailed {
        rows_loaded_so_far: u64,
        #[source]
        source: BoxError,
    },

    /// Listing the realized fields of the target failed
    #[error("Listing fields of '{target}' failed")]
    FieldDiscoveryFailed {
        target: String,
        #[source]
        source: BoxError,
    },

    /// The count query itself failed
    #[error("Aggregate query on field '{field}' failed")]
    AggregateFailed {
        field: String,
        #[source]
        source: BoxError,
    },
}

impl PipelineError {
    pub fn load_failed(rows_loaded_so_far: u64, cause: impl Into<BoxError>) -> Self {
        PipelineError::LoadFailed {
            rows_loaded_so_far,
            source: cause.into(),
        }
    }

    /// Rows known to be committed when the error happened, if the error came from the load phase.
    pub fn rows_loaded_so_far(&self) -> Option<u64> {
        match self {
            PipelineError::LoadFailed {
                rows_loaded_so_far, ..
            } => Some(*rows_loaded_so_far),
            _ => None,
        }
    }
}
