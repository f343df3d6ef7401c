//! Run configuration.
//!
//! Every setting is resolved once, in order of precedence: command-line flag,
//! environment (after the dotenv file has been applied), built-in default.

use std::{
    env,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, ensure};
use encoding_rs::Encoding;
use log::debug;

use crate::{
    cli::{Backend, LoadArgs},
    destination::{DestinationConfig, PostgresParams},
    io_utils,
    loader::DEFAULT_BATCH_SIZE,
};

pub const DEFAULT_TARGET: &str = "utenti";

#[derive(Debug, Clone)]
pub struct Config {
    pub backend: Backend,
    pub source: PathBuf,
    pub target: String,
    pub batch_size: usize,
    pub delimiter: u8,
    pub encoding: &'static Encoding,
    pub destination: DestinationConfig,
    pub report: Option<PathBuf>,
}

impl Config {
    /// Applies the dotenv file, then resolves against the process environment.
    pub fn from_args(args: &LoadArgs) -> Result<Self> {
        load_env_file(args.env_file.as_deref())?;
        Self::resolve(args, |key| env::var(key).ok())
    }

    pub fn resolve<F>(args: &LoadArgs, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str, default: &str| {
            lookup(key)
                .filter(|value| !value.trim().is_empty())
                .unwrap_or_else(|| default.to_string())
        };
        let database = args.database.clone();
        let mut target = DEFAULT_TARGET.to_string();

        let (source_var, source_default, destination) = match args.backend {
            Backend::Duckdb => (
                "CSV_FILE_2000",
                "esercizi/input_2000.csv",
                DestinationConfig::Duckdb {
                    path: PathBuf::from(database.unwrap_or_else(|| var("DUCKDB_DB_FILE", "utenti.duckdb"))),
                },
            ),
            Backend::Mongodb => {
                target = var("MONGO_COLLECTION", DEFAULT_TARGET);
                (
                    "CSV_FILE_8000",
                    "esercizi/input_8000.csv",
                    DestinationConfig::Mongodb {
                        uri: var("MONGO_URI", "mongodb://localhost:27017/"),
                        database: database.unwrap_or_else(|| var("MONGO_DB_NAME", "esame_db")),
                    },
                )
            }
            Backend::Postgres => {
                let port = var("PG_PORT", "5432");
                let port = port
                    .trim()
                    .parse::<u16>()
                    .with_context(|| format!("PG_PORT '{port}' is not a valid port"))?;
                (
                    "CSV_FILE_5000",
                    "esercizi/input_5000.csv",
                    DestinationConfig::Postgres(PostgresParams {
                        host: var("PG_HOST", "localhost"),
                        port,
                        user: var("PG_USER", "postgres"),
                        password: var("PG_PASSWORD", "postgres"),
                        dbname: database.unwrap_or_else(|| var("PG_DBNAME", "postgres")),
                    }),
                )
            }
            Backend::Sqlite => (
                "CSV_FILE_10000",
                "esercizi/input_10000.csv",
                DestinationConfig::Sqlite {
                    path: PathBuf::from(database.unwrap_or_else(|| var("SQLITE_DB_FILE", "utenti.db"))),
                },
            ),
        };

        let source = args
            .input
            .clone()
            .unwrap_or_else(|| PathBuf::from(var(source_var, source_default)));
        if let Some(explicit) = &args.target {
            target = explicit.clone();
        }
        ensure!(!target.trim().is_empty(), "Target name cannot be empty");
        let batch_size = args.batch_size.unwrap_or(DEFAULT_BATCH_SIZE);
        ensure!(batch_size > 0, "Batch size must be at least 1");

        let config = Config {
            backend: args.backend,
            delimiter: io_utils::resolve_input_delimiter(&source, args.delimiter),
            encoding: io_utils::resolve_encoding(args.input_encoding.as_deref())?,
            source,
            target,
            batch_size,
            destination,
            report: args.report.clone(),
        };
        debug!(
            "Resolved {} configuration: source {:?}, target '{}', destination {}, batch size {}",
            config.backend,
            config.source,
            config.target,
            config.destination.describe(),
            config.batch_size
        );
        Ok(config)
    }
}

/// Loads `path` when given (it must exist), otherwise `./.env` when present.
pub fn load_env_file(path: Option<&Path>) -> Result<()> {
    match path {
        Some(path) => {
            dotenv::from_path(path).with_context(|| format!("Loading environment file {path:?}"))?;
            debug!("Environment loaded from {:?}", path);
        }
        None => {
            if let Ok(path) = dotenv::dotenv() {
                debug!("Environment loaded from {:?}", path);
            }
        }
    }
    Ok(())
}
