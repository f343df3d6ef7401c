use std::{fmt, path::PathBuf};

use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Debug, Parser)]
#[command(author, version, about = "Load CSV files into a database and answer one question about them", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Load a CSV file into the selected backend and run its aggregate question
    Load(LoadArgs),
    /// Show how a CSV header would be sanitized, without touching any database
    Inspect(InspectArgs),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Backend {
    Duckdb,
    Mongodb,
    Postgres,
    Sqlite,
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Backend::Duckdb => "duckdb",
            Backend::Mongodb => "mongodb",
            Backend::Postgres => "postgres",
            Backend::Sqlite => "sqlite",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Args)]
pub struct LoadArgs {
    /// Destination backend
    #[arg(short, long, value_enum)]
    pub backend: Backend,
    /// Input CSV file (defaults to the backend's CSV_FILE_* variable)
    #[arg(short = 'i', long = "input")]
    pub input: Option<PathBuf>,
    /// Table or collection name (defaults to `utenti`)
    #[arg(short, long)]
    pub target: Option<String>,
    /// Database file (duckdb, sqlite) or database name (mongodb, postgres)
    #[arg(long)]
    pub database: Option<String>,
    /// Rows per committed batch
    #[arg(long = "batch-size")]
    pub batch_size: Option<usize>,
    /// CSV delimiter character (supports ',', 'tab', ';', '|')
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
    /// Character encoding of the input file (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
    /// Dotenv file to read connection settings from (defaults to ./.env when present)
    #[arg(long = "env-file")]
    pub env_file: Option<PathBuf>,
    /// Also write the run report as JSON to this path
    #[arg(long)]
    pub report: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct InspectArgs {
    /// Input CSV file whose header should be inspected
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// Sanitize for this backend's naming rules (defaults to sqlite)
    #[arg(short, long, value_enum)]
    pub backend: Option<Backend>,
    /// CSV delimiter character (supports ',', 'tab', ';', '|')
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
    /// Character encoding of the input file (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
}

pub fn parse_delimiter(value: &str) -> Result<u8, String> {
    match value {
        "tab" | "\t" => Ok(b'\t'),
        "comma" | "," => Ok(b','),
        "|" | "pipe" => Ok(b'|'),
        ";" | "semicolon" => Ok(b';'),
        other => {
            let mut chars = other.chars();
            let first = chars
                .next()
                .ok_or_else(|| "Delimiter cannot be empty".to_string())?;
            if chars.next().is_some() {
                return Err("Delimiter must be a single character".to_string());
            }
            if !first.is_ascii() {
                return Err("Delimiter must be ASCII".to_string());
            }
            Ok(first as u8)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_named_delimiters() {
        assert_eq!(parse_delimiter("tab"), Ok(b'\t'));
        assert_eq!(parse_delimiter("semicolon"), Ok(b';'));
        assert!(parse_delimiter("::").is_err());
        assert!(parse_delimiter("").is_err());
    }

    #[test]
    fn load_requires_backend() {
        assert!(Cli::try_parse_from(["csv-ingest", "load"]).is_err());
        let cli = Cli::try_parse_from(["csv-ingest", "load", "--backend", "postgres", "--batch-size", "50"])
            .unwrap();
        let Commands::Load(args) = cli.command else {
            panic!("expected load");
        };
        assert_eq!(args.backend, Backend::Postgres);
        assert_eq!(args.batch_size, Some(50));
        assert_eq!(args.backend.to_string(), "postgres");
    }
}
