use anyhow::{Context, Result};
use log::info;

use crate::{
    cli::{Backend, InspectArgs},
    destination, header, io_utils,
    sanitize::sanitize_header,
    schema::{ColumnSpec, SchemaStyle},
    table::Table,
};

/// Storage names `backend` would give the header, without connecting to it.
pub fn planned_columns(raw_header: &[String], backend: Backend) -> Vec<ColumnSpec> {
    match destination::schema_style_for(backend) {
        // The engine keeps the header as-is when it reads the file itself.
        SchemaStyle::Materialized => raw_header
            .iter()
            .map(|raw| ColumnSpec {
                raw_name: raw.clone(),
                storage_name: raw.clone(),
                is_reserved_collision: false,
            })
            .collect(),
        style => sanitize_header(raw_header, style.reserved_words(), style.taken_names()),
    }
}

pub fn execute(args: &InspectArgs) -> Result<()> {
    let backend = args.backend.unwrap_or(Backend::Sqlite);
    let delimiter = io_utils::resolve_input_delimiter(&args.input, args.delimiter);
    let encoding = io_utils::resolve_encoding(args.input_encoding.as_deref())?;
    info!(
        "Inspecting '{}' with delimiter '{}' for {backend}",
        args.input.display(),
        io_utils::printable_delimiter(delimiter)
    );
    let raw_header = header::read_header(&args.input, delimiter, encoding)
        .with_context(|| format!("Inspecting {:?}", args.input))?;

    let mut table = Table::new(["#", "raw name", "storage name", "reserved"]);
    for (idx, column) in planned_columns(&raw_header, backend).iter().enumerate() {
        table.push_row(vec![
            (idx + 1).to_string(),
            column.raw_name.clone(),
            column.storage_name.clone(),
            if column.is_reserved_collision { "yes" } else { "" }.to_string(),
        ]);
    }
    print!("{}", table.render());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn sqlite_plan_reserves_surrogate_key_and_keywords() {
        let planned = planned_columns(&header(&["Id", "Order", "E-mail"]), Backend::Sqlite);
        let names = planned.iter().map(|c| c.storage_name.as_str()).collect::<Vec<_>>();
        assert_eq!(names, vec!["id_2", "order_col", "e_mail"]);
        assert!(planned[1].is_reserved_collision);
    }

    #[test]
    fn duckdb_plan_keeps_raw_names() {
        let planned = planned_columns(&header(&["First Name"]), Backend::Duckdb);
        assert_eq!(planned[0].storage_name, "First Name");
    }
}
