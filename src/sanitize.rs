//! Raw header name → storage-safe identifier.
//!
//! [`sanitize`] is a pure function: trim, lower-case, collapse every run of
//! whitespace, punctuation and symbols into a single `_`, and append
//! [`RESERVED_SUFFIX`] when the result is a reserved keyword of the target
//! dialect. [`sanitize_header`] applies it to a whole header and makes the
//! resulting names unique.

use std::{collections::HashSet, sync::LazyLock};

use log::debug;
use regex::Regex;

use crate::schema::ColumnSpec;

pub const RESERVED_SUFFIX: &str = "_col";

static NON_IDENTIFIER_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\p{Alphabetic}\p{M}\p{Nd}_]+").expect("static identifier pattern"));

/// Keywords a destination's query language will not accept as bare identifiers.
#[derive(Debug, Clone, Copy)]
pub struct ReservedWords(&'static [&'static str]);

impl ReservedWords {
    /// Schema-less destinations accept any field name.
    pub const NONE: ReservedWords = ReservedWords(&[]);

    pub const SQLITE: ReservedWords = ReservedWords(SQLITE_KEYWORDS);

    pub fn contains(&self, candidate: &str) -> bool {
        self.0.contains(&candidate)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

const SQLITE_KEYWORDS: &[&str] = &[
    "abort",
    "action",
    "add",
    "after",
    "all",
    "alter",
    "analyze",
    "and",
    "as",
    "asc",
    "attach",
    "autoincrement",
    "before",
    "begin",
    "between",
    "by",
    "cascade",
    "case",
    "cast",
    "check",
    "collate",
    "column",
    "commit",
    "conflict",
    "constraint",
    "create",
    "cross",
    "current_date",
    "current_time",
    "current_timestamp",
    "database",
    "default",
    "deferrable",
    "deferred",
    "delete",
    "desc",
    "detach",
    "distinct",
    "drop",
    "each",
    "else",
    "end",
    "escape",
    "except",
    "exclusive",
    "exists",
    "explain",
    "fail",
    "for",
    "foreign",
    "from",
    "full",
    "glob",
    "group",
    "having",
    "if",
    "ignore",
    "immediate",
    "in",
    "index",
    "indexed",
    "initially",
    "inner",
    "insert",
    "instead",
    "intersect",
    "into",
    "is",
    "isnull",
    "join",
    "key",
    "left",
    "like",
    "limit",
    "match",
    "natural",
    "no",
    "not",
    "notnull",
    "null",
    "of",
    "offset",
    "on",
    "or",
    "order",
    "outer",
    "plan",
    "pragma",
    "primary",
    "query",
    "raise",
    "recursive",
    "references",
    "regexp",
    "reindex",
    "release",
    "rename",
    "replace",
    "restrict",
    "right",
    "rollback",
    "row",
    "savepoint",
    "select",
    "set",
    "table",
    "temp",
    "temporary",
    "then",
    "to",
    "transaction",
    "trigger",
    "union",
    "unique",
    "update",
    "using",
    "vacuum",
    "values",
    "view",
    "virtual",
    "when",
    "where",
    "with",
    "without",
];

pub fn sanitize(raw: &str, reserved: ReservedWords) -> String {
    sanitize_with_flag(raw, reserved).0
}

fn sanitize_with_flag(raw: &str, reserved: ReservedWords) -> (String, bool) {
    let lowered = raw.trim().to_lowercase();
    let collapsed = NON_IDENTIFIER_RUN.replace_all(&lowered, "_").into_owned();
    if reserved.contains(&collapsed) {
        (format!("{collapsed}{RESERVED_SUFFIX}"), true)
    } else {
        (collapsed, false)
    }
}

/// Sanitizes every header name and resolves duplicates.
///
/// `taken` lists names the schema already owns (the relational surrogate key).
/// Empty names become `column_<position>`; a name already in use gets the first
/// free numeric suffix starting at `_2`.
pub fn sanitize_header(raw_names: &[String], reserved: ReservedWords, taken: &[&str]) -> Vec<ColumnSpec> {
    let mut used: HashSet<String> = taken.iter().map(|name| name.to_string()).collect();
    let mut specs = Vec::with_capacity(raw_names.len());

    for (idx, raw) in raw_names.iter().enumerate() {
        let (mut base, is_reserved_collision) = sanitize_with_flag(raw, reserved);
        if base.is_empty() {
            base = format!("column_{}", idx + 1);
        }
        let mut storage_name = base.clone();
        let mut suffix = 2usize;
        while used.contains(&storage_name) {
            storage_name = format!("{base}_{suffix}");
            suffix += 1;
        }
        if storage_name != base {
            debug!("Column {:?} renamed to '{}' to stay unique", raw, storage_name);
        }
        used.insert(storage_name.clone());
        specs.push(ColumnSpec {
            raw_name: raw.clone(),
            storage_name,
            is_reserved_collision,
        });
    }

    specs
}
