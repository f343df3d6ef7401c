//! The per-backend aggregate question and the SQL it compiles to.
//!
//! Each backend variant asks one fixed question: a column located by
//! [`crate::matcher`] and a [`Predicate`] counted over it. Relational
//! destinations use [`Predicate::sql_condition`]; document stores translate
//! the predicate themselves.

use chrono::{Days, NaiveDate};
use log::{error, info};
use serde::Serialize;

use crate::{
    cli::Backend,
    data::{DATE_FORMAT, FieldValue},
    destination::Destination,
    error::PipelineError,
    matcher::{FieldMatch, KeywordSet},
    schema::{SqlDialect, quote_ident},
};

/// The single filter each backend variant counts with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    /// Value ends with `suffix`; with `or_path` also when `suffix` is followed by `/`.
    Suffix { suffix: String, or_path: bool },
    /// Value starts with `prefix`.
    Prefix(String),
    /// Calendar date within `start..=end`, whole days.
    DateRange { start: NaiveDate, end: NaiveDate },
}

impl Predicate {
    /// Exclusive upper bound covering the whole final day.
    pub fn date_upper_bound(end: NaiveDate) -> NaiveDate {
        end.checked_add_days(Days::new(1)).unwrap_or(NaiveDate::MAX)
    }

    /// Evaluates the predicate against a stored document value.
    pub fn matches_value(&self, value: &FieldValue) -> bool {
        match (self, value) {
            (Predicate::Suffix { suffix, or_path }, FieldValue::Text(text)) => {
                text.ends_with(suffix.as_str())
                    || (*or_path && text.contains(&format!("{suffix}/")))
            }
            (Predicate::Prefix(prefix), FieldValue::Text(text)) => text.starts_with(prefix.as_str()),
            (Predicate::DateRange { start, end }, FieldValue::Date(date)) => {
                date >= start && *date < Self::date_upper_bound(*end)
            }
            _ => false,
        }
    }

    /// Renders a `WHERE` condition over `column` with its bound text parameters.
    pub fn sql_condition(&self, dialect: SqlDialect, column: &str) -> (String, Vec<String>) {
        let expr = match dialect {
            SqlDialect::DuckDb => format!("CAST({} AS VARCHAR)", quote_ident(column)),
            SqlDialect::Sqlite | SqlDialect::Postgres => quote_ident(column),
        };
        let mut params = Vec::new();
        let mut bind = |value: String| {
            params.push(value);
            dialect.placeholder(params.len())
        };
        let condition = match self {
            Predicate::Suffix { suffix, or_path } => {
                let escaped = escape_like(suffix);
                let mut branches = vec![format!(
                    "{expr} LIKE {} ESCAPE '\\'",
                    bind(format!("%{escaped}"))
                )];
                if *or_path {
                    branches.push(format!(
                        "{expr} LIKE {} ESCAPE '\\'",
                        bind(format!("%{escaped}/%"))
                    ));
                }
                branches.join(" OR ")
            }
            Predicate::Prefix(prefix) => format!(
                "{expr} LIKE {} ESCAPE '\\'",
                bind(format!("{}%", escape_like(prefix)))
            ),
            Predicate::DateRange { start, end } => {
                let lower = bind(start.format(DATE_FORMAT).to_string());
                let upper = bind(Self::date_upper_bound(*end).format(DATE_FORMAT).to_string());
                format!("{expr} >= {lower} AND {expr} < {upper}")
            }
        };
        (format!("({condition})"), params)
    }
}

/// Escapes `LIKE` wildcards so the literal is matched verbatim (escape char `\`).
pub fn escape_like(literal: &str) -> String {
    let mut escaped = String::with_capacity(literal.len());
    for ch in literal.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

/// A backend's fixed question: where to look and what to count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
    pub description: &'static str,
    pub column_hint: &'static str,
    pub keywords: KeywordSet,
    pub predicate: Predicate,
}

impl Question {
    pub fn for_backend(backend: Backend) -> Self {
        match backend {
            Backend::Duckdb => Question {
                description: "Websites with top-level domain 'info'",
                column_hint: "website",
                keywords: KeywordSet::new("website", &["site", "sito"]),
                predicate: Predicate::Suffix {
                    suffix: ".info".into(),
                    or_path: true,
                },
            },
            Backend::Postgres => Question {
                description: "Emails ending with '.com'",
                column_hint: "email",
                keywords: KeywordSet::new("email", &["email", "mail"]),
                predicate: Predicate::Suffix {
                    suffix: ".com".into(),
                    or_path: false,
                },
            },
            Backend::Sqlite => Question {
                description: "Websites starting with 'https://'",
                column_hint: "website",
                keywords: KeywordSet::new("website", &["website", "site", "sito"]),
                predicate: Predicate::Prefix("https://".into()),
            },
            Backend::Mongodb => Question {
                description: "Subscriptions in 2020",
                column_hint: "subscription date",
                keywords: KeywordSet::new("subscription_date", &["subscription", "iscrizione"])
                    .qualified_by(&["date", "data"]),
                predicate: Predicate::DateRange {
                    start: NaiveDate::from_ymd_opt(2020, 1, 1).expect("static date"),
                    end: NaiveDate::from_ymd_opt(2020, 12, 31).expect("static date"),
                },
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AggregateResult {
    pub count: u64,
}

/// Runs the question's count; `NotFound` short-circuits to zero without touching the destination.
pub fn aggregate(
    destination: &mut dyn Destination,
    target: &str,
    field: &FieldMatch,
    question: &Question,
) -> Result<AggregateResult, PipelineError> {
    let Some(name) = field.field_name() else {
        error!("Column '{}' not found in '{target}'", question.column_hint);
        return Ok(AggregateResult { count: 0 });
    };
    info!("Counting '{}' on field '{name}'", question.description);
    let count = destination
        .count_matching(target, name, &question.predicate)
        .map_err(|err| PipelineError::AggregateFailed {
            field: name.to_string(),
            source: err.into(),
        })?;
    info!("{}: {count}", question.description);
    Ok(AggregateResult { count })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn suffix_with_path_renders_two_like_branches() {
        let predicate = Predicate::Suffix {
            suffix: ".info".into(),
            or_path: true,
        };
        let (sql, params) = predicate.sql_condition(SqlDialect::Postgres, "website");
        assert_eq!(
            sql,
            "(\"website\" LIKE $1 ESCAPE '\\' OR \"website\" LIKE $2 ESCAPE '\\')"
        );
        assert_eq!(params, vec!["%.info", "%.info/%"]);
    }

    #[test]
    fn prefix_escapes_wildcards() {
        let (sql, params) =
            Predicate::Prefix("50%_off".into()).sql_condition(SqlDialect::Sqlite, "promo");
        assert_eq!(sql, "(\"promo\" LIKE ? ESCAPE '\\')");
        assert_eq!(params, vec!["50\\%\\_off%"]);
    }

    #[test]
    fn date_range_uses_exclusive_next_day_bound() {
        let predicate = Predicate::DateRange {
            start: date(2020, 1, 1),
            end: date(2020, 12, 31),
        };
        let (sql, params) = predicate.sql_condition(SqlDialect::DuckDb, "signup");
        assert_eq!(
            sql,
            "(CAST(\"signup\" AS VARCHAR) >= ? AND CAST(\"signup\" AS VARCHAR) < ?)"
        );
        assert_eq!(params, vec!["2020-01-01", "2021-01-01"]);
    }

    #[test]
    fn matches_value_follows_document_semantics() {
        let suffix = Predicate::Suffix {
            suffix: ".info".into(),
            or_path: true,
        };
        assert!(suffix.matches_value(&FieldValue::Text("http://a.info".into())));
        assert!(suffix.matches_value(&FieldValue::Text("http://a.info/x".into())));
        assert!(!suffix.matches_value(&FieldValue::Text("http://a.information".into())));
        assert!(!suffix.matches_value(&FieldValue::Null));

        let range = Predicate::DateRange {
            start: date(2020, 1, 1),
            end: date(2020, 12, 31),
        };
        assert!(range.matches_value(&FieldValue::Date(date(2020, 12, 31))));
        assert!(!range.matches_value(&FieldValue::Date(date(2021, 1, 1))));
        assert!(!range.matches_value(&FieldValue::Text("2020-06-15".into())));
    }

    #[test]
    fn backend_questions_take_first_qualifying_column() {
        use crate::matcher::{FieldMatch, match_field};

        let email = Question::for_backend(Backend::Postgres).keywords;
        assert_eq!(
            match_field(&["id", "mailing_list", "work_email"], &email),
            FieldMatch::Found("mailing_list".into())
        );
        let website = Question::for_backend(Backend::Sqlite).keywords;
        assert_eq!(
            match_field(&["id", "site_id", "website"], &website),
            FieldMatch::Found("site_id".into())
        );
    }

    #[test]
    fn every_backend_has_a_question() {
        for backend in [Backend::Duckdb, Backend::Mongodb, Backend::Postgres, Backend::Sqlite] {
            let question = Question::for_backend(backend);
            assert!(!question.keywords.substrings.is_empty());
        }
    }
}
