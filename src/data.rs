use std::fmt;

use chrono::NaiveDate;

/// The one date layout the loader coerces.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Substrings that mark a column as date-like (case-insensitive).
pub const DATE_FIELD_HINTS: &[&str] = &["date", "data"];

/// A prepared cell on its way to a destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Text(String),
    Date(NaiveDate),
    Null,
}

impl FieldValue {
    /// Text form used when a destination only stores strings.
    pub fn as_text(&self) -> Option<String> {
        match self {
            FieldValue::Text(text) => Some(text.clone()),
            FieldValue::Date(date) => Some(date.format(DATE_FORMAT).to_string()),
            FieldValue::Null => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.as_text() {
            Some(text) => write!(f, "{text}"),
            None => write!(f, "null"),
        }
    }
}

pub fn is_date_field(name: &str) -> bool {
    let lowered = name.to_lowercase();
    DATE_FIELD_HINTS.iter().any(|hint| lowered.contains(hint))
}

pub fn parse_calendar_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value, DATE_FORMAT).ok()
}

/// Coerces a date-like field: empty becomes `Null`, unparsable text is kept verbatim.
pub fn coerce_date(value: &str) -> FieldValue {
    if value.is_empty() {
        return FieldValue::Null;
    }
    match parse_calendar_date(value) {
        Some(date) => FieldValue::Date(date),
        None => FieldValue::Text(value.to_string()),
    }
}
