//! Repository functions over the SQLite connection.
//!
//! One module per table. Functions take `&Connection` and return domain records from
//! [`crate::models`]; they contain no business rules beyond the relational ones (uniqueness,
//! cascade and protect on delete).

pub mod care_plans;
pub mod orders;
pub mod patients;
pub mod providers;

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::Row;

/// Timestamps are stored as fixed-width RFC 3339 text so that string order is time order.
pub(crate) fn to_db_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn to_db_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Read a text column and convert it, reporting conversion failures as rusqlite errors.
pub(crate) fn parse_column<T, E, F>(row: &Row<'_>, idx: usize, parse: F) -> rusqlite::Result<T>
where
    F: FnOnce(&str) -> Result<T, E>,
    E: std::error::Error + Send + Sync + 'static,
{
    let raw: String = row.get(idx)?;
    parse(&raw).map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

pub(crate) fn timestamp_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    parse_column(row, idx, |raw| {
        DateTime::parse_from_rfc3339(raw).map(|ts| ts.with_timezone(&Utc))
    })
}

pub(crate) fn optional_timestamp_column(
    row: &Row<'_>,
    idx: usize,
) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|raw| {
        DateTime::parse_from_rfc3339(&raw)
            .map(|ts| ts.with_timezone(&Utc))
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
    })
    .transpose()
}

pub(crate) fn date_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<NaiveDate> {
    parse_column(row, idx, |raw| NaiveDate::parse_from_str(raw, "%Y-%m-%d"))
}

pub(crate) fn json_list_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Vec<String>> {
    parse_column(row, idx, |raw| serde_json::from_str::<Vec<String>>(raw))
}

/// Case-insensitive containment filter value for `instr(fold_case(col), ?) > 0`.
pub(crate) fn search_needle(search: Option<&str>) -> Option<String> {
    search
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
}
