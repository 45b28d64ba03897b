//! Column encoding shared by the repositories.

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::Row;
use std::str::FromStr;

/// Timestamps are stored as RFC 3339 text with microsecond precision so they
/// sort lexically.
pub(crate) fn format_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn now_ts() -> String {
    format_ts(&Utc::now())
}

/// Read a text column and parse it with `FromStr`.
pub(crate) fn parse_column<T>(row: &Row<'_>, name: &str) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let idx = row.as_ref().column_index(name)?;
    let raw: String = row.get(idx)?;
    raw.parse()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Read a JSON text column.
pub(crate) fn json_column(row: &Row<'_>, name: &str) -> rusqlite::Result<serde_json::Value> {
    let idx = row.as_ref().column_index(name)?;
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_round_trip() {
        let now = Utc::now();
        let parsed: DateTime<Utc> = format_ts(&now).parse().unwrap();
        assert_eq!(parsed.timestamp_micros(), now.timestamp_micros());
    }
}
