use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use westgard_core::ContextKey;

use crate::error::StoreError;

/// Get a required column value from a row, returning `CorruptRow` on failure.
pub fn get<T: rusqlite::types::FromSql>(
    row: &rusqlite::Row<'_>,
    idx: usize,
    table: &'static str,
    column: &'static str,
) -> Result<T, StoreError> {
    row.get(idx).map_err(|e| StoreError::CorruptRow {
        table,
        column,
        detail: e.to_string(),
    })
}

/// Get an optional column value.
pub fn get_opt<T: rusqlite::types::FromSql>(
    row: &rusqlite::Row<'_>,
    idx: usize,
    table: &'static str,
    column: &'static str,
) -> Result<Option<T>, StoreError> {
    row.get(idx).map_err(|e| StoreError::CorruptRow {
        table,
        column,
        detail: e.to_string(),
    })
}

/// Read four consecutive ID columns starting at `idx` as a context.
pub fn get_context(
    row: &rusqlite::Row<'_>,
    idx: usize,
    table: &'static str,
) -> Result<ContextKey, StoreError> {
    Ok(ContextKey::new(
        get::<String>(row, idx, table, "analyte_id")?,
        get::<String>(row, idx + 1, table, "lot_id")?,
        get::<String>(row, idx + 2, table, "qc_level_id")?,
        get::<String>(row, idx + 3, table, "machine_id")?,
    ))
}

/// Parse a JSON string column, returning `CorruptRow` on parse failure.
pub fn parse_json<T: DeserializeOwned>(
    raw: &str,
    table: &'static str,
    column: &'static str,
) -> Result<T, StoreError> {
    serde_json::from_str(raw).map_err(|e| StoreError::CorruptRow {
        table,
        column,
        detail: format!("invalid JSON: {e}"),
    })
}

/// Parse a string into an enum, returning `CorruptRow` on failure.
pub fn parse_enum<T: std::str::FromStr>(
    raw: &str,
    table: &'static str,
    column: &'static str,
) -> Result<T, StoreError> {
    raw.parse().map_err(|_| StoreError::CorruptRow {
        table,
        column,
        detail: format!("unknown variant: {raw}"),
    })
}

/// Fixed-width RFC 3339 in UTC, so text order equals time order.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

/// Parse a timestamp column written by [`format_timestamp`].
pub fn parse_timestamp(
    raw: &str,
    table: &'static str,
    column: &'static str,
) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| StoreError::CorruptRow {
            table,
            column,
            detail: format!("invalid timestamp {raw}: {e}"),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use westgard_core::Severity;

    #[test]
    fn timestamps_sort_as_text() {
        let base = Utc.with_ymd_and_hms(2024, 3, 9, 23, 59, 59).unwrap();
        let later = base + Duration::milliseconds(1);
        let (a, b) = (format_timestamp(&base), format_timestamp(&later));
        assert!(a < b);
        assert_eq!(a.len(), b.len());
        assert_eq!(a, "2024-03-09T23:59:59.000000000Z");
    }

    #[test]
    fn timestamp_round_trip_keeps_precision() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 9, 8, 0, 0).unwrap() + Duration::nanoseconds(7);
        let parsed = parse_timestamp(&format_timestamp(&ts), "qc_points", "entry_date").unwrap();
        assert_eq!(parsed, ts);
    }

    #[test]
    fn bad_timestamp_is_corrupt_row() {
        let result = parse_timestamp("yesterday", "qc_points", "entry_date");
        assert!(matches!(
            result,
            Err(StoreError::CorruptRow { table: "qc_points", column: "entry_date", .. })
        ));
    }

    #[test]
    fn parse_enum_success() {
        let result: Result<Severity, _> = parse_enum("critical", "violations", "severity");
        assert_eq!(result.unwrap(), Severity::Critical);
    }

    #[test]
    fn parse_enum_failure() {
        let result: Result<Severity, _> = parse_enum("fatal", "violations", "severity");
        assert!(matches!(
            result,
            Err(StoreError::CorruptRow { table: "violations", column: "severity", .. })
        ));
    }

    #[test]
    fn parse_json_failure() {
        let result: Result<serde_json::Value, _> = parse_json("not valid json", "rules", "config");
        assert!(matches!(
            result,
            Err(StoreError::CorruptRow { table: "rules", column: "config", .. })
        ));
    }
}
