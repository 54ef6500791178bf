//! Column codecs shared by the SQL repositories.
//!
//! Timestamps are stored as fixed-width RFC3339 UTC with microseconds so that
//! lexical comparison in SQL matches chronological order. Money is stored as
//! its canonical two-decimal text.

use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use rust_decimal::Decimal;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use tally_core::domain::user::UserId;
use tally_core::money::Money;

use super::RepositoryError;

pub fn encode_ts(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn encode_opt_ts(value: Option<DateTime<Utc>>) -> Option<String> {
    value.map(encode_ts)
}

pub fn decode_ts(column: &str, raw: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|value| value.with_timezone(&Utc))
        .map_err(|error| RepositoryError::Decode(format!("{column}: {error}")))
}

pub fn encode_money(value: Money) -> String {
    value.to_fixed()
}

pub fn decode_money(column: &str, raw: &str) -> Result<Money, RepositoryError> {
    Decimal::from_str(raw)
        .map(Money::from)
        .map_err(|error| RepositoryError::Decode(format!("{column}: {error}")))
}

pub fn get<'r, T>(row: &'r SqliteRow, column: &str) -> Result<T, RepositoryError>
where
    T: sqlx::Decode<'r, sqlx::Sqlite> + sqlx::Type<sqlx::Sqlite>,
{
    row.try_get(column).map_err(|error| RepositoryError::Decode(error.to_string()))
}

pub fn get_ts(row: &SqliteRow, column: &str) -> Result<DateTime<Utc>, RepositoryError> {
    let raw: String = get(row, column)?;
    decode_ts(column, &raw)
}

pub fn get_opt_ts(row: &SqliteRow, column: &str) -> Result<Option<DateTime<Utc>>, RepositoryError> {
    let raw: Option<String> = get(row, column)?;
    raw.map(|value| decode_ts(column, &value)).transpose()
}

pub fn get_money(row: &SqliteRow, column: &str) -> Result<Money, RepositoryError> {
    let raw: String = get(row, column)?;
    decode_money(column, &raw)
}

pub fn get_opt_money(row: &SqliteRow, column: &str) -> Result<Option<Money>, RepositoryError> {
    let raw: Option<String> = get(row, column)?;
    raw.map(|value| decode_money(column, &value)).transpose()
}

pub fn get_user_id(row: &SqliteRow, column: &str) -> Result<UserId, RepositoryError> {
    get::<String>(row, column).map(UserId)
}

pub fn get_opt_user_id(row: &SqliteRow, column: &str) -> Result<Option<UserId>, RepositoryError> {
    get::<Option<String>>(row, column).map(|value| value.map(UserId))
}

/// JSON array bound into `IN (SELECT value FROM json_each(?))`; `None` disables the filter.
pub fn user_ids_json(ids: Option<&[UserId]>) -> Option<String> {
    ids.map(|ids| {
        let raw: Vec<&str> = ids.iter().map(|id| id.0.as_str()).collect();
        serde_json::Value::from(raw).to_string()
    })
}

pub fn parse_enum<T>(
    column: &str,
    raw: &str,
    parse: impl FnOnce(&str) -> Result<T, tally_core::errors::DomainError>,
) -> Result<T, RepositoryError> {
    parse(raw).map_err(|error| RepositoryError::Decode(format!("{column}: {error}")))
}

pub fn is_unique_violation(error: &sqlx::Error) -> bool {
    matches!(error, sqlx::Error::Database(db) if db.is_unique_violation())
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use super::{decode_money, decode_ts, encode_ts, user_ids_json};
    use tally_core::domain::user::UserId;
    use tally_core::money::Money;

    #[test]
    fn timestamps_are_fixed_width_and_sort_lexically() {
        let early = Utc.with_ymd_and_hms(2024, 1, 15, 9, 0, 0).single().expect("ts");
        let late = early + Duration::microseconds(1);

        let (a, b) = (encode_ts(early), encode_ts(late));
        assert_eq!(a, "2024-01-15T09:00:00.000000Z");
        assert_eq!(a.len(), b.len());
        assert!(a < b);
        assert_eq!(decode_ts("created_at", &b).expect("decode"), late);
    }

    #[test]
    fn money_text_is_exact() {
        assert_eq!(decode_money("amount", "45.00").expect("decode"), Money::from_cents(4_500));
        assert!(decode_money("amount", "forty").is_err());
    }

    #[test]
    fn id_filters_encode_as_json_arrays() {
        let ids = vec![UserId("emp-1".to_string()), UserId("emp-2".to_string())];
        assert_eq!(user_ids_json(Some(&ids)).as_deref(), Some(r#"["emp-1","emp-2"]"#));
        assert_eq!(user_ids_json(None), None);
    }
}
