use chrono::{NaiveDate, NaiveDateTime};
use serde_json::{Map, Value};
use sqlx::MySqlConnection;

use crate::api::response::ApiError;

/// ===============================
/// SQL bindable value enum
/// ===============================
#[derive(Debug, PartialEq)]
pub enum SqlValue {
    String(String),
    I64(i64),
    U64(u64),
    Bool(bool),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    Null,
}

/// ===============================
/// SQL update container
/// ===============================
#[derive(Debug)]
pub struct SqlUpdate {
    pub sql: String,
    pub values: Vec<SqlValue>,
}

/// ===============================
/// Build dynamic UPDATE SQL
/// ===============================
///
/// Only keys listed in `allowed` become columns; anything else is a 400.
pub fn build_update_sql(
    table: &str,
    payload: &Map<String, Value>,
    allowed: &[&str],
    id_value: u64,
) -> Result<SqlUpdate, ApiError> {
    if payload.is_empty() {
        return Err(ApiError::BadRequest("No fields provided for update".into()));
    }

    if let Some(unknown) = payload.keys().find(|k| !allowed.contains(&k.as_str())) {
        return Err(ApiError::BadRequest(format!("Field '{unknown}' cannot be updated")));
    }

    let set_clause = payload
        .keys()
        .map(|k| format!("{k} = ?"))
        .collect::<Vec<_>>()
        .join(", ");

    let sql = format!("UPDATE {table} SET {set_clause} WHERE id = ?");

    let mut values = Vec::with_capacity(payload.len() + 1);

    for (key, value) in payload {
        let bound = match value {
            Value::String(s) => {
                if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
                    SqlValue::Date(d)
                } else if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S") {
                    SqlValue::DateTime(dt)
                } else {
                    SqlValue::String(s.clone())
                }
            }
            Value::Number(n) => match n.as_i64() {
                Some(i) => SqlValue::I64(i),
                None => {
                    return Err(ApiError::BadRequest(format!("Field '{key}' must be an integer")));
                }
            },
            Value::Bool(b) => SqlValue::Bool(*b),
            Value::Null => SqlValue::Null,
            _ => {
                return Err(ApiError::BadRequest(format!(
                    "Unsupported JSON value type for '{key}'"
                )));
            }
        };
        values.push(bound);
    }

    // WHERE id = ?
    values.push(SqlValue::U64(id_value));

    Ok(SqlUpdate { sql, values })
}

/// ===============================
/// Execute the update
/// ===============================
pub async fn execute_update(conn: &mut MySqlConnection, update: SqlUpdate) -> Result<u64, sqlx::Error> {
    let mut query = sqlx::query(&update.sql);

    for value in update.values {
        query = match value {
            SqlValue::String(v) => query.bind(v),
            SqlValue::I64(v) => query.bind(v),
            SqlValue::U64(v) => query.bind(v),
            SqlValue::Bool(v) => query.bind(v),
            SqlValue::Date(v) => query.bind(v),
            SqlValue::DateTime(v) => query.bind(v),
            SqlValue::Null => query.bind(None::<String>),
        };
    }

    let result = query.execute(conn).await?;
    Ok(result.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn builds_set_clause_with_typed_values() {
        let payload = object(json!({
            "name": "Load-out",
            "start_date": "2026-04-01",
            "required_riggers": 4,
            "location": null
        }));
        let update = build_update_sql(
            "jobs",
            &payload,
            &["name", "start_date", "required_riggers", "location"],
            9,
        )
        .unwrap();

        assert!(update.sql.starts_with("UPDATE jobs SET "));
        assert!(update.sql.ends_with(" WHERE id = ?"));
        assert!(update.sql.contains("name = ?"));
        assert_eq!(update.values.len(), 5);
        assert!(update.values.contains(&SqlValue::Date(
            NaiveDate::from_ymd_opt(2026, 4, 1).unwrap()
        )));
        assert!(update.values.contains(&SqlValue::I64(4)));
        assert!(update.values.contains(&SqlValue::Null));
        assert_eq!(update.values.last(), Some(&SqlValue::U64(9)));
    }

    #[test]
    fn rejects_columns_outside_the_whitelist() {
        let payload = object(json!({ "id": 1 }));
        let err = build_update_sql("jobs", &payload, &["name"], 9).unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(msg) if msg.contains("'id'")));
    }

    #[test]
    fn rejects_empty_and_nested_payloads() {
        assert!(build_update_sql("jobs", &Map::new(), &["name"], 1).is_err());
        let nested = object(json!({ "name": { "x": 1 } }));
        assert!(build_update_sql("jobs", &nested, &["name"], 1).is_err());
        let fractional = object(json!({ "name": 1.5 }));
        assert!(build_update_sql("jobs", &fractional, &["name"], 1).is_err());
    }

    #[test]
    fn parses_datetimes() {
        let payload = object(json!({ "start_time": "2026-04-01T07:30:00" }));
        let update = build_update_sql("shifts", &payload, &["start_time"], 2).unwrap();
        assert_eq!(
            update.values[0],
            SqlValue::DateTime(
                NaiveDate::from_ymd_opt(2026, 4, 1)
                    .unwrap()
                    .and_hms_opt(7, 30, 0)
                    .unwrap()
            )
        );
    }
}
