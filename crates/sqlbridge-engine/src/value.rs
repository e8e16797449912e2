//! Conversions between protocol JSON values and SQLite values
//!
//! Binding rules:
//! - absent or `null` args bind nothing
//! - an array binds positionally (`?`, `?NNN`)
//! - an object binds by name; keys may carry their sigil (`:x`, `@x`, `$x`)
//!   or omit it, in which case the first sigil the statement uses wins
//! - any other scalar binds as the single positional parameter
//!
//! JSON arrays and objects nested inside args bind as their JSON text.

use rusqlite::types::{Value, ValueRef};
use rusqlite::Statement;

/// Parameters ready to bind to one prepared statement
#[derive(Debug, Clone, PartialEq)]
pub enum Bindings {
    None,
    Positional(Vec<Value>),
    Named(Vec<(String, Value)>),
}

impl Bindings {
    pub fn from_json(args: Option<&serde_json::Value>) -> Self {
        match args {
            None | Some(serde_json::Value::Null) => Bindings::None,
            Some(serde_json::Value::Array(items)) if items.is_empty() => Bindings::None,
            Some(serde_json::Value::Array(items)) => {
                Bindings::Positional(items.iter().map(json_to_sql).collect())
            }
            Some(serde_json::Value::Object(map)) if map.is_empty() => Bindings::None,
            Some(serde_json::Value::Object(map)) => Bindings::Named(
                map.iter()
                    .map(|(name, value)| (name.clone(), json_to_sql(value)))
                    .collect(),
            ),
            Some(scalar) => Bindings::Positional(vec![json_to_sql(scalar)]),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Bindings::None)
    }

    /// Bind onto `stmt`; a count or name mismatch is reported the way the
    /// engine's own parameter checks report it
    ///
    /// `None` binds nothing, so any parameters the statement has stay NULL.
    pub fn bind(&self, stmt: &mut Statement<'_>) -> rusqlite::Result<()> {
        let expected = stmt.parameter_count();
        match self {
            Bindings::None => Ok(()),
            Bindings::Positional(values) => {
                if values.len() != expected {
                    return Err(rusqlite::Error::InvalidParameterCount(
                        values.len(),
                        expected,
                    ));
                }
                for (i, value) in values.iter().enumerate() {
                    stmt.raw_bind_parameter(i + 1, value)?;
                }
                Ok(())
            }
            Bindings::Named(values) => {
                for (name, value) in values {
                    let index = resolve_name(stmt, name)?
                        .ok_or_else(|| rusqlite::Error::InvalidParameterName(name.clone()))?;
                    stmt.raw_bind_parameter(index, value)?;
                }
                Ok(())
            }
        }
    }
}

fn resolve_name(stmt: &Statement<'_>, name: &str) -> rusqlite::Result<Option<usize>> {
    if name.starts_with([':', '@', '$']) {
        return stmt.parameter_index(name);
    }
    for sigil in [':', '@', '$'] {
        if let Some(index) = stmt.parameter_index(&format!("{}{}", sigil, name))? {
            return Ok(Some(index));
        }
    }
    Ok(None)
}

/// Convert one JSON argument to a SQLite value
pub fn json_to_sql(value: &serde_json::Value) -> Value {
    match value {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Integer(i64::from(*b)),
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(i) => Value::Integer(i),
            None => Value::Real(n.as_f64().unwrap_or(f64::NAN)),
        },
        serde_json::Value::String(s) => Value::Text(s.clone()),
        nested => Value::Text(nested.to_string()),
    }
}

/// Convert one result cell to JSON; blobs become byte arrays
pub fn sql_to_json(value: ValueRef<'_>) -> serde_json::Value {
    match value {
        ValueRef::Null => serde_json::Value::Null,
        ValueRef::Integer(i) => serde_json::Value::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        ValueRef::Text(bytes) => serde_json::Value::String(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => serde_json::Value::from(bytes.to_vec()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;
    use serde_json::json;

    fn first_cell(conn: &Connection, sql: &str, args: serde_json::Value) -> serde_json::Value {
        let mut stmt = conn.prepare(sql).unwrap();
        Bindings::from_json(Some(&args)).bind(&mut stmt).unwrap();
        let mut rows = stmt.raw_query();
        let row = rows.next().unwrap().unwrap();
        sql_to_json(row.get_ref(0).unwrap())
    }

    #[test]
    fn test_shapes() {
        assert_eq!(Bindings::from_json(None), Bindings::None);
        assert_eq!(Bindings::from_json(Some(&json!(null))), Bindings::None);
        assert_eq!(Bindings::from_json(Some(&json!([]))), Bindings::None);
        assert_eq!(
            Bindings::from_json(Some(&json!(5))),
            Bindings::Positional(vec![Value::Integer(5)])
        );
        assert_eq!(
            Bindings::from_json(Some(&json!([true, 1.5, "a"]))),
            Bindings::Positional(vec![
                Value::Integer(1),
                Value::Real(1.5),
                Value::Text("a".to_string())
            ])
        );
    }

    #[test]
    fn test_positional_binding() {
        let conn = Connection::open_in_memory().unwrap();
        assert_eq!(first_cell(&conn, "SELECT ?1 + ?2", json!([40, 2])), json!(42));
    }

    #[test]
    fn test_named_binding_with_and_without_sigil() {
        let conn = Connection::open_in_memory().unwrap();
        assert_eq!(
            first_cell(&conn, "SELECT :a || @b", json!({":a": "x", "b": "y"})),
            json!("xy")
        );
    }

    #[test]
    fn test_unknown_name_is_rejected() {
        let conn = Connection::open_in_memory().unwrap();
        let mut stmt = conn.prepare("SELECT :a").unwrap();
        let err = Bindings::from_json(Some(&json!({"zzz": 1})))
            .bind(&mut stmt)
            .unwrap_err();
        assert!(matches!(err, rusqlite::Error::InvalidParameterName(_)));
    }

    #[test]
    fn test_count_mismatch_is_rejected() {
        let conn = Connection::open_in_memory().unwrap();
        let mut stmt = conn.prepare("SELECT ?, ?").unwrap();
        let err = Bindings::from_json(Some(&json!([1])))
            .bind(&mut stmt)
            .unwrap_err();
        assert!(matches!(err, rusqlite::Error::InvalidParameterCount(1, 2)));
    }

    #[test]
    fn test_none_leaves_parameters_null() {
        let conn = Connection::open_in_memory().unwrap();
        assert_eq!(first_cell(&conn, "SELECT ?1 IS NULL", json!(null)), json!(1));
    }

    #[test]
    fn test_result_cells() {
        let conn = Connection::open_in_memory().unwrap();
        assert_eq!(first_cell(&conn, "SELECT NULL", json!(null)), json!(null));
        assert_eq!(first_cell(&conn, "SELECT 2.5", json!(null)), json!(2.5));
        assert_eq!(first_cell(&conn, "SELECT x'0102'", json!(null)), json!([1, 2]));
        assert_eq!(
            first_cell(&conn, "SELECT ?", json!([{"k": [1]}])),
            json!("{\"k\":[1]}")
        );
    }
}
