//! Typed conversion of result rows.

use crate::datum::{Type, Value};

use super::error::QueryError;

/// A destination type for result rows.
pub trait FromRow: Sized {
    /// Builds a value from one row and the query's column names.
    fn from_row(columns: &[String], values: Vec<Value>) -> Result<Self, QueryError>;
}

/// A destination type for a single result value.
pub trait FromValue: Sized {
    /// Converts `value`, describing the mismatch on failure.
    fn from_value(value: Value) -> Result<Self, String>;
}

impl FromRow for Vec<Value> {
    fn from_row(_columns: &[String], values: Vec<Value>) -> Result<Self, QueryError> {
        Ok(values)
    }
}

/// A result row that keeps its column names.
#[derive(Debug, Clone, PartialEq)]
pub struct NamedRow {
    columns: Vec<String>,
    values: Vec<Value>,
}

impl NamedRow {
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Returns the value of the first column named `name`, ignoring case.
    pub fn get(&self, name: &str) -> Option<&Value> {
        let idx = self
            .columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(name))?;
        self.values.get(idx)
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }
}

impl FromRow for NamedRow {
    fn from_row(columns: &[String], values: Vec<Value>) -> Result<Self, QueryError> {
        Ok(Self {
            columns: columns.to_vec(),
            values,
        })
    }
}

fn expected(what: &str, value: &Value) -> String {
    format!("expected {}, found {}", what, value.type_name())
}

impl FromValue for Value {
    fn from_value(value: Value) -> Result<Self, String> {
        Ok(value)
    }
}

impl FromValue for i64 {
    fn from_value(value: Value) -> Result<Self, String> {
        let message = expected("integer", &value);
        match value.coerce(Type::Int) {
            Some(Value::Int64(n)) => Ok(n),
            _ => Err(message),
        }
    }
}

impl FromValue for i32 {
    fn from_value(value: Value) -> Result<Self, String> {
        let n = i64::from_value(value)?;
        i32::try_from(n).map_err(|_| format!("integer {} out of range", n))
    }
}

impl FromValue for f64 {
    fn from_value(value: Value) -> Result<Self, String> {
        let message = expected("float", &value);
        match value.coerce(Type::Float) {
            Some(Value::Float64(n)) => Ok(n),
            _ => Err(message),
        }
    }
}

impl FromValue for bool {
    fn from_value(value: Value) -> Result<Self, String> {
        match value {
            Value::Boolean(b) => Ok(b),
            other => Err(expected("boolean", &other)),
        }
    }
}

impl FromValue for String {
    fn from_value(value: Value) -> Result<Self, String> {
        match value {
            Value::Text(s) => Ok(s),
            other => Err(expected("text", &other)),
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: Value) -> Result<Self, String> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

/// Implements [`FromRow`] for a `Default` struct by listing its fields.
///
/// Columns are matched to fields by case-insensitive name. Columns without
/// a field are ignored, and fields without a column keep their default.
///
/// ```
/// #[derive(Default)]
/// struct Out {
///     a: i64,
///     label: Option<String>,
/// }
/// loupe::impl_from_row!(Out { a, label });
/// ```
#[macro_export]
macro_rules! impl_from_row {
    ($ty:ty { $($field:ident),+ $(,)? }) => {
        impl $crate::FromRow for $ty {
            fn from_row(
                columns: &[String],
                values: Vec<$crate::Value>,
            ) -> Result<Self, $crate::QueryError> {
                let mut out = <$ty as Default>::default();
                for (column, value) in columns.iter().zip(values) {
                    $(
                        if column.eq_ignore_ascii_case(stringify!($field)) {
                            out.$field = $crate::FromValue::from_value(value).map_err(|message| {
                                $crate::QueryError::Decode {
                                    column: column.clone(),
                                    message,
                                }
                            })?;
                            continue;
                        }
                    )+
                }
                Ok(out)
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default, PartialEq)]
    struct Out {
        a: i64,
        b: Option<String>,
        missing: f64,
    }
    crate::impl_from_row!(Out { a, b, missing });

    fn columns(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_from_row_matches_by_name() {
        let out = Out::from_row(
            &columns(&["B", "extra", "A"]),
            vec![Value::from("x"), Value::Int64(9), Value::Float64(2.0)],
        )
        .unwrap();
        assert_eq!(
            out,
            Out {
                a: 2,
                b: Some("x".to_string()),
                missing: 0.0,
            }
        );
    }

    #[test]
    fn test_from_row_decode_error() {
        let err = Out::from_row(&columns(&["a"]), vec![Value::from("x")]).unwrap_err();
        assert!(matches!(err, QueryError::Decode { ref column, .. } if column == "a"));
    }

    #[test]
    fn test_named_row() {
        let row = NamedRow::from_row(&columns(&["Total"]), vec![Value::Int64(3)]).unwrap();
        assert_eq!(row.get("total"), Some(&Value::Int64(3)));
        assert_eq!(row.get("other"), None);
    }

    #[test]
    fn test_option_accepts_null() {
        assert_eq!(Option::<i64>::from_value(Value::Null), Ok(None));
        assert!(i64::from_value(Value::Null).is_err());
    }
}
