//! Data types and values.
//!
//! [`Value`] is the dynamically-typed cell that flows through every pipeline
//! stage. [`Type`] names the declared types used by function signatures.

use std::cmp::Ordering;
use std::fmt;

/// Declared value type of a function parameter or result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Type {
    /// Boolean type.
    Bool,
    /// 64-bit signed integer.
    Int,
    /// Double-precision floating-point.
    Float,
    /// Variable-length character string.
    Text,
}

impl Type {
    /// Returns the display name of the type.
    pub fn display_name(&self) -> &'static str {
        match self {
            Type::Bool => "boolean",
            Type::Int => "integer",
            Type::Float => "float",
            Type::Text => "text",
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// A single typed value.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    /// SQL NULL.
    #[default]
    Null,
    /// Boolean value.
    Boolean(bool),
    /// 64-bit integer.
    Int64(i64),
    /// 64-bit floating-point.
    Float64(f64),
    /// Text value.
    Text(String),
}

impl Value {
    /// Returns the type of this value, or `None` for NULL.
    pub fn data_type(&self) -> Option<Type> {
        match self {
            Value::Null => None,
            Value::Boolean(_) => Some(Type::Bool),
            Value::Int64(_) => Some(Type::Int),
            Value::Float64(_) => Some(Type::Float),
            Value::Text(_) => Some(Type::Text),
        }
    }

    /// Returns true if this value is NULL.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Returns a human-readable type name, used in error messages.
    pub fn type_name(&self) -> &'static str {
        self.data_type().map_or("null", |ty| ty.display_name())
    }

    /// Returns the numeric value widened to `f64`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int64(n) => Some(*n as f64),
            Value::Float64(n) => Some(*n),
            _ => None,
        }
    }

    /// Converts the value to the declared type.
    ///
    /// Integers widen to floats, and floats with an integral value narrow to
    /// integers. NULL converts to NULL. Returns `None` for anything else.
    pub fn coerce(self, ty: Type) -> Option<Value> {
        match (self, ty) {
            (Value::Null, _) => Some(Value::Null),
            (v @ Value::Boolean(_), Type::Bool)
            | (v @ Value::Int64(_), Type::Int)
            | (v @ Value::Float64(_), Type::Float)
            | (v @ Value::Text(_), Type::Text) => Some(v),
            (Value::Int64(n), Type::Float) => Some(Value::Float64(n as f64)),
            (Value::Float64(n), Type::Int)
                if n.fract() == 0.0 && n >= i64::MIN as f64 && n < i64::MAX as f64 =>
            {
                Some(Value::Int64(n as i64))
            }
            _ => None,
        }
    }

    /// Compares two non-NULL values of compatible types.
    ///
    /// Integers and floats compare numerically. NaN sorts after every other
    /// float and equal to itself. Returns `None` when the values are NULL or
    /// of incompatible types.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Boolean(a), Value::Boolean(b)) => Some(a.cmp(b)),
            (Value::Int64(a), Value::Int64(b)) => Some(a.cmp(b)),
            (Value::Text(a), Value::Text(b)) => Some(a.cmp(b)),
            (Value::Float64(a), Value::Float64(b)) => Some(compare_f64(*a, *b)),
            (Value::Int64(a), Value::Float64(b)) => Some(compare_f64(*a as f64, *b)),
            (Value::Float64(a), Value::Int64(b)) => Some(compare_f64(*a, *b as f64)),
            _ => None,
        }
    }

    /// Appends a canonical, type-tagged encoding of the value to `out`.
    ///
    /// Two values produce the same encoding exactly when they belong to the
    /// same group. Integral floats encode like the equal integer.
    pub fn encode_key(&self, out: &mut String) {
        use std::fmt::Write;

        // Writing to a String cannot fail.
        let _ = match self {
            Value::Null => write!(out, "N;"),
            Value::Boolean(b) => write!(out, "B{};", u8::from(*b)),
            Value::Int64(n) => write!(out, "I{n};"),
            Value::Float64(n) if n.fract() == 0.0 && n.abs() < 9.0e15 => {
                write!(out, "I{};", *n as i64)
            }
            Value::Float64(n) => write!(out, "F{:016x};", n.to_bits()),
            Value::Text(s) => write!(out, "T{}:{s};", s.len()),
        };
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::Boolean(b) => write!(f, "{b}"),
            Value::Int64(n) => write!(f, "{n}"),
            Value::Float64(n) => write!(f, "{n}"),
            Value::Text(s) => write!(f, "'{s}'"),
        }
    }
}

/// Compares two f64 values with NaN-aware total ordering.
fn compare_f64(a: f64, b: f64) -> Ordering {
    match a.partial_cmp(&b) {
        Some(ord) => ord,
        None => a.is_nan().cmp(&b.is_nan()),
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int64(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int64(i64::from(v))
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Int64(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float64(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float64(f64::from(v))
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coerce() {
        assert_eq!(Value::Int64(3).coerce(Type::Float), Some(Value::Float64(3.0)));
        assert_eq!(Value::Float64(3.0).coerce(Type::Int), Some(Value::Int64(3)));
        assert_eq!(Value::Float64(3.5).coerce(Type::Int), None);
        assert_eq!(Value::Null.coerce(Type::Text), Some(Value::Null));
        assert_eq!(Value::from("a").coerce(Type::Int), None);
    }

    #[test]
    fn test_compare_mixed_numeric() {
        assert_eq!(
            Value::Int64(2).compare(&Value::Float64(2.5)),
            Some(Ordering::Less)
        );
        assert_eq!(
            Value::Float64(f64::NAN).compare(&Value::Float64(1.0)),
            Some(Ordering::Greater)
        );
        assert_eq!(Value::Int64(1).compare(&Value::from("1")), None);
        assert_eq!(Value::Null.compare(&Value::Null), None);
    }

    #[test]
    fn test_encode_key() {
        let key = |v: Value| {
            let mut s = String::new();
            v.encode_key(&mut s);
            s
        };
        assert_eq!(key(Value::Int64(2)), key(Value::Float64(2.0)));
        assert_ne!(key(Value::Int64(2)), key(Value::from("2")));
        assert_ne!(key(Value::Null), key(Value::from("")));
    }

    #[test]
    fn test_from_option() {
        assert_eq!(Value::from(None::<i64>), Value::Null);
        assert_eq!(Value::from(Some("x")), Value::Text("x".to_string()));
    }
}
