//! Scalar function adapter and built-in functions.
//!
//! Every scalar function, built-in or host-supplied, is a [`HostFunction`]:
//! a typed [`Signature`] plus a closure over already-coerced arguments. The
//! compiler checks arity against the signature; each call coerces its
//! arguments to the declared parameter types and the result to the declared
//! result type.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use crate::datum::{Type, Value};

use super::error::ExecutorError;
use super::pipeline::panic_message;

/// Parameter and result types of a scalar function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    /// Parameter types in order.
    pub params: Vec<Type>,
    /// How many trailing parameters may be omitted.
    pub optional: usize,
    /// Result type.
    pub ret: Type,
}

impl Signature {
    /// Creates a signature with all parameters required.
    pub fn new(params: impl Into<Vec<Type>>, ret: Type) -> Self {
        Self {
            params: params.into(),
            optional: 0,
            ret,
        }
    }

    /// Marks the last `n` parameters as optional.
    pub fn with_optional(mut self, n: usize) -> Self {
        self.optional = n.min(self.params.len());
        self
    }

    /// Checks that `found` arguments fit this signature.
    pub(crate) fn check_arity(&self, function: &str, found: usize) -> Result<(), ExecutorError> {
        let max = self.params.len();
        let min = max - self.optional;
        if (min..=max).contains(&found) {
            return Ok(());
        }
        let expected = if min == max {
            max.to_string()
        } else {
            format!("{} to {}", min, max)
        };
        Err(ExecutorError::ArgumentCount {
            function: function.to_string(),
            expected,
            found,
        })
    }
}

type Callable = dyn Fn(&[Value]) -> Result<Value, String> + Send + Sync;

/// A scalar function callable from SQL.
#[derive(Clone)]
pub struct HostFunction {
    signature: Signature,
    func: Arc<Callable>,
}

impl fmt::Debug for HostFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostFunction")
            .field("signature", &self.signature)
            .finish_non_exhaustive()
    }
}

impl HostFunction {
    /// Wraps a closure with its signature.
    ///
    /// The closure receives arguments already coerced to the parameter
    /// types, never NULL. An `Err` or a panic is reported as a failed call.
    pub fn new<F>(signature: Signature, func: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value, String> + Send + Sync + 'static,
    {
        Self {
            signature,
            func: Arc::new(func),
        }
    }

    /// Returns the function's signature.
    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    /// Calls the function. A NULL argument yields NULL without a call.
    pub(crate) fn call(&self, name: &str, args: Vec<Value>) -> Result<Value, ExecutorError> {
        if args.iter().any(Value::is_null) {
            return Ok(Value::Null);
        }
        let mut coerced = Vec::with_capacity(args.len());
        for (arg, &ty) in args.into_iter().zip(&self.signature.params) {
            let found = arg.type_name();
            let value = arg.coerce(ty).ok_or_else(|| ExecutorError::TypeMismatch {
                expected: ty.to_string(),
                found: found.to_string(),
            })?;
            coerced.push(value);
        }

        let result = panic::catch_unwind(AssertUnwindSafe(|| (self.func)(&coerced)))
            .unwrap_or_else(|payload| Err(format!("panicked: {}", panic_message(payload.as_ref()))))
            .map_err(|message| ExecutorError::FunctionFailed {
                function: name.to_string(),
                message,
            })?;
        coerce_result(result, self.signature.ret)
    }
}

/// Converts a function result to its declared type, parsing text results
/// for numeric and boolean declarations.
fn coerce_result(value: Value, ty: Type) -> Result<Value, ExecutorError> {
    let found = value.type_name();
    let parsed = match (&value, ty) {
        (Value::Text(s), Type::Int) => s.trim().parse().ok().map(Value::Int64),
        (Value::Text(s), Type::Float) => s.trim().parse().ok().map(Value::Float64),
        (Value::Text(s), Type::Bool) => s.trim().parse().ok().map(Value::Boolean),
        _ => None,
    };
    match parsed {
        Some(v) => Ok(v),
        None => value.coerce(ty).ok_or_else(|| ExecutorError::TypeMismatch {
            expected: ty.to_string(),
            found: found.to_string(),
        }),
    }
}

/// Looks up a built-in function by case-insensitive name.
pub(crate) fn builtin(name: &str) -> Option<HostFunction> {
    use Type::{Int, Text};

    let f = match name.to_lowercase().as_str() {
        "char_length" => HostFunction::new(Signature::new([Text], Int), |args| {
            Ok(Value::Int64(text(args, 0)?.chars().count() as i64))
        }),
        "octet_length" => HostFunction::new(Signature::new([Text], Int), |args| {
            Ok(Value::Int64(text(args, 0)?.len() as i64))
        }),
        "lower" => HostFunction::new(Signature::new([Text], Text), |args| {
            Ok(Value::Text(text(args, 0)?.to_lowercase()))
        }),
        "upper" => HostFunction::new(Signature::new([Text], Text), |args| {
            Ok(Value::Text(text(args, 0)?.to_uppercase()))
        }),
        "position" | "find" | "textpos" | "index" => {
            HostFunction::new(Signature::new([Text, Text], Int), |args| {
                let pos = text(args, 0)?.find(text(args, 1)?);
                Ok(Value::Int64(pos.map_or(-1, |i| i as i64)))
            })
        }
        "substr" | "substring" => HostFunction::new(
            Signature::new([Text, Int, Int], Text).with_optional(1),
            |args| {
                let len = match args.get(2) {
                    Some(_) => Some(int(args, 2)?),
                    None => None,
                };
                Ok(Value::Text(substr(text(args, 0)?, int(args, 1)?, len)))
            },
        ),
        "abs" => float_fn(f64::abs),
        "floor" => float_fn(f64::floor),
        "ceil" => float_fn(f64::ceil),
        "pow" => float_fn2(f64::powf),
        "minof" => float_fn2(f64::min),
        "maxof" => float_fn2(f64::max),
        _ => return None,
    };
    Some(f)
}

/// Returns up to `len` characters of `s` starting at the 0-based character
/// offset `start`. Out-of-range offsets and negative lengths yield "".
fn substr(s: &str, start: i64, len: Option<i64>) -> String {
    let Ok(start) = usize::try_from(start) else {
        return String::new();
    };
    let rest = s.chars().skip(start);
    match len {
        None => rest.collect(),
        Some(len) => match usize::try_from(len) {
            Ok(len) => rest.take(len).collect(),
            Err(_) => String::new(),
        },
    }
}

fn float_fn(f: fn(f64) -> f64) -> HostFunction {
    HostFunction::new(Signature::new([Type::Float], Type::Float), move |args| {
        Ok(Value::Float64(f(float(args, 0)?)))
    })
}

fn float_fn2(f: fn(f64, f64) -> f64) -> HostFunction {
    HostFunction::new(
        Signature::new([Type::Float, Type::Float], Type::Float),
        move |args| Ok(Value::Float64(f(float(args, 0)?, float(args, 1)?))),
    )
}

fn text(args: &[Value], i: usize) -> Result<&str, String> {
    match args.get(i) {
        Some(Value::Text(s)) => Ok(s),
        _ => Err(format!("argument {} is not text", i + 1)),
    }
}

fn int(args: &[Value], i: usize) -> Result<i64, String> {
    match args.get(i) {
        Some(Value::Int64(n)) => Ok(*n),
        _ => Err(format!("argument {} is not an integer", i + 1)),
    }
}

fn float(args: &[Value], i: usize) -> Result<f64, String> {
    match args.get(i) {
        Some(Value::Float64(n)) => Ok(*n),
        _ => Err(format!("argument {} is not a float", i + 1)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(name: &str, args: Vec<Value>) -> Result<Value, ExecutorError> {
        builtin(name).unwrap().call(name, args)
    }

    #[test]
    fn test_string_functions() {
        assert_eq!(
            call("UPPER", vec![Value::from("hello")]).unwrap(),
            Value::from("HELLO")
        );
        assert_eq!(
            call("char_length", vec![Value::from("héllo")]).unwrap(),
            Value::Int64(5)
        );
        assert_eq!(
            call("octet_length", vec![Value::from("héllo")]).unwrap(),
            Value::Int64(6)
        );
        assert_eq!(
            call("find", vec![Value::from("hello"), Value::from("ll")]).unwrap(),
            Value::Int64(2)
        );
        assert_eq!(
            call("position", vec![Value::from("hello"), Value::from("z")]).unwrap(),
            Value::Int64(-1)
        );
    }

    #[test]
    fn test_panicking_function_fails_call() {
        let f = HostFunction::new(Signature::new([Type::Int], Type::Int), |args| match args[0] {
            Value::Int64(3) => panic!("no threes"),
            ref v => Ok(v.clone()),
        });
        assert_eq!(f.call("pick", vec![Value::Int64(2)]).unwrap(), Value::Int64(2));
        assert_eq!(
            f.call("pick", vec![Value::Int64(3)]).unwrap_err(),
            ExecutorError::FunctionFailed {
                function: "pick".to_string(),
                message: "panicked: no threes".to_string(),
            }
        );
    }

    #[test]
    fn test_substr() {
        let s = || Value::from("HELLO");
        assert_eq!(
            call("substr", vec![s(), Value::Int64(1), Value::Int64(3)]).unwrap(),
            Value::from("ELL")
        );
        assert_eq!(call("substr", vec![s(), Value::Int64(3)]).unwrap(), Value::from("LO"));
        assert_eq!(call("substr", vec![s(), Value::Int64(9)]).unwrap(), Value::from(""));
        assert_eq!(
            call("substr", vec![s(), Value::Int64(1), Value::Int64(-1)]).unwrap(),
            Value::from("")
        );
    }

    #[test]
    fn test_math_coerces_integers() {
        assert_eq!(call("abs", vec![Value::Int64(-3)]).unwrap(), Value::Float64(3.0));
        assert_eq!(
            call("pow", vec![Value::Int64(2), Value::Float64(3.0)]).unwrap(),
            Value::Float64(8.0)
        );
        assert_eq!(
            call("minOf", vec![Value::Int64(2), Value::Int64(1)]).unwrap(),
            Value::Float64(1.0)
        );
    }

    #[test]
    fn test_null_argument_yields_null() {
        assert_eq!(call("lower", vec![Value::Null]).unwrap(), Value::Null);
    }

    #[test]
    fn test_argument_type_mismatch() {
        assert!(matches!(
            call("abs", vec![Value::from("x")]),
            Err(ExecutorError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_arity() {
        let sig = builtin("substr").unwrap().signature().clone();
        assert!(sig.check_arity("substr", 2).is_ok());
        assert!(sig.check_arity("substr", 3).is_ok());
        let err = sig.check_arity("substr", 1).unwrap_err();
        assert_eq!(err.to_string(), "function substr expects 2 to 3 arguments, got 1");
    }

    #[test]
    fn test_text_result_is_parsed() {
        let f = HostFunction::new(Signature::new([Type::Text], Type::Int), |args| {
            Ok(Value::Text(format!("{}", text(args, 0)?.len())))
        });
        assert_eq!(f.call("len", vec![Value::from("abc")]).unwrap(), Value::Int64(3));
    }

    #[test]
    fn test_host_failure() {
        let f = HostFunction::new(Signature::new([Type::Int], Type::Int), |_| {
            Err("boom".to_string())
        });
        assert_eq!(
            f.call("fail", vec![Value::Int64(1)]).unwrap_err(),
            ExecutorError::FunctionFailed {
                function: "fail".to_string(),
                message: "boom".to_string()
            }
        );
    }
}
