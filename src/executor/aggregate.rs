//! Aggregate function definitions and accumulators.
//!
//! This module provides the building blocks for GROUP BY processing:
//!
//! - [`AggregateFunction`]: the supported aggregate functions
//! - [`AggregateSpec`]: one aggregate call compiled into an expression slot
//! - [`Accumulator`]: stateful per-group computation
//! - [`GroupKey`]: canonical text encoding of a GROUP BY value tuple

use std::cmp::Ordering;
use std::collections::HashSet;
use std::fmt;

use crate::datum::Value;

use super::error::ExecutorError;
use super::expr::BoundExpr;
use super::row::Row;

/// Supported aggregate functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateFunction {
    /// COUNT: counts rows or non-NULL values.
    Count,
    /// SUM: sum of numeric values.
    Sum,
    /// AVG: average of numeric values (always a float).
    Avg,
    /// MIN: minimum value.
    Min,
    /// MAX: maximum value.
    Max,
}

impl AggregateFunction {
    /// Resolves a function name (case-insensitive) to an aggregate function.
    ///
    /// Returns `None` for non-aggregate function names.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "count" => Some(AggregateFunction::Count),
            "sum" => Some(AggregateFunction::Sum),
            "avg" => Some(AggregateFunction::Avg),
            "min" => Some(AggregateFunction::Min),
            "max" => Some(AggregateFunction::Max),
            _ => None,
        }
    }
}

impl fmt::Display for AggregateFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AggregateFunction::Count => write!(f, "COUNT"),
            AggregateFunction::Sum => write!(f, "SUM"),
            AggregateFunction::Avg => write!(f, "AVG"),
            AggregateFunction::Min => write!(f, "MIN"),
            AggregateFunction::Max => write!(f, "MAX"),
        }
    }
}

/// One aggregate call, compiled into a slot of an aggregation state list.
///
/// `COUNT(*)` has no argument.
#[derive(Debug, Clone)]
pub(crate) struct AggregateSpec {
    pub func: AggregateFunction,
    pub arg: Option<BoundExpr>,
    pub distinct: bool,
}

impl AggregateSpec {
    /// Creates a fresh accumulator for one group.
    pub fn accumulator(&self) -> Box<dyn Accumulator> {
        match (self.func, self.distinct) {
            (AggregateFunction::Count, true) => Box::new(DistinctCountAccumulator {
                seen: HashSet::new(),
            }),
            (AggregateFunction::Count, false) => Box::new(CountAccumulator { count: 0 }),
            (AggregateFunction::Sum, _) => Box::new(SumAccumulator { sum: Value::Null }),
            (AggregateFunction::Avg, _) => Box::new(AvgAccumulator { sum: 0.0, count: 0 }),
            (AggregateFunction::Min, _) => Box::new(ExtremeAccumulator {
                keep: Ordering::Less,
                value: Value::Null,
            }),
            (AggregateFunction::Max, _) => Box::new(ExtremeAccumulator {
                keep: Ordering::Greater,
                value: Value::Null,
            }),
        }
    }

    /// Evaluates the argument for `row` and feeds it to `acc`.
    ///
    /// NULL arguments are skipped; `COUNT(*)` feeds every row.
    pub fn update(&self, acc: &mut dyn Accumulator, row: &Row) -> Result<(), ExecutorError> {
        match &self.arg {
            None => acc.feed(&Value::Null),
            Some(arg) => {
                let value = arg.evaluate(row)?;
                if value.is_null() {
                    Ok(())
                } else {
                    acc.feed(&value)
                }
            }
        }
    }
}

/// Aggregation state for one group: one accumulator per aggregate slot.
pub(crate) struct AggregateState {
    accumulators: Vec<Box<dyn Accumulator>>,
}

impl AggregateState {
    pub fn new(specs: &[AggregateSpec]) -> Self {
        Self {
            accumulators: specs.iter().map(AggregateSpec::accumulator).collect(),
        }
    }

    /// Feeds one input row to every slot.
    pub fn update(&mut self, specs: &[AggregateSpec], row: &Row) -> Result<(), ExecutorError> {
        for (spec, acc) in specs.iter().zip(self.accumulators.iter_mut()) {
            spec.update(acc.as_mut(), row)?;
        }
        Ok(())
    }

    /// Returns the finalized value of every slot.
    pub fn finish(&self) -> Vec<Value> {
        self.accumulators.iter().map(|acc| acc.finish()).collect()
    }
}

/// Stateful aggregate computation.
///
/// Follows a three-phase lifecycle: creation, feed, finish. Each
/// accumulator processes one group's values.
pub(crate) trait Accumulator: Send {
    /// Feeds a single non-NULL value into the accumulator.
    ///
    /// For COUNT(\*), the caller feeds `Value::Null` once per row.
    fn feed(&mut self, value: &Value) -> Result<(), ExecutorError>;

    /// Produces the final aggregate result.
    fn finish(&self) -> Value;
}

/// COUNT(\*) and COUNT(expr) accumulator.
struct CountAccumulator {
    count: i64,
}

impl Accumulator for CountAccumulator {
    fn feed(&mut self, _value: &Value) -> Result<(), ExecutorError> {
        self.count += 1;
        Ok(())
    }

    fn finish(&self) -> Value {
        Value::Int64(self.count)
    }
}

/// COUNT(DISTINCT expr) accumulator.
struct DistinctCountAccumulator {
    seen: HashSet<String>,
}

impl Accumulator for DistinctCountAccumulator {
    fn feed(&mut self, value: &Value) -> Result<(), ExecutorError> {
        let mut key = String::new();
        value.encode_key(&mut key);
        self.seen.insert(key);
        Ok(())
    }

    fn finish(&self) -> Value {
        Value::Int64(self.seen.len() as i64)
    }
}

/// SUM(expr) accumulator.
///
/// Stays an integer while every input is an integer, with checked
/// arithmetic; any float input turns the sum into a float.
struct SumAccumulator {
    sum: Value,
}

impl Accumulator for SumAccumulator {
    fn feed(&mut self, value: &Value) -> Result<(), ExecutorError> {
        self.sum = match (&self.sum, value) {
            (_, Value::Boolean(_) | Value::Text(_) | Value::Null) => {
                return Err(ExecutorError::mismatch("numeric", value));
            }
            (Value::Null, v) => v.clone(),
            (Value::Int64(a), Value::Int64(b)) => {
                Value::Int64(a.checked_add(*b).ok_or(ExecutorError::IntegerOverflow)?)
            }
            (acc, v) => {
                let a = acc.as_f64().unwrap_or_default();
                let b = v.as_f64().unwrap_or_default();
                Value::Float64(a + b)
            }
        };
        Ok(())
    }

    fn finish(&self) -> Value {
        self.sum.clone()
    }
}

/// AVG(expr) accumulator.
struct AvgAccumulator {
    sum: f64,
    count: i64,
}

impl Accumulator for AvgAccumulator {
    fn feed(&mut self, value: &Value) -> Result<(), ExecutorError> {
        let f = value
            .as_f64()
            .ok_or_else(|| ExecutorError::mismatch("numeric", value))?;
        self.sum += f;
        self.count += 1;
        Ok(())
    }

    fn finish(&self) -> Value {
        if self.count == 0 {
            Value::Null
        } else {
            Value::Float64(self.sum / self.count as f64)
        }
    }
}

/// MIN(expr) and MAX(expr) accumulator.
///
/// Keeps the input value that orders as `keep` against every other one.
/// Returns NULL if no values were fed.
struct ExtremeAccumulator {
    keep: Ordering,
    value: Value,
}

impl Accumulator for ExtremeAccumulator {
    fn feed(&mut self, value: &Value) -> Result<(), ExecutorError> {
        if self.value.is_null() {
            self.value = value.clone();
            return Ok(());
        }
        let ord = value
            .compare(&self.value)
            .ok_or_else(|| ExecutorError::TypeMismatch {
                expected: self.value.type_name().to_string(),
                found: value.type_name().to_string(),
            })?;
        if ord == self.keep {
            self.value = value.clone();
        }
        Ok(())
    }

    fn finish(&self) -> Value {
        self.value.clone()
    }
}

/// Identity of one GROUP BY bucket.
///
/// Wraps the canonical encoding of the key tuple, so NULLs group together
/// and an integral float groups with the equal integer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct GroupKey(String);

impl GroupKey {
    pub fn new(values: &[Value]) -> Self {
        let mut key = String::new();
        for v in values {
            v.encode_key(&mut key);
        }
        GroupKey(key)
    }
}
