//! Expression evaluation against rows.
//!
//! NULL handling follows these rules:
//!
//! - Comparing a NULL operand is an error.
//! - Arithmetic, concatenation, NOT and LIKE with a NULL operand yield NULL.
//! - AND/OR evaluate both sides. A side that alone decides the result
//!   (`false` for AND, `true` for OR) wins even if the other side failed;
//!   otherwise an error from either side propagates.

use std::cmp::Ordering;

use crate::datum::Value;
use crate::sql::BinaryOperator;

use super::error::ExecutorError;
use super::expr::BoundExpr;
use super::row::Row;

impl BoundExpr {
    /// Evaluates the expression against a row.
    pub fn evaluate(&self, row: &Row) -> Result<Value, ExecutorError> {
        match self {
            BoundExpr::Literal(v) => Ok(v.clone()),
            BoundExpr::Column(key) => row.lookup(key),
            BoundExpr::Aggregate(slot) => row.aggregate(*slot),

            BoundExpr::Binary { left, op, right } => match op {
                BinaryOperator::And => eval_logical(left, right, row, false),
                BinaryOperator::Or => eval_logical(left, right, row, true),
                _ => {
                    let l = left.evaluate(row)?;
                    let r = right.evaluate(row)?;
                    eval_binary_op(&l, *op, &r)
                }
            },

            BoundExpr::Not(e) => match e.evaluate(row)? {
                Value::Null => Ok(Value::Null),
                Value::Boolean(b) => Ok(Value::Boolean(!b)),
                value => Err(ExecutorError::NotBoolean { value }),
            },

            BoundExpr::Negate(e) => match e.evaluate(row)? {
                Value::Null => Ok(Value::Null),
                Value::Int64(n) => n
                    .checked_neg()
                    .map(Value::Int64)
                    .ok_or(ExecutorError::IntegerOverflow),
                Value::Float64(n) => Ok(Value::Float64(-n)),
                v => Err(ExecutorError::mismatch("numeric", &v)),
            },

            BoundExpr::IsNull { expr, negated } => {
                let v = expr.evaluate(row)?;
                Ok(Value::Boolean(v.is_null() != *negated))
            }

            BoundExpr::InList {
                expr,
                list,
                negated,
            } => {
                let v = expr.evaluate(row)?;
                if v.is_null() {
                    return Ok(Value::Null);
                }
                let mut found = false;
                for item in list {
                    if v.compare(&item.evaluate(row)?) == Some(Ordering::Equal) {
                        found = true;
                        break;
                    }
                }
                Ok(Value::Boolean(found != *negated))
            }

            BoundExpr::InSubquery {
                expr,
                gate,
                negated,
            } => {
                let v = expr.evaluate(row)?;
                if v.is_null() {
                    return Ok(Value::Null);
                }
                let values = gate.values()?;
                let found = values
                    .iter()
                    .any(|item| v.compare(item) == Some(Ordering::Equal));
                Ok(Value::Boolean(found != *negated))
            }

            BoundExpr::Like {
                expr,
                pattern,
                escape,
                negated,
                case_insensitive,
            } => {
                let v = expr.evaluate(row)?;
                let p = pattern.evaluate(row)?;
                let esc = match escape {
                    Some(e) => escape_char(e.evaluate(row)?)?,
                    None => None,
                };
                match (&v, &p) {
                    (Value::Null, _) | (_, Value::Null) => Ok(Value::Null),
                    (Value::Text(s), Value::Text(pat)) => {
                        let matched = like_match(s, pat, esc, *case_insensitive);
                        Ok(Value::Boolean(matched != *negated))
                    }
                    (Value::Text(_), other) | (other, _) => {
                        Err(ExecutorError::mismatch("text", other))
                    }
                }
            }

            BoundExpr::Call {
                name,
                function,
                args,
            } => {
                let args = args
                    .iter()
                    .map(|a| a.evaluate(row))
                    .collect::<Result<Vec<_>, _>>()?;
                function.call(name, args)
            }
        }
    }

    /// Evaluates the expression as a filter condition.
    ///
    /// NULL does not pass; any value other than a boolean or NULL is an
    /// error echoing the value.
    pub fn is_satisfied(&self, row: &Row) -> Result<bool, ExecutorError> {
        Ok(as_bool(self.evaluate(row)?)?.unwrap_or(false))
    }
}

fn as_bool(v: Value) -> Result<Option<bool>, ExecutorError> {
    match v {
        Value::Null => Ok(None),
        Value::Boolean(b) => Ok(Some(b)),
        value => Err(ExecutorError::NotBoolean { value }),
    }
}

/// Evaluates AND (`decisive == false`) or OR (`decisive == true`).
fn eval_logical(
    left: &BoundExpr,
    right: &BoundExpr,
    row: &Row,
    decisive: bool,
) -> Result<Value, ExecutorError> {
    let l = left.evaluate(row).and_then(as_bool);
    let r = right.evaluate(row).and_then(as_bool);
    match (l, r) {
        (Ok(Some(a)), _) if a == decisive => Ok(Value::Boolean(decisive)),
        (_, Ok(Some(b))) if b == decisive => Ok(Value::Boolean(decisive)),
        (Err(e), _) | (_, Err(e)) => Err(e),
        (Ok(Some(_)), Ok(Some(_))) => Ok(Value::Boolean(!decisive)),
        _ => Ok(Value::Null),
    }
}

/// Evaluates a binary operation other than AND/OR.
pub(crate) fn eval_binary_op(
    left: &Value,
    op: BinaryOperator,
    right: &Value,
) -> Result<Value, ExecutorError> {
    if op.is_comparison() {
        return eval_comparison(left, op, right);
    }
    if left.is_null() || right.is_null() {
        return Ok(Value::Null);
    }
    match op {
        BinaryOperator::Concat => Ok(Value::Text(format!(
            "{}{}",
            concat_text(left)?,
            concat_text(right)?
        ))),
        BinaryOperator::Div => {
            let (a, b) = float_operands(left, right)?;
            Ok(Value::Float64(a / b))
        }
        BinaryOperator::Mod => match (left, right) {
            (Value::Int64(_), Value::Int64(0)) => Err(ExecutorError::DivisionByZero),
            (Value::Int64(a), Value::Int64(b)) => Ok(Value::Int64(a.wrapping_rem(*b))),
            _ => {
                let (a, b) = float_operands(left, right)?;
                Ok(Value::Float64(a % b))
            }
        },
        BinaryOperator::Add | BinaryOperator::Sub | BinaryOperator::Mul => {
            if let (Value::Int64(a), Value::Int64(b)) = (left, right) {
                let result = match op {
                    BinaryOperator::Add => a.checked_add(*b),
                    BinaryOperator::Sub => a.checked_sub(*b),
                    _ => a.checked_mul(*b),
                };
                return result.map(Value::Int64).ok_or(ExecutorError::IntegerOverflow);
            }
            let (a, b) = float_operands(left, right)?;
            Ok(Value::Float64(match op {
                BinaryOperator::Add => a + b,
                BinaryOperator::Sub => a - b,
                _ => a * b,
            }))
        }
        _ => Err(ExecutorError::NotImplemented(format!(
            "operator {}",
            op.as_str()
        ))),
    }
}

/// Evaluates `=`, `<>`, `<`, `<=`, `>` and `>=`.
fn eval_comparison(
    left: &Value,
    op: BinaryOperator,
    right: &Value,
) -> Result<Value, ExecutorError> {
    if left.is_null() || right.is_null() {
        return Err(ExecutorError::NullComparison { op: op.as_str() });
    }
    let ord = compare_values(left, right)?;
    let result = match op {
        BinaryOperator::Eq => ord == Ordering::Equal,
        BinaryOperator::Neq => ord != Ordering::Equal,
        BinaryOperator::Lt => ord == Ordering::Less,
        BinaryOperator::LtEq => ord != Ordering::Greater,
        BinaryOperator::Gt => ord == Ordering::Greater,
        _ => ord != Ordering::Less,
    };
    Ok(Value::Boolean(result))
}

/// Compares two non-NULL values, failing on incompatible types.
pub(crate) fn compare_values(left: &Value, right: &Value) -> Result<Ordering, ExecutorError> {
    left.compare(right)
        .ok_or_else(|| ExecutorError::TypeMismatch {
            expected: left.type_name().to_string(),
            found: right.type_name().to_string(),
        })
}

fn float_operands(left: &Value, right: &Value) -> Result<(f64, f64), ExecutorError> {
    let a = left
        .as_f64()
        .ok_or_else(|| ExecutorError::mismatch("numeric", left))?;
    let b = right
        .as_f64()
        .ok_or_else(|| ExecutorError::mismatch("numeric", right))?;
    Ok((a, b))
}

fn concat_text(v: &Value) -> Result<String, ExecutorError> {
    match v {
        Value::Text(s) => Ok(s.clone()),
        Value::Int64(_) | Value::Float64(_) | Value::Boolean(_) => Ok(v.to_string()),
        Value::Null => Err(ExecutorError::mismatch("text", v)),
    }
}

fn escape_char(v: Value) -> Result<Option<char>, ExecutorError> {
    match v {
        Value::Null => Ok(None),
        Value::Text(s) => {
            let mut chars = s.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => Ok(Some(c)),
                _ => Err(ExecutorError::Unsupported(format!(
                    "ESCAPE must be a single character, got '{}'",
                    s
                ))),
            }
        }
        other => Err(ExecutorError::mismatch("text", &other)),
    }
}

/// One element of a compiled LIKE pattern.
#[derive(Clone, Copy, PartialEq)]
enum LikeToken {
    /// `%`
    Any,
    /// `_`
    One,
    Char(char),
}

fn like_tokens(pattern: impl Iterator<Item = char>, escape: Option<char>) -> Vec<LikeToken> {
    let mut tokens = Vec::new();
    let mut escaped = false;
    for c in pattern {
        let token = match c {
            _ if escaped => LikeToken::Char(c),
            _ if Some(c) == escape => {
                escaped = true;
                continue;
            }
            '%' => LikeToken::Any,
            '_' => LikeToken::One,
            _ => LikeToken::Char(c),
        };
        escaped = false;
        tokens.push(token);
    }
    // A trailing escape character matches itself.
    if escaped && let Some(c) = escape {
        tokens.push(LikeToken::Char(c));
    }
    tokens
}

/// LIKE pattern matching with `%` and `_` wildcards.
///
/// Two-pointer matcher that backtracks only to the most recent `%`, so it
/// runs in O(n*m) time.
fn like_match(s: &str, pattern: &str, escape: Option<char>, case_insensitive: bool) -> bool {
    let (s, p): (Vec<char>, Vec<LikeToken>) = if case_insensitive {
        (
            s.to_lowercase().chars().collect(),
            like_tokens(pattern.to_lowercase().chars(), escape),
        )
    } else {
        (s.chars().collect(), like_tokens(pattern.chars(), escape))
    };

    let (mut si, mut pi) = (0, 0);
    // Pattern position after the last `%` and the text position it resumed at.
    let mut star: Option<(usize, usize)> = None;
    while si < s.len() {
        match p.get(pi) {
            Some(LikeToken::Any) => {
                pi += 1;
                star = Some((pi, si));
            }
            Some(LikeToken::One) => {
                si += 1;
                pi += 1;
            }
            Some(LikeToken::Char(c)) if *c == s[si] => {
                si += 1;
                pi += 1;
            }
            _ => match star {
                Some((star_pi, star_si)) => {
                    pi = star_pi;
                    si = star_si + 1;
                    star = Some((star_pi, si));
                }
                None => return false,
            },
        }
    }
    p[pi..].iter().all(|t| *t == LikeToken::Any)
}
