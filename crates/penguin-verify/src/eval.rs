//! Tree-walking evaluator.

use std::{cmp::Ordering, collections::BTreeMap};

use crate::{
  error::{Error, Result},
  parse::{BinaryOp, Expr, UnaryOp},
  value::Value,
};

/// Top-level variables visible to an expression.
#[derive(Debug, Clone, Default)]
pub struct Context {
  vars: BTreeMap<String, Value>,
}

impl Context {
  pub fn new() -> Self { Self::default() }

  pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
    self.vars.insert(name.into(), value.into());
    self
  }
}

pub(crate) fn eval(expr: &Expr, ctx: &Context) -> Result<Value> {
  match expr {
    Expr::Literal(v) => Ok(v.clone()),
    Expr::Ident(name) => ctx
      .vars
      .get(name)
      .cloned()
      .ok_or_else(|| Error::UnknownIdentifier(name.clone())),
    Expr::Member(base, field) => match eval(base, ctx)? {
      // Absent fields and fields of absent values read as null.
      Value::Map(mut m) => Ok(m.remove(field).unwrap_or(Value::Null)),
      Value::Null => Ok(Value::Null),
      other => Err(Error::Type(format!("cannot read .{field} of {}", other.type_name()))),
    },
    Expr::Index(base, index) => index_into(eval(base, ctx)?, eval(index, ctx)?),
    Expr::List(items) => Ok(Value::List(
      items.iter().map(|e| eval(e, ctx)).collect::<Result<_>>()?,
    )),
    Expr::Call(name, args) => {
      let args = args.iter().map(|e| eval(e, ctx)).collect::<Result<Vec<_>>>()?;
      call(name, args)
    }
    Expr::Unary(op, inner) => match (op, eval(inner, ctx)?) {
      (UnaryOp::Not, Value::Bool(b)) => Ok(Value::Bool(!b)),
      (UnaryOp::Neg, Value::Int(n)) => Ok(Value::Int(-n)),
      (UnaryOp::Neg, Value::Float(f)) => Ok(Value::Float(-f)),
      (op, v) => Err(Error::Type(format!("cannot apply {op:?} to {}", v.type_name()))),
    },
    Expr::Binary(BinaryOp::And, lhs, rhs) => {
      if !truthy(&eval(lhs, ctx)?)? {
        return Ok(Value::Bool(false));
      }
      Ok(Value::Bool(truthy(&eval(rhs, ctx)?)?))
    }
    Expr::Binary(BinaryOp::Or, lhs, rhs) => {
      if truthy(&eval(lhs, ctx)?)? {
        return Ok(Value::Bool(true));
      }
      Ok(Value::Bool(truthy(&eval(rhs, ctx)?)?))
    }
    Expr::Binary(op, lhs, rhs) => binary(*op, eval(lhs, ctx)?, eval(rhs, ctx)?),
  }
}

pub(crate) fn truthy(v: &Value) -> Result<bool> {
  match v {
    Value::Bool(b) => Ok(*b),
    other => Err(Error::NotBoolean(other.type_name().to_owned())),
  }
}

fn index_into(base: Value, index: Value) -> Result<Value> {
  match (base, index) {
    (Value::List(mut items), Value::Int(i)) => {
      let len = items.len() as i64;
      let i = if i < 0 { len + i } else { i };
      if (0..len).contains(&i) {
        Ok(items.swap_remove(i as usize))
      } else {
        Err(Error::Type(format!("index {i} out of range for list of {len}")))
      }
    }
    (Value::Map(mut m), Value::Str(k)) => Ok(m.remove(&k).unwrap_or(Value::Null)),
    (Value::Null, _) => Ok(Value::Null),
    (b, i) => Err(Error::Type(format!(
      "cannot index {} with {}",
      b.type_name(),
      i.type_name()
    ))),
  }
}

fn binary(op: BinaryOp, lhs: Value, rhs: Value) -> Result<Value> {
  let ordered = |want: fn(Ordering) -> bool| -> Result<Value> {
    lhs
      .compare(&rhs)
      .map(|o| Value::Bool(want(o)))
      .ok_or_else(|| {
        Error::Type(format!("cannot compare {} with {}", lhs.type_name(), rhs.type_name()))
      })
  };
  match op {
    BinaryOp::Eq => Ok(Value::Bool(lhs.loose_eq(&rhs))),
    BinaryOp::Ne => Ok(Value::Bool(!lhs.loose_eq(&rhs))),
    BinaryOp::Lt => ordered(Ordering::is_lt),
    BinaryOp::Le => ordered(Ordering::is_le),
    BinaryOp::Gt => ordered(Ordering::is_gt),
    BinaryOp::Ge => ordered(Ordering::is_ge),
    BinaryOp::In => contains(&rhs, &lhs).map(Value::Bool),
    BinaryOp::NotIn => contains(&rhs, &lhs).map(|b| Value::Bool(!b)),
    BinaryOp::And => Ok(Value::Bool(truthy(&lhs)? && truthy(&rhs)?)),
    BinaryOp::Or => Ok(Value::Bool(truthy(&lhs)? || truthy(&rhs)?)),
  }
}

/// `needle in haystack`.
fn contains(haystack: &Value, needle: &Value) -> Result<bool> {
  match (haystack, needle) {
    (Value::List(items), n) => Ok(items.iter().any(|v| v.loose_eq(n))),
    (Value::Map(m), Value::Str(k)) => Ok(m.contains_key(k)),
    (Value::Str(s), Value::Str(sub)) => Ok(s.contains(sub.as_str())),
    (Value::Null, _) => Ok(false),
    (h, n) => Err(Error::Type(format!(
      "cannot test {} in {}",
      n.type_name(),
      h.type_name()
    ))),
  }
}

fn call(name: &str, args: Vec<Value>) -> Result<Value> {
  let arity = |n: usize| -> Result<()> {
    if args.len() == n {
      Ok(())
    } else {
      Err(Error::Type(format!("{name}() takes {n} argument(s), got {}", args.len())))
    }
  };
  match name {
    "len" => {
      arity(1)?;
      match &args[0] {
        Value::Str(s) => Ok(Value::Int(s.chars().count() as i64)),
        Value::List(l) => Ok(Value::Int(l.len() as i64)),
        Value::Map(m) => Ok(Value::Int(m.len() as i64)),
        Value::Null => Ok(Value::Int(0)),
        other => Err(Error::Type(format!("len() of {}", other.type_name()))),
      }
    }
    "contains" => {
      arity(2)?;
      contains(&args[0], &args[1]).map(Value::Bool)
    }
    "startsWith" | "endsWith" => {
      arity(2)?;
      match (&args[0], &args[1]) {
        (Value::Str(s), Value::Str(p)) => Ok(Value::Bool(if name == "startsWith" {
          s.starts_with(p.as_str())
        } else {
          s.ends_with(p.as_str())
        })),
        (Value::Null, _) => Ok(Value::Bool(false)),
        (a, b) => Err(Error::Type(format!(
          "{name}() of {} and {}",
          a.type_name(),
          b.type_name()
        ))),
      }
    }
    "lower" => {
      arity(1)?;
      match &args[0] {
        Value::Str(s) => Ok(Value::Str(s.to_lowercase())),
        other => Err(Error::Type(format!("lower() of {}", other.type_name()))),
      }
    }
    _ => Err(Error::UnknownFunction(name.to_owned())),
  }
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;
  use crate::{lex::tokenize, parse::Parser};

  fn run(src: &str) -> Result<Value> {
    let ctx = Context::new()
      .with(
        "Report",
        json!({
          "arkStageId": "main_01-07",
          "times": 1,
          "drops": [
            {"dropType": "REGULAR", "itemId": 30012, "quantity": 2},
            {"dropType": "EXTRA", "itemId": 2001, "quantity": 1}
          ],
          "metadata": {"md5": null}
        }),
      )
      .with("Task", json!({"source": "MeoAssistant", "version": "v4.0.0", "accountId": 7}));
    eval(&Parser::new(tokenize(src)?).parse()?, &ctx)
  }

  #[test]
  fn field_access_and_comparison() {
    assert_eq!(run("Report.times == 1"), Ok(Value::Bool(true)));
    assert_eq!(run("Report.drops[0].quantity >= 2"), Ok(Value::Bool(true)));
    assert_eq!(run("Report.drops[-1].itemId"), Ok(Value::Int(2001)));
    assert_eq!(run("Task.accountId < 7.5"), Ok(Value::Bool(true)));
  }

  #[test]
  fn membership() {
    assert_eq!(
      run("Report.arkStageId in ['main_01-07', 'main_01-08']"),
      Ok(Value::Bool(true))
    );
    assert_eq!(run("Task.source not in ['MeoAssistant']"), Ok(Value::Bool(false)));
    assert_eq!(run("'Assist' in Task.source"), Ok(Value::Bool(true)));
    assert_eq!(run("'md5' in Report.metadata"), Ok(Value::Bool(true)));
  }

  #[test]
  fn functions() {
    assert_eq!(run("len(Report.drops) == 2"), Ok(Value::Bool(true)));
    assert_eq!(run("startsWith(Task.version, 'v4')"), Ok(Value::Bool(true)));
    assert_eq!(run("endsWith(lower(Task.source), 'assistant')"), Ok(Value::Bool(true)));
    assert_eq!(run("contains([1, 2], 2)"), Ok(Value::Bool(true)));
    assert!(matches!(run("nope(1)"), Err(Error::UnknownFunction(_))));
  }

  #[test]
  fn boolean_combinators_short_circuit() {
    // The right-hand side would be a type error if evaluated.
    assert_eq!(run("false && Report.times > 'x'"), Ok(Value::Bool(false)));
    assert_eq!(run("true or Report.times > 'x'"), Ok(Value::Bool(true)));
    assert_eq!(run("!(Report.times > 1)"), Ok(Value::Bool(true)));
  }

  #[test]
  fn missing_fields_read_as_null() {
    assert_eq!(run("Report.metadata.md5 == null"), Ok(Value::Bool(true)));
    assert_eq!(run("Report.nothing.deeper"), Ok(Value::Null));
  }

  #[test]
  fn errors() {
    assert!(matches!(run("Unknown.x"), Err(Error::UnknownIdentifier(_))));
    assert!(matches!(run("Report.times > 'x'"), Err(Error::Type(_))));
    assert!(matches!(run("Report.drops[5]"), Err(Error::Type(_))));
    assert!(matches!(run("1 && true"), Err(Error::NotBoolean(_))));
  }
}
