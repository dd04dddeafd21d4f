//! Runtime values of the rule language.

use std::{cmp::Ordering, collections::BTreeMap, fmt};

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
  Null,
  Bool(bool),
  Int(i64),
  Float(f64),
  Str(String),
  List(Vec<Value>),
  Map(BTreeMap<String, Value>),
}

impl Value {
  pub fn type_name(&self) -> &'static str {
    match self {
      Self::Null => "null",
      Self::Bool(_) => "bool",
      Self::Int(_) => "int",
      Self::Float(_) => "float",
      Self::Str(_) => "string",
      Self::List(_) => "list",
      Self::Map(_) => "map",
    }
  }

  fn as_f64(&self) -> Option<f64> {
    match self {
      Self::Int(n) => Some(*n as f64),
      Self::Float(f) => Some(*f),
      _ => None,
    }
  }

  /// Equality with ints and floats compared numerically.
  pub fn loose_eq(&self, other: &Self) -> bool {
    match (self, other) {
      (Self::Int(a), Self::Int(b)) => a == b,
      (Self::Int(_) | Self::Float(_), Self::Int(_) | Self::Float(_)) => {
        self.as_f64() == other.as_f64()
      }
      (Self::List(a), Self::List(b)) => {
        a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.loose_eq(y))
      }
      (Self::Map(a), Self::Map(b)) => {
        a.len() == b.len()
          && a.iter().all(|(k, v)| b.get(k).is_some_and(|w| v.loose_eq(w)))
      }
      _ => self == other,
    }
  }

  /// Ordering for numbers and strings; `None` for anything else.
  pub fn compare(&self, other: &Self) -> Option<Ordering> {
    match (self, other) {
      (Self::Int(a), Self::Int(b)) => Some(a.cmp(b)),
      (Self::Str(a), Self::Str(b)) => Some(a.cmp(b)),
      _ => self.as_f64()?.partial_cmp(&other.as_f64()?),
    }
  }
}

impl fmt::Display for Value {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Null => f.write_str("null"),
      Self::Bool(b) => write!(f, "{b}"),
      Self::Int(n) => write!(f, "{n}"),
      Self::Float(x) => write!(f, "{x}"),
      Self::Str(s) => write!(f, "{s:?}"),
      Self::List(items) => write!(f, "list({})", items.len()),
      Self::Map(m) => write!(f, "map({})", m.len()),
    }
  }
}

impl From<serde_json::Value> for Value {
  fn from(v: serde_json::Value) -> Self {
    match v {
      serde_json::Value::Null => Self::Null,
      serde_json::Value::Bool(b) => Self::Bool(b),
      serde_json::Value::Number(n) => match n.as_i64() {
        Some(i) => Self::Int(i),
        None => Self::Float(n.as_f64().unwrap_or(f64::NAN)),
      },
      serde_json::Value::String(s) => Self::Str(s),
      serde_json::Value::Array(items) => Self::List(items.into_iter().map(Self::from).collect()),
      serde_json::Value::Object(map) => {
        Self::Map(map.into_iter().map(|(k, v)| (k, Self::from(v))).collect())
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;

  #[test]
  fn ints_and_floats_compare_numerically() {
    assert!(Value::Int(2).loose_eq(&Value::Float(2.0)));
    assert_eq!(Value::Int(1).compare(&Value::Float(1.5)), Some(Ordering::Less));
    assert_eq!(Value::Str("a".into()).compare(&Value::Int(1)), None);
  }

  #[test]
  fn json_numbers_prefer_int() {
    assert_eq!(Value::from(json!(3)), Value::Int(3));
    assert_eq!(Value::from(json!(3.5)), Value::Float(3.5));
    let Value::Map(m) = Value::from(json!({"a": [1, null]})) else {
      panic!("expected map");
    };
    assert_eq!(m["a"], Value::List(vec![Value::Int(1), Value::Null]));
  }
}
