//! Report verification for Penguin.
//!
//! Two halves:
//!
//! - a small sandboxed expression language for reject rules ([`Rule`]):
//!   field access on `Report` and `Task`, comparisons, `in` / `not in`, a few
//!   string and collection functions, and boolean combinators;
//! - the ordered [`Pipeline`] of [`Verifier`]s that turns a task into
//!   per-report [`Violations`](penguin_core::report::Violations).
//!
//! Verification never rejects a task outright. Each report gets a
//! reliability; the worker persists it either way.
//!
//! # Quick start
//!
//! ```
//! use penguin_verify::{Context, Rule};
//! use serde_json::json;
//!
//! let rule = Rule::compile("Report.times > 1 && Task.source == 'x'").unwrap();
//! let ctx = Context::new()
//!   .with("Report", json!({"times": 3}))
//!   .with("Task", json!({"source": "x"}));
//! assert!(rule.matches(&ctx).unwrap());
//! ```

pub mod error;
mod eval;
mod lex;
mod parse;
pub mod pipeline;
mod value;
pub mod verifiers;

pub use error::{Error, Result};
pub use eval::Context;
pub use parse::{BinaryOp, Expr, UnaryOp};
pub use pipeline::{Pipeline, Verifier};
pub use value::Value;

/// A compiled reject-rule expression.
#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
  expr: Expr,
}

impl Rule {
  pub fn compile(src: &str) -> Result<Self> {
    let tokens = lex::tokenize(src)?;
    let expr = parse::Parser::new(tokens).parse()?;
    Ok(Self { expr })
  }

  pub fn expr(&self) -> &Expr { &self.expr }

  /// Evaluate against `ctx`. Anything but a boolean result is an error.
  pub fn matches(&self, ctx: &Context) -> Result<bool> {
    eval::truthy(&eval::eval(&self.expr, ctx)?)
  }
}
