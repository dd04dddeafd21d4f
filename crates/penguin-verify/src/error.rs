//! Error types for the reject-rule expression language.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
  #[error("unexpected character {ch:?} at {pos}")]
  UnexpectedChar { pos: usize, ch: char },

  #[error("unterminated string starting at {0}")]
  UnterminatedString(usize),

  #[error("invalid number {0:?}")]
  InvalidNumber(String),

  #[error("syntax error at {pos}: {message}")]
  Syntax { pos: usize, message: String },

  #[error("unknown identifier {0:?}")]
  UnknownIdentifier(String),

  #[error("unknown function {0:?}")]
  UnknownFunction(String),

  #[error("type error: {0}")]
  Type(String),

  #[error("expression evaluated to {0}, not a boolean")]
  NotBoolean(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
