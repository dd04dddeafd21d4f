//! Query-string helpers shared by the handlers.

use penguin_core::model::{Server, SourceCategory};

use crate::error::{ApiError, FieldViolation};

/// `server`, defaulting to CN.
pub fn server(raw: Option<&str>) -> Result<Server, ApiError> {
  match raw {
    None | Some("") => Ok(Server::Cn),
    Some(s) => Server::parse(s).map_err(|e| {
      ApiError::violations(vec![FieldViolation::new("server", "oneof", e.to_string())])
    }),
  }
}

/// Source category, defaulting to `all`.
pub fn category(raw: Option<&str>) -> Result<SourceCategory, ApiError> {
  match raw {
    None | Some("") => Ok(SourceCategory::All),
    Some(s) => SourceCategory::parse(s).map_err(|e| {
      ApiError::violations(vec![FieldViolation::new("category", "oneof", e.to_string())])
    }),
  }
}

/// A comma-separated list; `None` when absent or blank.
pub fn list(raw: Option<&str>) -> Option<Vec<String>> {
  let items: Vec<String> = raw?
    .split(',')
    .map(str::trim)
    .filter(|s| !s.is_empty())
    .map(str::to_owned)
    .collect();
  (!items.is_empty()).then_some(items)
}
