//! Response-level caching headers.

use axum::{
  Json,
  http::{HeaderMap, HeaderValue, header},
  response::{IntoResponse, Response},
};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

/// `max-age` of shim responses.
pub const SHIM_MAX_AGE_SECS: i64 = 60 * 60;
/// `max-age` of immutable responses (incremental patches).
pub const IMMUTABLE_MAX_AGE_SECS: i64 = 365 * 24 * 60 * 60;

/// RFC 1123 rendering used by `Last-Modified` and `Expires`.
pub fn http_date(t: DateTime<Utc>) -> String {
  t.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

pub fn set_cache_headers(
  headers: &mut HeaderMap,
  last_modified: Option<DateTime<Utc>>,
  max_age_secs: i64,
) {
  let pairs = [
    (header::CACHE_CONTROL, format!("public, max-age={max_age_secs}")),
    (header::EXPIRES, http_date(Utc::now() + Duration::seconds(max_age_secs))),
  ];
  for (name, value) in pairs {
    if let Ok(v) = HeaderValue::from_str(&value) {
      headers.insert(name, v);
    }
  }
  if let Some(v) = last_modified.and_then(|t| HeaderValue::from_str(&http_date(t)).ok()) {
    headers.insert(header::LAST_MODIFIED, v);
  }
}

/// A JSON body served with public caching headers.
#[derive(Debug)]
pub struct Cached<T> {
  pub value:         T,
  pub last_modified: DateTime<Utc>,
  pub max_age_secs:  i64,
}

impl<T> Cached<T> {
  pub fn shim(value: T, last_modified: DateTime<Utc>) -> Self {
    Self { value, last_modified, max_age_secs: SHIM_MAX_AGE_SECS }
  }

  pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Cached<U> {
    Cached { value: f(self.value), last_modified: self.last_modified, max_age_secs: self.max_age_secs }
  }
}

impl<T: Serialize> IntoResponse for Cached<T> {
  fn into_response(self) -> Response {
    let mut resp = Json(self.value).into_response();
    set_cache_headers(resp.headers_mut(), Some(self.last_modified), self.max_age_secs);
    resp
  }
}
