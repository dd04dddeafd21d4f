//! HTTP Basic auth for the administrative routes.

use std::sync::Arc;

use argon2::{Argon2, PasswordHash, PasswordVerifier};
use axum::{
  extract::{Request, State},
  http::{HeaderMap, header},
  middleware::Next,
  response::{IntoResponse, Response},
};
use base64::{Engine as _, engine::general_purpose::STANDARD as B64};

use crate::error::Error;

/// Admin credentials. Admin routes are open while no hash is configured.
#[derive(Debug, Clone, Default)]
pub struct AdminAuth {
  pub username:      Option<String>,
  /// PHC string produced by argon2, e.g. `$argon2id$v=19$…`
  pub password_hash: Option<String>,
}

impl AdminAuth {
  pub fn is_enabled(&self) -> bool { self.password_hash.is_some() }
}

/// Verify `Authorization: Basic` credentials against `auth`.
pub fn verify_auth(headers: &HeaderMap, auth: &AdminAuth) -> Result<(), Error> {
  let Some(hash) = &auth.password_hash else {
    return Ok(());
  };

  let header_val = headers
    .get(header::AUTHORIZATION)
    .and_then(|v| v.to_str().ok())
    .ok_or(Error::Unauthorized)?;
  let encoded = header_val.strip_prefix("Basic ").ok_or(Error::Unauthorized)?;

  let decoded = B64.decode(encoded).map_err(|_| Error::Unauthorized)?;
  let creds = std::str::from_utf8(&decoded).map_err(|_| Error::Unauthorized)?;
  let (username, password) = creds.split_once(':').ok_or(Error::Unauthorized)?;

  if auth.username.as_deref().is_some_and(|expected| expected != username) {
    return Err(Error::Unauthorized);
  }

  let parsed_hash = PasswordHash::new(hash).map_err(|_| Error::Unauthorized)?;
  Argon2::default()
    .verify_password(password.as_bytes(), &parsed_hash)
    .map_err(|_| Error::Unauthorized)
}

pub async fn require_admin(
  State(auth): State<Arc<AdminAuth>>,
  req: Request,
  next: Next,
) -> Response {
  match verify_auth(req.headers(), &auth) {
    Ok(()) => next.run(req).await,
    Err(e) => {
      tracing::warn!(path = %req.uri().path(), "admin request rejected");
      e.into_response()
    }
  }
}

#[cfg(test)]
mod tests {
  use argon2::{PasswordHasher, password_hash::SaltString};
  use axum::http::HeaderValue;
  use rand_core::OsRng;

  use super::*;

  fn auth(password: &str) -> AdminAuth {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default().hash_password(password.as_bytes(), &salt).unwrap().to_string();
    AdminAuth { username: Some("admin".into()), password_hash: Some(hash) }
  }

  fn basic(user: &str, pass: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    let encoded = B64.encode(format!("{user}:{pass}"));
    headers.insert(header::AUTHORIZATION, HeaderValue::from_str(&format!("Basic {encoded}")).unwrap());
    headers
  }

  #[test]
  fn correct_credentials() {
    assert!(verify_auth(&basic("admin", "secret"), &auth("secret")).is_ok());
  }

  #[test]
  fn wrong_password_or_user() {
    let auth = auth("secret");
    assert!(matches!(verify_auth(&basic("admin", "wrong"), &auth), Err(Error::Unauthorized)));
    assert!(matches!(verify_auth(&basic("root", "secret"), &auth), Err(Error::Unauthorized)));
  }

  #[test]
  fn missing_or_malformed_header() {
    let auth = auth("secret");
    assert!(matches!(verify_auth(&HeaderMap::new(), &auth), Err(Error::Unauthorized)));
    let mut headers = HeaderMap::new();
    headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic !!!not-base64!!!"));
    assert!(matches!(verify_auth(&headers, &auth), Err(Error::Unauthorized)));
  }

  #[test]
  fn open_without_hash() {
    assert!(verify_auth(&HeaderMap::new(), &AdminAuth::default()).is_ok());
  }
}
