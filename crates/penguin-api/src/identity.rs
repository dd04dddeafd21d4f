//! Request identity: the caller's penguin id and network address.

use std::{convert::Infallible, net::SocketAddr};

use axum::{
  extract::{ConnectInfo, FromRequestParts},
  http::{HeaderMap, HeaderValue, header, request::Parts},
};
use penguin_core::ids::is_valid_penguin_id;

/// Response header announcing a newly allocated penguin id.
pub const SET_PENGUIN_ID_HEADER: &str = "x-penguin-set-penguinid";

const COOKIE_NAME: &str = "userID";
const COOKIE_MAX_AGE_SECS: u64 = 10 * 365 * 24 * 60 * 60;

/// The penguin id a request identifies itself with, if any.
///
/// Read from `Authorization: PenguinID <id>`, falling back to the `userID`
/// cookie. Malformed ids are treated as absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PenguinId(pub Option<String>);

pub fn penguin_id_from_headers(headers: &HeaderMap) -> Option<String> {
  let from_auth = headers
    .get(header::AUTHORIZATION)
    .and_then(|v| v.to_str().ok())
    .and_then(|v| v.strip_prefix("PenguinID "))
    .map(str::trim);
  let from_cookie = || {
    headers
      .get_all(header::COOKIE)
      .iter()
      .filter_map(|v| v.to_str().ok())
      .flat_map(|v| v.split(';'))
      .filter_map(|pair| pair.trim().split_once('='))
      .find(|(name, _)| *name == COOKIE_NAME)
      .map(|(_, value)| value.trim())
  };
  from_auth
    .or_else(from_cookie)
    .filter(|id| is_valid_penguin_id(id))
    .map(str::to_owned)
}

/// `Set-Cookie` value persisting `penguin_id` on the client.
pub fn user_cookie(penguin_id: &str) -> Option<HeaderValue> {
  HeaderValue::from_str(&format!(
    "{COOKIE_NAME}={penguin_id}; Path=/; Max-Age={COOKIE_MAX_AGE_SECS}; SameSite=Lax"
  ))
  .ok()
}

impl<S: Send + Sync> FromRequestParts<S> for PenguinId {
  type Rejection = Infallible;

  async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
    Ok(PenguinId(penguin_id_from_headers(&parts.headers)))
  }
}

/// The client address used for rate limiting and report provenance.
///
/// First hop of `X-Forwarded-For`, then `X-Real-IP`, then the socket peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIp(pub String);

fn normalized_ip(raw: &str) -> Option<&str> {
  let first = raw.split(',').next()?.trim();
  if first.is_empty() || first.len() > 64 {
    return None;
  }
  first
    .bytes()
    .all(|b| b.is_ascii_alphanumeric() || b == b'.' || b == b':' || b == b'-')
    .then_some(first)
}

pub fn client_ip(parts: &Parts) -> String {
  let header_ip = |name: &str| {
    parts
      .headers
      .get(name)
      .and_then(|v| v.to_str().ok())
      .and_then(normalized_ip)
      .map(str::to_owned)
  };
  header_ip("x-forwarded-for")
    .or_else(|| header_ip("x-real-ip"))
    .or_else(|| {
      parts
        .extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
    })
    .unwrap_or_else(|| "unknown".to_owned())
}

impl<S: Send + Sync> FromRequestParts<S> for ClientIp {
  type Rejection = Infallible;

  async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
    Ok(ClientIp(client_ip(parts)))
  }
}
