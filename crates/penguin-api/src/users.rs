//! `POST /users`: log in with an existing penguin id.

use axum::{
  Json,
  extract::State,
  http::{HeaderValue, header},
  response::{IntoResponse, Response},
};
use penguin_core::{ids::is_valid_penguin_id, store::QueryStore};
use serde::{Deserialize, Serialize};

use crate::{ApiState, error::ApiError, identity::user_cookie};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoginBody {
  #[serde(rename = "userID")]
  pub user_id: String,
}

/// Resolves the account and sets the `userID` cookie.
///
/// The body is JSON but labelled `text/plain`, which deployed clients expect.
pub async fn login<S: QueryStore + 'static>(
  State(state): State<ApiState<S>>,
  Json(body): Json<LoginBody>,
) -> Result<Response, ApiError> {
  let id = body.user_id.trim();
  if !is_valid_penguin_id(id) {
    return Err(ApiError::invalid("userID must be a 9-digit penguin id"));
  }
  let account = state
    .store
    .account_by_penguin_id(id)
    .await
    .map_err(ApiError::internal)?
    .ok_or_else(|| ApiError::invalid(format!("user {id} not found")))?;

  let payload = serde_json::to_vec(&LoginBody { user_id: account.penguin_id.clone() })
    .map_err(ApiError::internal)?;
  let mut resp = payload.into_response();
  let headers = resp.headers_mut();
  headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"));
  if let Some(cookie) = user_cookie(&account.penguin_id) {
    headers.insert(header::SET_COOKIE, cookie);
  }
  Ok(resp)
}
