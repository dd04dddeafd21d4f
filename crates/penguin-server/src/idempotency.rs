//! Replays responses of requests carrying an idempotency key.
//!
//! The first successful response for a key is recorded (status, selected
//! headers, body) as CBOR in the key/value store and marked
//! `X-Penguin-Idempotency: saved`. Later requests with the same key get the
//! recording back, marked `hit`, without reaching the handler. A per-key lock
//! serialises concurrent first attempts.

use std::{sync::Arc, time::Duration};

use axum::{
  body::Body,
  extract::{Request, State},
  http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header, response::Parts},
  middleware::Next,
  response::{IntoResponse, Response},
};
use bytes::Bytes;
use penguin_api::{ApiError, FieldViolation, identity::SET_PENGUIN_ID_HEADER};
use penguin_core::kv::KeyValue;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{
  error::{Error, Result},
  lock::Locker,
};

pub const KEY_HEADER: &str = "x-penguin-idempotency-key";
pub const STATUS_HEADER: &str = "x-penguin-idempotency";
pub const MAX_KEY_LEN: usize = 128;

const MAX_BODY_BYTES: usize = 4 * 1024 * 1024;

pub struct Idempotency {
  pub lifetime:     Duration,
  pub key_header:   HeaderName,
  /// Response headers carried into the recording.
  pub keep_headers: Vec<HeaderName>,
  pub kv:           Arc<dyn KeyValue>,
  pub locker:       Arc<dyn Locker>,
}

impl Idempotency {
  /// Keyed on `X-Penguin-Idempotency-Key`, keeping the headers a report
  /// response needs to be replayed faithfully.
  pub fn new(kv: Arc<dyn KeyValue>, locker: Arc<dyn Locker>, lifetime: Duration) -> Self {
    Self {
      lifetime,
      key_header: HeaderName::from_static(KEY_HEADER),
      keep_headers: vec![
        header::CONTENT_TYPE,
        header::SET_COOKIE,
        HeaderName::from_static(SET_PENGUIN_ID_HEADER),
      ],
      kv,
      locker,
    }
  }

  async fn replay(&self, storage_key: &str) -> Result<Option<Response>> {
    let Some(blob) = self.kv.get(storage_key).await? else {
      return Ok(None);
    };
    match Recorded::decode(&blob) {
      Ok(recorded) => Ok(Some(recorded.into_response())),
      Err(e) => {
        tracing::warn!(error = %e, "discarding unreadable idempotency record");
        Ok(None)
      }
    }
  }
}

/// KV key of an idempotency key; hashed so arbitrary client input stays out
/// of the key space.
pub fn storage_key(key: &str) -> String {
  format!("idempotency:{}", hex::encode(Sha256::digest(key.as_bytes())))
}

// ─── Recording ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Recorded {
  status:  u16,
  headers: Vec<(String, Bytes)>,
  body:    Bytes,
}

impl Recorded {
  fn capture(parts: &Parts, body: Bytes, keep: &[HeaderName]) -> Self {
    let headers = parts
      .headers
      .iter()
      .filter(|(name, _)| keep.contains(name))
      .map(|(name, value)| (name.as_str().to_owned(), Bytes::copy_from_slice(value.as_bytes())))
      .collect();
    Self { status: parts.status.as_u16(), headers, body }
  }

  fn encode(&self) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::into_writer(self, &mut buf).map_err(|e| Error::Codec(e.to_string()))?;
    Ok(buf)
  }

  fn decode(blob: &[u8]) -> Result<Self> {
    ciborium::from_reader(blob).map_err(|e| Error::Codec(e.to_string()))
  }
}

impl IntoResponse for Recorded {
  fn into_response(self) -> Response {
    let mut headers = HeaderMap::new();
    for (name, value) in self.headers {
      if let (Ok(name), Ok(value)) =
        (HeaderName::try_from(name), HeaderValue::from_bytes(&value))
      {
        headers.append(name, value);
      }
    }
    headers.insert(STATUS_HEADER, HeaderValue::from_static("hit"));
    let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::OK);
    (status, headers, Body::from(self.body)).into_response()
  }
}

// ─── Middleware ──────────────────────────────────────────────────────────────

pub async fn idempotency(
  State(config): State<Arc<Idempotency>>,
  req: Request,
  next: Next,
) -> Response {
  match run(&config, req, next).await {
    Ok(resp) => resp,
    Err(e) => e.into_response(),
  }
}

async fn run(config: &Idempotency, req: Request, next: Next) -> Result<Response, ApiError> {
  let Some(raw) = req.headers().get(&config.key_header) else {
    return Ok(next.run(req).await);
  };
  let key = raw
    .to_str()
    .ok()
    .map(str::trim)
    .filter(|k| !k.is_empty() && k.len() <= MAX_KEY_LEN)
    .ok_or_else(|| {
      ApiError::violations(vec![FieldViolation::new(
        config.key_header.as_str(),
        "max",
        format!("idempotency key must be 1 to {MAX_KEY_LEN} printable characters"),
      )])
    })?;
  let storage_key = storage_key(key);

  if let Some(hit) = config.replay(&storage_key).await? {
    return Ok(hit);
  }
  let _guard = config.locker.lock(&storage_key).await?;
  if let Some(hit) = config.replay(&storage_key).await? {
    return Ok(hit);
  }

  let resp = next.run(req).await;
  if !resp.status().is_success() {
    return Ok(resp);
  }

  let (mut parts, body) = resp.into_parts();
  let body = axum::body::to_bytes(body, MAX_BODY_BYTES)
    .await
    .map_err(ApiError::internal)?;
  let recorded = Recorded::capture(&parts, body.clone(), &config.keep_headers);
  let stored = match recorded.encode() {
    Ok(blob) => config.kv.set(&storage_key, blob, config.lifetime).await.map_err(Error::from),
    Err(e) => Err(e),
  };
  match stored {
    Ok(()) => {
      parts.headers.insert(STATUS_HEADER, HeaderValue::from_static("saved"));
    }
    Err(e) => tracing::error!(error = %e, "failed to record idempotent response"),
  }
  Ok(Response::from_parts(parts, Body::from(body)))
}

#[cfg(test)]
mod tests {
  use std::sync::atomic::{AtomicUsize, Ordering};

  use axum::{Router, http::StatusCode, middleware::from_fn_with_state, routing::post};
  use penguin_store_sqlite::{SqliteKv, SqliteStore};
  use tower::ServiceExt as _;

  use super::*;
  use crate::lock::LocalLocker;

  async fn app(counter: Arc<AtomicUsize>) -> Router {
    let store = SqliteStore::open_in_memory().await.unwrap();
    let config = Arc::new(Idempotency::new(
      Arc::new(SqliteKv::new(&store)),
      Arc::new(LocalLocker::new()),
      Duration::from_secs(60),
    ));
    let handler = move |body: String| {
      let counter = Arc::clone(&counter);
      async move {
        let n = counter.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        if body == "fail" {
          return (StatusCode::BAD_REQUEST, "nope").into_response();
        }
        ([("x-trace", "t"), ("content-type", "application/json")], format!("{{\"n\":{n}}}"))
          .into_response()
      }
    };
    Router::new()
      .route("/report", post(handler))
      .layer(from_fn_with_state(config, idempotency))
  }

  async fn call(app: &Router, key: Option<&str>, body: &'static str) -> Response {
    let mut req = Request::builder().method("POST").uri("/report");
    if let Some(key) = key {
      req = req.header(KEY_HEADER, key);
    }
    app.clone().oneshot(req.body(Body::from(body)).unwrap()).await.unwrap()
  }

  async fn body(resp: Response) -> Bytes {
    axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap()
  }

  #[tokio::test]
  async fn requests_without_key_pass_through() {
    let counter = Arc::new(AtomicUsize::new(0));
    let app = app(Arc::clone(&counter)).await;
    for _ in 0..2 {
      let resp = call(&app, None, "").await;
      assert!(!resp.headers().contains_key(STATUS_HEADER));
    }
    assert_eq!(counter.load(Ordering::SeqCst), 2);
  }

  #[tokio::test]
  async fn second_request_replays_the_first() {
    let counter = Arc::new(AtomicUsize::new(0));
    let app = app(Arc::clone(&counter)).await;

    let first = call(&app, Some("k1"), "").await;
    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(first.headers()[STATUS_HEADER], "saved");
    assert_eq!(first.headers()["x-trace"], "t");
    let first_body = body(first).await;

    let second = call(&app, Some("k1"), "").await;
    assert_eq!(second.status(), StatusCode::OK);
    assert_eq!(second.headers()[STATUS_HEADER], "hit");
    assert_eq!(second.headers()[header::CONTENT_TYPE], "application/json");
    assert!(!second.headers().contains_key("x-trace"));
    assert_eq!(body(second).await, first_body);

    assert_eq!(counter.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn failures_are_not_recorded() {
    let counter = Arc::new(AtomicUsize::new(0));
    let app = app(Arc::clone(&counter)).await;
    for _ in 0..2 {
      let resp = call(&app, Some("k2"), "fail").await;
      assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
      assert!(!resp.headers().contains_key(STATUS_HEADER));
    }
    assert_eq!(counter.load(Ordering::SeqCst), 2);
  }

  #[tokio::test]
  async fn oversized_keys_are_rejected() {
    let counter = Arc::new(AtomicUsize::new(0));
    let app = app(Arc::clone(&counter)).await;
    let key = "k".repeat(MAX_KEY_LEN + 1);
    let resp = call(&app, Some(&key), "").await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(counter.load(Ordering::SeqCst), 0);
  }

  #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
  async fn concurrent_duplicates_reach_the_handler_once() {
    let counter = Arc::new(AtomicUsize::new(0));
    let app = app(Arc::clone(&counter)).await;
    let calls: Vec<_> = (0..8)
      .map(|_| {
        let app = app.clone();
        tokio::spawn(async move { call(&app, Some("race"), "").await })
      })
      .collect();

    let mut markers = Vec::new();
    for c in calls {
      let resp = c.await.unwrap();
      markers.push(resp.headers()[STATUS_HEADER].to_str().unwrap().to_owned());
    }
    assert_eq!(counter.load(Ordering::SeqCst), 1);
    assert_eq!(markers.iter().filter(|m| *m == "saved").count(), 1);
    assert_eq!(markers.iter().filter(|m| *m == "hit").count(), 7);
  }

  #[test]
  fn storage_keys_are_hashed() {
    let k = storage_key("k1");
    assert!(k.starts_with("idempotency:"));
    assert_eq!(k.len(), "idempotency:".len() + 64);
    assert_ne!(k, storage_key("k2"));
  }
}
