//! Ingestion front-end and process assembly for Penguin.
//!
//! Builds the complete HTTP surface: the read-side routers of
//! [`penguin_api`], the ingestion routes behind the idempotency middleware
//! and a per-client rate limiter, and the admin routes behind Basic auth.
//! Accepted reports travel over the [`bus`] to the [`worker`]s.
//!
//! | Prefix | Routes |
//! |--------|--------|
//! | `/PenguinStats/api/v2` | results, catalog, `/advanced`, `/users`, `/report*` |
//! | `/api/v3/incremental` | snapshot versions and patches |
//! | `/api/_/admin` | `/purge` |

pub mod auth;
pub mod bus;
pub mod config;
pub mod crypto;
pub mod error;
pub mod handlers;
pub mod idempotency;
pub mod lock;
pub mod validate;
pub mod worker;

pub use config::ServerConfig;
pub use error::{Error, Result};

use std::{sync::Arc, time::Duration};

use axum::{
  Router,
  extract::{Request, State},
  http::{HeaderName, HeaderValue},
  middleware::{Next, from_fn_with_state, map_response},
  response::{IntoResponse, Response},
  routing::post,
};
use penguin_api::{ApiState, Caches, RateLimiter, identity::ClientIp};
use penguin_core::{
  kv::KeyValue,
  store::{QueryStore, ReportStore},
};
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use auth::{AdminAuth, require_admin};
use bus::MessageBus;
use crypto::RecognitionKeys;
use handlers::{recall, recognition, report};
use idempotency::Idempotency;
use lock::LocalLocker;

pub const COMPATIBLE_HEADER: &str = "x-penguin-compatible";
pub const COMPATIBLE_VERSION: &str = "frontend-v2@v3.4.0";

/// Bound on the handling of any request.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(6);

// ─── Application state ────────────────────────────────────────────────────────

/// Shared state of the ingestion handlers, plus everything the router wires
/// into the read side.
pub struct AppState<S> {
  pub store:          Arc<S>,
  pub kv:             Arc<dyn KeyValue>,
  pub bus:            Arc<dyn MessageBus>,
  pub keys:           Arc<RecognitionKeys>,
  pub caches:         Arc<Caches>,
  pub api:            ApiState<S>,
  pub report_limiter: Arc<RateLimiter>,
  pub idempotency:    Arc<Idempotency>,
  pub admin:          Arc<AdminAuth>,
  pub config:         Arc<ServerConfig>,
}

impl<S> Clone for AppState<S> {
  fn clone(&self) -> Self {
    Self {
      store:          Arc::clone(&self.store),
      kv:             Arc::clone(&self.kv),
      bus:            Arc::clone(&self.bus),
      keys:           Arc::clone(&self.keys),
      caches:         Arc::clone(&self.caches),
      api:            self.api.clone(),
      report_limiter: Arc::clone(&self.report_limiter),
      idempotency:    Arc::clone(&self.idempotency),
      admin:          Arc::clone(&self.admin),
      config:         Arc::clone(&self.config),
    }
  }
}

impl<S> AppState<S> {
  pub fn new(
    store: Arc<S>,
    kv: Arc<dyn KeyValue>,
    bus: Arc<dyn MessageBus>,
    keys: RecognitionKeys,
    config: ServerConfig,
  ) -> Self {
    let idempotency = Idempotency::new(
      Arc::clone(&kv),
      Arc::new(LocalLocker::new()),
      config.idempotency_lifetime(),
    );
    let caches = Arc::new(Caches::new());
    let api = ApiState::new(Arc::clone(&store), Arc::clone(&caches), config.api());
    Self {
      store,
      kv,
      bus,
      keys: Arc::new(keys),
      caches,
      api,
      report_limiter: Arc::new(RateLimiter::new("report", config.report_rate_limit)),
      idempotency: Arc::new(idempotency),
      admin: Arc::new(AdminAuth {
        username:      config.admin_username.clone(),
        password_hash: config.admin_password_hash.clone(),
      }),
      config: Arc::new(config),
    }
  }

  /// Every per-client rate limiter; their idle buckets need periodic sweeps.
  pub fn limiters(&self) -> [Arc<RateLimiter>; 2] {
    [Arc::clone(&self.report_limiter), Arc::clone(&self.api.advanced_limiter)]
  }
}

// ─── Middleware ──────────────────────────────────────────────────────────────

async fn compatible(mut resp: Response) -> Response {
  resp.headers_mut().insert(
    HeaderName::from_static(COMPATIBLE_HEADER),
    HeaderValue::from_static(COMPATIBLE_VERSION),
  );
  resp
}

async fn report_rate_limit(
  State(limiter): State<Arc<RateLimiter>>,
  ClientIp(ip): ClientIp,
  req: Request,
  next: Next,
) -> Response {
  match limiter.check(&ip) {
    Ok(()) => next.run(req).await,
    Err(e) => e.into_response(),
  }
}

// ─── Router ───────────────────────────────────────────────────────────────────

fn ingestion_router<S>(state: AppState<S>) -> Router<()>
where
  S: ReportStore + 'static,
{
  Router::new()
    .route("/report", post(report::handler::<S>))
    .route("/report/recognition", post(recognition::handler::<S>))
    .layer(from_fn_with_state(Arc::clone(&state.idempotency), idempotency::idempotency))
    .route("/report/recall", post(recall::handler::<S>))
    .route_layer(from_fn_with_state(Arc::clone(&state.report_limiter), report_rate_limit))
    .with_state(state)
}

/// Build the full application router.
pub fn router<S>(state: AppState<S>) -> Router
where
  S: ReportStore + QueryStore + 'static,
{
  let v2 = penguin_api::api_router(state.api.clone())
    .merge(ingestion_router(state.clone()))
    .layer(map_response(compatible));
  let admin = penguin_api::admin_router(Arc::clone(&state.caches))
    .layer(from_fn_with_state(Arc::clone(&state.admin), require_admin));

  Router::new()
    .nest("/PenguinStats/api/v2", v2)
    .nest("/api/v3/incremental", penguin_api::incremental_router(Arc::clone(&state.store)))
    .nest("/api/_/admin", admin)
    .layer(TraceLayer::new_for_http())
    .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
}

// ─── Integration tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
  use axum::{
    body::Body,
    http::{StatusCode, header},
  };
  use bytes::Bytes;
  use chrono::{TimeZone, Utc};
  use penguin_api::RateLimitConfig;
  use penguin_core::{
    ids::is_valid_task_id,
    kv::task_report_key,
    model::{
      Bounds, DropInfo, DropType, Existence, ExtraProcessType, Item, Server, ServerExistence, Stage,
      TimeRange, Zone,
    },
    report::reliability,
  };
  use penguin_store_sqlite::{SqliteKv, SqliteStore};
  use penguin_verify::Pipeline;
  use rand::rngs::OsRng;
  use serde_json::{Value, json};
  use tower::ServiceExt as _;

  use super::*;
  use crate::{
    bus::{BusConfig, MemoryBus},
    handlers::recall::parse_report_ids,
    idempotency::{KEY_HEADER, STATUS_HEADER},
    worker::Worker,
  };

  struct Harness {
    app:      Router,
    store:    Arc<SqliteStore>,
    kv:       Arc<dyn KeyValue>,
    bus:      Arc<MemoryBus>,
    worker:   Worker<SqliteStore>,
    limiters: [Arc<RateLimiter>; 2],
  }

  fn cn() -> Existence {
    Existence::from([(Server::Cn, ServerExistence { exist: true, open_time: None, close_time: None })])
  }

  /// `main_01-07` may drop 30012 and 30013 as regular drops and 30021 and
  /// 2001 as extra drops; `gacha_01` is a gacha box dropping 30012.
  async fn seeded() -> SqliteStore {
    let s = SqliteStore::open_in_memory().await.unwrap();
    s.insert_zone(&Zone {
      zone_id:     1,
      ark_zone_id: "main_1".into(),
      index:       0,
      category:    "MAINLINE".into(),
      zone_type:   None,
      name:        "Episode 01".into(),
      name_i18n:   json!({}),
      existence:   cn(),
      background:  None,
    })
    .await
    .unwrap();
    for (id, ark, extra) in [(10, "main_01-07", None), (11, "gacha_01", Some(ExtraProcessType::GachaBox))] {
      s.insert_stage(&Stage {
        stage_id:           id,
        ark_stage_id:       ark.into(),
        zone_id:            1,
        stage_type:         "MAIN".into(),
        code:               ark.into(),
        code_i18n:          json!({}),
        sanity:             Some(6),
        existence:          cn(),
        min_clear_time:     None,
        extra_process_type: extra,
      })
      .await
      .unwrap();
    }
    for (id, ark) in [(100, "30012"), (101, "30021"), (102, "2001"), (103, "30013")] {
      s.insert_item(&Item {
        item_id:     id,
        ark_item_id: ark.into(),
        name:        ark.into(),
        name_i18n:   json!({}),
        existence:   cn(),
        item_type:   "MATERIAL".into(),
        group_id:    None,
        sort_id:     id,
        rarity:      1,
        keywords:    json!({}),
      })
      .await
      .unwrap();
    }
    s.insert_time_range(&TimeRange {
      range_id:   1,
      server:     Server::Cn,
      name:       None,
      start_time: Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap(),
      end_time:   Utc.with_ymd_and_hms(2100, 1, 1, 0, 0, 0).unwrap(),
    })
    .await
    .unwrap();
    let infos = [
      (10, 100, DropType::Regular),
      (10, 103, DropType::Regular),
      (10, 101, DropType::Extra),
      (10, 102, DropType::Extra),
      (11, 100, DropType::Regular),
    ];
    for (drop_id, (stage_id, item_id, drop_type)) in (1..).zip(infos) {
      s.insert_drop_info(&DropInfo {
        drop_id,
        server: Server::Cn,
        stage_id,
        item_id: Some(item_id),
        drop_type,
        range_id: 1,
        accumulable: true,
        bounds: Some(Bounds { lower: 0, upper: 50, exceptions: vec![] }),
      })
      .await
      .unwrap();
    }
    s
  }

  async fn harness_with(config: ServerConfig, keys: RecognitionKeys) -> Harness {
    let store = Arc::new(seeded().await);
    let kv: Arc<dyn KeyValue> = Arc::new(SqliteKv::new(&store));
    let bus = Arc::new(MemoryBus::new(BusConfig {
      subjects:      vec!["REPORT.*".into()],
      ack_wait:      Duration::from_secs(10),
      max_in_flight: 128,
      max_deliver:   5,
    }));
    let dyn_bus: Arc<dyn MessageBus> = bus.clone();
    let state = AppState::new(Arc::clone(&store), Arc::clone(&kv), Arc::clone(&dyn_bus), keys, config);
    let pipeline = Arc::new(Pipeline::new(Arc::clone(&store)));
    let worker = Worker::new(0, Arc::clone(&store), Arc::clone(&kv), dyn_bus, pipeline);
    let limiters = state.limiters();
    Harness { app: router(state), store, kv, bus, worker, limiters }
  }

  async fn harness() -> Harness { harness_with(ServerConfig::default(), RecognitionKeys::new()).await }

  impl Harness {
    async fn post(&self, uri: &str, headers: &[(&str, &str)], body: impl Into<Body>) -> Response {
      let mut req = Request::builder().method("POST").uri(uri);
      for (k, v) in headers {
        req = req.header(*k, *v);
      }
      self.app.clone().oneshot(req.body(body.into()).unwrap()).await.unwrap()
    }

    async fn report(&self, headers: &[(&str, &str)], body: Value) -> Response {
      self.post("/PenguinStats/api/v2/report", headers, body.to_string()).await
    }

    /// Hand every queued task to the worker.
    async fn drain(&self) {
      while let Ok(Some(delivery)) =
        tokio::time::timeout(Duration::from_millis(50), self.bus.next()).await
      {
        self.worker.handle(delivery).await;
      }
    }

    async fn report_ids(&self, task_id: &str) -> Vec<i64> {
      let raw = self.kv.get(&task_report_key(task_id)).await.unwrap().unwrap();
      parse_report_ids(&raw).unwrap()
    }
  }

  async fn json_body(resp: Response) -> Value {
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
  }

  fn s1_body() -> Value {
    json!({
      "drops": [
        {"dropType": "NORMAL_DROP", "itemId": "30012", "quantity": 1},
        {"dropType": "EXTRA_DROP", "itemId": "30021", "quantity": 1},
        {"dropType": "EXTRA_DROP", "itemId": "2001", "quantity": 1},
      ],
      "stageId": "main_01-07",
      "server": "CN",
      "source": "frontend-v2-localhost-testing",
      "version": "v3.0.0",
    })
  }

  // ── Reports ─────────────────────────────────────────────────────────────────

  #[tokio::test]
  async fn singular_report_is_persisted() {
    let h = harness().await;
    let resp = h.report(&[], s1_body()).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()[COMPATIBLE_HEADER], COMPATIBLE_VERSION);
    let penguin_id = resp.headers()["x-penguin-set-penguinid"].to_str().unwrap().to_owned();
    assert!(resp.headers()[header::SET_COOKIE].to_str().unwrap().contains(&penguin_id));
    let hash = json_body(resp).await["reportHash"].as_str().unwrap().to_owned();
    assert!(is_valid_task_id(&hash), "{hash}");

    h.drain().await;
    let ids = h.report_ids(&hash).await;
    assert_eq!(ids.len(), 1);
    let report = h.store.drop_report(ids[0]).await.unwrap().unwrap();
    assert_eq!(report.reliability, reliability::OK);
    assert_eq!(report.stage_id, 10);
    assert_eq!(report.times, 1);
    let elements = h.store.pattern_elements(report.pattern_id).await.unwrap();
    let pairs: Vec<_> = elements.iter().map(|e| (e.item_id, e.quantity)).collect();
    assert_eq!(pairs, [(100, 1), (101, 1), (102, 1)]);

    let extra = h.store.drop_report_extra(ids[0]).await.unwrap().unwrap();
    assert_eq!(extra.source_name, "frontend-v2-localhost-testing");
  }

  #[tokio::test]
  async fn duplicate_drops_are_merged() {
    let h = harness().await;
    let mut body = s1_body();
    body["drops"] = json!([
      {"dropType": "REGULAR_DROP", "itemId": "30013", "quantity": 1},
      {"dropType": "REGULAR_DROP", "itemId": "30013", "quantity": 1},
      {"dropType": "REGULAR_DROP", "itemId": "30013", "quantity": 1},
    ]);
    let hash = json_body(h.report(&[], body).await).await["reportHash"].as_str().unwrap().to_owned();
    h.drain().await;

    let report = h.store.drop_report(h.report_ids(&hash).await[0]).await.unwrap().unwrap();
    assert_eq!(report.times, 1);
    let elements = h.store.pattern_elements(report.pattern_id).await.unwrap();
    assert_eq!(elements.len(), 1);
    assert_eq!((elements[0].item_id, elements[0].quantity), (103, 3));
  }

  #[tokio::test]
  async fn gacha_boxes_count_quantity_as_times() {
    let h = harness().await;
    let mut body = s1_body();
    body["stageId"] = json!("gacha_01");
    body["drops"] = json!([{"dropType": "NORMAL_DROP", "itemId": "30012", "quantity": 7}]);
    let hash = json_body(h.report(&[], body).await).await["reportHash"].as_str().unwrap().to_owned();
    h.drain().await;
    let report = h.store.drop_report(h.report_ids(&hash).await[0]).await.unwrap().unwrap();
    assert_eq!(report.times, 7);
  }

  #[tokio::test]
  async fn known_penguin_ids_are_reused() {
    let h = harness().await;
    let account = h.store.create_account("000000777").await.unwrap().unwrap();
    let resp = h.report(&[("authorization", "PenguinID 000000777")], s1_body()).await;
    assert!(!resp.headers().contains_key("x-penguin-set-penguinid"));
    let hash = json_body(resp).await["reportHash"].as_str().unwrap().to_owned();
    h.drain().await;
    let report = h.store.drop_report(h.report_ids(&hash).await[0]).await.unwrap().unwrap();
    assert_eq!(report.account_id, account.account_id);
  }

  #[tokio::test]
  async fn idempotent_reports_enqueue_once() {
    let h = harness().await;
    let key = [(KEY_HEADER, "k1")];
    let first = h.report(&key, s1_body()).await;
    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(first.headers()[STATUS_HEADER], "saved");
    let first_body = axum::body::to_bytes(first.into_body(), usize::MAX).await.unwrap();

    let second = h.report(&key, s1_body()).await;
    assert_eq!(second.status(), StatusCode::OK);
    assert_eq!(second.headers()[STATUS_HEADER], "hit");
    let second_body = axum::body::to_bytes(second.into_body(), usize::MAX).await.unwrap();

    assert_eq!(first_body, second_body);
    assert_eq!(h.bus.pending(), 1);
  }

  #[tokio::test]
  async fn disallowed_drops_are_stored_as_unreliable() {
    let h = harness().await;
    let mut body = s1_body();
    body["drops"] = json!([{"dropType": "SPECIAL_DROP", "itemId": "30012", "quantity": 1}]);
    let resp = h.report(&[], body).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let hash = json_body(resp).await["reportHash"].as_str().unwrap().to_owned();
    h.drain().await;

    let report = h.store.drop_report(h.report_ids(&hash).await[0]).await.unwrap().unwrap();
    assert_eq!(report.reliability, reliability::DROP_SHAPE);
  }

  #[tokio::test]
  async fn invalid_reports_are_not_enqueued() {
    let h = harness().await;
    let mut body = s1_body();
    body["drops"][0]["quantity"] = json!(1001);
    let resp = h.report(&[], body).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body = json_body(resp).await;
    assert_eq!(body["code"], "INVALID_REQUEST");
    assert_eq!(body["violations"][0]["field"], "drops[0].quantity");

    let mut body = s1_body();
    body["stageId"] = json!("main_99-99");
    assert_eq!(h.report(&[], body).await.status(), StatusCode::BAD_REQUEST);

    let resp = h.post("/PenguinStats/api/v2/report", &[], "{not json").await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(h.bus.pending(), 0);
  }

  #[tokio::test]
  async fn reports_are_rate_limited() {
    let config = ServerConfig {
      report_rate_limit: RateLimitConfig { capacity: 2, per_secs: 60 },
      ..ServerConfig::default()
    };
    let h = harness_with(config, RecognitionKeys::new()).await;
    let ip = [("x-forwarded-for", "10.0.0.9")];
    assert_eq!(h.report(&ip, s1_body()).await.status(), StatusCode::OK);
    assert_eq!(h.report(&ip, s1_body()).await.status(), StatusCode::OK);
    let resp = h.report(&ip, s1_body()).await;
    assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(json_body(resp).await["code"], "TOO_MANY_REQUESTS");
  }

  #[tokio::test]
  async fn advanced_queries_use_the_swept_limiter() {
    let h = harness().await;
    let headers = [("x-forwarded-for", "10.0.0.7"), ("content-type", "application/json")];
    let body = r#"{"queries":[{"server":"CN","stageId":"main_01-07"}]}"#;
    assert_eq!(h.post("/PenguinStats/api/v2/advanced", &headers, body).await.status(), StatusCode::OK);
    assert_eq!(h.limiters[1].tracked(), 1);
    assert_eq!(h.limiters[0].tracked(), 0);
  }

  // ── Recall ──────────────────────────────────────────────────────────────────

  #[tokio::test]
  async fn recall_tombstones_once() {
    let h = harness().await;
    let hash = json_body(h.report(&[], s1_body()).await).await["reportHash"].as_str().unwrap().to_owned();
    h.drain().await;

    let recall = json!({"reportHash": hash}).to_string();
    let resp = h.post("/PenguinStats/api/v2/report/recall", &[], recall.clone()).await;
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    let report = h.store.drop_report(h.report_ids(&hash).await[0]).await.unwrap().unwrap();
    assert_eq!(report.reliability, reliability::RECALLED);

    let resp = h.post("/PenguinStats/api/v2/report/recall", &[], recall).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
  }

  #[tokio::test]
  async fn recall_of_unknown_hash_fails() {
    let h = harness().await;
    let unknown = json!({"reportHash": "0000000000000000000a-AAAAAAAAAAAAAAAA"}).to_string();
    let resp = h.post("/PenguinStats/api/v2/report/recall", &[], unknown).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let malformed = json!({"reportHash": "nope"}).to_string();
    let resp = h.post("/PenguinStats/api/v2/report/recall", &[], malformed).await;
    assert_eq!(json_body(resp).await["violations"][0]["field"], "reportHash");
  }

  // ── Recognition ─────────────────────────────────────────────────────────────

  #[tokio::test]
  async fn recognition_batches_skip_invalid_entries() {
    let key = crypto::tests::test_key();
    let public = key.to_public_key();
    let mut keys = RecognitionKeys::new();
    keys.insert("k1", key);
    let h = harness_with(ServerConfig::default(), keys).await;

    let batch = json!({
      "server": "CN", "source": "frontend-v2-recognition", "version": "v3.4.0",
      "batchDrops": [
        {"stageId": "main_01-07", "drops": [{"dropType": "NORMAL_DROP", "itemId": "30012", "quantity": 2}],
         "metadata": {"md5": "abc"}},
        {"stageId": "main_01-07", "drops": [{"dropType": "NORMAL_DROP", "itemId": "99999", "quantity": 1}]},
        {"stageId": "", "drops": []},
      ],
    });
    let body = crypto::seal_body("k1", &public, batch.to_string().as_bytes(), &mut OsRng).unwrap();
    let resp = h.post("/PenguinStats/api/v2/report/recognition", &[], body).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = json_body(resp).await;
    let task_id = body["taskId"].as_str().unwrap().to_owned();
    let skipped: Vec<_> = body["errors"].as_array().unwrap().iter().map(|e| e["index"].clone()).collect();
    assert_eq!(skipped, [json!(1), json!(2)]);

    h.drain().await;
    let ids = h.report_ids(&task_id).await;
    assert_eq!(ids.len(), 1);
    let extra = h.store.drop_report_extra(ids[0]).await.unwrap().unwrap();
    assert_eq!(extra.md5.as_deref(), Some("abc"));
  }

  #[tokio::test]
  async fn undecryptable_batches_are_invalid() {
    let h = harness().await;
    let resp = h.post("/PenguinStats/api/v2/report/recognition", &[], "k9:AAAA").await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(h.bus.pending(), 0);
  }

  // ── Worker ──────────────────────────────────────────────────────────────────

  #[tokio::test]
  async fn undecodable_tasks_are_acked() {
    let h = harness().await;
    h.bus.publish(bus::SUBJECT_SINGULAR, Bytes::from_static(b"garbage")).await.unwrap();
    h.drain().await;
    assert_eq!(h.bus.pending(), 0);
    assert_eq!(h.bus.in_flight(), 0);
    assert_eq!(h.bus.dropped(), 0);
  }

  // ── Read side and admin ─────────────────────────────────────────────────────

  #[tokio::test]
  async fn read_routes_are_mounted() {
    let h = harness().await;
    let req = Request::builder().uri("/PenguinStats/api/v2/items").body(Body::empty()).unwrap();
    let resp = h.app.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()[COMPATIBLE_HEADER], COMPATIBLE_VERSION);
    assert_eq!(json_body(resp).await.as_array().unwrap().len(), 4);

    let req = Request::builder().uri("/api/v3/incremental/CN/stages/latest").body(Body::empty()).unwrap();
    let resp = h.app.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert!(!resp.headers().contains_key(COMPATIBLE_HEADER));
  }

  #[tokio::test]
  async fn admin_routes_require_credentials_when_configured() {
    use argon2::{Argon2, PasswordHasher, password_hash::SaltString};
    use base64::{Engine as _, engine::general_purpose::STANDARD as B64};

    let salt = SaltString::generate(&mut rand_core::OsRng);
    let hash = Argon2::default().hash_password(b"secret", &salt).unwrap().to_string();
    let config = ServerConfig {
      admin_username: Some("admin".into()),
      admin_password_hash: Some(hash),
      ..ServerConfig::default()
    };
    let h = harness_with(config, RecognitionKeys::new()).await;
    let purge = r#"{"pairs":[{"name":"shimItems"}]}"#;
    let json = ("content-type", "application/json");

    let resp = h.post("/api/_/admin/purge", &[json], purge).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let auth = format!("Basic {}", B64.encode("admin:secret"));
    let resp = h.post("/api/_/admin/purge", &[json, ("authorization", auth.as_str())], purge).await;
    assert_eq!(resp.status(), StatusCode::OK);
  }
}
