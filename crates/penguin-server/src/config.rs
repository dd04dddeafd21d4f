//! Runtime configuration, deserialised from `config.toml` and `PENGUIN__*`
//! environment variables. Every field has a default so an empty source is a
//! valid configuration.

use std::{collections::HashMap, path::PathBuf, time::Duration};

use penguin_api::{ApiConfig, RateLimitConfig, state::DEFAULT_AUTOMATED_SOURCES};
use serde::Deserialize;

use crate::bus::BusConfig;

/// Longest ack wait the bus accepts.
pub const MAX_ACK_WAIT_SECS: u64 = 10;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
  pub host:                      String,
  pub port:                      u16,
  pub database_path:             PathBuf,
  /// Ingestion workers; `0` means one per CPU.
  pub workers:                   usize,
  pub idempotency_lifetime_secs: u64,
  pub ack_wait_secs:             u64,
  pub max_in_flight:             usize,
  pub max_deliver:               u32,
  pub report_rate_limit:         RateLimitConfig,
  pub advanced_rate_limit:       RateLimitConfig,
  /// Public-key hint → path of a PKCS#8 PEM private key.
  pub recognition_keys:          HashMap<String, PathBuf>,
  pub automated_sources:         Vec<String>,
  pub admin_username:            Option<String>,
  /// argon2 PHC string; admin routes are open when unset.
  pub admin_password_hash:       Option<String>,
}

impl Default for ServerConfig {
  fn default() -> Self {
    Self {
      host:                      "127.0.0.1".to_owned(),
      port:                      9010,
      database_path:             PathBuf::from("penguin.db"),
      workers:                   0,
      idempotency_lifetime_secs: 24 * 60 * 60,
      ack_wait_secs:             MAX_ACK_WAIT_SECS,
      max_in_flight:             128,
      max_deliver:               5,
      report_rate_limit:         RateLimitConfig { capacity: 60, per_secs: 60 },
      advanced_rate_limit:       RateLimitConfig { capacity: 30, per_secs: 300 },
      recognition_keys:          HashMap::new(),
      automated_sources:         DEFAULT_AUTOMATED_SOURCES.iter().map(|s| (*s).to_owned()).collect(),
      admin_username:            None,
      admin_password_hash:       None,
    }
  }
}

impl ServerConfig {
  pub fn worker_count(&self) -> usize {
    match self.workers {
      0 => std::thread::available_parallelism().map_or(1, |n| n.get()),
      n => n,
    }
  }

  pub fn idempotency_lifetime(&self) -> Duration {
    Duration::from_secs(self.idempotency_lifetime_secs)
  }

  pub fn bus(&self) -> BusConfig {
    BusConfig {
      subjects:      vec!["REPORT.*".to_owned()],
      ack_wait:      Duration::from_secs(self.ack_wait_secs.clamp(1, MAX_ACK_WAIT_SECS)),
      max_in_flight: self.max_in_flight.max(1),
      max_deliver:   self.max_deliver.max(1),
    }
  }

  pub fn api(&self) -> ApiConfig {
    ApiConfig {
      automated_sources:   self.automated_sources.clone(),
      advanced_rate_limit: self.advanced_rate_limit,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn from_toml(src: &str) -> ServerConfig {
    config::Config::builder()
      .add_source(config::File::from_str(src, config::FileFormat::Toml))
      .build()
      .unwrap()
      .try_deserialize()
      .unwrap()
  }

  #[test]
  fn empty_source_yields_defaults() {
    let cfg = from_toml("");
    assert_eq!(cfg.port, 9010);
    assert_eq!(cfg.max_in_flight, 128);
    assert_eq!(cfg.idempotency_lifetime(), Duration::from_secs(86_400));
    assert_eq!(cfg.advanced_rate_limit, RateLimitConfig { capacity: 30, per_secs: 300 });
    assert!(cfg.worker_count() >= 1);
  }

  #[test]
  fn ack_wait_is_clamped() {
    let cfg = from_toml("ack_wait_secs = 60\nmax_deliver = 0");
    let bus = cfg.bus();
    assert_eq!(bus.ack_wait, Duration::from_secs(10));
    assert_eq!(bus.max_deliver, 1);
  }

  #[test]
  fn nested_tables_override() {
    let cfg = from_toml(
      r#"
      port = 8080
      [report_rate_limit]
      capacity = 5
      per_secs = 10
      [recognition_keys]
      k1 = "/etc/penguin/k1.pem"
      "#,
    );
    assert_eq!(cfg.port, 8080);
    assert_eq!(cfg.report_rate_limit.capacity, 5);
    assert_eq!(cfg.recognition_keys["k1"], PathBuf::from("/etc/penguin/k1.pem"));
  }
}
