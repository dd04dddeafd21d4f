//! penguin-server binary.
//!
//! Reads `config.toml` (or the path given with `--config`) plus `PENGUIN__*`
//! environment overrides, opens the SQLite store, starts the ingestion
//! workers and serves the HTTP API.
//!
//! # Password hash generation
//!
//! To generate the argon2 PHC string for `admin_password_hash`:
//!
//! ```
//! cargo run -p penguin-server -- --hash-password
//! ```

use std::{
  net::SocketAddr,
  path::{Path, PathBuf},
  sync::Arc,
  time::Duration,
};

use anyhow::Context as _;
use argon2::{Argon2, PasswordHasher, password_hash::SaltString};
use clap::Parser;
use penguin_core::kv::KeyValue;
use penguin_server::{
  AppState, ServerConfig,
  bus::{MemoryBus, MessageBus},
  crypto::RecognitionKeys,
  worker::spawn_workers,
};
use penguin_store_sqlite::{SqliteKv, SqliteStore};
use rand_core::OsRng;
use tokio::net::TcpListener;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

const LIMITER_SWEEP: Duration = Duration::from_secs(60);

#[derive(Parser)]
#[command(author, version, about = "Penguin drop statistics server")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml")]
  config: PathBuf,

  /// Print the argon2 hash for a password entered on stdin and exit.
  #[arg(long)]
  hash_password: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  if cli.hash_password {
    let password = read_password()?;
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
      .hash_password(password.as_bytes(), &salt)
      .map_err(|e| anyhow::anyhow!("argon2 error: {e}"))?
      .to_string();
    println!("{hash}");
    return Ok(());
  }

  let settings = config::Config::builder()
    .add_source(config::File::from(cli.config).required(false))
    .add_source(config::Environment::with_prefix("PENGUIN").separator("__"))
    .build()
    .context("failed to read config file")?;
  let server_cfg: ServerConfig = settings
    .try_deserialize()
    .context("failed to deserialise ServerConfig")?;

  let database_path = expand_tilde(&server_cfg.database_path);
  let store = SqliteStore::open(&database_path)
    .await
    .with_context(|| format!("failed to open store at {database_path:?}"))?;
  let kv: Arc<dyn KeyValue> = Arc::new(SqliteKv::new(&store));
  let store = Arc::new(store);

  let keys = RecognitionKeys::load(&server_cfg.recognition_keys)
    .context("failed to load recognition keys")?;
  if keys.is_empty() {
    tracing::warn!("no recognition keys configured; /report/recognition rejects every batch");
  }

  let memory_bus = MemoryBus::new(server_cfg.bus());
  let bus: Arc<dyn MessageBus> = Arc::new(memory_bus.clone());
  let workers = spawn_workers(
    server_cfg.worker_count(),
    Arc::clone(&store),
    Arc::clone(&kv),
    Arc::clone(&bus),
  );
  tracing::info!(workers = workers.len(), "ingestion workers started");

  let address = format!("{}:{}", server_cfg.host, server_cfg.port);
  let state = AppState::new(store, kv, bus, keys, server_cfg);

  let limiters = state.limiters();
  tokio::spawn(async move {
    let mut ticker = tokio::time::interval(LIMITER_SWEEP);
    loop {
      ticker.tick().await;
      for limiter in &limiters {
        limiter.sweep();
      }
    }
  });

  let app = penguin_server::router(state);

  tracing::info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("server error")?;

  // Stop the workers; unsettled tasks are lost with the process.
  memory_bus.close();
  for worker in workers {
    if let Err(e) = worker.await {
      tracing::error!(error = %e, "worker panicked");
    }
  }
  if memory_bus.dropped() > 0 {
    tracing::warn!(dropped = memory_bus.dropped(), "tasks dropped after max deliveries");
  }

  Ok(())
}

async fn shutdown_signal() {
  if let Err(e) = tokio::signal::ctrl_c().await {
    tracing::error!(error = %e, "failed to listen for shutdown signal");
    std::future::pending::<()>().await;
  }
  tracing::info!("shutting down");
}

/// Read a password from stdin.
fn read_password() -> anyhow::Result<String> {
  use std::io::{self, BufRead, Write};
  print!("Password: ");
  io::stdout().flush().ok();
  let mut line = String::new();
  io::stdin().lock().read_line(&mut line)?;
  Ok(line.trim_end_matches(['\n', '\r']).to_string())
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
