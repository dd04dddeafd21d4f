//! The task queue between the ingestion front-end and the workers.
//!
//! [`MessageBus`] is a durable stream with one shared consumer group:
//! publishers append to subjects, consumers pull [`Delivery`]s and settle them
//! with `ack`, `nak` or `in_progress`. Unsettled deliveries are redelivered
//! once their ack wait lapses, so delivery is at least once.
//!
//! [`MemoryBus`] is the in-process implementation used by the server binary.

use std::{
  collections::{HashMap, VecDeque},
  sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
  },
  time::{Duration, Instant},
};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::error::{Error, Result};

pub const SUBJECT_SINGULAR: &str = "REPORT.singular";
pub const SUBJECT_BATCH: &str = "REPORT.batch";

#[derive(Debug, Clone)]
pub struct BusConfig {
  /// Subject filters accepted by the stream. `*` matches one token, `>` the
  /// remainder.
  pub subjects:      Vec<String>,
  pub ack_wait:      Duration,
  pub max_in_flight: usize,
  /// Deliveries after which an unacknowledged message is discarded.
  pub max_deliver:   u32,
}

#[async_trait]
pub trait MessageBus: Send + Sync {
  async fn publish(&self, subject: &str, payload: Bytes) -> Result<()>;

  /// Wait for the next delivery. `None` once the bus is closed.
  async fn next(&self) -> Option<Delivery>;
}

/// Settlement half of a delivery.
#[async_trait]
pub trait Acker: Send + Sync {
  async fn ack(&self, seq: u64, attempt: u32);
  async fn nak(&self, seq: u64, attempt: u32);
  async fn in_progress(&self, seq: u64, attempt: u32);
}

pub struct Delivery {
  pub subject: String,
  pub payload: Bytes,
  /// 1 on first delivery.
  pub attempt: u32,
  seq:         u64,
  acker:       Arc<dyn Acker>,
}

impl Delivery {
  pub async fn ack(self) { self.acker.ack(self.seq, self.attempt).await }

  /// Return the message for redelivery.
  pub async fn nak(self) { self.acker.nak(self.seq, self.attempt).await }

  /// Reset the ack wait.
  pub async fn in_progress(&self) { self.acker.in_progress(self.seq, self.attempt).await }
}

impl std::fmt::Debug for Delivery {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Delivery")
      .field("subject", &self.subject)
      .field("attempt", &self.attempt)
      .field("seq", &self.seq)
      .finish_non_exhaustive()
  }
}

/// `true` if `subject` matches the NATS-style `filter`.
pub fn subject_matches(filter: &str, subject: &str) -> bool {
  let mut filter = filter.split('.');
  let mut subject = subject.split('.');
  loop {
    match (filter.next(), subject.next()) {
      (Some(">"), Some(_)) => return true,
      (Some("*"), Some(t)) if !t.is_empty() => {}
      (Some(f), Some(t)) if f == t => {}
      (None, None) => return true,
      _ => return false,
    }
  }
}

// ─── In-process stream ───────────────────────────────────────────────────────

struct Message {
  seq:        u64,
  subject:    String,
  payload:    Bytes,
  deliveries: u32,
}

struct InFlight {
  message:  Message,
  deadline: Instant,
}

#[derive(Default)]
struct Stream {
  pending:   VecDeque<Message>,
  in_flight: HashMap<u64, InFlight>,
  next_seq:  u64,
  closed:    bool,
}

struct Shared {
  config:  BusConfig,
  stream:  Mutex<Stream>,
  notify:  Notify,
  dropped: AtomicU64,
}

impl Shared {
  /// Requeue `message`, or discard it once it has used up its deliveries.
  fn retry(&self, stream: &mut Stream, message: Message) {
    if message.deliveries >= self.config.max_deliver {
      self.dropped.fetch_add(1, Ordering::Relaxed);
      tracing::error!(
        seq = message.seq,
        subject = %message.subject,
        deliveries = message.deliveries,
        "message dropped after max deliveries",
      );
      return;
    }
    stream.pending.push_back(message);
    self.notify.notify_one();
  }

  fn requeue_expired(&self, stream: &mut Stream, now: Instant) {
    let expired: Vec<u64> = stream
      .in_flight
      .iter()
      .filter(|(_, f)| f.deadline <= now)
      .map(|(&seq, _)| seq)
      .collect();
    for seq in expired {
      if let Some(f) = stream.in_flight.remove(&seq) {
        tracing::debug!(seq, deliveries = f.message.deliveries, "ack wait expired");
        self.retry(stream, f.message);
      }
    }
  }

  /// Remove the in-flight entry for `(seq, attempt)`; a stale attempt is
  /// ignored.
  fn settle(stream: &mut Stream, seq: u64, attempt: u32) -> Option<Message> {
    match stream.in_flight.get(&seq) {
      Some(f) if f.message.deliveries == attempt => stream.in_flight.remove(&seq).map(|f| f.message),
      _ => None,
    }
  }
}

#[async_trait]
impl Acker for Shared {
  async fn ack(&self, seq: u64, attempt: u32) {
    let mut stream = self.stream.lock();
    if Self::settle(&mut stream, seq, attempt).is_some() {
      self.notify.notify_one();
    }
  }

  async fn nak(&self, seq: u64, attempt: u32) {
    let mut stream = self.stream.lock();
    if let Some(message) = Self::settle(&mut stream, seq, attempt) {
      self.retry(&mut stream, message);
    }
  }

  async fn in_progress(&self, seq: u64, attempt: u32) {
    let mut stream = self.stream.lock();
    if let Some(f) = stream.in_flight.get_mut(&seq)
      && f.message.deliveries == attempt
    {
      f.deadline = Instant::now() + self.config.ack_wait;
    }
  }
}

/// A single-process stream with one consumer group.
#[derive(Clone)]
pub struct MemoryBus {
  shared: Arc<Shared>,
}

impl MemoryBus {
  pub fn new(config: BusConfig) -> Self {
    Self {
      shared: Arc::new(Shared {
        config,
        stream: Mutex::new(Stream::default()),
        notify: Notify::new(),
        dropped: AtomicU64::new(0),
      }),
    }
  }

  /// Stop handing out deliveries and refuse new messages.
  pub fn close(&self) {
    self.shared.stream.lock().closed = true;
    self.shared.notify.notify_waiters();
  }

  /// Messages discarded after `max_deliver` attempts.
  pub fn dropped(&self) -> u64 { self.shared.dropped.load(Ordering::Relaxed) }

  pub fn pending(&self) -> usize { self.shared.stream.lock().pending.len() }

  pub fn in_flight(&self) -> usize { self.shared.stream.lock().in_flight.len() }
}

#[async_trait]
impl MessageBus for MemoryBus {
  async fn publish(&self, subject: &str, payload: Bytes) -> Result<()> {
    if !self.shared.config.subjects.iter().any(|f| subject_matches(f, subject)) {
      return Err(Error::NoStream(subject.to_owned()));
    }
    let mut stream = self.shared.stream.lock();
    if stream.closed {
      return Err(Error::BusClosed);
    }
    stream.next_seq += 1;
    let seq = stream.next_seq;
    stream.pending.push_back(Message { seq, subject: subject.to_owned(), payload, deliveries: 0 });
    drop(stream);
    self.shared.notify.notify_one();
    Ok(())
  }

  async fn next(&self) -> Option<Delivery> {
    let config = &self.shared.config;
    loop {
      let notified = self.shared.notify.notified();
      let wait = {
        let now = Instant::now();
        let mut stream = self.shared.stream.lock();
        if stream.closed {
          return None;
        }
        self.shared.requeue_expired(&mut stream, now);
        if stream.in_flight.len() < config.max_in_flight
          && let Some(mut message) = stream.pending.pop_front()
        {
          message.deliveries += 1;
          let delivery = Delivery {
            subject: message.subject.clone(),
            payload: message.payload.clone(),
            attempt: message.deliveries,
            seq:     message.seq,
            acker:   Arc::clone(&self.shared) as Arc<dyn Acker>,
          };
          stream
            .in_flight
            .insert(message.seq, InFlight { message, deadline: now + config.ack_wait });
          return Some(delivery);
        }
        stream
          .in_flight
          .values()
          .map(|f| f.deadline.saturating_duration_since(now))
          .min()
          .unwrap_or(config.ack_wait)
      };
      let _ = tokio::time::timeout(wait, notified).await;
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn bus(ack_wait_ms: u64, max_in_flight: usize, max_deliver: u32) -> MemoryBus {
    MemoryBus::new(BusConfig {
      subjects: vec!["REPORT.*".into()],
      ack_wait: Duration::from_millis(ack_wait_ms),
      max_in_flight,
      max_deliver,
    })
  }

  async fn next_within(bus: &MemoryBus, ms: u64) -> Option<Delivery> {
    tokio::time::timeout(Duration::from_millis(ms), bus.next()).await.ok().flatten()
  }

  #[test]
  fn subject_filters() {
    assert!(subject_matches("REPORT.*", "REPORT.singular"));
    assert!(!subject_matches("REPORT.*", "REPORT.a.b"));
    assert!(!subject_matches("REPORT.*", "REPORT"));
    assert!(subject_matches("REPORT.>", "REPORT.a.b"));
    assert!(!subject_matches("REPORT.*", "OTHER.singular"));
  }

  #[tokio::test]
  async fn unknown_subjects_are_refused() {
    let bus = bus(1_000, 8, 5);
    assert!(matches!(
      bus.publish("AUDIT.x", Bytes::new()).await,
      Err(Error::NoStream(_))
    ));
  }

  #[tokio::test]
  async fn ack_settles_and_nak_redelivers() {
    let bus = bus(1_000, 8, 5);
    bus.publish(SUBJECT_SINGULAR, Bytes::from_static(b"a")).await.unwrap();

    let first = bus.next().await.unwrap();
    assert_eq!(first.attempt, 1);
    assert_eq!(first.subject, SUBJECT_SINGULAR);
    first.nak().await;

    let second = bus.next().await.unwrap();
    assert_eq!(second.attempt, 2);
    assert_eq!(second.payload, Bytes::from_static(b"a"));
    second.ack().await;

    assert_eq!(bus.pending(), 0);
    assert_eq!(bus.in_flight(), 0);
    assert!(next_within(&bus, 50).await.is_none());
  }

  #[tokio::test]
  async fn lapsed_ack_wait_redelivers() {
    let bus = bus(30, 8, 5);
    bus.publish(SUBJECT_BATCH, Bytes::new()).await.unwrap();
    let first = bus.next().await.unwrap();
    let again = next_within(&bus, 500).await.unwrap();
    assert_eq!(again.attempt, 2);

    // The stale delivery can no longer settle the message.
    first.ack().await;
    assert_eq!(bus.in_flight(), 1);
    again.ack().await;
    assert_eq!(bus.in_flight(), 0);
  }

  #[tokio::test]
  async fn in_progress_holds_the_message() {
    let bus = bus(80, 8, 5);
    bus.publish(SUBJECT_SINGULAR, Bytes::new()).await.unwrap();
    let delivery = bus.next().await.unwrap();
    for _ in 0..4 {
      tokio::time::sleep(Duration::from_millis(40)).await;
      delivery.in_progress().await;
    }
    assert!(next_within(&bus, 20).await.is_none());
    delivery.ack().await;
  }

  #[tokio::test]
  async fn messages_are_dropped_after_max_deliver() {
    let bus = bus(1_000, 8, 2);
    bus.publish(SUBJECT_SINGULAR, Bytes::new()).await.unwrap();
    bus.next().await.unwrap().nak().await;
    bus.next().await.unwrap().nak().await;
    assert_eq!(bus.dropped(), 1);
    assert!(next_within(&bus, 50).await.is_none());
  }

  #[tokio::test]
  async fn in_flight_is_capped() {
    let bus = bus(1_000, 1, 5);
    bus.publish(SUBJECT_SINGULAR, Bytes::from_static(b"1")).await.unwrap();
    bus.publish(SUBJECT_SINGULAR, Bytes::from_static(b"2")).await.unwrap();

    let first = bus.next().await.unwrap();
    assert!(next_within(&bus, 50).await.is_none());
    first.ack().await;
    let second = next_within(&bus, 500).await.unwrap();
    assert_eq!(second.payload, Bytes::from_static(b"2"));
  }

  #[tokio::test]
  async fn close_ends_consumers() {
    let bus = bus(1_000, 8, 5);
    bus.close();
    assert!(bus.next().await.is_none());
    assert!(matches!(bus.publish(SUBJECT_SINGULAR, Bytes::new()).await, Err(Error::BusClosed)));
  }
}
