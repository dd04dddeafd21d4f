//! Ingestion workers: verify each task, persist its reports, record the
//! task → report mapping, settle the delivery.

use std::{sync::Arc, time::Duration};

use penguin_core::{
  kv::{KeyValue, TASK_REPORT_TTL, task_report_key},
  report::{ReportTask, reliabilities},
  store::ReportStore,
};
use penguin_verify::Pipeline;
use tokio::task::JoinHandle;

use crate::{
  bus::{Delivery, MessageBus},
  error::{Error, Result},
};

/// Interval of `in_progress` signals while a task is processed.
pub const HEARTBEAT: Duration = Duration::from_secs(5);
/// Upper bound on the processing of one task.
pub const TASK_DEADLINE: Duration = Duration::from_secs(10);

pub struct Worker<S: ReportStore + 'static> {
  id:        usize,
  store:     Arc<S>,
  kv:        Arc<dyn KeyValue>,
  bus:       Arc<dyn MessageBus>,
  pipeline:  Arc<Pipeline<S>>,
  heartbeat: Duration,
  deadline:  Duration,
}

impl<S: ReportStore + 'static> Worker<S> {
  pub fn new(
    id: usize,
    store: Arc<S>,
    kv: Arc<dyn KeyValue>,
    bus: Arc<dyn MessageBus>,
    pipeline: Arc<Pipeline<S>>,
  ) -> Self {
    Self { id, store, kv, bus, pipeline, heartbeat: HEARTBEAT, deadline: TASK_DEADLINE }
  }

  /// Consume deliveries until the bus closes.
  pub async fn run(self) {
    tracing::info!(worker = self.id, "worker started");
    while let Some(delivery) = self.bus.next().await {
      self.handle(delivery).await;
    }
    tracing::info!(worker = self.id, "worker stopped");
  }

  /// Process one delivery and ack or nak it.
  pub async fn handle(&self, delivery: Delivery) {
    let task: ReportTask = match serde_json::from_slice(&delivery.payload) {
      Ok(task) => task,
      Err(e) => {
        tracing::error!(
          worker = self.id,
          subject = %delivery.subject,
          error = %e,
          "undecodable task dropped",
        );
        delivery.ack().await;
        return;
      }
    };

    let outcome = {
      let work = tokio::time::timeout(self.deadline, self.process(&task));
      tokio::pin!(work);
      let mut ticker = tokio::time::interval(self.heartbeat);
      ticker.tick().await;
      loop {
        tokio::select! {
          done = &mut work => break done.unwrap_or(Err(Error::Timeout)),
          _ = ticker.tick() => delivery.in_progress().await,
        }
      }
    };

    match outcome {
      Ok(report_ids) => {
        tracing::info!(
          worker = self.id,
          task_id = %task.task_id,
          subject = %delivery.subject,
          attempt = delivery.attempt,
          ?report_ids,
          "ack",
        );
        delivery.ack().await;
      }
      Err(e) => {
        tracing::warn!(
          worker = self.id,
          task_id = %task.task_id,
          subject = %delivery.subject,
          attempt = delivery.attempt,
          error = %e,
          "nak",
        );
        delivery.nak().await;
      }
    }
  }

  /// Verify and persist `task`. Returns the new report ids in report order.
  pub async fn process(&self, task: &ReportTask) -> Result<Vec<i64>> {
    let violations = self.pipeline.verify(task).await.map_err(Error::store)?;
    let reliabilities = reliabilities(&violations, task.reports.len());
    let report_ids = self.store.persist_task(task, &reliabilities).await.map_err(Error::store)?;

    let record = report_ids.iter().map(i64::to_string).collect::<Vec<_>>().join(",");
    self
      .kv
      .set(&task_report_key(&task.task_id), record.into_bytes(), TASK_REPORT_TTL)
      .await?;
    Ok(report_ids)
  }
}

/// Start `count` workers sharing one consumer group.
pub fn spawn_workers<S: ReportStore + 'static>(
  count: usize,
  store: Arc<S>,
  kv: Arc<dyn KeyValue>,
  bus: Arc<dyn MessageBus>,
) -> Vec<JoinHandle<()>> {
  let pipeline = Arc::new(Pipeline::new(Arc::clone(&store)));
  (0..count)
    .map(|id| {
      let worker = Worker::new(
        id,
        Arc::clone(&store),
        Arc::clone(&kv),
        Arc::clone(&bus),
        Arc::clone(&pipeline),
      );
      tokio::spawn(worker.run())
    })
    .collect()
}
