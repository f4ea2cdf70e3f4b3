//! # Mail Dispatcher
//!
//! Delivers email off the request path through a bounded queue and a
//! single worker.
//!
//! ## Dispatch Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Mail Dispatch Flow                              │
//! │                                                                         │
//! │  request handler                                                        │
//! │       │ handle.enqueue(message)                                         │
//! │       │   ├── queue full   → Err(QueueFull), nothing recorded           │
//! │       │   └── accepted     → Delivery { id, completion }                │
//! │       ▼                                                                 │
//! │  ┌─────────────────────┐      ┌──────────────────────────────────────┐ │
//! │  │  bounded mpsc queue │ ───► │  MailDispatcher (one worker)         │ │
//! │  └─────────────────────┘      │                                      │ │
//! │                               │  1. ledger: Sending { attempt }      │ │
//! │                               │  2. mailer.send(message)             │ │
//! │                               │  3. retryable error and retries left │ │
//! │                               │     → sleep (constant backoff), 1.   │ │
//! │                               │  4. ledger: Delivered | Failed       │ │
//! │                               │  5. completion oneshot ← outcome     │ │
//! │                               └──────────────────────────────────────┘ │
//! │                                                                         │
//! │  Ledger states:  Queued → Sending{attempt} → Delivered | Failed         │
//! │                                                                         │
//! │  Shutdown: handle.shutdown() or dropping every handle. Jobs already     │
//! │  queued are delivered before the worker exits.                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use backoff::backoff::{Backoff, Constant};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::MailConfig;
use crate::error::{MailError, MailResult};
use crate::message::EmailMessage;
use crate::provider::{DeliveryReceipt, Mailer};

// =============================================================================
// Constants
// =============================================================================

/// Finished ledger entries kept before the oldest are dropped.
const LEDGER_CAPACITY: usize = 1000;

pub type DeliveryId = Uuid;

// =============================================================================
// Ledger
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum DeliveryState {
    Queued,
    Sending {
        attempt: u32,
    },
    Delivered {
        attempts: u32,
        message_id: Option<String>,
    },
    Failed {
        attempts: u32,
        error: String,
    },
}

impl DeliveryState {
    pub fn is_finished(&self) -> bool {
        matches!(self, DeliveryState::Delivered { .. } | DeliveryState::Failed { .. })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DeliveryRecord {
    pub id: DeliveryId,
    pub to: String,
    pub subject: String,
    #[serde(flatten)]
    pub state: DeliveryState,
    pub queued_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Outcome of every email the dispatcher has seen, by delivery id.
#[derive(Debug, Clone, Default)]
pub struct DeliveryLedger {
    records: Arc<RwLock<HashMap<DeliveryId, DeliveryRecord>>>,
}

impl DeliveryLedger {
    pub async fn get(&self, id: DeliveryId) -> Option<DeliveryRecord> {
        self.records.read().await.get(&id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    async fn record_queued(&self, id: DeliveryId, message: &EmailMessage) {
        let now = Utc::now();
        let mut records = self.records.write().await;
        if records.len() >= LEDGER_CAPACITY {
            prune_finished(&mut records);
        }
        records.insert(
            id,
            DeliveryRecord {
                id,
                to: message.to.clone(),
                subject: message.subject.clone(),
                state: DeliveryState::Queued,
                queued_at: now,
                updated_at: now,
            },
        );
    }

    async fn set_state(&self, id: DeliveryId, state: DeliveryState) {
        if let Some(record) = self.records.write().await.get_mut(&id) {
            record.state = state;
            record.updated_at = Utc::now();
        }
    }

    async fn forget(&self, id: DeliveryId) {
        self.records.write().await.remove(&id);
    }
}

/// Drops the older half of the finished records.
fn prune_finished(records: &mut HashMap<DeliveryId, DeliveryRecord>) {
    let mut finished: Vec<(DateTime<Utc>, DeliveryId)> = records
        .values()
        .filter(|r| r.state.is_finished())
        .map(|r| (r.updated_at, r.id))
        .collect();
    finished.sort();
    let drop_count = finished.len().div_ceil(2);
    for (_, id) in finished.into_iter().take(drop_count) {
        records.remove(&id);
    }
    debug!(remaining = records.len(), "Pruned delivery ledger");
}

// =============================================================================
// Handle
// =============================================================================

struct DeliveryJob {
    id: DeliveryId,
    message: EmailMessage,
    done: oneshot::Sender<MailResult<DeliveryReceipt>>,
}

/// A queued email. Dropping it does not cancel the delivery.
#[derive(Debug)]
pub struct Delivery {
    pub id: DeliveryId,
    done: oneshot::Receiver<MailResult<DeliveryReceipt>>,
}

impl Delivery {
    /// Waits for the final outcome, retries included.
    pub async fn wait(self) -> MailResult<DeliveryReceipt> {
        self.done.await.map_err(|_| MailError::DispatcherClosed)?
    }
}

/// Cloneable handle used by request handlers.
#[derive(Debug, Clone)]
pub struct DispatchHandle {
    job_tx: mpsc::Sender<DeliveryJob>,
    shutdown_tx: mpsc::Sender<()>,
    ledger: DeliveryLedger,
}

impl std::fmt::Debug for DeliveryJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeliveryJob")
            .field("id", &self.id)
            .field("to", &self.message.to)
            .finish()
    }
}

impl DispatchHandle {
    /// Queues a message without waiting.
    ///
    /// Fails with `QueueFull` instead of waiting for room.
    pub async fn enqueue(&self, message: EmailMessage) -> MailResult<Delivery> {
        message.validate()?;
        let id = Uuid::new_v4();
        let (done_tx, done_rx) = oneshot::channel();

        self.ledger.record_queued(id, &message).await;
        let job = DeliveryJob {
            id,
            message,
            done: done_tx,
        };

        match self.job_tx.try_send(job) {
            Ok(()) => {
                debug!(delivery_id = %id, "Email queued");
                Ok(Delivery { id, done: done_rx })
            }
            Err(mpsc::error::TrySendError::Full(job)) => {
                self.ledger.forget(id).await;
                warn!(to = %job.message.to, "Mail queue full, email not queued");
                Err(MailError::QueueFull)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.ledger.forget(id).await;
                Err(MailError::DispatcherClosed)
            }
        }
    }

    /// Queues a message and waits for its final outcome.
    pub async fn send_and_wait(&self, message: EmailMessage) -> MailResult<DeliveryReceipt> {
        self.enqueue(message).await?.wait().await
    }

    pub async fn status(&self, id: DeliveryId) -> Option<DeliveryRecord> {
        self.ledger.get(id).await
    }

    pub fn ledger(&self) -> &DeliveryLedger {
        &self.ledger
    }

    /// Asks the worker to finish the queued jobs and stop.
    pub async fn shutdown(&self) -> MailResult<()> {
        self.shutdown_tx
            .send(())
            .await
            .map_err(|_| MailError::DispatcherClosed)
    }
}

// =============================================================================
// Dispatcher
// =============================================================================

/// The worker that owns the queue's receiving end.
pub struct MailDispatcher {
    mailer: Arc<dyn Mailer>,
    ledger: DeliveryLedger,
    max_retries: u32,
    retry_delay: Duration,
    job_rx: mpsc::Receiver<DeliveryJob>,
    shutdown_rx: mpsc::Receiver<()>,
}

impl MailDispatcher {
    /// Creates the worker and its handle. Nothing is sent until `run`.
    pub fn new(mailer: Arc<dyn Mailer>, config: &MailConfig) -> (Self, DispatchHandle) {
        let (job_tx, job_rx) = mpsc::channel(config.queue_capacity.max(1));
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let ledger = DeliveryLedger::default();

        let dispatcher = MailDispatcher {
            mailer,
            ledger: ledger.clone(),
            max_retries: config.max_retries,
            retry_delay: config.retry_delay(),
            job_rx,
            shutdown_rx,
        };
        let handle = DispatchHandle {
            job_tx,
            shutdown_tx,
            ledger,
        };
        (dispatcher, handle)
    }

    /// Creates the worker and runs it on the tokio runtime.
    pub fn spawn(mailer: Arc<dyn Mailer>, config: &MailConfig) -> (DispatchHandle, JoinHandle<()>) {
        let (dispatcher, handle) = Self::new(mailer, config);
        let task = tokio::spawn(dispatcher.run());
        (handle, task)
    }

    /// Main worker loop.
    pub async fn run(mut self) {
        info!(
            provider = self.mailer.provider_name(),
            max_retries = self.max_retries,
            "Mail dispatcher started"
        );

        loop {
            tokio::select! {
                job = self.job_rx.recv() => match job {
                    Some(job) => self.deliver(job).await,
                    None => break,
                },
                Some(()) = self.shutdown_rx.recv() => {
                    info!("Mail dispatcher draining queue");
                    self.job_rx.close();
                    while let Some(job) = self.job_rx.recv().await {
                        self.deliver(job).await;
                    }
                    break;
                }
            }
        }

        info!("Mail dispatcher stopped");
    }

    async fn deliver(&self, job: DeliveryJob) {
        let DeliveryJob { id, message, done } = job;
        let mut retry = Constant::new(self.retry_delay);
        let mut attempt: u32 = 0;

        let outcome = loop {
            attempt += 1;
            self.ledger
                .set_state(id, DeliveryState::Sending { attempt })
                .await;

            match self.mailer.send(&message).await {
                Ok(receipt) => break Ok(receipt),
                Err(err) if err.is_retryable() && attempt <= self.max_retries => {
                    let delay = retry.next_backoff().unwrap_or(self.retry_delay);
                    warn!(
                        delivery_id = %id,
                        to = %message.to,
                        attempt,
                        error = %err,
                        "Email send failed, retrying in {:?}",
                        delay
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => break Err(err),
            }
        };

        match &outcome {
            Ok(receipt) => {
                info!(delivery_id = %id, to = %message.to, attempts = attempt, "Email delivered");
                self.ledger
                    .set_state(
                        id,
                        DeliveryState::Delivered {
                            attempts: attempt,
                            message_id: receipt.message_id.clone(),
                        },
                    )
                    .await;
            }
            Err(err) => {
                error!(delivery_id = %id, to = %message.to, attempts = attempt, error = %err, "Email delivery failed");
                self.ledger
                    .set_state(
                        id,
                        DeliveryState::Failed {
                            attempts: attempt,
                            error: err.to_string(),
                        },
                    )
                    .await;
            }
        }

        // The caller may have stopped waiting.
        let _ = done.send(outcome);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::RecordingMailer;

    fn config(capacity: usize, max_retries: u32) -> MailConfig {
        MailConfig {
            queue_capacity: capacity,
            max_retries,
            ..MailConfig::default()
        }
    }

    fn message(to: &str) -> EmailMessage {
        EmailMessage {
            to: to.to_string(),
            subject: "Invitation".into(),
            html: "<p>hi</p>".into(),
            text: "hi".into(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_delivers_and_records() {
        let mailer = RecordingMailer::new();
        let (handle, _task) = MailDispatcher::spawn(Arc::new(mailer.clone()), &config(8, 2));

        let delivery = handle.enqueue(message("a@example.com")).await.unwrap();
        let id = delivery.id;
        let receipt = delivery.wait().await.unwrap();

        assert_eq!(receipt.provider, "recording");
        assert_eq!(mailer.sent().len(), 1);
        let record = handle.status(id).await.unwrap();
        assert_eq!(
            record.state,
            DeliveryState::Delivered {
                attempts: 1,
                message_id: Some("rec-1".into())
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_transient_failures() {
        let mailer = RecordingMailer::new();
        mailer.fail_next(MailError::Transport("timeout".into()));
        mailer.fail_next(MailError::Rejected {
            status: 503,
            message: "busy".into(),
        });
        let (handle, _task) = MailDispatcher::spawn(Arc::new(mailer.clone()), &config(8, 2));

        let started = tokio::time::Instant::now();
        let delivery = handle.enqueue(message("a@example.com")).await.unwrap();
        let id = delivery.id;
        delivery.wait().await.unwrap();

        assert_eq!(mailer.attempts(), 3);
        assert!(started.elapsed() >= Duration::from_secs(4));
        assert!(matches!(
            handle.status(id).await.unwrap().state,
            DeliveryState::Delivered { attempts: 3, .. }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_max_retries() {
        let mailer = RecordingMailer::new();
        for _ in 0..3 {
            mailer.fail_next(MailError::Transport("down".into()));
        }
        let (handle, _task) = MailDispatcher::spawn(Arc::new(mailer.clone()), &config(8, 2));

        let delivery = handle.enqueue(message("a@example.com")).await.unwrap();
        let id = delivery.id;
        assert!(matches!(delivery.wait().await, Err(MailError::Transport(_))));

        assert_eq!(mailer.attempts(), 3);
        assert!(matches!(
            handle.status(id).await.unwrap().state,
            DeliveryState::Failed { attempts: 3, .. }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejection_is_not_retried() {
        let mailer = RecordingMailer::new();
        mailer.fail_next(MailError::Rejected {
            status: 401,
            message: "bad key".into(),
        });
        let (handle, _task) = MailDispatcher::spawn(Arc::new(mailer.clone()), &config(8, 2));

        let result = handle.send_and_wait(message("a@example.com")).await;
        assert!(matches!(result, Err(MailError::Rejected { status: 401, .. })));
        assert_eq!(mailer.attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_retries() {
        let mailer = RecordingMailer::new();
        mailer.fail_next(MailError::Transport("down".into()));
        let (handle, _task) = MailDispatcher::spawn(Arc::new(mailer.clone()), &config(8, 0));

        assert!(handle.send_and_wait(message("a@example.com")).await.is_err());
        assert_eq!(mailer.attempts(), 1);
    }

    #[tokio::test]
    async fn test_full_queue_is_reported() {
        let mailer = RecordingMailer::new();
        let (_dispatcher, handle) = MailDispatcher::new(Arc::new(mailer), &config(1, 2));

        let first = handle.enqueue(message("a@example.com")).await.unwrap();
        let second = handle.enqueue(message("b@example.com")).await;

        assert!(matches!(second, Err(MailError::QueueFull)));
        assert_eq!(handle.ledger().len().await, 1);
        assert_eq!(handle.status(first.id).await.unwrap().state, DeliveryState::Queued);
    }

    #[tokio::test]
    async fn test_invalid_message_is_not_queued() {
        let (_dispatcher, handle) =
            MailDispatcher::new(Arc::new(RecordingMailer::new()), &config(4, 2));
        let result = handle.enqueue(message("not-an-address")).await;
        assert!(matches!(result, Err(MailError::InvalidMessage(_))));
        assert_eq!(handle.ledger().len().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_drains_queue() {
        let mailer = RecordingMailer::new();
        let (dispatcher, handle) = MailDispatcher::new(Arc::new(mailer.clone()), &config(8, 2));

        let mut deliveries = Vec::new();
        for n in 0..3 {
            let to = format!("user{}@example.com", n);
            deliveries.push(handle.enqueue(message(&to)).await.unwrap());
        }
        handle.shutdown().await.unwrap();
        dispatcher.run().await;

        assert_eq!(mailer.sent().len(), 3);
        for delivery in deliveries {
            delivery.wait().await.unwrap();
        }
        assert!(matches!(
            handle.enqueue(message("late@example.com")).await,
            Err(MailError::DispatcherClosed)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_handles_stops_worker() {
        let mailer = RecordingMailer::new();
        let (handle, task) = MailDispatcher::spawn(Arc::new(mailer.clone()), &config(8, 2));

        let delivery = handle.enqueue(message("a@example.com")).await.unwrap();
        drop(handle);

        delivery.wait().await.unwrap();
        task.await.unwrap();
        assert_eq!(mailer.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_prune_keeps_unfinished() {
        let ledger = DeliveryLedger::default();
        let msg = message("a@example.com");
        let pending = Uuid::new_v4();
        ledger.record_queued(pending, &msg).await;
        for _ in 0..LEDGER_CAPACITY {
            let id = Uuid::new_v4();
            ledger.record_queued(id, &msg).await;
            ledger
                .set_state(id, DeliveryState::Delivered { attempts: 1, message_id: None })
                .await;
        }
        assert!(ledger.len().await < LEDGER_CAPACITY + 1);
        assert_eq!(ledger.get(pending).await.unwrap().state, DeliveryState::Queued);
    }
}
