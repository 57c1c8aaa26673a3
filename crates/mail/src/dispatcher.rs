use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::transport::{EmailMessage, EmailTransport};

/// Backoff schedule for transport retries: `base * 2^attempt`, capped.
#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_retries: 3, base_delay_ms: 250, max_delay_ms: 5_000 }
    }
}

impl RetryPolicy {
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(16);
        let delay = self.base_delay_ms.saturating_mul(1_u64 << exponent);
        Duration::from_millis(delay.min(self.max_delay_ms))
    }
}

/// Terminal fate of one queued confirmation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered { message_id: Uuid },
    Failed { message_id: Uuid, attempts: u32, reason: String },
}

impl DeliveryOutcome {
    pub fn message_id(&self) -> Uuid {
        match self {
            Self::Delivered { message_id } | Self::Failed { message_id, .. } => *message_id,
        }
    }
}

/// Record of what the background worker did with each message. Failures
/// land here and in the log; they never propagate back to the order path.
#[derive(Default)]
pub struct DispatchLedger {
    outcomes: Mutex<Vec<DeliveryOutcome>>,
}

impl DispatchLedger {
    pub async fn record(&self, outcome: DeliveryOutcome) {
        self.outcomes.lock().await.push(outcome);
    }

    pub async fn outcomes(&self) -> Vec<DeliveryOutcome> {
        self.outcomes.lock().await.clone()
    }

    pub async fn outcome_for(&self, message_id: Uuid) -> Option<DeliveryOutcome> {
        self.outcomes
            .lock()
            .await
            .iter()
            .find(|outcome| outcome.message_id() == message_id)
            .cloned()
    }
}

struct QueuedMail {
    message_id: Uuid,
    message: EmailMessage,
}

/// Front door for confirmation email. `enqueue` either hands the message to
/// the bounded queue immediately or fails; it never waits on the worker.
pub struct Mailer {
    sender: mpsc::Sender<QueuedMail>,
    ledger: Arc<DispatchLedger>,
}

#[derive(Debug, thiserror::Error)]
#[error("confirmation queue unavailable: {reason}")]
pub struct EnqueueError {
    pub reason: String,
}

impl Mailer {
    /// Starts the dispatch worker and returns the queue handle.
    pub fn spawn(
        transport: Arc<dyn EmailTransport>,
        policy: RetryPolicy,
        queue_capacity: usize,
    ) -> Self {
        let (sender, receiver) = mpsc::channel(queue_capacity.max(1));
        let ledger = Arc::new(DispatchLedger::default());
        tokio::spawn(dispatch_loop(receiver, transport, policy, Arc::clone(&ledger)));
        Self { sender, ledger }
    }

    pub fn ledger(&self) -> Arc<DispatchLedger> {
        Arc::clone(&self.ledger)
    }

    /// Queues a message for delivery, returning its id. Fails when the
    /// queue is full or the worker is gone; the caller decides what that
    /// means for the surrounding operation.
    pub fn enqueue(&self, message: EmailMessage) -> Result<Uuid, EnqueueError> {
        let message_id = Uuid::new_v4();
        self.sender
            .try_send(QueuedMail { message_id, message })
            .map_err(|error| match error {
                mpsc::error::TrySendError::Full(_) => {
                    EnqueueError { reason: "queue is full".to_string() }
                }
                mpsc::error::TrySendError::Closed(_) => {
                    EnqueueError { reason: "dispatch worker stopped".to_string() }
                }
            })?;
        Ok(message_id)
    }
}

async fn dispatch_loop(
    mut receiver: mpsc::Receiver<QueuedMail>,
    transport: Arc<dyn EmailTransport>,
    policy: RetryPolicy,
    ledger: Arc<DispatchLedger>,
) {
    while let Some(queued) = receiver.recv().await {
        let outcome = deliver_with_retries(&*transport, &policy, &queued).await;
        if let DeliveryOutcome::Failed { attempts, reason, .. } = &outcome {
            warn!(
                message_id = %queued.message_id,
                to = %queued.message.to,
                attempts,
                reason = %reason,
                "confirmation email delivery failed"
            );
        } else {
            debug!(message_id = %queued.message_id, to = %queued.message.to, "confirmation email delivered");
        }
        ledger.record(outcome).await;
    }
}

async fn deliver_with_retries(
    transport: &dyn EmailTransport,
    policy: &RetryPolicy,
    queued: &QueuedMail,
) -> DeliveryOutcome {
    let mut last_error = String::new();
    for attempt in 0..=policy.max_retries {
        if attempt > 0 {
            tokio::time::sleep(policy.delay_for(attempt - 1)).await;
        }
        match transport.send(&queued.message).await {
            Ok(()) => {
                return DeliveryOutcome::Delivered { message_id: queued.message_id };
            }
            Err(error) => {
                debug!(
                    message_id = %queued.message_id,
                    attempt,
                    error = %error,
                    "confirmation email attempt failed"
                );
                last_error = error.to_string();
            }
        }
    }
    DeliveryOutcome::Failed {
        message_id: queued.message_id,
        attempts: policy.max_retries + 1,
        reason: last_error,
    }
}
