//! Asynchronous email confirmation dispatch.
//!
//! Order placement hands a rendered confirmation to the [`Mailer`], which
//! either queues it (bounded queue, never blocking the order path) or
//! reports `QueueingFailed`. A background worker drains the queue and
//! retries transport failures with exponential backoff; once retries are
//! exhausted the failure is logged and recorded in the [`DispatchLedger`]
//! but the order is never reversed.

pub mod dispatcher;
pub mod templates;
pub mod transport;

pub use dispatcher::{DeliveryOutcome, DispatchLedger, EnqueueError, Mailer, RetryPolicy};
pub use templates::{ConfirmationRenderer, RenderError};
pub use transport::{
    EmailMessage, EmailTransport, HttpRelayTransport, NoopTransport, RecordingTransport,
    TransportError,
};
